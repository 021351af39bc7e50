//! Dynamic shared local memory layout.
//!
//! Local memory arguments are laid out one after another in argument order.
//! Setting the size of one argument shifts the offsets of every local
//! argument after it, so each bind re-walks the tail of the argument list.
use crate::descriptor::KernelDescriptor;
use crate::error::{BindError, Result};

/// Granularity the total local memory size is rounded up to.
pub const SLM_BLOCK_GRANULARITY: u64 = 1024;

#[inline]
pub(crate) fn align_up(v: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        v
    } else {
        v.div_ceil(alignment) * alignment
    }
}

/// Offsets that changed during a re-walk, plus the new total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlmUpdate {
    pub offsets: Vec<(u32, u32)>,
    pub total: u32,
}

#[derive(Clone, Debug)]
pub struct SlmAllocator {
    sizes: Vec<u32>,
    offsets: Vec<u32>,
    alignments: Vec<u32>,
    static_slm: u32,
    total: u32,
}

impl SlmAllocator {
    pub fn new(desc: &KernelDescriptor) -> Self {
        let n = desc.args.len();
        Self {
            sizes: vec![0; n],
            offsets: vec![0; n],
            alignments: desc.args.iter().map(|a| a.required_slm_alignment()).collect(),
            static_slm: desc.slm_inline_size,
            total: desc.slm_inline_size,
        }
    }
    #[inline]
    pub fn size(&self, index: u32) -> u32 {
        self.sizes[index as usize]
    }
    #[inline]
    pub fn offset(&self, index: u32) -> u32 {
        self.offsets[index as usize]
    }
    /// Static plus dynamic local memory, in bytes.
    #[inline]
    pub fn total_size(&self) -> u32 {
        self.total
    }

    /// Records `size` for the local argument at `index` and re-derives the
    /// offsets of every local argument after it. Nothing is committed when
    /// the layout would not fit in 32 bits.
    pub fn set_local_size(&mut self, index: u32, size: u32) -> Result<SlmUpdate> {
        let start = index as usize;
        let overflow = || BindError::OutOfResources { index };
        let mut offsets = vec![(index, self.offsets[start])];
        let mut running = self.offsets[start] as u64 + size as u64;
        for i in start + 1..self.sizes.len() {
            let alignment = self.alignments[i];
            // non-local arguments share the index space and carry size 0
            if alignment != 0 {
                running = align_up(running, alignment as u64);
                let offset = u32::try_from(running).map_err(|_| overflow())?;
                log::trace!("slm arg {} offset {:#x}", i, offset);
                offsets.push((i as u32, offset));
            }
            running += self.sizes[i] as u64;
        }
        let total = self.static_slm as u64 + align_up(running, SLM_BLOCK_GRANULARITY);
        let total = u32::try_from(total).map_err(|_| overflow())?;

        self.sizes[start] = size;
        for &(i, offset) in &offsets {
            self.offsets[i as usize] = offset;
        }
        self.total = total;
        Ok(SlmUpdate { offsets, total })
    }

    /// Forgets the size bound at `index`. Offsets of later arguments keep
    /// their values until the next local bind re-walks them.
    pub fn clear(&mut self, index: u32) {
        self.sizes[index as usize] = 0;
    }
}
