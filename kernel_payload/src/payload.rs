use crate::descriptor::PayloadOffset;

/// Scalar types that can be written into a payload slot, little-endian.
pub trait PatchValue: Copy {
    const SIZE: usize;
    fn write_le(self, out: &mut [u8]);
}
macro_rules! impl_patch_value {
    ($($t:ty),*) => {
        $(impl PatchValue for $t {
            const SIZE: usize = std::mem::size_of::<$t>();
            #[inline]
            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
        })*
    };
}
impl_patch_value!(u8, u16, u32, u64, i32, i64, f32);

/// The per-instance cross-thread data: the scalar payload the hardware
/// threads read their arguments from.
///
/// Every write is bounds checked. The descriptor validated all its patch
/// locations at instance construction, so an out-of-range write here is a
/// contract violation and panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossThreadData(Vec<u8>);

impl CrossThreadData {
    pub fn new(size: usize) -> Self {
        Self(vec![0; size])
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Writes `value` at `offset`; an undefined offset is a no-op.
    pub fn patch<T: PatchValue>(&mut self, offset: PayloadOffset, value: T) {
        if let Some(o) = offset.get() {
            value.write_le(&mut self.0[o..o + T::SIZE]);
        }
    }

    /// Writes `value` truncated to `size` bytes (4 or 8). Used for pointer
    /// slots whose width depends on the kernel's pointer size.
    pub fn patch_with_required_size(&mut self, offset: PayloadOffset, size: usize, value: u64) {
        match size {
            4 => self.patch(offset, value as u32),
            8 => self.patch(offset, value),
            _ => assert!(!offset.is_defined(), "unsupported patch width {}", size),
        }
    }

    /// Copies `src` verbatim at `offset`.
    pub fn patch_bytes(&mut self, offset: usize, src: &[u8]) {
        self.0[offset..offset + src.len()].copy_from_slice(src);
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.0[offset..offset + 4]);
        u32::from_le_bytes(b)
    }
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[offset..offset + 8]);
        u64::from_le_bytes(b)
    }
}
