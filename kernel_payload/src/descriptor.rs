//! Static kernel metadata, produced once per compiled kernel and device and
//! shared read-only by every kernel instance created from it.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dynamic_state::SAMPLER_STATE_SIZE;
use crate::error::DescriptorError;
use crate::surface::SURFACE_STATE_SIZE;

macro_rules! offset_type {
    ($name:ident, $repr:ty) => {
        #[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $repr);
        impl $name {
            pub const UNDEFINED: Self = Self(<$repr>::MAX);
            #[inline]
            pub fn is_defined(self) -> bool {
                self.0 != <$repr>::MAX
            }
            #[inline]
            pub fn get(self) -> Option<usize> {
                self.is_defined().then_some(self.0 as usize)
            }
        }
        impl Default for $name {
            fn default() -> Self {
                Self::UNDEFINED
            }
        }
        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                Self(v)
            }
        }
    };
}
offset_type!(PayloadOffset, u16);
offset_type!(HeapOffset, u32);

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    Buffer,
    Image,
    Sampler,
    Pipe,
    Local,
    Accelerator,
    DeviceQueue,
    Immediate,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    Stateless,
    Bindful,
    BindfulAndStateless,
    Bindless,
    BindlessAndStateless,
}
impl AddressingMode {
    #[inline]
    pub fn patches_stateless(self) -> bool {
        matches!(
            self,
            Self::Stateless | Self::BindfulAndStateless | Self::BindlessAndStateless
        )
    }
    #[inline]
    pub fn is_bindless(self) -> bool {
        matches!(self, Self::Bindless | Self::BindlessAndStateless)
    }
    /// Whether buffer arguments get a surface state record at all.
    #[inline]
    pub fn has_stateful_buffers(self) -> bool {
        !matches!(self, Self::Stateless)
    }
}

/// Pointer-like arguments: buffers, pipes, device queues, SVM and local memory.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerArg {
    pub stateless: PayloadOffset,
    pub pointer_size: u8,
    /// Residual byte offset of an unaligned pointer, patched next to the
    /// aligned base.
    pub buffer_offset: PayloadOffset,
    pub bindful: HeapOffset,
    pub bindless: PayloadOffset,
    pub slm_offset: PayloadOffset,
    pub required_slm_alignment: u32,
}
impl Default for PointerArg {
    fn default() -> Self {
        Self {
            stateless: PayloadOffset::UNDEFINED,
            pointer_size: 8,
            buffer_offset: PayloadOffset::UNDEFINED,
            bindful: HeapOffset::UNDEFINED,
            bindless: PayloadOffset::UNDEFINED,
            slm_offset: PayloadOffset::UNDEFINED,
            required_slm_alignment: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageMetadata {
    pub img_width: PayloadOffset,
    pub img_height: PayloadOffset,
    pub img_depth: PayloadOffset,
    pub channel_data_type: PayloadOffset,
    pub channel_order: PayloadOffset,
    pub array_size: PayloadOffset,
    pub num_samples: PayloadOffset,
    pub num_mip_levels: PayloadOffset,
    pub object_id: PayloadOffset,
    pub flat_base_offset: PayloadOffset,
    pub flat_width: PayloadOffset,
    pub flat_height: PayloadOffset,
    pub flat_pitch: PayloadOffset,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageArg {
    pub bindful: HeapOffset,
    pub bindless: PayloadOffset,
    pub metadata: ImageMetadata,
    pub media_image: bool,
    pub media_block_image: bool,
    pub transformable: bool,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    #[default]
    Texture,
    Vme,
    Ve,
    Vd,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerMetadata {
    pub snap_wa: PayloadOffset,
    pub addressing_mode: PayloadOffset,
    pub normalized_coords: PayloadOffset,
    pub object_id: PayloadOffset,
}

/// Motion estimation configuration scalars of a VME accelerator argument.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmePayload {
    pub mb_block_type: PayloadOffset,
    pub subpixel_mode: PayloadOffset,
    pub sad_adjust_mode: PayloadOffset,
    pub search_path_type: PayloadOffset,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerArg {
    /// Offset of the SAMPLER_STATE in the dynamic state heap.
    pub bindful: HeapOffset,
    pub bindless: PayloadOffset,
    pub sampler_type: SamplerType,
    pub metadata: SamplerMetadata,
    pub vme: Option<VmePayload>,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueElement {
    pub offset: PayloadOffset,
    pub size: u16,
    #[serde(default)]
    pub source_offset: u16,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueArg {
    /// Declared size of the by-value argument, 0 when the compiler did not
    /// report one.
    pub size: u32,
    pub elements: Vec<ValueElement>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgLayout {
    Pointer(PointerArg),
    Image(ImageArg),
    Sampler(SamplerArg),
    Value(ValueArg),
}
impl ArgLayout {
    fn name(&self) -> &'static str {
        match self {
            ArgLayout::Pointer(_) => "pointer",
            ArgLayout::Image(_) => "image",
            ArgLayout::Sampler(_) => "sampler",
            ArgLayout::Value(_) => "value",
        }
    }
}

/// A single (payload offset, size, source offset) triple an argument writes.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct PatchLocation {
    pub offset: u16,
    pub size: u16,
    pub source_offset: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescriptor {
    pub kind: ArgKind,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub pure_stateful: bool,
    pub layout: ArgLayout,
}

macro_rules! layout_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        #[inline]
        pub fn $fn_name(&self) -> Option<&$ty> {
            match &self.layout {
                ArgLayout::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

impl ArgDescriptor {
    layout_accessor!(as_pointer, Pointer, PointerArg);
    layout_accessor!(as_image, Image, ImageArg);
    layout_accessor!(as_sampler, Sampler, SamplerArg);
    layout_accessor!(as_value, Value, ValueArg);

    pub fn pointer(kind: ArgKind, pointer: PointerArg) -> Self {
        Self {
            kind,
            read_only: false,
            pure_stateful: false,
            layout: ArgLayout::Pointer(pointer),
        }
    }
    pub fn image(image: ImageArg) -> Self {
        Self {
            kind: ArgKind::Image,
            read_only: false,
            pure_stateful: false,
            layout: ArgLayout::Image(image),
        }
    }
    pub fn sampler(kind: ArgKind, sampler: SamplerArg) -> Self {
        Self {
            kind,
            read_only: false,
            pure_stateful: false,
            layout: ArgLayout::Sampler(sampler),
        }
    }
    pub fn value(value: ValueArg) -> Self {
        Self {
            kind: ArgKind::Immediate,
            read_only: false,
            pure_stateful: false,
            layout: ArgLayout::Value(value),
        }
    }

    /// Byte alignment required for the dynamic local memory region of this
    /// argument, zero for anything that is not local memory.
    pub fn required_slm_alignment(&self) -> u32 {
        match (&self.layout, self.kind) {
            (ArgLayout::Pointer(p), ArgKind::Local) => p.required_slm_alignment,
            _ => 0,
        }
    }

    /// Surface state heap offset of this argument's descriptor record.
    pub fn bindful(&self) -> HeapOffset {
        match &self.layout {
            ArgLayout::Pointer(p) => p.bindful,
            ArgLayout::Image(i) => i.bindful,
            ArgLayout::Sampler(s) => s.bindful,
            ArgLayout::Value(_) => HeapOffset::UNDEFINED,
        }
    }

    pub fn bindless(&self) -> PayloadOffset {
        match &self.layout {
            ArgLayout::Pointer(p) => p.bindless,
            ArgLayout::Image(i) => i.bindless,
            ArgLayout::Sampler(s) => s.bindless,
            ArgLayout::Value(_) => PayloadOffset::UNDEFINED,
        }
    }

    /// Every payload location this argument may write, in declaration order.
    pub fn patch_locations(&self) -> Vec<PatchLocation> {
        fn push(out: &mut Vec<PatchLocation>, offset: PayloadOffset, size: u16) {
            if offset.is_defined() {
                out.push(PatchLocation {
                    offset: offset.0,
                    size,
                    source_offset: 0,
                });
            }
        }
        let mut out = vec![];
        match &self.layout {
            ArgLayout::Pointer(p) => {
                push(&mut out, p.stateless, p.pointer_size as u16);
                push(&mut out, p.buffer_offset, 4);
                push(&mut out, p.bindless, 4);
                push(&mut out, p.slm_offset, 4);
            }
            ArgLayout::Image(i) => {
                let m = &i.metadata;
                for offset in [
                    m.img_width,
                    m.img_height,
                    m.img_depth,
                    m.channel_data_type,
                    m.channel_order,
                    m.array_size,
                    m.num_samples,
                    m.num_mip_levels,
                    m.object_id,
                ] {
                    push(&mut out, offset, 4);
                }
                push(&mut out, m.flat_base_offset, 8);
                for offset in [m.flat_width, m.flat_height, m.flat_pitch] {
                    push(&mut out, offset, 4);
                }
                push(&mut out, i.bindless, 4);
            }
            ArgLayout::Sampler(s) => {
                let m = &s.metadata;
                for offset in [m.snap_wa, m.addressing_mode, m.normalized_coords, m.object_id] {
                    push(&mut out, offset, 4);
                }
                if let Some(vme) = &s.vme {
                    for offset in [
                        vme.mb_block_type,
                        vme.subpixel_mode,
                        vme.sad_adjust_mode,
                        vme.search_path_type,
                    ] {
                        push(&mut out, offset, 4);
                    }
                }
                push(&mut out, s.bindless, 4);
            }
            ArgLayout::Value(v) => {
                for e in &v.elements {
                    if e.offset.is_defined() {
                        out.push(PatchLocation {
                            offset: e.offset.0,
                            size: e.size,
                            source_offset: e.source_offset,
                        });
                    }
                }
            }
        }
        out
    }

    fn check_layout(&self, index: u32) -> Result<(), DescriptorError> {
        let ok = match self.kind {
            ArgKind::Buffer | ArgKind::Pipe | ArgKind::Local | ArgKind::DeviceQueue => {
                matches!(self.layout, ArgLayout::Pointer(_))
            }
            ArgKind::Image => matches!(self.layout, ArgLayout::Image(_)),
            ArgKind::Sampler | ArgKind::Accelerator => matches!(self.layout, ArgLayout::Sampler(_)),
            ArgKind::Immediate => matches!(self.layout, ArgLayout::Value(_)),
        };
        if ok {
            Ok(())
        } else {
            Err(DescriptorError::LayoutMismatch {
                index,
                kind: self.kind,
                layout: self.layout.name(),
            })
        }
    }
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitArgs {
    pub global_work_size: [PayloadOffset; 3],
    pub local_work_size: [PayloadOffset; 3],
    pub local_work_size2: [PayloadOffset; 3],
    pub enqueued_local_work_size: [PayloadOffset; 3],
    pub global_work_offset: [PayloadOffset; 3],
    pub num_work_groups: [PayloadOffset; 3],
    pub work_dim: PayloadOffset,
    pub parent_event: PayloadOffset,
}
impl ImplicitArgs {
    fn locations(&self) -> Vec<(&'static str, PayloadOffset, u32)> {
        let mut out = vec![];
        let vectors = [
            ("global_work_size", &self.global_work_size),
            ("local_work_size", &self.local_work_size),
            ("local_work_size2", &self.local_work_size2),
            ("enqueued_local_work_size", &self.enqueued_local_work_size),
            ("global_work_offset", &self.global_work_offset),
            ("num_work_groups", &self.num_work_groups),
        ];
        for (name, offsets) in vectors {
            out.extend(offsets.iter().map(|o| (name, *o, 4)));
        }
        out.push(("work_dim", self.work_dim, 4));
        out.push(("parent_event", self.parent_event, 8));
        out
    }
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingTable {
    pub offset: u32,
    pub num_entries: u32,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapLayout {
    pub surface_state_heap_size: u32,
    pub binding_table: BindingTable,
    pub dynamic_state_heap_size: u32,
    /// Bindless payload slot -> surface state index in the surface heap.
    pub bindless_surfaces: BTreeMap<u16, u32>,
}

#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelDescriptor {
    pub name: String,
    /// `None` follows the device's active addressing mode.
    pub addressing_mode: Option<AddressingMode>,
    pub cross_thread_data_size: u32,
    pub slm_inline_size: u32,
    /// Arguments the compiler actually consumed, all of them when absent.
    pub num_args_to_patch: Option<u32>,
    pub args: Vec<ArgDescriptor>,
    pub implicit: ImplicitArgs,
    pub heaps: HeapLayout,
}

impl KernelDescriptor {
    pub fn from_json(json: &str) -> Result<Self, DescriptorError> {
        let desc: Self = serde_json::from_str(json)?;
        desc.validate()?;
        Ok(desc)
    }
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(self)?)
    }
    #[inline]
    pub fn arg_count(&self) -> u32 {
        self.args.len() as u32
    }
    #[inline]
    pub fn num_args_to_patch(&self) -> u32 {
        self.num_args_to_patch.unwrap_or(self.arg_count())
    }
    /// SHA-256 of the canonical JSON form. Two descriptors decoded from the
    /// same binary share a fingerprint even when they are distinct objects.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).expect("kernel descriptor is always serializable");
        format!("{:x}", Sha256::digest(&bytes))
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let payload_size = self.cross_thread_data_size;
        let ssh_size = self.heaps.surface_state_heap_size;
        let dsh_size = self.heaps.dynamic_state_heap_size;
        if self.num_args_to_patch() > self.arg_count() {
            return Err(DescriptorError::InvalidPatchCount {
                required: self.num_args_to_patch(),
                count: self.arg_count(),
            });
        }
        let table = &self.heaps.binding_table;
        let table_end = table.num_entries as u64 * 4 + table.offset as u64;
        if table.num_entries > 0 && table_end > ssh_size as u64 {
            return Err(DescriptorError::BindingTableOutOfBounds {
                offset: table.offset,
                entries: table.num_entries,
                size_limit: ssh_size,
            });
        }
        for (name, offset, size) in self.implicit.locations() {
            if let Some(o) = offset.get() {
                if o as u32 + size > payload_size {
                    return Err(DescriptorError::ImplicitOutOfBounds {
                        name,
                        offset: o as u32,
                        size_limit: payload_size,
                    });
                }
            }
        }
        for (i, arg) in self.args.iter().enumerate() {
            let index = i as u32;
            arg.check_layout(index)?;
            if let ArgLayout::Pointer(p) = &arg.layout {
                if p.stateless.is_defined() && !matches!(p.pointer_size, 4 | 8) {
                    return Err(DescriptorError::InvalidPatchSize {
                        index,
                        size: p.pointer_size as u32,
                    });
                }
            }
            for loc in arg.patch_locations() {
                if !matches!(loc.size, 1 | 2 | 4 | 8) && arg.kind != ArgKind::Immediate {
                    return Err(DescriptorError::InvalidPatchSize {
                        index,
                        size: loc.size as u32,
                    });
                }
                if loc.size == 0 || loc.offset as u32 + loc.size as u32 > payload_size {
                    return Err(DescriptorError::PatchOutOfBounds {
                        index,
                        offset: loc.offset as u32,
                        size: loc.size as u32,
                        size_limit: payload_size,
                    });
                }
            }
            let bindful = arg.bindful();
            if let Some(offset) = bindful.get() {
                let (heap, record, limit) = match arg.layout {
                    ArgLayout::Sampler(_) => ("dynamic state", SAMPLER_STATE_SIZE, dsh_size),
                    _ => ("surface state", SURFACE_STATE_SIZE, ssh_size),
                };
                if offset + record > limit as usize {
                    return Err(DescriptorError::HeapOutOfBounds {
                        index,
                        heap,
                        offset: offset as u32,
                        size_limit: limit,
                    });
                }
            }
            let bindless = arg.bindless();
            if bindless.is_defined() && !matches!(arg.layout, ArgLayout::Sampler(_)) {
                let slot = self
                    .heaps
                    .bindless_surfaces
                    .get(&bindless.0)
                    .ok_or(DescriptorError::MissingBindlessSlot { index })?;
                let offset = *slot as usize * SURFACE_STATE_SIZE;
                if offset + SURFACE_STATE_SIZE > ssh_size as usize {
                    return Err(DescriptorError::HeapOutOfBounds {
                        index,
                        heap: "surface state",
                        offset: offset as u32,
                        size_limit: ssh_size,
                    });
                }
            }
            let alignment = arg.required_slm_alignment();
            if alignment != 0 && !alignment.is_power_of_two() {
                return Err(DescriptorError::InvalidAlignment { index, alignment });
            }
        }
        Ok(())
    }
}
