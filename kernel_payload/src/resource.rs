//! Memory objects, samplers and accelerators that can be bound to kernel
//! arguments, and the registry that resolves user handles to them.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::UVec3;
use parking_lot::RwLock;

pub type ContextId = u64;

static NEXT_ALLOCATION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum AllocationKind {
    Buffer,
    Image,
    SvmGpu,
    SvmCpu,
    Pipe,
    DeviceQueue,
}

/// A device-visible allocation. Owned by the memory manager, shared by the
/// objects that view it.
#[derive(Debug)]
pub struct Allocation {
    pub id: u64,
    pub kind: AllocationKind,
    pub gpu_address: u64,
    pub size: u64,
    pub root_device_index: u32,
    /// Writes through this allocation must be flushed from L3 before the
    /// host observes them.
    pub flush_l3_required: bool,
    pub compressed: bool,
}

impl Allocation {
    pub fn new(kind: AllocationKind, gpu_address: u64, size: u64) -> Self {
        Self {
            id: NEXT_ALLOCATION_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            gpu_address,
            size,
            root_device_index: 0,
            flush_l3_required: false,
            compressed: false,
        }
    }
    pub fn on_root_device(mut self, index: u32) -> Self {
        self.root_device_index = index;
        self
    }
    pub fn with_flush_l3(mut self) -> Self {
        self.flush_l3_required = true;
        self
    }
    pub fn with_compression(mut self) -> Self {
        self.compressed = true;
        self
    }
    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.gpu_address && address - self.gpu_address < self.size
    }
}

/// One allocation per root device, keyed by root device index.
#[derive(Clone, Debug, Default)]
pub struct MultiAllocation(BTreeMap<u32, Arc<Allocation>>);

impl MultiAllocation {
    pub fn new(allocations: impl IntoIterator<Item = Arc<Allocation>>) -> Self {
        Self(
            allocations
                .into_iter()
                .map(|a| (a.root_device_index, a))
                .collect(),
        )
    }
    #[inline]
    pub fn get(&self, root_device_index: u32) -> Option<&Arc<Allocation>> {
        self.0.get(&root_device_index)
    }
}
impl From<Arc<Allocation>> for MultiAllocation {
    fn from(a: Arc<Allocation>) -> Self {
        Self::new([a])
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct MemFlags {
    pub read_only: bool,
    /// Stateless accesses must bypass the caches.
    pub uncacheable: bool,
}

#[derive(Clone, Debug)]
pub struct Buffer {
    pub allocations: MultiAllocation,
    /// Byte offset of a sub-buffer into its parent allocation.
    pub offset: u64,
    pub size: u64,
    pub flags: MemFlags,
    pub context: ContextId,
}

impl Buffer {
    pub fn new(context: ContextId, allocation: Arc<Allocation>) -> Self {
        let size = allocation.size;
        Self {
            allocations: allocation.into(),
            offset: 0,
            size,
            flags: MemFlags::default(),
            context,
        }
    }
    pub fn sub_buffer(&self, offset: u64, size: u64) -> Self {
        Self {
            allocations: self.allocations.clone(),
            offset: self.offset.saturating_add(offset),
            size,
            flags: self.flags,
            context: self.context,
        }
    }
    pub fn with_flags(mut self, flags: MemFlags) -> Self {
        self.flags = flags;
        self
    }
    pub fn gpu_address(&self, root_device_index: u32) -> Option<u64> {
        self.allocations
            .get(root_device_index)
            .map(|a| a.gpu_address + self.offset)
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ImageType {
    Image1D,
    Image1DArray,
    Image1DBuffer,
    Image2D,
    Image2DArray,
    Image3D,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelOrder {
    R = 0x10b0,
    A = 0x10b1,
    Rg = 0x10b2,
    Ra = 0x10b3,
    Rgb = 0x10b4,
    Rgba = 0x10b5,
    Bgra = 0x10b6,
    Argb = 0x10b7,
    Intensity = 0x10b8,
    Luminance = 0x10b9,
    Depth = 0x10bd,
    Nv12 = 0x410e,
}
impl ChannelOrder {
    pub fn channels(self) -> u32 {
        match self {
            ChannelOrder::R
            | ChannelOrder::A
            | ChannelOrder::Intensity
            | ChannelOrder::Luminance
            | ChannelOrder::Depth
            | ChannelOrder::Nv12 => 1,
            ChannelOrder::Rg | ChannelOrder::Ra => 2,
            ChannelOrder::Rgb => 3,
            ChannelOrder::Rgba | ChannelOrder::Bgra | ChannelOrder::Argb => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelType {
    SnormInt8 = 0x10d0,
    SnormInt16 = 0x10d1,
    UnormInt8 = 0x10d2,
    UnormInt16 = 0x10d3,
    SignedInt8 = 0x10d7,
    SignedInt16 = 0x10d8,
    SignedInt32 = 0x10d9,
    UnsignedInt8 = 0x10da,
    UnsignedInt16 = 0x10db,
    UnsignedInt32 = 0x10dc,
    HalfFloat = 0x10dd,
    Float = 0x10de,
}
impl ChannelType {
    pub fn bytes(self) -> u32 {
        match self {
            ChannelType::SnormInt8
            | ChannelType::UnormInt8
            | ChannelType::SignedInt8
            | ChannelType::UnsignedInt8 => 1,
            ChannelType::SnormInt16
            | ChannelType::UnormInt16
            | ChannelType::SignedInt16
            | ChannelType::UnsignedInt16
            | ChannelType::HalfFloat => 2,
            ChannelType::SignedInt32 | ChannelType::UnsignedInt32 | ChannelType::Float => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub data_type: ChannelType,
}

impl ImageFormat {
    pub fn element_size(&self) -> u32 {
        self.order.channels() * self.data_type.bytes()
    }
    /// Hardware surface format. Formats without a typed match fall back to
    /// the unsigned integer format of the same element size.
    pub fn surface_format(&self) -> u32 {
        use ChannelOrder::*;
        use ChannelType::*;
        match (self.order, self.data_type) {
            (Rgba, Float) => 0x000,
            (Rgba, HalfFloat) => 0x088,
            (Rgba, UnormInt8) => 0x0c7,
            (Bgra, UnormInt8) => 0x0c0,
            (Rg, Float) => 0x085,
            (R, Float) => 0x0d8,
            (R, UnormInt8) => 0x140,
            (R, UnsignedInt32) => 0x0d7,
            _ => match self.element_size() {
                1 => 0x14a,
                2 => 0x10d,
                4 => 0x0d7,
                8 => 0x086,
                _ => 0x002,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub extent: UVec3,
    pub array_size: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub num_mip_levels: u32,
    pub num_samples: u32,
}

impl ImageDesc {
    pub fn new(image_type: ImageType, extent: UVec3) -> Self {
        Self {
            image_type,
            extent,
            array_size: 1,
            row_pitch: 0,
            slice_pitch: 0,
            num_mip_levels: 1,
            num_samples: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Image {
    pub allocations: MultiAllocation,
    pub desc: ImageDesc,
    pub format: ImageFormat,
    pub base_mip_level: u32,
    pub flags: MemFlags,
    pub context: ContextId,
}

impl Image {
    pub fn new(
        context: ContextId,
        allocation: Arc<Allocation>,
        desc: ImageDesc,
        format: ImageFormat,
    ) -> Self {
        let mut desc = desc;
        if desc.row_pitch == 0 {
            desc.row_pitch = desc.extent.x * format.element_size();
        }
        if desc.slice_pitch == 0 {
            desc.slice_pitch = desc.row_pitch * desc.extent.y.max(1);
        }
        Self {
            allocations: allocation.into(),
            desc,
            format,
            base_mip_level: 0,
            flags: MemFlags::default(),
            context,
        }
    }
    #[inline]
    pub fn element_size(&self) -> u32 {
        self.format.element_size()
    }
    /// Depth of 3D images, 0 for everything else.
    pub fn depth(&self) -> u32 {
        match self.desc.image_type {
            ImageType::Image3D => self.desc.extent.z,
            _ => 0,
        }
    }
    /// Number of array layers for array images, 0 for everything else.
    pub fn array_size(&self) -> u32 {
        match self.desc.image_type {
            ImageType::Image1DArray | ImageType::Image2DArray => self.desc.array_size,
            _ => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum SamplerAddressing {
    #[default]
    None,
    ClampToEdge,
    Clamp,
    Repeat,
    MirroredRepeat,
}

impl SamplerAddressing {
    /// Value kernels compare the addressing mode payload slot against.
    pub fn payload_value(self) -> u32 {
        match self {
            SamplerAddressing::None => 0,
            SamplerAddressing::Clamp => 1,
            SamplerAddressing::ClampToEdge => 2,
            SamplerAddressing::Repeat => 3,
            SamplerAddressing::MirroredRepeat => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

pub const SAMPLER_NORMALIZED_COORDS: u32 = 0x08;
const SNAP_WA_ENABLED: u32 = u32::MAX;

#[derive(Clone, Debug, PartialEq)]
pub struct Sampler {
    pub normalized_coords: bool,
    pub addressing: SamplerAddressing,
    pub filter: FilterMode,
    pub mip_filter: Option<FilterMode>,
    pub lod_min: f32,
    pub lod_max: f32,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            normalized_coords: true,
            addressing: SamplerAddressing::ClampToEdge,
            filter: FilterMode::Nearest,
            mip_filter: None,
            lod_min: 0.0,
            lod_max: f32::MAX,
        }
    }
}

impl Sampler {
    pub fn new(normalized_coords: bool, addressing: SamplerAddressing, filter: FilterMode) -> Self {
        Self {
            normalized_coords,
            addressing,
            filter,
            ..Default::default()
        }
    }
    pub fn normalized_coords_value(&self) -> u32 {
        if self.normalized_coords {
            SAMPLER_NORMALIZED_COORDS
        } else {
            0
        }
    }
    /// Nearest sampling with border clamping needs coordinate snapping.
    pub fn snap_wa_value(&self) -> u32 {
        if self.addressing == SamplerAddressing::Clamp && self.filter == FilterMode::Nearest {
            SNAP_WA_ENABLED
        } else {
            0
        }
    }
    /// Samplers that read a 3D image identically through a 2D array view.
    pub fn is_transformable(&self) -> bool {
        self.addressing == SamplerAddressing::ClampToEdge
            && self.filter == FilterMode::Nearest
            && !self.normalized_coords
    }
}

#[derive(Clone, Debug)]
pub struct Pipe {
    pub allocations: MultiAllocation,
    pub packet_size: u32,
    pub max_packets: u32,
    pub context: ContextId,
}

impl Pipe {
    pub fn new(context: ContextId, allocation: Arc<Allocation>, packet_size: u32, max_packets: u32) -> Self {
        Self {
            allocations: allocation.into(),
            packet_size,
            max_packets,
            context,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct VmeDesc {
    pub mb_block_type: u32,
    pub subpixel_mode: u32,
    pub sad_adjust_mode: u32,
    pub search_path_type: u32,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Accelerator {
    MotionEstimation(VmeDesc),
    VideoEnhancement,
}

#[derive(Clone, Debug)]
pub struct DeviceQueue {
    pub queue_buffer: Arc<Allocation>,
    pub context: ContextId,
}

#[derive(Clone, Debug)]
pub enum Object {
    Buffer(Arc<Buffer>),
    Image(Arc<Image>),
    Sampler(Arc<Sampler>),
    Pipe(Arc<Pipe>),
    Accelerator(Arc<Accelerator>),
    DeviceQueue(Arc<DeviceQueue>),
}

macro_rules! impl_into_object {
    ($($t:ident),*) => {
        $(
            impl From<$t> for Object {
                fn from(v: $t) -> Self {
                    Object::$t(Arc::new(v))
                }
            }
            impl From<Arc<$t>> for Object {
                fn from(v: Arc<$t>) -> Self {
                    Object::$t(v)
                }
            }
        )*
    };
}
impl_into_object!(Buffer, Image, Sampler, Pipe, Accelerator, DeviceQueue);

/// Opaque user handle, passed by value in an 8 byte argument. Zero is the
/// null handle.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

impl ObjectHandle {
    pub const NULL: Self = Self(0);
    pub const SIZE: usize = std::mem::size_of::<u64>();

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_le_bytes(bytes)))
    }
}

/// Resolves user handles and device pointers to the objects backing them.
pub trait MemoryManager: Send + Sync {
    fn resolve(&self, handle: ObjectHandle) -> Option<Object>;
    /// The SVM allocation containing `address`, if any.
    fn find_svm_allocation(&self, address: u64) -> Option<Arc<Allocation>>;
}

/// Handle table and SVM range map shared by every kernel instance of a
/// context.
pub struct ObjectRegistry {
    objects: RwLock<HashMap<ObjectHandle, Object>>,
    svm: RwLock<BTreeMap<u64, Arc<Allocation>>>,
    next_handle: AtomicU64,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            svm: RwLock::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }
    pub fn register(&self, object: impl Into<Object>) -> ObjectHandle {
        let handle = ObjectHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.objects.write().insert(handle, object.into());
        handle
    }
    /// Drops the registry's reference. Kernel instances only hold weak
    /// references to memory objects, so a released buffer dies here unless
    /// the caller still owns it.
    pub fn release(&self, handle: ObjectHandle) -> Option<Object> {
        self.objects.write().remove(&handle)
    }
    pub fn register_svm(&self, allocation: Arc<Allocation>) -> u64 {
        let address = allocation.gpu_address;
        self.svm.write().insert(address, allocation);
        address
    }
    pub fn free_svm(&self, address: u64) -> Option<Arc<Allocation>> {
        self.svm.write().remove(&address)
    }
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl MemoryManager for ObjectRegistry {
    fn resolve(&self, handle: ObjectHandle) -> Option<Object> {
        self.objects.read().get(&handle).cloned()
    }
    fn find_svm_allocation(&self, address: u64) -> Option<Arc<Allocation>> {
        let svm = self.svm.read();
        let (_, allocation) = svm.range(..=address).next_back()?;
        allocation.contains(address).then(|| allocation.clone())
    }
}
