use std::sync::{Arc, Weak};

use crate::descriptor::{AddressingMode, ArgKind, KernelDescriptor};
use crate::device::DeviceContext;
use crate::dynamic_state::DynamicStateHeap;
use crate::error::{BindError, DescriptorError, Result};
use crate::payload::CrossThreadData;
use crate::policy::{AuxTranslationDirection, DebugSettings};
use crate::resource::*;
use crate::slm::SlmAllocator;
use crate::surface::{SurfaceHeapView, SurfaceStateHeap};

mod binder;
mod clone;
mod dispatch;
mod image_transform;
mod readiness;

pub use dispatch::{DispatchParams, ExecInfo};
pub use image_transform::ImageTransformer;
pub use readiness::{CacheFlushSet, ReadinessTracker};

/// The collaborators a kernel instance binds against.
pub struct Context {
    pub id: ContextId,
    pub device: Arc<dyn DeviceContext>,
    pub memory: Arc<dyn MemoryManager>,
    pub settings: DebugSettings,
}

impl Context {
    pub fn new(id: ContextId, device: Arc<dyn DeviceContext>, memory: Arc<dyn MemoryManager>) -> Self {
        Self {
            id,
            device,
            memory,
            settings: DebugSettings::from_env(),
        }
    }
    pub fn with_settings(mut self, settings: DebugSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A user supplied argument value.
#[derive(Copy, Clone, Debug)]
pub enum ArgValue<'a> {
    None,
    Handle(ObjectHandle),
    Bytes(&'a [u8]),
}

impl<'a> ArgValue<'a> {
    /// Interprets the value as an object handle; an absent value is the
    /// null handle.
    pub fn handle(self) -> Option<ObjectHandle> {
        match self {
            ArgValue::None => Some(ObjectHandle::NULL),
            ArgValue::Handle(h) => Some(h),
            ArgValue::Bytes(b) => ObjectHandle::from_bytes(b),
        }
    }
}
impl From<ObjectHandle> for ArgValue<'_> {
    fn from(h: ObjectHandle) -> Self {
        ArgValue::Handle(h)
    }
}
impl<'a> From<&'a [u8]> for ArgValue<'a> {
    fn from(b: &'a [u8]) -> Self {
        ArgValue::Bytes(b)
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum BoundKind {
    #[default]
    None,
    Buffer,
    Image,
    Sampler,
    Pipe,
    Local,
    Accelerator,
    DeviceQueue,
    Svm,
    SvmAlloc,
    Immediate,
}

/// What is currently bound to an argument. Memory objects are referenced
/// weakly, their lifetime belongs to the memory manager. Samplers are
/// retained for as long as they stay bound.
#[derive(Clone, Debug, Default)]
pub enum BoundArg {
    #[default]
    None,
    /// `None` is the null buffer.
    Buffer(Option<Weak<Buffer>>),
    Image {
        image: Weak<Image>,
        mip_level: Option<u32>,
    },
    Sampler(Arc<Sampler>),
    Pipe(Weak<Pipe>),
    Local(u32),
    Accelerator(Weak<Accelerator>),
    DeviceQueue(Weak<DeviceQueue>),
    Svm {
        ptr: u64,
        allocation: Option<Weak<Allocation>>,
    },
    SvmAlloc {
        ptr: u64,
        allocation: Option<Weak<Allocation>>,
    },
    Immediate(Vec<u8>),
}

impl BoundArg {
    pub fn kind(&self) -> BoundKind {
        match self {
            BoundArg::None => BoundKind::None,
            BoundArg::Buffer(_) => BoundKind::Buffer,
            BoundArg::Image { .. } => BoundKind::Image,
            BoundArg::Sampler(_) => BoundKind::Sampler,
            BoundArg::Pipe(_) => BoundKind::Pipe,
            BoundArg::Local(_) => BoundKind::Local,
            BoundArg::Accelerator(_) => BoundKind::Accelerator,
            BoundArg::DeviceQueue(_) => BoundKind::DeviceQueue,
            BoundArg::Svm { .. } => BoundKind::Svm,
            BoundArg::SvmAlloc { .. } => BoundKind::SvmAlloc,
            BoundArg::Immediate(_) => BoundKind::Immediate,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ArgBinding {
    pub bound: BoundArg,
    /// Size passed with the last bind, 0 when unbound.
    pub size: usize,
    pub is_patched: bool,
    pub is_stateless_uncacheable: bool,
}

impl ArgBinding {
    #[inline]
    pub fn kind(&self) -> BoundKind {
        self.bound.kind()
    }
}

pub(crate) type ArgHandler = fn(&mut KernelInstance, u32, usize, ArgValue<'_>) -> Result<()>;

fn handler_for(kind: ArgKind) -> ArgHandler {
    match kind {
        ArgKind::Buffer => KernelInstance::set_arg_buffer,
        ArgKind::Image => KernelInstance::set_arg_image,
        ArgKind::Sampler => KernelInstance::set_arg_sampler,
        ArgKind::Pipe => KernelInstance::set_arg_pipe,
        ArgKind::Local => KernelInstance::set_arg_local,
        ArgKind::Accelerator => KernelInstance::set_arg_accelerator,
        ArgKind::DeviceQueue => KernelInstance::set_arg_device_queue,
        ArgKind::Immediate => KernelInstance::set_arg_immediate,
    }
}

/// Per-dispatch argument state of one kernel. Every bind takes `&mut self`;
/// concurrent submissions of the same kernel work on clones.
pub struct KernelInstance {
    ctx: Arc<Context>,
    desc: Arc<KernelDescriptor>,
    addressing_mode: AddressingMode,
    handlers: Vec<ArgHandler>,
    bindings: Vec<ArgBinding>,
    payload: CrossThreadData,
    ssh: SurfaceStateHeap,
    dsh: DynamicStateHeap,
    slm: SlmAllocator,
    readiness: ReadinessTracker,
    flush: CacheFlushSet,
    exec_info: ExecInfo,
    transformer: ImageTransformer,
    aux_direction: AuxTranslationDirection,
}

impl KernelInstance {
    pub fn new(ctx: Arc<Context>, desc: Arc<KernelDescriptor>) -> std::result::Result<Self, DescriptorError> {
        desc.validate()?;
        Ok(Self::fresh(ctx, desc))
    }

    /// Builds an unbound instance from an already validated descriptor.
    fn fresh(ctx: Arc<Context>, desc: Arc<KernelDescriptor>) -> Self {
        let addressing_mode = match ctx.settings.force_addressing_mode {
            Some(mode) => {
                log::warn!("kernel {}: addressing mode forced to {:?}", desc.name, mode);
                mode
            }
            None => desc
                .addressing_mode
                .unwrap_or_else(|| ctx.device.addressing_mode()),
        };
        let n = desc.args.len();
        Self {
            addressing_mode,
            handlers: desc.args.iter().map(|a| handler_for(a.kind)).collect(),
            bindings: vec![ArgBinding::default(); n],
            payload: CrossThreadData::new(desc.cross_thread_data_size as usize),
            ssh: SurfaceStateHeap::new(
                desc.heaps.surface_state_heap_size as usize,
                &desc.heaps.binding_table,
            ),
            dsh: DynamicStateHeap::new(desc.heaps.dynamic_state_heap_size as usize),
            slm: SlmAllocator::new(&desc),
            readiness: ReadinessTracker::new(desc.num_args_to_patch()),
            flush: CacheFlushSet::new(n),
            exec_info: ExecInfo::default(),
            transformer: ImageTransformer::default(),
            aux_direction: AuxTranslationDirection::None,
            ctx,
            desc,
        }
    }

    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }
    #[inline]
    pub fn descriptor(&self) -> &Arc<KernelDescriptor> {
        &self.desc
    }
    #[inline]
    pub fn addressing_mode(&self) -> AddressingMode {
        self.addressing_mode
    }
    #[inline]
    pub fn arg_count(&self) -> u32 {
        self.bindings.len() as u32
    }

    fn check_index(&self, index: u32) -> Result<usize> {
        if (index as usize) < self.bindings.len() {
            Ok(index as usize)
        } else {
            Err(BindError::InvalidIndex {
                index,
                count: self.arg_count(),
            })
        }
    }

    /// Binds `value` to argument `index`. `size` is the size the caller
    /// declares for the value: the handle size for object arguments, the
    /// byte count of local memory for local arguments and the value size for
    /// by-value arguments.
    pub fn set_arg(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        let i = self.check_index(index)?;
        let handler = self.handlers[i];
        handler(self, index, size, value)
    }

    /// Returns argument `index` to its unbound state.
    pub fn unset_arg(&mut self, index: u32) -> Result<()> {
        let i = self.check_index(index)?;
        let binding = &mut self.bindings[i];
        self.readiness.on_unbind(binding);
        binding.bound = BoundArg::None;
        binding.size = 0;
        self.flush.set(i, None);
        self.transformer.unregister(index);
        if self.desc.args[i].kind == ArgKind::Local {
            self.slm.clear(index);
        }
        log::debug!("kernel {}: unbound argument {}", self.desc.name, index);
        Ok(())
    }

    pub fn set_aux_translation_direction(&mut self, direction: AuxTranslationDirection) {
        self.aux_direction = direction;
    }
    #[inline]
    pub fn aux_translation_direction(&self) -> AuxTranslationDirection {
        self.aux_direction
    }

    #[inline]
    pub fn binding(&self, index: u32) -> Option<&ArgBinding> {
        self.bindings.get(index as usize)
    }
    #[inline]
    pub fn cross_thread_data(&self) -> &[u8] {
        self.payload.as_bytes()
    }
    #[inline]
    pub fn surface_state_heap(&self) -> SurfaceHeapView<'_> {
        self.ssh.view()
    }
    #[inline]
    pub fn dynamic_state_heap(&self) -> &[u8] {
        self.dsh.as_bytes()
    }
    pub fn cache_flush_allocations(&self) -> Vec<Arc<Allocation>> {
        self.flush.allocations()
    }
    #[inline]
    pub fn is_fully_bound(&self) -> bool {
        self.readiness.is_fully_bound()
    }
    #[inline]
    pub fn patched_count(&self) -> u32 {
        self.readiness.patched_count()
    }
    #[inline]
    pub fn has_uncacheable_stateless_args(&self) -> bool {
        self.readiness.stateless_uncacheable_count() > 0
    }
    #[inline]
    pub fn slm_total_size(&self) -> u32 {
        self.slm.total_size()
    }
    #[inline]
    pub fn slm_offset(&self, index: u32) -> u32 {
        self.slm.offset(index)
    }
}
