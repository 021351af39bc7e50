#![allow(dead_code)]
use std::sync::{Arc, Once};

use kernel_payload::*;

static ONCE: Once = Once::new();

pub fn init_once() {
    let show_log = match std::env::var("KERNEL_PAYLOAD_TEST_LOG") {
        Ok(log) => log == "1",
        Err(_) => false,
    };
    ONCE.call_once(|| {
        if show_log {
            init_logger_verbose();
        }
    });
}

pub const CONTEXT_ID: ContextId = 1;

pub struct Fixture {
    pub registry: Arc<ObjectRegistry>,
    pub ctx: Arc<Context>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(GenericDevice::default(), DebugSettings::default())
    }
    pub fn with(device: GenericDevice, settings: DebugSettings) -> Self {
        init_once();
        let registry = Arc::new(ObjectRegistry::new());
        let ctx = Arc::new(
            Context::new(CONTEXT_ID, Arc::new(device), registry.clone()).with_settings(settings),
        );
        Self { registry, ctx }
    }
    pub fn instance(&self, desc: KernelDescriptor) -> KernelInstance {
        KernelInstance::new(self.ctx.clone(), Arc::new(desc)).unwrap()
    }
    pub fn buffer(&self, address: u64, size: u64) -> (ObjectHandle, Arc<Buffer>) {
        let allocation = Arc::new(Allocation::new(AllocationKind::Buffer, address, size));
        let buffer = Arc::new(Buffer::new(CONTEXT_ID, allocation));
        (self.registry.register(buffer.clone()), buffer)
    }
    pub fn register_buffer(&self, buffer: Buffer) -> (ObjectHandle, Arc<Buffer>) {
        let buffer = Arc::new(buffer);
        (self.registry.register(buffer.clone()), buffer)
    }
    pub fn sampler(&self, sampler: Sampler) -> (ObjectHandle, Arc<Sampler>) {
        let sampler = Arc::new(sampler);
        (self.registry.register(sampler.clone()), sampler)
    }
    pub fn image(&self, address: u64, desc: ImageDesc, format: ImageFormat) -> (ObjectHandle, Arc<Image>) {
        let allocation = Arc::new(Allocation::new(AllocationKind::Image, address, 1 << 20));
        let image = Arc::new(Image::new(CONTEXT_ID, allocation, desc, format));
        (self.registry.register(image.clone()), image)
    }
}

pub fn rgba8() -> ImageFormat {
    ImageFormat {
        order: ChannelOrder::Rgba,
        data_type: ChannelType::UnormInt8,
    }
}

pub fn buffer_arg(stateless: u16, bindful: Option<u32>) -> ArgDescriptor {
    ArgDescriptor::pointer(
        ArgKind::Buffer,
        PointerArg {
            stateless: PayloadOffset(stateless),
            bindful: bindful.map_or(HeapOffset::UNDEFINED, HeapOffset),
            ..Default::default()
        },
    )
}

pub fn local_arg(slm_offset: u16, alignment: u32) -> ArgDescriptor {
    ArgDescriptor::pointer(
        ArgKind::Local,
        PointerArg {
            slm_offset: PayloadOffset(slm_offset),
            required_slm_alignment: alignment,
            ..Default::default()
        },
    )
}

/// Sampler argument with its metadata packed in four dwords from `base`.
pub fn sampler_arg(base: u16, dsh_offset: u32) -> ArgDescriptor {
    ArgDescriptor::sampler(
        ArgKind::Sampler,
        SamplerArg {
            bindful: HeapOffset(dsh_offset),
            metadata: SamplerMetadata {
                snap_wa: PayloadOffset(base),
                addressing_mode: PayloadOffset(base + 4),
                normalized_coords: PayloadOffset(base + 8),
                object_id: PayloadOffset(base + 12),
            },
            ..Default::default()
        },
    )
}

pub fn value_arg(offset: u16, size: u16) -> ArgDescriptor {
    ArgDescriptor::value(ValueArg {
        size: size as u32,
        elements: vec![ValueElement {
            offset: PayloadOffset(offset),
            size,
            source_offset: 0,
        }],
    })
}

pub fn descriptor(args: Vec<ArgDescriptor>, payload_size: u32) -> KernelDescriptor {
    KernelDescriptor {
        name: "test_kernel".into(),
        cross_thread_data_size: payload_size,
        heaps: HeapLayout {
            surface_state_heap_size: 512,
            dynamic_state_heap_size: 64,
            ..Default::default()
        },
        args,
        ..Default::default()
    }
}

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}
