use glam::UVec3;
use kernel_payload::surface::{MediaSurfaceState, SurfaceState, SurfaceType};
use kernel_payload::*;

mod common;
use common::*;

fn image_arg(transformable: bool) -> ArgDescriptor {
    ArgDescriptor::image(ImageArg {
        bindful: HeapOffset(64),
        metadata: ImageMetadata {
            img_width: PayloadOffset(0),
            img_height: PayloadOffset(4),
            img_depth: PayloadOffset(8),
            channel_data_type: PayloadOffset(12),
            channel_order: PayloadOffset(16),
            array_size: PayloadOffset(20),
            num_samples: PayloadOffset(24),
            num_mip_levels: PayloadOffset(28),
            object_id: PayloadOffset(32),
            flat_base_offset: PayloadOffset(40),
            flat_width: PayloadOffset(48),
            flat_height: PayloadOffset(52),
            flat_pitch: PayloadOffset(56),
        },
        transformable,
        ..Default::default()
    })
}

fn plain_sampler_arg() -> ArgDescriptor {
    ArgDescriptor::sampler(ArgKind::Sampler, SamplerArg::default())
}

fn image_3d(f: &Fixture) -> (ObjectHandle, std::sync::Arc<Image>) {
    f.image(
        0x40000,
        ImageDesc::new(ImageType::Image3D, UVec3::new(16, 8, 4)),
        rgba8(),
    )
}

fn surface(k: &KernelInstance) -> SurfaceState {
    SurfaceState::decode(&k.surface_state_heap().bytes[64..])
}

#[test]
fn image_metadata_is_patched() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(false)], 64));
    let (h, _image) = image_3d(&f);
    k.set_arg(0, 8, h.into()).unwrap();

    let p = k.cross_thread_data();
    let dwords: Vec<u32> = (0..9).map(|i| read_u32(p, i * 4)).collect();
    assert_eq!(dwords, [16, 8, 4, 0x10d2, 0x10b5, 0, 1, 1, 64]);
    assert_eq!(read_u64(p, 40), 0x40000);
    assert_eq!(read_u32(p, 48), 63);
    assert_eq!(read_u32(p, 52), 7);
    assert_eq!(read_u32(p, 56), 63);

    let s = surface(&k);
    assert_eq!(s.surface_type, SurfaceType::Surface3D);
    assert!(!s.is_array);
    assert_eq!((s.width, s.height, s.depth), (15, 7, 3));
    assert_eq!(s.pitch, 63);
    assert_eq!(s.format, 0x0c7);
    assert_eq!(s.base_address, 0x40000);
    assert_eq!(k.binding(0).unwrap().kind(), BoundKind::Image);
}

#[test]
fn image_rejects_buffers() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(false)], 64));
    let (b, _b) = f.buffer(0x1000, 0x100);
    assert_eq!(
        k.set_arg(0, 8, b.into()),
        Err(BindError::InvalidMemObject {
            index: 0,
            handle: b.0
        })
    );
    assert_eq!(
        k.set_arg(0, 8, ArgValue::None),
        Err(BindError::InvalidMemObject { index: 0, handle: 0 })
    );
}

#[test]
fn mip_level_sets_min_lod() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(false)], 64));
    let mut desc = ImageDesc::new(ImageType::Image2D, UVec3::new(64, 64, 1));
    desc.num_mip_levels = 4;
    let (h, _image) = f.image(0x80000, desc, rgba8());
    k.set_arg_image_with_mip_level(0, h, 2).unwrap();
    let s = surface(&k);
    assert_eq!(s.surface_type, SurfaceType::Surface2D);
    assert_eq!(s.min_lod, 2);
    assert_eq!(s.mip_count, 3);
    assert_eq!(read_u32(k.cross_thread_data(), 28), 4);

    k.set_arg(0, 8, h.into()).unwrap();
    assert_eq!(surface(&k).min_lod, 0);
}

#[test]
fn array_images_report_layers() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(false)], 64));
    let mut desc = ImageDesc::new(ImageType::Image2DArray, UVec3::new(32, 32, 1));
    desc.array_size = 6;
    let (h, _image) = f.image(0x80000, desc, rgba8());
    k.set_arg(0, 8, h.into()).unwrap();
    assert_eq!(read_u32(k.cross_thread_data(), 20), 6);
    assert_eq!(read_u32(k.cross_thread_data(), 8), 0);
    let s = surface(&k);
    assert!(s.is_array);
    assert_eq!(s.depth, 5);
}

#[test]
fn media_image_uses_media_surface_state() {
    let f = Fixture::new();
    let arg = ArgDescriptor::image(ImageArg {
        bindful: HeapOffset(64),
        media_image: true,
        ..Default::default()
    });
    let mut k = f.instance(descriptor(vec![arg], 8));
    let format = ImageFormat {
        order: ChannelOrder::Nv12,
        data_type: ChannelType::UnormInt8,
    };
    let (h, _image) = f.image(
        0x90000,
        ImageDesc::new(ImageType::Image2D, UVec3::new(64, 32, 1)),
        format,
    );
    k.set_arg(0, 8, h.into()).unwrap();
    let media = MediaSurfaceState::decode(&k.surface_state_heap().bytes[64..]);
    assert_eq!(media.width, 63);
    assert_eq!(media.height, 31);
    assert_eq!(media.pitch, 63);
    assert_eq!(media.format, kernel_payload::surface::MEDIA_FORMAT_PLANAR_420_8);
    assert_eq!(media.base_address, 0x90000);
}

#[test]
fn transform_3d_image_with_transformable_samplers() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(true), plain_sampler_arg()], 64));
    let (img, _image) = image_3d(&f);
    let (edge, _edge) = f.sampler(Sampler::new(
        false,
        SamplerAddressing::ClampToEdge,
        FilterMode::Nearest,
    ));
    let (repeat, _repeat) = f.sampler(Sampler::new(
        false,
        SamplerAddressing::Repeat,
        FilterMode::Nearest,
    ));

    k.set_arg(0, 8, img.into()).unwrap();
    // not fully bound yet
    k.resolve_args();
    assert_eq!(surface(&k).surface_type, SurfaceType::Surface3D);

    k.set_arg(1, 8, edge.into()).unwrap();
    k.resolve_args();
    let s = surface(&k);
    assert_eq!(s.surface_type, SurfaceType::Surface2D);
    assert!(s.is_array);
    assert_eq!(s.depth, 3);

    k.set_arg(1, 8, repeat.into()).unwrap();
    k.resolve_args();
    let s = surface(&k);
    assert_eq!(s.surface_type, SurfaceType::Surface3D);
    assert!(!s.is_array);
}

#[test]
fn transform_requires_device_support() {
    let f = Fixture::with(
        GenericDevice::default().with_image_transform(false),
        DebugSettings::default(),
    );
    let mut k = f.instance(descriptor(vec![image_arg(true), plain_sampler_arg()], 64));
    let (img, _image) = image_3d(&f);
    let (edge, _edge) = f.sampler(Sampler::new(
        false,
        SamplerAddressing::ClampToEdge,
        FilterMode::Nearest,
    ));
    k.set_arg(0, 8, img.into()).unwrap();
    k.set_arg(1, 8, edge.into()).unwrap();
    k.resolve_args();
    assert_eq!(surface(&k).surface_type, SurfaceType::Surface3D);
}

#[test]
fn non_transformable_image_stays_3d() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![image_arg(false), plain_sampler_arg()], 64));
    let (img, _image) = image_3d(&f);
    let (edge, _edge) = f.sampler(Sampler::new(
        false,
        SamplerAddressing::ClampToEdge,
        FilterMode::Nearest,
    ));
    k.set_arg(0, 8, img.into()).unwrap();
    k.set_arg(1, 8, edge.into()).unwrap();
    k.resolve_args();
    assert_eq!(surface(&k).surface_type, SurfaceType::Surface3D);
}
