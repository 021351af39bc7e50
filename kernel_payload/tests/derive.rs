use glam::UVec2;
use kernel_payload::*;
use rand::prelude::*;

mod common;
use common::*;

#[derive(Immediate, Clone, Copy, Debug)]
#[repr(C)]
struct BlendParams {
    alpha: f32,
    origin: UVec2,
    enabled: u32,
}

#[derive(Immediate)]
#[repr(C, align(16))]
struct Padded {
    weight: f16,
}

fn blend_kernel(f: &Fixture) -> KernelInstance {
    let elements = [(0, 4, 0), (8, 8, 4), (16, 4, 12)]
        .map(|(offset, size, source_offset)| ValueElement {
            offset: PayloadOffset(offset),
            size,
            source_offset,
        })
        .to_vec();
    f.instance(descriptor(vec![ArgDescriptor::value(ValueArg { size: 16, elements })], 20))
}

#[test]
fn derived_struct_scatters_into_payload() {
    let f = Fixture::new();
    let mut k = blend_kernel(&f);
    let params = BlendParams {
        alpha: 0.25,
        origin: UVec2::new(3, 9),
        enabled: 1,
    };
    k.set_arg_value(0, &params).unwrap();
    let p = k.cross_thread_data();
    assert_eq!(read_u32(p, 0), 0.25f32.to_bits());
    assert_eq!(read_u32(p, 4), 0);
    assert_eq!(read_u32(p, 8), 3);
    assert_eq!(read_u32(p, 12), 9);
    assert_eq!(read_u32(p, 16), 1);
}

#[test]
fn random_values_land_where_declared() {
    let f = Fixture::new();
    let mut k = blend_kernel(&f);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..64 {
        let params = BlendParams {
            alpha: rng.gen(),
            origin: UVec2::new(rng.gen(), rng.gen()),
            enabled: rng.gen_range(0..2),
        };
        k.set_arg_value(0, &params).unwrap();
        let p = k.cross_thread_data();
        assert_eq!(read_u32(p, 0), params.alpha.to_bits());
        assert_eq!(read_u32(p, 8), params.origin.x);
        assert_eq!(read_u32(p, 12), params.origin.y);
        assert_eq!(read_u32(p, 16), params.enabled);
    }
    assert_eq!(k.patched_count(), 1);
}

#[test]
fn aligned_struct_keeps_tail_padding() {
    let bytes = Padded {
        weight: f16::from_f32(2.0),
    }
    .to_bytes();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..2], &f16::from_f32(2.0).to_le_bytes());
    assert!(bytes[2..].iter().all(|b| *b == 0));
}
