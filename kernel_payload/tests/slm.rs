use kernel_payload::*;

mod common;
use common::*;

fn slm_kernel(f: &Fixture, alignments: &[u32], static_slm: u32) -> KernelInstance {
    let args = alignments
        .iter()
        .enumerate()
        .map(|(i, a)| local_arg(i as u16 * 4, *a))
        .collect();
    let mut desc = descriptor(args, alignments.len() as u32 * 4);
    desc.slm_inline_size = static_slm;
    f.instance(desc)
}

fn slm_slots(k: &KernelInstance) -> Vec<u32> {
    (0..k.arg_count() as usize)
        .map(|i| read_u32(k.cross_thread_data(), i * 4))
        .collect()
}

#[test]
fn offsets_follow_alignment() {
    let f = Fixture::new();
    let mut k = slm_kernel(&f, &[1, 1024, 1], 0x100);
    assert_eq!(k.slm_total_size(), 0x100);

    k.set_arg(0, 0x200, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x400, 0x400]);
    assert_eq!(k.slm_total_size(), 0x100 + 0x400);

    k.set_arg(1, 0x100, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x400, 0x500]);

    k.set_arg(2, 0x30, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x400, 0x500]);
    assert_eq!(k.slm_total_size(), 0x100 + 0x800);
    assert!(k.is_fully_bound());
}

#[test]
fn growing_an_early_argument_shifts_the_tail() {
    let f = Fixture::new();
    let mut k = slm_kernel(&f, &[1, 1024, 1], 0x100);
    k.set_arg(0, 0x200, ArgValue::None).unwrap();
    k.set_arg(1, 0x100, ArgValue::None).unwrap();
    k.set_arg(2, 0x30, ArgValue::None).unwrap();

    k.set_arg(0, 0x600, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x800, 0x900]);
    assert_eq!(k.slm_offset(2), 0x900);
    assert_eq!(k.slm_total_size(), 0x100 + 0xc00);

    k.set_arg(0, 0x10, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x400, 0x500]);
    assert_eq!(k.slm_total_size(), 0x100 + 0x800);
    assert_eq!(k.patched_count(), 3);
}

#[test]
fn non_local_arguments_are_skipped() {
    let f = Fixture::new();
    let desc = descriptor(vec![local_arg(0, 8), buffer_arg(8, None), local_arg(4, 8)], 16);
    let mut k = f.instance(desc);
    k.set_arg(0, 12, ArgValue::None).unwrap();
    assert_eq!(read_u32(k.cross_thread_data(), 4), 16);
    let (h, _b) = f.buffer(0x1000, 0x100);
    k.set_arg(1, 8, h.into()).unwrap();
    assert_eq!(read_u64(k.cross_thread_data(), 8), 0x1000);
    assert_eq!(read_u32(k.cross_thread_data(), 4), 16);
    k.set_arg(2, 4, ArgValue::None).unwrap();
    assert_eq!(k.slm_total_size(), 1024);
}

#[test]
fn overflow_is_rejected_without_side_effects() {
    let f = Fixture::new();
    let mut k = slm_kernel(&f, &[1, 16], 0);
    k.set_arg(0, 0x100, ArgValue::None).unwrap();
    let payload = k.cross_thread_data().to_vec();

    assert_eq!(
        k.set_arg(0, u32::MAX as usize, ArgValue::None),
        Err(BindError::OutOfResources { index: 0 })
    );
    assert_eq!(k.cross_thread_data(), &payload[..]);
    assert_eq!(k.slm_total_size(), 1024);
    assert_eq!(k.binding(0).unwrap().size, 0x100);
}

#[test]
fn unbinding_a_local_keeps_offsets_until_next_bind() {
    let f = Fixture::new();
    let mut k = slm_kernel(&f, &[4, 4], 0);
    k.set_arg(0, 0x40, ArgValue::None).unwrap();
    k.set_arg(1, 0x40, ArgValue::None).unwrap();
    k.unset_arg(0).unwrap();
    assert_eq!(k.slm_offset(1), 0x40);
    assert!(!k.is_fully_bound());

    k.set_arg(0, 0x80, ArgValue::None).unwrap();
    assert_eq!(slm_slots(&k), [0, 0x80]);
    assert!(k.is_fully_bound());
}
