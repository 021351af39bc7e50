use kernel_payload::*;

mod common;
use common::*;

#[test]
fn fully_bound_after_every_argument() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(
        vec![buffer_arg(0, None), value_arg(8, 4), local_arg(12, 4)],
        16,
    ));
    assert!(!k.is_fully_bound());
    let (h, _b) = f.buffer(0x1000, 0x10);
    k.set_arg(0, 8, h.into()).unwrap();
    k.set_arg_value(1, &3u32).unwrap();
    assert_eq!(k.patched_count(), 2);
    assert!(!k.is_fully_bound());
    k.set_arg(2, 64, ArgValue::None).unwrap();
    assert!(k.is_fully_bound());

    // rebinding never counts twice
    k.set_arg_value(1, &4u32).unwrap();
    k.set_arg(0, 8, ArgValue::None).unwrap();
    assert_eq!(k.patched_count(), 3);
    assert!(k.is_fully_bound());
}

#[test]
fn unbind_drops_readiness() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![value_arg(0, 4), value_arg(4, 4)], 8));
    k.set_arg_value(0, &1u32).unwrap();
    k.set_arg_value(1, &2u32).unwrap();
    assert!(k.is_fully_bound());

    k.unset_arg(1).unwrap();
    assert_eq!(k.patched_count(), 1);
    assert!(!k.is_fully_bound());
    let binding = k.binding(1).unwrap();
    assert!(!binding.is_patched);
    assert_eq!(binding.size, 0);
    assert_eq!(binding.kind(), BoundKind::None);

    k.unset_arg(1).unwrap();
    assert_eq!(k.patched_count(), 1);
    k.set_arg_value(1, &2u32).unwrap();
    assert!(k.is_fully_bound());
}

#[test]
fn failed_binds_do_not_count() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(vec![buffer_arg(0, None)], 8));
    assert!(k.set_arg(0, 8, ObjectHandle(77).into()).is_err());
    assert!(k.set_arg(0, 2, ArgValue::None).is_err());
    assert_eq!(k.patched_count(), 0);
    assert!(!k.binding(0).unwrap().is_patched);
}

#[test]
fn num_args_to_patch_limits_readiness() {
    let f = Fixture::new();
    let mut desc = descriptor(vec![value_arg(0, 4), value_arg(4, 4), value_arg(8, 4)], 12);
    desc.num_args_to_patch = Some(2);
    let mut k = f.instance(desc);
    k.set_arg_value(0, &1u32).unwrap();
    k.set_arg_value(2, &1u32).unwrap();
    assert!(k.is_fully_bound());
    k.set_arg_value(1, &1u32).unwrap();
    // exactly the declared count is required
    assert!(!k.is_fully_bound());
}

#[test]
fn descriptor_with_too_many_required_arguments_is_rejected() {
    let f = Fixture::new();
    let mut desc = descriptor(vec![value_arg(0, 4)], 4);
    desc.num_args_to_patch = Some(2);
    let err = KernelInstance::new(f.ctx.clone(), std::sync::Arc::new(desc)).err();
    assert!(matches!(err, Some(DescriptorError::InvalidPatchCount { .. })));
}
