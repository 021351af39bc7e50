use std::sync::Arc;

use glam::UVec3;
use kernel_payload::*;

mod common;
use common::*;

fn offsets(base: u16) -> [PayloadOffset; 3] {
    [base, base + 4, base + 8].map(PayloadOffset)
}

#[test]
fn implicit_work_sizes_are_patched() {
    let f = Fixture::new();
    let mut desc = descriptor(vec![], 80);
    desc.implicit = ImplicitArgs {
        global_work_size: offsets(0),
        local_work_size: offsets(12),
        local_work_size2: offsets(24),
        enqueued_local_work_size: offsets(36),
        num_work_groups: offsets(48),
        work_dim: PayloadOffset(60),
        parent_event: PayloadOffset(64),
        ..Default::default()
    };
    let mut k = f.instance(desc);
    let mut params = DispatchParams::new(2, UVec3::new(100, 64, 1), UVec3::new(16, 8, 1));
    params.enqueued_local_size = Some(UVec3::new(32, 8, 1));
    params.parent_event = 0xdead_beef_0000;
    k.set_dispatch_params(&params);

    let p = k.cross_thread_data();
    let vec3 = |base: usize| [0, 4, 8].map(|o| read_u32(p, base + o));
    assert_eq!(vec3(0), [100, 64, 1]);
    assert_eq!(vec3(12), [16, 8, 1]);
    assert_eq!(vec3(24), [4, 8, 1]);
    assert_eq!(vec3(36), [32, 8, 1]);
    assert_eq!(vec3(48), [7, 8, 1]);
    assert_eq!(read_u32(p, 60), 2);
    assert_eq!(read_u64(p, 64), 0xdead_beef_0000);
    assert_eq!(read_u64(p, 72), 0);
}

#[test]
fn implicit_args_out_of_bounds_are_rejected() {
    let f = Fixture::new();
    let mut desc = descriptor(vec![], 8);
    desc.implicit.parent_event = PayloadOffset(4);
    assert!(matches!(
        KernelInstance::new(f.ctx.clone(), Arc::new(desc)).err(),
        Some(DescriptorError::ImplicitOutOfBounds { .. })
    ));
}

#[test]
fn residency_covers_bound_arguments_and_exec_info() {
    let f = Fixture::new();
    let mut k = f.instance(descriptor(
        vec![buffer_arg(0, None), buffer_arg(8, None), buffer_arg(16, None)],
        24,
    ));
    let (h, buffer) = f.buffer(0x1000, 0x100);
    let svm = Arc::new(Allocation::new(AllocationKind::SvmGpu, 0x10000, 0x1000));
    f.registry.register_svm(svm.clone());
    let indirect = Arc::new(Allocation::new(AllocationKind::SvmGpu, 0x20000, 0x1000));

    k.set_arg(0, 8, h.into()).unwrap();
    k.set_arg_svm(1, 0x10100).unwrap();
    k.set_arg(2, 8, h.into()).unwrap();
    k.set_exec_info_svm_allocations([indirect.clone(), svm.clone()]);
    assert_eq!(k.exec_info().len(), 2);

    let ids: Vec<u64> = k.residency().iter().map(|a| a.id).collect();
    let buffer_id = buffer.allocations.get(0).unwrap().id;
    assert_eq!(ids, [buffer_id, svm.id, indirect.id]);

    // released objects drop out of the residency list
    f.registry.release(h);
    drop(buffer);
    let ids: Vec<u64> = k.residency().iter().map(|a| a.id).collect();
    assert_eq!(ids, [svm.id, indirect.id]);
}
