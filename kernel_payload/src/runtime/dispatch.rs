use std::collections::HashSet;
use std::sync::Arc;

use glam::UVec3;

use super::{BoundArg, KernelInstance};
use crate::resource::Allocation;

/// The NDRange of one enqueue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DispatchParams {
    pub work_dim: u32,
    pub global_size: UVec3,
    pub local_size: UVec3,
    pub global_offset: UVec3,
    /// Local size as requested by the user, when it differs from the one
    /// the dispatch actually uses.
    pub enqueued_local_size: Option<UVec3>,
    pub parent_event: u64,
}

impl DispatchParams {
    pub fn new(work_dim: u32, global_size: UVec3, local_size: UVec3) -> Self {
        Self {
            work_dim,
            global_size,
            local_size,
            global_offset: UVec3::ZERO,
            enqueued_local_size: None,
            parent_event: 0,
        }
    }
    pub fn num_work_groups(&self) -> UVec3 {
        let local = self.local_size.max(UVec3::ONE);
        (self.global_size + local - UVec3::ONE) / local
    }
    /// Size of the trailing partial work group in each dimension.
    pub fn local_size2(&self) -> UVec3 {
        let local = self.local_size.max(UVec3::ONE);
        let rem = self.global_size % local;
        UVec3::select(rem.cmpeq(UVec3::ZERO), local, rem)
    }
}

/// Allocations the kernel may reach through pointers that are not bound as
/// arguments. Kept in insertion order without duplicates.
#[derive(Clone, Debug, Default)]
pub struct ExecInfo {
    allocations: Vec<Arc<Allocation>>,
}

impl ExecInfo {
    pub fn push(&mut self, allocation: Arc<Allocation>) -> bool {
        if self.allocations.iter().any(|a| a.id == allocation.id) {
            false
        } else {
            self.allocations.push(allocation);
            true
        }
    }
    #[inline]
    pub fn allocations(&self) -> &[Arc<Allocation>] {
        &self.allocations
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

impl KernelInstance {
    /// Patches the implicit work size arguments for one enqueue.
    pub fn set_dispatch_params(&mut self, params: &DispatchParams) {
        let implicit = &self.desc.implicit;
        let p = &mut self.payload;
        let enqueued = params.enqueued_local_size.unwrap_or(params.local_size);
        let groups = params.num_work_groups();
        let local2 = params.local_size2();
        for i in 0..3 {
            p.patch(implicit.global_work_size[i], params.global_size[i]);
            p.patch(implicit.local_work_size[i], params.local_size[i]);
            p.patch(implicit.local_work_size2[i], local2[i]);
            p.patch(implicit.enqueued_local_work_size[i], enqueued[i]);
            p.patch(implicit.global_work_offset[i], params.global_offset[i]);
            p.patch(implicit.num_work_groups[i], groups[i]);
        }
        p.patch(implicit.work_dim, params.work_dim);
        p.patch(implicit.parent_event, params.parent_event);
    }

    /// Adds allocations reachable through indirect pointers.
    pub fn set_exec_info_svm_allocations(&mut self, allocations: impl IntoIterator<Item = Arc<Allocation>>) {
        for a in allocations {
            self.exec_info.push(a);
        }
    }

    #[inline]
    pub fn exec_info(&self) -> &ExecInfo {
        &self.exec_info
    }

    /// Every allocation the encoder must make resident for this dispatch:
    /// the allocations behind bound arguments on this instance's root
    /// device, then the exec info.
    pub fn residency(&self) -> Vec<Arc<Allocation>> {
        let root = self.ctx.device.root_device_index();
        let mut seen = HashSet::new();
        let mut out = vec![];
        let mut push = |a: Arc<Allocation>| {
            if seen.insert(a.id) {
                out.push(a);
            }
        };
        for binding in &self.bindings {
            let allocation = match &binding.bound {
                BoundArg::Buffer(Some(b)) => b.upgrade().and_then(|b| b.allocations.get(root).cloned()),
                BoundArg::Image { image, .. } => image
                    .upgrade()
                    .and_then(|i| i.allocations.get(root).cloned()),
                BoundArg::Pipe(p) => p.upgrade().and_then(|p| p.allocations.get(root).cloned()),
                BoundArg::DeviceQueue(q) => q.upgrade().map(|q| q.queue_buffer.clone()),
                BoundArg::Svm { allocation, .. } | BoundArg::SvmAlloc { allocation, .. } => {
                    allocation.as_ref().and_then(|a| a.upgrade())
                }
                _ => None,
            };
            if let Some(a) = allocation {
                push(a);
            }
        }
        for a in self.exec_info.allocations() {
            push(a.clone());
        }
        out
    }
}
