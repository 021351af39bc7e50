use std::sync::Arc;

use super::{BoundArg, KernelInstance};
use crate::error::{BindError, Result};
use crate::resource::ObjectHandle;

impl KernelInstance {
    fn same_descriptor(&self, other: &KernelInstance) -> bool {
        Arc::ptr_eq(&self.desc, &other.desc) || self.desc.fingerprint() == other.desc.fingerprint()
    }

    /// A fresh instance with the same bindings, sharing this instance's
    /// context and descriptor.
    pub fn try_clone(&self) -> Result<KernelInstance> {
        let mut target = KernelInstance::fresh(self.ctx.clone(), self.desc.clone());
        self.clone_into(&mut target)?;
        Ok(target)
    }

    /// Replaces the state of `target` with a copy of this instance. The
    /// payload and heaps are copied verbatim, then every bound argument is
    /// bound again on the target so samplers are retained and per-instance
    /// bookkeeping is rebuilt. `target` keeps its own context.
    pub fn clone_into(&self, target: &mut KernelInstance) -> Result<()> {
        if !self.same_descriptor(target) {
            return Err(BindError::InvalidKernel);
        }
        let mut fresh = KernelInstance::fresh(target.ctx.clone(), target.desc.clone());
        fresh.aux_direction = self.aux_direction;
        fresh.payload = self.payload.clone();
        fresh.ssh = self.ssh.clone();
        fresh.dsh = self.dsh.clone();
        fresh.exec_info = self.exec_info.clone();

        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.size == 0 {
                continue;
            }
            let index = i as u32;
            let size = binding.size;
            let null = ObjectHandle::NULL;
            let dropped = || -> Result<()> {
                log::warn!(
                    "kernel {}: object bound to argument {} no longer exists, not cloned",
                    self.desc.name,
                    index
                );
                Ok(())
            };
            match &binding.bound {
                BoundArg::None => Ok(()),
                BoundArg::Buffer(None) => fresh.bind_buffer(index, size, null, None),
                BoundArg::Buffer(Some(b)) => match b.upgrade() {
                    Some(b) => fresh.bind_buffer(index, size, null, Some(b)),
                    None => dropped(),
                },
                BoundArg::Image { image, mip_level } => match image.upgrade() {
                    Some(image) => fresh.bind_image(index, size, null, image, *mip_level),
                    None => dropped(),
                },
                BoundArg::Sampler(s) => fresh.bind_sampler(index, size, s.clone()),
                BoundArg::Pipe(p) => match p.upgrade() {
                    Some(p) => fresh.bind_pipe(index, size, null, p),
                    None => dropped(),
                },
                BoundArg::Local(slm) => fresh.bind_local(index, *slm),
                BoundArg::Accelerator(a) => match a.upgrade() {
                    Some(a) => fresh.bind_accelerator(index, size, a),
                    None => dropped(),
                },
                BoundArg::DeviceQueue(q) => match q.upgrade() {
                    Some(q) => fresh.bind_device_queue(index, size, q),
                    None => dropped(),
                },
                BoundArg::Svm { ptr, allocation } => {
                    fresh.bind_svm(index, *ptr, allocation.as_ref().and_then(|a| a.upgrade()), false)
                }
                BoundArg::SvmAlloc { ptr, allocation } => {
                    fresh.bind_svm(index, *ptr, allocation.as_ref().and_then(|a| a.upgrade()), true)
                }
                BoundArg::Immediate(bytes) => fresh.bind_immediate(index, bytes),
            }?;
        }
        *target = fresh;
        Ok(())
    }
}
