use std::collections::BTreeSet;

use super::{BoundArg, KernelInstance};
use crate::descriptor::ArgKind;

/// Tracks 3D image arguments that may be sampled as 2D arrays.
#[derive(Clone, Debug, Default)]
pub struct ImageTransformer {
    images: BTreeSet<u32>,
    transformed: bool,
}

impl ImageTransformer {
    pub fn register(&mut self, index: u32) {
        self.images.insert(index);
    }
    pub fn unregister(&mut self, index: u32) {
        self.images.remove(&index);
    }
    #[inline]
    pub fn has_registered_images(&self) -> bool {
        !self.images.is_empty()
    }
    #[inline]
    pub fn did_transform(&self) -> bool {
        self.transformed
    }
}

impl KernelInstance {
    /// Last step before dispatch. When every bound sampler reads a 3D image
    /// exactly like a 2D array, registered 3D images are reprogrammed as 2D
    /// arrays; otherwise an earlier transform is undone.
    pub fn resolve_args(&mut self) {
        if !self.is_fully_bound()
            || !self.transformer.has_registered_images()
            || !self.ctx.device.supports_image_transform()
        {
            return;
        }
        let can_transform = self
            .desc
            .args
            .iter()
            .zip(&self.bindings)
            .filter(|(arg, _)| arg.kind == ArgKind::Sampler)
            .all(|(_, binding)| match &binding.bound {
                BoundArg::Sampler(s) => s.is_transformable(),
                _ => true,
            });
        if can_transform {
            self.rewrite_images(true);
            self.transformer.transformed = true;
        } else if self.transformer.transformed {
            self.rewrite_images(false);
            self.transformer.transformed = false;
        }
    }

    fn rewrite_images(&mut self, as_2d_array: bool) {
        let desc = self.desc.clone();
        let indices: Vec<u32> = self.transformer.images.iter().copied().collect();
        for index in indices {
            let i = index as usize;
            let arg = &desc.args[i];
            let BoundArg::Image { image, mip_level } = &self.bindings[i].bound else {
                continue;
            };
            let mip_level = *mip_level;
            let Some(image) = image.upgrade() else {
                continue;
            };
            let root = self.ctx.device.root_device_index();
            let Some(allocation) = image.allocations.get(root).cloned() else {
                continue;
            };
            let Some(offset) = self.heap_offset(arg) else {
                continue;
            };
            let state =
                self.image_surface_state(index, arg, &image, &allocation, mip_level, as_2d_array);
            self.ssh.write(offset, &state);
            log::info!(
                "kernel {}: image argument {} sampled as {}",
                desc.name,
                index,
                if as_2d_array { "2D array" } else { "3D" }
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_unregister() {
        let mut t = ImageTransformer::default();
        assert!(!t.has_registered_images());
        t.register(2);
        t.register(2);
        assert!(t.has_registered_images());
        t.unregister(2);
        assert!(!t.has_registered_images());
        assert!(!t.did_transform());
    }
}
