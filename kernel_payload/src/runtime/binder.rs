//! Per argument kind bind handlers.
//!
//! Every handler validates and resolves its input before writing anything,
//! so a failed bind leaves the argument exactly as it was.
use std::sync::Arc;

use super::{ArgValue, BoundArg, KernelInstance};
use crate::descriptor::{ArgDescriptor, ArgKind, PointerArg, SamplerType};
use crate::dynamic_state::{SamplerState, SAMPLER_OBJECT_ID_SHIFT};
use crate::error::{BindError, Result};
use crate::immediate::Immediate;
use crate::policy::{ObjectPolicy, SurfaceStateArgs};
use crate::resource::*;
use crate::surface::{
    AuxMode, MediaSurfaceState, SurfaceState, SurfaceType, MEDIA_FORMAT_PLANAR_420_8,
    MEDIA_FORMAT_Y8_UNORM, SURFACE_FORMAT_R32_UINT, SURFACE_STATE_SIZE,
};

fn check_handle_size(index: u32, kind: ArgKind, size: usize) -> Result<()> {
    if size == ObjectHandle::SIZE {
        Ok(())
    } else {
        Err(BindError::InvalidSize {
            index,
            kind,
            expected: ObjectHandle::SIZE,
            actual: size,
        })
    }
}

fn handle_of(index: u32, kind: ArgKind, value: ArgValue<'_>) -> Result<ObjectHandle> {
    value.handle().ok_or(BindError::InvalidValue { index, kind })
}

fn pointer_layout(arg: &ArgDescriptor, index: u32) -> Result<&PointerArg> {
    arg.as_pointer().ok_or(BindError::InvalidValue {
        index,
        kind: arg.kind,
    })
}

fn object_policy(flags: MemFlags, allocation: &Allocation) -> ObjectPolicy {
    ObjectPolicy {
        read_only: flags.read_only,
        uncacheable: flags.uncacheable,
        compressed: allocation.compressed,
    }
}

impl KernelInstance {
    fn finish_bind(
        &mut self,
        index: u32,
        size: usize,
        bound: BoundArg,
        flush: Option<Arc<Allocation>>,
        stateless_uncacheable: bool,
    ) {
        let i = index as usize;
        let kind = bound.kind();
        let binding = &mut self.bindings[i];
        binding.bound = bound;
        binding.size = size;
        self.readiness.on_bind(binding);
        self.readiness
            .set_stateless_uncacheable(binding, stateless_uncacheable);
        self.flush.set(i, flush);
        log::debug!("kernel {}: bound argument {} as {:?}", self.desc.name, index, kind);
    }

    /// Patches a device address into the stateless slot. When the kernel
    /// declares a buffer offset slot the address is split into a dword
    /// aligned base and the residual byte offset.
    fn patch_pointer(&mut self, ptr: &PointerArg, address: u64) {
        if !self.addressing_mode.patches_stateless() {
            return;
        }
        let (base, residual) = if ptr.buffer_offset.is_defined() {
            (address & !3, (address & 3) as u32)
        } else {
            (address, 0)
        };
        self.payload
            .patch_with_required_size(ptr.stateless, ptr.pointer_size as usize, base);
        self.payload.patch(ptr.buffer_offset, residual);
    }

    /// Heap offset of the surface state for `arg` under the instance's
    /// addressing mode.
    pub(super) fn heap_offset(&self, arg: &ArgDescriptor) -> Option<usize> {
        if self.addressing_mode.is_bindless() {
            let slot = arg.bindless();
            if !slot.is_defined() {
                return None;
            }
            let surface = self.desc.heaps.bindless_surfaces.get(&slot.0)?;
            Some(*surface as usize * SURFACE_STATE_SIZE)
        } else {
            arg.bindful().get()
        }
    }

    /// Like `heap_offset`, but bindless arguments also get the offset
    /// written into their payload slot.
    fn surface_offset(&mut self, arg: &ArgDescriptor) -> Option<usize> {
        let offset = self.heap_offset(arg)?;
        if self.addressing_mode.is_bindless() {
            self.payload.patch(arg.bindless(), offset as u32);
        }
        Some(offset)
    }

    fn write_buffer_surface(
        &mut self,
        index: u32,
        arg: &ArgDescriptor,
        address: u64,
        size: u64,
        object: ObjectPolicy,
    ) {
        if !self.addressing_mode.has_stateful_buffers() {
            return;
        }
        let Some(offset) = self.surface_offset(arg) else {
            return;
        };
        let policy =
            SurfaceStateArgs::resolve(index, arg, object, self.aux_direction, &self.ctx.settings);
        let mocs = self.ctx.device.mocs(policy.cache_usage());
        self.ssh
            .write(offset, &SurfaceState::buffer(address, size, mocs, policy.aux_mode()));
    }

    fn write_null_surface(&mut self, arg: &ArgDescriptor) {
        if !self.addressing_mode.has_stateful_buffers() {
            return;
        }
        if let Some(offset) = self.surface_offset(arg) {
            self.ssh.write(offset, &SurfaceState::null());
        }
    }

    pub(super) fn set_arg_buffer(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        check_handle_size(index, ArgKind::Buffer, size)?;
        let handle = handle_of(index, ArgKind::Buffer, value)?;
        if handle.is_null() {
            return self.bind_buffer(index, size, handle, None);
        }
        match self.ctx.memory.resolve(handle) {
            Some(Object::Buffer(buffer)) => self.bind_buffer(index, size, handle, Some(buffer)),
            _ => Err(BindError::InvalidMemObject {
                index,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_buffer(
        &mut self,
        index: u32,
        size: usize,
        handle: ObjectHandle,
        buffer: Option<Arc<Buffer>>,
    ) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let ptr = pointer_layout(arg, index)?;
        let Some(buffer) = buffer else {
            self.patch_pointer(ptr, 0);
            self.write_null_surface(arg);
            self.finish_bind(index, size, BoundArg::Buffer(None), None, false);
            return Ok(());
        };
        let root = self.ctx.device.root_device_index();
        let allocation = buffer
            .allocations
            .get(root)
            .cloned()
            .ok_or(BindError::InvalidMemObject {
                index,
                handle: handle.0,
            })?;
        let address = allocation.gpu_address.saturating_add(buffer.offset);
        self.patch_pointer(ptr, address);
        self.write_buffer_surface(
            index,
            arg,
            address,
            buffer.size,
            object_policy(buffer.flags, &allocation),
        );
        let uncacheable = buffer.flags.uncacheable && ptr.stateless.is_defined();
        self.finish_bind(
            index,
            size,
            BoundArg::Buffer(Some(Arc::downgrade(&buffer))),
            Some(allocation),
            uncacheable,
        );
        Ok(())
    }

    pub(super) fn set_arg_image(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        self.set_arg_image_impl(index, size, value, None)
    }

    /// Binds an image whose sampling starts at `mip_level`.
    pub fn set_arg_image_with_mip_level(
        &mut self,
        index: u32,
        handle: ObjectHandle,
        mip_level: u32,
    ) -> Result<()> {
        let i = self.check_index(index)?;
        let kind = self.desc.args[i].kind;
        if kind != ArgKind::Image {
            return Err(BindError::InvalidValue { index, kind });
        }
        self.set_arg_image_impl(index, ObjectHandle::SIZE, ArgValue::Handle(handle), Some(mip_level))
    }

    fn set_arg_image_impl(
        &mut self,
        index: u32,
        size: usize,
        value: ArgValue<'_>,
        mip_level: Option<u32>,
    ) -> Result<()> {
        check_handle_size(index, ArgKind::Image, size)?;
        let handle = handle_of(index, ArgKind::Image, value)?;
        match self.ctx.memory.resolve(handle) {
            Some(Object::Image(image)) => self.bind_image(index, size, handle, image, mip_level),
            _ => Err(BindError::InvalidMemObject {
                index,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_image(
        &mut self,
        index: u32,
        size: usize,
        handle: ObjectHandle,
        image: Arc<Image>,
        mip_level: Option<u32>,
    ) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let layout = arg.as_image().ok_or(BindError::InvalidValue {
            index,
            kind: arg.kind,
        })?;
        let root = self.ctx.device.root_device_index();
        let allocation = image
            .allocations
            .get(root)
            .cloned()
            .ok_or(BindError::InvalidMemObject {
                index,
                handle: handle.0,
            })?;

        let m = &layout.metadata;
        let extent = image.desc.extent;
        let p = &mut self.payload;
        p.patch(m.img_width, extent.x);
        p.patch(m.img_height, extent.y);
        p.patch(m.img_depth, image.depth());
        p.patch(m.channel_data_type, image.format.data_type as u32);
        p.patch(m.channel_order, image.format.order as u32);
        p.patch(m.array_size, image.array_size());
        p.patch(m.num_samples, image.desc.num_samples);
        p.patch(m.num_mip_levels, image.desc.num_mip_levels);
        p.patch(m.flat_base_offset, allocation.gpu_address);
        p.patch(m.flat_width, (extent.x * image.element_size()).saturating_sub(1));
        p.patch(m.flat_height, extent.y.saturating_sub(1));
        p.patch(m.flat_pitch, image.desc.row_pitch.saturating_sub(1));

        let heap_offset = self.surface_offset(arg);
        self.payload.patch(m.object_id, heap_offset.unwrap_or(0) as u32);
        if let Some(offset) = heap_offset {
            if layout.media_image {
                let state = self.media_surface_state(index, arg, &image, &allocation);
                self.ssh.write_media(offset, &state);
            } else {
                let state = self.image_surface_state(index, arg, &image, &allocation, mip_level, false);
                self.ssh.write(offset, &state);
            }
        }
        if layout.transformable && image.desc.image_type == ImageType::Image3D {
            self.transformer.register(index);
        } else {
            self.transformer.unregister(index);
        }
        self.finish_bind(
            index,
            size,
            BoundArg::Image {
                image: Arc::downgrade(&image),
                mip_level,
            },
            Some(allocation),
            false,
        );
        Ok(())
    }

    fn image_policy(&self, index: u32, arg: &ArgDescriptor, image: &Image, allocation: &Allocation) -> (SurfaceStateArgs, u32) {
        let policy = SurfaceStateArgs::resolve(
            index,
            arg,
            object_policy(image.flags, allocation),
            self.aux_direction,
            &self.ctx.settings,
        );
        let mocs = self.ctx.device.mocs(policy.cache_usage());
        (policy, mocs)
    }

    /// Surface state of an image. 3D images are described as 2D arrays with
    /// one layer per slice when `as_2d_array` is set.
    pub(super) fn image_surface_state(
        &self,
        index: u32,
        arg: &ArgDescriptor,
        image: &Image,
        allocation: &Allocation,
        mip_level: Option<u32>,
        as_2d_array: bool,
    ) -> SurfaceState {
        let (policy, mocs) = self.image_policy(index, arg, image, allocation);
        let d = &image.desc;
        let (surface_type, is_array, depth) = match d.image_type {
            ImageType::Image1D | ImageType::Image1DBuffer => (SurfaceType::Surface1D, false, 0),
            ImageType::Image1DArray => (SurfaceType::Surface1D, true, d.array_size.saturating_sub(1)),
            ImageType::Image2D => (SurfaceType::Surface2D, false, 0),
            ImageType::Image2DArray => (SurfaceType::Surface2D, true, d.array_size.saturating_sub(1)),
            ImageType::Image3D if as_2d_array => {
                (SurfaceType::Surface2D, true, d.extent.z.saturating_sub(1))
            }
            ImageType::Image3D => (SurfaceType::Surface3D, false, d.extent.z.saturating_sub(1)),
        };
        let media_block = arg.as_image().map_or(false, |l| l.media_block_image);
        let (width, format) = if media_block {
            // media block reads address the surface in dwords
            (
                (d.extent.x * image.element_size() / 4).max(1) - 1,
                SURFACE_FORMAT_R32_UINT,
            )
        } else {
            (d.extent.x.max(1) - 1, image.format.surface_format())
        };
        let aux_mode = policy.aux_mode();
        SurfaceState {
            surface_type,
            format,
            is_array,
            mocs,
            width,
            height: d.extent.y.max(1) - 1,
            depth,
            pitch: d.row_pitch.max(1) - 1,
            min_array_element: 0,
            render_target_view_extent: depth,
            multisample_count: d.num_samples.max(1).trailing_zeros(),
            mip_count: d.num_mip_levels.max(1) - 1,
            min_lod: mip_level.unwrap_or(image.base_mip_level),
            aux_mode,
            compression_enabled: aux_mode != AuxMode::None,
            base_address: allocation.gpu_address,
            aux_base_address: 0,
        }
    }

    fn media_surface_state(
        &self,
        index: u32,
        arg: &ArgDescriptor,
        image: &Image,
        allocation: &Allocation,
    ) -> MediaSurfaceState {
        let (_, mocs) = self.image_policy(index, arg, image, allocation);
        let d = &image.desc;
        MediaSurfaceState {
            width: d.extent.x.max(1) - 1,
            height: d.extent.y.max(1) - 1,
            pitch: d.row_pitch.max(1) - 1,
            format: match image.format.order {
                ChannelOrder::Nv12 => MEDIA_FORMAT_PLANAR_420_8,
                _ => MEDIA_FORMAT_Y8_UNORM,
            },
            mocs,
            base_address: allocation.gpu_address,
        }
    }

    pub(super) fn set_arg_sampler(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        check_handle_size(index, ArgKind::Sampler, size)?;
        let handle = handle_of(index, ArgKind::Sampler, value)?;
        match self.ctx.memory.resolve(handle) {
            Some(Object::Sampler(sampler)) => self.bind_sampler(index, size, sampler),
            _ => Err(BindError::InvalidObject {
                index,
                expected: ArgKind::Sampler,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_sampler(&mut self, index: u32, size: usize, sampler: Arc<Sampler>) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let layout = arg.as_sampler().ok_or(BindError::InvalidValue {
            index,
            kind: arg.kind,
        })?;
        let dsh_offset = layout.bindful.get();
        if let Some(offset) = dsh_offset {
            self.dsh.write(offset, &SamplerState::from_sampler(&sampler));
        }
        let m = &layout.metadata;
        self.payload.patch(m.snap_wa, sampler.snap_wa_value());
        self.payload
            .patch(m.addressing_mode, sampler.addressing.payload_value());
        self.payload
            .patch(m.normalized_coords, sampler.normalized_coords_value());
        self.payload.patch(
            m.object_id,
            SAMPLER_OBJECT_ID_SHIFT + dsh_offset.unwrap_or(0) as u32,
        );
        self.payload
            .patch(layout.bindless, dsh_offset.unwrap_or(0) as u32);
        // the previously bound sampler, if any, is released here
        self.finish_bind(index, size, BoundArg::Sampler(sampler), None, false);
        Ok(())
    }

    pub(super) fn set_arg_pipe(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        check_handle_size(index, ArgKind::Pipe, size)?;
        let handle = handle_of(index, ArgKind::Pipe, value)?;
        match self.ctx.memory.resolve(handle) {
            Some(Object::Pipe(pipe)) => self.bind_pipe(index, size, handle, pipe),
            _ => Err(BindError::InvalidObject {
                index,
                expected: ArgKind::Pipe,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_pipe(
        &mut self,
        index: u32,
        size: usize,
        handle: ObjectHandle,
        pipe: Arc<Pipe>,
    ) -> Result<()> {
        let invalid = BindError::InvalidMemObject {
            index,
            handle: handle.0,
        };
        if pipe.context != self.ctx.id {
            return Err(invalid);
        }
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let ptr = pointer_layout(arg, index)?;
        let root = self.ctx.device.root_device_index();
        let allocation = pipe.allocations.get(root).cloned().ok_or(invalid)?;
        self.patch_pointer(ptr, allocation.gpu_address);
        self.write_buffer_surface(
            index,
            arg,
            allocation.gpu_address,
            allocation.size,
            object_policy(MemFlags::default(), &allocation),
        );
        self.finish_bind(
            index,
            size,
            BoundArg::Pipe(Arc::downgrade(&pipe)),
            Some(allocation),
            false,
        );
        Ok(())
    }

    pub(super) fn set_arg_local(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        if !matches!(value, ArgValue::None) {
            return Err(BindError::InvalidValue {
                index,
                kind: ArgKind::Local,
            });
        }
        if size == 0 {
            return Err(BindError::InvalidSize {
                index,
                kind: ArgKind::Local,
                expected: 1,
                actual: 0,
            });
        }
        let size = u32::try_from(size).map_err(|_| BindError::OutOfResources { index })?;
        self.bind_local(index, size)
    }

    pub(super) fn bind_local(&mut self, index: u32, size: u32) -> Result<()> {
        let update = self.slm.set_local_size(index, size)?;
        let desc = self.desc.clone();
        for (i, offset) in update.offsets {
            if let Some(ptr) = desc.args[i as usize].as_pointer() {
                self.payload.patch(ptr.slm_offset, offset);
            }
        }
        log::trace!(
            "kernel {}: slm total {:#x} after argument {}",
            desc.name,
            update.total,
            index
        );
        self.finish_bind(index, size as usize, BoundArg::Local(size), None, false);
        Ok(())
    }

    pub(super) fn set_arg_accelerator(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        check_handle_size(index, ArgKind::Accelerator, size)?;
        let handle = handle_of(index, ArgKind::Accelerator, value)?;
        match self.ctx.memory.resolve(handle) {
            Some(Object::Accelerator(accelerator)) => self.bind_accelerator(index, size, accelerator),
            _ => Err(BindError::InvalidObject {
                index,
                expected: ArgKind::Accelerator,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_accelerator(
        &mut self,
        index: u32,
        size: usize,
        accelerator: Arc<Accelerator>,
    ) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let layout = arg.as_sampler().ok_or(BindError::InvalidValue {
            index,
            kind: arg.kind,
        })?;
        match (*accelerator, layout.sampler_type) {
            (Accelerator::MotionEstimation(vme), SamplerType::Vme) => {
                if let Some(slots) = &layout.vme {
                    self.payload.patch(slots.mb_block_type, vme.mb_block_type);
                    self.payload.patch(slots.subpixel_mode, vme.subpixel_mode);
                    self.payload.patch(slots.sad_adjust_mode, vme.sad_adjust_mode);
                    self.payload.patch(slots.search_path_type, vme.search_path_type);
                }
            }
            (Accelerator::VideoEnhancement, SamplerType::Ve) => {}
            (accelerator, sampler_type) => log::warn!(
                "kernel {}: {:?} bound to {:?} argument {}, nothing patched",
                desc.name,
                accelerator,
                sampler_type,
                index
            ),
        }
        self.finish_bind(
            index,
            size,
            BoundArg::Accelerator(Arc::downgrade(&accelerator)),
            None,
            false,
        );
        Ok(())
    }

    pub(super) fn set_arg_device_queue(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        check_handle_size(index, ArgKind::DeviceQueue, size)?;
        let handle = handle_of(index, ArgKind::DeviceQueue, value)?;
        match self.ctx.memory.resolve(handle) {
            Some(Object::DeviceQueue(queue)) => self.bind_device_queue(index, size, queue),
            _ => Err(BindError::InvalidDeviceQueue {
                index,
                handle: handle.0,
            }),
        }
    }

    pub(super) fn bind_device_queue(&mut self, index: u32, size: usize, queue: Arc<DeviceQueue>) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let ptr = pointer_layout(arg, index)?;
        self.payload.patch_with_required_size(
            ptr.stateless,
            ptr.pointer_size as usize,
            queue.queue_buffer.gpu_address,
        );
        self.finish_bind(
            index,
            size,
            BoundArg::DeviceQueue(Arc::downgrade(&queue)),
            None,
            false,
        );
        Ok(())
    }

    /// Binds a shared virtual memory pointer. The allocation backing it is
    /// looked up through the memory manager and added to the exec info.
    pub fn set_arg_svm(&mut self, index: u32, ptr: u64) -> Result<()> {
        let i = self.check_index(index)?;
        pointer_layout(&self.desc.args[i], index)?;
        let allocation = self.ctx.memory.find_svm_allocation(ptr);
        self.bind_svm(index, ptr, allocation, false)
    }

    /// Binds a pointer into a caller supplied allocation.
    pub fn set_arg_svm_alloc(
        &mut self,
        index: u32,
        ptr: u64,
        allocation: Option<Arc<Allocation>>,
    ) -> Result<()> {
        let i = self.check_index(index)?;
        pointer_layout(&self.desc.args[i], index)?;
        self.bind_svm(index, ptr, allocation, true)
    }

    pub(super) fn bind_svm(
        &mut self,
        index: u32,
        ptr: u64,
        allocation: Option<Arc<Allocation>>,
        explicit: bool,
    ) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let layout = pointer_layout(arg, index)?;
        self.patch_pointer(layout, ptr);
        match &allocation {
            Some(a) => {
                let size = a.gpu_address.saturating_add(a.size).saturating_sub(ptr);
                self.write_buffer_surface(
                    index,
                    arg,
                    ptr,
                    size,
                    object_policy(MemFlags::default(), a),
                );
                self.exec_info.push(a.clone());
            }
            None => self.write_null_surface(arg),
        }
        let weak = allocation.as_ref().map(Arc::downgrade);
        let bound = if explicit {
            BoundArg::SvmAlloc {
                ptr,
                allocation: weak,
            }
        } else {
            BoundArg::Svm {
                ptr,
                allocation: weak,
            }
        };
        self.finish_bind(index, layout.pointer_size as usize, bound, allocation, false);
        Ok(())
    }

    pub(super) fn set_arg_immediate(&mut self, index: u32, size: usize, value: ArgValue<'_>) -> Result<()> {
        let kind = ArgKind::Immediate;
        let ArgValue::Bytes(bytes) = value else {
            return Err(BindError::InvalidValue { index, kind });
        };
        let declared = self.desc.args[index as usize]
            .as_value()
            .map_or(0, |v| v.size as usize);
        let expected = if declared != 0 { declared } else { bytes.len() };
        if size != expected || bytes.len() != size {
            return Err(BindError::InvalidSize {
                index,
                kind,
                expected,
                actual: size,
            });
        }
        self.bind_immediate(index, bytes)
    }

    /// Copies each element's slice of `bytes` into its payload location.
    /// Elements whose source offset lies past the end of `bytes` are left
    /// untouched.
    pub(super) fn bind_immediate(&mut self, index: u32, bytes: &[u8]) -> Result<()> {
        let desc = self.desc.clone();
        let arg = &desc.args[index as usize];
        let layout = arg.as_value().ok_or(BindError::InvalidValue {
            index,
            kind: arg.kind,
        })?;
        for e in &layout.elements {
            let src = e.source_offset as usize;
            if !e.offset.is_defined() || src >= bytes.len() {
                continue;
            }
            let n = (e.size as usize).min(bytes.len() - src);
            self.payload
                .patch_bytes(e.offset.0 as usize, &bytes[src..src + n]);
        }
        self.finish_bind(index, bytes.len(), BoundArg::Immediate(bytes.to_vec()), None, false);
        Ok(())
    }

    /// Binds any [`Immediate`] value by its byte encoding.
    pub fn set_arg_value<T: Immediate>(&mut self, index: u32, value: &T) -> Result<()> {
        let bytes = value.to_bytes();
        self.set_arg(index, bytes.len(), ArgValue::Bytes(&bytes))
    }
}
