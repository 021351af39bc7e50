use crate::descriptor::AddressingMode;
use crate::policy::CacheUsage;

/// What the binder needs to know about the device a kernel instance
/// targets.
pub trait DeviceContext: Send + Sync {
    /// Selects which per-device allocation of a memory object is bound.
    fn root_device_index(&self) -> u32;
    /// Addressing mode used for kernels whose descriptor does not pin one.
    fn addressing_mode(&self) -> AddressingMode;
    /// Memory object control state index for a cache policy.
    fn mocs(&self, usage: CacheUsage) -> u32;
    /// Whether 3D images may be sampled as 2D arrays.
    fn supports_image_transform(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct GenericDevice {
    pub root_device_index: u32,
    pub addressing_mode: AddressingMode,
    pub supports_image_transform: bool,
}

impl Default for GenericDevice {
    fn default() -> Self {
        Self {
            root_device_index: 0,
            addressing_mode: AddressingMode::BindfulAndStateless,
            supports_image_transform: true,
        }
    }
}

impl GenericDevice {
    pub fn with_root_device_index(mut self, index: u32) -> Self {
        self.root_device_index = index;
        self
    }
    pub fn with_addressing_mode(mut self, mode: AddressingMode) -> Self {
        self.addressing_mode = mode;
        self
    }
    pub fn with_image_transform(mut self, supported: bool) -> Self {
        self.supports_image_transform = supported;
        self
    }
}

impl DeviceContext for GenericDevice {
    fn root_device_index(&self) -> u32 {
        self.root_device_index
    }
    fn addressing_mode(&self) -> AddressingMode {
        self.addressing_mode
    }
    fn mocs(&self, usage: CacheUsage) -> u32 {
        match usage {
            CacheUsage::Default => 2,
            CacheUsage::ReadOnly => 3,
            CacheUsage::L3Disabled => 1,
            CacheUsage::Uncached => 0,
        }
    }
    fn supports_image_transform(&self) -> bool {
        self.supports_image_transform
    }
}
