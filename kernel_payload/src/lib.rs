//! Kernel argument binding and dispatch payload layout.
//!
//! A [`KernelInstance`] turns user supplied argument values into the bytes a
//! GPU reads at dispatch time: the cross-thread data payload, surface states
//! in the surface state heap and sampler states in the dynamic state heap.
pub mod descriptor;
pub mod device;
pub mod dynamic_state;
pub mod error;
pub mod immediate;
pub mod payload;
pub mod policy;
pub mod resource;
pub mod runtime;
pub mod slm;
pub mod surface;

pub use half::f16;
pub use glam;

pub mod prelude {
    pub use crate::descriptor::{AddressingMode, ArgKind, KernelDescriptor};
    pub use crate::device::{DeviceContext, GenericDevice};
    pub use crate::error::{BindError, DescriptorError};
    pub use crate::immediate::Immediate;
    pub use crate::resource::{MemoryManager, ObjectHandle, ObjectRegistry};
    pub use crate::runtime::{ArgValue, Context, KernelInstance};
    pub use kernel_payload_derive::Immediate;
}

pub use descriptor::*;
pub use device::*;
pub use error::{BindError, DescriptorError, Result};
pub use immediate::Immediate;
pub use kernel_payload_derive::*;
pub use policy::*;
pub use resource::*;
pub use runtime::*;

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();
}

pub fn init_logger_verbose() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .format_timestamp_secs()
        .init();
}
