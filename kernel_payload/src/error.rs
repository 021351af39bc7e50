use thiserror::Error;

use crate::descriptor::ArgKind;

/// Errors returned by the argument binding entry points. Every variant is
/// local to the argument being bound: the previous binding of that index is
/// left as it was and other indices are never touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("argument index {index} out of range (kernel has {count} arguments)")]
    InvalidIndex { index: u32, count: u32 },
    #[error("invalid size {actual} for {kind:?} argument {index}, expected {expected}")]
    InvalidSize {
        index: u32,
        kind: ArgKind,
        expected: usize,
        actual: usize,
    },
    #[error("invalid value for {kind:?} argument {index}")]
    InvalidValue { index: u32, kind: ArgKind },
    #[error("handle {handle:#x} bound to argument {index} is not a {expected:?} object")]
    InvalidObject {
        index: u32,
        expected: ArgKind,
        handle: u64,
    },
    #[error("memory object {handle:#x} cannot be bound to argument {index}")]
    InvalidMemObject { index: u32, handle: u64 },
    #[error("handle {handle:#x} bound to argument {index} is not a device queue")]
    InvalidDeviceQueue { index: u32, handle: u64 },
    #[error("local memory layout overflows 32 bits at argument {index}")]
    OutOfResources { index: u32 },
    #[error("kernel instances were created from different descriptors")]
    InvalidKernel,
}

/// Errors detected while decoding or validating a static kernel descriptor.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("failed to parse kernel descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error("argument {index}: {kind:?} argument declared with a {layout} layout")]
    LayoutMismatch {
        index: u32,
        kind: ArgKind,
        layout: &'static str,
    },
    #[error("argument {index}: patch at {offset:#x} (+{size}) lies outside the {size_limit} byte payload")]
    PatchOutOfBounds {
        index: u32,
        offset: u32,
        size: u32,
        size_limit: u32,
    },
    #[error("implicit argument {name}: patch at {offset:#x} lies outside the {size_limit} byte payload")]
    ImplicitOutOfBounds {
        name: &'static str,
        offset: u32,
        size_limit: u32,
    },
    #[error("argument {index}: {heap} heap offset {offset:#x} lies outside the {size_limit} byte heap")]
    HeapOutOfBounds {
        index: u32,
        heap: &'static str,
        offset: u32,
        size_limit: u32,
    },
    #[error("argument {index}: unsupported patch size {size}")]
    InvalidPatchSize { index: u32, size: u32 },
    #[error("argument {index}: local memory alignment {alignment} is not a power of two")]
    InvalidAlignment { index: u32, alignment: u32 },
    #[error("argument {index} has no bindless surface slot")]
    MissingBindlessSlot { index: u32 },
    #[error("binding table at {offset:#x} with {entries} entries does not fit the {size_limit} byte heap")]
    BindingTableOutOfBounds {
        offset: u32,
        entries: u32,
        size_limit: u32,
    },
    #[error("{required} arguments to patch declared but kernel has only {count}")]
    InvalidPatchCount { required: u32, count: u32 },
}

pub type Result<T, E = BindError> = std::result::Result<T, E>;
