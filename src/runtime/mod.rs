//! The native compute runtime boundary
//!
//! Every wrapper in [`crate::fpga`] talks to the accelerator through the
//! [`Runtime`] trait. Handles are opaque `Copy` values: acquiring one
//! (`create_*`) hands the caller a reference which must be given back exactly
//! once through the matching `release_*` call. The wrappers take care of that
//! pairing; nothing outside them should call `release_*` directly.

#[cfg(feature = "opencl")]
pub mod opencl;
pub mod sim;

#[cfg(feature = "opencl")]
pub use opencl::ClRuntime;
pub use sim::SimRuntime;

use crate::error::Result;
use crate::opencl::types::*;
use std::fmt::Debug;
use std::hash::Hash;

/// Device category used to filter enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    Default,
    Cpu,
    Gpu,
    Accelerator,
    #[default]
    All,
}

impl DeviceType {
    pub fn bits(self) -> cl_device_type {
        match self {
            DeviceType::Default => CL_DEVICE_TYPE_DEFAULT,
            DeviceType::Cpu => CL_DEVICE_TYPE_CPU,
            DeviceType::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceType::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
            DeviceType::All => CL_DEVICE_TYPE_ALL,
        }
    }
}

/// Optional properties for context creation
#[derive(Debug, Clone, Copy)]
pub struct ContextProperties<P> {
    /// Platform the context is bound to (`CL_CONTEXT_PLATFORM`)
    pub platform: Option<P>,
}

impl<P> Default for ContextProperties<P> {
    fn default() -> Self {
        Self { platform: None }
    }
}

/// Command queue properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueProperties {
    pub profiling: bool,
}

impl QueueProperties {
    pub fn bits(self) -> cl_command_queue_properties {
        if self.profiling {
            CL_QUEUE_PROFILING_ENABLE
        } else {
            0
        }
    }
}

/// Kernel-side access mode of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl MemAccess {
    pub fn bits(self) -> cl_mem_flags {
        match self {
            MemAccess::ReadOnly => CL_MEM_READ_ONLY,
            MemAccess::WriteOnly => CL_MEM_WRITE_ONLY,
            MemAccess::ReadWrite => CL_MEM_READ_WRITE,
        }
    }
}

/// How a new buffer relates to host memory
#[derive(Debug, Clone, Copy)]
pub enum HostPtr {
    /// Device-only allocation
    None,
    /// Initialise from the pointed-to bytes (`CL_MEM_COPY_HOST_PTR`)
    Copy(*mut u8),
    /// Use the pointed-to bytes as backing storage (`CL_MEM_USE_HOST_PTR`)
    Use(*mut u8),
}

impl HostPtr {
    pub fn bits(self) -> cl_mem_flags {
        match self {
            HostPtr::None => 0,
            HostPtr::Copy(_) => CL_MEM_COPY_HOST_PTR,
            HostPtr::Use(_) => CL_MEM_USE_HOST_PTR,
        }
    }

    pub fn as_ptr(self) -> *mut u8 {
        match self {
            HostPtr::None => std::ptr::null_mut(),
            HostPtr::Copy(ptr) | HostPtr::Use(ptr) => ptr,
        }
    }
}

/// Per-device result of loading a program binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryStatus(pub cl_int);

impl BinaryStatus {
    pub fn is_success(self) -> bool {
        self.0 == CL_SUCCESS
    }
}

/// Abstract capability over a native heterogeneous-compute runtime
///
/// Errors are reported as [`crate::Error::Runtime`] (or
/// [`crate::Error::Build`] for `build_program`) carrying the native status.
pub trait Runtime {
    type Platform: Copy + Eq + Hash + Debug;
    type Device: Copy + Eq + Hash + Debug;
    type Context: Copy + Debug;
    type Program: Copy + Debug;
    type Kernel: Copy + Debug;
    type Mem: Copy + Debug;
    type Queue: Copy + Debug;

    /// All platforms; an empty list when none is installed
    fn platform_ids(&self) -> Result<Vec<Self::Platform>>;
    fn platform_name(&self, platform: Self::Platform) -> Result<String>;
    /// Devices of `platform` matching `device_type`; empty when none match
    fn device_ids(&self, platform: Self::Platform, device_type: DeviceType) -> Result<Vec<Self::Device>>;
    fn device_name(&self, device: Self::Device) -> Result<String>;

    fn create_context(
        &self,
        devices: &[Self::Device],
        properties: &ContextProperties<Self::Platform>,
    ) -> Result<Self::Context>;
    fn release_context(&self, context: Self::Context) -> Result<()>;

    /// Creates a program from one binary per device
    ///
    /// On failure the per-device statuses are lost; callers needing them
    /// should inspect the returned error code.
    fn create_program_with_binary(
        &self,
        context: Self::Context,
        devices: &[Self::Device],
        binary: &[u8],
    ) -> Result<(Self::Program, Vec<BinaryStatus>)>;
    fn build_program(&self, program: Self::Program, devices: &[Self::Device]) -> Result<()>;
    fn release_program(&self, program: Self::Program) -> Result<()>;

    fn create_kernel(&self, program: Self::Program, name: &str) -> Result<Self::Kernel>;
    fn set_kernel_arg_mem(&self, kernel: Self::Kernel, index: u32, mem: Self::Mem) -> Result<()>;
    fn release_kernel(&self, kernel: Self::Kernel) -> Result<()>;

    /// # Safety
    ///
    /// A host pointer in `host_ptr` must be valid for reads (and, for
    /// `HostPtr::Use`, writes) of `size` bytes; with `HostPtr::Use` it must
    /// stay valid until the buffer is destroyed.
    unsafe fn create_buffer(
        &self,
        context: Self::Context,
        flags: cl_mem_flags,
        size: usize,
        host_ptr: HostPtr,
    ) -> Result<Self::Mem>;
    fn release_mem(&self, mem: Self::Mem) -> Result<()>;

    fn create_queue(
        &self,
        context: Self::Context,
        device: Self::Device,
        properties: QueueProperties,
    ) -> Result<Self::Queue>;
    fn release_queue(&self, queue: Self::Queue) -> Result<()>;

    /// Enqueues a single work-item execution of `kernel`
    fn enqueue_task(&self, queue: Self::Queue, kernel: Self::Kernel) -> Result<()>;
    /// Copies `src` into `mem` at `offset`; returns once `src` may be reused
    fn enqueue_write_buffer(&self, queue: Self::Queue, mem: Self::Mem, offset: usize, src: &[u8]) -> Result<()>;
    /// Copies from `mem` at `offset` into `dst`; returns once `dst` is filled
    fn enqueue_read_buffer(&self, queue: Self::Queue, mem: Self::Mem, offset: usize, dst: &mut [u8]) -> Result<()>;
    /// Blocks until every command on `queue` has completed
    fn finish(&self, queue: Self::Queue) -> Result<()>;
}
