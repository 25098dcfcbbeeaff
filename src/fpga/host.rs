//! Host-side staging memory

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Alignment of host staging buffers, matching typical DMA requirements
pub const HOST_MEMORY_ALIGNMENT: usize = 64;

/// A fixed-size, 64-byte aligned, zero-initialised host buffer
pub struct HostMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HostMemory {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Allocation {
                size,
                reason: "host memory size must be non-zero".into(),
            });
        }
        let layout = Layout::from_size_align(size, HOST_MEMORY_ALIGNMENT).map_err(|e| Error::Allocation {
            size,
            reason: e.to_string(),
        })?;
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| Error::Allocation {
            size,
            reason: "host allocator returned null".into(),
        })?;
        tracing::debug!(size, "host memory allocated");

        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    pub fn fill(&mut self, byte: u8) {
        self.as_mut_slice().fill(byte);
    }

    /// The buffer viewed as `f32`s; trailing bytes that do not form a whole
    /// element are excluded
    pub fn as_f32_slice(&self) -> &[f32] {
        // 64-byte alignment satisfies f32's alignment
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const f32, self.len() / 4) }
    }

    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut f32, self.len() / 4) }
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMemory")
            .field("ptr", &self.ptr)
            .field("size", &self.len())
            .finish()
    }
}
