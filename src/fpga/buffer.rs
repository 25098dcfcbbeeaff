//! Device memory objects

use super::context::Context;
use super::host::HostMemory;
use crate::error::{Error, Result};
use crate::runtime::{HostPtr, MemAccess, Runtime};
use std::marker::PhantomData;

/// A device-side allocation tied to a context
///
/// The buffer cannot outlive its context. Buffers created with
/// [`Buffer::use_host`] also keep their host memory borrowed.
pub struct Buffer<'a, R: Runtime> {
    context: &'a Context<R>,
    handle: R::Mem,
    len: usize,
    access: MemAccess,
    _host: PhantomData<&'a mut HostMemory>,
}

impl<'a, R: Runtime> Buffer<'a, R> {
    /// Allocates `len` bytes of device memory
    pub fn new(context: &'a Context<R>, access: MemAccess, len: usize) -> Result<Self> {
        unsafe { Self::create(context, access, len, HostPtr::None) }
    }

    /// Allocates device memory initialised from `host`
    pub fn from_host(context: &'a Context<R>, access: MemAccess, host: &HostMemory) -> Result<Self> {
        // COPY_HOST_PTR only reads from the pointer during creation
        unsafe { Self::create(context, access, host.len(), HostPtr::Copy(host.as_ptr() as *mut u8)) }
    }

    /// Creates a buffer backed directly by `host` (zero-copy where the
    /// platform supports it)
    pub fn use_host(context: &'a Context<R>, access: MemAccess, host: &'a mut HostMemory) -> Result<Self> {
        let len = host.len();
        unsafe { Self::create(context, access, len, HostPtr::Use(host.as_mut_ptr())) }
    }

    unsafe fn create(context: &'a Context<R>, access: MemAccess, len: usize, host_ptr: HostPtr) -> Result<Self> {
        if len == 0 {
            return Err(Error::invalid_argument("device buffer length must be non-zero"));
        }
        let handle = context
            .runtime()
            .create_buffer(context.handle(), access.bits(), len, host_ptr)
            .map_err(|e| {
                if e.is_out_of_memory() {
                    Error::Allocation {
                        size: len,
                        reason: e.to_string(),
                    }
                } else {
                    e
                }
            })?;
        tracing::debug!(context = context.name(), len, ?access, "device buffer created");

        Ok(Self {
            context,
            handle,
            len,
            access,
            _host: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> MemAccess {
        self.access
    }

    pub fn handle(&self) -> R::Mem {
        self.handle
    }

    pub fn context(&self) -> &'a Context<R> {
        self.context
    }
}

impl<R: Runtime> Drop for Buffer<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.context.runtime().release_mem(self.handle) {
            tracing::warn!(error = %e, "failed to release device buffer");
        }
    }
}

impl<R: Runtime> std::fmt::Debug for Buffer<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("len", &self.len)
            .field("access", &self.access)
            .finish()
    }
}
