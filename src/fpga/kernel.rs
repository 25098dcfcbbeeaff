//! Kernel entry points and argument binding

use super::buffer::Buffer;
use super::context::Context;
use crate::error::{Error, ObjectKind, Result};
use crate::opencl::types::CL_INVALID_KERNEL_NAME;
use crate::runtime::Runtime;
use std::marker::PhantomData;

/// A kernel entry point extracted from a program loaded into a context
///
/// Buffers bound with [`Kernel::set_arg`] must outlive the kernel.
pub struct Kernel<'a, R: Runtime> {
    context: &'a Context<R>,
    handle: R::Kernel,
    name: String,
    _args: PhantomData<&'a R::Mem>,
}

impl<'a, R: Runtime> Kernel<'a, R> {
    pub fn new(context: &'a Context<R>, program_name: &str, kernel_name: &str) -> Result<Self> {
        let program = context.program(program_name)?;
        let handle = context
            .runtime()
            .create_kernel(program, kernel_name)
            .map_err(|e| match e.status() {
                Some(CL_INVALID_KERNEL_NAME) => Error::not_found(ObjectKind::Kernel, kernel_name),
                _ => e,
            })?;
        tracing::debug!(program = program_name, kernel = kernel_name, "kernel created");

        Ok(Self {
            context,
            handle,
            name: kernel_name.to_string(),
            _args: PhantomData,
        })
    }

    /// Binds `buffer` to the positional argument `index`
    pub fn set_arg(&mut self, index: u32, buffer: &'a Buffer<'a, R>) -> Result<()> {
        self.context
            .runtime()
            .set_kernel_arg_mem(self.handle, index, buffer.handle())?;
        tracing::trace!(kernel = %self.name, index, len = buffer.len(), "argument bound");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> R::Kernel {
        self.handle
    }
}

impl<R: Runtime> Drop for Kernel<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.context.runtime().release_kernel(self.handle) {
            tracing::warn!(kernel = %self.name, error = %e, "failed to release kernel");
        }
    }
}
