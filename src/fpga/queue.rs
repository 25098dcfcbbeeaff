//! Command queues: task submission and host/device transfers

use super::buffer::Buffer;
use super::context::Context;
use super::host::HostMemory;
use super::kernel::Kernel;
use crate::error::{Error, Result};
use crate::runtime::{QueueProperties, Runtime};
use std::marker::PhantomData;

/// Whether an operation waits for the queue to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Return once every command on the queue, this one included, has completed
    Blocking,
    /// Enqueue and return; completion is awaited with
    /// [`CommandQueue::wait_commits`]
    Commit,
}

/// An in-order execution channel bound to one device of a context
///
/// Host transfers always complete their host-side copy before returning, so
/// a [`HostMemory`] may be reused as soon as a call returns in either mode.
/// Commands execute in submission order. Dropping the queue waits for
/// outstanding commands before releasing it.
///
/// A submitted kernel, the buffers bound to it and any host memory backing
/// those buffers must outlive the queue, since a committed task may still run
/// when the queue drains on drop:
///
/// ```compile_fail
/// use fpga_cl::{Buffer, CommandQueue, ContextProperties, Fpga, HostMemory, Kernel, MemAccess, SimRuntime};
///
/// let mut fpga = Fpga::new(SimRuntime::fpga_board()).unwrap();
/// let device = fpga.first_device().unwrap();
/// fpga.create_context("ctx", &[device], ContextProperties::default()).unwrap();
/// let ctx = fpga.context("ctx").unwrap();
/// let queue = CommandQueue::new(ctx, 0, Default::default()).unwrap();
/// {
///     let mut host = HostMemory::new(64).unwrap();
///     let output = Buffer::use_host(ctx, MemAccess::WriteOnly, &mut host).unwrap();
///     let mut kernel = Kernel::new(ctx, "prog", "passthrough").unwrap();
///     kernel.set_arg(1, &output).unwrap();
///     queue.commit_task(&kernel).unwrap();
/// }
/// queue.wait_commits().unwrap();
/// ```
pub struct CommandQueue<'a, R: Runtime> {
    context: &'a Context<R>,
    handle: R::Queue,
    device_index: usize,
    // Invariant in 'a so that submitted kernels are held for the queue's whole life
    _tasks: PhantomData<fn(&'a ()) -> &'a ()>,
}

impl<'a, R: Runtime> CommandQueue<'a, R> {
    /// Creates a queue on the device at `device_index` of the context
    pub fn new(context: &'a Context<R>, device_index: usize, properties: QueueProperties) -> Result<Self> {
        let device = context.device(device_index)?;
        let handle = context.runtime().create_queue(context.handle(), device, properties)?;
        tracing::debug!(context = context.name(), device_index, "command queue created");

        Ok(Self {
            context,
            handle,
            device_index,
            _tasks: PhantomData,
        })
    }

    /// Enqueues one execution of `kernel`
    pub fn task(&self, kernel: &'a Kernel<'a, R>, mode: SyncMode) -> Result<()> {
        self.context.runtime().enqueue_task(self.handle, kernel.handle())?;
        tracing::trace!(kernel = kernel.name(), ?mode, "task enqueued");
        self.settle(mode)
    }

    /// Copies the first `n` bytes of `host` into `buffer`
    pub fn write(&self, host: &HostMemory, buffer: &Buffer<'_, R>, n: usize, mode: SyncMode) -> Result<()> {
        check_transfer(n, host, buffer)?;
        self.context
            .runtime()
            .enqueue_write_buffer(self.handle, buffer.handle(), 0, &host.as_slice()[..n])?;
        tracing::trace!(bytes = n, ?mode, "host -> device");
        self.settle(mode)
    }

    /// Copies the first `n` bytes of `buffer` into `host`
    pub fn read(&self, host: &mut HostMemory, buffer: &Buffer<'_, R>, n: usize, mode: SyncMode) -> Result<()> {
        check_transfer(n, host, buffer)?;
        self.context
            .runtime()
            .enqueue_read_buffer(self.handle, buffer.handle(), 0, &mut host.as_mut_slice()[..n])?;
        tracing::trace!(bytes = n, ?mode, "device -> host");
        self.settle(mode)
    }

    /// Blocks until every command submitted so far has completed
    pub fn wait_commits(&self) -> Result<()> {
        self.context.runtime().finish(self.handle)
    }

    pub fn request_task(&self, kernel: &'a Kernel<'a, R>) -> Result<()> {
        self.task(kernel, SyncMode::Blocking)
    }

    pub fn commit_task(&self, kernel: &'a Kernel<'a, R>) -> Result<()> {
        self.task(kernel, SyncMode::Commit)
    }

    pub fn write_buffer(&self, host: &HostMemory, buffer: &Buffer<'_, R>, n: usize) -> Result<()> {
        self.write(host, buffer, n, SyncMode::Blocking)
    }

    pub fn commit_write_buffer(&self, host: &HostMemory, buffer: &Buffer<'_, R>, n: usize) -> Result<()> {
        self.write(host, buffer, n, SyncMode::Commit)
    }

    pub fn read_buffer(&self, host: &mut HostMemory, buffer: &Buffer<'_, R>, n: usize) -> Result<()> {
        self.read(host, buffer, n, SyncMode::Blocking)
    }

    pub fn commit_read_buffer(&self, host: &mut HostMemory, buffer: &Buffer<'_, R>, n: usize) -> Result<()> {
        self.read(host, buffer, n, SyncMode::Commit)
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn handle(&self) -> R::Queue {
        self.handle
    }

    fn settle(&self, mode: SyncMode) -> Result<()> {
        match mode {
            SyncMode::Blocking => self.wait_commits(),
            SyncMode::Commit => Ok(()),
        }
    }
}

fn check_transfer<R: Runtime>(n: usize, host: &HostMemory, buffer: &Buffer<'_, R>) -> Result<()> {
    if n > host.len() || n > buffer.len() {
        return Err(Error::invalid_argument(format!(
            "transfer of {n} bytes exceeds host memory ({}) or device buffer ({})",
            host.len(),
            buffer.len()
        )));
    }
    Ok(())
}

impl<R: Runtime> Drop for CommandQueue<'_, R> {
    fn drop(&mut self) {
        let runtime = self.context.runtime();
        if let Err(e) = runtime.finish(self.handle) {
            tracing::warn!(error = %e, "failed to drain command queue");
        }
        if let Err(e) = runtime.release_queue(self.handle) {
            tracing::warn!(error = %e, "failed to release command queue");
        }
    }
}
