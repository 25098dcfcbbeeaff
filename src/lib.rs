//! RAII wrappers for loading FPGA bitstreams and driving OpenCL kernels
//!
//! ```no_run
//! use fpga_cl::{CommandQueue, ContextProperties, Fpga, HostMemory, Buffer, Kernel, MemAccess, SimRuntime};
//!
//! # fn main() -> fpga_cl::Result<()> {
//! let mut fpga = Fpga::new(SimRuntime::fpga_board())?;
//! let device = fpga.first_device()?;
//! let context = fpga.create_context("Context1", &[device], ContextProperties::default())?;
//! context.load_program("Program1", "./bin/program_name.aocx")?;
//!
//! let context = fpga.context("Context1")?;
//! let host = HostMemory::new(1024)?;
//! let input = Buffer::new(context, MemAccess::ReadOnly, 1024)?;
//! let output = Buffer::new(context, MemAccess::WriteOnly, 1024)?;
//! let mut kernel = Kernel::new(context, "Program1", "passthrough")?;
//! kernel.set_arg(0, &input)?;
//! kernel.set_arg(1, &output)?;
//!
//! let queue = CommandQueue::new(context, 0, Default::default())?;
//! queue.write_buffer(&host, &input, 1024)?;
//! queue.request_task(&kernel)?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros {
    /// Turns an OpenCL status-returning call into a `Result<()>`
    #[macro_export]
    macro_rules! cl_check {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let code = unsafe { $func($($arg),*) };
            $crate::cl_status!($func, code)
        }};
    }

    /// Maps an already obtained status code of `$func` to a `Result<()>`
    #[macro_export]
    macro_rules! cl_status {
        ($func:ident, $code:expr) => {{
            let code: $crate::opencl::types::cl_int = $code;
            if code != $crate::opencl::types::CL_SUCCESS {
                Err($crate::Error::Runtime { call: stringify!($func), code })
            } else {
                Ok(())
            }
        }};
    }

    /// Calls an OpenCL constructor, appending the `errcode_ret` out-parameter
    #[macro_export]
    macro_rules! cl_create {
        ($func:ident($($arg:expr),* $(,)?)) => {{
            let mut code: $crate::opencl::types::cl_int = $crate::opencl::types::CL_SUCCESS;
            let obj = unsafe { $func($($arg,)* &mut code) };
            if code != $crate::opencl::types::CL_SUCCESS {
                Err($crate::Error::Runtime { call: stringify!($func), code })
            } else if obj.is_null() {
                Err($crate::Error::Runtime {
                    call: stringify!($func),
                    code: $crate::opencl::types::CL_INVALID_VALUE,
                })
            } else {
                Ok(obj)
            }
        }};
    }
}

pub mod config;
pub mod error;
pub mod flow;
pub mod fpga;
pub mod logging;
pub mod opencl;
pub mod runtime;
pub mod utils;

pub use error::{Error, ObjectKind, Result};
pub use fpga::{
    BinaryReader, Buffer, CommandQueue, Context, Fpga, HostMemory, Kernel, SyncMode, HOST_MEMORY_ALIGNMENT,
};
pub use runtime::{BinaryStatus, ContextProperties, DeviceType, MemAccess, QueueProperties, Runtime, SimRuntime};
#[cfg(feature = "opencl")]
pub use runtime::ClRuntime;
