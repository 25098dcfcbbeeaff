//! OpenCL interop
//!
//! Raw type definitions, constants and (with the `opencl` feature) the
//! `extern "C"` bindings linked against the system ICD loader.

#[cfg(feature = "opencl")]
pub mod bindings;
pub mod callbacks;
pub mod types;
pub mod utils;
