use crate::opencl::types::*;
use crate::opencl::utils::status_name;
use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// What a failed lookup or registration was about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Platform,
    Device,
    Context,
    Program,
    Kernel,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Platform => "platform",
            ObjectKind::Device => "device",
            ObjectKind::Context => "context",
            ObjectKind::Program => "program",
            ObjectKind::Kernel => "kernel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} `{name}` not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} `{name}` already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("short read from `{}`: expected {expected} bytes, got {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("failed to allocate {size} bytes: {reason}")]
    Allocation { size: usize, reason: String },

    #[error("{call} failed: {} ({code})", status_name(*code))]
    Runtime { call: &'static str, code: cl_int },

    #[error("program build failed: {} ({code})\n{log}", status_name(*code))]
    Build { code: cl_int, log: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn not_found<S: Into<String>>(kind: ObjectKind, name: S) -> Self {
        Error::NotFound { kind, name: name.into() }
    }

    pub fn already_exists<S: Into<String>>(kind: ObjectKind, name: S) -> Self {
        Error::AlreadyExists { kind, name: name.into() }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// Native status code carried by the error, if any
    pub fn status(&self) -> Option<cl_int> {
        match self {
            Error::Runtime { code, .. } | Error::Build { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the runtime reported exhausted device or host memory
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self.status(),
            Some(CL_MEM_OBJECT_ALLOCATION_FAILURE | CL_OUT_OF_RESOURCES | CL_OUT_OF_HOST_MEMORY)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_names_the_status() {
        let err = Error::Runtime { call: "clCreateBuffer", code: CL_INVALID_BUFFER_SIZE };
        assert_eq!(err.to_string(), "clCreateBuffer failed: CL_INVALID_BUFFER_SIZE (-61)");
        assert_eq!(err.status(), Some(CL_INVALID_BUFFER_SIZE));
        assert!(!err.is_out_of_memory());
    }

    #[test]
    fn lookup_errors_name_the_object() {
        let err = Error::not_found(ObjectKind::Context, "Context1");
        assert_eq!(err.to_string(), "context `Context1` not found");
        let err = Error::already_exists(ObjectKind::Program, "Program1");
        assert_eq!(err.to_string(), "program `Program1` already exists");
    }
}
