//! `tracing` subscriber setup for the binaries

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// How the global subscriber should behave
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Explicit filter directives; when `None`, `RUST_LOG` is consulted
    pub directives: Option<String>,
    /// Directive used when neither of the above is set
    pub default_directive: String,
    pub ansi: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            ansi: true,
            include_targets: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("invalid log directive: {0}")]
    InvalidFilter(String),
    #[error("failed to install global subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

impl LogConfig {
    fn resolve_filter(&self) -> Result<EnvFilter, LogSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|e| LogSetupError::InvalidFilter(e.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

/// Installs a formatted subscriber as the process-wide default
pub fn init_tracing(config: &LogConfig) -> Result<(), LogSetupError> {
    let filter = config.resolve_filter()?;
    tracing_fmt()
        .with_env_filter(filter)
        .with_target(config.include_targets)
        .with_ansi(config.ansi)
        .finish()
        .try_init()?;
    Ok(())
}
