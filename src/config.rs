//! Configuration of the example flow

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Elements per region in the example flow (64 Mi floats)
pub const DEFAULT_ELEMENTS: usize = 1024 * 1024 * 64;

/// Names, paths and sizes used by [`crate::flow::run`]
///
/// Every field is optional in JSON; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub context_name: String,
    pub program_name: String,
    pub binary_path: PathBuf,
    pub kernel_name: String,
    /// Number of `f32` elements in each of the three regions
    pub elements: usize,
    pub device_index: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            context_name: "Context1".to_string(),
            program_name: "Program1".to_string(),
            binary_path: PathBuf::from("./bin/program_name.aocx"),
            kernel_name: "vector_add".to_string(),
            elements: DEFAULT_ELEMENTS,
            device_index: 0,
        }
    }
}

impl FlowConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("invalid flow configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&json)
    }

    /// Size in bytes of each region
    pub fn region_bytes(&self) -> usize {
        self.elements * std::mem::size_of::<f32>()
    }

    fn validate(&self) -> Result<()> {
        if self.elements == 0 {
            return Err(Error::invalid_argument("`elements` must be non-zero"));
        }
        if self.elements.checked_mul(std::mem::size_of::<f32>()).is_none() {
            return Err(Error::invalid_argument("`elements` overflows the region size"));
        }
        Ok(())
    }
}
