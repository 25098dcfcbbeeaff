//! Helper functions and utilities

use std::time::Instant;

/// Measures how long a closure takes to run
pub fn measure_time<F, T>(f: F) -> (T, std::time::Duration)
where
    F: FnOnce() -> T
{
    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}

/// Writes `contents` to a per-process file under the system temp directory
#[cfg(test)]
pub(crate) fn test_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("fpga_cl-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}
