//! Runs the vector-add flow against the first accelerator found
//!
//! Usage: `fpga_cl [config.json]`. Without the `opencl` feature the flow runs
//! on the in-process shim runtime.

use anyhow::{Context, Result};
use fpga_cl::{
    config::FlowConfig,
    flow::{self, FlowReport},
    logging::{init_tracing, LogConfig},
};
use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use std::time::Duration;

/// Region size used on the shim runtime when no configuration file is given
#[cfg(not(feature = "opencl"))]
const SIM_ELEMENTS: usize = 1024 * 1024;

fn load_config() -> Result<FlowConfig> {
    match std::env::args().nth(1) {
        Some(path) => FlowConfig::from_json_file(&path).with_context(|| format!("Failed to load configuration {path}")),
        None => Ok(FlowConfig::default()),
    }
}

#[cfg(feature = "opencl")]
fn run_flow(config: &FlowConfig) -> Result<FlowReport> {
    flow::run(fpga_cl::ClRuntime, config).context("Flow failed on the OpenCL runtime")
}

#[cfg(not(feature = "opencl"))]
fn run_flow(config: &FlowConfig) -> Result<FlowReport> {
    tracing::warn!("built without the `opencl` feature, running on the shim runtime");

    let mut config = config.clone();
    if std::env::args().nth(1).is_none() {
        config.elements = SIM_ELEMENTS;
    }
    // The shim accepts any bytes as a bitstream
    if !config.binary_path.exists() {
        let placeholder = std::env::temp_dir().join("fpga_cl-placeholder.aocx");
        std::fs::write(&placeholder, b"placeholder bitstream")
            .with_context(|| format!("Failed to write {}", placeholder.display()))?;
        tracing::info!(path = %placeholder.display(), "using placeholder bitstream");
        config.binary_path = placeholder;
    }

    flow::run(fpga_cl::SimRuntime::fpga_board(), &config).context("Flow failed on the shim runtime")
}

fn main() -> Result<()> {
    init_tracing(&LogConfig::default())?;
    let config = load_config()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    spinner.set_message(format!("running {} on {} elements", config.kernel_name, config.elements));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = run_flow(&config);
    spinner.finish_and_clear();
    let report = report?;

    let mut table = Table::new();
    table.add_row(row!["Stage", "Time"]);
    table.add_row(row!["Write inputs", format!("{:?}", report.write_time)]);
    table.add_row(row!["Kernel", format!("{:?}", report.kernel_time)]);
    table.add_row(row!["Read output", format!("{:?}", report.read_time)]);
    table.add_row(row!["Elements", report.elements]);
    table.add_row(row!["Mismatches", report.mismatches]);
    table.printstd();

    if !report.is_correct() {
        anyhow::bail!(
            "{} of {} elements differ from the host sum (max difference {})",
            report.mismatches,
            report.elements,
            report.max_diff
        );
    }
    println!("Results match");
    Ok(())
}
