//! Prints every platform and device the runtime reports
use anyhow::{Context, Result};
use fpga_cl::logging::{init_tracing, LogConfig};
use fpga_cl::{Fpga, Runtime};
use prettytable::{row, Table};

fn print_devices<R: Runtime>(runtime: R) -> Result<()> {
    let fpga = Fpga::new(runtime).context("Failed to enumerate platforms")?;
    if fpga.platforms().is_empty() {
        println!("No platforms found");
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["#", "Platform", "Device"]);
    for (i, &platform) in fpga.platforms().iter().enumerate() {
        let platform_name = fpga.platform_name(platform)?;
        let devices = fpga.devices(platform)?;
        if devices.is_empty() {
            table.add_row(row![i, platform_name, "-"]);
        }
        for &device in devices {
            table.add_row(row![i, platform_name, fpga.device_name(device)?]);
        }
    }
    table.printstd();
    Ok(())
}

fn main() -> Result<()> {
    init_tracing(&LogConfig {
        default_directive: "warn".to_string(),
        ..LogConfig::default()
    })?;

    #[cfg(feature = "opencl")]
    return print_devices(fpga_cl::ClRuntime);

    #[cfg(not(feature = "opencl"))]
    {
        tracing::warn!("built without the `opencl` feature, listing the shim runtime");
        print_devices(fpga_cl::SimRuntime::fpga_board())
    }
}
