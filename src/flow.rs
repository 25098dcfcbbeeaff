//! The example host flow: two inputs in, one kernel run, one output back

use crate::config::FlowConfig;
use crate::error::Result;
use crate::fpga::{Buffer, CommandQueue, Fpga, HostMemory, Kernel};
use crate::runtime::{ContextProperties, MemAccess, QueueProperties, Runtime};
use crate::utils::measure_time;
use rand::Rng;
use std::time::Duration;

/// Outcome of one run of the flow
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub elements: usize,
    pub write_time: Duration,
    pub kernel_time: Duration,
    pub read_time: Duration,
    /// Output elements differing from the host-side sum
    pub mismatches: usize,
    pub max_diff: f32,
}

impl FlowReport {
    pub fn is_correct(&self) -> bool {
        self.mismatches == 0
    }
}

/// Fills `a` and `b` with random values in `[0, 1)`
pub fn initialize_inputs(a: &mut [f32], b: &mut [f32]) {
    let mut rng = rand::thread_rng();
    a.iter_mut().for_each(|x| *x = rng.gen_range(0.0..1.0));
    b.iter_mut().for_each(|x| *x = rng.gen_range(0.0..1.0));
}

/// Compares the device result with `a + b` computed on the host
pub fn compare_results(a: &[f32], b: &[f32], out: &[f32]) -> (usize, f32) {
    let epsilon = 1e-6f32;
    let mut mismatches = 0;
    let mut max_diff = 0.0f32;
    for ((x, y), z) in a.iter().zip(b).zip(out) {
        let diff = (x + y - z).abs();
        if diff > epsilon {
            mismatches += 1;
            max_diff = max_diff.max(diff);
        }
    }
    (mismatches, max_diff)
}

/// Runs the fixed flow on the first device of the first platform
///
/// Creates one context and loads one program, allocates three host regions
/// and three device buffers, binds the kernel's three arguments, writes both
/// inputs, executes once and reads the output back.
pub fn run<R: Runtime>(runtime: R, config: &FlowConfig) -> Result<FlowReport> {
    let mut fpga = Fpga::new(runtime)?;
    let device = fpga.first_device()?;

    let context = fpga.create_context(&config.context_name, &[device], ContextProperties::default())?;
    context.load_program(&config.program_name, &config.binary_path)?;
    let context = fpga.context(&config.context_name)?;

    let size = config.region_bytes();
    let mut din1 = HostMemory::new(size)?;
    let mut din2 = HostMemory::new(size)?;
    let mut dout = HostMemory::new(size)?;
    initialize_inputs(din1.as_f32_slice_mut(), din2.as_f32_slice_mut());

    let mdin1 = Buffer::new(context, MemAccess::ReadOnly, size)?;
    let mdin2 = Buffer::new(context, MemAccess::ReadOnly, size)?;
    let mdout = Buffer::new(context, MemAccess::WriteOnly, size)?;

    let mut kernel = Kernel::new(context, &config.program_name, &config.kernel_name)?;
    kernel.set_arg(0, &mdin1)?;
    kernel.set_arg(1, &mdin2)?;
    kernel.set_arg(2, &mdout)?;

    let queue = CommandQueue::new(context, config.device_index, QueueProperties::default())?;

    tracing::info!(bytes = size, "writing inputs");
    let (written, write_time) = measure_time(|| -> Result<()> {
        queue.write_buffer(&din1, &mdin1, size)?;
        queue.write_buffer(&din2, &mdin2, size)
    });
    written?;

    tracing::info!(kernel = %config.kernel_name, "executing kernel");
    let (executed, kernel_time) = measure_time(|| queue.request_task(&kernel));
    executed?;

    tracing::info!(bytes = size, "reading output");
    let (read, read_time) = measure_time(|| queue.read_buffer(&mut dout, &mdout, size));
    read?;

    let (mismatches, max_diff) = compare_results(din1.as_f32_slice(), din2.as_f32_slice(), dout.as_f32_slice());
    if mismatches > 0 {
        tracing::warn!(mismatches, max_diff, "device output differs from host sum");
    }

    Ok(FlowReport {
        elements: config.elements,
        write_time,
        kernel_time,
        read_time,
        mismatches,
        max_diff,
    })
}
