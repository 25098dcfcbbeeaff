use fpga_cl::config::FlowConfig;
use fpga_cl::flow;
use fpga_cl::runtime::sim::{SimEvent, SimObjectKind};
use fpga_cl::{
    Buffer, CommandQueue, ContextProperties, Error, Fpga, HostMemory, Kernel, MemAccess, QueueProperties, SimRuntime,
};
use std::path::PathBuf;

fn bitstream(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fpga_cl-flow-{}-{}", std::process::id(), name));
    std::fs::write(&path, b"aocx").unwrap();
    path
}

fn loaded_board(rt: &SimRuntime, file: &str) -> Fpga<SimRuntime> {
    let mut fpga = Fpga::new(rt.clone()).unwrap();
    let device = fpga.first_device().unwrap();
    let context = fpga
        .create_context("Context1", &[device], ContextProperties::default())
        .unwrap();
    let path = bitstream(file);
    context.load_program("Program1", &path).unwrap();
    std::fs::remove_file(path).unwrap();
    fpga
}

#[test]
fn passthrough_round_trip() {
    const N: usize = 1024;
    let rt = SimRuntime::fpga_board();
    let fpga = loaded_board(&rt, "passthrough.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let mut src = HostMemory::new(N).unwrap();
    let mut dst = HostMemory::new(N).unwrap();
    src.fill(0x42);
    let input = Buffer::new(ctx, MemAccess::ReadOnly, N).unwrap();
    let output = Buffer::new(ctx, MemAccess::WriteOnly, N).unwrap();
    let mut kernel = Kernel::new(ctx, "Program1", "passthrough").unwrap();
    kernel.set_arg(0, &input).unwrap();
    kernel.set_arg(1, &output).unwrap();
    let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();

    queue.write_buffer(&src, &input, N).unwrap();
    queue.request_task(&kernel).unwrap();
    queue.read_buffer(&mut dst, &output, N).unwrap();

    assert!(dst.as_slice().iter().all(|&b| b == 0x42));
}

#[test]
fn committed_write_matches_blocking_write() {
    const N: usize = 512;
    let rt = SimRuntime::fpga_board();
    let fpga = loaded_board(&rt, "commit_write.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let mut host = HostMemory::new(N).unwrap();
    for (i, b) in host.as_mut_slice().iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let blocking = Buffer::new(ctx, MemAccess::ReadWrite, N).unwrap();
    let committed = Buffer::new(ctx, MemAccess::ReadWrite, N).unwrap();
    let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();

    queue.write_buffer(&host, &blocking, N).unwrap();
    queue.commit_write_buffer(&host, &committed, N).unwrap();
    queue.wait_commits().unwrap();

    assert_eq!(
        rt.buffer_contents(blocking.handle()).unwrap(),
        rt.buffer_contents(committed.handle()).unwrap()
    );
    assert_eq!(rt.buffer_contents(committed.handle()).unwrap(), host.as_slice());
}

#[test]
fn partial_transfers_touch_only_the_prefix() {
    let rt = SimRuntime::fpga_board();
    let fpga = loaded_board(&rt, "partial.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let mut host = HostMemory::new(64).unwrap();
    host.fill(7);
    let buffer = Buffer::new(ctx, MemAccess::ReadWrite, 64).unwrap();
    let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();
    queue.write_buffer(&host, &buffer, 16).unwrap();

    let contents = rt.buffer_contents(buffer.handle()).unwrap();
    assert!(contents[..16].iter().all(|&b| b == 7));
    assert!(contents[16..].iter().all(|&b| b == 0));

    let writes: Vec<_> = rt
        .events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::Write { .. }))
        .collect();
    assert_eq!(writes, vec![SimEvent::Write { mem: buffer.handle(), len: 16 }]);
}

#[test]
fn buffer_backed_by_host_memory_sees_kernel_output() {
    let rt = SimRuntime::fpga_board();
    let fpga = loaded_board(&rt, "use_host.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let mut src = HostMemory::new(32).unwrap();
    src.fill(5);
    let mut backing = HostMemory::new(32).unwrap();
    let input = Buffer::from_host(ctx, MemAccess::ReadOnly, &src).unwrap();
    let output = Buffer::use_host(ctx, MemAccess::WriteOnly, &mut backing).unwrap();
    {
        let mut kernel = Kernel::new(ctx, "Program1", "passthrough").unwrap();
        kernel.set_arg(0, &input).unwrap();
        kernel.set_arg(1, &output).unwrap();
        let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();
        queue.request_task(&kernel).unwrap();
    }
    drop(output);
    assert!(backing.as_slice().iter().all(|&b| b == 5));
}

#[test]
fn committed_task_writes_host_backed_buffer_before_its_release() {
    let rt = SimRuntime::fpga_board();
    let fpga = loaded_board(&rt, "use_host_commit.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let mut src = HostMemory::new(32).unwrap();
    src.fill(9);
    let mut backing = HostMemory::new(32).unwrap();
    let output_handle = {
        let input = Buffer::from_host(ctx, MemAccess::ReadOnly, &src).unwrap();
        let output = Buffer::use_host(ctx, MemAccess::WriteOnly, &mut backing).unwrap();
        let mut kernel = Kernel::new(ctx, "Program1", "passthrough").unwrap();
        kernel.set_arg(0, &input).unwrap();
        kernel.set_arg(1, &output).unwrap();
        let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();
        queue.commit_task(&kernel).unwrap();
        let handle = output.handle();
        handle
    };

    let events = rt.events();
    let executed = events
        .iter()
        .position(|e| matches!(e, SimEvent::TaskExecuted { .. }))
        .unwrap();
    let released = events
        .iter()
        .position(|e| *e == SimEvent::Released(SimObjectKind::Mem, output_handle))
        .unwrap();
    assert!(executed < released, "{events:?}");
    assert!(backing.as_slice().iter().all(|&b| b == 9));
}

#[test]
fn device_allocation_failure_is_reported() {
    let rt = SimRuntime::fpga_board().with_memory_limit(1024);
    let fpga = loaded_board(&rt, "oom.aocx");
    let ctx = fpga.context("Context1").unwrap();

    let _first = Buffer::new(ctx, MemAccess::ReadWrite, 1024).unwrap();
    let err = Buffer::new(ctx, MemAccess::ReadWrite, 1).err().unwrap();
    assert!(matches!(err, Error::Allocation { size: 1, .. }), "{err}");
}

#[test]
fn example_flow_adds_vectors() {
    let path = bitstream("flow.aocx");
    let config = FlowConfig {
        binary_path: path.clone(),
        elements: 4096,
        ..FlowConfig::default()
    };
    let report = flow::run(SimRuntime::fpga_board(), &config).unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(report.elements, 4096);
    assert!(report.is_correct(), "{report:?}");
}

#[test]
fn example_flow_detects_wrong_results() {
    let path = bitstream("flow_wrong.aocx");
    let rt = SimRuntime::fpga_board().with_kernel("broken_add", 3, |args: &mut [Vec<u8>]| {
        if let [_, _, out, ..] = args {
            out.fill(0);
        }
    });
    let config = FlowConfig {
        binary_path: path.clone(),
        kernel_name: "broken_add".to_string(),
        elements: 64,
        ..FlowConfig::default()
    };
    let report = flow::run(rt, &config).unwrap();
    std::fs::remove_file(path).unwrap();

    assert!(!report.is_correct());
    assert!(report.mismatches > 0);
}

#[test]
fn example_flow_fails_without_a_bitstream() {
    let config = FlowConfig {
        binary_path: PathBuf::from("/nonexistent/fpga_cl/program.aocx"),
        elements: 16,
        ..FlowConfig::default()
    };
    let err = flow::run(SimRuntime::fpga_board(), &config).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "{err}");
}
