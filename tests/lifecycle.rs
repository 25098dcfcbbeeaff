use fpga_cl::runtime::sim::{SimEvent, SimObjectKind};
use fpga_cl::{
    Buffer, CommandQueue, ContextProperties, Error, Fpga, HostMemory, Kernel, MemAccess, ObjectKind,
    QueueProperties, SimRuntime,
};
use std::path::PathBuf;

fn bitstream(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fpga_cl-it-{}-{}", std::process::id(), name));
    std::fs::write(&path, b"\x00opaque bitstream\xff").unwrap();
    path
}

fn board_with_program(rt: &SimRuntime, file: &str) -> Fpga<SimRuntime> {
    let mut fpga = Fpga::new(rt.clone()).unwrap();
    let device = fpga.first_device().unwrap();
    fpga.create_context("Context1", &[device], ContextProperties::default())
        .unwrap();
    let path = bitstream(file);
    fpga.load_binary_program("Context1", "Program1", &path).unwrap();
    std::fs::remove_file(path).unwrap();
    fpga
}

fn position(events: &[SimEvent], wanted: &SimEvent) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in {events:?}"))
}

#[test]
fn dependents_are_released_before_their_context() {
    let rt = SimRuntime::fpga_board();
    let (ctx, mems, kernel, queue) = {
        let fpga = board_with_program(&rt, "order.aocx");
        let ctx = fpga.context("Context1").unwrap();
        let mut host = HostMemory::new(256).unwrap();
        host.fill(0x42);
        let input = Buffer::new(ctx, MemAccess::ReadOnly, 256).unwrap();
        let output = Buffer::new(ctx, MemAccess::WriteOnly, 256).unwrap();
        let mut kernel = Kernel::new(ctx, "Program1", "passthrough").unwrap();
        kernel.set_arg(0, &input).unwrap();
        kernel.set_arg(1, &output).unwrap();
        let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();
        queue.write_buffer(&host, &input, 256).unwrap();
        queue.commit_task(&kernel).unwrap();

        let handles = (ctx.handle(), [input.handle(), output.handle()], kernel.handle(), queue.handle());
        handles
    };

    let events = rt.events();
    let context_released = position(&events, &SimEvent::Released(SimObjectKind::Context, ctx));
    for mem in mems {
        assert!(position(&events, &SimEvent::Released(SimObjectKind::Mem, mem)) < context_released);
    }
    assert!(position(&events, &SimEvent::Released(SimObjectKind::Kernel, kernel)) < context_released);
    assert!(position(&events, &SimEvent::Released(SimObjectKind::Queue, queue)) < context_released);

    // No operation is issued against a handle once it has been released
    for (i, event) in events.iter().enumerate() {
        if let SimEvent::Released(_, handle) = event {
            assert!(events[i..].iter().all(|e| e.operand() != Some(*handle)), "{handle:?} used after release");
        }
    }
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn committed_task_still_runs_when_everything_is_dropped() {
    let rt = SimRuntime::fpga_board();
    {
        let fpga = board_with_program(&rt, "commit_drop.aocx");
        let ctx = fpga.context("Context1").unwrap();
        let input = Buffer::new(ctx, MemAccess::ReadOnly, 16).unwrap();
        let output = Buffer::new(ctx, MemAccess::WriteOnly, 16).unwrap();
        let mut kernel = Kernel::new(ctx, "Program1", "passthrough").unwrap();
        kernel.set_arg(0, &input).unwrap();
        kernel.set_arg(1, &output).unwrap();
        let queue = CommandQueue::new(ctx, 0, QueueProperties::default()).unwrap();
        queue.commit_task(&kernel).unwrap();
    }
    let executed = rt
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::TaskExecuted { .. }))
        .count();
    assert_eq!(executed, 1);
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn programs_are_released_with_their_context() {
    let rt = SimRuntime::fpga_board();
    {
        let mut fpga = board_with_program(&rt, "programs.aocx");
        let path = bitstream("programs_second.aocx");
        fpga.load_binary_program("Context1", "Program2", &path).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(rt.live_count(SimObjectKind::Program), 2);
    }
    assert_eq!(rt.live_count(SimObjectKind::Program), 0);
    assert_eq!(rt.live_count(SimObjectKind::Context), 0);
}

#[test]
fn lookups_of_unknown_names_fail_with_not_found() {
    let rt = SimRuntime::fpga_board();
    let mut fpga = board_with_program(&rt, "lookups.aocx");

    let err = fpga.context("Context2").unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: ObjectKind::Context, .. }));

    let ctx = fpga.context("Context1").unwrap();
    let err = Kernel::new(ctx, "Program9", "passthrough").err().unwrap();
    assert!(matches!(err, Error::NotFound { kind: ObjectKind::Program, .. }));
    let err = Kernel::new(ctx, "Program1", "no_such_kernel").err().unwrap();
    assert!(matches!(err, Error::NotFound { kind: ObjectKind::Kernel, .. }));

    let err = fpga
        .load_binary_program("Context1", "Program3", "/nonexistent/fpga_cl.aocx")
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(fpga.context("Context1").unwrap().program("Program3").is_err());
}

#[test]
fn duplicate_names_are_rejected() {
    let rt = SimRuntime::fpga_board();
    let mut fpga = board_with_program(&rt, "duplicates.aocx");
    let device = fpga.first_device().unwrap();

    let err = fpga
        .create_context("Context1", &[device], ContextProperties::default())
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { kind: ObjectKind::Context, .. }));

    let path = bitstream("duplicates_again.aocx");
    let err = fpga.load_binary_program("Context1", "Program1", &path).unwrap_err();
    std::fs::remove_file(path).unwrap();
    assert!(matches!(err, Error::AlreadyExists { kind: ObjectKind::Program, .. }));
    assert_eq!(rt.live_count(SimObjectKind::Program), 1);
}
