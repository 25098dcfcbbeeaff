//! In-process shim runtime
//!
//! `SimRuntime` follows the OpenCL object model closely enough to exercise
//! the wrappers without an accelerator: objects are reference counted
//! (children retain their parents, queued commands retain what they use),
//! queues are in order, program binaries are opaque blobs and kernels are
//! host closures registered up front. Every program created on the runtime
//! exposes all registered kernels.
//!
//! Tasks enqueued on a queue stay pending until something forces the queue
//! forward: `finish`, a buffer transfer on the same queue, or the queue's
//! release. That makes the difference between blocking and committed
//! submission observable from tests.

use super::{BinaryStatus, ContextProperties, DeviceType, HostPtr, QueueProperties, Runtime};
use crate::error::{Error, Result};
use crate::opencl::types::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

/// Host-side implementation of a kernel; receives the bound buffers in
/// argument order
pub type SimKernelFn = Rc<dyn Fn(&mut [Vec<u8>])>;

/// A registered kernel: its argument count and host implementation
#[derive(Clone)]
struct SimKernel {
    arity: u32,
    func: SimKernelFn,
}

/// Opaque handle issued by the shim runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimObjectKind {
    Context,
    Program,
    Kernel,
    Mem,
    Queue,
}

/// Observable history of the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Created(SimObjectKind, SimHandle),
    /// The application gave its reference back
    Released(SimObjectKind, SimHandle),
    /// The last reference went away
    Destroyed(SimObjectKind, SimHandle),
    TaskExecuted { kernel: SimHandle, name: String },
    Write { mem: SimHandle, len: usize },
    Read { mem: SimHandle, len: usize },
}

impl SimEvent {
    /// Handle an operation event was issued against
    pub fn operand(&self) -> Option<SimHandle> {
        match self {
            SimEvent::TaskExecuted { kernel, .. } => Some(*kernel),
            SimEvent::Write { mem, .. } | SimEvent::Read { mem, .. } => Some(*mem),
            _ => None,
        }
    }
}

struct SimDevice {
    id: SimHandle,
    name: String,
    device_type: cl_device_type,
}

struct SimPlatform {
    id: SimHandle,
    name: String,
    devices: Vec<SimDevice>,
}

enum Storage {
    Owned(Vec<u8>),
    Host { ptr: *mut u8, len: usize },
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(data) => data,
            // Buffer::use_host keeps the host region borrowed for the buffer's lifetime
            Storage::Host { ptr, len } => unsafe { std::slice::from_raw_parts(*ptr, *len) },
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(data) => data,
            Storage::Host { ptr, len } => unsafe { std::slice::from_raw_parts_mut(*ptr, *len) },
        }
    }
}

struct PendingTask {
    kernel: SimHandle,
    args: Vec<SimHandle>,
}

enum Body {
    Context {
        devices: Vec<SimHandle>,
    },
    Program {
        context: SimHandle,
    },
    Kernel {
        program: SimHandle,
        name: String,
        kernel: SimKernel,
        args: BTreeMap<u32, SimHandle>,
    },
    Mem {
        context: SimHandle,
        flags: cl_mem_flags,
        storage: Storage,
    },
    Queue {
        context: SimHandle,
        pending: VecDeque<PendingTask>,
    },
}

impl Body {
    fn kind(&self) -> SimObjectKind {
        match self {
            Body::Context { .. } => SimObjectKind::Context,
            Body::Program { .. } => SimObjectKind::Program,
            Body::Kernel { .. } => SimObjectKind::Kernel,
            Body::Mem { .. } => SimObjectKind::Mem,
            Body::Queue { .. } => SimObjectKind::Queue,
        }
    }

    fn parent(&self) -> Option<SimHandle> {
        match self {
            Body::Context { .. } => None,
            Body::Program { context } | Body::Mem { context, .. } | Body::Queue { context, .. } => Some(*context),
            Body::Kernel { program, .. } => Some(*program),
        }
    }
}

struct SimObject {
    refs: u32,
    app_held: bool,
    body: Body,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    platforms: Vec<SimPlatform>,
    kernels: BTreeMap<String, SimKernel>,
    objects: HashMap<SimHandle, SimObject>,
    memory_limit: Option<usize>,
    build_failure: Option<String>,
    allocated: usize,
    events: Vec<SimEvent>,
}

fn fail<T>(call: &'static str, code: cl_int) -> Result<T> {
    Err(Error::Runtime { call, code })
}

impl SimState {
    fn issue(&mut self) -> SimHandle {
        self.next_id += 1;
        SimHandle(self.next_id)
    }

    fn insert(&mut self, body: Body) -> SimHandle {
        let id = self.issue();
        if let Some(parent) = body.parent() {
            self.retain(parent);
        }
        self.events.push(SimEvent::Created(body.kind(), id));
        self.objects.insert(id, SimObject { refs: 1, app_held: true, body });
        id
    }

    /// Object the application still holds a reference to
    fn live(&self, id: SimHandle, kind: SimObjectKind, call: &'static str, code: cl_int) -> Result<&SimObject> {
        match self.objects.get(&id) {
            Some(obj) if obj.app_held && obj.body.kind() == kind => Ok(obj),
            _ => fail(call, code),
        }
    }

    fn live_mut(
        &mut self,
        id: SimHandle,
        kind: SimObjectKind,
        call: &'static str,
        code: cl_int,
    ) -> Result<&mut SimObject> {
        match self.objects.get_mut(&id) {
            Some(obj) if obj.app_held && obj.body.kind() == kind => Ok(obj),
            _ => fail(call, code),
        }
    }

    fn retain(&mut self, id: SimHandle) {
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.refs += 1;
        }
    }

    fn unref(&mut self, id: SimHandle) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(obj) = self.objects.get_mut(&id) else {
                continue;
            };
            obj.refs -= 1;
            if obj.refs > 0 {
                continue;
            }
            let Some(obj) = self.objects.remove(&id) else {
                continue;
            };
            if let Body::Mem { storage: Storage::Owned(data), .. } = &obj.body {
                self.allocated -= data.len();
            }
            self.events.push(SimEvent::Destroyed(obj.body.kind(), id));
            if let Some(parent) = obj.body.parent() {
                stack.push(parent);
            }
        }
    }

    fn app_release(&mut self, id: SimHandle, kind: SimObjectKind, call: &'static str, code: cl_int) -> Result<()> {
        self.live(id, kind, call, code)?;
        if kind == SimObjectKind::Queue {
            // Releasing a queue flushes it; queued work still completes
            self.drain(id);
        }
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.app_held = false;
        }
        self.events.push(SimEvent::Released(kind, id));
        self.unref(id);
        Ok(())
    }

    fn device(&self, id: SimHandle) -> Option<(&SimPlatform, &SimDevice)> {
        self.platforms
            .iter()
            .find_map(|p| p.devices.iter().find(|d| d.id == id).map(|d| (p, d)))
    }

    fn context_devices(&self, context: SimHandle) -> Vec<SimHandle> {
        match self.objects.get(&context).map(|obj| &obj.body) {
            Some(Body::Context { devices }) => devices.clone(),
            _ => Vec::new(),
        }
    }

    fn program_context(&self, program: SimHandle) -> Option<SimHandle> {
        match self.objects.get(&program).map(|obj| &obj.body) {
            Some(Body::Program { context }) => Some(*context),
            _ => None,
        }
    }

    fn mem_context(&self, mem: SimHandle) -> Option<SimHandle> {
        match self.objects.get(&mem).map(|obj| &obj.body) {
            Some(Body::Mem { context, .. }) => Some(*context),
            _ => None,
        }
    }

    fn queue_context(&self, queue: SimHandle) -> Option<SimHandle> {
        match self.objects.get(&queue).map(|obj| &obj.body) {
            Some(Body::Queue { context, .. }) => Some(*context),
            _ => None,
        }
    }

    fn kernel_context(&self, kernel: SimHandle) -> Option<SimHandle> {
        match self.objects.get(&kernel).map(|obj| &obj.body) {
            Some(Body::Kernel { program, .. }) => self.program_context(*program),
            _ => None,
        }
    }

    fn storage_mut(&mut self, mem: SimHandle) -> Option<&mut Storage> {
        match self.objects.get_mut(&mem).map(|obj| &mut obj.body) {
            Some(Body::Mem { storage, .. }) => Some(storage),
            _ => None,
        }
    }

    /// Runs every pending task of `queue` in submission order
    fn drain(&mut self, queue: SimHandle) {
        loop {
            let task = match self.objects.get_mut(&queue).map(|obj| &mut obj.body) {
                Some(Body::Queue { pending, .. }) => pending.pop_front(),
                _ => None,
            };
            let Some(task) = task else {
                break;
            };
            self.execute(&task);
            self.unref(task.kernel);
            for arg in task.args {
                self.unref(arg);
            }
        }
    }

    fn execute(&mut self, task: &PendingTask) {
        let (func, name) = match self.objects.get(&task.kernel).map(|obj| &obj.body) {
            Some(Body::Kernel { kernel, name, .. }) => (Rc::clone(&kernel.func), name.clone()),
            _ => return,
        };
        let mut data: Vec<Vec<u8>> = task
            .args
            .iter()
            .map(|&mem| self.storage_mut(mem).map(|s| s.bytes().to_vec()).unwrap_or_default())
            .collect();

        func(&mut data);

        for (&mem, bytes) in task.args.iter().zip(data) {
            if let Some(storage) = self.storage_mut(mem) {
                let target = storage.bytes_mut();
                let n = target.len().min(bytes.len());
                target[..n].copy_from_slice(&bytes[..n]);
            }
        }
        self.events.push(SimEvent::TaskExecuted { kernel: task.kernel, name });
    }
}

/// Shim runtime; clones share the same state
#[derive(Clone, Default)]
pub struct SimRuntime {
    state: Rc<RefCell<SimState>>,
}

impl fmt::Debug for SimRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SimRuntime")
            .field("platforms", &state.platforms.len())
            .field("kernels", &state.kernels.keys().collect::<Vec<_>>())
            .field("live_objects", &state.objects.len())
            .finish()
    }
}

impl SimRuntime {
    /// A runtime with no platforms and no kernels
    pub fn new() -> Self {
        Self::default()
    }

    /// One accelerator platform with a single board, plus the `passthrough`
    /// (arg 0 → arg 1) and `vector_add` (f32: arg 0 + arg 1 → arg 2) kernels
    pub fn fpga_board() -> Self {
        Self::new()
            .with_platform("Simulated FPGA Platform", &["sim_fpga0"])
            .with_kernel("passthrough", 2, passthrough)
            .with_kernel("vector_add", 3, vector_add)
    }

    /// Adds a platform whose devices are accelerators
    pub fn with_platform(self, name: &str, devices: &[&str]) -> Self {
        self.with_platform_of_type(name, DeviceType::Accelerator, devices)
    }

    pub fn with_platform_of_type(self, name: &str, device_type: DeviceType, devices: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let id = state.issue();
            let devices = devices
                .iter()
                .map(|&device| SimDevice {
                    id: state.issue(),
                    name: device.to_string(),
                    device_type: device_type.bits(),
                })
                .collect();
            state.platforms.push(SimPlatform { id, name: name.to_string(), devices });
        }
        self
    }

    /// Registers a kernel taking `arity` buffer arguments; programs created
    /// afterwards expose it
    pub fn with_kernel<F>(self, name: &str, arity: u32, func: F) -> Self
    where
        F: Fn(&mut [Vec<u8>]) + 'static,
    {
        let kernel = SimKernel {
            arity,
            func: Rc::new(func),
        };
        self.state.borrow_mut().kernels.insert(name.to_string(), kernel);
        self
    }

    /// Caps the total bytes of device-owned buffer storage
    pub fn with_memory_limit(self, bytes: usize) -> Self {
        self.state.borrow_mut().memory_limit = Some(bytes);
        self
    }

    /// Makes every subsequent program build fail with `log`
    pub fn with_build_failure(self, log: &str) -> Self {
        self.state.borrow_mut().build_failure = Some(log.to_string());
        self
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    /// Objects not yet destroyed, of any kind
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn live_count(&self, kind: SimObjectKind) -> usize {
        self.state
            .borrow()
            .objects
            .values()
            .filter(|obj| obj.body.kind() == kind)
            .count()
    }

    /// Flags a buffer was created with, including host pointer flags
    pub fn buffer_flags(&self, mem: SimHandle) -> Option<cl_mem_flags> {
        match self.state.borrow().objects.get(&mem).map(|obj| &obj.body) {
            Some(Body::Mem { flags, .. }) => Some(*flags),
            _ => None,
        }
    }

    pub fn buffer_contents(&self, mem: SimHandle) -> Option<Vec<u8>> {
        match self.state.borrow().objects.get(&mem).map(|obj| &obj.body) {
            Some(Body::Mem { storage, .. }) => Some(storage.bytes().to_vec()),
            _ => None,
        }
    }

    /// Tasks enqueued on `queue` that have not run yet
    pub fn pending_tasks(&self, queue: SimHandle) -> usize {
        match self.state.borrow().objects.get(&queue).map(|obj| &obj.body) {
            Some(Body::Queue { pending, .. }) => pending.len(),
            _ => 0,
        }
    }

    pub fn allocated_bytes(&self) -> usize {
        self.state.borrow().allocated
    }
}

fn passthrough(args: &mut [Vec<u8>]) {
    if let [input, output, ..] = args {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
    }
}

fn vector_add(args: &mut [Vec<u8>]) {
    if let [a, b, c, ..] = args {
        for (i, out) in c.chunks_exact_mut(4).enumerate() {
            let at = i * 4;
            if at + 4 > a.len() || at + 4 > b.len() {
                break;
            }
            let x = f32::from_ne_bytes([a[at], a[at + 1], a[at + 2], a[at + 3]]);
            let y = f32::from_ne_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]);
            out.copy_from_slice(&(x + y).to_ne_bytes());
        }
    }
}

impl Runtime for SimRuntime {
    type Platform = SimHandle;
    type Device = SimHandle;
    type Context = SimHandle;
    type Program = SimHandle;
    type Kernel = SimHandle;
    type Mem = SimHandle;
    type Queue = SimHandle;

    fn platform_ids(&self) -> Result<Vec<SimHandle>> {
        Ok(self.state.borrow().platforms.iter().map(|p| p.id).collect())
    }

    fn platform_name(&self, platform: SimHandle) -> Result<String> {
        let state = self.state.borrow();
        match state.platforms.iter().find(|p| p.id == platform) {
            Some(p) => Ok(p.name.clone()),
            None => fail("clGetPlatformInfo", CL_INVALID_PLATFORM),
        }
    }

    fn device_ids(&self, platform: SimHandle, device_type: DeviceType) -> Result<Vec<SimHandle>> {
        let state = self.state.borrow();
        let Some(p) = state.platforms.iter().find(|p| p.id == platform) else {
            return fail("clGetDeviceIDs", CL_INVALID_PLATFORM);
        };
        let devices = match device_type {
            DeviceType::All => p.devices.iter().map(|d| d.id).collect(),
            DeviceType::Default => p.devices.iter().take(1).map(|d| d.id).collect(),
            other => p
                .devices
                .iter()
                .filter(|d| d.device_type & other.bits() != 0)
                .map(|d| d.id)
                .collect(),
        };
        Ok(devices)
    }

    fn device_name(&self, device: SimHandle) -> Result<String> {
        match self.state.borrow().device(device) {
            Some((_, d)) => Ok(d.name.clone()),
            None => fail("clGetDeviceInfo", CL_INVALID_DEVICE),
        }
    }

    fn create_context(&self, devices: &[SimHandle], properties: &ContextProperties<SimHandle>) -> Result<SimHandle> {
        const CALL: &str = "clCreateContext";
        let mut state = self.state.borrow_mut();
        if devices.is_empty() {
            return fail(CALL, CL_INVALID_VALUE);
        }
        if let Some(platform) = properties.platform {
            if !state.platforms.iter().any(|p| p.id == platform) {
                return fail(CALL, CL_INVALID_PLATFORM);
            }
        }
        for &device in devices {
            match state.device(device) {
                Some((p, _)) if properties.platform.map_or(true, |want| want == p.id) => {}
                _ => return fail(CALL, CL_INVALID_DEVICE),
            }
        }
        Ok(state.insert(Body::Context { devices: devices.to_vec() }))
    }

    fn release_context(&self, context: SimHandle) -> Result<()> {
        self.state
            .borrow_mut()
            .app_release(context, SimObjectKind::Context, "clReleaseContext", CL_INVALID_CONTEXT)
    }

    fn create_program_with_binary(
        &self,
        context: SimHandle,
        devices: &[SimHandle],
        binary: &[u8],
    ) -> Result<(SimHandle, Vec<BinaryStatus>)> {
        const CALL: &str = "clCreateProgramWithBinary";
        let mut state = self.state.borrow_mut();
        state.live(context, SimObjectKind::Context, CALL, CL_INVALID_CONTEXT)?;
        let context_devices = state.context_devices(context);
        if devices.is_empty() || devices.iter().any(|d| !context_devices.contains(d)) {
            return fail(CALL, CL_INVALID_DEVICE);
        }
        if binary.is_empty() {
            return fail(CALL, CL_INVALID_BINARY);
        }
        let program = state.insert(Body::Program { context });
        Ok((program, vec![BinaryStatus(CL_SUCCESS); devices.len()]))
    }

    fn build_program(&self, program: SimHandle, devices: &[SimHandle]) -> Result<()> {
        const CALL: &str = "clBuildProgram";
        let state = self.state.borrow();
        state.live(program, SimObjectKind::Program, CALL, CL_INVALID_PROGRAM)?;
        let context_devices = state
            .program_context(program)
            .map(|context| state.context_devices(context))
            .unwrap_or_default();
        if devices.iter().any(|d| !context_devices.contains(d)) {
            return fail(CALL, CL_INVALID_DEVICE);
        }
        if let Some(log) = &state.build_failure {
            return Err(Error::Build {
                code: CL_BUILD_PROGRAM_FAILURE,
                log: log.clone(),
            });
        }
        Ok(())
    }

    fn release_program(&self, program: SimHandle) -> Result<()> {
        self.state
            .borrow_mut()
            .app_release(program, SimObjectKind::Program, "clReleaseProgram", CL_INVALID_PROGRAM)
    }

    fn create_kernel(&self, program: SimHandle, name: &str) -> Result<SimHandle> {
        const CALL: &str = "clCreateKernel";
        let mut state = self.state.borrow_mut();
        state.live(program, SimObjectKind::Program, CALL, CL_INVALID_PROGRAM)?;
        let Some(kernel) = state.kernels.get(name).cloned() else {
            return fail(CALL, CL_INVALID_KERNEL_NAME);
        };
        Ok(state.insert(Body::Kernel {
            program,
            name: name.to_string(),
            kernel,
            args: BTreeMap::new(),
        }))
    }

    fn set_kernel_arg_mem(&self, kernel: SimHandle, index: u32, mem: SimHandle) -> Result<()> {
        const CALL: &str = "clSetKernelArg";
        let mut state = self.state.borrow_mut();
        state.live(kernel, SimObjectKind::Kernel, CALL, CL_INVALID_KERNEL)?;
        state.live(mem, SimObjectKind::Mem, CALL, CL_INVALID_MEM_OBJECT)?;
        if state.mem_context(mem) != state.kernel_context(kernel) {
            return fail(CALL, CL_INVALID_MEM_OBJECT);
        }
        let obj = state.live_mut(kernel, SimObjectKind::Kernel, CALL, CL_INVALID_KERNEL)?;
        if let Body::Kernel { args, kernel: entry, .. } = &mut obj.body {
            if index >= entry.arity {
                return fail(CALL, CL_INVALID_ARG_INDEX);
            }
            args.insert(index, mem);
        }
        Ok(())
    }

    fn release_kernel(&self, kernel: SimHandle) -> Result<()> {
        self.state
            .borrow_mut()
            .app_release(kernel, SimObjectKind::Kernel, "clReleaseKernel", CL_INVALID_KERNEL)
    }

    unsafe fn create_buffer(
        &self,
        context: SimHandle,
        flags: cl_mem_flags,
        size: usize,
        host_ptr: HostPtr,
    ) -> Result<SimHandle> {
        const CALL: &str = "clCreateBuffer";
        let mut state = self.state.borrow_mut();
        state.live(context, SimObjectKind::Context, CALL, CL_INVALID_CONTEXT)?;
        if size == 0 {
            return fail(CALL, CL_INVALID_BUFFER_SIZE);
        }
        let access = flags & (CL_MEM_READ_WRITE | CL_MEM_WRITE_ONLY | CL_MEM_READ_ONLY);
        if access.count_ones() > 1 {
            return fail(CALL, CL_INVALID_VALUE);
        }
        if !matches!(host_ptr, HostPtr::None) && host_ptr.as_ptr().is_null() {
            return fail(CALL, CL_INVALID_HOST_PTR);
        }

        let storage = match host_ptr {
            HostPtr::Use(ptr) => Storage::Host { ptr, len: size },
            HostPtr::None | HostPtr::Copy(_) => {
                if let Some(limit) = state.memory_limit {
                    if state.allocated + size > limit {
                        return fail(CALL, CL_MEM_OBJECT_ALLOCATION_FAILURE);
                    }
                }
                let mut data = vec![0u8; size];
                if let HostPtr::Copy(ptr) = host_ptr {
                    data.copy_from_slice(std::slice::from_raw_parts(ptr, size));
                }
                state.allocated += size;
                Storage::Owned(data)
            }
        };
        Ok(state.insert(Body::Mem {
            context,
            flags: flags | host_ptr.bits(),
            storage,
        }))
    }

    fn release_mem(&self, mem: SimHandle) -> Result<()> {
        self.state
            .borrow_mut()
            .app_release(mem, SimObjectKind::Mem, "clReleaseMemObject", CL_INVALID_MEM_OBJECT)
    }

    fn create_queue(&self, context: SimHandle, device: SimHandle, _properties: QueueProperties) -> Result<SimHandle> {
        const CALL: &str = "clCreateCommandQueue";
        let mut state = self.state.borrow_mut();
        state.live(context, SimObjectKind::Context, CALL, CL_INVALID_CONTEXT)?;
        if !state.context_devices(context).contains(&device) {
            return fail(CALL, CL_INVALID_DEVICE);
        }
        Ok(state.insert(Body::Queue {
            context,
            pending: VecDeque::new(),
        }))
    }

    fn release_queue(&self, queue: SimHandle) -> Result<()> {
        self.state
            .borrow_mut()
            .app_release(queue, SimObjectKind::Queue, "clReleaseCommandQueue", CL_INVALID_COMMAND_QUEUE)
    }

    fn enqueue_task(&self, queue: SimHandle, kernel: SimHandle) -> Result<()> {
        const CALL: &str = "clEnqueueTask";
        let mut state = self.state.borrow_mut();
        state.live(queue, SimObjectKind::Queue, CALL, CL_INVALID_COMMAND_QUEUE)?;
        let obj = state.live(kernel, SimObjectKind::Kernel, CALL, CL_INVALID_KERNEL)?;
        let (bound, arity) = match &obj.body {
            Body::Kernel { args, kernel: entry, .. } => (args.clone(), entry.arity),
            _ => (BTreeMap::new(), 0),
        };
        if state.kernel_context(kernel) != state.queue_context(queue) {
            return fail(CALL, CL_INVALID_CONTEXT);
        }
        // Every argument slot must be set
        if (0..arity).any(|index| !bound.contains_key(&index)) {
            return fail(CALL, CL_INVALID_KERNEL_ARGS);
        }
        let args: Vec<SimHandle> = bound.into_values().collect();
        if args.iter().any(|mem| state.live(*mem, SimObjectKind::Mem, CALL, CL_INVALID_KERNEL_ARGS).is_err()) {
            return fail(CALL, CL_INVALID_KERNEL_ARGS);
        }

        state.retain(kernel);
        for &mem in &args {
            state.retain(mem);
        }
        if let Some(Body::Queue { pending, .. }) = state.objects.get_mut(&queue).map(|obj| &mut obj.body) {
            pending.push_back(PendingTask { kernel, args });
        }
        Ok(())
    }

    fn enqueue_write_buffer(&self, queue: SimHandle, mem: SimHandle, offset: usize, src: &[u8]) -> Result<()> {
        const CALL: &str = "clEnqueueWriteBuffer";
        let mut state = self.state.borrow_mut();
        state.live(queue, SimObjectKind::Queue, CALL, CL_INVALID_COMMAND_QUEUE)?;
        state.live(mem, SimObjectKind::Mem, CALL, CL_INVALID_MEM_OBJECT)?;
        if state.mem_context(mem) != state.queue_context(queue) {
            return fail(CALL, CL_INVALID_CONTEXT);
        }
        state.drain(queue);

        let Some(storage) = state.storage_mut(mem) else {
            return fail(CALL, CL_INVALID_MEM_OBJECT);
        };
        let target = storage.bytes_mut();
        if offset + src.len() > target.len() {
            return fail(CALL, CL_INVALID_VALUE);
        }
        target[offset..offset + src.len()].copy_from_slice(src);
        state.events.push(SimEvent::Write { mem, len: src.len() });
        Ok(())
    }

    fn enqueue_read_buffer(&self, queue: SimHandle, mem: SimHandle, offset: usize, dst: &mut [u8]) -> Result<()> {
        const CALL: &str = "clEnqueueReadBuffer";
        let mut state = self.state.borrow_mut();
        state.live(queue, SimObjectKind::Queue, CALL, CL_INVALID_COMMAND_QUEUE)?;
        state.live(mem, SimObjectKind::Mem, CALL, CL_INVALID_MEM_OBJECT)?;
        if state.mem_context(mem) != state.queue_context(queue) {
            return fail(CALL, CL_INVALID_CONTEXT);
        }
        state.drain(queue);

        let Some(storage) = state.storage_mut(mem) else {
            return fail(CALL, CL_INVALID_MEM_OBJECT);
        };
        let source = storage.bytes();
        if offset + dst.len() > source.len() {
            return fail(CALL, CL_INVALID_VALUE);
        }
        dst.copy_from_slice(&source[offset..offset + dst.len()]);
        state.events.push(SimEvent::Read { mem, len: dst.len() });
        Ok(())
    }

    fn finish(&self, queue: SimHandle) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.live(queue, SimObjectKind::Queue, "clFinish", CL_INVALID_COMMAND_QUEUE)?;
        state.drain(queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> (SimRuntime, SimHandle, SimHandle) {
        board_on(SimRuntime::fpga_board())
    }

    fn board_on(rt: SimRuntime) -> (SimRuntime, SimHandle, SimHandle) {
        let platform = rt.platform_ids().unwrap()[0];
        let device = rt.device_ids(platform, DeviceType::All).unwrap()[0];
        let context = rt.create_context(&[device], &ContextProperties::default()).unwrap();
        (rt, device, context)
    }

    #[test]
    fn enumerates_by_device_type() {
        let rt = SimRuntime::new()
            .with_platform_of_type("gpu", DeviceType::Gpu, &["g0", "g1"])
            .with_platform("fpga", &["f0"]);
        let platforms = rt.platform_ids().unwrap();
        assert_eq!(platforms.len(), 2);
        assert_eq!(rt.device_ids(platforms[0], DeviceType::Gpu).unwrap().len(), 2);
        assert!(rt.device_ids(platforms[0], DeviceType::Accelerator).unwrap().is_empty());
        assert_eq!(rt.device_ids(platforms[1], DeviceType::Default).unwrap().len(), 1);
        assert_eq!(rt.platform_name(platforms[1]).unwrap(), "fpga");
    }

    #[test]
    fn context_outlives_its_children() {
        let (rt, device, context) = board();
        let queue = rt.create_queue(context, device, QueueProperties::default()).unwrap();
        rt.release_context(context).unwrap();

        // The queue still holds the context alive
        assert_eq!(rt.live_count(SimObjectKind::Context), 1);
        rt.release_queue(queue).unwrap();
        assert_eq!(rt.live_objects(), 0);
    }

    #[test]
    fn released_handles_are_rejected() {
        let (rt, _, context) = board();
        let mem = unsafe { rt.create_buffer(context, CL_MEM_READ_WRITE, 16, HostPtr::None) }.unwrap();
        rt.release_mem(mem).unwrap();
        let err = rt.release_mem(mem).unwrap_err();
        assert_eq!(err.status(), Some(CL_INVALID_MEM_OBJECT));
    }

    #[test]
    fn tasks_wait_for_finish() {
        let (rt, device, context) = board();
        let (program, _) = rt.create_program_with_binary(context, &[device], b"bitstream").unwrap();
        let kernel = rt.create_kernel(program, "passthrough").unwrap();
        let input = unsafe { rt.create_buffer(context, CL_MEM_READ_ONLY, 4, HostPtr::None) }.unwrap();
        let output = unsafe { rt.create_buffer(context, CL_MEM_WRITE_ONLY, 4, HostPtr::None) }.unwrap();
        rt.set_kernel_arg_mem(kernel, 0, input).unwrap();
        rt.set_kernel_arg_mem(kernel, 1, output).unwrap();
        let queue = rt.create_queue(context, device, QueueProperties::default()).unwrap();

        rt.enqueue_write_buffer(queue, input, 0, &[1, 2, 3, 4]).unwrap();
        rt.enqueue_task(queue, kernel).unwrap();
        assert_eq!(rt.pending_tasks(queue), 1);
        assert_eq!(rt.buffer_contents(output).unwrap(), vec![0; 4]);

        rt.finish(queue).unwrap();
        assert_eq!(rt.pending_tasks(queue), 0);
        assert_eq!(rt.buffer_contents(output).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unbound_argument_slots_fail_the_enqueue() {
        let (rt, device, context) = board();
        let (program, _) = rt.create_program_with_binary(context, &[device], b"bitstream").unwrap();
        let kernel = rt.create_kernel(program, "passthrough").unwrap();
        let output = unsafe { rt.create_buffer(context, CL_MEM_WRITE_ONLY, 4, HostPtr::None) }.unwrap();
        rt.set_kernel_arg_mem(kernel, 1, output).unwrap();
        let queue = rt.create_queue(context, device, QueueProperties::default()).unwrap();

        let err = rt.enqueue_task(queue, kernel).unwrap_err();
        assert_eq!(err.status(), Some(CL_INVALID_KERNEL_ARGS));
    }

    #[test]
    fn kernel_without_arguments_cannot_be_enqueued() {
        let (rt, device, context) = board();
        let (program, _) = rt.create_program_with_binary(context, &[device], b"bitstream").unwrap();
        let kernel = rt.create_kernel(program, "vector_add").unwrap();
        let queue = rt.create_queue(context, device, QueueProperties::default()).unwrap();

        let err = rt.enqueue_task(queue, kernel).unwrap_err();
        assert_eq!(err.status(), Some(CL_INVALID_KERNEL_ARGS));
        assert_eq!(rt.pending_tasks(queue), 0);
    }

    #[test]
    fn argument_index_beyond_arity_is_rejected() {
        let (rt, device, context) = board();
        let (program, _) = rt.create_program_with_binary(context, &[device], b"bitstream").unwrap();
        let kernel = rt.create_kernel(program, "passthrough").unwrap();
        let mem = unsafe { rt.create_buffer(context, CL_MEM_READ_WRITE, 4, HostPtr::None) }.unwrap();

        let err = rt.set_kernel_arg_mem(kernel, 2, mem).unwrap_err();
        assert_eq!(err.status(), Some(CL_INVALID_ARG_INDEX));
    }

    #[test]
    fn memory_limit_applies_to_owned_storage() {
        let (rt, _, context) = board_on(SimRuntime::fpga_board().with_memory_limit(8));
        let first = unsafe { rt.create_buffer(context, CL_MEM_READ_WRITE, 8, HostPtr::None) }.unwrap();
        let err = unsafe { rt.create_buffer(context, CL_MEM_READ_WRITE, 1, HostPtr::None) }.unwrap_err();
        assert_eq!(err.status(), Some(CL_MEM_OBJECT_ALLOCATION_FAILURE));
        rt.release_mem(first).unwrap();
        assert_eq!(rt.allocated_bytes(), 0);
    }
}
