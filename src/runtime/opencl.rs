//! `Runtime` implementation over the system OpenCL library

use super::{BinaryStatus, ContextProperties, DeviceType, HostPtr, QueueProperties, Runtime};
use crate::error::{Error, Result};
use crate::opencl::bindings::*;
use crate::opencl::callbacks::log_context_error;
use crate::opencl::types::*;
use crate::opencl::utils::{from_c_bytes, to_c_string};
use std::ffi::c_void;
use std::ptr;

/// The OpenCL ICD loader linked into the process
#[derive(Debug, Clone, Copy, Default)]
pub struct ClRuntime;

impl ClRuntime {
    pub fn new() -> Self {
        ClRuntime
    }

    fn build_log(&self, program: cl_program, device: cl_device_id) -> String {
        let mut log_size = 0usize;
        let status = unsafe {
            clGetProgramBuildInfo(program, device, CL_PROGRAM_BUILD_LOG, 0, ptr::null_mut(), &mut log_size)
        };
        if status != CL_SUCCESS || log_size == 0 {
            return String::new();
        }
        let mut build_log = vec![0u8; log_size];
        let status = unsafe {
            clGetProgramBuildInfo(
                program,
                device,
                CL_PROGRAM_BUILD_LOG,
                log_size,
                build_log.as_mut_ptr() as *mut c_void,
                ptr::null_mut(),
            )
        };
        if status != CL_SUCCESS {
            return String::new();
        }
        from_c_bytes(&build_log)
    }
}

impl Runtime for ClRuntime {
    type Platform = cl_platform_id;
    type Device = cl_device_id;
    type Context = cl_context;
    type Program = cl_program;
    type Kernel = cl_kernel;
    type Mem = cl_mem;
    type Queue = cl_command_queue;

    fn platform_ids(&self) -> Result<Vec<cl_platform_id>> {
        let mut num_platforms: cl_uint = 0;
        let status = unsafe { clGetPlatformIDs(0, ptr::null_mut(), &mut num_platforms) };
        if status == CL_PLATFORM_NOT_FOUND_KHR {
            return Ok(Vec::new());
        }
        cl_status!(clGetPlatformIDs, status)?;
        if num_platforms == 0 {
            return Ok(Vec::new());
        }

        let mut platforms = vec![ptr::null_mut(); num_platforms as usize];
        cl_check!(clGetPlatformIDs(num_platforms, platforms.as_mut_ptr(), ptr::null_mut()))?;
        Ok(platforms)
    }

    fn platform_name(&self, platform: cl_platform_id) -> Result<String> {
        let mut size = 0usize;
        cl_check!(clGetPlatformInfo(platform, CL_PLATFORM_NAME, 0, ptr::null_mut(), &mut size))?;
        let mut name = vec![0u8; size];
        cl_check!(clGetPlatformInfo(
            platform,
            CL_PLATFORM_NAME,
            size,
            name.as_mut_ptr() as *mut c_void,
            ptr::null_mut()
        ))?;
        Ok(from_c_bytes(&name))
    }

    fn device_ids(&self, platform: cl_platform_id, device_type: DeviceType) -> Result<Vec<cl_device_id>> {
        let mut num_devices: cl_uint = 0;
        let status = unsafe { clGetDeviceIDs(platform, device_type.bits(), 0, ptr::null_mut(), &mut num_devices) };
        if status == CL_DEVICE_NOT_FOUND {
            return Ok(Vec::new());
        }
        cl_status!(clGetDeviceIDs, status)?;
        if num_devices == 0 {
            return Ok(Vec::new());
        }

        let mut devices = vec![ptr::null_mut(); num_devices as usize];
        cl_check!(clGetDeviceIDs(
            platform,
            device_type.bits(),
            num_devices,
            devices.as_mut_ptr(),
            ptr::null_mut()
        ))?;
        Ok(devices)
    }

    fn device_name(&self, device: cl_device_id) -> Result<String> {
        let mut size = 0usize;
        cl_check!(clGetDeviceInfo(device, CL_DEVICE_NAME, 0, ptr::null_mut(), &mut size))?;
        let mut name = vec![0u8; size];
        cl_check!(clGetDeviceInfo(
            device,
            CL_DEVICE_NAME,
            size,
            name.as_mut_ptr() as *mut c_void,
            ptr::null_mut()
        ))?;
        Ok(from_c_bytes(&name))
    }

    fn create_context(
        &self,
        devices: &[cl_device_id],
        properties: &ContextProperties<cl_platform_id>,
    ) -> Result<cl_context> {
        let props: Vec<cl_context_properties> = match properties.platform {
            Some(platform) => vec![CL_CONTEXT_PLATFORM, platform as cl_context_properties, 0],
            None => Vec::new(),
        };
        let props_ptr = if props.is_empty() { ptr::null() } else { props.as_ptr() };

        cl_create!(clCreateContext(
            props_ptr,
            devices.len() as cl_uint,
            devices.as_ptr(),
            Some(log_context_error),
            ptr::null_mut()
        ))
    }

    fn release_context(&self, context: cl_context) -> Result<()> {
        cl_check!(clReleaseContext(context))
    }

    fn create_program_with_binary(
        &self,
        context: cl_context,
        devices: &[cl_device_id],
        binary: &[u8],
    ) -> Result<(cl_program, Vec<BinaryStatus>)> {
        // The same bitstream is handed to every device of the context
        let lengths = vec![binary.len(); devices.len()];
        let binaries = vec![binary.as_ptr(); devices.len()];
        let mut binary_status = vec![CL_SUCCESS; devices.len()];

        let program = cl_create!(clCreateProgramWithBinary(
            context,
            devices.len() as cl_uint,
            devices.as_ptr(),
            lengths.as_ptr(),
            binaries.as_ptr(),
            binary_status.as_mut_ptr()
        ))?;
        Ok((program, binary_status.into_iter().map(BinaryStatus).collect()))
    }

    fn build_program(&self, program: cl_program, devices: &[cl_device_id]) -> Result<()> {
        let status = unsafe {
            clBuildProgram(
                program,
                devices.len() as cl_uint,
                devices.as_ptr(),
                ptr::null(),
                None,
                ptr::null_mut(),
            )
        };
        if status == CL_SUCCESS {
            return Ok(());
        }
        let log = devices
            .iter()
            .map(|&device| self.build_log(program, device))
            .filter(|log| !log.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Err(Error::Build { code: status, log })
    }

    fn release_program(&self, program: cl_program) -> Result<()> {
        cl_check!(clReleaseProgram(program))
    }

    fn create_kernel(&self, program: cl_program, name: &str) -> Result<cl_kernel> {
        let c_name = to_c_string(name)
            .ok_or_else(|| Error::invalid_argument(format!("kernel name `{name}` contains a NUL byte")))?;
        cl_create!(clCreateKernel(program, c_name.as_ptr()))
    }

    fn set_kernel_arg_mem(&self, kernel: cl_kernel, index: u32, mem: cl_mem) -> Result<()> {
        cl_check!(clSetKernelArg(
            kernel,
            index,
            std::mem::size_of::<cl_mem>(),
            &mem as *const cl_mem as *const c_void
        ))
    }

    fn release_kernel(&self, kernel: cl_kernel) -> Result<()> {
        cl_check!(clReleaseKernel(kernel))
    }

    unsafe fn create_buffer(&self, context: cl_context, flags: cl_mem_flags, size: usize, host_ptr: HostPtr) -> Result<cl_mem> {
        cl_create!(clCreateBuffer(
            context,
            flags | host_ptr.bits(),
            size,
            host_ptr.as_ptr() as *mut c_void
        ))
    }

    fn release_mem(&self, mem: cl_mem) -> Result<()> {
        cl_check!(clReleaseMemObject(mem))
    }

    fn create_queue(
        &self,
        context: cl_context,
        device: cl_device_id,
        properties: QueueProperties,
    ) -> Result<cl_command_queue> {
        cl_create!(clCreateCommandQueue(context, device, properties.bits()))
    }

    fn release_queue(&self, queue: cl_command_queue) -> Result<()> {
        cl_check!(clReleaseCommandQueue(queue))
    }

    fn enqueue_task(&self, queue: cl_command_queue, kernel: cl_kernel) -> Result<()> {
        cl_check!(clEnqueueTask(queue, kernel, 0, ptr::null(), ptr::null_mut()))
    }

    fn enqueue_write_buffer(&self, queue: cl_command_queue, mem: cl_mem, offset: usize, src: &[u8]) -> Result<()> {
        cl_check!(clEnqueueWriteBuffer(
            queue,
            mem,
            CL_TRUE,
            offset,
            src.len(),
            src.as_ptr() as *const c_void,
            0,
            ptr::null(),
            ptr::null_mut()
        ))
    }

    fn enqueue_read_buffer(&self, queue: cl_command_queue, mem: cl_mem, offset: usize, dst: &mut [u8]) -> Result<()> {
        cl_check!(clEnqueueReadBuffer(
            queue,
            mem,
            CL_TRUE,
            offset,
            dst.len(),
            dst.as_mut_ptr() as *mut c_void,
            0,
            ptr::null(),
            ptr::null_mut()
        ))
    }

    fn finish(&self, queue: cl_command_queue) -> Result<()> {
        cl_check!(clFinish(queue))
    }
}
