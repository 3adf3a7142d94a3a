//! OpenCL accelerator backend.
//!
//! Arrays live in device buffers (always f32 on the device; f16 inputs are
//! widened on upload and narrowed again in `to_host`). Every handle is owned
//! by a Rust value and released on drop.

pub mod bindings;
pub mod kernels;
pub mod types;

use std::ffi::{c_char, c_void};
use std::ops::Range;
use std::ptr;

use tracing::debug;

use self::bindings::*;
use self::kernels::{MATMUL_COLS_ENTRY, MATMUL_COLS_KERNEL};
use self::types::*;
use crate::backend::{check_matmul_cols, ComputeBackend, DeviceMemory};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;
use crate::tensor::Tensor;

/// Run an OpenCL call returning a status code and bail out on failure.
macro_rules! cl_check {
    ($what:literal, $call:expr) => {{
        let code = unsafe { $call };
        if code != CL_SUCCESS {
            return Err(TensorError::Device(format!(
                "{} failed with OpenCL error {}",
                $what, code
            )));
        }
    }};
}

fn check_handle(handle: *mut c_void, code: cl_int, what: &str) -> Result<()> {
    if handle.is_null() || code != CL_SUCCESS {
        return Err(TensorError::Device(format!(
            "{} failed with OpenCL error {}",
            what, code
        )));
    }
    Ok(())
}

/// Owned device buffer.
#[derive(Debug)]
struct MemHandle(cl_mem);

impl Drop for MemHandle {
    fn drop(&mut self) {
        unsafe {
            clReleaseMemObject(self.0);
        }
    }
}

/// A matrix resident in device memory.
///
/// Zero-element matrices carry no buffer since OpenCL rejects empty
/// allocations.
#[derive(Debug)]
pub struct ClArray {
    mem: Option<MemHandle>,
    shape: Shape,
    dtype: DType,
}

impl ClArray {
    /// Element type the array had on the host side.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    fn raw(&self) -> cl_mem {
        self.mem.as_ref().map_or(ptr::null_mut(), |m| m.0)
    }
}

/// Compute backend running the column-block matmul kernel on an OpenCL device.
#[derive(Debug)]
pub struct OpenClBackend {
    device: cl_device_id,
    context: cl_context,
    queue: cl_command_queue,
    program: cl_program,
    kernel: cl_kernel,
    device_name: String,
    memory: DeviceMemory,
}

impl OpenClBackend {
    /// Open the first GPU (or, failing that, any) device on the first platform
    /// and compile the matmul kernel.
    pub fn new() -> Result<Self> {
        let mut platform: cl_platform_id = ptr::null_mut();
        let mut num_platforms: cl_uint = 0;
        cl_check!(
            "clGetPlatformIDs",
            clGetPlatformIDs(1, &mut platform, &mut num_platforms)
        );
        if num_platforms == 0 {
            return Err(TensorError::Device("no OpenCL platform found".to_string()));
        }

        let device = first_device(platform)?;
        let memory = DeviceMemory {
            global_bytes: device_info_u64(device, CL_DEVICE_GLOBAL_MEM_SIZE)?,
            max_alloc_bytes: device_info_u64(device, CL_DEVICE_MAX_MEM_ALLOC_SIZE)?,
        };
        let device_name = device_info_string(device, CL_DEVICE_NAME)
            .unwrap_or_else(|_| "unknown".to_string());

        let mut code: cl_int = 0;
        let context =
            unsafe { clCreateContext(ptr::null(), 1, &device, None, ptr::null_mut(), &mut code) };
        check_handle(context, code, "clCreateContext")?;

        // From here on, Drop releases whatever has been created so far.
        let mut backend = OpenClBackend {
            device,
            context,
            queue: ptr::null_mut(),
            program: ptr::null_mut(),
            kernel: ptr::null_mut(),
            device_name,
            memory,
        };

        backend.queue = unsafe { clCreateCommandQueue(context, device, 0, &mut code) };
        check_handle(backend.queue, code, "clCreateCommandQueue")?;

        let source = MATMUL_COLS_KERNEL.as_ptr() as *const c_char;
        let length = MATMUL_COLS_KERNEL.len();
        backend.program =
            unsafe { clCreateProgramWithSource(context, 1, &source, &length, &mut code) };
        check_handle(backend.program, code, "clCreateProgramWithSource")?;

        let status = unsafe {
            clBuildProgram(
                backend.program,
                1,
                &device,
                ptr::null(),
                None,
                ptr::null_mut(),
            )
        };
        if status != CL_SUCCESS {
            let log = backend.build_log();
            return Err(TensorError::Device(format!(
                "kernel build failed with OpenCL error {}: {}",
                status, log
            )));
        }

        backend.kernel = unsafe {
            clCreateKernel(
                backend.program,
                MATMUL_COLS_ENTRY.as_ptr() as *const c_char,
                &mut code,
            )
        };
        check_handle(backend.kernel, code, "clCreateKernel")?;

        debug!(device = %backend.device_name, ?memory, "opencl backend ready");
        Ok(backend)
    }

    /// Human-readable device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn build_log(&self) -> String {
        let mut size: usize = 0;
        unsafe {
            clGetProgramBuildInfo(
                self.program,
                self.device,
                CL_PROGRAM_BUILD_LOG,
                0,
                ptr::null_mut(),
                &mut size,
            );
        }
        let mut log = vec![0u8; size];
        unsafe {
            clGetProgramBuildInfo(
                self.program,
                self.device,
                CL_PROGRAM_BUILD_LOG,
                size,
                log.as_mut_ptr() as *mut c_void,
                ptr::null_mut(),
            );
        }
        String::from_utf8_lossy(&log).trim_end_matches('\0').to_string()
    }

    fn create_buffer(&self, flags: cl_mem_flags, bytes: usize, host: *mut c_void) -> Result<MemHandle> {
        let mut code: cl_int = 0;
        let mem = unsafe { clCreateBuffer(self.context, flags, bytes, host, &mut code) };
        check_handle(mem, code, "clCreateBuffer")?;
        Ok(MemHandle(mem))
    }

    fn set_arg<T>(&self, index: cl_uint, value: &T) -> Result<()> {
        cl_check!(
            "clSetKernelArg",
            clSetKernelArg(
                self.kernel,
                index,
                std::mem::size_of::<T>(),
                value as *const T as *const c_void,
            )
        );
        Ok(())
    }
}

impl Drop for OpenClBackend {
    fn drop(&mut self) {
        unsafe {
            if !self.kernel.is_null() {
                clReleaseKernel(self.kernel);
            }
            if !self.program.is_null() {
                clReleaseProgram(self.program);
            }
            if !self.queue.is_null() {
                clReleaseCommandQueue(self.queue);
            }
            if !self.context.is_null() {
                clReleaseContext(self.context);
            }
        }
    }
}

impl ComputeBackend for OpenClBackend {
    type Array = ClArray;

    fn name(&self) -> &str {
        "opencl"
    }

    fn is_host(&self) -> bool {
        false
    }

    fn upload(&self, host: Tensor) -> Result<ClArray> {
        let shape = host.shape().clone();
        let dtype = host.dtype();
        if shape.numel() == 0 {
            return Ok(ClArray {
                mem: None,
                shape,
                dtype,
            });
        }
        let widened;
        let data: &[f32] = match host.storage() {
            CpuStorage::F32(v) => v,
            CpuStorage::F16(_) => {
                widened = host.to_f32_vec();
                &widened
            }
        };
        let mem = self.create_buffer(
            CL_MEM_READ_ONLY | CL_MEM_COPY_HOST_PTR,
            std::mem::size_of_val(data),
            data.as_ptr() as *mut c_void,
        )?;
        Ok(ClArray {
            mem: Some(mem),
            shape,
            dtype,
        })
    }

    fn shape(&self, array: &ClArray) -> Shape {
        array.shape.clone()
    }

    fn matmul_cols(&self, a: &ClArray, b: &ClArray, cols: Range<usize>) -> Result<ClArray> {
        let (m, k, n) = check_matmul_cols(&a.shape, &b.shape, &cols)?;
        if a.dtype != b.dtype {
            return Err(TensorError::DTypeMismatch {
                expected: a.dtype.to_string(),
                got: b.dtype.to_string(),
            });
        }
        let width = cols.len();
        let shape = Shape::matrix(m, width);
        if m == 0 || width == 0 {
            return Ok(ClArray {
                mem: None,
                shape,
                dtype: a.dtype,
            });
        }
        if k == 0 {
            return self.upload(Tensor::zeros(shape, DType::F32)).map(|mut z| {
                z.dtype = a.dtype;
                z
            });
        }

        let as_uint = |v: usize| {
            cl_uint::try_from(v).map_err(|_| {
                TensorError::Device(format!("dimension {} exceeds the kernel's u32 range", v))
            })
        };
        let (m_u, k_u, n_u) = (as_uint(m)?, as_uint(k)?, as_uint(n)?);
        let (start_u, width_u) = (as_uint(cols.start)?, as_uint(width)?);

        let out = self.create_buffer(
            CL_MEM_READ_WRITE,
            m * width * std::mem::size_of::<f32>(),
            ptr::null_mut(),
        )?;

        let (a_mem, b_mem) = (a.raw(), b.raw());
        self.set_arg(0, &a_mem)?;
        self.set_arg(1, &b_mem)?;
        self.set_arg(2, &out.0)?;
        self.set_arg(3, &m_u)?;
        self.set_arg(4, &k_u)?;
        self.set_arg(5, &n_u)?;
        self.set_arg(6, &start_u)?;
        self.set_arg(7, &width_u)?;

        let global = [m, width];
        cl_check!(
            "clEnqueueNDRangeKernel",
            clEnqueueNDRangeKernel(
                self.queue,
                self.kernel,
                2,
                ptr::null(),
                global.as_ptr(),
                ptr::null(),
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        );

        Ok(ClArray {
            mem: Some(out),
            shape,
            dtype: a.dtype,
        })
    }

    fn to_host(&self, array: ClArray) -> Result<Tensor> {
        let Some(mem) = array.mem.as_ref() else {
            return Ok(Tensor::zeros(array.shape, array.dtype));
        };
        let mut data = vec![0.0f32; array.shape.numel()];
        cl_check!(
            "clEnqueueReadBuffer",
            clEnqueueReadBuffer(
                self.queue,
                mem.0,
                CL_TRUE,
                0,
                std::mem::size_of_val(data.as_slice()),
                data.as_mut_ptr() as *mut c_void,
                0,
                ptr::null(),
                ptr::null_mut(),
            )
        );
        cl_check!("clFinish", clFinish(self.queue));
        Tensor::from_storage(CpuStorage::from_f32_as(array.dtype, data), array.shape.clone())
    }

    fn device_memory(&self) -> Option<DeviceMemory> {
        Some(self.memory)
    }
}

fn first_device(platform: cl_platform_id) -> Result<cl_device_id> {
    for device_type in [CL_DEVICE_TYPE_GPU, CL_DEVICE_TYPE_ALL] {
        let mut device: cl_device_id = ptr::null_mut();
        let mut count: cl_uint = 0;
        let code = unsafe { clGetDeviceIDs(platform, device_type, 1, &mut device, &mut count) };
        if code == CL_SUCCESS && count > 0 && !device.is_null() {
            return Ok(device);
        }
    }
    Err(TensorError::Device("no OpenCL device found".to_string()))
}

fn device_info_u64(device: cl_device_id, param: cl_device_info) -> Result<u64> {
    let mut value: cl_ulong = 0;
    cl_check!(
        "clGetDeviceInfo",
        clGetDeviceInfo(
            device,
            param,
            std::mem::size_of::<cl_ulong>(),
            &mut value as *mut cl_ulong as *mut c_void,
            ptr::null_mut(),
        )
    );
    Ok(value)
}

fn device_info_string(device: cl_device_id, param: cl_device_info) -> Result<String> {
    let mut size: usize = 0;
    cl_check!(
        "clGetDeviceInfo",
        clGetDeviceInfo(device, param, 0, ptr::null_mut(), &mut size)
    );
    let mut buf = vec![0u8; size];
    cl_check!(
        "clGetDeviceInfo",
        clGetDeviceInfo(
            device,
            param,
            size,
            buf.as_mut_ptr() as *mut c_void,
            ptr::null_mut(),
        )
    );
    Ok(String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use approx::assert_relative_eq;

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn test_matches_cpu_backend() {
        let cl = OpenClBackend::new().unwrap();
        let cpu = CpuBackend::new();
        let a = Tensor::new((0..12).map(|i| i as f32 * 0.25).collect(), Shape::matrix(4, 3));
        let b = Tensor::new((0..15).map(|i| 1.0 - i as f32 * 0.1).collect(), Shape::matrix(3, 5));

        let da = cl.upload(a.clone()).unwrap();
        let db = cl.upload(b.clone()).unwrap();
        let got = cl.to_host(cl.matmul_cols(&da, &db, 1..4).unwrap()).unwrap();
        let want = cpu.matmul_cols(&a, &b, 1..4).unwrap();

        assert_eq!(got.shape(), want.shape());
        for (g, w) in got.to_f32_vec().iter().zip(want.to_f32_vec()) {
            assert_relative_eq!(*g, w, epsilon = 1e-4);
        }
        assert!(cl.device_memory().is_some());
    }
}
