//! GPU backend seam. Device discovery for a real accelerator is not
//! implemented here: this type documents the extension point a real
//! wgpu/CUDA implementation would fill in, and always reports itself as
//! non-functional so `backend::select` falls back to the CPU.

use super::{Backend, DeviceBuffer, KernelId};

pub struct GpuBackend;

impl GpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn is_functional(&self) -> bool {
        // No accelerator library is linked into this build.
        false
    }

    fn allocate(&self, len: usize) -> DeviceBuffer {
        DeviceBuffer::Cpu(vec![0.0; len])
    }

    fn copy_in(&self, host: &[f64]) -> DeviceBuffer {
        DeviceBuffer::Cpu(host.to_vec())
    }

    fn copy_out(&self, buf: &DeviceBuffer) -> Vec<f64> {
        match buf {
            DeviceBuffer::Cpu(v) => v.clone(),
        }
    }

    fn launch(&self, _kernel: KernelId, n: usize, f: &(dyn Fn(usize) + Sync)) {
        (0..n).for_each(f);
    }

    fn synchronize(&self) {}
}
