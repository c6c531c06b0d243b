//! Thread-parallel CPU implementation of the `Backend` trait, using a
//! `rayon` thread pool the way `hmunozb-spin-langevin`'s spin-dynamics
//! kernels parallelize their per-spin loops with `rayon::prelude`.

use rayon::prelude::*;
use rayon::ThreadPool;

use super::{Backend, DeviceBuffer, KernelId};

pub struct CpuBackend {
    pool: Option<ThreadPool>,
}

impl CpuBackend {
    /// `n_threads == 0` uses rayon's default (the global thread pool,
    /// sized to the number of logical cores).
    pub fn new(n_threads: usize) -> Self {
        let pool = if n_threads == 0 {
            None
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .ok()
        };
        Self { pool }
    }

    fn run<F: FnOnce()>(&self, f: F) {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn is_functional(&self) -> bool {
        true
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
        self.run(|| {
            (0..n).into_par_iter().for_each(f);
        });
    }

    fn synchronize(&self) {
        // Thread-parallel loops in `launch` are already complete by the
        // time it returns; nothing to wait on.
    }
}
