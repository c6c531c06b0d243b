//! The compute-backend abstraction: a small kernel-launch interface the
//! integrator dispatches its elementwise spin loops through, plus the
//! process-wide singleton that binds one backend for the remainder of the
//! process.
//!
//! The `Backend` trait abstracts over *compute* backends (a CPU thread pool
//! today, a GPU device as an extension point) rather than sequence file
//! formats, which are handled entirely by the `pulseq` codec.

mod cpu;
mod gpu;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

use std::sync::{Arc, OnceLock};

use crate::error::Error;

/// A device-resident buffer of `f64` values. The CPU backend's variant is a
/// plain `Vec`; a real GPU backend would hold a device pointer instead.
pub enum DeviceBuffer {
    Cpu(Vec<f64>),
}

impl DeviceBuffer {
    pub fn len(&self) -> usize {
        match self {
            DeviceBuffer::Cpu(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The elementwise kernels the integrator dispatches through `launch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelId {
    Precession,
    Excitation,
}

/// `allocate`/`copy_in`/`launch`/`copy_out`/`synchronize`. `launch` takes
/// the actual per-spin-index work as a closure rather than a fixed opcode
/// list: the two kernels in this crate (`bloch::precession_step`,
/// `bloch::excitation_step`) are typed Rust functions, not something a
/// textual kernel id could dispatch to, so the id is carried for
/// diagnostics/instrumentation while the closure does the actual
/// per-index dispatch.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reports whether this backend's accelerator library is loaded and
    /// functional. The CPU backend is always functional.
    fn is_functional(&self) -> bool;

    fn allocate(&self, len: usize) -> DeviceBuffer;

    fn copy_in(&self, host: &[f64]) -> DeviceBuffer;

    fn copy_out(&self, buf: &DeviceBuffer) -> Vec<f64>;

    /// Runs `f(i)` for every `i` in `0..n`, batched so each launch
    /// amortizes dispatch cost over at least 10^4 spin-step updates where
    /// `n` is large enough to do so.
    fn launch(&self, kernel: KernelId, n: usize, f: &(dyn Fn(usize) + Sync));

    fn synchronize(&self);
}

/// A lock-free `f64` cell, written from inside a `Backend::launch` closure
/// whose signature (`Fn(usize) + Sync`) gives every spin only a shared
/// reference into the output buffers. Std has no `AtomicF64`; this is the
/// usual compare-exchange-loop substitute. Used for both disjoint
/// (per-spin, no actual contention) and additive (per-ADC-sample
/// accumulation) writes in `simulate`.
pub(crate) struct AtomicF64(std::sync::atomic::AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(v.to_bits()))
    }

    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), std::sync::atomic::Ordering::Relaxed);
    }

    pub fn fetch_add(&self, v: f64) {
        let mut cur = self.0.load(std::sync::atomic::Ordering::Relaxed);
        loop {
            let new = f64::from_bits(cur) + v;
            match self.0.compare_exchange_weak(
                cur,
                new.to_bits(),
                std::sync::atomic::Ordering::Relaxed,
                std::sync::atomic::Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(prev) => cur = prev,
            }
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(std::sync::atomic::Ordering::Relaxed))
    }
}

static BACKEND: OnceLock<Arc<dyn Backend>> = OnceLock::new();

/// Binds the process-wide backend on first call and returns it on every
/// subsequent call. `want_gpu` and `n_threads` only matter for the very
/// first caller; later callers observe whatever was decided then.
///
/// If more than one backend is functional, or none is, this falls back to
/// the CPU with a diagnostic.
pub fn select(want_gpu: bool, n_threads: usize) -> Arc<dyn Backend> {
    BACKEND
        .get_or_init(|| {
            let gpu = GpuBackend::new();
            let cpu = CpuBackend::new(n_threads);
            match decide(want_gpu && gpu.is_functional(), cpu.is_functional(), want_gpu) {
                Decision::Gpu => Arc::new(gpu) as Arc<dyn Backend>,
                Decision::Cpu => Arc::new(cpu) as Arc<dyn Backend>,
            }
        })
        .clone()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Gpu,
    Cpu,
}

/// Picks between a functional GPU and a functional CPU, logging the
/// diagnostics `BackendUnavailable`/`MultipleBackends` call for: more than
/// one functional backend, or none, both fall back to the CPU.
fn decide(gpu_functional: bool, cpu_functional: bool, want_gpu: bool) -> Decision {
    match (gpu_functional, cpu_functional) {
        (true, true) => {
            log::warn!("{}", Error::MultipleBackends);
            Decision::Cpu
        }
        (true, false) => Decision::Gpu,
        (false, _) => {
            if want_gpu {
                log::warn!("{}", Error::BackendUnavailable);
            }
            Decision::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn cpu_backend_is_always_functional() {
        let backend = CpuBackend::new(0);
        check!(backend.is_functional());
    }

    #[test]
    fn select_binds_a_functional_backend() {
        let backend = select(false, 0);
        check!(backend.is_functional());
    }

    #[test]
    fn two_functional_backends_fall_back_to_cpu() {
        check!(decide(true, true, true) == Decision::Cpu);
    }

    #[test]
    fn no_functional_backend_falls_back_to_cpu() {
        check!(decide(false, false, true) == Decision::Cpu);
    }

    #[test]
    fn only_gpu_functional_selects_gpu() {
        check!(decide(true, false, true) == Decision::Gpu);
    }

    #[test]
    fn atomic_f64_add_is_consistent_under_contention() {
        let cell = AtomicF64::new(0.0);
        let backend = CpuBackend::new(0);
        backend.launch(KernelId::Precession, 10_000, &|_| cell.fetch_add(1.0));
        check!((cell.load() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn launch_visits_every_index() {
        let backend = CpuBackend::new(0);
        let buf = std::sync::Mutex::new(vec![0u8; 1000]);
        backend.launch(KernelId::Precession, 1000, &|i| {
            buf.lock().unwrap()[i] = 1;
        });
        check!(buf.lock().unwrap().iter().all(|&b| b == 1));
    }
}
