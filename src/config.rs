//! Simulation parameters recognized by [`crate::simulate`].

/// Requested shape of the value `simulate` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// Complex ADC samples as a flat matrix (default).
    #[default]
    Mat,
    /// The full final magnetization state of every spin.
    State,
    /// An MRI raw-data structure (samples plus acquisition metadata).
    Raw,
}

/// Standard per-spin Bloch evolution, or a dictionary of per-spin final
/// states (used by dictionary-matching reconstruction pipelines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimMethod {
    #[default]
    Bloch,
    BlochDict,
}

/// Parameters accepted by [`crate::simulate`]. `Default` matches the
/// nominal scheduler resolution of the adaptive time-grid scheduler.
#[derive(Debug, Clone)]
pub struct SimParams {
    pub return_type: ReturnType,
    pub sim_method: SimMethod,
    /// Request hardware acceleration; falls back to CPU if unavailable.
    pub gpu: bool,
    /// CPU parallelism bound. `0` means "let the backend decide".
    pub n_threads: usize,
    /// Nominal gradient/ADC scheduler step, s.
    pub dt_gr: f64,
    /// Nominal RF scheduler step, s.
    pub dt_rf: f64,
    /// Seed for the diffusion random walk, for reproducible PGSE runs.
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            return_type: ReturnType::default(),
            sim_method: SimMethod::default(),
            gpu: false,
            n_threads: 0,
            dt_gr: 1e-3,
            dt_rf: 1e-5,
            seed: 0,
        }
    }
}
