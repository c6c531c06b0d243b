//! The signal assembler: aggregates per-ADC-sample complex accumulations
//! from the integrator into the value `simulate` returns, in the shape
//! requested by `ReturnType`.

use num_complex::Complex64;

use crate::config::{ReturnType, SimMethod, SimParams};
use crate::phantom::Phantom;

/// The complex time-domain signal a scanner would record, in acquisition
/// order, plus whether the run completed or was cancelled. Cancellation is
/// represented as a flag rather than an error, since a cancelled run still
/// returns a partial, otherwise-valid signal.
#[derive(Debug, Clone, Default)]
pub struct Signal {
    pub t: Vec<f64>,
    pub samples: Vec<Complex64>,
    pub completed: bool,
}

impl Signal {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The `"mat"` return type: a flat matrix of complex ADC samples.
    pub fn as_mat(&self) -> &[Complex64] {
        &self.samples
    }
}

/// The final per-spin magnetization state, returned when `return_type ==
/// State`.
#[derive(Debug, Clone)]
pub struct MagnetizationState {
    pub mxy: Vec<Complex64>,
    pub mz: Vec<f64>,
}

/// An MRI raw-data structure: the signal plus the acquisition metadata a
/// downstream reconstruction pipeline needs to place samples in k-space.
#[derive(Debug, Clone)]
pub struct RawAcquisition {
    pub signal: Signal,
    pub dwell_times: Vec<f64>,
}

/// One dictionary-matching entry: a spin's final magnetization state keyed
/// by the tissue parameters that produced it.
#[derive(Debug, Clone, Copy)]
pub struct DictEntry {
    pub t1: f64,
    pub t2: f64,
    pub off_resonance: f64,
    pub mxy: Complex64,
    pub mz: f64,
}

/// What [`crate::simulate`] hands back. `SimMethod::BlochDict` always
/// yields `Dict`, one entry per spin, regardless of `return_type`; a plain
/// `SimMethod::Bloch` run is shaped by `return_type` as usual.
pub enum SimResult {
    Mat(Signal),
    State(MagnetizationState),
    Raw(RawAcquisition),
    Dict(Vec<DictEntry>),
}

impl SimResult {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            SimResult::Mat(s) => Some(s),
            SimResult::Raw(r) => Some(&r.signal),
            SimResult::State(_) | SimResult::Dict(_) => None,
        }
    }

    pub fn dict(&self) -> Option<&[DictEntry]> {
        match self {
            SimResult::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn build(
        signal: Signal,
        state: MagnetizationState,
        dwell_times: Vec<f64>,
        phantom: &Phantom,
        params: &SimParams,
    ) -> Self {
        if params.sim_method == SimMethod::BlochDict {
            let entries = (0..phantom.len())
                .map(|i| DictEntry {
                    t1: phantom.t1[i],
                    t2: phantom.t2[i],
                    off_resonance: phantom.off_resonance[i],
                    mxy: state.mxy[i],
                    mz: state.mz[i],
                })
                .collect();
            return SimResult::Dict(entries);
        }
        match params.return_type {
            ReturnType::Mat => SimResult::Mat(signal),
            ReturnType::State => SimResult::State(state),
            ReturnType::Raw => SimResult::Raw(RawAcquisition {
                signal,
                dwell_times,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn empty_signal_reports_empty() {
        let signal = Signal::default();
        check!(signal.is_empty());
        check!(signal.completed == false);
    }

    #[test]
    fn bloch_dict_method_yields_one_entry_per_spin_regardless_of_return_type() {
        let phantom = Phantom::stationary(
            vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)],
            vec![1.0, 0.8],
            vec![1.0, 0.9],
            vec![0.1, 0.08],
        )
        .unwrap();
        let state = MagnetizationState {
            mxy: vec![Complex64::new(0.1, 0.0), Complex64::new(0.2, 0.0)],
            mz: vec![0.9, 0.95],
        };
        let mut params = SimParams::default();
        params.sim_method = SimMethod::BlochDict;
        params.return_type = ReturnType::Mat;

        let result = SimResult::build(Signal::default(), state, vec![], &phantom, &params);
        let entries = result.dict().unwrap();
        check!(entries.len() == 2);
        check!(entries[0].t1 == 1.0);
        check!(entries[1].t2 == 0.9);
        check!(result.signal().is_none());
    }
}
