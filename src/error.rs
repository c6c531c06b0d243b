use std::path::PathBuf;

use thiserror::Error;

/// All failure modes surfaced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("malformed sequence file: {0}")]
    InvalidFormat(String),

    #[error("unsupported pulseq version {major}.{minor}.{revision} (supported: 1.2.x, 1.4.x)")]
    UnsupportedVersion {
        major: u32,
        minor: u32,
        revision: u32,
    },

    #[error("{kind} id {id} is referenced by a block but not defined")]
    DanglingReference { kind: &'static str, id: u32 },

    #[error("phantom arrays have mismatched lengths: {field} has {got}, expected {expected}")]
    PhantomShapeMismatch {
        field: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("requested backend is not functional, falling back to CPU")]
    BackendUnavailable,

    #[error("more than one functional backend was found, falling back to CPU")]
    MultipleBackends,

    #[error("numerical instability detected at time step {step}: {detail}")]
    NumericalInstability { step: usize, detail: String },
    // Cancellation is not an error variant here: `signal::Signal::completed`
    // carries it instead, since a cancelled run still returns a valid
    // partial signal rather than failing the call.
}

pub type Result<T> = std::result::Result<T, Error>;
