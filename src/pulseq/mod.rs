//! The Pulseq `.seq` text codec.
//!
//! Section-delimited text, one row per event/block, with a run-length
//! compressed shape table. The section splitter scans for a `[SECTION]`
//! header and consumes rows until the next one, across all nine Pulseq
//! sections.

mod read;
mod write;

pub use read::read;
pub use write::write;

use std::collections::BTreeMap;

use crate::event::Shape;
use crate::sequence::Sequence;

/// Gradient/block timing raster: all block durations and gradient/ADC
/// delay fields are integer multiples of this, 1 microsecond by default.
pub const GRAD_RASTER: f64 = 1e-6;
/// RF envelope sample spacing and RF delay raster, 100 nanoseconds by default.
pub const RF_RASTER: f64 = 1e-7;
/// ADC dwell/delay raster, 1 nanosecond (real scanners quote dwell in ns).
pub const ADC_RASTER: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl Version {
    pub fn packed(&self) -> u32 {
        self.major * 1_000_000 + self.minor * 1_000 + self.revision
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1 && (self.minor == 2 || self.minor == 4)
    }
}

/// A parsed sequence plus the side information needed to write it back out
/// losslessly: verbatim definitions and the shape table by id.
pub struct PulseqFile {
    pub version: Version,
    pub definitions: BTreeMap<String, String>,
    pub sequence: Sequence,
    pub shapes: Vec<Shape>,
}

pub(crate) fn round_to_raster(t: f64, raster: f64) -> i64 {
    (t / raster).round() as i64
}

pub(crate) fn from_raster(units: i64, raster: f64) -> f64 {
    units as f64 * raster
}

/// Row layout of `[RF]`: an RF event referencing its magnitude/phase/time
/// shapes by id. `time_id == 0` means the envelope sits on the uniform RF
/// raster (no explicit non-uniform time shape).
#[derive(Debug, Clone, Copy)]
pub(crate) struct RfRow {
    pub id: u32,
    pub amp: f64,
    pub mag_id: u32,
    pub phase_id: u32,
    pub time_id: u32,
    pub delay: i64,
    pub freq: f64,
    pub phase: f64,
}

/// Row layout of `[GRADIENTS]`: a free-form (arbitrary waveform) gradient.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GradRow {
    pub id: u32,
    pub amp: f64,
    pub shape_id: u32,
    pub time_id: u32,
    pub delay: i64,
}

/// Row layout of `[TRAP]`: a trapezoidal gradient.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrapRow {
    pub id: u32,
    pub amp: f64,
    pub rise: i64,
    pub flat: i64,
    pub fall: i64,
    pub delay: i64,
}

/// Row layout of `[ADC]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdcRow {
    pub id: u32,
    pub num: u32,
    pub dwell: i64,
    pub delay: i64,
    pub freq: f64,
    pub phase: f64,
}

/// Row layout of `[BLOCKS]`: `(index, duration, rf_id, gx_id, gy_id, gz_id,
/// adc_id, ext_id)`. Ids of `0` mean "absent". `ext_id` is retained
/// verbatim but never interpreted: it chains into `[EXTENSIONS]`, which
/// this codec does not parse.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockRow {
    pub index: u32,
    pub duration: i64,
    pub rf_id: u32,
    pub gx_id: u32,
    pub gy_id: u32,
    pub gz_id: u32,
    pub adc_id: u32,
    pub ext_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_packs_and_unpacks() {
        let v = Version {
            major: 1,
            minor: 4,
            revision: 2,
        };
        assert_eq!(v.packed(), 1_004_002);
        assert!(v.is_supported());
    }

    #[test]
    fn unsupported_minor_version_is_rejected() {
        let v = Version {
            major: 1,
            minor: 9,
            revision: 0,
        };
        assert!(!v.is_supported());
    }
}
