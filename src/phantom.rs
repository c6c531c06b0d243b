//! The spin isochromat cloud fed into the Bloch integrator.
//!
//! Per-spin data is stored struct-of-arrays, so the integrator can batch
//! elementwise operations over a whole phantom's positions, relaxation
//! times and motion fields at once.

use crate::error::{Error, Result};

/// A piecewise description of a spin's displacement along one axis over
/// time, dispatched by tag instead of a stored closure: this keeps
/// `Phantom` plain data, trivially copyable to a device backend.
#[derive(Debug, Clone)]
pub enum Motion {
    Zero,
    /// Linear interpolation between `(t, displacement)` breakpoints.
    LinearSegments { breakpoints: Vec<(f64, f64)> },
    /// Natural cubic interpolation between `(t, displacement)` breakpoints,
    /// stored as precomputed per-segment coefficients `a + b*dt + c*dt^2 + d*dt^3`.
    CubicSegments {
        breakpoints: Vec<f64>,
        coeffs: Vec<[f64; 4]>,
    },
    /// A cyclic, explicitly tabulated displacement with a period and a
    /// fixed number of segments per cycle, for phantoms with periodic
    /// motion.
    Precomputed { period: f64, table: Vec<f64> },
}

impl Motion {
    /// Evaluate the displacement at time `t`. O(1): binary search for the
    /// piecewise variants, modulo lookup for the precomputed/cyclic one.
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            Motion::Zero => 0.0,
            Motion::LinearSegments { breakpoints } => {
                if breakpoints.is_empty() {
                    return 0.0;
                }
                if t <= breakpoints[0].0 {
                    return breakpoints[0].1;
                }
                if t >= breakpoints[breakpoints.len() - 1].0 {
                    return breakpoints[breakpoints.len() - 1].1;
                }
                let idx = match breakpoints.binary_search_by(|(bt, _)| bt.total_cmp(&t)) {
                    Ok(i) => return breakpoints[i].1,
                    Err(i) => i - 1,
                };
                let (t0, u0) = breakpoints[idx];
                let (t1, u1) = breakpoints[idx + 1];
                u0 + (u1 - u0) * (t - t0) / (t1 - t0)
            }
            Motion::CubicSegments { breakpoints, coeffs } => {
                if breakpoints.len() < 2 {
                    return 0.0;
                }
                let t_clamped = t.clamp(breakpoints[0], breakpoints[breakpoints.len() - 1]);
                let idx = match breakpoints.binary_search_by(|bt| bt.total_cmp(&t_clamped)) {
                    Ok(i) => i.min(coeffs.len() - 1),
                    Err(i) => (i - 1).min(coeffs.len() - 1),
                };
                let dt = t_clamped - breakpoints[idx];
                let [a, b, c, d] = coeffs[idx];
                a + dt * (b + dt * (c + dt * d))
            }
            Motion::Precomputed { period, table } => {
                if table.is_empty() {
                    return 0.0;
                }
                let phase = t.rem_euclid(*period) / *period;
                let idx = ((phase * table.len() as f64) as usize).min(table.len() - 1);
                table[idx]
            }
        }
    }
}

/// Anisotropic diffusion tensor parameters for one spin: principal
/// diffusivities `Dλ1`/`Dλ2` (m²/s) and the in-plane tilt `Dθ` (rad) of the
/// tensor's principal axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diffusion {
    pub d_lambda1: f64,
    pub d_lambda2: f64,
    pub d_theta: f64,
}

/// A spatial cloud of `M` spin isochromats.
#[derive(Debug, Clone)]
pub struct Phantom {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub rho: Vec<f64>,
    pub t1: Vec<f64>,
    pub t2: Vec<f64>,
    pub t2_star: Vec<f64>,
    pub off_resonance: Vec<f64>,
    pub diffusion: Vec<Diffusion>,
    pub motion_x: Vec<Motion>,
    pub motion_y: Vec<Motion>,
    pub motion_z: Vec<Motion>,
}

impl Phantom {
    /// Build a motionless, non-diffusing, on-resonance phantom from the
    /// required per-spin tissue parameters. Convenience constructor used by
    /// tests and single-compartment scenarios.
    pub fn stationary(
        positions: Vec<(f64, f64, f64)>,
        rho: Vec<f64>,
        t1: Vec<f64>,
        t2: Vec<f64>,
    ) -> Result<Self> {
        let m = positions.len();
        let t2_star = t2.clone();
        let off_resonance = vec![0.0; m];
        let diffusion = vec![Diffusion::default(); m];
        let motion = vec![Motion::Zero; m];
        let (x, y, z) = positions
            .into_iter()
            .fold((vec![], vec![], vec![]), |(mut xs, mut ys, mut zs), (x, y, z)| {
                xs.push(x);
                ys.push(y);
                zs.push(z);
                (xs, ys, zs)
            });
        Self {
            x,
            y,
            z,
            rho,
            t1,
            t2,
            t2_star,
            off_resonance,
            diffusion,
            motion_x: motion.clone(),
            motion_y: motion.clone(),
            motion_z: motion,
        }
        .validate()
    }

    /// Builds a phantom from tissue-compartment maps, the shape a JEMRIS
    /// HDF5 `VObj` dump or an MRiLab `.mat` phantom decoder would hand over
    /// after flattening its voxel grid to a spin list: per-compartment
    /// positions, proton density, T1/T2/T2* and off-resonance, each the
    /// same length. This crate does not decode either container format
    /// itself (an external collaborator is expected to do that); this is
    /// the seam it hands its parsed arrays to.
    pub fn from_tissue_maps(
        positions: Vec<(f64, f64, f64)>,
        rho: Vec<f64>,
        t1: Vec<f64>,
        t2: Vec<f64>,
        t2_star: Vec<f64>,
        off_resonance: Vec<f64>,
    ) -> Result<Self> {
        let m = positions.len();
        let diffusion = vec![Diffusion::default(); m];
        let motion = vec![Motion::Zero; m];
        let (x, y, z) = positions
            .into_iter()
            .fold((vec![], vec![], vec![]), |(mut xs, mut ys, mut zs), (x, y, z)| {
                xs.push(x);
                ys.push(y);
                zs.push(z);
                (xs, ys, zs)
            });
        Self {
            x,
            y,
            z,
            rho,
            t1,
            t2,
            t2_star,
            off_resonance,
            diffusion,
            motion_x: motion.clone(),
            motion_y: motion.clone(),
            motion_z: motion,
        }
        .validate()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Checks the phantom's invariants: equal-length arrays, strictly
    /// positive relaxation times, and `T2 <= T2*`.
    pub fn validate(self) -> Result<Self> {
        let m = self.len();
        let fields: [(&'static str, usize); 9] = [
            ("y", self.y.len()),
            ("z", self.z.len()),
            ("rho", self.rho.len()),
            ("t1", self.t1.len()),
            ("t2", self.t2.len()),
            ("t2_star", self.t2_star.len()),
            ("off_resonance", self.off_resonance.len()),
            ("diffusion", self.diffusion.len()),
            ("motion_x", self.motion_x.len()),
        ];
        for (field, len) in fields {
            if len != m {
                return Err(Error::PhantomShapeMismatch {
                    field,
                    got: len,
                    expected: m,
                });
            }
        }
        if self.motion_y.len() != m || self.motion_z.len() != m {
            return Err(Error::PhantomShapeMismatch {
                field: "motion_y/motion_z",
                got: self.motion_y.len().min(self.motion_z.len()),
                expected: m,
            });
        }
        for i in 0..m {
            if !(self.t1[i] > 0.0 && self.t2[i] > 0.0 && self.t2_star[i] > 0.0) {
                return Err(Error::InvalidFormat(format!(
                    "spin {i}: relaxation times must be strictly positive"
                )));
            }
            if self.t2[i] > self.t2_star[i] {
                return Err(Error::InvalidFormat(format!(
                    "spin {i}: T2 ({}) exceeds T2* ({})",
                    self.t2[i], self.t2_star[i]
                )));
            }
        }
        Ok(self)
    }

    /// Scales every spin's proton density by `factor`, the phantom-side
    /// analogue of `Sequence::scale_amplitude`.
    pub fn scale_density(mut self, factor: f64) -> Self {
        for r in &mut self.rho {
            *r *= factor;
        }
        self
    }

    /// Position at time `t`, including the per-axis motion displacement.
    pub fn position_at(&self, i: usize, t: f64) -> (f64, f64, f64) {
        (
            self.x[i] + self.motion_x[i].eval(t),
            self.y[i] + self.motion_y[i].eval(t),
            self.z[i] + self.motion_z[i].eval(t),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn stationary_phantom_has_equal_length_arrays() {
        let p = Phantom::stationary(
            vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)],
            vec![1.0, 0.8],
            vec![1.0, 1.0],
            vec![0.1, 0.1],
        )
        .unwrap();
        check!(p.len() == 2);
    }

    #[test]
    fn t2_greater_than_t2_star_is_rejected() {
        let p = Phantom {
            x: vec![0.0],
            y: vec![0.0],
            z: vec![0.0],
            rho: vec![1.0],
            t1: vec![1.0],
            t2: vec![0.5],
            t2_star: vec![0.1],
            off_resonance: vec![0.0],
            diffusion: vec![Diffusion::default()],
            motion_x: vec![Motion::Zero],
            motion_y: vec![Motion::Zero],
            motion_z: vec![Motion::Zero],
        }
        .validate();
        check!(p.is_err());
    }

    #[test]
    fn linear_motion_interpolates() {
        let m = Motion::LinearSegments {
            breakpoints: vec![(0.0, 0.0), (1.0, 2.0)],
        };
        check!((m.eval(0.5) - 1.0).abs() < 1e-12);
        check!(m.eval(-1.0) == 0.0);
        check!(m.eval(5.0) == 2.0);
    }

    #[test]
    fn from_tissue_maps_builds_a_stationary_on_resonance_phantom() {
        let p = Phantom::from_tissue_maps(
            vec![(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)],
            vec![1.0, 0.9],
            vec![1.2, 1.0],
            vec![0.08, 0.07],
            vec![0.1, 0.08],
            vec![5.0, -3.0],
        )
        .unwrap();
        check!(p.len() == 2);
        check!(p.off_resonance == vec![5.0, -3.0]);
    }

    #[test]
    fn precomputed_motion_wraps_around_period() {
        let m = Motion::Precomputed {
            period: 1.0,
            table: vec![0.0, 1.0, 2.0, 3.0],
        };
        check!(m.eval(0.0) == m.eval(1.0));
    }
}
