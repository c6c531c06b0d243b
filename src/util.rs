//! Small numeric helpers shared by the scheduler and the Bloch kernels.

use std::ops::MulAssign;

/// Smallest positive `f64`, used to fuzz comparisons at event boundaries
/// throughout the scheduler. Never compare times for equality without it.
pub const EPS: f64 = f64::EPSILON;

/// A single spin's transverse/longitudinal state, represented as the 3-vector
/// `(Re M_xy, Im M_xy, M_z)`. Used by the excitation kernel to apply a
/// Rodrigues rotation per RF sub-step.
pub struct Spin([f64; 3]);

impl Spin {
    pub fn relaxed() -> Self {
        Self([0.0, 0.0, 1.0])
    }

    pub fn from_components(mxy_re: f64, mxy_im: f64, mz: f64) -> Self {
        Self([mxy_re, mxy_im, mz])
    }

    pub fn components(&self) -> (f64, f64, f64) {
        (self.0[0], self.0[1], self.0[2])
    }

    /// Flip angle of the rotation this spin has undergone from equilibrium.
    pub fn angle(&self) -> f64 {
        // Normalize because error can build up during rotations
        (self.0[2] / self.norm()).acos()
    }

    /// Phase of the applied rotation (not of the spin itself).
    pub fn phase(&self) -> f64 {
        let tmp = f64::atan2(self.0[1], self.0[0]) + std::f64::consts::FRAC_PI_2;
        // Map to the range [0, 2*pi]
        if tmp < 0.0 {
            tmp + std::f64::consts::TAU
        } else {
            tmp
        }
    }

    fn norm(&self) -> f64 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1] + self.0[2] * self.0[2]).sqrt()
    }
}

/// A 3x3 Rodrigues rotation matrix.
pub struct Rotation([[f64; 3]; 3]);

impl Rotation {
    /// Rotation of a purely on-resonance RF sub-step: `angle` is the flip
    /// angle, `phase` the RF phase, the rotation axis lying in the
    /// transverse plane at that phase. Equivalent to
    /// `from_axis_angle([phase.cos(), phase.sin(), 0.0], angle)`.
    pub fn new(angle: f64, phase: f64) -> Self {
        Self::from_axis_angle([phase.cos(), phase.sin(), 0.0], angle)
    }

    /// General Rodrigues rotation by `angle` about `axis` (need not be
    /// normalized). Used by the excitation kernel when `B_eff` has a
    /// nonzero longitudinal component (off-resonance during the pulse).
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let [nx, ny, nz] = if norm > 0.0 {
            [axis[0] / norm, axis[1] / norm, axis[2] / norm]
        } else {
            [0.0, 0.0, 1.0]
        };
        let (sin_a, cos_a) = angle.sin_cos();
        let one_minus_cos = 1.0 - cos_a;

        Self([
            [
                cos_a + nx * nx * one_minus_cos,
                nx * ny * one_minus_cos - nz * sin_a,
                nx * nz * one_minus_cos + ny * sin_a,
            ],
            [
                ny * nx * one_minus_cos + nz * sin_a,
                cos_a + ny * ny * one_minus_cos,
                ny * nz * one_minus_cos - nx * sin_a,
            ],
            [
                nz * nx * one_minus_cos - ny * sin_a,
                nz * ny * one_minus_cos + nx * sin_a,
                cos_a + nz * nz * one_minus_cos,
            ],
        ])
    }
}

impl MulAssign<Rotation> for Spin {
    fn mul_assign(&mut self, rhs: Rotation) {
        let x = rhs.0[0][0] * self.0[0] + rhs.0[0][1] * self.0[1] + rhs.0[0][2] * self.0[2];
        let y = rhs.0[1][0] * self.0[0] + rhs.0[1][1] * self.0[1] + rhs.0[1][2] * self.0[2];
        let z = rhs.0[2][0] * self.0[0] + rhs.0[2][1] * self.0[1] + rhs.0[2][2] * self.0[2];
        self.0 = [x, y, z];
    }
}

#[cfg(test)]
mod tests {
    use super::{Rotation, Spin};
    use assert2::check;

    #[test]
    fn random_rot() {
        for _ in 0..1000 {
            let angle = rand::random::<f64>() * std::f64::consts::PI;
            let phase = rand::random::<f64>() * std::f64::consts::TAU;

            let mut spin = Spin::relaxed();
            spin *= Rotation::new(angle, phase);

            check!((spin.angle() - angle).abs() < 1e-9);
            check!((spin.phase() - phase).abs() < 1e-9);
        }
    }

    #[test]
    fn axis_angle_about_z_only_changes_phase() {
        let mut spin = Spin::from_components(1.0, 0.0, 0.0);
        spin *= Rotation::from_axis_angle([0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2);
        let (re, im, z) = spin.components();
        check!(re.abs() < 1e-9);
        check!((im - 1.0).abs() < 1e-9);
        check!(z.abs() < 1e-9);
    }

    #[test]
    fn random_multi_rot() {
        for _ in 0..1000 {
            let angle = rand::random::<f64>() * std::f64::consts::PI;
            let phase = rand::random::<f64>() * std::f64::consts::TAU;

            let mut spin = Spin::relaxed();
            let subsamples = rand::random::<u32>() % 100 + 1;
            for _ in 0..subsamples {
                spin *= Rotation::new(angle / subsamples as f64, phase);
            }

            check!((spin.angle() - angle).abs() < 1e-6);
            check!((spin.phase() - phase).abs() < 1e-6);
        }
    }
}
