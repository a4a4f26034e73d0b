//! 2D rigid-motion math layered on top of `glam`.
//!
//! Rotations are stored as (sin, cos) pairs so composing and applying
//! them never goes through trig after construction. `Sweep` carries the
//! interpolated motion of a body over one step for the TOI solver.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 2D cross product (z component of the 3D cross).
#[inline]
pub fn cross(a: DVec2, b: DVec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross of a scalar (z-axis) with a vector.
#[inline]
pub fn cross_sv(s: f64, v: DVec2) -> DVec2 {
    DVec2::new(-s * v.y, s * v.x)
}

/// Cross of a vector with a scalar (z-axis).
#[inline]
pub fn cross_vs(v: DVec2, s: f64) -> DVec2 {
    DVec2::new(s * v.y, -s * v.x)
}

/// Rotation stored as (sin, cos).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub s: f64,
    pub c: f64,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    pub fn from_angle(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    pub fn angle(&self) -> f64 {
        self.s.atan2(self.c)
    }

    /// Image of the local x axis.
    pub fn x_axis(&self) -> DVec2 {
        DVec2::new(self.c, self.s)
    }

    /// Image of the local y axis.
    pub fn y_axis(&self) -> DVec2 {
        DVec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    #[inline]
    pub fn apply(&self, v: DVec2) -> DVec2 {
        DVec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Applies the inverse rotation.
    #[inline]
    pub fn apply_inv(&self, v: DVec2) -> DVec2 {
        DVec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self ∘ other`.
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Composition `self⁻¹ ∘ other`.
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

/// Rigid motion from body-local to world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform2 {
    pub p: DVec2,
    pub q: Rot,
}

impl Transform2 {
    pub const IDENTITY: Transform2 = Transform2 {
        p: DVec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(position: DVec2, angle: f64) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    /// Maps a local point to world coordinates.
    #[inline]
    pub fn apply(&self, v: DVec2) -> DVec2 {
        self.q.apply(v) + self.p
    }

    /// Maps a world point into local coordinates.
    #[inline]
    pub fn apply_inv(&self, v: DVec2) -> DVec2 {
        self.q.apply_inv(v - self.p)
    }

    /// Composition: `(self ∘ other)(v) == self(other(v))`.
    pub fn mul(&self, other: Transform2) -> Transform2 {
        Transform2 {
            p: self.q.apply(other.p) + self.p,
            q: self.q.mul(other.q),
        }
    }

    /// Relative transform `self⁻¹ ∘ other`.
    pub fn mul_t(&self, other: Transform2) -> Transform2 {
        Transform2 {
            p: self.q.apply_inv(other.p - self.p),
            q: self.q.mul_t(other.q),
        }
    }
}

/// Interpolable motion of a body's center of mass over one step.
///
/// `c0`/`a0` hold the pose at `alpha0` within the step, `c`/`a` the pose
/// at the end. The TOI solver advances `alpha0` as it consumes time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: DVec2,
    pub c0: DVec2,
    pub c: DVec2,
    pub a0: f64,
    pub a: f64,
    /// Fraction of the step already consumed by TOI sub-stepping.
    pub alpha0: f64,
}

impl Sweep {
    /// Interpolated transform at `beta` ∈ [0, 1] between the sweep
    /// endpoints, with the center-of-mass offset applied.
    pub fn transform(&self, beta: f64) -> Transform2 {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = self.a0 * (1.0 - beta) + self.a * beta;
        let q = Rot::from_angle(angle);
        Transform2 {
            p: c - q.apply(self.local_center),
            q,
        }
    }

    /// Advances the start of the sweep to `alpha`, alpha0 <= alpha < 1.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += (self.a - self.a0) * beta;
        self.alpha0 = alpha;
    }

    /// Normalizes the angles to keep them near [-2π, 2π].
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f64::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rot_round_trips_vectors() {
        let q = Rot::from_angle(0.7);
        let v = DVec2::new(1.5, -2.25);
        let back = q.apply_inv(q.apply(v));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-12);
    }

    #[test]
    fn rot_composition_matches_angle_sum() {
        let a = Rot::from_angle(0.3);
        let b = Rot::from_angle(-1.1);
        assert_relative_eq!(a.mul(b).angle(), 0.3 - 1.1, epsilon = 1e-12);
        assert_relative_eq!(a.mul_t(b).angle(), -1.1 - 0.3, epsilon = 1e-12);
    }

    #[test]
    fn transform_inverse_composition() {
        let xf = Transform2::new(DVec2::new(3.0, -1.0), 1.2);
        let p = DVec2::new(0.5, 2.0);
        let local = xf.apply_inv(xf.apply(p));
        assert_relative_eq!(local.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(local.y, p.y, epsilon = 1e-12);
    }

    #[test]
    fn sweep_interpolates_center_and_angle() {
        let mut sweep = Sweep {
            local_center: DVec2::ZERO,
            c0: DVec2::new(0.0, 0.0),
            c: DVec2::new(2.0, 0.0),
            a0: 0.0,
            a: 1.0,
            alpha0: 0.0,
        };
        let mid = sweep.transform(0.5);
        assert_relative_eq!(mid.p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(mid.q.angle(), 0.5, epsilon = 1e-12);

        sweep.advance(0.5);
        assert_relative_eq!(sweep.c0.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sweep.alpha0, 0.5, epsilon = 1e-12);
        // The remapped start must still interpolate to the same endpoint.
        let end = sweep.transform(1.0);
        assert_relative_eq!(end.p.x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn cross_helpers_are_consistent() {
        let v = DVec2::new(2.0, 3.0);
        assert_relative_eq!(cross(v, cross_sv(1.0, v)), v.length_squared());
        assert_relative_eq!(cross_vs(v, 1.0).x, -cross_sv(1.0, v).x);
    }
}
