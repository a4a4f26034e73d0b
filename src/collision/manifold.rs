//! Contact manifolds.
//!
//! A manifold stores up to two contact points in the reference body's
//! local frame, typed by which body contributed the reference face.
//! Each point carries a feature id naming the vertex/face pair that
//! produced it; matching ids across narrow-phase updates lets the solver
//! reuse last step's impulses (warm starting).

use glam::DVec2;

use crate::config::MAX_MANIFOLD_POINTS;
use crate::utils::math::Transform2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureKind {
    #[default]
    Vertex,
    Face,
}

/// Identifies the geometry pair behind a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub kind_a: FeatureKind,
    pub kind_b: FeatureKind,
}

impl ContactFeature {
    pub fn vertex_vertex(index_a: u8, index_b: u8) -> Self {
        Self {
            index_a,
            index_b,
            kind_a: FeatureKind::Vertex,
            kind_b: FeatureKind::Vertex,
        }
    }

    /// Stable 32-bit key (little-endian field layout).
    pub fn key(&self) -> u32 {
        let k = |kind: FeatureKind| match kind {
            FeatureKind::Vertex => 0u32,
            FeatureKind::Face => 1u32,
        };
        (self.index_a as u32)
            | ((self.index_b as u32) << 8)
            | (k(self.kind_a) << 16)
            | (k(self.kind_b) << 24)
    }

    /// Swaps the A/B roles, used when a collide routine flips its inputs.
    pub fn swapped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            kind_a: self.kind_b,
            kind_b: self.kind_a,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold type (local anchor on the
    /// incident body for face manifolds, circle center for circles).
    pub local_point: DVec2,
    pub normal_impulse: f64,
    pub tangent_impulse: f64,
    pub feature: ContactFeature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

#[derive(Debug, Clone, Default)]
pub struct Manifold {
    pub manifold_type: ManifoldType,
    /// Reference-local normal (unused for circles).
    pub local_normal: DVec2,
    /// Reference-local anchor (circle center or face midpoint).
    pub local_point: DVec2,
    pub points: Vec<ManifoldPoint>,
}

impl Manifold {
    pub fn point_count(&self) -> usize {
        debug_assert!(self.points.len() <= MAX_MANIFOLD_POINTS);
        self.points.len()
    }
}

/// World-frame view of a manifold: shared normal, contact points, and
/// signed separations (negative = penetration).
#[derive(Debug, Clone, Default)]
pub struct WorldManifold {
    pub normal: DVec2,
    pub points: [DVec2; MAX_MANIFOLD_POINTS],
    pub separations: [f64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn initialize(
        manifold: &Manifold,
        xf_a: &Transform2,
        radius_a: f64,
        xf_b: &Transform2,
        radius_b: f64,
    ) -> Self {
        let mut out = WorldManifold::default();
        if manifold.points.is_empty() {
            return out;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                out.normal = DVec2::X;
                if point_a.distance_squared(point_b) > f64::EPSILON * f64::EPSILON {
                    out.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + radius_a * out.normal;
                let c_b = point_b - radius_b * out.normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(out.normal);
            }
            ManifoldType::FaceA => {
                out.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, mp) in manifold.points.iter().enumerate() {
                    let clip_point = xf_b.apply(mp.local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(out.normal)) * out.normal;
                    let c_b = clip_point - radius_b * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(out.normal);
                }
            }
            ManifoldType::FaceB => {
                out.normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, mp) in manifold.points.iter().enumerate() {
                    let clip_point = xf_a.apply(mp.local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(out.normal)) * out.normal;
                    let c_a = clip_point - radius_a * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(out.normal);
                }
                // Report the normal from A to B regardless of reference.
                out.normal = -out.normal;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn feature_keys_distinguish_roles() {
        let a = ContactFeature {
            index_a: 1,
            index_b: 2,
            kind_a: FeatureKind::Vertex,
            kind_b: FeatureKind::Face,
        };
        assert_ne!(a.key(), a.swapped().key());
        assert_eq!(a.swapped().swapped(), a);
    }

    #[test]
    fn circle_world_manifold_midpoint() {
        let manifold = Manifold {
            manifold_type: ManifoldType::Circles,
            local_normal: DVec2::ZERO,
            local_point: DVec2::ZERO,
            points: vec![ManifoldPoint::default()],
        };
        let xf_a = Transform2::IDENTITY;
        let xf_b = Transform2::new(DVec2::new(1.5, 0.0), 0.0);
        let wm = WorldManifold::initialize(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert_relative_eq!(wm.normal.x, 1.0);
        assert_relative_eq!(wm.separations[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(wm.points[0].x, 0.75, epsilon = 1e-12);
    }
}
