use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box. Invariant: `lower <= upper` componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: DVec2,
    pub upper: DVec2,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            lower: DVec2::ZERO,
            upper: DVec2::ZERO,
        }
    }
}

impl Aabb {
    pub fn new(lower: DVec2, upper: DVec2) -> Self {
        debug_assert!(lower.x <= upper.x && lower.y <= upper.y);
        Self { lower, upper }
    }

    /// Smallest box containing both points, in either order.
    pub fn from_points(a: DVec2, b: DVec2) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn center(&self) -> DVec2 {
        0.5 * (self.lower + self.upper)
    }

    pub fn extents(&self) -> DVec2 {
        0.5 * (self.upper - self.lower)
    }

    /// Perimeter, the 2D surface-area-heuristic cost metric.
    pub fn perimeter(&self) -> f64 {
        let d = self.upper - self.lower;
        2.0 * (d.x + d.y)
    }

    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        other.lower.x <= self.upper.x
            && other.lower.y <= self.upper.y
            && self.lower.x <= other.upper.x
            && self.lower.y <= other.upper.y
    }

    /// Inflates the box by `margin` on every side.
    pub fn extend(&self, margin: f64) -> Aabb {
        let r = DVec2::splat(margin);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Conservative segment test used by the tree traversal: does the
    /// segment `p1 → p1 + max_fraction·(p2 - p1)` touch this box?
    pub fn test_segment(&self, p1: DVec2, p2: DVec2, max_fraction: f64) -> bool {
        let target = p1 + (p2 - p1) * max_fraction;
        let segment_box = Aabb::from_points(p1, target);
        if !self.overlaps(&segment_box) {
            return false;
        }

        // Separating-axis test against the segment normal.
        let d = target - p1;
        let normal = DVec2::new(-d.y, d.x);
        let abs_normal = normal.abs();
        let c = self.center();
        let h = self.extents();
        let separation = (normal.dot(p1 - c)).abs();
        separation <= abs_normal.dot(h)
    }
}

/// Input for ray casts: a segment from `p1` toward `p2`, clipped to
/// `max_fraction` of that span.
#[derive(Debug, Clone, Copy)]
pub struct RayCastInput {
    pub p1: DVec2,
    pub p2: DVec2,
    pub max_fraction: f64,
}

/// Hit result: `point = p1 + fraction·(p2 - p1)` with the outward normal.
#[derive(Debug, Clone, Copy)]
pub struct RayCastOutput {
    pub normal: DVec2,
    pub fraction: f64,
}

impl Aabb {
    /// Slab-test ray cast against the box itself.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut t_min = f64::MIN;
        let mut t_max = f64::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let mut normal = DVec2::ZERO;

        for i in 0..2 {
            if d[i].abs() < f64::EPSILON {
                if p[i] < self.lower[i] || self.upper[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (self.lower[i] - p[i]) * inv_d;
                let mut t2 = (self.upper[i] - p[i]) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > t_min {
                    normal = DVec2::ZERO;
                    normal[i] = s;
                    t_min = t1;
                }
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if t_min < 0.0 || input.max_fraction < t_min {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: t_min,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box() -> Aabb {
        Aabb::new(DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0))
    }

    #[test]
    fn combine_contains_both() {
        let a = unit_box();
        let b = Aabb::new(DVec2::new(0.5, 0.5), DVec2::new(3.0, 2.0));
        let c = a.combine(&b);
        assert!(c.contains(&a));
        assert!(c.contains(&b));
        assert_relative_eq!(c.perimeter(), 2.0 * (4.0 + 3.0));
    }

    #[test]
    fn overlap_is_inclusive_at_faces() {
        let a = unit_box();
        let touching = Aabb::new(DVec2::new(1.0, -1.0), DVec2::new(2.0, 1.0));
        let apart = Aabb::new(DVec2::new(1.1, -1.0), DVec2::new(2.0, 1.0));
        assert!(a.overlaps(&touching));
        assert!(!a.overlaps(&apart));
    }

    #[test]
    fn ray_cast_hits_near_face() {
        let b = unit_box();
        let out = b
            .ray_cast(&RayCastInput {
                p1: DVec2::new(-3.0, 0.0),
                p2: DVec2::new(3.0, 0.0),
                max_fraction: 1.0,
            })
            .unwrap();
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(out.normal.x, -1.0);
    }

    #[test]
    fn ray_cast_misses_when_clipped() {
        let b = unit_box();
        assert!(b
            .ray_cast(&RayCastInput {
                p1: DVec2::new(-3.0, 0.0),
                p2: DVec2::new(3.0, 0.0),
                max_fraction: 0.2,
            })
            .is_none());
    }

    #[test]
    fn segment_test_rejects_diagonal_miss() {
        let b = unit_box();
        assert!(b.test_segment(DVec2::new(-2.0, 0.0), DVec2::new(2.0, 0.0), 1.0));
        assert!(!b.test_segment(DVec2::new(-3.0, 2.5), DVec2::new(2.5, 3.0), 1.0));
    }
}
