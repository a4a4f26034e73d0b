//! Time of impact between two swept proxies.
//!
//! Conservative advancement: pick a separating axis from the GJK witness
//! features, root-find the time where separation along that axis reaches
//! the target surface distance, re-run the distance query there, repeat.
//! The target sits just inside the summed radii so the discrete solver
//! still sees a small overlap to work with.

use glam::DVec2;

use crate::collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::config::{LINEAR_SLOP, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS};
use crate::utils::math::{Sweep, Transform2};

#[derive(Debug, Clone)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    pub t_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    /// Iteration cap reached; treat as no impact this step.
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

/// Separation along a fixed axis chosen from the GJK witness features,
/// evaluated at arbitrary sweep times.
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: DVec2,
    axis: DVec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f64,
    ) -> Self {
        debug_assert!(cache.count > 0 && cache.count < 3);

        let xf_a = sweep_a.transform(t1);
        let xf_b = sweep_b.transform(t1);

        if cache.count == 1 {
            let local_point_a = proxy_a.vertex(cache.index_a[0]);
            let local_point_b = proxy_b.vertex(cache.index_b[0]);
            let point_a = xf_a.apply(local_point_a);
            let point_b = xf_b.apply(local_point_b);
            let axis = (point_b - point_a).normalize_or_zero();
            return Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::Points,
                local_point: DVec2::ZERO,
                axis,
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B, one on A: use B's face.
            let local_point_b1 = proxy_b.vertex(cache.index_b[0]);
            let local_point_b2 = proxy_b.vertex(cache.index_b[1]);

            let edge = local_point_b2 - local_point_b1;
            let mut axis = DVec2::new(edge.y, -edge.x).normalize_or_zero();
            let normal = xf_b.q.apply(axis);

            let local_point = 0.5 * (local_point_b1 + local_point_b2);
            let point_b = xf_b.apply(local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));

            if (point_a - point_b).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::FaceB,
                local_point,
                axis,
            }
        } else {
            // Two points on A, one (or two) on B: use A's face.
            let local_point_a1 = proxy_a.vertex(cache.index_a[0]);
            let local_point_a2 = proxy_a.vertex(cache.index_a[1]);

            let edge = local_point_a2 - local_point_a1;
            let mut axis = DVec2::new(edge.y, -edge.x).normalize_or_zero();
            let normal = xf_a.q.apply(axis);

            let local_point = 0.5 * (local_point_a1 + local_point_a2);
            let point_a = xf_a.apply(local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));

            if (point_b - point_a).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationKind::FaceA,
                local_point,
                axis,
            }
        }
    }

    /// Minimum separation over supporting vertices at time `t`, plus the
    /// supporting index pair.
    fn find_min_separation(&self, t: f64) -> (f64, usize, usize) {
        let xf_a = self.sweep_a.transform(t);
        let xf_b = self.sweep_b.transform(t);

        match self.kind {
            SeparationKind::Points => {
                let axis_a = xf_a.q.apply_inv(self.axis);
                let axis_b = xf_b.q.apply_inv(-self.axis);

                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);

                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);

                let axis_b = xf_b.q.apply_inv(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), usize::MAX, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);

                let axis_a = xf_a.q.apply_inv(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, usize::MAX)
            }
        }
    }

    /// Separation of a fixed vertex pair at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f64) -> f64 {
        let xf_a = self.sweep_a.transform(t);
        let xf_b = self.sweep_b.transform(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Earliest t in [0, t_max] where the swept proxies reach the target
/// surface separation, or proof they never do.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    // Large absolute angles break the angular interpolation.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iterations = 0;

    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.transform(t1);
        let xf_b = sweep_b.transform(t1);

        // True distance at t1 decides whether the axis hunt is needed.
        let dist_out = distance(
            &mut cache,
            &DistanceInput {
                proxy_a,
                proxy_b,
                transform_a: xf_a,
                transform_b: xf_b,
                use_radii: false,
            },
        );

        if dist_out.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if dist_out.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve deepest supporting pairs one at a time.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iterations = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                // Advance the sweeps and restart with a fresh axis.
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // Root-find on [a1, a2], alternating secant and bisection.
            let mut root_iterations = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iterations % 2 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iterations += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iterations == MAX_TOI_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iterations += 1;
            if push_back_iterations == crate::config::MAX_POLYGON_VERTICES {
                break;
            }
        }

        iterations += 1;
        if done {
            break;
        }

        if iterations == MAX_TOI_ITERATIONS {
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn circle_proxy(radius: f64) -> DistanceProxy {
        DistanceProxy {
            vertices: vec![DVec2::ZERO],
            radius,
        }
    }

    fn static_sweep(x: f64) -> Sweep {
        Sweep {
            local_center: DVec2::ZERO,
            c0: DVec2::new(x, 0.0),
            c: DVec2::new(x, 0.0),
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn initially_overlapping_circles_report_t_zero() {
        let out = time_of_impact(&ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0),
            sweep_b: static_sweep(1.9),
            t_max: 1.0,
        });
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, 0.0);
    }

    #[test]
    fn approaching_circles_touch_at_expected_time() {
        // B moves from x=4 to x=1 against A at the origin; surfaces meet
        // when the centers are 2 apart, i.e. two thirds of the way in.
        let mut sweep_b = static_sweep(4.0);
        sweep_b.c = DVec2::new(1.0, 0.0);
        let out = time_of_impact(&ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0),
            sweep_b,
            t_max: 1.0,
        });
        assert_eq!(out.state, ToiState::Touching);
        assert_relative_eq!(out.t, 2.0 / 3.0, epsilon = 1e-2);
    }

    #[test]
    fn receding_circles_never_touch() {
        let mut sweep_b = static_sweep(3.0);
        sweep_b.c = DVec2::new(6.0, 0.0);
        let out = time_of_impact(&ToiInput {
            proxy_a: circle_proxy(1.0),
            proxy_b: circle_proxy(1.0),
            sweep_a: static_sweep(0.0),
            sweep_b,
            t_max: 1.0,
        });
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }
}
