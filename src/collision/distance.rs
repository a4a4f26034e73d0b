//! GJK closest-point query between two convex proxies.
//!
//! The simplex evolves toward the origin of the Minkowski difference
//! until it contains the origin (overlap) or stops improving. A
//! `SimplexCache` carries the supporting indices across calls so
//! temporally coherent queries converge in one or two iterations; the
//! time-of-impact solver leans on this heavily.

use glam::DVec2;

use crate::collision::shapes::Shape;
use crate::config::MAX_DISTANCE_ITERATIONS;
use crate::utils::math::{cross, Transform2};

/// A convex point cloud plus a radius, the GJK view of a shape child.
#[derive(Debug, Clone)]
pub struct DistanceProxy {
    pub vertices: Vec<DVec2>,
    pub radius: f64,
}

impl DistanceProxy {
    pub fn from_shape(shape: &Shape, child: usize) -> Self {
        Self {
            vertices: shape.proxy_vertices(child),
            radius: shape.radius(),
        }
    }

    pub fn vertex(&self, index: usize) -> DVec2 {
        self.vertices[index]
    }

    /// Index of the supporting vertex in direction `d`.
    pub fn support(&self, d: DVec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(d);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(d);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

/// Warm-start data for successive distance calls on the same pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexCache {
    /// Simplex metric (length/area) used to detect a stale cache.
    pub metric: f64,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub proxy_b: &'a DistanceProxy,
    pub transform_a: Transform2,
    pub transform_b: Transform2,
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceOutput {
    pub point_a: DVec2,
    pub point_b: DVec2,
    pub distance: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point on proxy A, world frame.
    wa: DVec2,
    /// Support point on proxy B, world frame.
    wb: DVec2,
    /// wb - wa.
    w: DVec2,
    /// Barycentric coordinate.
    a: f64,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform2,
        proxy_b: &DistanceProxy,
        xf_b: &Transform2,
    ) -> Self {
        let mut simplex = Simplex::default();
        simplex.count = cache.count;
        for i in 0..simplex.count {
            let index_a = cache.index_a[i];
            let index_b = cache.index_b[i];
            if index_a >= proxy_a.vertices.len() || index_b >= proxy_b.vertices.len() {
                simplex.count = 0;
                break;
            }
            let v = &mut simplex.v[i];
            v.index_a = index_a;
            v.index_b = index_b;
            v.wa = xf_a.apply(proxy_a.vertex(index_a));
            v.wb = xf_b.apply(proxy_b.vertex(index_b));
            v.w = v.wb - v.wa;
            v.a = 0.0;
        }

        // A cache whose metric drifted badly is worse than a cold start.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f64::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let v = &mut simplex.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.wa = xf_a.apply(proxy_a.vertex(0));
            v.wb = xf_b.apply(proxy_b.vertex(0));
            v.w = v.wb - v.wa;
            v.a = 1.0;
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> DVec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    DVec2::new(-e12.y, e12.x)
                } else {
                    DVec2::new(e12.y, -e12.x)
                }
            }
            _ => DVec2::ZERO,
        }
    }

    fn closest_point(&self) -> DVec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            _ => DVec2::ZERO,
        }
    }

    fn witness_points(&self) -> (DVec2, DVec2) {
        match self.count {
            1 => (self.v[0].wa, self.v[0].wb),
            2 => (
                self.v[0].a * self.v[0].wa + self.v[1].a * self.v[1].wa,
                self.v[0].a * self.v[0].wb + self.v[1].a * self.v[1].wb,
            ),
            _ => {
                let p = self.v[0].a * self.v[0].wa
                    + self.v[1].a * self.v[1].wa
                    + self.v[2].a * self.v[2].wa;
                (p, p)
            }
        }
    }

    fn metric(&self) -> f64 {
        match self.count {
            1 => 0.0,
            2 => (self.v[1].w - self.v[0].w).length(),
            _ => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
        }
    }

    /// Closest point on segment w1-w2 to the origin, by barycentric
    /// regions.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest point on triangle w1-w2-w3 to the origin, by barycentric
    /// regions.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // Vertex 1 region.
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 12 region.
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }
        // Edge 13 region.
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[1] = self.v[2];
            self.v[1].a = d13_2 * inv;
            self.count = 2;
            return;
        }
        // Vertex 2 region.
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Vertex 3 region.
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[0] = self.v[2];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge 23 region.
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[0] = self.v[2];
            self.v[0].a = d23_2 * inv;
            self.count = 2;
            return;
        }
        // Interior: the origin is enclosed.
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two convex proxies under fixed transforms.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;
    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, &xf_a, proxy_b, &xf_b);

    // Support indices from prior iterations, for cycle detection.
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iterations = 0;
    while iterations < MAX_DISTANCE_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Triangle containing the origin: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f64::EPSILON * f64::EPSILON {
            // The origin sits on an edge or vertex of the simplex;
            // witness points are still valid.
            break;
        }

        let index = simplex.count;
        let v = &mut simplex.v[index];
        v.index_a = proxy_a.support(xf_a.q.apply_inv(-d));
        v.wa = xf_a.apply(proxy_a.vertex(v.index_a));
        v.index_b = proxy_b.support(xf_b.q.apply_inv(d));
        v.wb = xf_b.apply(proxy_b.vertex(v.index_b));
        v.w = v.wb - v.wa;

        iterations += 1;

        // A repeated support pair means no further progress.
        let duplicate = (0..save_count)
            .any(|i| simplex.v[index].index_a == save_a[i] && simplex.v[index].index_b == save_b[i]);
        if duplicate {
            break;
        }
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_a - point_b).length();
    simplex.write_cache(cache);

    if input.use_radii {
        let ra = proxy_a.radius;
        let rb = proxy_b.radius;
        if dist > ra + rb && dist > f64::EPSILON {
            // Shrink the witness points onto the shape surfaces.
            dist -= ra + rb;
            let normal = (point_b - point_a).normalize();
            point_a += ra * normal;
            point_b -= rb * normal;
        } else {
            // Overlapping skins: collapse to a midpoint.
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec2;

    fn circle_proxy(radius: f64) -> DistanceProxy {
        DistanceProxy {
            vertices: vec![DVec2::ZERO],
            radius,
        }
    }

    fn query(proxy_a: &DistanceProxy, proxy_b: &DistanceProxy, offset: DVec2) -> DistanceOutput {
        let mut cache = SimplexCache::default();
        distance(
            &mut cache,
            &DistanceInput {
                proxy_a,
                proxy_b,
                transform_a: Transform2::IDENTITY,
                transform_b: Transform2::new(offset, 0.0),
                use_radii: true,
            },
        )
    }

    #[test]
    fn overlapping_unit_circles_report_zero() {
        let a = circle_proxy(1.0);
        let b = circle_proxy(1.0);
        let out = query(&a, &b, DVec2::new(1.9, 0.0));
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn separated_unit_circles_report_gap() {
        let a = circle_proxy(1.0);
        let b = circle_proxy(1.0);
        let out = query(&a, &b, DVec2::new(2.1, 0.0));
        assert_relative_eq!(out.distance, 0.1, epsilon = 1e-12);
        assert_relative_eq!(out.point_a.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(out.point_b.x, 1.1, epsilon = 1e-12);
    }

    #[test]
    fn box_pair_distance_along_axis() {
        let square = DistanceProxy {
            vertices: vec![
                DVec2::new(-0.5, -0.5),
                DVec2::new(0.5, -0.5),
                DVec2::new(0.5, 0.5),
                DVec2::new(-0.5, 0.5),
            ],
            radius: 0.0,
        };
        let out = query(&square, &square, DVec2::new(3.0, 0.0));
        assert_relative_eq!(out.distance, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn warm_cache_converges_fast() {
        let square = DistanceProxy {
            vertices: vec![
                DVec2::new(-0.5, -0.5),
                DVec2::new(0.5, -0.5),
                DVec2::new(0.5, 0.5),
                DVec2::new(-0.5, 0.5),
            ],
            radius: 0.0,
        };
        let mut cache = SimplexCache::default();
        let input = DistanceInput {
            proxy_a: &square,
            proxy_b: &square,
            transform_a: Transform2::IDENTITY,
            transform_b: Transform2::new(DVec2::new(2.0, 0.4), 0.0),
            use_radii: false,
        };
        let cold = distance(&mut cache, &input);
        let warm = distance(&mut cache, &input);
        assert_relative_eq!(cold.distance, warm.distance, epsilon = 1e-12);
        assert!(warm.iterations <= cold.iterations);
    }
}
