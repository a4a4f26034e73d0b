//! Collision shapes: circle, edge, convex polygon, and chain.
//!
//! Chains present themselves as a sequence of edge children; everything
//! else has a single child. Polygons carry a small skin radius so their
//! cores never touch exactly.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::{Aabb, RayCastInput, RayCastOutput};
use crate::config::{MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::utils::math::{cross, Transform2};
use crate::PhysicsError;

/// Mass, center of mass (local), and rotational inertia about the local
/// origin, as produced by integrating a shape at a given density.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassData {
    pub mass: f64,
    pub center: DVec2,
    pub inertia: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleShape {
    pub position: DVec2,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeShape {
    pub vertex1: DVec2,
    pub vertex2: DVec2,
    /// Ghost vertex preceding `vertex1`, from an adjoining chain segment.
    pub vertex0: Option<DVec2>,
    /// Ghost vertex following `vertex2`.
    pub vertex3: Option<DVec2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonShape {
    pub centroid: DVec2,
    pub vertices: Vec<DVec2>,
    pub normals: Vec<DVec2>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainShape {
    pub vertices: Vec<DVec2>,
    pub is_loop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    Circle(CircleShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    /// Circle centered at a local offset.
    pub fn circle(position: DVec2, radius: f64) -> Result<Shape, PhysicsError> {
        if !(radius > 0.0 && radius.is_finite() && position.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "circle requires a finite positive radius and finite center",
            ));
        }
        Ok(Shape::Circle(CircleShape { position, radius }))
    }

    /// One-sided line segment.
    pub fn edge(v1: DVec2, v2: DVec2) -> Result<Shape, PhysicsError> {
        if !(v1.is_finite() && v2.is_finite()) || v1 == v2 {
            return Err(PhysicsError::InvalidArgument(
                "edge requires two distinct finite endpoints",
            ));
        }
        Ok(Shape::Edge(EdgeShape {
            vertex1: v1,
            vertex2: v2,
            vertex0: None,
            vertex3: None,
        }))
    }

    /// Convex polygon from a point cloud; the hull is computed and must
    /// have at least three non-collinear vertices.
    pub fn polygon(points: &[DVec2]) -> Result<Shape, PhysicsError> {
        PolygonShape::new(points).map(Shape::Polygon)
    }

    /// Axis-aligned box of half extents (hx, hy) about the local origin.
    pub fn rect(hx: f64, hy: f64) -> Result<Shape, PhysicsError> {
        if !(hx > 0.0 && hy > 0.0 && hx.is_finite() && hy.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "box requires finite positive half extents",
            ));
        }
        Ok(Shape::Polygon(PolygonShape::rect(hx, hy)))
    }

    /// Open chain of edges with ghost-vertex smoothing between segments.
    pub fn chain(vertices: &[DVec2], is_loop: bool) -> Result<Shape, PhysicsError> {
        let min = if is_loop { 3 } else { 2 };
        if vertices.len() < min || vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "chain requires at least two finite vertices (three for loops)",
            ));
        }
        Ok(Shape::Chain(ChainShape {
            vertices: vertices.to_vec(),
            is_loop,
        }))
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius used by distance/TOI and manifold generation.
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            _ => POLYGON_RADIUS,
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(chain) => chain.segment_count(),
            _ => 1,
        }
    }

    /// The child edge a chain exposes at `index`; other shapes return
    /// themselves for index 0.
    pub fn child_edge(&self, index: usize) -> Option<EdgeShape> {
        match self {
            Shape::Chain(chain) => Some(chain.child_edge(index)),
            _ => None,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform2, child: usize) -> Aabb {
        match self {
            Shape::Circle(c) => {
                let p = xf.apply(c.position);
                Aabb::new(p - DVec2::splat(c.radius), p + DVec2::splat(c.radius))
            }
            Shape::Edge(e) => edge_aabb(e.vertex1, e.vertex2, xf),
            Shape::Polygon(p) => {
                let mut lower = xf.apply(p.vertices[0]);
                let mut upper = lower;
                for v in &p.vertices[1..] {
                    let w = xf.apply(*v);
                    lower = lower.min(w);
                    upper = upper.max(w);
                }
                let r = DVec2::splat(POLYGON_RADIUS);
                Aabb::new(lower - r, upper + r)
            }
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child);
                edge_aabb(edge.vertex1, edge.vertex2, xf)
            }
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => {
                let mass = density * std::f64::consts::PI * c.radius * c.radius;
                MassData {
                    mass,
                    center: c.position,
                    inertia: mass * (0.5 * c.radius * c.radius + c.position.length_squared()),
                }
            }
            Shape::Edge(e) => MassData {
                mass: 0.0,
                center: 0.5 * (e.vertex1 + e.vertex2),
                inertia: 0.0,
            },
            Shape::Polygon(p) => p.compute_mass(density),
            // Chains are boundary geometry and carry no mass.
            Shape::Chain(_) => MassData::default(),
        }
    }

    pub fn test_point(&self, xf: &Transform2, point: DVec2) -> bool {
        match self {
            Shape::Circle(c) => {
                let center = xf.apply(c.position);
                (point - center).length_squared() <= c.radius * c.radius
            }
            Shape::Polygon(p) => {
                let local = xf.apply_inv(point);
                p.vertices
                    .iter()
                    .zip(&p.normals)
                    .all(|(v, n)| n.dot(local - *v) <= 0.0)
            }
            // One-dimensional geometry has no interior.
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform2,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => ray_cast_circle(c, input, xf),
            Shape::Edge(e) => ray_cast_edge(e.vertex1, e.vertex2, input, xf),
            Shape::Polygon(p) => ray_cast_polygon(p, input, xf),
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child);
                ray_cast_edge(edge.vertex1, edge.vertex2, input, xf)
            }
        }
    }

    /// Vertices backing the GJK proxy of the given child.
    pub fn proxy_vertices(&self, child: usize) -> Vec<DVec2> {
        match self {
            Shape::Circle(c) => vec![c.position],
            Shape::Edge(e) => vec![e.vertex1, e.vertex2],
            Shape::Polygon(p) => p.vertices.clone(),
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child);
                vec![edge.vertex1, edge.vertex2]
            }
        }
    }
}

fn edge_aabb(v1: DVec2, v2: DVec2, xf: &Transform2) -> Aabb {
    let p1 = xf.apply(v1);
    let p2 = xf.apply(v2);
    let r = DVec2::splat(POLYGON_RADIUS);
    Aabb::new(p1.min(p2) - r, p1.max(p2) + r)
}

impl ChainShape {
    pub fn segment_count(&self) -> usize {
        if self.is_loop {
            self.vertices.len()
        } else {
            self.vertices.len() - 1
        }
    }

    /// Edge child with ghost vertices taken from the adjoining segments.
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.segment_count());
        let n = self.vertices.len();
        let at = |i: usize| self.vertices[i % n];

        let vertex1 = at(index);
        let vertex2 = at(index + 1);
        let vertex0 = if self.is_loop {
            Some(at((index + n - 1) % n))
        } else if index > 0 {
            Some(self.vertices[index - 1])
        } else {
            None
        };
        let vertex3 = if self.is_loop {
            Some(at(index + 2))
        } else if index + 2 < n {
            Some(self.vertices[index + 2])
        } else {
            None
        };

        EdgeShape {
            vertex1,
            vertex2,
            vertex0,
            vertex3,
        }
    }
}

impl PolygonShape {
    /// Builds the convex hull of `points` (gift wrapping after welding
    /// nearly-coincident points). Degenerate clouds are rejected.
    pub fn new(points: &[DVec2]) -> Result<Self, PhysicsError> {
        if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::DegenerateShape(
                "polygon requires 3..=8 vertices",
            ));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "polygon vertices must be finite",
            ));
        }

        // Weld close points; collinear input collapses below 3.
        let weld_sq = (0.5 * crate::config::LINEAR_SLOP).powi(2);
        let mut unique: Vec<DVec2> = Vec::with_capacity(points.len());
        for &p in points {
            if unique.iter().all(|q| (p - *q).length_squared() > weld_sq) {
                unique.push(p);
            }
        }
        if unique.len() < 3 {
            return Err(PhysicsError::DegenerateShape(
                "polygon vertices are nearly coincident",
            ));
        }

        // Gift wrapping from the rightmost point.
        let mut hull: Vec<usize> = Vec::with_capacity(unique.len());
        let start = unique
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                (a.x, a.y)
                    .partial_cmp(&(b.x, b.y))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .expect("welding left at least 3 points");

        let mut hull_point = start;
        loop {
            hull.push(hull_point);
            let mut next = 0;
            for (candidate, point) in unique.iter().enumerate() {
                if next == hull_point {
                    next = candidate;
                    continue;
                }
                let r = unique[next] - unique[hull_point];
                let v = *point - unique[hull_point];
                let c = cross(r, v);
                if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                    next = candidate;
                }
            }
            hull_point = next;
            if next == start {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(PhysicsError::DegenerateShape("polygon input is collinear"));
        }

        let vertices: Vec<DVec2> = hull.into_iter().map(|i| unique[i]).collect();
        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            debug_assert!(edge.length_squared() > f64::EPSILON);
            normals.push(DVec2::new(edge.y, -edge.x).normalize());
        }

        let centroid = polygon_centroid(&vertices);
        Ok(Self {
            centroid,
            vertices,
            normals,
        })
    }

    pub fn rect(hx: f64, hy: f64) -> Self {
        Self {
            centroid: DVec2::ZERO,
            vertices: vec![
                DVec2::new(-hx, -hy),
                DVec2::new(hx, -hy),
                DVec2::new(hx, hy),
                DVec2::new(-hx, hy),
            ],
            normals: vec![
                DVec2::new(0.0, -1.0),
                DVec2::new(1.0, 0.0),
                DVec2::new(0.0, 1.0),
                DVec2::new(-1.0, 0.0),
            ],
        }
    }

    /// Oriented box at a local offset.
    pub fn rect_at(hx: f64, hy: f64, center: DVec2, angle: f64) -> Self {
        let base = Self::rect(hx, hy);
        let xf = Transform2::new(center, angle);
        Self {
            centroid: center,
            vertices: base.vertices.iter().map(|v| xf.apply(*v)).collect(),
            normals: base.normals.iter().map(|n| xf.q.apply(*n)).collect(),
        }
    }

    fn compute_mass(&self, density: f64) -> MassData {
        // Triangle fan about an interior reference point.
        let n = self.vertices.len();
        let reference = self.vertices.iter().copied().sum::<DVec2>() / n as f64;

        let mut area = 0.0;
        let mut center = DVec2::ZERO;
        let mut inertia = 0.0;
        let inv3 = 1.0 / 3.0;

        for i in 0..n {
            let e1 = self.vertices[i] - reference;
            let e2 = self.vertices[(i + 1) % n] - reference;
            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * inv3 * (e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        center *= 1.0 / area;
        let local_center = center + reference;
        // Parallel axis: integrate about the reference, report about the
        // local origin.
        let inertia_origin = density * inertia
            + mass * (local_center.length_squared() - center.length_squared());

        MassData {
            mass,
            center: local_center,
            inertia: inertia_origin,
        }
    }
}

fn polygon_centroid(vertices: &[DVec2]) -> DVec2 {
    let n = vertices.len();
    let reference = vertices.iter().copied().sum::<DVec2>() / n as f64;
    let mut area = 0.0;
    let mut c = DVec2::ZERO;
    for i in 0..n {
        let e1 = vertices[i] - reference;
        let e2 = vertices[(i + 1) % n] - reference;
        let a = 0.5 * cross(e1, e2);
        area += a;
        c += a * (e1 + e2) / 3.0;
    }
    reference + c / area
}

fn ray_cast_circle(
    circle: &CircleShape,
    input: &RayCastInput,
    xf: &Transform2,
) -> Option<RayCastOutput> {
    let center = xf.apply(circle.position);
    let s = input.p1 - center;
    let b = s.length_squared() - circle.radius * circle.radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.length_squared();
    let sigma = c * c - rr * b;
    if sigma < 0.0 || rr < f64::EPSILON {
        return None;
    }

    let t = -(c + sigma.sqrt());
    if t >= 0.0 && t <= input.max_fraction * rr {
        let fraction = t / rr;
        let normal = (s + fraction * r).normalize();
        return Some(RayCastOutput { normal, fraction });
    }
    None
}

fn ray_cast_edge(
    v1: DVec2,
    v2: DVec2,
    input: &RayCastInput,
    xf: &Transform2,
) -> Option<RayCastOutput> {
    // Work in the edge's local frame.
    let p1 = xf.apply_inv(input.p1);
    let p2 = xf.apply_inv(input.p2);
    let d = p2 - p1;

    let e = v2 - v1;
    let normal = DVec2::new(e.y, -e.x).normalize();

    // p = p1 + t·d, dot(normal, p - v1) = 0
    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }
    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }

    let q = p1 + t * d;
    let rr = e.length_squared();
    if rr == 0.0 {
        return None;
    }
    let s = (q - v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let world_normal = if numerator > 0.0 {
        xf.q.apply(-normal)
    } else {
        xf.q.apply(normal)
    };
    Some(RayCastOutput {
        normal: world_normal,
        fraction: t,
    })
}

fn ray_cast_polygon(
    polygon: &PolygonShape,
    input: &RayCastInput,
    xf: &Transform2,
) -> Option<RayCastOutput> {
    let p1 = xf.apply_inv(input.p1);
    let p2 = xf.apply_inv(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0;
    let mut upper = input.max_fraction;
    let mut index: Option<usize> = None;

    for i in 0..polygon.vertices.len() {
        // p = p1 + t·d, dot(normal, p - v) = 0
        let numerator = polygon.normals[i].dot(polygon.vertices[i] - p1);
        let denominator = polygon.normals[i].dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else {
            let t = numerator / denominator;
            if denominator < 0.0 && t > lower {
                lower = t;
                index = Some(i);
            } else if denominator > 0.0 && t < upper {
                upper = t;
            }
        }
        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastOutput {
        normal: xf.q.apply(polygon.normals[i]),
        fraction: lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn polygon_hull_is_ccw_and_convex() {
        // Shuffled box corners plus an interior point the hull must drop.
        let shape = Shape::polygon(&[
            DVec2::new(1.0, 1.0),
            DVec2::new(-1.0, -1.0),
            DVec2::new(0.0, 0.2),
            DVec2::new(1.0, -1.0),
            DVec2::new(-1.0, 1.0),
        ])
        .unwrap();
        let Shape::Polygon(p) = &shape else {
            unreachable!()
        };
        assert_eq!(p.vertices.len(), 4);
        let n = p.vertices.len();
        for i in 0..n {
            let e1 = p.vertices[(i + 1) % n] - p.vertices[i];
            let e2 = p.vertices[(i + 2) % n] - p.vertices[(i + 1) % n];
            assert!(cross(e1, e2) > 0.0, "hull winding must stay CCW");
        }
        assert_relative_eq!(p.centroid.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.centroid.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_polygons_are_rejected() {
        assert!(Shape::polygon(&[DVec2::ZERO, DVec2::new(1.0, 0.0)]).is_err());
        assert!(Shape::polygon(&[
            DVec2::ZERO,
            DVec2::new(1.0, 0.0),
            DVec2::new(2.0, 0.0),
        ])
        .is_err());
        assert!(Shape::circle(DVec2::ZERO, -1.0).is_err());
    }

    #[test]
    fn box_mass_matches_closed_form() {
        let shape = Shape::rect(0.5, 0.5).unwrap();
        let md = shape.compute_mass(2.0);
        assert_relative_eq!(md.mass, 2.0, epsilon = 1e-12);
        assert_relative_eq!(md.center.x, 0.0, epsilon = 1e-12);
        // I = m (w² + h²) / 12 about the centroid == origin here.
        assert_relative_eq!(md.inertia, 2.0 * (1.0 + 1.0) / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn circle_ray_cast_front_face() {
        let shape = Shape::circle(DVec2::ZERO, 1.0).unwrap();
        let xf = Transform2::new(DVec2::new(3.0, 0.0), 0.0);
        let out = shape
            .ray_cast(
                &RayCastInput {
                    p1: DVec2::new(0.0, 0.0),
                    p2: DVec2::new(6.0, 0.0),
                    max_fraction: 1.0,
                },
                &xf,
                0,
            )
            .unwrap();
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn chain_children_carry_ghost_vertices() {
        let shape = Shape::chain(
            &[
                DVec2::new(0.0, 0.0),
                DVec2::new(1.0, 0.0),
                DVec2::new(2.0, 0.5),
                DVec2::new(3.0, 0.5),
            ],
            false,
        )
        .unwrap();
        assert_eq!(shape.child_count(), 3);
        let middle = shape.child_edge(1).unwrap();
        assert_eq!(middle.vertex0, Some(DVec2::new(0.0, 0.0)));
        assert_eq!(middle.vertex3, Some(DVec2::new(3.0, 0.5)));
        let first = shape.child_edge(0).unwrap();
        assert_eq!(first.vertex0, None);
    }

    #[test]
    fn point_containment() {
        let shape = Shape::rect(1.0, 1.0).unwrap();
        let xf = Transform2::new(DVec2::new(5.0, 0.0), std::f64::consts::FRAC_PI_4);
        assert!(shape.test_point(&xf, DVec2::new(5.0, 0.0)));
        assert!(!shape.test_point(&xf, DVec2::new(5.0, 1.5)));
    }
}
