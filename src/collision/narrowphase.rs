//! Narrow phase: manifold generation per shape pair.
//!
//! Every routine reports the normal pointing from shape A toward shape B
//! and contact points in the reference body's local frame, so manifolds
//! survive rigid motion between steps. Polygon-polygon is the classic
//! SAT with reference/incident edge clipping; edge routines use the
//! chain's ghost vertices to stay one-sided and avoid internal-vertex
//! catching.

use glam::DVec2;

use crate::collision::clipping::{clip_segment_to_line, ClipVertex};
use crate::collision::manifold::{
    ContactFeature, FeatureKind, Manifold, ManifoldPoint, ManifoldType,
};
use crate::collision::shapes::{CircleShape, EdgeShape, PolygonShape};
use crate::config::{LINEAR_SLOP, MAX_MANIFOLD_POINTS, POLYGON_RADIUS};
use crate::utils::math::{cross, Transform2};

pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform2,
    circle_b: &CircleShape,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.position);
    let p_b = xf_b.apply(circle_b.position);
    let r = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > r * r {
        return manifold;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.position;
    manifold.points.push(ManifoldPoint {
        local_point: circle_b.position,
        feature: ContactFeature::vertex_vertex(0, 0),
        ..Default::default()
    });
    manifold
}

pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform2,
    circle_b: &CircleShape,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon's frame.
    let c = xf_a.apply_inv(xf_b.apply(circle_b.position));
    let radius = POLYGON_RADIUS + circle_b.radius;

    let mut normal_index = 0;
    let mut separation = f64::MIN;
    for (i, (v, n)) in polygon_a
        .vertices
        .iter()
        .zip(&polygon_a.normals)
        .enumerate()
    {
        let s = n.dot(c - *v);
        if s > radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let n = polygon_a.vertices.len();
    let v1 = polygon_a.vertices[normal_index];
    let v2 = polygon_a.vertices[(normal_index + 1) % n];

    let point = ManifoldPoint {
        local_point: circle_b.position,
        feature: ContactFeature::vertex_vertex(0, 0),
        ..Default::default()
    };

    if separation < f64::EPSILON {
        // Center inside the polygon: deepest face wins.
        manifold.manifold_type = ManifoldType::FaceA;
        manifold.local_normal = polygon_a.normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.points.push(point);
        return manifold;
    }

    // Voronoi regions of the face.
    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c.distance_squared(v1) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c.distance_squared(v2) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c - face_center).dot(polygon_a.normals[normal_index]) > radius {
            return manifold;
        }
        manifold.local_normal = polygon_a.normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.points.push(point);
    manifold
}

/// Maximum separation of `poly2` from the faces of `poly1`; returns
/// (separation, face index).
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform2,
    poly2: &PolygonShape,
    xf2: &Transform2,
) -> (f64, usize) {
    // Work entirely in poly2's frame.
    let xf = xf2.mul_t(*xf1);

    let mut best_index = 0;
    let mut max_separation = f64::MIN;
    for (i, (v, n)) in poly1.vertices.iter().zip(&poly1.normals).enumerate() {
        let n = xf.q.apply(*n);
        let v1 = xf.apply(*v);
        let mut si = f64::MAX;
        for v2 in &poly2.vertices {
            si = si.min(n.dot(*v2 - v1));
        }
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (max_separation, best_index)
}

/// The incident edge on `poly2` most anti-parallel to the reference
/// normal `edge1` of `poly1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform2,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform2,
) -> [ClipVertex; 2] {
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f64::MAX;
    for (i, n) in poly2.normals.iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.vertices.len();
    let feature = |ib: usize| ContactFeature {
        index_a: edge1 as u8,
        index_b: ib as u8,
        kind_a: FeatureKind::Face,
        kind_b: FeatureKind::Vertex,
    };
    [
        ClipVertex {
            v: xf2.apply(poly2.vertices[i1]),
            feature: feature(i1),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices[i2]),
            feature: feature(i2),
        },
    ]
}

pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform2,
    poly_b: &PolygonShape,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = 2.0 * POLYGON_RADIUS;

    let (separation_a, edge_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }
    let (separation_b, edge_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    let k_tol = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + k_tol {
        manifold.manifold_type = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.manifold_type = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertices.len();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;
    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = DVec2::new(local_tangent.y, -local_tangent.x);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = DVec2::new(tangent.y, -tangent.x);
    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip1, np1) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1 as u8);
    if np1 < 2 {
        return manifold;
    }
    let (clip2, np2) = clip_segment_to_line(&clip1, tangent, side_offset2, iv2 as u8);
    if np2 < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;
    for cv in clip2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            manifold.points.push(ManifoldPoint {
                local_point: xf2.apply_inv(cv.v),
                feature: if flip {
                    cv.feature.swapped()
                } else {
                    cv.feature
                },
                ..Default::default()
            });
        }
    }
    manifold
}

pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform2,
    circle_b: &CircleShape,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the edge's frame.
    let q = xf_a.apply_inv(xf_b.apply(circle_b.position));
    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Outward normal for CCW winding (solid region on the left).
    let n = DVec2::new(e.y, -e.x);
    let offset = n.dot(q - a);
    let one_sided = edge_a.vertex0.is_some() || edge_a.vertex3.is_some();
    if one_sided && offset < 0.0 {
        return manifold;
    }

    // Barycentric coordinates along the segment.
    let u = e.dot(b - q);
    let v = e.dot(q - a);
    let radius = POLYGON_RADIUS + circle_b.radius;

    let point = ManifoldPoint {
        local_point: circle_b.position,
        ..Default::default()
    };

    // Region A: closest to the first vertex.
    if v <= 0.0 {
        let d = q - a;
        if d.length_squared() > radius * radius {
            return manifold;
        }
        // The adjoining segment owns contacts behind this vertex.
        if let Some(a0) = edge_a.vertex0 {
            let e0 = a - a0;
            if e0.dot(a - q) > 0.0 {
                return manifold;
            }
        }
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_point = a;
        manifold.points.push(ManifoldPoint {
            feature: ContactFeature::vertex_vertex(0, 0),
            ..point
        });
        return manifold;
    }

    // Region B: closest to the second vertex.
    if u <= 0.0 {
        let d = q - b;
        if d.length_squared() > radius * radius {
            return manifold;
        }
        if let Some(b3) = edge_a.vertex3 {
            let e3 = b3 - b;
            if e3.dot(q - b) > 0.0 {
                return manifold;
            }
        }
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_point = b;
        manifold.points.push(ManifoldPoint {
            feature: ContactFeature::vertex_vertex(1, 0),
            ..point
        });
        return manifold;
    }

    // Region AB: interior of the face.
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (1.0 / den) * (u * a + v * b);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    let n = if offset < 0.0 { -n } else { n };

    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.points.push(ManifoldPoint {
        feature: ContactFeature {
            index_a: 0,
            index_b: 0,
            kind_a: FeatureKind::Face,
            kind_b: FeatureKind::Vertex,
        },
        ..point
    });
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EpAxisType {
    EdgeA,
    PolygonB,
}

#[derive(Debug, Clone, Copy)]
struct EpAxis {
    kind: EpAxisType,
    index: usize,
    separation: f64,
    normal: DVec2,
}

fn compute_edge_separation(vertices_b: &[DVec2], v1: DVec2, normal1: DVec2) -> EpAxis {
    let mut axis = EpAxis {
        kind: EpAxisType::EdgeA,
        index: 0,
        separation: f64::MIN,
        normal: DVec2::ZERO,
    };
    // The edge supports collision from either side unless ghost data says
    // otherwise; the caller decides one-sidedness.
    for (j, n) in [normal1, -normal1].into_iter().enumerate() {
        let mut sj = f64::MAX;
        for v in vertices_b {
            sj = sj.min(n.dot(*v - v1));
        }
        if sj > axis.separation {
            axis.separation = sj;
            axis.index = j;
            axis.normal = n;
        }
    }
    axis
}

fn compute_polygon_separation(
    vertices_b: &[DVec2],
    normals_b: &[DVec2],
    v1: DVec2,
    v2: DVec2,
) -> EpAxis {
    let mut axis = EpAxis {
        kind: EpAxisType::PolygonB,
        index: 0,
        separation: f64::MIN,
        normal: DVec2::ZERO,
    };
    for (i, (v, n)) in vertices_b.iter().zip(normals_b).enumerate() {
        let n = -*n;
        let s1 = n.dot(v1 - *v);
        let s2 = n.dot(v2 - *v);
        let s = s1.min(s2);
        if s > axis.separation {
            axis.separation = s;
            axis.index = i;
            axis.normal = n;
        }
    }
    axis
}

pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform2,
    polygon_b: &PolygonShape,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Polygon B in the edge's frame.
    let xf = xf_a.mul_t(*xf_b);
    let centroid_b = xf.apply(polygon_b.centroid);

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;
    let edge1 = (v2 - v1).normalize();
    let normal1 = DVec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    // Ghost vertices make the edge one-sided: nothing collides from the
    // back of a chain.
    let one_sided = edge_a.vertex0.is_some() || edge_a.vertex3.is_some();
    if one_sided && offset1 < 0.0 {
        return manifold;
    }

    let vertices_b: Vec<DVec2> = polygon_b.vertices.iter().map(|v| xf.apply(*v)).collect();
    let normals_b: Vec<DVec2> = polygon_b.normals.iter().map(|n| xf.q.apply(*n)).collect();

    let radius = 2.0 * POLYGON_RADIUS;

    let edge_axis = compute_edge_separation(&vertices_b, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }
    let polygon_axis = compute_polygon_separation(&vertices_b, &normals_b, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Prefer the edge axis unless the polygon axis is clearly better.
    let k_relative_tol = 0.98;
    let k_absolute_tol = 0.001;
    let mut primary_axis = if polygon_axis.separation - radius
        > k_relative_tol * (edge_axis.separation - radius) + k_absolute_tol
    {
        polygon_axis
    } else {
        edge_axis
    };

    if one_sided {
        // Clamp the admissible normal arc to the neighborhood defined by
        // the adjacent segments.
        let sin_tol = 0.1;
        let side1 = primary_axis.normal.dot(edge1) <= 0.0;
        if side1 {
            if let Some(v0) = edge_a.vertex0 {
                let edge0 = (v1 - v0).normalize();
                let normal0 = DVec2::new(edge0.y, -edge0.x);
                let convex1 = cross(edge0, edge1) >= 0.0;
                if convex1 {
                    if cross(primary_axis.normal, normal0) > sin_tol {
                        return manifold;
                    }
                } else {
                    primary_axis = edge_axis;
                }
            }
        } else if let Some(v3) = edge_a.vertex3 {
            let edge2 = (v3 - v2).normalize();
            let normal2 = DVec2::new(edge2.y, -edge2.x);
            let convex2 = cross(edge1, edge2) >= 0.0;
            if convex2 {
                if cross(normal2, primary_axis.normal) > sin_tol {
                    return manifold;
                }
            } else {
                primary_axis = edge_axis;
            }
        }
    }

    struct ReferenceFace {
        i1: usize,
        i2: usize,
        v1: DVec2,
        v2: DVec2,
        normal: DVec2,
        side_normal1: DVec2,
        side_normal2: DVec2,
    }

    let (clip_points, reference) = if primary_axis.kind == EpAxisType::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Incident edge on B: most anti-parallel face.
        let mut best_index = 0;
        let mut best_value = primary_axis.normal.dot(normals_b[0]);
        for (i, n) in normals_b.iter().enumerate().skip(1) {
            let value = primary_axis.normal.dot(*n);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }
        let i1 = best_index;
        let i2 = (i1 + 1) % vertices_b.len();
        let feature = |ib: usize| ContactFeature {
            index_a: 0,
            index_b: ib as u8,
            kind_a: FeatureKind::Face,
            kind_b: FeatureKind::Vertex,
        };
        (
            [
                ClipVertex {
                    v: vertices_b[i1],
                    feature: feature(i1),
                },
                ClipVertex {
                    v: vertices_b[i2],
                    feature: feature(i2),
                },
            ],
            ReferenceFace {
                i1: 0,
                i2: 1,
                v1,
                v2,
                normal: primary_axis.normal,
                side_normal1: -edge1,
                side_normal2: edge1,
            },
        )
    } else {
        manifold.manifold_type = ManifoldType::FaceB;
        let feature = |ia: usize| ContactFeature {
            index_a: ia as u8,
            index_b: primary_axis.index as u8,
            kind_a: FeatureKind::Vertex,
            kind_b: FeatureKind::Face,
        };
        let i1 = primary_axis.index;
        let i2 = (i1 + 1) % vertices_b.len();
        let normal = normals_b[i1];
        (
            [
                ClipVertex {
                    v: v2,
                    feature: feature(1),
                },
                ClipVertex {
                    v: v1,
                    feature: feature(0),
                },
            ],
            ReferenceFace {
                i1,
                i2,
                v1: vertices_b[i1],
                v2: vertices_b[i2],
                normal,
                side_normal1: DVec2::new(normal.y, -normal.x),
                side_normal2: -DVec2::new(normal.y, -normal.x),
            },
        )
    };

    let side_offset1 = reference.side_normal1.dot(reference.v1);
    let side_offset2 = reference.side_normal2.dot(reference.v2);

    let (clip1, np1) = clip_segment_to_line(
        &clip_points,
        reference.side_normal1,
        side_offset1,
        reference.i1 as u8,
    );
    if np1 < MAX_MANIFOLD_POINTS {
        return manifold;
    }
    let (clip2, np2) = clip_segment_to_line(
        &clip1,
        reference.side_normal2,
        side_offset2,
        reference.i2 as u8,
    );
    if np2 < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    if primary_axis.kind == EpAxisType::EdgeA {
        manifold.local_normal = reference.normal;
        manifold.local_point = reference.v1;
        for cv in &clip2 {
            let separation = reference.normal.dot(cv.v - reference.v1);
            if separation <= radius {
                manifold.points.push(ManifoldPoint {
                    local_point: xf.apply_inv(cv.v),
                    feature: cv.feature,
                    ..Default::default()
                });
            }
        }
    } else {
        manifold.local_normal = polygon_b.normals[reference.i1];
        manifold.local_point = polygon_b.vertices[reference.i1];
        for cv in &clip2 {
            let separation = reference.normal.dot(cv.v - reference.v1);
            if separation <= radius {
                manifold.points.push(ManifoldPoint {
                    // Already in the edge's (body A) frame.
                    local_point: cv.v,
                    feature: cv.feature.swapped(),
                    ..Default::default()
                });
            }
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn circles_touching_produce_one_point() {
        let a = CircleShape {
            position: DVec2::ZERO,
            radius: 1.0,
        };
        let b = a.clone();
        let manifold = collide_circles(
            &a,
            &Transform2::IDENTITY,
            &b,
            &Transform2::new(DVec2::new(1.5, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.manifold_type, ManifoldType::Circles);

        let apart = collide_circles(
            &a,
            &Transform2::IDENTITY,
            &b,
            &Transform2::new(DVec2::new(2.5, 0.0), 0.0),
        );
        assert_eq!(apart.point_count(), 0);
    }

    #[test]
    fn box_on_box_produces_two_points() {
        let a = PolygonShape::rect(1.0, 1.0);
        let b = PolygonShape::rect(1.0, 1.0);
        let manifold = collide_polygons(
            &a,
            &Transform2::IDENTITY,
            &b,
            &Transform2::new(DVec2::new(0.0, 1.99), 0.0),
        );
        assert_eq!(manifold.point_count(), 2);
        // Normal in A's frame points up toward B.
        assert_relative_eq!(manifold.local_normal.y, 1.0, epsilon = 1e-12);
        // Distinct features for the two corners.
        assert_ne!(
            manifold.points[0].feature.key(),
            manifold.points[1].feature.key()
        );
    }

    #[test]
    fn polygon_circle_face_contact() {
        let poly = PolygonShape::rect(1.0, 1.0);
        let circle = CircleShape {
            position: DVec2::ZERO,
            radius: 0.5,
        };
        let manifold = collide_polygon_and_circle(
            &poly,
            &Transform2::IDENTITY,
            &circle,
            &Transform2::new(DVec2::new(0.0, 1.4), 0.0),
        );
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.manifold_type, ManifoldType::FaceA);
        assert_relative_eq!(manifold.local_normal.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn edge_circle_interior_hit_and_vertex_ownership() {
        let edge = EdgeShape {
            vertex1: DVec2::new(-1.0, 0.0),
            vertex2: DVec2::new(1.0, 0.0),
            vertex0: None,
            vertex3: None,
        };
        let circle = CircleShape {
            position: DVec2::ZERO,
            radius: 0.5,
        };
        let hit = collide_edge_and_circle(
            &edge,
            &Transform2::IDENTITY,
            &circle,
            &Transform2::new(DVec2::new(0.0, 0.4), 0.0),
        );
        assert_eq!(hit.point_count(), 1);
        assert_eq!(hit.manifold_type, ManifoldType::FaceA);

        // A ghost vertex hands the region-A contact to the neighbor.
        let chained = EdgeShape {
            vertex0: Some(DVec2::new(-2.0, 0.0)),
            ..edge
        };
        let stolen = collide_edge_and_circle(
            &chained,
            &Transform2::IDENTITY,
            &circle,
            &Transform2::new(DVec2::new(-1.3, 0.0), 0.0),
        );
        assert_eq!(stolen.point_count(), 0);
    }

    #[test]
    fn one_sided_edge_rejects_backside_polygon() {
        // CCW winding keeps the solid on the left, so this chain segment
        // runs right-to-left and faces up.
        let edge = EdgeShape {
            vertex1: DVec2::new(1.0, 0.0),
            vertex2: DVec2::new(-1.0, 0.0),
            vertex0: Some(DVec2::new(2.0, 0.0)),
            vertex3: Some(DVec2::new(-2.0, 0.0)),
        };
        let poly = PolygonShape::rect(0.5, 0.5);

        let front = collide_edge_and_polygon(
            &edge,
            &Transform2::IDENTITY,
            &poly,
            &Transform2::new(DVec2::new(0.0, 0.45), 0.0),
        );
        assert_eq!(front.point_count(), 2);

        let back = collide_edge_and_polygon(
            &edge,
            &Transform2::IDENTITY,
            &poly,
            &Transform2::new(DVec2::new(0.0, -0.45), 0.0),
        );
        assert_eq!(back.point_count(), 0);
    }
}
