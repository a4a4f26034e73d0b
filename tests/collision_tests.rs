use approx::assert_relative_eq;
use glam::DVec2;
use planar_accelerator::collision::distance::{distance, DistanceInput, SimplexCache};
use planar_accelerator::collision::narrowphase;
use planar_accelerator::collision::shapes::{CircleShape, PolygonShape};
use planar_accelerator::collision::{Aabb, DistanceProxy, ManifoldType, RayCastInput, Shape};
use planar_accelerator::utils::math::Transform2;

fn unit_circle_proxy() -> DistanceProxy {
    DistanceProxy {
        vertices: vec![DVec2::ZERO],
        radius: 1.0,
    }
}

fn distance_between(offset: DVec2) -> f64 {
    let proxy = unit_circle_proxy();
    let mut cache = SimplexCache::default();
    distance(
        &mut cache,
        &DistanceInput {
            proxy_a: &proxy,
            proxy_b: &proxy,
            transform_a: Transform2::IDENTITY,
            transform_b: Transform2::new(offset, 0.0),
            use_radii: true,
        },
    )
    .distance
}

#[test]
fn unit_circles_at_1_9_overlap() {
    assert_eq!(distance_between(DVec2::new(1.9, 0.0)), 0.0);
}

#[test]
fn unit_circles_at_2_1_have_gap_of_0_1() {
    assert_relative_eq!(
        distance_between(DVec2::new(2.1, 0.0)),
        0.1,
        epsilon = 1e-12
    );
}

#[test]
fn polygon_pair_manifold_carries_persistent_features() {
    let a = PolygonShape::rect(1.0, 0.2);
    let b = PolygonShape::rect(0.4, 0.4);
    let xf_a = Transform2::IDENTITY;

    let m1 = narrowphase::collide_polygons(&a, &xf_a, &b, &Transform2::new(DVec2::new(0.0, 0.55), 0.0));
    assert_eq!(m1.point_count(), 2);

    // A tiny slide keeps the same reference/incident faces, so feature
    // ids must match point-for-point.
    let m2 = narrowphase::collide_polygons(&a, &xf_a, &b, &Transform2::new(DVec2::new(0.05, 0.55), 0.0));
    assert_eq!(m2.point_count(), 2);
    let keys1: Vec<u32> = m1.points.iter().map(|p| p.feature.key()).collect();
    let keys2: Vec<u32> = m2.points.iter().map(|p| p.feature.key()).collect();
    assert_eq!(keys1, keys2);
}

#[test]
fn deep_circle_in_polygon_uses_deepest_face() {
    let poly = PolygonShape::rect(1.0, 1.0);
    let circle = CircleShape {
        position: DVec2::ZERO,
        radius: 0.25,
    };
    // Center inside the box, nearest the right face.
    let manifold = narrowphase::collide_polygon_and_circle(
        &poly,
        &Transform2::IDENTITY,
        &circle,
        &Transform2::new(DVec2::new(0.8, 0.1), 0.0),
    );
    assert_eq!(manifold.point_count(), 1);
    assert_eq!(manifold.manifold_type, ManifoldType::FaceA);
    assert_relative_eq!(manifold.local_normal.x, 1.0, epsilon = 1e-12);
}

#[test]
fn shape_ray_casts_agree_with_aabb_prefilter() {
    // A hit on the shape implies a hit on its AABB; a miss of the AABB
    // implies a miss of the shape.
    let shapes = [
        Shape::circle(DVec2::new(0.3, -0.2), 0.8).unwrap(),
        Shape::rect(0.7, 0.4).unwrap(),
        Shape::edge(DVec2::new(-1.0, -0.5), DVec2::new(0.8, 0.6)).unwrap(),
    ];
    let xf = Transform2::new(DVec2::new(2.0, 1.0), 0.6);

    let rays = [
        (DVec2::new(-3.0, 0.0), DVec2::new(6.0, 2.0)),
        (DVec2::new(-3.0, 5.0), DVec2::new(6.0, 5.0)),
        (DVec2::new(2.0, -4.0), DVec2::new(2.0, 4.0)),
        (DVec2::new(5.0, 5.0), DVec2::new(0.0, 0.0)),
    ];

    for shape in &shapes {
        for child in 0..shape.child_count() {
            let aabb = shape.compute_aabb(&xf, child);
            for (p1, p2) in rays {
                let input = RayCastInput {
                    p1,
                    p2,
                    max_fraction: 1.0,
                };
                let shape_hit = shape.ray_cast(&input, &xf, child);
                let aabb_hit = aabb.ray_cast(&input);
                if shape_hit.is_some() {
                    assert!(
                        aabb_hit.is_some() || aabb.contains(&Aabb::from_points(p1, p1)),
                        "shape hit without AABB hit"
                    );
                }
                if let Some(out) = shape_hit {
                    assert!(out.fraction >= 0.0 && out.fraction <= 1.0);
                    assert_relative_eq!(out.normal.length(), 1.0, epsilon = 1e-6);
                }
            }
        }
    }
}
