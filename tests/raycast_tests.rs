use approx::assert_relative_eq;
use glam::DVec2;
use planar_accelerator::{BodyDef, ColliderDef, EntityId, Shape, World};

fn world_with_three_circles() -> (World, [EntityId; 3]) {
    let mut world = World::new(DVec2::ZERO);
    let mut colliders = [EntityId::default(); 3];
    for (i, x) in [3.0, 6.0, 9.0].into_iter().enumerate() {
        let body = world
            .create_body(&BodyDef::default().position(DVec2::new(x, 0.0)))
            .unwrap();
        colliders[i] = world
            .create_collider(body, &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()))
            .unwrap();
    }
    (world, colliders)
}

#[test]
fn returning_one_reports_every_collider_on_the_ray() {
    let (world, _) = world_with_three_circles();
    let mut hits = Vec::new();
    world.ray_cast(DVec2::new(0.0, 0.0), DVec2::new(12.0, 0.0), |hit| {
        hits.push(hit.fraction);
        1.0
    });
    assert_eq!(hits.len(), 3);
}

#[test]
fn returning_fraction_clips_to_the_closest_hit() {
    let (world, colliders) = world_with_three_circles();
    let mut closest: Option<(EntityId, f64)> = None;
    world.ray_cast(DVec2::new(0.0, 0.0), DVec2::new(12.0, 0.0), |hit| {
        closest = Some((hit.collider, hit.fraction));
        hit.fraction
    });
    let (collider, fraction) = closest.unwrap();
    assert_eq!(collider, colliders[0]);
    // First surface at x = 2.5 along a 12-long ray.
    assert_relative_eq!(fraction, 2.5 / 12.0, epsilon = 1e-9);
}

#[test]
fn returning_zero_terminates_after_first_report() {
    let (world, _) = world_with_three_circles();
    let mut reports = 0;
    world.ray_cast(DVec2::new(0.0, 0.0), DVec2::new(12.0, 0.0), |_| {
        reports += 1;
        0.0
    });
    assert_eq!(reports, 1);
}

#[test]
fn returning_minus_one_ignores_the_collider() {
    let (world, colliders) = world_with_three_circles();
    let mut seen = Vec::new();
    world.ray_cast(DVec2::new(0.0, 0.0), DVec2::new(12.0, 0.0), |hit| {
        if hit.collider == colliders[0] {
            return -1.0;
        }
        seen.push(hit.collider);
        hit.fraction
    });
    // Clipping converges on the closest non-ignored collider; the
    // ignored one never shows up.
    assert!(!seen.contains(&colliders[0]));
    assert_eq!(*seen.last().unwrap(), colliders[1]);
}

#[test]
fn query_aabb_reports_overlapping_colliders_and_stops_on_false() {
    let (world, colliders) = world_with_three_circles();

    let mut found = Vec::new();
    world.query_aabb(
        &planar_accelerator::Aabb::new(DVec2::new(2.0, -1.0), DVec2::new(7.0, 1.0)),
        |collider| {
            found.push(collider);
            true
        },
    );
    found.sort();
    let mut expected = vec![colliders[0], colliders[1]];
    expected.sort();
    assert_eq!(found, expected);

    let mut count = 0;
    world.query_aabb(
        &planar_accelerator::Aabb::new(DVec2::new(0.0, -1.0), DVec2::new(12.0, 1.0)),
        |_| {
            count += 1;
            false
        },
    );
    assert_eq!(count, 1);
}

#[test]
fn ray_reports_surface_point_and_outward_normal() {
    let (world, _) = world_with_three_circles();
    let mut first = None;
    world.ray_cast(DVec2::new(0.0, 0.0), DVec2::new(12.0, 0.0), |hit| {
        first = Some((hit.point, hit.normal));
        0.0
    });
    let (point, normal) = first.unwrap();
    assert_relative_eq!(point.x, 2.5, epsilon = 1e-9);
    assert_relative_eq!(normal.x, -1.0, epsilon = 1e-9);
}
