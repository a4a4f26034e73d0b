use glam::DVec2;
use planar_accelerator::collision::toi::{time_of_impact, ToiInput, ToiState};
use planar_accelerator::collision::DistanceProxy;
use planar_accelerator::utils::math::Sweep;
use planar_accelerator::{BodyDef, ColliderDef, Shape, World};

fn circle_proxy(radius: f64) -> DistanceProxy {
    DistanceProxy {
        vertices: vec![DVec2::ZERO],
        radius,
    }
}

fn stationary_sweep(position: DVec2) -> Sweep {
    Sweep {
        local_center: DVec2::ZERO,
        c0: position,
        c: position,
        a0: 0.0,
        a: 0.0,
        alpha0: 0.0,
    }
}

#[test]
fn stationary_overlapping_circles_report_overlap_at_zero() {
    let output = time_of_impact(&ToiInput {
        proxy_a: circle_proxy(1.0),
        proxy_b: circle_proxy(1.0),
        sweep_a: stationary_sweep(DVec2::ZERO),
        sweep_b: stationary_sweep(DVec2::new(1.9, 0.0)),
        t_max: 1.0,
    });
    assert_eq!(output.state, ToiState::Overlapped);
    assert_eq!(output.t, 0.0);
}

#[test]
fn bullet_does_not_tunnel_through_thin_wall() {
    let mut world = World::new(DVec2::ZERO);

    // Thin static wall at x = 5.
    let wall = world.create_body(&BodyDef::default().position(DVec2::new(5.0, 0.0))).unwrap();
    world
        .create_collider(wall, &ColliderDef::new(Shape::rect(0.05, 2.0).unwrap()))
        .unwrap();

    // Fast bullet heading straight at it: 200 m/s covers 3.3 m per step,
    // far more than the wall thickness.
    let bullet = world
        .create_body(
            &BodyDef::dynamic()
                .position(DVec2::new(0.0, 0.0))
                .linear_velocity(DVec2::new(200.0, 0.0))
                .bullet(true),
        )
        .unwrap();
    world
        .create_collider(
            bullet,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.1).unwrap()).density(1.0),
        )
        .unwrap();

    for _ in 0..60 {
        world.step(1.0 / 60.0, 8, 3);
        let x = world.body(bullet).unwrap().position().x;
        assert!(x < 5.0, "bullet tunneled through the wall: x = {x}");
    }

    // The impact must have killed the approach velocity.
    let vx = world.body(bullet).unwrap().linear_velocity().x;
    assert!(vx <= 1.0, "bullet kept its approach speed: vx = {vx}");
}

#[test]
fn non_bullet_dynamic_vs_static_still_gets_ccd() {
    let mut world = World::new(DVec2::ZERO);

    let floor = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_collider(
            floor,
            &ColliderDef::new(
                Shape::edge(DVec2::new(-10.0, 0.0), DVec2::new(10.0, 0.0)).unwrap(),
            ),
        )
        .unwrap();

    // Plain dynamic body falling fast at a zero-thickness edge.
    let ball = world
        .create_body(
            &BodyDef::dynamic()
                .position(DVec2::new(0.0, 5.0))
                .linear_velocity(DVec2::new(0.0, -150.0)),
        )
        .unwrap();
    world
        .create_collider(
            ball,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.2).unwrap()).density(1.0),
        )
        .unwrap();

    for _ in 0..30 {
        world.step(1.0 / 60.0, 8, 3);
        let y = world.body(ball).unwrap().position().y;
        assert!(y > -1.0, "ball fell through the ground edge: y = {y}");
    }
}
