use approx::assert_relative_eq;
use glam::DVec2;
use planar_accelerator::{
    BodyDef, ColliderDef, DistanceJointDef, EntityId, FrictionJointDef, GearJointDef, Joint,
    JointDef, MotorJointDef, MouseJointDef, PrismaticJointDef, PulleyJointDef, RevoluteJointDef,
    RopeJointDef, Shape, WeldJointDef, WheelJointDef, World,
};

const DT: f64 = 1.0 / 60.0;

fn make_world(gravity: DVec2) -> World {
    World::builder().gravity(gravity).allow_sleep(false).build()
}

fn dynamic_disc(world: &mut World, position: DVec2) -> EntityId {
    let body = world
        .create_body(&BodyDef::dynamic().position(position))
        .unwrap();
    world
        .create_collider(
            body,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0 / (0.25 * std::f64::consts::PI)),
        )
        .unwrap();
    body
}

#[test]
fn revolute_motor_spins_up_against_torque_limit() {
    let mut world = make_world(DVec2::ZERO);

    let base = world.create_body(&BodyDef::default()).unwrap();
    let wheel = world
        .create_body(&BodyDef::dynamic().position(DVec2::ZERO))
        .unwrap();
    // Unit mass and unit inertia via the mass override.
    world
        .create_collider(
            wheel,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0),
        )
        .unwrap();
    world.set_mass_data(wheel, 1.0, DVec2::ZERO, 1.0).unwrap();

    let joint = world
        .create_joint(&JointDef::Revolute(RevoluteJointDef {
            enable_motor: true,
            motor_speed: 10.0,
            max_motor_torque: 5.0,
            ..RevoluteJointDef::new(base, wheel)
        }))
        .unwrap();

    // Torque-limited spin-up: alpha = tau / I = 5 rad/s², so ~5 rad/s
    // after one second.
    for _ in 0..60 {
        world.step(DT, 8, 3);
    }
    let w = world.body(wheel).unwrap().angular_velocity();
    assert!((4.5..5.5).contains(&w), "speed {w} expected ~5.0");

    // After three seconds the motor holds its 10 rad/s target.
    for _ in 0..120 {
        world.step(DT, 8, 3);
    }
    let w = world.body(wheel).unwrap().angular_velocity();
    assert!((w - 10.0).abs() < 0.2, "steady speed {w} expected ~10.0");

    let Some(Joint::Revolute(revolute)) = world.joint(joint) else {
        panic!("joint kind changed");
    };
    // At steady state the motor torque is only fighting nothing: the
    // accumulated impulse stays within the budget.
    assert!(revolute.motor_torque(1.0 / DT).abs() <= 5.0 + 1e-9);
}

#[test]
fn revolute_limit_clamps_swing() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let base = world.create_body(&BodyDef::default()).unwrap();
    // Pendulum bob held by a limited hinge at the origin.
    let bob = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(1.0, 0.0)))
        .unwrap();
    world
        .create_collider(
            bob,
            &ColliderDef::new(Shape::rect(0.1, 0.1).unwrap()).density(10.0),
        )
        .unwrap();

    world
        .create_joint(&JointDef::Revolute(RevoluteJointDef {
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::new(-1.0, 0.0),
            enable_limit: true,
            lower_angle: -0.25,
            upper_angle: 0.25,
            ..RevoluteJointDef::new(base, bob)
        }))
        .unwrap();

    for _ in 0..240 {
        world.step(DT, 8, 3);
    }

    let base_angle = world.body(base).unwrap().angle();
    let bob_angle = world.body(bob).unwrap().angle();
    let joint_angle = bob_angle - base_angle;
    assert!(
        joint_angle >= -0.25 - 0.05 && joint_angle <= 0.25 + 0.05,
        "joint angle {joint_angle} exceeded limits"
    );
}

#[test]
fn distance_joint_holds_length_under_gravity() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let anchor = world.create_body(&BodyDef::default()).unwrap();
    let bob = dynamic_disc(&mut world, DVec2::new(0.0, -2.0));

    world
        .create_joint(&JointDef::Distance(DistanceJointDef {
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            ..DistanceJointDef::new(anchor, bob, 2.0)
        }))
        .unwrap();

    // Kick it sideways so the constraint actually works.
    world
        .body_mut(bob)
        .unwrap()
        .apply_linear_impulse(DVec2::new(2.0, 0.0), DVec2::new(0.0, -2.0));

    for _ in 0..300 {
        world.step(DT, 8, 3);
        let p = world.body(bob).unwrap().position();
        let length = p.length();
        assert!(
            (length - 2.0).abs() < 0.05,
            "rod length drifted to {length}"
        );
    }
}

#[test]
fn joint_reaction_balances_hanging_weight() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let anchor = world.create_body(&BodyDef::default()).unwrap();
    let bob = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, -3.0)))
        .unwrap();
    world
        .create_collider(
            bob,
            &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap()).density(2.0),
        )
        .unwrap();
    let mass = world.body(bob).unwrap().mass();

    let joint = world
        .create_joint(&JointDef::Distance(DistanceJointDef {
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            ..DistanceJointDef::new(anchor, bob, 3.0)
        }))
        .unwrap();

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }

    // Reaction force equals inv_dt × accumulated impulse: the joint
    // carries the bob's weight, pushing body B up.
    let force = world.joint(joint).unwrap().reaction_force(1.0 / DT);
    assert_relative_eq!(force.y, mass * 10.0, epsilon = 0.5);
}

#[test]
fn prismatic_limits_bound_travel() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let frame = world.create_body(&BodyDef::default()).unwrap();
    let slider = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 0.0)))
        .unwrap();
    world
        .create_collider(
            slider,
            &ColliderDef::new(Shape::rect(0.2, 0.2).unwrap()).density(1.0),
        )
        .unwrap();

    world
        .create_joint(&JointDef::Prismatic(PrismaticJointDef {
            enable_limit: true,
            lower_translation: -1.0,
            upper_translation: 1.0,
            ..PrismaticJointDef::new(frame, slider, DVec2::new(0.0, 1.0))
        }))
        .unwrap();

    for _ in 0..240 {
        world.step(DT, 8, 3);
    }

    let p = world.body(slider).unwrap().position();
    assert!(p.x.abs() < 0.01, "slider left the axis: x = {}", p.x);
    assert!(
        (-1.1..=1.1).contains(&p.y),
        "slider escaped its limits: y = {}",
        p.y
    );
}

#[test]
fn rope_joint_caps_distance() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let anchor = world.create_body(&BodyDef::default()).unwrap();
    let bob = dynamic_disc(&mut world, DVec2::new(0.0, -1.0));

    world
        .create_joint(&JointDef::Rope(RopeJointDef {
            ..RopeJointDef::new(anchor, bob, 2.0)
        }))
        .unwrap();

    for _ in 0..300 {
        world.step(DT, 8, 3);
        let length = world.body(bob).unwrap().position().length();
        assert!(length < 2.1, "rope overstretched: {length}");
    }
}

#[test]
fn pulley_conserves_rope_length() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let ground_a = DVec2::new(-2.0, 5.0);
    let ground_b = DVec2::new(2.0, 5.0);

    let left = dynamic_disc(&mut world, DVec2::new(-2.0, 2.0));
    // The right side is heavier, so it sinks and hoists the left.
    let right = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(2.0, 2.0)))
        .unwrap();
    world
        .create_collider(
            right,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(5.0),
        )
        .unwrap();

    world
        .create_joint(&JointDef::Pulley(PulleyJointDef::new(
            left, right, ground_a, ground_b, 3.0, 3.0, 1.0,
        )))
        .unwrap();

    // Half a second: enough to move visibly, not enough to run the rope
    // out on either side.
    for _ in 0..30 {
        world.step(DT, 8, 3);
    }

    let l1 = (world.body(left).unwrap().position() - ground_a).length();
    let l2 = (world.body(right).unwrap().position() - ground_b).length();
    assert!((l1 + l2 - 6.0).abs() < 0.1, "rope length drifted: {}", l1 + l2);
    assert!(
        world.body(right).unwrap().position().y < world.body(left).unwrap().position().y,
        "heavier side should sink"
    );
}

#[test]
fn gear_couples_two_revolute_wheels() {
    let mut world = make_world(DVec2::ZERO);

    let frame = world.create_body(&BodyDef::default()).unwrap();

    let make_wheel = |world: &mut World, x: f64| {
        let wheel = world
            .create_body(&BodyDef::dynamic().position(DVec2::new(x, 0.0)))
            .unwrap();
        world
            .create_collider(
                wheel,
                &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0),
            )
            .unwrap();
        wheel
    };
    let wheel_a = make_wheel(&mut world, -1.0);
    let wheel_b = make_wheel(&mut world, 1.0);

    let hinge_a = world
        .create_joint(&JointDef::Revolute(RevoluteJointDef {
            local_anchor_a: DVec2::new(-1.0, 0.0),
            enable_motor: true,
            motor_speed: 6.0,
            max_motor_torque: 50.0,
            ..RevoluteJointDef::new(frame, wheel_a)
        }))
        .unwrap();
    let hinge_b = world
        .create_joint(&JointDef::Revolute(RevoluteJointDef {
            local_anchor_a: DVec2::new(1.0, 0.0),
            ..RevoluteJointDef::new(frame, wheel_b)
        }))
        .unwrap();

    let ratio = 2.0;
    world
        .create_joint(&JointDef::Gear(GearJointDef::new(hinge_a, hinge_b, ratio)))
        .unwrap();

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }

    let wa = world.body(wheel_a).unwrap().angular_velocity();
    let wb = world.body(wheel_b).unwrap().angular_velocity();
    // Gear constraint: w_a + ratio * w_b = 0.
    assert!(wa > 1.0, "driven wheel never spun up: {wa}");
    assert_relative_eq!(wa + ratio * wb, 0.0, epsilon = 0.05);
}

#[test]
fn wheel_joint_suspension_supports_chassis() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let ground = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_collider(
            ground,
            &ColliderDef::new(
                Shape::edge(DVec2::new(-20.0, 0.0), DVec2::new(20.0, 0.0)).unwrap(),
            )
            .friction(0.9),
        )
        .unwrap();

    let chassis = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 1.0)))
        .unwrap();
    world
        .create_collider(
            chassis,
            &ColliderDef::new(Shape::rect(1.0, 0.25).unwrap()).density(1.0),
        )
        .unwrap();

    let wheel = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 0.35)))
        .unwrap();
    world
        .create_collider(
            wheel,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.35).unwrap())
                .density(1.0)
                .friction(0.9),
        )
        .unwrap();

    world
        .create_joint(&JointDef::Wheel(WheelJointDef {
            local_anchor_a: DVec2::new(0.0, -0.65),
            local_anchor_b: DVec2::ZERO,
            frequency_hz: 4.0,
            damping_ratio: 0.7,
            ..WheelJointDef::new(chassis, wheel, DVec2::new(0.0, 1.0))
        }))
        .unwrap();

    for _ in 0..300 {
        world.step(DT, 8, 3);
    }

    // The spring holds the chassis up off the wheel.
    let chassis_y = world.body(chassis).unwrap().position().y;
    let wheel_y = world.body(wheel).unwrap().position().y;
    assert!((wheel_y - 0.35).abs() < 0.05, "wheel not resting: {wheel_y}");
    assert!(chassis_y > wheel_y + 0.3, "suspension collapsed: {chassis_y}");
    assert!(world.body(chassis).unwrap().linear_velocity().length() < 0.1);
}

#[test]
fn weld_locks_relative_pose_and_carries_the_load() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let anchor = world.create_body(&BodyDef::default()).unwrap();
    // Unit-mass box welded by its left edge, hanging off to the right of
    // the weld point.
    let arm = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(2.0, 0.0)))
        .unwrap();
    world
        .create_collider(
            arm,
            &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap()).density(1.0),
        )
        .unwrap();
    let mass = world.body(arm).unwrap().mass();

    let joint = world
        .create_joint(&JointDef::Weld(WeldJointDef {
            local_anchor_a: DVec2::new(1.5, 0.0),
            local_anchor_b: DVec2::new(-0.5, 0.0),
            ..WeldJointDef::new(anchor, arm)
        }))
        .unwrap();

    for _ in 0..120 {
        world.step(DT, 8, 3);
    }

    // The weld holds both translation and rotation against gravity.
    let body = world.body(arm).unwrap();
    let p = body.position();
    assert!((p - DVec2::new(2.0, 0.0)).length() < 0.05, "arm drifted to {p}");
    assert!(body.angle().abs() < 0.05, "arm rotated to {}", body.angle());

    // Static equilibrium: the reaction force carries the weight and the
    // reaction torque balances the half-width lever arm.
    let Some(weld) = world.joint(joint) else {
        panic!("weld joint disappeared");
    };
    let force = weld.reaction_force(1.0 / DT);
    let torque = weld.reaction_torque(1.0 / DT);
    assert_relative_eq!(force.y, mass * 10.0, epsilon = 0.5);
    assert_relative_eq!(torque, 0.5 * mass * 10.0, epsilon = 0.5);
}

#[test]
fn motor_joint_drives_body_to_its_offsets() {
    let mut world = make_world(DVec2::new(0.0, -10.0));

    let frame = world.create_body(&BodyDef::default()).unwrap();
    let puck = dynamic_disc(&mut world, DVec2::ZERO);

    let joint = world
        .create_joint(&JointDef::Motor(MotorJointDef {
            linear_offset: DVec2::new(2.0, 1.0),
            angular_offset: 0.5,
            max_force: 100.0,
            max_torque: 100.0,
            ..MotorJointDef::new(frame, puck)
        }))
        .unwrap();

    for _ in 0..180 {
        world.step(DT, 8, 3);
    }

    // The drive reaches its pose target while holding up the weight.
    let body = world.body(puck).unwrap();
    assert!(
        (body.position() - DVec2::new(2.0, 1.0)).length() < 0.05,
        "puck stopped at {}",
        body.position()
    );
    assert_relative_eq!(body.angle(), 0.5, epsilon = 0.05);

    // Retargeting through the accessors steers the body back.
    let Some(Joint::Motor(motor)) = world.joint_mut(joint) else {
        panic!("motor joint disappeared");
    };
    motor.set_linear_offset(DVec2::ZERO);
    motor.set_angular_offset(0.0);

    for _ in 0..180 {
        world.step(DT, 8, 3);
    }
    let body = world.body(puck).unwrap();
    assert!(
        body.position().length() < 0.05,
        "puck never returned: {}",
        body.position()
    );
    assert!(body.angle().abs() < 0.05);
}

#[test]
fn friction_joint_caps_drift_within_its_budgets() {
    let mut world = make_world(DVec2::ZERO);

    let ground = world.create_body(&BodyDef::default()).unwrap();
    let light_push = dynamic_disc(&mut world, DVec2::ZERO);
    let heavy_push = dynamic_disc(&mut world, DVec2::new(100.0, 0.0));

    for body in [light_push, heavy_push] {
        world
            .create_joint(&JointDef::Friction(FrictionJointDef {
                max_force: 2.0,
                max_torque: 1.0,
                ..FrictionJointDef::new(ground, body)
            }))
            .unwrap();
    }

    for _ in 0..60 {
        // Below both budgets: friction swallows the push and the twist.
        world
            .body_mut(light_push)
            .unwrap()
            .apply_force_to_center(DVec2::new(1.0, 0.0));
        world.body_mut(light_push).unwrap().apply_torque(0.5);
        // Above the force budget: only 2 N of the 10 N push is resisted.
        world
            .body_mut(heavy_push)
            .unwrap()
            .apply_force_to_center(DVec2::new(10.0, 0.0));
        world.step(DT, 8, 3);
    }

    let pinned = world.body(light_push).unwrap();
    assert!(
        pinned.position().length() < 0.05,
        "light push crept to {}",
        pinned.position()
    );
    assert!(pinned.linear_velocity().length() < 0.01);
    assert!(pinned.angular_velocity().abs() < 0.01);

    // Net 8 m/s² on unit mass for one second.
    let sliding = world.body(heavy_push).unwrap();
    assert_relative_eq!(sliding.linear_velocity().x, 8.0, epsilon = 0.5);
    assert!(sliding.position().x > 100.0 + 1.0);
}

#[test]
fn mouse_joint_drags_body_toward_target() {
    let mut world = make_world(DVec2::ZERO);

    let ground = world.create_body(&BodyDef::default()).unwrap();
    let body = dynamic_disc(&mut world, DVec2::ZERO);

    let target = DVec2::new(3.0, 1.0);
    world
        .create_joint(&JointDef::Mouse(MouseJointDef {
            max_force: 1000.0,
            ..MouseJointDef::new(ground, body, target)
        }))
        .unwrap();

    for _ in 0..180 {
        world.step(DT, 8, 3);
    }

    let p = world.body(body).unwrap().position();
    assert!((p - target).length() < 0.05, "body never reached target: {p}");
}

#[test]
fn non_colliding_joint_suppresses_contact() {
    let mut world = make_world(DVec2::ZERO);

    let a = dynamic_disc(&mut world, DVec2::new(0.0, 0.0));
    let b = dynamic_disc(&mut world, DVec2::new(0.4, 0.0));

    world
        .create_joint(&JointDef::Distance(DistanceJointDef {
            collide_connected: false,
            ..DistanceJointDef::new(a, b, 0.4)
        }))
        .unwrap();

    for _ in 0..10 {
        world.step(DT, 8, 3);
    }
    let touching = world.contacts().filter(|c| c.is_touching()).count();
    assert_eq!(touching, 0, "jointed overlap must not produce contacts");
}
