use glam::DVec2;
use planar_accelerator::dynamics::{Contact, ContactImpulse};
use planar_accelerator::{
    BodyDef, ColliderDef, ContactListener, EntityId, JointDef, RevoluteJointDef, Shape, World,
};

const DT: f64 = 1.0 / 60.0;

fn ground_edge(world: &mut World) -> EntityId {
    let ground = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_collider(
            ground,
            &ColliderDef::new(
                Shape::edge(DVec2::new(-50.0, 0.0), DVec2::new(50.0, 0.0)).unwrap(),
            )
            .friction(0.6),
        )
        .unwrap();
    ground
}

#[test]
fn dropped_box_comes_to_rest_on_the_ground() {
    let mut world = World::new(DVec2::new(0.0, -10.0));
    ground_edge(&mut world);

    let half_height = 0.5;
    let cube = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 10.0)))
        .unwrap();
    world
        .create_collider(
            cube,
            &ColliderDef::new(Shape::rect(0.5, half_height).unwrap())
                .density(1.0)
                .friction(0.6),
        )
        .unwrap();
    let mass = world.body(cube).unwrap().mass();

    // Fall plus settle: three simulated seconds.
    for _ in 0..180 {
        world.step(DT, 8, 3);
    }

    let body = world.body(cube).unwrap();
    let y = body.position().y;
    assert!(
        (y - half_height).abs() < 0.02,
        "resting height {y}, expected ~{half_height}"
    );
    assert!(body.linear_velocity().length() < 0.05);

    // The resting contact carries the cube's weight each step:
    // accumulated normal impulse ≈ m·g·dt.
    let total_normal: f64 = world
        .contacts()
        .flat_map(|contact| contact.manifold().points.iter())
        .map(|point| point.normal_impulse)
        .sum();
    let expected = mass * 10.0 * DT;
    assert!(
        (total_normal - expected).abs() < 0.5 * expected,
        "normal impulse {total_normal}, expected ~{expected}"
    );
}

#[test]
fn rope_bridge_reaches_steady_state() {
    let mut world = World::new(DVec2::new(0.0, -10.0));

    let planks = 30usize;
    let plank_half = 0.5;
    let left_anchor = world
        .create_body(&BodyDef::default().position(DVec2::new(0.0, 0.0)))
        .unwrap();
    let right_anchor = world
        .create_body(
            &BodyDef::default().position(DVec2::new(planks as f64 * 2.0 * plank_half, 0.0)),
        )
        .unwrap();

    let mut previous = left_anchor;
    let mut bodies = Vec::new();
    for i in 0..planks {
        let x = plank_half + i as f64 * 2.0 * plank_half;
        let plank = world
            .create_body(
                &BodyDef::dynamic()
                    .position(DVec2::new(x, 0.0))
                    .damping(0.2, 0.2),
            )
            .unwrap();
        world
            .create_collider(
                plank,
                &ColliderDef::new(Shape::rect(plank_half, 0.125).unwrap())
                    .density(1.0)
                    .friction(0.2),
            )
            .unwrap();
        world
            .create_joint(&JointDef::Revolute(RevoluteJointDef {
                local_anchor_a: if previous == left_anchor {
                    DVec2::ZERO
                } else {
                    DVec2::new(plank_half, 0.0)
                },
                local_anchor_b: DVec2::new(-plank_half, 0.0),
                ..RevoluteJointDef::new(previous, plank)
            }))
            .unwrap();
        bodies.push(plank);
        previous = plank;
    }
    world
        .create_joint(&JointDef::Revolute(RevoluteJointDef {
            local_anchor_a: DVec2::new(plank_half, 0.0),
            local_anchor_b: DVec2::ZERO,
            ..RevoluteJointDef::new(previous, right_anchor)
        }))
        .unwrap();

    for _ in 0..900 {
        world.step(DT, 8, 3);
    }

    let middle = bodies[planks / 2];
    let body = world.body(middle).unwrap();
    let speed = body.linear_velocity().length();
    assert!(speed < 0.1, "middle plank still moving at {speed}");
    // Hanging below the anchors, not fallen apart.
    assert!(body.position().y < 0.0);
    assert!(body.position().y > -(planks as f64));
}

#[test]
fn velocities_are_clamped_per_step() {
    let mut world = World::builder()
        .gravity(DVec2::ZERO)
        .continuous_physics(false)
        .build();
    let body = world
        .create_body(
            &BodyDef::dynamic()
                .position(DVec2::ZERO)
                .linear_velocity(DVec2::new(1e6, 0.0))
                .angular_velocity(1e6),
        )
        .unwrap();
    world
        .create_collider(
            body,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0),
        )
        .unwrap();

    let before = world.body(body).unwrap().position();
    world.step(DT, 8, 3);
    let after = world.body(body).unwrap();

    let translation = (after.position() - before).length();
    assert!(
        translation <= planar_accelerator::config::MAX_TRANSLATION + 1e-9,
        "translation {translation} exceeded the per-step clamp"
    );
}

#[test]
fn stack_goes_to_sleep() {
    let mut world = World::new(DVec2::new(0.0, -10.0));
    ground_edge(&mut world);

    let cube = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 0.6)))
        .unwrap();
    world
        .create_collider(
            cube,
            &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap())
                .density(1.0)
                .friction(0.6),
        )
        .unwrap();

    // 0.5 s of stillness is the sleep threshold; give it two seconds.
    for _ in 0..120 {
        world.step(DT, 8, 3);
    }
    assert!(!world.body(cube).unwrap().is_awake(), "cube never slept");

    // A new impulse wakes it again.
    world
        .body_mut(cube)
        .unwrap()
        .apply_linear_impulse(DVec2::new(1.0, 0.0), DVec2::new(0.0, 0.6));
    assert!(world.body(cube).unwrap().is_awake());
}

#[test]
fn repeated_runs_are_bitwise_identical() {
    let build = || {
        let mut world = World::new(DVec2::new(0.0, -10.0));
        ground_edge(&mut world);
        let mut bodies = Vec::new();
        for i in 0..10 {
            let body = world
                .create_body(
                    &BodyDef::dynamic().position(DVec2::new(0.1 * i as f64, 1.0 + i as f64)),
                )
                .unwrap();
            world
                .create_collider(
                    body,
                    &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap())
                        .density(1.0)
                        .friction(0.3)
                        .restitution(0.1),
                )
                .unwrap();
            bodies.push(body);
        }
        (world, bodies)
    };

    let (mut world_a, bodies_a) = build();
    let (mut world_b, bodies_b) = build();

    for _ in 0..240 {
        world_a.step(DT, 8, 3);
        world_b.step(DT, 8, 3);
    }

    for (&a, &b) in bodies_a.iter().zip(&bodies_b) {
        let body_a = world_a.body(a).unwrap();
        let body_b = world_b.body(b).unwrap();
        assert_eq!(body_a.position(), body_b.position());
        assert_eq!(body_a.angle(), body_b.angle());
        assert_eq!(body_a.linear_velocity(), body_b.linear_velocity());
        assert_eq!(body_a.angular_velocity(), body_b.angular_velocity());
    }
}

#[derive(Default)]
struct EventCounter {
    begins: usize,
    ends: usize,
    post_solves: usize,
}

struct CountingListener(std::rc::Rc<std::cell::RefCell<EventCounter>>);

impl ContactListener for CountingListener {
    fn begin_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().begins += 1;
    }

    fn end_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().ends += 1;
    }

    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {
        self.0.borrow_mut().post_solves += 1;
    }
}

#[test]
fn sensors_report_overlap_without_response() {
    let counter = std::rc::Rc::new(std::cell::RefCell::new(EventCounter::default()));
    let mut world = World::new(DVec2::new(0.0, -10.0));
    world.set_contact_listener(CountingListener(counter.clone()));

    let sensor_body = world
        .create_body(&BodyDef::default().position(DVec2::new(0.0, 5.0)))
        .unwrap();
    world
        .create_collider(
            sensor_body,
            &ColliderDef::new(Shape::rect(2.0, 0.25).unwrap()).sensor(true),
        )
        .unwrap();

    let ball = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 8.0)))
        .unwrap();
    world
        .create_collider(
            ball,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.3).unwrap()).density(1.0),
        )
        .unwrap();

    for _ in 0..180 {
        world.step(DT, 8, 3);
    }

    let events = counter.borrow();
    assert_eq!(events.begins, 1, "sensor should fire one begin event");
    assert_eq!(events.ends, 1, "sensor should fire one end event");
    // No impulses through a sensor.
    assert_eq!(events.post_solves, 0);
    // And the ball fell straight through.
    assert!(world.body(ball).unwrap().position().y < 4.0);
}

struct TouchFlag {
    fired: std::rc::Rc<std::cell::Cell<bool>>,
}

impl ContactListener for TouchFlag {
    fn begin_contact(&mut self, _contact: &Contact) {
        self.fired.set(true);
    }
}

#[test]
fn destruction_after_contact_event_cascades_cleanly() {
    let fired = std::rc::Rc::new(std::cell::Cell::new(false));
    let mut world = World::new(DVec2::new(0.0, -10.0));
    ground_edge(&mut world);

    let ball = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 1.0)))
        .unwrap();
    world
        .create_collider(
            ball,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0),
        )
        .unwrap();

    world.set_contact_listener(TouchFlag {
        fired: fired.clone(),
    });

    // React to the begin event after the step, while the world is
    // unlocked again.
    for _ in 0..120 {
        world.step(DT, 8, 3);
        if fired.get() {
            break;
        }
    }
    assert!(fired.get(), "ball never touched the ground");
    world.destroy_body(ball);
    assert!(world.body(ball).is_none());
    assert_eq!(world.contact_count(), 0);

    // The world keeps stepping cleanly afterwards.
    for _ in 0..10 {
        world.step(DT, 8, 3);
    }
}

#[test]
fn snapshot_round_trips_the_world_graph() {
    let mut world = World::new(DVec2::new(0.0, -10.0));
    ground_edge(&mut world);
    let a = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(0.0, 2.0)))
        .unwrap();
    world
        .create_collider(
            a,
            &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap()).density(1.0),
        )
        .unwrap();
    let b = world
        .create_body(&BodyDef::dynamic().position(DVec2::new(1.5, 2.0)))
        .unwrap();
    world
        .create_collider(
            b,
            &ColliderDef::new(Shape::circle(DVec2::ZERO, 0.5).unwrap()).density(1.0),
        )
        .unwrap();
    world
        .create_joint(&JointDef::Revolute(RevoluteJointDef::new(a, b)))
        .unwrap();

    let snapshot = world.snapshot();
    let restored = World::restore(&snapshot).unwrap();
    assert_eq!(restored.body_count(), world.body_count());
    assert_eq!(restored.collider_count(), world.collider_count());
    assert_eq!(restored.joint_count(), world.joint_count());

    // Restored bodies sit at the captured poses.
    let restored_positions: Vec<DVec2> = restored
        .body_ids()
        .iter()
        .map(|&id| restored.body(id).unwrap().position())
        .collect();
    let original_positions: Vec<DVec2> = world
        .body_ids()
        .iter()
        .map(|&id| world.body(id).unwrap().position())
        .collect();
    assert_eq!(restored_positions, original_positions);
}
