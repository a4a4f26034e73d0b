use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::DVec2;
use planar_accelerator::*;

fn pyramid_world(rows: usize) -> World {
    let mut world = World::new(DVec2::new(0.0, -10.0));
    let ground = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_collider(
            ground,
            &ColliderDef::new(
                Shape::edge(DVec2::new(-50.0, 0.0), DVec2::new(50.0, 0.0)).unwrap(),
            ),
        )
        .unwrap();

    for row in 0..rows {
        for col in 0..(rows - row) {
            let x = (col as f64 - 0.5 * (rows - row) as f64) * 1.05;
            let y = 0.5 + row as f64 * 1.05;
            let body = world
                .create_body(&BodyDef::dynamic().position(DVec2::new(x, y)))
                .unwrap();
            world
                .create_collider(
                    body,
                    &ColliderDef::new(Shape::rect(0.5, 0.5).unwrap())
                        .density(1.0)
                        .friction(0.5),
                )
                .unwrap();
        }
    }
    world
}

fn bench_pyramid_step(c: &mut Criterion) {
    c.bench_function("pyramid_10_rows_step", |b| {
        let mut world = pyramid_world(10);
        // Warm the contact graph before measuring.
        for _ in 0..10 {
            world.step(1.0 / 60.0, 8, 3);
        }
        b.iter(|| {
            world.step(black_box(1.0 / 60.0), 8, 3);
        })
    });
}

fn bench_world_construction(c: &mut Criterion) {
    c.bench_function("pyramid_10_rows_build_and_settle", |b| {
        b.iter(|| {
            let mut world = pyramid_world(black_box(10));
            for _ in 0..5 {
                world.step(1.0 / 60.0, 8, 3);
            }
            world
        })
    });
}

criterion_group!(benches, bench_pyramid_step, bench_world_construction);
criterion_main!(benches);
