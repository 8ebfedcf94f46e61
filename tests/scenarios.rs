//! End-to-end scenarios exercising the public `World` API as a whole rather
//! than any single module in isolation.

use rigid2d::body::BodyType;
use rigid2d::distance::compute_distance;
use rigid2d::joint::{Joint, RevoluteJoint, SoftParams};
use rigid2d::math::{Transform, Vec2};
use rigid2d::settings::WorldSettings;
use rigid2d::shape::Shape;
use rigid2d::world::{RayCastHit, World};

/// Installs `env_logger` so `RUST_LOG=rigid2d=debug cargo test -- --nocapture`
/// surfaces the crate's solver/narrow-phase diagnostics during these
/// end-to-end scenarios. Idempotent: later scenarios' calls are no-ops.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn circle_falls_onto_ground() {
    init_logging();
    let mut settings = WorldSettings::default();
    settings.gravity = Vec2::new(0.0, -10.0);
    let mut world = World::new(settings);

    let ground = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
    world.create_collider(ground, Shape::new_box(50.0, 0.2), 1.0).unwrap();

    let ball = world.create_body(BodyType::Dynamic, Vec2::new(0.0, 5.0), 0.0);
    world.create_collider(ball, Shape::Circle { radius: 0.5 }, 1.0).unwrap();
    if let Some(b) = world.body_mut(ball) {
        b.friction = 0.5;
        b.restitution = 0.0;
    }

    for _ in 0..120 {
        world.step(1.0 / 60.0);
    }

    let body = world.body(ball).unwrap();
    assert!((body.transform.position.y - 0.7).abs() < 0.01, "y = {}", body.transform.position.y);
    assert!(body.linear_velocity.y.abs() < 0.01);
    assert_eq!(world.contacts().filter(|c| c.touching).count(), 1);
}

#[test]
fn box_stack_settles_without_excess_rotation() {
    init_logging();
    let mut settings = WorldSettings::default();
    settings.gravity = Vec2::new(0.0, -10.0);
    let mut world = World::new(settings);

    let ground = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
    world.create_collider(ground, Shape::new_box(50.0, 0.2), 1.0).unwrap();

    const N: usize = 20;
    let mut boxes = Vec::with_capacity(N);
    let mut y = 0.2 + 0.05 + 0.5;
    for _ in 0..N {
        let h = world.create_body(BodyType::Dynamic, Vec2::new(0.0, y), 0.0);
        world.create_collider(h, Shape::new_box(0.5, 0.5), 1.0).unwrap();
        boxes.push(h);
        y += 1.0 + 0.05;
    }

    for _ in 0..180 {
        world.step(1.0 / 60.0);
    }

    for (i, &h) in boxes.iter().enumerate() {
        let body = world.body(h).unwrap();
        let expected_y = 0.7 + i as f32;
        assert!((body.transform.position.y - expected_y).abs() < 0.02, "box {i}: y = {}, expected {expected_y}", body.transform.position.y);
        assert!(body.transform.rotation.angle().abs() < 0.01, "box {i}: angle = {}", body.transform.rotation.angle());
    }
}

#[test]
fn pendulum_swing_amplitude_is_conserved() {
    init_logging();
    let mut settings = WorldSettings::default();
    settings.gravity = Vec2::new(0.0, -10.0);
    let mut world = World::new(settings);

    let anchor = world.create_body(BodyType::Static, Vec2::new(0.0, 2.0), 0.0);
    let bob = world.create_body(BodyType::Dynamic, Vec2::new(1.0, 2.0), 0.0);
    world.create_collider(bob, Shape::new_box(0.5, 0.05), 1.0).unwrap();

    let joint = Joint::Revolute(RevoluteJoint::new(anchor, bob, Vec2::ZERO, Vec2::new(-1.0, 0.0), SoftParams::rigid()));
    world.create_joint(joint).unwrap();

    let initial_amplitude = std::f32::consts::FRAC_PI_2;
    let mut max_amplitude = 0.0_f32;
    for _ in 0..600 {
        world.step(1.0 / 60.0);
        let anchor_pos = world.body(anchor).unwrap().transform.position;
        let bob_pos = world.body(bob).unwrap().transform.position;
        let d = bob_pos - anchor_pos;
        let angle = d.x.atan2(-d.y).abs();
        max_amplitude = max_amplitude.max(angle);
    }

    let relative_drift = (max_amplitude - initial_amplitude).abs() / initial_amplitude;
    assert!(relative_drift < 0.05, "amplitude drifted {}% (max={max_amplitude}, initial={initial_amplitude})", relative_drift * 100.0);
}

#[test]
fn ray_cast_through_bvh_hits_circle() {
    init_logging();
    let mut world = World::new(WorldSettings::default());
    let body = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
    world.create_collider(body, Shape::Circle { radius: 1.0 }, 1.0).unwrap();

    let mut fraction = None;
    let mut normal = None;
    world.ray_cast(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), &mut |hit: RayCastHit| -> f32 {
        fraction = Some(hit.fraction);
        normal = Some(hit.normal);
        0.0
    });

    assert!((fraction.unwrap() - 0.4).abs() < 1e-4);
    let n = normal.unwrap();
    assert!((n.x - (-1.0)).abs() < 1e-4);
    assert!(n.y.abs() < 1e-4);
}

#[test]
fn distance_query_between_separated_polygons() {
    init_logging();
    let a = Shape::new_box(0.5, 0.5);
    let b = Shape::new_box(0.5, 0.5);
    let tf_a = Transform::identity();
    let tf_b = Transform::new(Vec2::new(4.0, 0.0), 0.0);

    let (dist, _witness_a, _witness_b) = compute_distance(&a, tf_a, &b, tf_b, 20);
    assert!((dist - 3.0).abs() < 1e-5);
}

#[test]
fn thin_wall_stops_fast_circle_via_toi() {
    init_logging();
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let dt = settings.dt;
    let mut world = World::new(settings);

    let wall = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
    world.create_collider(wall, Shape::new_box(0.05, 5.0), 1.0).unwrap();

    let bullet = world.create_body(BodyType::Dynamic, Vec2::new(-1.0, 0.0), 0.0);
    world.create_collider(bullet, Shape::Circle { radius: 0.05 }, 1.0).unwrap();
    world.body_mut(bullet).unwrap().linear_velocity = Vec2::new(2.0 / dt, 0.0);

    world.step(dt);

    let pos = world.body(bullet).unwrap().transform.position;
    // Without TOI the bullet would land at x = 1.0, straight through the
    // wall; with TOI it is clamped to somewhere around the wall's surface.
    assert!(pos.x > -1.0 && pos.x < 0.2, "bullet tunneled through the wall: x = {}", pos.x);
}
