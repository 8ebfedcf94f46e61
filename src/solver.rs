//! Sequential-impulse contact solver: per-point normal/tangent velocity
//! constraints prepared once per step and iterated `velocity_iterations`
//! times, a two-contact block solver for the stacking case, and a separate
//! Baumgarte/NGS position-correction pass. Ordering (tangent before normal,
//! block solver only for exactly two points with its own per-contact enable
//! latch) follows `original_source/src/dynamics/constraint/contact/contact.cpp`'s
//! `SolveVelocityConstraint`.

use crate::arena::{Arena, Handle};
use crate::body::RigidBody;
use crate::contact::{Contact, PointImpulse};
use crate::math::{Mat2, Transform, Vec2};
use crate::settings::WorldSettings;
use crate::shape::Shape;

struct VelocityPoint {
    id: u32,
    point: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
    normal_impulse: f32,
    tangent_impulse: f32,
}

/// Prepared per-step state for one contact's velocity solve. Holds its own
/// copy of the two body handles so `solve` can look them up as a pair
/// without threading `Contact` (and its narrow-phase-owned `Manifold`)
/// through the hot loop.
pub struct ContactConstraint {
    pub body_a: Handle,
    pub body_b: Handle,
    normal: Vec2,
    tangent: Vec2,
    friction: f32,
    surface_speed: f32,
    points: Vec<VelocityPoint>,
    k: Mat2,
    normal_mass_2x2: Option<Mat2>,
    block_solve_enabled: bool,
}

/// Builds the velocity-constraint rows for one contact's manifold points.
/// Returns `None` if the contact isn't currently touching (nothing to
/// prepare) — callers should simply skip it for this step.
pub fn prepare_contact(
    bodies: &Arena<RigidBody>,
    contact: &Contact,
    body_a: Handle,
    body_b: Handle,
    settings: &WorldSettings,
) -> Option<ContactConstraint> {
    let manifold = contact.manifold.as_ref()?;
    if manifold.points.is_empty() {
        return None;
    }
    let a = bodies.get(body_a)?;
    let b = bodies.get(body_b)?;

    let normal = manifold.normal;
    let tangent = manifold.tangent;

    let mut points = Vec::with_capacity(manifold.points.len());
    for mp in &manifold.points {
        let r_a = mp.point - a.world_center();
        let r_b = mp.point - b.world_center();

        let rn_a = r_a.cross(normal);
        let rn_b = r_b.cross(normal);
        let k_normal = a.inv_mass + b.inv_mass + a.inv_inertia * rn_a * rn_a + b.inv_inertia * rn_b * rn_b;
        let normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

        let rt_a = r_a.cross(tangent);
        let rt_b = r_b.cross(tangent);
        let k_tangent = a.inv_mass + b.inv_mass + a.inv_inertia * rt_a * rt_a + b.inv_inertia * rt_b * rt_b;
        let tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

        let rel_vel = (b.linear_velocity + crate::math::cross_sv(b.angular_velocity, r_b))
            - (a.linear_velocity + crate::math::cross_sv(a.angular_velocity, r_a));
        let vel_n = rel_vel.dot(normal);
        let velocity_bias = if vel_n < -settings.restitution_slop {
            -contact.restitution * vel_n
        } else {
            0.0
        };

        let carried = contact.impulses.iter().find(|p| p.id == mp.id).copied().unwrap_or_default();

        points.push(VelocityPoint {
            id: mp.id,
            point: mp.point,
            r_a,
            r_b,
            normal_mass,
            tangent_mass,
            velocity_bias,
            normal_impulse: carried.normal_impulse,
            tangent_impulse: carried.tangent_impulse,
        });
    }

    // Two-point block solver setup: a 2x2 system over the normal impulses,
    // using the same Jacobian rows as the per-point solve above. Disabled
    // (the per-contact latch, distinct from the global `block_solve`
    // setting) if the system is near-singular at prepare time, per
    // `spec.md` §4.4 "If the matrix is ill-conditioned ... disable block
    // mode for this contact".
    let (k, normal_mass_2x2, block_solve_enabled) = if points.len() == 2 && settings.block_solve {
        let p1 = &points[0];
        let p2 = &points[1];
        let rn1a = p1.r_a.cross(normal);
        let rn1b = p1.r_b.cross(normal);
        let rn2a = p2.r_a.cross(normal);
        let rn2b = p2.r_b.cross(normal);

        let k11 = a.inv_mass + b.inv_mass + a.inv_inertia * rn1a * rn1a + b.inv_inertia * rn1b * rn1b;
        let k22 = a.inv_mass + b.inv_mass + a.inv_inertia * rn2a * rn2a + b.inv_inertia * rn2b * rn2b;
        let k12 = a.inv_mass + b.inv_mass + a.inv_inertia * rn1a * rn2a + b.inv_inertia * rn1b * rn2b;

        let k = Mat2::new(k11, k12, k12, k22);
        // A well-conditioned 2-point manifold has k11 substantially larger
        // than k12 (the two points aren't nearly coincident); the source
        // uses this ratio rather than a bare determinant check.
        const MAX_CONDITION_NUMBER: f32 = 1000.0;
        let well_conditioned = k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12);
        match (well_conditioned, k.inverse()) {
            (true, Some(inv)) => (k, Some(inv), true),
            _ => {
                log::debug!("contact block solver disabled: near-singular 2x2 system (k11={k11}, k22={k22}, k12={k12})");
                (k, None, false)
            }
        }
    } else {
        (Mat2::default(), None, false)
    };

    Some(ContactConstraint {
        body_a,
        body_b,
        normal,
        tangent,
        friction: contact.friction,
        surface_speed: b.surface_speed - a.surface_speed,
        points,
        k,
        normal_mass_2x2,
        block_solve_enabled,
    })
}

/// Applies the warm-start impulses built into `prepare_contact` immediately,
/// before any velocity iterations run (`spec.md` §4.4 "Apply warm-start
/// impulse immediately to both bodies").
pub fn warm_start(constraint: &ContactConstraint, a: &mut RigidBody, b: &mut RigidBody) {
    for p in &constraint.points {
        let impulse = constraint.normal * p.normal_impulse + constraint.tangent * p.tangent_impulse;
        apply_impulse(a, b, p.r_a, p.r_b, impulse);
    }
}

fn apply_impulse(a: &mut RigidBody, b: &mut RigidBody, r_a: Vec2, r_b: Vec2, impulse: Vec2) {
    a.linear_velocity -= impulse * a.inv_mass;
    a.angular_velocity -= a.inv_inertia * r_a.cross(impulse);
    b.linear_velocity += impulse * b.inv_mass;
    b.angular_velocity += b.inv_inertia * r_b.cross(impulse);
}

/// One velocity-iteration solve of `constraint`: friction (tangent) first
/// using the *current* normal accumulation as the cone radius, then the
/// normal impulse (per-point Gauss-Seidel, or the 2x2 block solve when
/// exactly two points are present and the latch is enabled).
pub fn solve_velocity(constraint: &mut ContactConstraint, a: &mut RigidBody, b: &mut RigidBody) {
    for i in 0..constraint.points.len() {
        let p = &constraint.points[i];
        let rel_vel = (b.linear_velocity + crate::math::cross_sv(b.angular_velocity, p.r_b))
            - (a.linear_velocity + crate::math::cross_sv(a.angular_velocity, p.r_a));
        let vt = rel_vel.dot(constraint.tangent) - constraint.surface_speed;
        let mut lambda = -p.tangent_mass * vt;

        let max_friction = constraint.friction * p.normal_impulse;
        let old_impulse = p.tangent_impulse;
        let new_impulse = (old_impulse + lambda).clamp(-max_friction, max_friction);
        lambda = new_impulse - old_impulse;

        constraint.points[i].tangent_impulse = new_impulse;
        let impulse = constraint.tangent * lambda;
        apply_impulse(a, b, p.r_a, p.r_b, impulse);
    }

    if constraint.points.len() == 2 && constraint.block_solve_enabled {
        solve_normal_block(constraint, a, b);
    } else {
        for i in 0..constraint.points.len() {
            let p = &constraint.points[i];
            let rel_vel = (b.linear_velocity + crate::math::cross_sv(b.angular_velocity, p.r_b))
                - (a.linear_velocity + crate::math::cross_sv(a.angular_velocity, p.r_a));
            let vn = rel_vel.dot(constraint.normal);
            let mut lambda = -p.normal_mass * (vn - p.velocity_bias);

            let old_impulse = p.normal_impulse;
            let new_impulse = (old_impulse + lambda).max(0.0);
            lambda = new_impulse - old_impulse;

            constraint.points[i].normal_impulse = new_impulse;
            let impulse = constraint.normal * lambda;
            apply_impulse(a, b, p.r_a, p.r_b, impulse);
        }
    }
}

/// Joint normal impulses for a two-point manifold as a 2x2 LCP, trying the
/// full unconstrained solve first and falling back through the three
/// boundary sub-cases (point 1 clamped to zero, point 2 clamped to zero,
/// both clamped) until one is feasible (non-negative resulting impulses and
/// non-penetrating relative velocities), per `spec.md` §4.4.
fn solve_normal_block(constraint: &mut ContactConstraint, a: &mut RigidBody, b: &mut RigidBody) {
    let inv = match constraint.normal_mass_2x2 {
        Some(inv) => inv,
        None => return,
    };

    let rel_vel = |body_a: &RigidBody, body_b: &RigidBody, r_a: Vec2, r_b: Vec2| -> f32 {
        ((body_b.linear_velocity + crate::math::cross_sv(body_b.angular_velocity, r_b))
            - (body_a.linear_velocity + crate::math::cross_sv(body_a.angular_velocity, r_a)))
        .dot(constraint.normal)
    };

    let a0 = Vec2::new(constraint.points[0].normal_impulse, constraint.points[1].normal_impulse);
    debug_assert!(a0.x >= 0.0 && a0.y >= 0.0);

    let vn1_0 = rel_vel(a, b, constraint.points[0].r_a, constraint.points[0].r_b);
    let vn2_0 = rel_vel(a, b, constraint.points[1].r_a, constraint.points[1].r_b);
    let b0 = Vec2::new(
        vn1_0 - constraint.points[0].velocity_bias,
        vn2_0 - constraint.points[1].velocity_bias,
    );

    // Case 1: both points stay clamped at >= 0.
    let x = -inv.mul_vec(b0);
    if x.x >= 0.0 && x.y >= 0.0 {
        apply_block_delta(constraint, a, b, x - a0);
        return;
    }

    // Case 2: point 1 clamped to zero, solve point 2 alone.
    let x1 = 0.0_f32;
    let k22 = constraint.k.col2.y;
    let x2 = if k22 > 0.0 { -b0.y / k22 } else { 0.0 };
    if x2 >= 0.0 {
        let vn1 = constraint.k.col1.x * x1 + constraint.k.col2.x * x2 + b0.x;
        if vn1 >= 0.0 {
            apply_block_delta(constraint, a, b, Vec2::new(x1, x2) - a0);
            return;
        }
    }

    // Case 3: point 2 clamped to zero, solve point 1 alone.
    let x2b = 0.0_f32;
    let k11 = constraint.k.col1.x;
    let x1b = if k11 > 0.0 { -b0.x / k11 } else { 0.0 };
    if x1b >= 0.0 {
        let vn2b = constraint.k.col1.y * x1b + constraint.k.col2.y * x2b + b0.y;
        if vn2b >= 0.0 {
            apply_block_delta(constraint, a, b, Vec2::new(x1b, x2b) - a0);
            return;
        }
    }

    // Case 4: both clamped to zero.
    let vn1c = b0.x;
    let vn2c = b0.y;
    if vn1c >= 0.0 && vn2c >= 0.0 {
        apply_block_delta(constraint, a, b, Vec2::ZERO - a0);
    }
    // Otherwise: no feasible sub-case (shouldn't happen for a well-
    // conditioned system); leave impulses unchanged this iteration rather
    // than apply an infeasible solve.
}

fn apply_block_delta(constraint: &mut ContactConstraint, a: &mut RigidBody, b: &mut RigidBody, delta: Vec2) {
    let p0 = &constraint.points[0];
    let p1 = &constraint.points[1];
    let impulse0 = constraint.normal * delta.x;
    let impulse1 = constraint.normal * delta.y;
    apply_impulse(a, b, p0.r_a, p0.r_b, impulse0);
    apply_impulse(a, b, p1.r_a, p1.r_b, impulse1);
    constraint.points[0].normal_impulse += delta.x;
    constraint.points[1].normal_impulse += delta.y;
}

/// Copies the solved impulses back out for next step's warm start.
pub fn store_impulses(constraint: &ContactConstraint) -> Vec<PointImpulse> {
    constraint
        .points
        .iter()
        .map(|p| PointImpulse {
            id: p.id,
            point: p.point,
            normal_impulse: p.normal_impulse,
            tangent_impulse: p.tangent_impulse,
        })
        .collect()
}

/// Non-linear Gauss-Seidel position correction for one contact: re-runs the
/// narrow phase against the bodies' *current* transforms (which may have
/// moved since the last position iteration) and nudges positions directly —
/// no velocity state is touched, matching the split-impulse/pseudo-velocity
/// style `spec.md` §4.4 calls for. Returns the manifold's penetration depth
/// (0 if no longer touching) so the caller's iteration loop can stop once
/// every contact clears `linear_slop * multiplier`.
pub fn solve_position(
    bodies: &mut Arena<RigidBody>,
    shape_a: &Shape,
    local_a: Transform,
    shape_b: &Shape,
    local_b: Transform,
    body_a: Handle,
    body_b: Handle,
    settings: &WorldSettings,
) -> f32 {
    let (a, b) = match bodies.get_pair_mut(body_a, body_b) {
        Some(pair) => pair,
        None => return 0.0,
    };
    if !a.is_dynamic() && !b.is_dynamic() {
        return 0.0;
    }

    let tf_a = combine(a.transform, local_a);
    let tf_b = combine(b.transform, local_b);

    let np_settings = crate::manifold::NarrowPhaseSettings {
        gjk_max_iterations: settings.gjk_max_iterations,
        epa_max_iterations: settings.epa_max_iterations,
        epa_tolerance: settings.epa_tolerance,
        contact_merge_threshold: settings.contact_merge_threshold,
    };
    let manifold = match crate::manifold::detect_collision(shape_a, tf_a, shape_b, tf_b, &np_settings) {
        Some(m) => m,
        None => return 0.0,
    };

    if !settings.position_correction || manifold.points.is_empty() {
        return manifold.penetration;
    }

    let c = (manifold.penetration - settings.penetration_slop).max(0.0);
    let max_correction = 0.2;
    let correction_magnitude = (settings.position_correction_beta * c).min(max_correction);

    for point in &manifold.points {
        let r_a = point.point - a.world_center();
        let r_b = point.point - b.world_center();
        let rn_a = r_a.cross(manifold.normal);
        let rn_b = r_b.cross(manifold.normal);
        let k = a.inv_mass + b.inv_mass + a.inv_inertia * rn_a * rn_a + b.inv_inertia * rn_b * rn_b;
        if k <= 0.0 {
            continue;
        }
        let impulse = manifold.normal * (correction_magnitude / k);
        a.transform.position -= impulse * a.inv_mass;
        a.transform.rotation =
            crate::math::Rot::from_angle(a.transform.rotation.angle() - a.inv_inertia * r_a.cross(impulse));
        b.transform.position += impulse * b.inv_mass;
        b.transform.rotation =
            crate::math::Rot::from_angle(b.transform.rotation.angle() + b.inv_inertia * r_b.cross(impulse));
    }

    manifold.penetration
}

fn combine(body_tf: Transform, local_tf: Transform) -> Transform {
    Transform {
        position: body_tf.apply(local_tf.position),
        rotation: crate::math::Rot {
            cos: body_tf.rotation.cos * local_tf.rotation.cos - body_tf.rotation.sin * local_tf.rotation.sin,
            sin: body_tf.rotation.sin * local_tf.rotation.cos + body_tf.rotation.cos * local_tf.rotation.sin,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyType;
    use crate::math::Transform;

    fn settings() -> WorldSettings {
        WorldSettings::default()
    }

    #[test]
    fn prepare_warm_start_solve_round_trip() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let mut a = RigidBody::new(0, BodyType::Static, Vec2::new(0.0, 0.0), 0.0);
        a.transform = Transform::identity();
        let ha = bodies.insert(a);

        let mut b = RigidBody::new(1, BodyType::Dynamic, Vec2::new(0.0, 1.95), 0.0);
        b.inv_mass = 1.0;
        b.inv_inertia = 1.0;
        b.linear_velocity = Vec2::new(0.0, -5.0);
        let hb = bodies.insert(b);

        let shape_a = Shape::new_box(5.0, 1.0);
        let shape_b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(0.0, 1.95), 0.0);

        let np_settings = crate::manifold::NarrowPhaseSettings {
            gjk_max_iterations: 20,
            epa_max_iterations: 20,
            epa_tolerance: 1e-4,
            contact_merge_threshold: 1e-4,
        };
        let mut contact = Contact::new(0, 1, 0.3, 0.0);
        contact.update(&shape_a, tf_a, &shape_b, tf_b, &np_settings, true, false, 0.0);
        assert!(contact.touching);

        let settings = settings();
        let mut constraint = prepare_contact(&bodies, &contact, ha, hb, &settings).unwrap();
        {
            let (ba, bb) = bodies.get_pair_mut(ha, hb).unwrap();
            warm_start(&constraint, ba, bb);
            for _ in 0..8 {
                solve_velocity(&mut constraint, ba, bb);
            }
        }
        let b_after = bodies.get(hb).unwrap();
        // The box was falling into the ground; after solving, it should no
        // longer be approaching (normal separating velocity >= 0).
        assert!(b_after.linear_velocity.y >= -1e-3);
    }

    #[test]
    fn position_solve_reduces_penetration() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let a = RigidBody::new(0, BodyType::Static, Vec2::ZERO, 0.0);
        let ha = bodies.insert(a);

        let mut b = RigidBody::new(1, BodyType::Dynamic, Vec2::new(0.0, 1.8), 0.0);
        b.inv_mass = 1.0;
        b.inv_inertia = 1.0;
        let hb = bodies.insert(b);

        let shape_a = Shape::new_box(5.0, 1.0);
        let shape_b = Shape::new_box(1.0, 1.0);
        let settings = settings();

        let penetration_before = {
            let a_ref = bodies.get(ha).unwrap();
            let b_ref = bodies.get(hb).unwrap();
            let np = crate::manifold::NarrowPhaseSettings {
                gjk_max_iterations: 20,
                epa_max_iterations: 20,
                epa_tolerance: 1e-4,
                contact_merge_threshold: 1e-4,
            };
            crate::manifold::detect_collision(&shape_a, a_ref.transform, &shape_b, b_ref.transform, &np)
                .unwrap()
                .penetration
        };
        assert!(penetration_before > 0.0);

        for _ in 0..20 {
            solve_position(
                &mut bodies,
                &shape_a,
                Transform::identity(),
                &shape_b,
                Transform::identity(),
                ha,
                hb,
                &settings,
            );
        }

        let b_after = bodies.get(hb).unwrap();
        assert!(b_after.transform.position.y > 1.8);
    }
}
