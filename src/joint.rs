//! Joint constraints. Every kind shares the same scaffold — local anchor
//! frames captured at creation, a soft-constraint (`gamma`/`beta`) derived
//! from `frequency`/`dampingRatio` each `prepare()`, and a `solve_velocity`
//! that applies `effective_mass * -(Jv + bias + impulseSum * gamma)` — with
//! Distance/Revolute/Line following
//! `original_source/src/dynamics/constraint/joint/{distance_joint,revolute_joint,line_joint}.cpp`
//! exactly, and Weld/Grab/Prismatic generalizing the same scaffold per
//! `SPEC_FULL.md` §4.5.

use std::f32::consts::PI;

use crate::arena::{Arena, Handle};
use crate::body::RigidBody;
use crate::math::{cross_sv, Mat2, Vec2};
use crate::settings::WorldSettings;

/// `frequency == 0` degenerates to a rigid (non-soft) constraint: `gamma =
/// 0`, `beta` falls back to the engine's standard Baumgarte ERP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftParams {
    pub frequency: f32,
    pub damping_ratio: f32,
}

impl SoftParams {
    pub fn rigid() -> SoftParams {
        SoftParams {
            frequency: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Derives `(gamma, beta)` from `effective_mass` (the Jacobian row's own
    /// reciprocal mass, i.e. `1/k` before `gamma` is added to `k`), the step
    /// `dt`, and `default_beta` (the engine's standard Baumgarte ERP, used
    /// when this constraint isn't soft).
    fn derive(&self, effective_mass: f32, dt: f32, default_beta: f32) -> (f32, f32) {
        if self.frequency <= 0.0 || dt <= 0.0 || effective_mass <= 0.0 {
            return (0.0, default_beta);
        }
        let omega = 2.0 * PI * self.frequency;
        let k_spring = effective_mass * omega * omega;
        let c_damper = 2.0 * effective_mass * self.damping_ratio * omega;
        let denom = dt * (c_damper + dt * k_spring);
        if denom.abs() < crate::math::EPSILON {
            return (0.0, default_beta);
        }
        let gamma = 1.0 / denom;
        let beta = dt * k_spring * gamma;
        (gamma, beta)
    }
}

/// Distance joint: removes one translational DoF along the anchor axis `u`.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub body_a: Handle,
    pub body_b: Handle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    pub soft: SoftParams,
    impulse_sum: f32,
    ra: Vec2,
    rb: Vec2,
    u: Vec2,
    mass: f32,
    gamma: f32,
    bias: f32,
}

impl DistanceJoint {
    pub fn new(body_a: Handle, body_b: Handle, local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32, soft: SoftParams) -> Self {
        DistanceJoint {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length,
            soft,
            impulse_sum: 0.0,
            ra: Vec2::ZERO,
            rb: Vec2::ZERO,
            u: Vec2::new(1.0, 0.0),
            mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        self.ra = a.transform.rotation.mul_vec(self.local_anchor_a);
        self.rb = b.transform.rotation.mul_vec(self.local_anchor_b);

        let pa = a.world_center() + self.ra;
        let pb = b.world_center() + self.rb;
        self.u = pb - pa;
        let current_length = self.u.normalize();

        let cn_a = self.u.cross(self.ra);
        let cn_b = self.u.cross(self.rb);
        let k = a.inv_mass + b.inv_mass + a.inv_inertia * cn_a * cn_a + b.inv_inertia * cn_b * cn_b;

        let (gamma, beta) = self.soft.derive(if k > 0.0 { 1.0 / k } else { 0.0 }, settings.dt, settings.position_correction_beta);
        self.gamma = gamma;
        self.mass = if k + gamma > 0.0 { 1.0 / (k + gamma) } else { 0.0 };

        let error = current_length - self.length;
        self.bias = error * beta * settings.inv_dt;

        if settings.warm_starting {
            apply_distance_impulse(a, b, self.u, self.ra, self.rb, self.impulse_sum);
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let jv = ((b.linear_velocity + cross_sv(b.angular_velocity, self.rb))
            - (a.linear_velocity + cross_sv(a.angular_velocity, self.ra)))
        .dot(self.u);

        let lambda = self.mass * -(jv + self.bias + self.impulse_sum * self.gamma);
        apply_distance_impulse(a, b, self.u, self.ra, self.rb, lambda);
        if settings.warm_starting {
            self.impulse_sum += lambda;
        }
    }
}

fn apply_distance_impulse(a: &mut RigidBody, b: &mut RigidBody, u: Vec2, ra: Vec2, rb: Vec2, lambda: f32) {
    a.linear_velocity -= u * (lambda * a.inv_mass);
    a.angular_velocity -= u.dot(cross_sv(lambda, ra)) * a.inv_inertia;
    b.linear_velocity += u * (lambda * b.inv_mass);
    b.angular_velocity += u.dot(cross_sv(lambda, rb)) * b.inv_inertia;
}

/// Revolute joint: removes both translational DoFs, pinning a shared world
/// anchor point between the two bodies.
#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub body_a: Handle,
    pub body_b: Handle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub soft: SoftParams,
    impulse_sum: Vec2,
    ra: Vec2,
    rb: Vec2,
    mass: Mat2,
    gamma: f32,
    bias: Vec2,
}

impl RevoluteJoint {
    pub fn new(body_a: Handle, body_b: Handle, local_anchor_a: Vec2, local_anchor_b: Vec2, soft: SoftParams) -> Self {
        RevoluteJoint {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            soft,
            impulse_sum: Vec2::ZERO,
            ra: Vec2::ZERO,
            rb: Vec2::ZERO,
            mass: Mat2::default(),
            gamma: 0.0,
            bias: Vec2::ZERO,
        }
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        self.ra = a.transform.rotation.mul_vec(self.local_anchor_a);
        self.rb = b.transform.rotation.mul_vec(self.local_anchor_b);

        let k11 = a.inv_mass + b.inv_mass + a.inv_inertia * self.ra.y * self.ra.y + b.inv_inertia * self.rb.y * self.rb.y;
        let k12 = -a.inv_inertia * self.ra.y * self.ra.x - b.inv_inertia * self.rb.y * self.rb.x;
        let k22 = a.inv_mass + b.inv_mass + a.inv_inertia * self.ra.x * self.ra.x + b.inv_inertia * self.rb.x * self.rb.x;

        let trace_effective_mass = {
            let det = k11 * k22 - k12 * k12;
            if det.abs() > crate::math::EPSILON {
                2.0 / (k11 + k22)
            } else {
                0.0
            }
        };
        let (gamma, beta) = self.soft.derive(trace_effective_mass, settings.dt, settings.position_correction_beta);
        self.gamma = gamma;

        let k = Mat2::new(k11 + gamma, k12, k12, k22 + gamma);
        self.mass = k.inverse().unwrap_or_default();

        let pa = a.world_center() + self.ra;
        let pb = b.world_center() + self.rb;
        let error = pb - pa;
        self.bias = error * (beta * settings.inv_dt);

        if settings.warm_starting {
            apply_revolute_impulse(a, b, self.ra, self.rb, self.impulse_sum);
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let jv = (b.linear_velocity + cross_sv(b.angular_velocity, self.rb)) - (a.linear_velocity + cross_sv(a.angular_velocity, self.ra));
        let lambda = self.mass.mul_vec(-(jv + self.bias + self.impulse_sum * self.gamma));
        apply_revolute_impulse(a, b, self.ra, self.rb, lambda);
        if settings.warm_starting {
            self.impulse_sum += lambda;
        }
    }
}

fn apply_revolute_impulse(a: &mut RigidBody, b: &mut RigidBody, ra: Vec2, rb: Vec2, lambda: Vec2) {
    a.linear_velocity -= lambda * a.inv_mass;
    a.angular_velocity -= a.inv_inertia * ra.cross(lambda);
    b.linear_velocity += lambda * b.inv_mass;
    b.angular_velocity += b.inv_inertia * rb.cross(lambda);
}

/// Line joint: removes one translational DoF lateral to a shared axis,
/// leaving the bodies free to slide along it (and rotate independently).
#[derive(Debug, Clone)]
pub struct LineJoint {
    pub body_a: Handle,
    pub body_b: Handle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub local_y_axis: Vec2,
    pub soft: SoftParams,
    impulse_sum: f32,
    t: Vec2,
    sa: f32,
    sb: f32,
    mass: f32,
    gamma: f32,
    bias: f32,
}

impl LineJoint {
    pub fn new(body_a: Handle, body_b: Handle, local_anchor_a: Vec2, local_anchor_b: Vec2, local_y_axis: Vec2, soft: SoftParams) -> Self {
        LineJoint {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            local_y_axis,
            soft,
            impulse_sum: 0.0,
            t: Vec2::ZERO,
            sa: 0.0,
            sb: 0.0,
            mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
        }
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let ra = a.transform.rotation.mul_vec(self.local_anchor_a);
        let rb = b.transform.rotation.mul_vec(self.local_anchor_b);
        let pa = a.world_center() + ra;
        let pb = b.world_center() + rb;
        let d = pb - pa;

        self.t = a.transform.rotation.mul_vec(self.local_y_axis);
        self.sa = (ra + d).cross(self.t);
        self.sb = rb.cross(self.t);

        let k = a.inv_mass + b.inv_mass + a.inv_inertia * self.sa * self.sa + b.inv_inertia * self.sb * self.sb;
        let (gamma, beta) = self.soft.derive(if k > 0.0 { 1.0 / k } else { 0.0 }, settings.dt, settings.position_correction_beta);
        self.gamma = gamma;
        self.mass = if k + gamma != 0.0 { 1.0 / (k + gamma) } else { 0.0 };

        let error = d.dot(self.t);
        self.bias = error * beta * settings.inv_dt;

        if settings.warm_starting {
            apply_line_impulse(a, b, self.t, self.sa, self.sb, self.impulse_sum);
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let (a, b) = match bodies.get_pair_mut(self.body_a, self.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let jv = self.t.dot(b.linear_velocity - a.linear_velocity) + self.sb * b.angular_velocity - self.sa * a.angular_velocity;
        let lambda = self.mass * -(jv + self.bias + self.impulse_sum * self.gamma);
        apply_line_impulse(a, b, self.t, self.sa, self.sb, lambda);
        if settings.warm_starting {
            self.impulse_sum += lambda;
        }
    }
}

fn apply_line_impulse(a: &mut RigidBody, b: &mut RigidBody, t: Vec2, sa: f32, sb: f32, lambda: f32) {
    let p = t * lambda;
    a.linear_velocity -= p * a.inv_mass;
    a.angular_velocity -= lambda * sa * a.inv_inertia;
    b.linear_velocity += p * b.inv_mass;
    b.angular_velocity += lambda * sb * b.inv_inertia;
}

/// Weld joint: a revolute point constraint plus a locked relative angle,
/// removing all 3 relative DoFs. Solved as two independent blocks (the 2x2
/// point constraint, then the scalar angle constraint) rather than a single
/// 3x3 system — a standard simplification of the coupled form that still
/// converges to the same rest pose under Gauss-Seidel iteration.
#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub revolute: RevoluteJoint,
    pub reference_angle: f32,
    pub angular_soft: SoftParams,
    angular_impulse_sum: f32,
    angular_mass: f32,
    angular_gamma: f32,
    angular_bias: f32,
}

impl WeldJoint {
    pub fn new(body_a: Handle, body_b: Handle, local_anchor_a: Vec2, local_anchor_b: Vec2, reference_angle: f32, soft: SoftParams) -> Self {
        WeldJoint {
            revolute: RevoluteJoint::new(body_a, body_b, local_anchor_a, local_anchor_b, soft),
            reference_angle,
            angular_soft: soft,
            angular_impulse_sum: 0.0,
            angular_mass: 0.0,
            angular_gamma: 0.0,
            angular_bias: 0.0,
        }
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        self.revolute.prepare(bodies, settings);

        let (a, b) = match bodies.get_pair_mut(self.revolute.body_a, self.revolute.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let k = a.inv_inertia + b.inv_inertia;
        let (gamma, beta) = self
            .angular_soft
            .derive(if k > 0.0 { 1.0 / k } else { 0.0 }, settings.dt, settings.position_correction_beta);
        self.angular_gamma = gamma;
        self.angular_mass = if k + gamma > 0.0 { 1.0 / (k + gamma) } else { 0.0 };

        let current_angle = b.transform.rotation.angle() - a.transform.rotation.angle();
        let error = current_angle - self.reference_angle;
        self.angular_bias = error * beta * settings.inv_dt;

        if settings.warm_starting {
            a.angular_velocity -= a.inv_inertia * self.angular_impulse_sum;
            b.angular_velocity += b.inv_inertia * self.angular_impulse_sum;
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        self.revolute.solve_velocity(bodies, settings);

        let (a, b) = match bodies.get_pair_mut(self.revolute.body_a, self.revolute.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let jv = b.angular_velocity - a.angular_velocity;
        let lambda = self.angular_mass * -(jv + self.angular_bias + self.angular_impulse_sum * self.angular_gamma);
        a.angular_velocity -= a.inv_inertia * lambda;
        b.angular_velocity += b.inv_inertia * lambda;
        if settings.warm_starting {
            self.angular_impulse_sum += lambda;
        }
    }
}

/// Grab (mouse) joint: a soft revolute-style anchor pinning a single
/// dynamic body's local point to a moving world-space target, with the
/// "other side" of the constraint treated as infinite mass (there is no
/// second body).
#[derive(Debug, Clone)]
pub struct GrabJoint {
    pub body: Handle,
    pub local_anchor: Vec2,
    pub target: Vec2,
    pub soft: SoftParams,
    impulse_sum: Vec2,
    r: Vec2,
    mass: Mat2,
    gamma: f32,
    bias: Vec2,
}

impl GrabJoint {
    pub fn new(body: Handle, local_anchor: Vec2, target: Vec2, soft: SoftParams) -> Self {
        GrabJoint {
            body,
            local_anchor,
            target,
            soft,
            impulse_sum: Vec2::ZERO,
            r: Vec2::ZERO,
            mass: Mat2::default(),
            gamma: 0.0,
            bias: Vec2::ZERO,
        }
    }

    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let body = match bodies.get_mut(self.body) {
            Some(b) => b,
            None => return,
        };
        self.r = body.transform.rotation.mul_vec(self.local_anchor);

        let k11 = body.inv_mass + body.inv_inertia * self.r.y * self.r.y;
        let k12 = -body.inv_inertia * self.r.y * self.r.x;
        let k22 = body.inv_mass + body.inv_inertia * self.r.x * self.r.x;

        let trace_effective_mass = {
            let det = k11 * k22 - k12 * k12;
            if det.abs() > crate::math::EPSILON {
                2.0 / (k11 + k22)
            } else {
                0.0
            }
        };
        let (gamma, beta) = self.soft.derive(trace_effective_mass, settings.dt, settings.position_correction_beta);
        self.gamma = gamma;
        let k = Mat2::new(k11 + gamma, k12, k12, k22 + gamma);
        self.mass = k.inverse().unwrap_or_default();

        let anchor_world = body.world_center() + self.r;
        let error = anchor_world - self.target;
        self.bias = error * (beta * settings.inv_dt);

        if settings.warm_starting {
            body.linear_velocity += self.impulse_sum * body.inv_mass;
            body.angular_velocity += body.inv_inertia * self.r.cross(self.impulse_sum);
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        let body = match bodies.get_mut(self.body) {
            Some(b) => b,
            None => return,
        };
        let jv = body.linear_velocity + cross_sv(body.angular_velocity, self.r);
        let lambda = self.mass.mul_vec(-(jv + self.bias + self.impulse_sum * self.gamma));
        body.linear_velocity += lambda * body.inv_mass;
        body.angular_velocity += body.inv_inertia * self.r.cross(lambda);
        if settings.warm_starting {
            self.impulse_sum += lambda;
        }
    }
}

/// Prismatic joint: a `LineJoint`'s lateral constraint plus a locked
/// relative angle, removing the rotational freedom the line joint leaves.
#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub line: LineJoint,
    pub reference_angle: f32,
    pub angular_soft: SoftParams,
    angular_impulse_sum: f32,
    angular_mass: f32,
    angular_gamma: f32,
    angular_bias: f32,
}

impl PrismaticJoint {
    pub fn new(
        body_a: Handle,
        body_b: Handle,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        local_axis: Vec2,
        reference_angle: f32,
        soft: SoftParams,
    ) -> Self {
        // The lateral axis is the sliding axis rotated 90 degrees; the line
        // joint's own constraint already removes motion along it.
        let local_y_axis = local_axis.normalized().perp();
        PrismaticJoint {
            line: LineJoint::new(body_a, body_b, local_anchor_a, local_anchor_b, local_y_axis, soft),
            reference_angle,
            angular_soft: soft,
            angular_impulse_sum: 0.0,
            angular_mass: 0.0,
            angular_gamma: 0.0,
            angular_bias: 0.0,
        }
    }

    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        self.line.prepare(bodies, settings);

        let (a, b) = match bodies.get_pair_mut(self.line.body_a, self.line.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let k = a.inv_inertia + b.inv_inertia;
        let (gamma, beta) = self
            .angular_soft
            .derive(if k > 0.0 { 1.0 / k } else { 0.0 }, settings.dt, settings.position_correction_beta);
        self.angular_gamma = gamma;
        self.angular_mass = if k + gamma > 0.0 { 1.0 / (k + gamma) } else { 0.0 };

        let current_angle = b.transform.rotation.angle() - a.transform.rotation.angle();
        let error = current_angle - self.reference_angle;
        self.angular_bias = error * beta * settings.inv_dt;

        if settings.warm_starting {
            a.angular_velocity -= a.inv_inertia * self.angular_impulse_sum;
            b.angular_velocity += b.inv_inertia * self.angular_impulse_sum;
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        self.line.solve_velocity(bodies, settings);

        let (a, b) = match bodies.get_pair_mut(self.line.body_a, self.line.body_b) {
            Some(pair) => pair,
            None => return,
        };
        let jv = b.angular_velocity - a.angular_velocity;
        let lambda = self.angular_mass * -(jv + self.angular_bias + self.angular_impulse_sum * self.angular_gamma);
        a.angular_velocity -= a.inv_inertia * lambda;
        b.angular_velocity += b.inv_inertia * lambda;
        if settings.warm_starting {
            self.angular_impulse_sum += lambda;
        }
    }
}

/// A joint of any kind, dispatched by the world's velocity-iteration loop.
#[derive(Debug, Clone)]
pub enum Joint {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Line(LineJoint),
    Weld(WeldJoint),
    Grab(GrabJoint),
    Prismatic(PrismaticJoint),
}

impl Joint {
    pub fn prepare(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        match self {
            Joint::Distance(j) => j.prepare(bodies, settings),
            Joint::Revolute(j) => j.prepare(bodies, settings),
            Joint::Line(j) => j.prepare(bodies, settings),
            Joint::Weld(j) => j.prepare(bodies, settings),
            Joint::Grab(j) => j.prepare(bodies, settings),
            Joint::Prismatic(j) => j.prepare(bodies, settings),
        }
    }

    pub fn solve_velocity(&mut self, bodies: &mut Arena<RigidBody>, settings: &WorldSettings) {
        match self {
            Joint::Distance(j) => j.solve_velocity(bodies, settings),
            Joint::Revolute(j) => j.solve_velocity(bodies, settings),
            Joint::Line(j) => j.solve_velocity(bodies, settings),
            Joint::Weld(j) => j.solve_velocity(bodies, settings),
            Joint::Grab(j) => j.solve_velocity(bodies, settings),
            Joint::Prismatic(j) => j.solve_velocity(bodies, settings),
        }
    }

    /// The two bodies this joint connects; a `Grab` joint's "other side" is
    /// the same body repeated (it has no second body), which the island
    /// union-find treats as a no-op edge.
    pub fn bodies(&self) -> (Handle, Handle) {
        match self {
            Joint::Distance(j) => (j.body_a, j.body_b),
            Joint::Revolute(j) => (j.body_a, j.body_b),
            Joint::Line(j) => (j.body_a, j.body_b),
            Joint::Weld(j) => (j.revolute.body_a, j.revolute.body_b),
            Joint::Grab(j) => (j.body, j.body),
            Joint::Prismatic(j) => (j.line.body_a, j.line.body_b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyType;

    fn settings() -> WorldSettings {
        WorldSettings::default()
    }

    #[test]
    fn distance_joint_pulls_bodies_to_target_length() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let ha = bodies.insert(RigidBody::new(0, BodyType::Static, Vec2::ZERO, 0.0));
        let mut b = RigidBody::new(1, BodyType::Dynamic, Vec2::new(3.0, 0.0), 0.0);
        b.inv_mass = 1.0;
        b.inv_inertia = 1.0;
        let hb = bodies.insert(b);

        let mut joint = DistanceJoint::new(ha, hb, Vec2::ZERO, Vec2::ZERO, 2.0, SoftParams::rigid());
        let settings = settings();
        for _ in 0..60 {
            joint.prepare(&mut bodies, &settings);
            for _ in 0..8 {
                joint.solve_velocity(&mut bodies, &settings);
            }
            let b = bodies.get_mut(hb).unwrap();
            b.transform.position += b.linear_velocity * settings.dt;
        }

        let b = bodies.get(hb).unwrap();
        assert!((b.transform.position.length() - 2.0).abs() < 0.05);
    }

    #[test]
    fn revolute_joint_keeps_anchors_coincident() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let ha = bodies.insert(RigidBody::new(0, BodyType::Static, Vec2::ZERO, 0.0));
        let mut b = RigidBody::new(1, BodyType::Dynamic, Vec2::new(1.0, 0.0), 0.0);
        b.inv_mass = 1.0;
        b.inv_inertia = 1.0;
        b.linear_velocity = Vec2::new(0.0, 2.0);
        let hb = bodies.insert(b);

        let mut joint = RevoluteJoint::new(ha, hb, Vec2::ZERO, Vec2::new(-1.0, 0.0), SoftParams::rigid());
        let settings = settings();
        for _ in 0..30 {
            joint.prepare(&mut bodies, &settings);
            for _ in 0..8 {
                joint.solve_velocity(&mut bodies, &settings);
            }
            let b = bodies.get_mut(hb).unwrap();
            b.transform.position += b.linear_velocity * settings.dt;
            b.transform.rotation = crate::math::Rot::from_angle(b.transform.rotation.angle() + b.angular_velocity * settings.dt);
        }

        let b = bodies.get(hb).unwrap();
        let world_anchor = b.transform.apply(Vec2::new(-1.0, 0.0));
        assert!(world_anchor.length() < 0.1);
    }
}
