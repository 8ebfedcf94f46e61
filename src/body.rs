//! Rigid bodies and colliders. A body owns its colliders and, transitively,
//! their broad-phase proxies; `World` cascades destruction through both when
//! a body is removed (see `spec.md` §3 "A body owns its colliders").

use crate::arena::Handle;
use crate::math::{Transform, Vec2};
use crate::shape::{MassData, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Static,
    Kinematic,
    Dynamic,
}

/// Category/mask collision filter, with an optional override group: two
/// colliders in the same nonzero group always collide (positive) or never
/// collide (negative), bypassing the category/mask test entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub category_bits: u32,
    pub mask_bits: u32,
    pub group_index: i32,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index != 0 && self.group_index == other.group_index {
            return self.group_index > 0;
        }
        (self.category_bits & other.mask_bits) != 0 && (other.category_bits & self.mask_bits) != 0
    }
}

/// A rigid body: transform, velocity state, and the colliders attached to
/// it. `id` is assigned by the world at creation time, monotonically
/// increasing, and never reused — it is the tie-breaker the step loop uses
/// to keep contact/pair enumeration order deterministic independent of
/// arena slot recycling.
pub struct RigidBody {
    pub id: u64,
    pub body_type: BodyType,

    pub transform: Transform,
    /// Center of mass in body-local space (the centroid of the attached
    /// colliders, mass-weighted); `transform.position` is the body origin,
    /// which need not coincide with it.
    pub local_center: Vec2,

    pub linear_velocity: Vec2,
    pub angular_velocity: f32,

    pub force: Vec2,
    pub torque: f32,

    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: f32,
    pub inv_inertia: f32,

    pub linear_damping: f32,
    pub angular_damping: f32,

    pub friction: f32,
    pub restitution: f32,
    /// Tangential conveyor-belt speed added as an extra friction bias
    /// (`spec.md` §4.4 "surface speed, if non-zero").
    pub surface_speed: f32,

    pub filter: Filter,
    pub colliders: Vec<Handle>,

    pub awake: bool,
    pub allow_sleep: bool,
    pub sleep_time: f32,

    pub fixed_rotation: bool,
}

impl RigidBody {
    pub fn new(id: u64, body_type: BodyType, position: Vec2, angle: f32) -> RigidBody {
        let (mass, inv_mass, inertia, inv_inertia) = match body_type {
            BodyType::Static => (0.0, 0.0, 0.0, 0.0),
            BodyType::Kinematic => (0.0, 0.0, 0.0, 0.0),
            BodyType::Dynamic => (1.0, 1.0, 0.0, 0.0),
        };
        RigidBody {
            id,
            body_type,
            transform: Transform::new(position, angle),
            local_center: Vec2::ZERO,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia,
            inv_inertia,
            linear_damping: 0.0,
            angular_damping: 0.0,
            friction: 0.2,
            restitution: 0.0,
            surface_speed: 0.0,
            filter: Filter::default(),
            colliders: Vec::new(),
            awake: true,
            allow_sleep: true,
            sleep_time: 0.0,
            fixed_rotation: false,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn world_center(&self) -> Vec2 {
        self.transform.apply(self.local_center)
    }

    /// Velocity of the material point currently at world position `p`.
    pub fn velocity_at_point(&self, p: Vec2) -> Vec2 {
        let r = p - self.world_center();
        self.linear_velocity + crate::math::cross_sv(self.angular_velocity, r)
    }

    pub fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            self.sleep_time = 0.0;
            self.awake = true;
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn apply_force(&mut self, force: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_force_at_point(&mut self, force: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (point - self.world_center()).cross(force);
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    pub fn apply_linear_impulse(&mut self, impulse: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += impulse * self.inv_mass;
    }

    pub fn apply_linear_impulse_at_point(&mut self, impulse: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.world_center()).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    /// Recomputes `mass`, `inv_mass`, `local_center`, `inertia` and
    /// `inv_inertia` from the mass data of every attached collider (via the
    /// shape's density), parallel-axis-shifting each shape's inertia to the
    /// body's combined center of mass. Static and kinematic bodies keep zero
    /// mass/inertia regardless of attached shapes (`spec.md` §3 "static
    /// bodies have zero inverse mass and inverse inertia").
    pub fn reset_mass_data(&mut self, collider_mass_data: impl Iterator<Item = (Transform, MassData)>) {
        if self.body_type != BodyType::Dynamic {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
            self.local_center = Vec2::ZERO;
            return;
        }

        let mut mass = 0.0_f32;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0_f32;

        for (local_tf, md) in collider_mass_data {
            mass += md.mass;
            let world_center_contrib = local_tf.apply(md.center);
            center += world_center_contrib * md.mass;
            // Parallel axis theorem: shift from the collider's own centroid
            // to the body origin, accounting for the collider's local
            // transform offset.
            inertia += md.inertia + md.mass * world_center_contrib.length_sq();
        }

        if mass > 0.0 {
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            center = center / mass;
            // Shift inertia from the body origin to the combined center of mass.
            inertia -= mass * center.length_sq();
            self.local_center = center;
        } else {
            // A dynamic body with no shapes, or all-zero-density shapes,
            // still needs unit mass to integrate sensibly.
            self.mass = 1.0;
            self.inv_mass = 1.0;
            self.local_center = Vec2::ZERO;
        }

        if inertia > 0.0 && !self.fixed_rotation {
            self.inertia = inertia;
            self.inv_inertia = 1.0 / inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }
    }
}

/// A shape instance attached to a body, with its own local transform
/// (identity for the common case of a shape defined in body space), material
/// overrides, and a broad-phase proxy id. Exactly one proxy per collider
/// while it is registered (`spec.md` §3 invariant (a)).
pub struct Collider {
    pub body: Handle,
    pub shape: Shape,
    pub local_transform: Transform,
    pub density: f32,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
    pub filter: Filter,
    pub is_sensor: bool,
    pub proxy: u32,
}

impl Collider {
    pub fn new(body: Handle, shape: Shape) -> Collider {
        Collider {
            body,
            shape,
            local_transform: Transform::identity(),
            density: 1.0,
            friction: None,
            restitution: None,
            filter: Filter::default(),
            is_sensor: false,
            proxy: crate::tree::NULL_NODE,
        }
    }

    pub fn world_transform(&self, body_transform: Transform) -> Transform {
        Transform {
            position: body_transform.apply(self.local_transform.position),
            rotation: crate::math::Rot {
                cos: body_transform.rotation.cos * self.local_transform.rotation.cos
                    - body_transform.rotation.sin * self.local_transform.rotation.sin,
                sin: body_transform.rotation.sin * self.local_transform.rotation.cos
                    + body_transform.rotation.cos * self.local_transform.rotation.sin,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn static_body_has_zero_inverse_mass() {
        let b = RigidBody::new(0, BodyType::Static, Vec2::ZERO, 0.0);
        assert_eq!(b.inv_mass, 0.0);
        assert_eq!(b.inv_inertia, 0.0);
    }

    #[test]
    fn dynamic_body_accumulates_force_and_torque() {
        let mut b = RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0);
        b.inv_mass = 1.0;
        b.inv_inertia = 1.0;
        b.apply_force_at_point(Vec2::new(0.0, 10.0), Vec2::new(1.0, 0.0));
        assert_relative_eq!(b.force.y, 10.0, epsilon = 1e-6);
        assert!(b.torque.abs() > 0.0);
    }

    #[test]
    fn sleeping_body_has_zero_velocity() {
        let mut b = RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0);
        b.linear_velocity = Vec2::new(3.0, 4.0);
        b.angular_velocity = 1.0;
        b.set_awake(false);
        assert_eq!(b.linear_velocity, Vec2::ZERO);
        assert_eq!(b.angular_velocity, 0.0);
        assert!(!b.awake);
    }

    #[test]
    fn reset_mass_data_combines_colliders() {
        let mut b = RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0);
        let shape = Shape::new_box(1.0, 1.0);
        let md = shape.compute_mass(1.0);
        b.reset_mass_data([(Transform::identity(), md)].into_iter());
        assert_relative_eq!(b.mass, 4.0, epsilon = 1e-4);
        assert!(b.inertia > 0.0);
    }

    #[test]
    fn filter_group_overrides_mask() {
        let a = Filter {
            category_bits: 1,
            mask_bits: 0,
            group_index: 5,
        };
        let b = Filter {
            category_bits: 1,
            mask_bits: 0,
            group_index: 5,
        };
        assert!(a.should_collide(&b));
    }

    #[test]
    fn filter_negative_group_always_excludes() {
        let a = Filter {
            category_bits: 0xFFFF,
            mask_bits: 0xFFFF,
            group_index: -1,
        };
        let b = Filter {
            category_bits: 0xFFFF,
            mask_bits: 0xFFFF,
            group_index: -1,
        };
        assert!(!a.should_collide(&b));
    }
}
