//! The public `World`: owns every pool (bodies, colliders, joints, the
//! broad-phase tree, the contact manager) and drives the fixed-timestep step
//! pipeline. Generalizes the donor's `PhysicsWorld::step`/`sub_step`
//! accumulator loop (`core/src/physics/world.rs`) — the accumulator shape is
//! kept, the `sub_step` body is rewritten end to end against the tree,
//! manifold, solver, joint and island modules.

use std::collections::HashMap;

use crate::aabb::Aabb;
use crate::arena::{Arena, Handle};
use crate::body::{BodyType, Collider, RigidBody};
use crate::contact::{mix_friction, mix_restitution, Contact, ContactFilter, ContactManager};
use crate::distance::{self, Sweep, TOIState};
use crate::error::{Result, WorldError};
use crate::island::{self, Island};
use crate::joint::Joint;
use crate::manifold::NarrowPhaseSettings;
use crate::math::{Transform, Vec2};
use crate::settings::WorldSettings;
use crate::shape::Shape;
use crate::sleep;
use crate::solver::{self, ContactConstraint};
use crate::tree::{AabbTree, RayCastInput};

pub type BodyHandle = Handle;
pub type ColliderHandle = Handle;
pub type JointHandle = Handle;

/// Visits a ray-cast hit against a precise shape intersection rather than
/// just a broad-phase leaf; `world.rs`'s `ray_cast` narrows the tree's
/// leaf-level callback down to this before invoking the caller's callback.
pub struct RayCastHit {
    pub collider: ColliderHandle,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

/// A single `World::shape_cast` result: `shape` swept by `translation` from
/// `tf` first touches `collider` at translation fraction `t`, at world point
/// `point` with surface normal `normal` pointing from `collider` toward the
/// swept shape.
pub struct ShapeCastHit {
    pub collider: ColliderHandle,
    pub t: f32,
    pub point: Vec2,
    pub normal: Vec2,
}

fn ray_vs_circle(p1: Vec2, p2: Vec2, radius: f32) -> Option<(f32, Vec2)> {
    let d = p2 - p1;
    let a = d.length_sq();
    if a < crate::math::EPSILON {
        return None;
    }
    let b = 2.0 * p1.dot(d);
    let c = p1.length_sq() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t = (-b - sqrt_disc) / (2.0 * a);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let hit = p1 + d * t;
    Some((t, hit.normalized()))
}

/// Ray against a convex polygon inflated by `radius`, via the standard
/// slab-clip: intersect the ray's parameter range against every face's
/// half-plane, tracking the face that produced the tightest entering bound.
/// The `radius` inflation approximates rounded corners as straight offset
/// planes rather than true arcs — adequate for broad-phase-grade ray casts.
fn ray_vs_polygon(p1: Vec2, p2: Vec2, vertices: &[Vec2], normals: &[Vec2], radius: f32) -> Option<(f32, Vec2)> {
    let d = p2 - p1;
    let mut lower = 0.0_f32;
    let mut upper = 1.0_f32;
    let mut hit_normal = Vec2::ZERO;

    for i in 0..vertices.len() {
        let plane_point = vertices[i] + normals[i] * radius;
        let numerator = normals[i].dot(plane_point - p1);
        let denominator = normals[i].dot(d);

        if denominator.abs() < crate::math::EPSILON {
            if numerator < 0.0 {
                return None;
            }
        } else {
            let t = numerator / denominator;
            if denominator < 0.0 {
                if t > lower {
                    lower = t;
                    hit_normal = normals[i];
                }
            } else if t < upper {
                upper = t;
            }
        }
        if upper < lower {
            return None;
        }
    }

    if hit_normal == Vec2::ZERO {
        return None;
    }
    Some((lower, hit_normal))
}

fn ray_vs_capsule(p1: Vec2, p2: Vec2, a: Vec2, b: Vec2, radius: f32) -> Option<(f32, Vec2)> {
    let mut best: Option<(f32, Vec2)> = None;
    for center in [a, b] {
        if let Some((t, n)) = ray_vs_circle(p1 - center, p2 - center, radius) {
            if best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, n));
            }
        }
    }
    let axis = (b - a).normalized();
    if axis.length_sq() > crate::math::EPSILON {
        let side = axis.perp();
        let quad = [a + side * radius, b + side * radius, b - side * radius, a - side * radius];
        let normals = [side, axis, side * -1.0, axis * -1.0];
        if let Some((t, n)) = ray_vs_polygon(p1, p2, &quad, &normals, 0.0) {
            if best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, n));
            }
        }
    }
    best
}

fn ray_vs_shape(shape: &Shape, local_p1: Vec2, local_p2: Vec2) -> Option<(f32, Vec2)> {
    match shape {
        Shape::Circle { radius } => ray_vs_circle(local_p1, local_p2, *radius),
        Shape::Capsule { a, b, radius } => ray_vs_capsule(local_p1, local_p2, *a, *b, *radius),
        Shape::Polygon {
            vertices,
            normals,
            radius,
            ..
        } => ray_vs_polygon(local_p1, local_p2, vertices, normals, *radius),
    }
}

/// Adapts the collider pool's per-collider filters into the `ContactFilter`
/// the contact manager needs, applying invariant (d): contacts between two
/// static bodies are never created.
struct WorldContactFilter<'a> {
    colliders: &'a Arena<Collider>,
    bodies: &'a Arena<RigidBody>,
}

impl<'a> ContactFilter for WorldContactFilter<'a> {
    fn should_collide(&self, a: u32, b: u32) -> bool {
        let (Some(ca), Some(cb)) = (self.colliders.get_by_index(a), self.colliders.get_by_index(b)) else {
            return false;
        };
        if !ca.filter.should_collide(&cb.filter) {
            return false;
        }
        let (Some(ba), Some(bb)) = (self.bodies.get(ca.body), self.bodies.get(cb.body)) else {
            return false;
        };
        !(ba.body_type == BodyType::Static && bb.body_type == BodyType::Static)
    }
}

/// The physics world. Owns every pool; a `step` call runs the fixed-timestep
/// pipeline zero or more times to consume a variable frame `dt`.
pub struct World {
    bodies: Arena<RigidBody>,
    colliders: Arena<Collider>,
    joints: Arena<Joint>,
    tree: AabbTree,
    contacts: ContactManager,
    settings: WorldSettings,
    accumulator: f32,
    next_body_id: u64,
}

impl World {
    pub fn new(settings: WorldSettings) -> World {
        World {
            bodies: Arena::new(),
            colliders: Arena::new(),
            joints: Arena::new(),
            tree: AabbTree::new(settings.aabb_margin, settings.aabb_multiplier, settings.sah_heuristic),
            contacts: ContactManager::new(),
            settings,
            accumulator: 0.0,
            next_body_id: 0,
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut WorldSettings {
        &mut self.settings
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter()
    }

    pub fn create_body(&mut self, body_type: BodyType, position: Vec2, angle: f32) -> BodyHandle {
        let id = self.next_body_id;
        self.next_body_id += 1;
        self.bodies.insert(RigidBody::new(id, body_type, position, angle))
    }

    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let colliders = self
            .bodies
            .get(handle)
            .ok_or(WorldError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })?
            .colliders
            .clone();
        for collider in colliders {
            let _ = self.destroy_collider(collider);
        }
        self.bodies.remove(handle).map(|_| ())
    }

    /// Attaches `shape` to `body`, registers its broad-phase proxy, and
    /// recomputes the body's mass data from its full collider set. Rejected
    /// before any state is committed if `body` is dynamic and the resulting
    /// collider set would sum to non-positive mass (`spec.md` §3: "Dynamic
    /// bodies require positive mass").
    pub fn create_collider(&mut self, body: BodyHandle, shape: Shape, density: f32) -> Result<ColliderHandle> {
        if density < 0.0 {
            return Err(WorldError::DegenerateShape);
        }
        let Some(body_ref) = self.bodies.get(body) else {
            return Err(WorldError::StaleHandle {
                index: body.index,
                generation: body.generation,
            });
        };

        if body_ref.body_type == BodyType::Dynamic {
            let mut total_mass = shape.compute_mass(density).mass;
            for &existing in &body_ref.colliders {
                if let Some(c) = self.colliders.get(existing) {
                    total_mass += c.shape.compute_mass(c.density).mass;
                }
            }
            if total_mass <= 0.0 {
                return Err(WorldError::NonPositiveMass);
            }
        }

        let mut collider = Collider::new(body, shape);
        collider.density = density;
        let handle = self.colliders.insert(collider);

        let body_tf = self.bodies.get(body).unwrap().transform;
        let world_tf = self.colliders.get(handle).unwrap().world_transform(body_tf);
        let (min, max) = crate::shape::world_aabb(&self.colliders.get(handle).unwrap().shape, world_tf);
        let proxy = self.tree.create(handle.index, Aabb::new(min, max));
        self.colliders.get_mut(handle).unwrap().proxy = proxy;

        let body_mut = self.bodies.get_mut(body).unwrap();
        body_mut.colliders.push(handle);

        self.reset_body_mass(body);
        Ok(handle)
    }

    pub fn destroy_collider(&mut self, handle: ColliderHandle) -> Result<()> {
        let collider = self.colliders.get(handle).ok_or(WorldError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        })?;
        let body = collider.body;
        let proxy = collider.proxy;
        self.tree.remove(proxy);
        self.colliders.remove(handle).ok();

        if let Some(b) = self.bodies.get_mut(body) {
            b.colliders.retain(|&c| c != handle);
        }
        self.reset_body_mass(body);
        Ok(())
    }

    fn reset_body_mass(&mut self, body: BodyHandle) {
        let collider_handles = match self.bodies.get(body) {
            Some(b) => b.colliders.clone(),
            None => return,
        };
        let mass_data: Vec<(Transform, crate::shape::MassData)> = collider_handles
            .iter()
            .filter_map(|&h| self.colliders.get(h))
            .map(|c| (c.local_transform, c.shape.compute_mass(c.density)))
            .collect();
        if let Some(b) = self.bodies.get_mut(body) {
            b.reset_mass_data(mass_data.into_iter());
        }
    }

    pub fn create_joint(&mut self, joint: Joint) -> Result<JointHandle> {
        let (a, b) = joint.bodies();
        if !self.bodies.contains(a) || !self.bodies.contains(b) {
            return Err(WorldError::UnknownJointBody);
        }
        Ok(self.joints.insert(joint))
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        self.joints.remove(handle).map(|_| ())
    }

    fn body_of_collider(&self, collider_id: u32) -> Option<Handle> {
        self.colliders.get_by_index(collider_id).map(|c| c.body)
    }

    /// Runs zero or more fixed-`dt` sub-steps to consume `frame_dt`, the
    /// donor's own accumulator loop generalized to the full pipeline.
    pub fn step(&mut self, frame_dt: f32) {
        self.accumulator += frame_dt;
        let fixed_dt = self.settings.dt;
        while self.accumulator >= fixed_dt {
            self.sub_step();
            self.accumulator -= fixed_dt;
        }
    }

    fn sub_step(&mut self) {
        self.integrate_velocities();
        self.refresh_broadphase();
        let islands = self.update_contacts_and_islands();
        self.prepare_and_solve(&islands);
        let pre_positions: HashMap<Handle, Transform> = self
            .bodies
            .iter()
            .filter(|(_, b)| b.is_dynamic() && b.awake)
            .map(|(h, b)| (h, b.transform))
            .collect();
        self.integrate_positions();
        self.continuous_collision(&pre_positions);
        self.solve_positions(&islands);
        sleep::update_sleep(&mut self.bodies, &islands, &self.settings);
        self.tree.clear_all_moved();
    }

    /// Clamps fast-moving dynamic bodies back along their swept path to the
    /// first time of impact against any non-dynamic collider they would
    /// otherwise have tunneled through this sub-step. Only dynamic-vs-static
    /// and dynamic-vs-kinematic pairs are swept; dynamic-vs-dynamic tunneling
    /// is not addressed by this pass.
    fn continuous_collision(&mut self, pre_positions: &HashMap<Handle, Transform>) {
        let mut dynamic_handles: Vec<Handle> = pre_positions.keys().copied().collect();
        dynamic_handles.sort_by_key(|h| self.bodies.get(*h).map(|b| b.id).unwrap_or(u64::MAX));

        for handle in dynamic_handles {
            let old_tf = pre_positions[&handle];
            let (new_tf, local_center, collider_handles) = match self.bodies.get(handle) {
                Some(b) => (b.transform, b.local_center, b.colliders.clone()),
                None => continue,
            };
            if old_tf.position == new_tf.position && old_tf.rotation.angle() == new_tf.rotation.angle() {
                continue;
            }

            let sweep_a = Sweep {
                c0: old_tf.apply(local_center),
                a0: old_tf.rotation.angle(),
                c: new_tf.apply(local_center),
                a: new_tf.rotation.angle(),
                local_center,
            };

            let mut best_t = 1.0_f32;
            for &collider_handle in &collider_handles {
                let collider = match self.colliders.get(collider_handle) {
                    Some(c) => c,
                    None => continue,
                };
                if collider.is_sensor {
                    continue;
                }
                let (old_min, old_max) = crate::shape::world_aabb(&collider.shape, collider.world_transform(old_tf));
                let (new_min, new_max) = crate::shape::world_aabb(&collider.shape, collider.world_transform(new_tf));
                let swept = Aabb::new(Vec2::new(old_min.x.min(new_min.x), old_min.y.min(new_min.y)), Vec2::new(old_max.x.max(new_max.x), old_max.y.max(new_max.y)));

                let mut candidates: Vec<u32> = Vec::new();
                self.tree.query(swept, &mut |proxy: u32| {
                    candidates.push(proxy);
                    true
                });

                for proxy in candidates {
                    let payload = self.tree.payload(proxy);
                    let other_collider = match self.colliders.get_by_index(payload) {
                        Some(c) => c,
                        None => continue,
                    };
                    if other_collider.is_sensor {
                        continue;
                    }
                    let other_body = match self.bodies.get(other_collider.body) {
                        Some(b) => b,
                        None => continue,
                    };
                    if other_body.body_type == BodyType::Dynamic {
                        continue;
                    }
                    if other_collider.body == handle {
                        continue;
                    }

                    let other_tf = other_collider.world_transform(other_body.transform);
                    let sweep_b = Sweep {
                        c0: other_tf.position,
                        a0: other_tf.rotation.angle(),
                        c: other_tf.position,
                        a: other_tf.rotation.angle(),
                        local_center: Vec2::ZERO,
                    };

                    let output = distance::time_of_impact(
                        &collider.shape,
                        sweep_a,
                        &other_collider.shape,
                        sweep_b,
                        best_t,
                        self.settings.linear_slop,
                        self.settings.toi_max_iterations,
                        self.settings.toi_root_iterations,
                    );
                    if matches!(output.state, TOIState::Touching) && output.t < best_t {
                        best_t = output.t;
                    }
                }
            }

            if best_t < 1.0 {
                let clamped = sweep_a.get_transform(best_t);
                if let Some(body) = self.bodies.get_mut(handle) {
                    body.transform = clamped;
                }
            }
        }
    }

    /// Rebuilds the broad-phase tree from scratch (full SAH re-insertion of
    /// every live proxy), trading a one-off cost for restoring tight node
    /// bounds after prolonged incremental churn.
    pub fn rebuild_broadphase(&mut self) {
        log::info!("rebuilding broad-phase tree ({} nodes)", self.tree.node_count());
        self.tree.rebuild();
    }

    fn integrate_velocities(&mut self) {
        let dt = self.settings.dt;
        for (_, body) in self.bodies.iter_mut() {
            if body.body_type != BodyType::Dynamic || !body.awake {
                continue;
            }
            if self.settings.apply_gravity {
                body.linear_velocity += self.settings.gravity * dt;
            }
            body.linear_velocity += body.force * (body.inv_mass * dt);
            body.angular_velocity += body.torque * (body.inv_inertia * dt);
            body.linear_velocity = body.linear_velocity * (1.0 / (1.0 + dt * body.linear_damping));
            body.angular_velocity *= 1.0 / (1.0 + dt * body.angular_damping);
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    fn refresh_broadphase(&mut self) {
        for (_, collider) in self.colliders.iter() {
            let body = match self.bodies.get(collider.body) {
                Some(b) => b,
                None => continue,
            };
            let world_tf = collider.world_transform(body.transform);
            let (min, max) = crate::shape::world_aabb(&collider.shape, world_tf);
            let displacement = body.linear_velocity * self.settings.dt;
            self.tree.move_proxy(collider.proxy, Aabb::new(min, max), displacement, false);
        }
    }

    fn update_contacts_and_islands(&mut self) -> Vec<Island> {
        let moved: Vec<u32> = self
            .colliders
            .iter()
            .filter_map(|(_, c)| self.tree.is_moved(c.proxy).then_some(c.proxy))
            .collect();

        let mut pairs: std::collections::HashSet<(u32, u32)> = std::collections::HashSet::new();
        for &proxy in &moved {
            let fat = self.tree.aabb(proxy);
            let payload = self.tree.payload(proxy);
            let mut found = Vec::new();
            self.tree.query(fat, &mut |hit: u32| {
                if hit != proxy {
                    found.push(self.tree.payload(hit));
                }
                true
            });
            for other in found {
                let key = if payload < other { (payload, other) } else { (other, payload) };
                pairs.insert(key);
            }
        }

        let filter = WorldContactFilter {
            colliders: &self.colliders,
            bodies: &self.bodies,
        };
        // friction/restitution passed here are per-synchronize defaults used
        // only at contact-creation time; `Contact::update` re-mixes per-pair
        // materials from the collider overrides below before the solve.
        self.contacts.synchronize(pairs.into_iter(), &filter, 0.2, 0.0);

        let np_settings = NarrowPhaseSettings {
            gjk_max_iterations: self.settings.gjk_max_iterations,
            epa_max_iterations: self.settings.epa_max_iterations,
            epa_tolerance: self.settings.epa_tolerance,
            contact_merge_threshold: self.settings.contact_merge_threshold,
        };

        for contact in self.contacts.iter_mut() {
            let (Some(ca), Some(cb)) = (
                self.colliders.get_by_index(contact.collider_a),
                self.colliders.get_by_index(contact.collider_b),
            ) else {
                continue;
            };
            let (Some(ba), Some(bb)) = (self.bodies.get(ca.body), self.bodies.get(cb.body)) else {
                continue;
            };
            if !ba.awake && !bb.awake {
                continue;
            }
            let tf_a = ca.world_transform(ba.transform);
            let tf_b = cb.world_transform(bb.transform);
            contact.friction = mix_friction(ca.friction.unwrap_or(ba.friction), cb.friction.unwrap_or(bb.friction));
            contact.restitution = mix_restitution(ca.restitution.unwrap_or(ba.restitution), cb.restitution.unwrap_or(bb.restitution));
            contact.enabled = !ca.is_sensor && !cb.is_sensor;
            contact.update(
                &ca.shape,
                tf_a,
                &cb.shape,
                tf_b,
                &np_settings,
                self.settings.warm_starting,
                self.settings.apply_warm_starting_threshold,
                self.settings.warm_starting_threshold,
            );
        }

        island::build_islands(&self.bodies, self.contacts_vec().as_slice(), self.joints_vec().as_slice(), |id| {
            self.body_of_collider(id)
        })
    }

    fn contacts_vec(&self) -> Vec<Contact> {
        self.contacts.iter().cloned().collect()
    }

    fn joints_vec(&self) -> Vec<Joint> {
        self.joints.iter().map(|(_, j)| j.clone()).collect()
    }

    fn prepare_and_solve(&mut self, islands: &[Island]) {
        let _ = islands;
        let mut constraints: HashMap<(u32, u32), ContactConstraint> = HashMap::new();
        let contact_keys: Vec<(u32, u32, Handle, Handle)> = self
            .contacts
            .iter()
            .filter(|c| c.enabled && c.touching)
            .filter_map(|c| {
                let ca = self.colliders.get_by_index(c.collider_a)?;
                let cb = self.colliders.get_by_index(c.collider_b)?;
                Some((c.collider_a, c.collider_b, ca.body, cb.body))
            })
            .collect();

        for (ca_id, cb_id, ba, bb) in &contact_keys {
            let contact = match self.contacts.get(*ca_id, *cb_id) {
                Some(c) => c,
                None => continue,
            };
            if let Some(constraint) = solver::prepare_contact(&self.bodies, contact, *ba, *bb, &self.settings) {
                if self.settings.warm_starting {
                    if let Some((a, b)) = self.bodies.get_pair_mut(*ba, *bb) {
                        solver::warm_start(&constraint, a, b);
                    }
                }
                constraints.insert((*ca_id, *cb_id), constraint);
            }
        }

        let mut joint_handles: Vec<Handle> = Vec::new();
        for (h, _) in self.joints.iter() {
            joint_handles.push(h);
        }
        for &h in &joint_handles {
            if let Some(joint) = self.joints.get_mut(h) {
                joint.prepare(&mut self.bodies, &self.settings);
            }
        }

        for _ in 0..self.settings.velocity_iterations {
            for &h in &joint_handles {
                if let Some(joint) = self.joints.get_mut(h) {
                    joint.solve_velocity(&mut self.bodies, &self.settings);
                }
            }
            for (ca_id, cb_id, ba, bb) in &contact_keys {
                if let Some(constraint) = constraints.get_mut(&(*ca_id, *cb_id)) {
                    if let Some((a, b)) = self.bodies.get_pair_mut(*ba, *bb) {
                        solver::solve_velocity(constraint, a, b);
                    }
                }
            }
        }

        for (ca_id, cb_id, _, _) in &contact_keys {
            if let Some(constraint) = constraints.get(&(*ca_id, *cb_id)) {
                let impulses = solver::store_impulses(constraint);
                if let Some(c) = self.contacts.get_mut_pair(*ca_id, *cb_id) {
                    c.impulses = impulses;
                }
            }
        }
    }

    fn integrate_positions(&mut self) {
        let dt = self.settings.dt;
        for (_, body) in self.bodies.iter_mut() {
            if body.body_type == BodyType::Static || !body.awake {
                continue;
            }
            body.transform.position += body.linear_velocity * dt;
            let angle = body.transform.rotation.angle() + body.angular_velocity * dt;
            body.transform.rotation = crate::math::Rot::from_angle(angle);
        }
    }

    fn solve_positions(&mut self, islands: &[Island]) {
        if !self.settings.position_correction {
            return;
        }
        let _ = islands;
        let contact_keys: Vec<(u32, u32, Handle, Handle)> = self
            .contacts
            .iter()
            .filter(|c| c.enabled && c.touching)
            .filter_map(|c| {
                let ca = self.colliders.get_by_index(c.collider_a)?;
                let cb = self.colliders.get_by_index(c.collider_b)?;
                Some((c.collider_a, c.collider_b, ca.body, cb.body))
            })
            .collect();

        for _ in 0..self.settings.position_iterations {
            for (ca_id, cb_id, ba, bb) in &contact_keys {
                let (Some(ca), Some(cb)) = (self.colliders.get_by_index(*ca_id), self.colliders.get_by_index(*cb_id)) else {
                    continue;
                };
                let shape_a = ca.shape.clone();
                let local_a = ca.local_transform;
                let shape_b = cb.shape.clone();
                let local_b = cb.local_transform;
                solver::solve_position(&mut self.bodies, &shape_a, local_a, &shape_b, local_b, *ba, *bb, &self.settings);
            }
        }
    }

    /// Queries the broad-phase tree for colliders whose fat AABB overlaps
    /// `aabb`, reporting each as a live `ColliderHandle` per `spec.md` §6's
    /// `queryCallback(collider) -> bool` contract.
    pub fn query_aabb(&self, aabb: Aabb, callback: &mut impl FnMut(ColliderHandle) -> bool) {
        self.tree.query(aabb, &mut |proxy: u32| {
            let payload = self.tree.payload(proxy);
            let Some(live_handle) = self.colliders.iter().find(|(h, _)| h.index == payload).map(|(h, _)| h) else {
                return true;
            };
            callback(live_handle)
        });
    }

    pub fn query_point(&self, point: Vec2, callback: &mut impl FnMut(ColliderHandle) -> bool) {
        let tiny = Aabb::new(point, point);
        let mut hit = false;
        self.tree.query(tiny, &mut |proxy: u32| {
            let payload = self.tree.payload(proxy);
            if let Some(collider) = self.colliders.get_by_index(payload) {
                if let Some(body) = self.bodies.get(collider.body) {
                    let world_tf = collider.world_transform(body.transform);
                    let local = world_tf.apply_inv(point);
                    let inside = match &collider.shape {
                        Shape::Circle { radius } => local.length_sq() <= radius * radius,
                        Shape::Capsule { a, b, radius } => {
                            let seg = *b - *a;
                            let t = ((local - *a).dot(seg) / seg.length_sq().max(1e-12)).clamp(0.0, 1.0);
                            (local - (*a + seg * t)).length_sq() <= radius * radius
                        }
                        Shape::Polygon { vertices, normals, .. } => {
                            vertices.iter().zip(normals.iter()).all(|(v, n)| n.dot(local - *v) <= 0.0)
                        }
                    };
                    if inside {
                        hit = true;
                        let h = Handle {
                            index: payload,
                            generation: 0,
                        };
                        // Re-derive the live handle's generation from the arena
                        // rather than assuming 0, since query only has the bare
                        // payload index.
                        let live = self
                            .colliders
                            .iter()
                            .find(|(handle, _)| handle.index == h.index)
                            .map(|(handle, _)| handle);
                        if let Some(live_handle) = live {
                            if !callback(live_handle) {
                                return false;
                            }
                        }
                    }
                }
            }
            true
        });
    }

    /// Ray cast from `p1` to `p2`, narrowing every broad-phase leaf hit down
    /// to a precise shape intersection and reporting hits via `callback`
    /// with the same `0`/`<0`/`>0` fraction-control semantics as the tree's
    /// own `RayCastCallback`.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2, callback: &mut impl FnMut(RayCastHit) -> f32) {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        self.tree.ray_cast(input, &mut |inp: &RayCastInput, proxy: u32| -> f32 {
            let payload = self.tree.payload(proxy);
            let collider = match self.colliders.get_by_index(payload) {
                Some(c) => c,
                None => return -1.0,
            };
            let body = match self.bodies.get(collider.body) {
                Some(b) => b,
                None => return -1.0,
            };
            let world_tf = collider.world_transform(body.transform);
            let local_p1 = world_tf.apply_inv(inp.p1);
            let local_p2 = world_tf.apply_inv(inp.p1 + (inp.p2 - inp.p1) * inp.max_fraction);
            match ray_vs_shape(&collider.shape, local_p1, local_p2) {
                Some((t, local_normal)) => {
                    let fraction = inp.max_fraction * t;
                    let world_point = inp.p1 + (inp.p2 - inp.p1) * fraction;
                    let world_normal = world_tf.rotation.mul_vec(local_normal);
                    let live_handle = self
                        .colliders
                        .iter()
                        .find(|(h, _)| h.index == payload)
                        .map(|(h, _)| h)
                        .unwrap_or(Handle { index: payload, generation: 0 });
                    callback(RayCastHit {
                        collider: live_handle,
                        point: world_point,
                        normal: world_normal,
                        fraction,
                    })
                }
                None => -1.0,
            }
        });
    }

    /// Casts `shape` (posed at `tf`) along a pure translation against every
    /// collider in the world, using conservative advancement per broad-phase
    /// candidate. `callback` controls the remaining search with the same
    /// convention as `ray_cast`: `0.0` stops the cast, a negative value
    /// discards this hit and keeps going, a positive value tightens the
    /// search to translation fractions no later than that value.
    pub fn shape_cast(&self, shape: &Shape, tf: Transform, translation: Vec2, callback: &mut impl FnMut(ShapeCastHit) -> f32) {
        let (min0, max0) = crate::shape::world_aabb(shape, tf);
        let end_tf = Transform {
            position: tf.position + translation,
            rotation: tf.rotation,
        };
        let (min1, max1) = crate::shape::world_aabb(shape, end_tf);
        let swept = Aabb::new(
            Vec2::new(min0.x.min(min1.x), min0.y.min(min1.y)),
            Vec2::new(max0.x.max(max1.x), max0.y.max(max1.y)),
        );

        let mut candidates: Vec<u32> = Vec::new();
        self.tree.query(swept, &mut |proxy: u32| {
            candidates.push(proxy);
            true
        });

        let mut max_fraction = 1.0_f32;
        for proxy in candidates {
            let payload = self.tree.payload(proxy);
            let Some(collider) = self.colliders.get_by_index(payload) else {
                continue;
            };
            let Some(body) = self.bodies.get(collider.body) else {
                continue;
            };
            let other_tf = collider.world_transform(body.transform);
            let output = distance::shape_cast(&collider.shape, other_tf, shape, tf, translation, self.settings.linear_slop);
            if !output.hit || output.t > max_fraction {
                continue;
            }
            let live_handle = self
                .colliders
                .iter()
                .find(|(h, _)| h.index == payload)
                .map(|(h, _)| h)
                .unwrap_or(Handle { index: payload, generation: 0 });
            let result = callback(ShapeCastHit {
                collider: live_handle,
                t: output.t,
                point: output.point,
                normal: output.normal,
            });
            if result == 0.0 {
                return;
            } else if result > 0.0 {
                max_fraction = result;
            }
        }
    }
}

trait ContactManagerExt {
    fn get_mut_pair(&mut self, a: u32, b: u32) -> Option<&mut Contact>;
}

impl ContactManagerExt for ContactManager {
    fn get_mut_pair(&mut self, a: u32, b: u32) -> Option<&mut Contact> {
        self.iter_mut().find(|c| (c.collider_a, c.collider_b) == (a.min(b), a.max(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    fn ground_and_circle(world: &mut World) -> (BodyHandle, BodyHandle) {
        let ground = world.create_body(BodyType::Static, Vec2::new(0.0, 0.0), 0.0);
        world.create_collider(ground, Shape::new_box(50.0, 0.2), 1.0).unwrap();

        let ball = world.create_body(BodyType::Dynamic, Vec2::new(0.0, 5.0), 0.0);
        world.create_collider(ball, Shape::Circle { radius: 0.5 }, 1.0).unwrap();
        (ground, ball)
    }

    #[test]
    fn circle_settles_on_ground() {
        let mut settings = WorldSettings::default();
        settings.restitution_slop = 100.0;
        let mut world = World::new(settings);
        let (_, ball) = ground_and_circle(&mut world);

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }

        let body = world.body(ball).unwrap();
        assert!((body.transform.position.y - 0.7).abs() < 0.05, "y = {}", body.transform.position.y);
        assert!(body.linear_velocity.y.abs() < 0.5);
    }

    #[test]
    fn destroyed_body_cascades_to_colliders_and_proxies() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Dynamic, Vec2::ZERO, 0.0);
        let collider = world.create_collider(body, Shape::Circle { radius: 1.0 }, 1.0).unwrap();
        world.destroy_body(body).unwrap();
        assert!(world.collider(collider).is_none());
        assert!(world.body(body).is_none());
    }

    #[test]
    fn ray_cast_hits_circle_at_expected_fraction() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
        world.create_collider(body, Shape::Circle { radius: 1.0 }, 1.0).unwrap();

        let mut fraction = None;
        world.ray_cast(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), &mut |hit: RayCastHit| -> f32 {
            fraction = Some(hit.fraction);
            0.0
        });
        assert!((fraction.unwrap() - 0.4).abs() < 1e-3);
    }

    #[test]
    fn shape_cast_finds_static_box_along_translation() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Static, Vec2::new(3.0, 0.0), 0.0);
        world.create_collider(body, Shape::new_box(0.5, 0.5), 1.0).unwrap();

        let moving = Shape::Circle { radius: 0.5 };
        let mut hit_t = None;
        world.shape_cast(
            &moving,
            Transform::new(Vec2::new(0.0, 0.0), 0.0),
            Vec2::new(4.0, 0.0),
            &mut |hit: ShapeCastHit| -> f32 {
                hit_t = Some(hit.t);
                0.0
            },
        );
        let t = hit_t.expect("expected a shape-cast hit against the static box");
        assert!((0.4..0.6).contains(&t), "t = {t}");
    }

    #[test]
    fn stale_body_handle_rejected_by_create_collider() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Dynamic, Vec2::ZERO, 0.0);
        world.destroy_body(body).unwrap();
        let result = world.create_collider(body, Shape::Circle { radius: 1.0 }, 1.0);
        assert!(result.is_err());
    }

    #[test]
    fn zero_density_collider_rejected_on_dynamic_body() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Dynamic, Vec2::ZERO, 0.0);
        let result = world.create_collider(body, Shape::Circle { radius: 1.0 }, 0.0);
        assert_eq!(result, Err(WorldError::NonPositiveMass));
        // Rejected before any state is committed: no collider attached.
        assert!(world.bodies().next().unwrap().1.colliders.is_empty());
    }

    #[test]
    fn zero_density_collider_allowed_on_static_body() {
        let mut world = World::new(WorldSettings::default());
        let body = world.create_body(BodyType::Static, Vec2::ZERO, 0.0);
        assert!(world.create_collider(body, Shape::Circle { radius: 1.0 }, 0.0).is_ok());
    }
}
