//! Persistent per-pair contact state. A `Contact` survives across steps so
//! the solver can warm-start from the previous step's accumulated impulses;
//! `ContactManager` owns the pair lifecycle (create on broad-phase overlap,
//! destroy once the pair stops overlapping), driven by whatever broad-phase
//! pair source the caller supplies.

use std::collections::{HashMap, HashSet};

use crate::manifold::{detect_collision, Manifold, NarrowPhaseSettings};
use crate::math::{Transform, Vec2};
use crate::shape::Shape;

/// Warm-start data for one manifold point, keyed by its feature id so it
/// survives manifold point reordering/collapsing across steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointImpulse {
    pub id: u32,
    pub point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
}

/// A persistent contact between two colliders, identified by the
/// broad-phase's collider ids (not body handles — a contact doesn't need to
/// know which body owns which collider; the caller threads that through
/// when it asks for shapes/transforms to `update` with).
#[derive(Debug, Clone)]
pub struct Contact {
    pub collider_a: u32,
    pub collider_b: u32,
    pub manifold: Option<Manifold>,
    pub impulses: Vec<PointImpulse>,
    pub touching: bool,
    pub was_touching: bool,
    pub enabled: bool,
    pub friction: f32,
    pub restitution: f32,
}

impl Contact {
    pub fn new(collider_a: u32, collider_b: u32, friction: f32, restitution: f32) -> Contact {
        Contact {
            collider_a,
            collider_b,
            manifold: None,
            impulses: Vec::new(),
            touching: false,
            was_touching: false,
            enabled: true,
            friction,
            restitution,
        }
    }

    /// Re-runs narrow phase and carries forward the accumulated impulse for
    /// every manifold point whose feature id matches one from the previous
    /// step. Points with no match (a newly appearing contact point) start
    /// from zero impulse. `warm_starting = false` always starts from zero,
    /// matching a from-scratch solve. When `apply_warm_starting_threshold`
    /// is set, a matching point only carries its impulse forward if it
    /// hasn't moved more than `warm_starting_threshold` (squared distance)
    /// from where the previous step left it — a large jump means the old
    /// impulse no longer describes the same contact and re-applying it
    /// would overshoot.
    pub fn update(
        &mut self,
        shape_a: &Shape,
        tf_a: Transform,
        shape_b: &Shape,
        tf_b: Transform,
        settings: &NarrowPhaseSettings,
        warm_starting: bool,
        apply_warm_starting_threshold: bool,
        warm_starting_threshold: f32,
    ) {
        let new_manifold = detect_collision(shape_a, tf_a, shape_b, tf_b, settings);
        self.was_touching = self.touching;
        self.touching = new_manifold.is_some();

        let mut impulses = Vec::new();
        if let Some(manifold) = &new_manifold {
            for point in &manifold.points {
                let carried = warm_starting
                    .then(|| self.impulses.iter().find(|p| p.id == point.id))
                    .flatten()
                    .filter(|old| {
                        !apply_warm_starting_threshold || (point.point - old.point).length_sq() <= warm_starting_threshold
                    });
                impulses.push(PointImpulse {
                    id: point.id,
                    point: point.point,
                    normal_impulse: carried.map_or(0.0, |p| p.normal_impulse),
                    tangent_impulse: carried.map_or(0.0, |p| p.tangent_impulse),
                });
            }
        }

        self.manifold = new_manifold;
        self.impulses = impulses;
    }

    /// True the step a contact starts touching (for `begin_contact`-style
    /// notification hooks the caller may want to layer on top).
    pub fn began_touching(&self) -> bool {
        self.touching && !self.was_touching
    }

    /// True the step a contact stops touching.
    pub fn ended_touching(&self) -> bool {
        self.was_touching && !self.touching
    }
}

/// Combines two materials' friction coefficients. Geometric mean: two
/// low-friction surfaces never average up to something grippier than either.
pub fn mix_friction(a: f32, b: f32) -> f32 {
    (a * b).max(0.0).sqrt()
}

/// Combines two materials' restitution. Max: a bouncy ball stays bouncy
/// regardless of what it lands on.
pub fn mix_restitution(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Decides whether a broad-phase-overlapping collider pair should ever get a
/// contact — the layer collision filters live here, independent of the
/// manifold-level enable flag which individual gameplay code can also toggle
/// per contact.
pub trait ContactFilter {
    fn should_collide(&self, collider_a: u32, collider_b: u32) -> bool;
}

impl<F: Fn(u32, u32) -> bool> ContactFilter for F {
    fn should_collide(&self, collider_a: u32, collider_b: u32) -> bool {
        self(collider_a, collider_b)
    }
}

fn pair_key(a: u32, b: u32) -> (u32, u32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Owns every live contact, keyed by the canonicalized collider id pair.
/// `synchronize` is called once per step with the broad-phase's current
/// overlapping-pair set: new pairs that pass the filter get a fresh
/// `Contact`, pairs no longer reported are dropped (their warm-start state
/// along with them).
#[derive(Default)]
pub struct ContactManager {
    contacts: HashMap<(u32, u32), Contact>,
}

impl ContactManager {
    pub fn new() -> ContactManager {
        ContactManager::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, a: u32, b: u32) -> Option<&Contact> {
        self.contacts.get(&pair_key(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Contact> {
        self.contacts.values_mut()
    }

    /// Reconciles the contact set against `pairs`. Self-pairs are ignored
    /// (a collider never contacts itself); static-static pairs are expected
    /// to already be excluded by the caller's broad-phase pair query, since
    /// that exclusion only the caller (which knows body types) can make.
    pub fn synchronize<F: ContactFilter>(
        &mut self,
        pairs: impl Iterator<Item = (u32, u32)>,
        filter: &F,
        friction: f32,
        restitution: f32,
    ) {
        let mut live = HashSet::new();
        for (a, b) in pairs {
            if a == b {
                continue;
            }
            let key = pair_key(a, b);
            live.insert(key);
            if !self.contacts.contains_key(&key) && filter.should_collide(key.0, key.1) {
                self.contacts
                    .insert(key, Contact::new(key.0, key.1, friction, restitution));
            }
        }
        self.contacts.retain(|key, _| live.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use approx::assert_relative_eq;

    fn settings() -> NarrowPhaseSettings {
        NarrowPhaseSettings {
            gjk_max_iterations: 20,
            epa_max_iterations: 20,
            epa_tolerance: 1e-4,
            contact_merge_threshold: 1e-4,
        }
    }

    #[test]
    fn update_detects_touching_and_warm_starts_matching_ids() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);

        let mut contact = Contact::new(0, 1, 0.3, 0.0);
        contact.update(&a, tf_a, &b, tf_b, &settings(), true, false, 0.0);
        assert!(contact.touching);
        assert!(contact.began_touching());

        for p in contact.impulses.iter_mut() {
            p.normal_impulse = 5.0;
            p.tangent_impulse = 1.0;
        }
        let ids: Vec<u32> = contact.impulses.iter().map(|p| p.id).collect();

        // Re-run at the same pose; every point's id should survive and the
        // impulses from the last solve should carry over unchanged.
        contact.update(&a, tf_a, &b, tf_b, &settings(), true, false, 0.0);
        assert_eq!(contact.impulses.len(), ids.len());
        for p in &contact.impulses {
            assert_relative_eq!(p.normal_impulse, 5.0, epsilon = 1e-6);
            assert_relative_eq!(p.tangent_impulse, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn update_without_warm_starting_resets_impulses() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);

        let mut contact = Contact::new(0, 1, 0.3, 0.0);
        contact.update(&a, tf_a, &b, tf_b, &settings(), true, false, 0.0);
        for p in contact.impulses.iter_mut() {
            p.normal_impulse = 5.0;
        }
        contact.update(&a, tf_a, &b, tf_b, &settings(), false, false, 0.0);
        for p in &contact.impulses {
            assert_relative_eq!(p.normal_impulse, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn update_gates_warm_start_on_distance_threshold() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);

        let mut contact = Contact::new(0, 1, 0.3, 0.0);
        contact.update(&a, tf_a, &b, tf_b, &settings(), true, false, 0.0);
        for p in contact.impulses.iter_mut() {
            p.normal_impulse = 5.0;
        }

        // Same feature ids, point barely moved: a tight threshold still lets
        // the impulse carry over.
        let tf_b_nudged = Transform::new(Vec2::new(1.51, 0.0), 0.0);
        contact.update(&a, tf_a, &b, tf_b_nudged, &settings(), true, true, 1.0);
        assert!(contact.impulses.iter().any(|p| p.normal_impulse > 0.0));

        for p in contact.impulses.iter_mut() {
            p.normal_impulse = 5.0;
        }

        // Same feature ids, large jump: threshold rejects the carry-over and
        // every point restarts from zero impulse.
        let tf_b_jumped = Transform::new(Vec2::new(1.9, 0.0), 0.0);
        contact.update(&a, tf_a, &b, tf_b_jumped, &settings(), true, true, 1e-6);
        for p in &contact.impulses {
            assert_relative_eq!(p.normal_impulse, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn update_stops_touching_when_separated() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let mut contact = Contact::new(0, 1, 0.3, 0.0);
        contact.update(&a, tf_a, &b, Transform::new(Vec2::new(1.5, 0.0), 0.0), &settings(), true, false, 0.0);
        assert!(contact.touching);

        contact.update(&a, tf_a, &b, Transform::new(Vec2::new(10.0, 0.0), 0.0), &settings(), true, false, 0.0);
        assert!(!contact.touching);
        assert!(contact.ended_touching());
        assert!(contact.impulses.is_empty());
    }

    #[test]
    fn manager_creates_and_prunes_pairs() {
        let mut manager = ContactManager::new();
        let always = |_: u32, _: u32| true;
        manager.synchronize([(0, 1), (2, 3)].into_iter(), &always, 0.3, 0.1);
        assert_eq!(manager.len(), 2);
        manager.synchronize([(0, 1)].into_iter(), &always, 0.3, 0.1);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(0, 1).is_some());
        assert!(manager.get(2, 3).is_none());
    }

    #[test]
    fn manager_respects_filter() {
        let mut manager = ContactManager::new();
        let never = |_: u32, _: u32| false;
        manager.synchronize([(0, 1)].into_iter(), &never, 0.3, 0.1);
        assert!(manager.is_empty());
    }

    #[test]
    fn mix_functions() {
        assert_relative_eq!(mix_friction(0.4, 0.9), (0.36_f32).sqrt(), epsilon = 1e-6);
        assert_relative_eq!(mix_restitution(0.2, 0.8), 0.8, epsilon = 1e-6);
    }
}
