//! Sleep state management. Generalizes the donor's flat per-body velocity
//! timer (`core/src/physics/sleep.rs`) to operate per-island: an island
//! sleeps only once every one of its bodies has been slow for
//! `time_to_sleep` seconds, so a single fidgeting block at the bottom of a
//! stack keeps the whole stack awake rather than letting its neighbors drift
//! off individually and then immediately get re-woken next step.

use crate::arena::Arena;
use crate::body::{BodyType, RigidBody};
use crate::island::Island;
use crate::settings::WorldSettings;

/// Advances each island's sleep timer and puts fully-settled islands to
/// sleep. A body with `allow_sleep = false` keeps its whole island awake
/// indefinitely.
pub fn update_sleep(bodies: &mut Arena<RigidBody>, islands: &[Island], settings: &WorldSettings) {
    if !settings.sleeping {
        return;
    }

    let lin_tol_sq = settings.linear_sleep_tolerance * settings.linear_sleep_tolerance;

    for island in islands {
        let mut min_sleep_time = f32::MAX;
        let mut can_sleep = true;

        for &handle in &island.bodies {
            let body = match bodies.get(handle) {
                Some(b) => b,
                None => continue,
            };
            if !body.allow_sleep || !body.is_dynamic() {
                can_sleep = false;
                break;
            }
            let speed_sq = body.linear_velocity.length_sq();
            let ang_speed = body.angular_velocity.abs();
            if speed_sq > lin_tol_sq || ang_speed > settings.angular_sleep_tolerance {
                can_sleep = false;
                break;
            }
            min_sleep_time = min_sleep_time.min(body.sleep_time);
        }

        if !can_sleep {
            for &handle in &island.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    body.sleep_time = 0.0;
                }
            }
            continue;
        }

        let advanced = min_sleep_time + settings.dt;
        if advanced >= settings.time_to_sleep {
            for &handle in &island.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    if body.awake {
                        log::trace!("body {} falling asleep", body.id);
                    }
                    body.set_awake(false);
                }
            }
        } else {
            for &handle in &island.bodies {
                if let Some(body) = bodies.get_mut(handle) {
                    body.sleep_time = advanced;
                }
            }
        }
    }
}

/// Wakes every dynamic body touching `handle` (directly, not transitively —
/// island assembly re-merges the propagation next step). Used when a new
/// contact/joint attaches to a sleeping body, or a force/impulse is applied
/// to one member of a sleeping island.
pub fn wake_island(bodies: &mut Arena<RigidBody>, island: &Island) {
    for &handle in &island.bodies {
        if let Some(body) = bodies.get_mut(handle) {
            if body.body_type == BodyType::Dynamic {
                body.set_awake(true);
            }
        }
    }
}

/// True if any member of the island containing `seed` is awake; islands mix
/// awake and asleep members only for the one step in which something just
/// woke one of them, so callers that need a fast "should this island run
/// the solver" check can test a single representative instead of scanning.
pub fn island_is_awake(bodies: &Arena<RigidBody>, island: &Island) -> bool {
    island.bodies.iter().any(|h| bodies.get(*h).map(|b| b.awake).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Handle;
    use crate::math::Vec2;

    fn island_of(handles: Vec<Handle>) -> Island {
        Island {
            bodies: handles,
            contact_indices: Vec::new(),
            joint_indices: Vec::new(),
        }
    }

    #[test]
    fn slow_island_sleeps_after_time_to_sleep() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let h = bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        let island = island_of(vec![h]);
        let settings = WorldSettings::default();

        let steps = (settings.time_to_sleep / settings.dt).ceil() as u32 + 1;
        for _ in 0..steps {
            update_sleep(&mut bodies, std::slice::from_ref(&island), &settings);
        }

        assert!(!bodies.get(h).unwrap().awake);
    }

    #[test]
    fn fast_body_resets_island_timer() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let h = bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        bodies.get_mut(h).unwrap().linear_velocity = Vec2::new(5.0, 0.0);
        let island = island_of(vec![h]);
        let settings = WorldSettings::default();

        update_sleep(&mut bodies, std::slice::from_ref(&island), &settings);
        assert_eq!(bodies.get(h).unwrap().sleep_time, 0.0);
        assert!(bodies.get(h).unwrap().awake);
    }

    #[test]
    fn no_sleep_body_keeps_island_awake() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let h = bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        bodies.get_mut(h).unwrap().allow_sleep = false;
        let island = island_of(vec![h]);
        let settings = WorldSettings::default();

        for _ in 0..1000 {
            update_sleep(&mut bodies, std::slice::from_ref(&island), &settings);
        }
        assert!(bodies.get(h).unwrap().awake);
    }
}
