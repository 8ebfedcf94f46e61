//! Island assembly: groups bodies transitively connected by touching
//! contacts or joints into disjoint sets via union-find, so sleep state (see
//! `sleep.rs`) is decided per connected group rather than per body — a body
//! resting on a moving stack must not fall asleep just because it is
//! individually slow. Static bodies never merge islands through themselves
//! (a single static floor must not connect every body resting on it into
//! one island), matching the standard island-builder convention used by
//! every engine in the reference corpus' lineage.

use crate::arena::{Arena, Handle};
use crate::body::{BodyType, RigidBody};
use crate::contact::Contact;
use crate::joint::Joint;

struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n as u32).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let next = self.parent[x as usize];
            self.parent[x as usize] = self.parent[next as usize];
            x = next;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra as usize] < self.rank[rb as usize] {
            self.parent[ra as usize] = rb;
        } else if self.rank[ra as usize] > self.rank[rb as usize] {
            self.parent[rb as usize] = ra;
        } else {
            self.parent[rb as usize] = ra;
            self.rank[ra as usize] += 1;
        }
    }
}

/// One connected group of dynamic bodies, plus the contacts and joints
/// internal to it. Static/kinematic bodies are never members — they are
/// shared boundary conditions, not island content.
pub struct Island {
    pub bodies: Vec<Handle>,
    pub contact_indices: Vec<usize>,
    pub joint_indices: Vec<usize>,
}

/// Builds islands from the current set of live dynamic bodies, touching
/// contacts, and joints. `contacts`/`joints` are indexed positionally (as
/// they sit in the caller's `Vec`s); this function only reads, never
/// mutates, the simulation state.
pub fn build_islands(bodies: &Arena<RigidBody>, contacts: &[Contact], joints: &[Joint], body_index_of: impl Fn(u32) -> Option<Handle>) -> Vec<Island> {
    let dynamic_handles: Vec<Handle> = bodies
        .iter()
        .filter(|(_, b)| b.body_type == BodyType::Dynamic)
        .map(|(h, _)| h)
        .collect();

    if dynamic_handles.is_empty() {
        return Vec::new();
    }

    let max_index = dynamic_handles.iter().map(|h| h.index).max().unwrap_or(0) as usize;
    let mut slot_of: Vec<Option<u32>> = vec![None; max_index + 1];
    for (slot, h) in dynamic_handles.iter().enumerate() {
        slot_of[h.index as usize] = Some(slot as u32);
    }

    let mut uf = UnionFind::new(dynamic_handles.len());

    let is_dynamic = |h: Handle| -> bool { bodies.get(h).map(|b| b.body_type == BodyType::Dynamic).unwrap_or(false) };

    for contact in contacts {
        if !contact.touching {
            continue;
        }
        let (Some(ha), Some(hb)) = (body_index_of(contact.collider_a), body_index_of(contact.collider_b)) else {
            continue;
        };
        if is_dynamic(ha) && is_dynamic(hb) {
            let sa = slot_of[ha.index as usize].unwrap();
            let sb = slot_of[hb.index as usize].unwrap();
            uf.union(sa, sb);
        }
    }

    for joint in joints {
        let (ha, hb) = joint.bodies();
        if ha.index == hb.index {
            continue;
        }
        if is_dynamic(ha) && is_dynamic(hb) {
            let sa = slot_of[ha.index as usize].unwrap();
            let sb = slot_of[hb.index as usize].unwrap();
            uf.union(sa, sb);
        }
    }

    let mut groups: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
    let mut islands: Vec<Island> = Vec::new();
    for (slot, handle) in dynamic_handles.iter().enumerate() {
        let root = uf.find(slot as u32);
        let island_idx = *groups.entry(root).or_insert_with(|| {
            islands.push(Island {
                bodies: Vec::new(),
                contact_indices: Vec::new(),
                joint_indices: Vec::new(),
            });
            islands.len() - 1
        });
        islands[island_idx].bodies.push(*handle);
    }

    for (i, contact) in contacts.iter().enumerate() {
        if !contact.touching {
            continue;
        }
        let (Some(ha), Some(hb)) = (body_index_of(contact.collider_a), body_index_of(contact.collider_b)) else {
            continue;
        };
        let anchor = if is_dynamic(ha) { ha } else if is_dynamic(hb) { hb } else { continue };
        let slot = slot_of[anchor.index as usize].unwrap();
        let root = uf.find(slot);
        if let Some(&island_idx) = groups.get(&root) {
            islands[island_idx].contact_indices.push(i);
        }
    }

    for (i, joint) in joints.iter().enumerate() {
        let (ha, hb) = joint.bodies();
        let anchor = if is_dynamic(ha) { ha } else if is_dynamic(hb) { hb } else { continue };
        let slot = slot_of[anchor.index as usize].unwrap();
        let root = uf.find(slot);
        if let Some(&island_idx) = groups.get(&root) {
            islands[island_idx].joint_indices.push(i);
        }
    }

    islands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;

    #[test]
    fn disjoint_bodies_form_separate_islands() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        bodies.insert(RigidBody::new(1, BodyType::Dynamic, Vec2::new(10.0, 0.0), 0.0));

        let islands = build_islands(&bodies, &[], &[], |_| None);
        assert_eq!(islands.len(), 2);
    }

    #[test]
    fn touching_contact_merges_island() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let ha = bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        let hb = bodies.insert(RigidBody::new(1, BodyType::Dynamic, Vec2::new(1.0, 0.0), 0.0));

        let mut contact = Contact::new(0, 1, 0.2, 0.0);
        contact.touching = true;

        let lookup = move |collider_id: u32| -> Option<Handle> {
            match collider_id {
                0 => Some(ha),
                1 => Some(hb),
                _ => None,
            }
        };

        let islands = build_islands(&bodies, std::slice::from_ref(&contact), &[], lookup);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].bodies.len(), 2);
    }

    #[test]
    fn static_body_does_not_bridge_islands() {
        let mut bodies: Arena<RigidBody> = Arena::new();
        let ha = bodies.insert(RigidBody::new(0, BodyType::Dynamic, Vec2::ZERO, 0.0));
        let ground = bodies.insert(RigidBody::new(1, BodyType::Static, Vec2::new(0.0, -1.0), 0.0));
        let hb = bodies.insert(RigidBody::new(2, BodyType::Dynamic, Vec2::new(5.0, 0.0), 0.0));

        let mut c1 = Contact::new(0, 1, 0.2, 0.0);
        c1.touching = true;
        let mut c2 = Contact::new(1, 2, 0.2, 0.0);
        c2.touching = true;

        let lookup = move |collider_id: u32| -> Option<Handle> {
            match collider_id {
                0 => Some(ha),
                1 => Some(ground),
                2 => Some(hb),
                _ => None,
            }
        };

        let islands = build_islands(&bodies, &[c1, c2], &[], lookup);
        assert_eq!(islands.len(), 2);
    }
}
