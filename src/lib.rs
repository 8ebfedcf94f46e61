//! A 2D rigid-body physics engine: dynamic-AABB-tree broad phase, GJK/EPA
//! narrow phase, sequential-impulse solver with warm starting and joints.
//!
//! The entry point is [`World`]; everything else is reachable through it or
//! through the handles ([`BodyHandle`], [`ColliderHandle`], [`JointHandle`])
//! it hands back from `create_*`.

pub mod aabb;
pub mod arena;
pub mod body;
pub mod contact;
pub mod distance;
pub mod epa;
pub mod error;
pub mod gjk;
pub mod island;
pub mod joint;
pub mod manifold;
pub mod math;
pub mod settings;
pub mod shape;
pub mod sleep;
pub mod solver;
pub mod tree;
pub mod world;

pub use aabb::Aabb;
pub use arena::Handle;
pub use body::{BodyType, Collider, Filter, RigidBody};
pub use contact::Contact;
pub use error::{Result, WorldError};
pub use joint::{DistanceJoint, GrabJoint, Joint, LineJoint, PrismaticJoint, RevoluteJoint, SoftParams, WeldJoint};
pub use math::{Rot, Transform, Vec2};
pub use settings::{SahHeuristic, WorldSettings};
pub use shape::Shape;
pub use world::{BodyHandle, ColliderHandle, JointHandle, RayCastHit, ShapeCastHit, World};
