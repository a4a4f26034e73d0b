//! Core simulation entities: rigid bodies and the colliders attached to
//! them.

pub mod collider;
pub mod rigidbody;

pub use collider::{Collider, ColliderDef, ColliderProxy, CollisionFilter, ProxyData};
pub use rigidbody::{BodyDef, BodyType, RigidBody};
