//! Planar Accelerator – a deterministic 2D rigid-body physics engine.
//!
//! The crate is organized around a single [`World`] that owns rigid
//! bodies, colliders, and joints, and advances them with a sequential
//! impulse solver: dynamic AABB tree broad phase, shape-pair narrow
//! phase with persistent manifolds, island decomposition, and a
//! conservative-advancement continuous pass for bullets. Given
//! identical inputs, repeated stepping is bitwise reproducible on the
//! same platform.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod utils;
pub mod world;

use std::fmt;

pub use glam::{DMat2, DMat3, DVec2};

pub use collision::{
    Aabb, ChainShape, CircleShape, DistanceProxy, EdgeShape, Manifold, ManifoldType, MassData,
    PolygonShape, RayCastInput, RayCastOutput, Shape, ShapeType, SimplexCache, ToiState,
};
pub use crate::core::{BodyDef, BodyType, Collider, ColliderDef, CollisionFilter, RigidBody};
pub use dynamics::{
    Contact, ContactFilter, ContactImpulse, ContactListener, DestructionListener, Joint, JointDef,
};
pub use dynamics::joints::{
    DistanceJointDef, FrictionJointDef, GearJointDef, MotorJointDef, MouseJointDef,
    PrismaticJointDef, PulleyJointDef, RevoluteJointDef, RopeJointDef, WeldJointDef, WheelJointDef,
};
pub use utils::allocator::{Arena, EntityId};
pub use world::{RayCastHit, World, WorldSnapshot};

/// Errors surfaced synchronously at the call site. The world is left
/// unchanged when a call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsError {
    /// Non-finite coordinates, negative material values, or references
    /// to destroyed entities.
    InvalidArgument(&'static str),
    /// A shape whose geometry cannot support collision (too few or
    /// collinear polygon vertices).
    DegenerateShape(&'static str),
    /// Structural mutation attempted while a step is running.
    WorldLocked,
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            PhysicsError::DegenerateShape(what) => write!(f, "degenerate shape: {what}"),
            PhysicsError::WorldLocked => write!(f, "world is locked during a step"),
        }
    }
}

impl std::error::Error for PhysicsError {}
