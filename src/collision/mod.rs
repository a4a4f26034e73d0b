//! Collision detection: AABB tree broad phase, GJK distance, shape
//! manifolds, and time of impact.

pub mod aabb;
pub mod broadphase;
pub mod clipping;
pub mod distance;
pub mod dynamic_tree;
pub mod manifold;
pub mod narrowphase;
pub mod shapes;
pub mod toi;

pub use aabb::{Aabb, RayCastInput, RayCastOutput};
pub use broadphase::{BroadPhase, ProxyId};
pub use distance::{distance, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::DynamicTree;
pub use manifold::{ContactFeature, Manifold, ManifoldPoint, ManifoldType, WorldManifold};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};
pub use toi::{time_of_impact, ToiInput, ToiOutput, ToiState};
