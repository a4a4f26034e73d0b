use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::Aabb;
use crate::collision::broadphase::{BroadPhase, ProxyId};
use crate::collision::shapes::Shape;
use crate::utils::allocator::EntityId;
use crate::utils::math::Transform2;
use crate::PhysicsError;

/// Category/mask/group collision filtering.
///
/// Two colliders in the same non-zero group always collide (positive) or
/// never collide (negative); otherwise each side's mask must accept the
/// other's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub category: u16,
    pub mask: u16,
    pub group: i16,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: 0x0001,
            mask: 0xFFFF,
            group: 0,
        }
    }
}

impl CollisionFilter {
    pub fn should_collide(&self, other: &CollisionFilter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

/// Construction options for a collider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColliderDef {
    pub shape: Shape,
    pub density: f64,
    pub friction: f64,
    pub restitution: f64,
    pub is_sensor: bool,
    pub filter: CollisionFilter,
}

impl ColliderDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            is_sensor: false,
            filter: CollisionFilter::default(),
        }
    }

    pub fn density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    pub fn friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), PhysicsError> {
        if !(self.density >= 0.0 && self.density.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "collider density must be finite and non-negative",
            ));
        }
        if !(self.friction >= 0.0 && self.friction.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "collider friction must be finite and non-negative",
            ));
        }
        if !self.restitution.is_finite() {
            return Err(PhysicsError::InvalidArgument(
                "collider restitution must be finite",
            ));
        }
        Ok(())
    }
}

/// Broad-phase user data: which collider child a tree leaf stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyData {
    pub collider: EntityId,
    pub child: usize,
}

/// One broad-phase leaf owned by a collider.
#[derive(Debug, Clone, Copy)]
pub struct ColliderProxy {
    pub aabb: Aabb,
    pub proxy_id: ProxyId,
    pub child_index: usize,
}

/// A shape bound to a body with surface properties and filtering.
///
/// Invariant: `proxies.len() == shape.child_count()` while registered
/// with the broad phase, zero otherwise.
#[derive(Debug, Clone)]
pub struct Collider {
    pub(crate) body: EntityId,
    pub(crate) shape: Shape,
    pub(crate) density: f64,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) is_sensor: bool,
    pub(crate) filter: CollisionFilter,
    pub(crate) proxies: Vec<ColliderProxy>,
}

impl Collider {
    pub(crate) fn from_def(body: EntityId, def: &ColliderDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
        }
    }

    pub fn body(&self) -> EntityId {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> CollisionFilter {
        self.filter
    }

    pub fn test_point(&self, xf: &Transform2, point: DVec2) -> bool {
        self.shape.test_point(xf, point)
    }

    pub(crate) fn create_proxies(
        &mut self,
        id: EntityId,
        broad_phase: &mut BroadPhase<ProxyData>,
        xf: &Transform2,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child);
            let proxy_id = broad_phase.create_proxy(
                aabb,
                ProxyData {
                    collider: id,
                    child,
                },
            );
            self.proxies.push(ColliderProxy {
                aabb,
                proxy_id,
                child_index: child,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyData>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Updates the broad-phase leaves to cover the swept motion from
    /// `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<ProxyData>,
        xf1: &Transform2,
        xf2: &Transform2,
    ) {
        for proxy in &mut self.proxies {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = aabb1.combine(&aabb2);
            let displacement = aabb2.center() - aabb1.center();
            broad_phase.move_proxy(proxy.proxy_id, proxy.aabb, displacement);
        }
    }

    /// Flags every proxy for fresh pair generation after a filter edit.
    pub(crate) fn refilter(&self, broad_phase: &mut BroadPhase<ProxyData>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_index_overrides_masks() {
        let mut a = CollisionFilter::default();
        let mut b = CollisionFilter::default();
        assert!(a.should_collide(&b));

        a.group = -3;
        b.group = -3;
        assert!(!a.should_collide(&b));

        a.group = 3;
        b.group = 3;
        a.mask = 0;
        assert!(a.should_collide(&b));
    }

    #[test]
    fn masks_must_accept_both_ways() {
        let a = CollisionFilter {
            category: 0x0002,
            mask: 0x0004,
            group: 0,
        };
        let b = CollisionFilter {
            category: 0x0004,
            mask: 0xFFFF,
            group: 0,
        };
        assert!(a.should_collide(&b));
        let c = CollisionFilter {
            category: 0x0004,
            mask: 0x0001,
            group: 0,
        };
        assert!(!a.should_collide(&c));
    }
}
