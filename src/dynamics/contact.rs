//! Persistent contacts.
//!
//! A contact exists while the fat AABBs of two collider children
//! overlap; its manifold is refreshed by the narrow phase every step.
//! Accumulated impulses survive the refresh when the regenerated points
//! carry the same feature ids, which is what makes warm starting work.

use crate::collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::collision::manifold::Manifold;
use crate::collision::narrowphase::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon,
    collide_polygon_and_circle, collide_polygons,
};
use crate::collision::shapes::{Shape, ShapeType};
use crate::config::MAX_MANIFOLD_POINTS;
use crate::core::collider::Collider;
use crate::core::rigidbody::RigidBody;
use crate::dynamics::contact_manager::ContactListener;
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::Transform2;

/// Canonical contact identity: the broad-phase proxy pair, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactKey(pub usize, pub usize);

impl ContactKey {
    pub fn new(a: usize, b: usize) -> Self {
        Self(a.min(b), a.max(b))
    }
}

/// Impulses applied by the last velocity solve, reported to `post_solve`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f64; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) collider_a: EntityId,
    pub(crate) child_a: usize,
    pub(crate) collider_b: EntityId,
    pub(crate) child_b: usize,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    /// Conveyor-style surface speed along the tangent.
    pub(crate) tangent_speed: f64,
    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) filter_dirty: bool,
    pub(crate) island_flag: bool,
    pub(crate) toi_valid: bool,
    pub(crate) toi: f64,
    pub(crate) toi_count: u32,
}

impl Contact {
    /// Creates a contact for a broad-phase pair, ordering the colliders
    /// so the narrow phase sees its canonical (typeA, typeB). Returns
    /// `None` for pairs no collide routine handles, such as edge-edge.
    pub(crate) fn try_new(
        collider_a: EntityId,
        child_a: usize,
        collider_b: EntityId,
        child_b: usize,
        colliders: &Arena<Collider>,
    ) -> Option<Self> {
        let shape_a = colliders.get(collider_a)?.shape.shape_type();
        let shape_b = colliders.get(collider_b)?.shape.shape_type();

        use ShapeType::*;
        // The reference shape (polygon over circle, edge/chain over
        // everything convex) goes in slot A.
        let swap = matches!(
            (shape_a, shape_b),
            (Circle, Polygon) | (Circle, Edge) | (Circle, Chain) | (Polygon, Edge) | (Polygon, Chain)
        );
        let supported = matches!(
            (shape_a, shape_b),
            (Circle, Circle)
                | (Polygon, Circle)
                | (Circle, Polygon)
                | (Polygon, Polygon)
                | (Edge, Circle)
                | (Circle, Edge)
                | (Edge, Polygon)
                | (Polygon, Edge)
                | (Chain, Circle)
                | (Circle, Chain)
                | (Chain, Polygon)
                | (Polygon, Chain)
        );
        if !supported {
            return None;
        }

        let (ca, cha, cb, chb) = if swap {
            (collider_b, child_b, collider_a, child_a)
        } else {
            (collider_a, child_a, collider_b, child_b)
        };

        let a = colliders.get(ca)?;
        let b = colliders.get(cb)?;
        Some(Self {
            collider_a: ca,
            child_a: cha,
            collider_b: cb,
            child_b: chb,
            manifold: Manifold::default(),
            friction: mix_friction(a.friction, b.friction),
            restitution: mix_restitution(a.restitution, b.restitution),
            tangent_speed: 0.0,
            touching: false,
            enabled: true,
            filter_dirty: false,
            island_flag: false,
            toi_valid: false,
            toi: 0.0,
            toi_count: 0,
        })
    }

    pub fn collider_a(&self) -> EntityId {
        self.collider_a
    }

    pub fn collider_b(&self) -> EntityId {
        self.collider_b
    }

    pub fn child_a(&self) -> usize {
        self.child_a
    }

    pub fn child_b(&self) -> usize {
        self.child_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allows `pre_solve` to drop a contact for the rest of the step.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Overrides the mixed friction until `reset_friction`.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f64) {
        self.restitution = restitution;
    }

    pub fn set_tangent_speed(&mut self, speed: f64) {
        self.tangent_speed = speed;
    }

    pub fn tangent_speed(&self) -> f64 {
        self.tangent_speed
    }

    /// Re-mixes surface properties from the colliders.
    pub fn reset_friction(&mut self, colliders: &Arena<Collider>) {
        if let (Some(a), Some(b)) = (colliders.get(self.collider_a), colliders.get(self.collider_b))
        {
            self.friction = mix_friction(a.friction, b.friction);
            self.restitution = mix_restitution(a.restitution, b.restitution);
        }
    }

    pub(crate) fn evaluate(
        &self,
        shape_a: &Shape,
        xf_a: &Transform2,
        shape_b: &Shape,
        xf_b: &Transform2,
    ) -> Manifold {
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
            (Shape::Chain(chain), Shape::Circle(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_circle(&edge, xf_a, b, xf_b)
            }
            (Shape::Chain(chain), Shape::Polygon(b)) => {
                let edge = chain.child_edge(self.child_a);
                collide_edge_and_polygon(&edge, xf_a, b, xf_b)
            }
            _ => Manifold::default(),
        }
    }

    /// Narrow-phase refresh: regenerates the manifold, transfers matching
    /// impulses, maintains the touching flag, and fires listener events.
    pub(crate) fn update(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &mut Arena<RigidBody>,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let old_manifold = self.manifold.clone();

        // Re-enabled every step; pre_solve may veto again.
        self.enabled = true;

        let (Some(collider_a), Some(collider_b)) = (
            colliders.get(self.collider_a),
            colliders.get(self.collider_b),
        ) else {
            return;
        };
        let body_a_id = collider_a.body;
        let body_b_id = collider_b.body;
        let (Some(body_a), Some(body_b)) = (bodies.get(body_a_id), bodies.get(body_b_id)) else {
            return;
        };
        let xf_a = body_a.transform;
        let xf_b = body_b.transform;

        let sensor = collider_a.is_sensor || collider_b.is_sensor;
        let was_touching = self.touching;

        let touching = if sensor {
            self.manifold.points.clear();
            shapes_overlap(
                &collider_a.shape,
                self.child_a,
                &xf_a,
                &collider_b.shape,
                self.child_b,
                &xf_b,
            )
        } else {
            let mut manifold =
                self.evaluate(&collider_a.shape, &xf_a, &collider_b.shape, &xf_b);
            for point in &mut manifold.points {
                if let Some(old) = old_manifold
                    .points
                    .iter()
                    .find(|o| o.feature == point.feature)
                {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }
            let touching = manifold.point_count() > 0;
            self.manifold = manifold;
            touching
        };

        if touching != was_touching {
            if let Some(body) = bodies.get_mut(body_a_id) {
                body.set_awake(true);
            }
            if let Some(body) = bodies.get_mut(body_b_id) {
                body.set_awake(true);
            }
        }

        self.touching = touching;

        if let Some(listener) = listener.as_deref_mut() {
            if touching && !was_touching {
                listener.begin_contact(self);
            }
            if !touching && was_touching {
                listener.end_contact(self);
            }
            if touching && !sensor {
                listener.pre_solve(self, &old_manifold);
            }
        }
    }
}

/// Friction mixing: geometric mean, so one slick surface wins.
pub fn mix_friction(friction_a: f64, friction_b: f64) -> f64 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
pub fn mix_restitution(restitution_a: f64, restitution_b: f64) -> f64 {
    restitution_a.max(restitution_b)
}

/// Surface-level overlap test used for sensor contacts.
pub(crate) fn shapes_overlap(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform2,
    shape_b: &Shape,
    child_b: usize,
    xf_b: &Transform2,
) -> bool {
    let proxy_a = DistanceProxy::from_shape(shape_a, child_a);
    let proxy_b = DistanceProxy::from_shape(shape_b, child_b);
    let mut cache = SimplexCache::default();
    let out = distance(
        &mut cache,
        &DistanceInput {
            proxy_a: &proxy_a,
            proxy_b: &proxy_b,
            transform_a: *xf_a,
            transform_b: *xf_b,
            use_radii: true,
        },
    );
    out.distance < 10.0 * f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_rules() {
        assert_eq!(mix_friction(0.5, 0.0), 0.0);
        assert!((mix_friction(0.4, 0.9) - 0.6).abs() < 1e-12);
        assert_eq!(mix_restitution(0.2, 0.7), 0.7);
    }

    #[test]
    fn contact_key_is_canonical() {
        assert_eq!(ContactKey::new(5, 2), ContactKey::new(2, 5));
        assert!(ContactKey::new(1, 2) < ContactKey::new(1, 3));
    }
}
