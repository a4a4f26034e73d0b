use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::utils::allocator::EntityId;
use crate::utils::math::{cross, Rot, Sweep, Transform2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves, infinite mass.
    Static,
    /// Moves under its own velocity, infinite mass.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Construction options for a rigid body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: DVec2,
    pub angle: f64,
    pub linear_velocity: DVec2,
    pub angular_velocity: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub fixed_rotation: bool,
    /// Requests continuous collision handling against other dynamics.
    pub bullet: bool,
    pub gravity_scale: f64,
    pub allow_sleep: bool,
    pub awake: bool,
    pub enabled: bool,
    /// Opaque tag carried by the body, never interpreted by the engine.
    pub user_data: u128,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: DVec2::ZERO,
            angle: 0.0,
            linear_velocity: DVec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            fixed_rotation: false,
            bullet: false,
            gravity_scale: 1.0,
            allow_sleep: true,
            awake: true,
            enabled: true,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    pub fn position(mut self, position: DVec2) -> Self {
        self.position = position;
        self
    }

    pub fn angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn linear_velocity(mut self, v: DVec2) -> Self {
        self.linear_velocity = v;
        self
    }

    pub fn angular_velocity(mut self, w: f64) -> Self {
        self.angular_velocity = w;
        self
    }

    pub fn damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn gravity_scale(mut self, scale: f64) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn user_data(mut self, user_data: u128) -> Self {
        self.user_data = user_data;
        self
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.angle.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
            && self.linear_damping >= 0.0
            && self.angular_damping >= 0.0
            && self.gravity_scale.is_finite()
    }
}

/// Rigid body state. Mass properties are derived from the attached
/// colliders; static and kinematic bodies carry zero inverse mass.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) body_type: BodyType,
    pub(crate) transform: Transform2,
    pub(crate) sweep: Sweep,
    pub(crate) linear_velocity: DVec2,
    pub(crate) angular_velocity: f64,
    pub(crate) force: DVec2,
    pub(crate) torque: f64,
    pub(crate) mass: f64,
    pub(crate) inv_mass: f64,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f64,
    pub(crate) inv_inertia: f64,
    pub(crate) linear_damping: f64,
    pub(crate) angular_damping: f64,
    pub(crate) gravity_scale: f64,
    pub(crate) sleep_time: f64,
    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) bullet: bool,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    pub(crate) island_index: usize,
    pub(crate) colliders: Vec<EntityId>,
    pub(crate) user_data: u128,
}

impl RigidBody {
    pub(crate) fn from_def(def: &BodyDef) -> Self {
        let transform = Transform2::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: DVec2::ZERO,
            c0: def.position,
            c: def.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };
        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };
        Self {
            body_type: def.body_type,
            transform,
            sweep,
            linear_velocity: if def.body_type == BodyType::Static {
                DVec2::ZERO
            } else {
                def.linear_velocity
            },
            angular_velocity: if def.body_type == BodyType::Static {
                0.0
            } else {
                def.angular_velocity
            },
            force: DVec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && def.body_type != BodyType::Static,
            allow_sleep: def.allow_sleep,
            fixed_rotation: def.fixed_rotation,
            bullet: def.bullet,
            enabled: def.enabled,
            island_flag: false,
            island_index: 0,
            colliders: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn transform(&self) -> Transform2 {
        self.transform
    }

    pub fn position(&self) -> DVec2 {
        self.transform.p
    }

    pub fn angle(&self) -> f64 {
        self.sweep.a
    }

    /// Center of mass in world coordinates.
    pub fn world_center(&self) -> DVec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> DVec2 {
        self.sweep.local_center
    }

    pub fn linear_velocity(&self) -> DVec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular_velocity
    }

    pub fn set_linear_velocity(&mut self, v: DVec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.length_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f64) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inertia(&self) -> f64 {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            // The timer only restarts on a sleep-to-wake transition, or
            // idling bodies could never accumulate sleep time.
            if !self.awake {
                self.awake = true;
                self.sleep_time = 0.0;
            }
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = DVec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = DVec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn collider_ids(&self) -> &[EntityId] {
        &self.colliders
    }

    pub fn user_data(&self) -> u128 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u128) {
        self.user_data = user_data;
    }

    /// Accumulates a force applied at a world point; wakes the body.
    pub fn apply_force(&mut self, force: DVec2, point: DVec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: DVec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f64) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    pub fn apply_linear_impulse(&mut self, impulse: DVec2, point: DVec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity += self.inv_inertia * cross(point - self.sweep.c, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f64) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    pub fn world_point(&self, local: DVec2) -> DVec2 {
        self.transform.apply(local)
    }

    pub fn local_point(&self, world: DVec2) -> DVec2 {
        self.transform.apply_inv(world)
    }

    pub fn world_vector(&self, local: DVec2) -> DVec2 {
        self.transform.q.apply(local)
    }

    /// Velocity of a world point attached to this body.
    pub fn linear_velocity_at(&self, world_point: DVec2) -> DVec2 {
        self.linear_velocity
            + crate::utils::math::cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    /// Rebuilds the transform from the end-of-sweep pose.
    pub(crate) fn synchronize_transform(&mut self) {
        self.transform.q = Rot::from_angle(self.sweep.a);
        self.transform.p = self.sweep.c - self.transform.q.apply(self.sweep.local_center);
    }

    /// Advances the sweep start to `alpha` and adopts that pose.
    pub(crate) fn advance(&mut self, alpha: f64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Places the body at a world pose, resetting the sweep.
    pub(crate) fn set_pose(&mut self, position: DVec2, angle: f64) {
        self.transform = Transform2::new(position, angle);
        self.sweep.c = self.transform.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Adopts new mass properties, preserving velocity at the center.
    pub(crate) fn set_mass_properties(&mut self, mass: f64, center: DVec2, inertia: f64) {
        debug_assert!(self.body_type == BodyType::Dynamic);
        let old_center = self.sweep.c;

        self.mass = if mass > 0.0 { mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if inertia > 0.0 && !self.fixed_rotation {
            // Stored about the center of mass.
            self.inertia = inertia - self.mass * center.length_squared();
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        self.sweep.local_center = center;
        self.sweep.c = self.transform.apply(center);
        self.sweep.c0 = self.sweep.c;

        self.linear_velocity += crate::utils::math::cross_sv(
            self.angular_velocity,
            self.sweep.c - old_center,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn static_bodies_reject_velocity() {
        let mut body = RigidBody::from_def(&BodyDef::default());
        body.set_linear_velocity(DVec2::new(1.0, 0.0));
        assert_eq!(body.linear_velocity(), DVec2::ZERO);
        assert_eq!(body.inv_mass, 0.0);
    }

    #[test]
    fn impulse_at_offset_spins_the_body() {
        let mut body = RigidBody::from_def(&BodyDef::dynamic());
        body.set_mass_properties(2.0, DVec2::ZERO, 0.5);
        body.apply_linear_impulse(DVec2::new(0.0, 1.0), DVec2::new(1.0, 0.0));
        assert_relative_eq!(body.linear_velocity().y, 0.5);
        assert_relative_eq!(body.angular_velocity(), 2.0);
    }

    #[test]
    fn sleep_clears_motion() {
        let mut body = RigidBody::from_def(&BodyDef::dynamic());
        body.set_linear_velocity(DVec2::new(3.0, 0.0));
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), DVec2::ZERO);
    }

    #[test]
    fn set_pose_keeps_sweep_consistent() {
        let mut body = RigidBody::from_def(&BodyDef::dynamic());
        body.set_mass_properties(1.0, DVec2::new(0.5, 0.0), 1.0);
        body.set_pose(DVec2::new(2.0, 0.0), std::f64::consts::FRAC_PI_2);
        // World center = position + R(π/2)·(0.5, 0)
        assert_relative_eq!(body.world_center().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(body.world_center().y, 0.5, epsilon = 1e-12);
    }
}
