//! Friction joint: top-down friction, resisting relative translation and
//! rotation up to configured force/torque budgets.

use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    pub max_force: f64,
    pub max_torque: f64,
}

impl FrictionJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            max_force: 0.0,
            max_torque: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) max_force: f64,
    pub(crate) max_torque: f64,

    linear_impulse: DVec2,
    angular_impulse: f64,

    index_a: usize,
    index_b: usize,
    ra: DVec2,
    rb: DVec2,
    local_center_a: DVec2,
    local_center_b: DVec2,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    linear_mass: DMat2,
    angular_mass: f64,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            max_torque: def.max_torque,
            linear_impulse: DVec2::ZERO,
            angular_impulse: 0.0,
            index_a: 0,
            index_b: 0,
            ra: DVec2::ZERO,
            rb: DVec2::ZERO,
            local_center_a: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            linear_mass: DMat2::ZERO,
            angular_mass: 0.0,
        }
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        bodies: &Arena<RigidBody>,
    ) {
        let a = body_ref(bodies, self.body_a);
        let b = body_ref(bodies, self.body_b);
        self.index_a = a.index;
        self.index_b = b.index;
        self.local_center_a = a.local_center;
        self.local_center_b = b.local_center;
        self.inv_mass_a = a.inv_mass;
        self.inv_mass_b = b.inv_mass;
        self.inv_i_a = a.inv_i;
        self.inv_i_b = b.inv_i;

        let pos_a = data.positions[self.index_a];
        let pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);

        self.ra = qa.apply(self.local_anchor_a - self.local_center_a);
        self.rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        let k = DMat2::from_cols(
            DVec2::new(
                ma + mb + ia * self.ra.y * self.ra.y + ib * self.rb.y * self.rb.y,
                -ia * self.ra.x * self.ra.y - ib * self.rb.x * self.rb.y,
            ),
            DVec2::new(
                -ia * self.ra.x * self.ra.y - ib * self.rb.x * self.rb.y,
                ma + mb + ia * self.ra.x * self.ra.x + ib * self.rb.x * self.rb.x,
            ),
        );
        self.linear_mass = k.inverse();

        self.angular_mass = ia + ib;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            data.velocities[self.index_a].v -= ma * p;
            data.velocities[self.index_a].w -= ia * (cross(self.ra, p) + self.angular_impulse);
            data.velocities[self.index_b].v += mb * p;
            data.velocities[self.index_b].w += ib * (cross(self.rb, p) + self.angular_impulse);
        } else {
            self.linear_impulse = DVec2::ZERO;
            self.angular_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut va = data.velocities[self.index_a];
        let mut vb = data.velocities[self.index_b];
        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);
        let h = data.step.dt;

        // Angular friction.
        {
            let c_dot = vb.w - va.w;
            let impulse = -self.angular_mass * c_dot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse =
                (self.angular_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;

            va.w -= ia * impulse;
            vb.w += ib * impulse;
        }

        // Linear friction.
        {
            let c_dot = vb.v + cross_sv(vb.w, self.rb) - va.v - cross_sv(va.w, self.ra);
            let mut impulse = -(self.linear_mass * c_dot);

            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }
            impulse = self.linear_impulse - old_impulse;

            va.v -= ma * impulse;
            va.w -= ia * cross(self.ra, impulse);
            vb.v += mb * impulse;
            vb.w += ib * cross(self.rb, impulse);
        }

        data.velocities[self.index_a] = va;
        data.velocities[self.index_b] = vb;
    }

    pub(crate) fn solve_position_constraints(&mut self, _data: &mut SolverData) -> bool {
        true
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.linear_impulse
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.angular_impulse
    }
}
