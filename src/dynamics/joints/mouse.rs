//! Mouse joint: a soft spring dragging body B's anchor toward a target
//! point, force-limited so grabbed bodies cannot be flung.

use glam::{DMat2, DVec2};
use serde::{Deserialize, Serialize};

use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MouseJointDef {
    /// Ground body; only used for the constraint graph.
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub target: DVec2,
    pub local_anchor_b: DVec2,
    pub max_force: f64,
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl MouseJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, target: DVec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            target,
            local_anchor_b: DVec2::ZERO,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MouseJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) target: DVec2,
    pub(crate) max_force: f64,
    pub(crate) frequency_hz: f64,
    pub(crate) damping_ratio: f64,

    impulse: DVec2,
    beta: f64,
    gamma: f64,

    index_b: usize,
    rb: DVec2,
    local_center_b: DVec2,
    inv_mass_b: f64,
    inv_i_b: f64,
    mass: DMat2,
    c: DVec2,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_b: def.local_anchor_b,
            target: def.target,
            max_force: def.max_force,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: DVec2::ZERO,
            beta: 0.0,
            gamma: 0.0,
            index_b: 0,
            rb: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            inv_mass_b: 0.0,
            inv_i_b: 0.0,
            mass: DMat2::ZERO,
            c: DVec2::ZERO,
        }
    }

    pub fn target(&self) -> DVec2 {
        self.target
    }

    pub fn set_target(&mut self, target: DVec2) {
        self.target = target;
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        bodies: &Arena<RigidBody>,
    ) {
        let b = body_ref(bodies, self.body_b);
        self.index_b = b.index;
        self.local_center_b = b.local_center;
        self.inv_mass_b = b.inv_mass;
        self.inv_i_b = b.inv_i;

        let pos_b = data.positions[self.index_b];
        let qb = Rot::from_angle(pos_b.a);

        let mass = if self.inv_mass_b > 0.0 {
            1.0 / self.inv_mass_b
        } else {
            0.0
        };

        let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
        let d = 2.0 * mass * self.damping_ratio * omega;
        let k = mass * omega * omega;

        let h = data.step.dt;
        self.gamma = h * (d + h * k);
        if self.gamma != 0.0 {
            self.gamma = 1.0 / self.gamma;
        }
        self.beta = h * k * self.gamma;

        self.rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let (mb, ib) = (self.inv_mass_b, self.inv_i_b);
        let k_matrix = DMat2::from_cols(
            DVec2::new(
                mb + ib * self.rb.y * self.rb.y + self.gamma,
                -ib * self.rb.x * self.rb.y,
            ),
            DVec2::new(
                -ib * self.rb.x * self.rb.y,
                mb + ib * self.rb.x * self.rb.x + self.gamma,
            ),
        );
        self.mass = k_matrix.inverse();

        self.c = (pos_b.c + self.rb - self.target) * self.beta;

        // A little extra rotational damping keeps dragging stable.
        data.velocities[self.index_b].w *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            data.velocities[self.index_b].v += mb * self.impulse;
            data.velocities[self.index_b].w += ib * cross(self.rb, self.impulse);
        } else {
            self.impulse = DVec2::ZERO;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut vb = data.velocities[self.index_b];

        let c_dot = vb.v + cross_sv(vb.w, self.rb);
        let mut impulse = self.mass * (-(c_dot + self.c + self.gamma * self.impulse));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        impulse = self.impulse - old_impulse;

        vb.v += self.inv_mass_b * impulse;
        vb.w += self.inv_i_b * cross(self.rb, impulse);

        data.velocities[self.index_b] = vb;
    }

    pub(crate) fn solve_position_constraints(&mut self, _data: &mut SolverData) -> bool {
        true
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.impulse
    }

    pub fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }
}
