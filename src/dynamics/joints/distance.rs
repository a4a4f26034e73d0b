//! Distance joint: keeps two anchor points a fixed length apart, with an
//! optional spring/damper softening.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    /// Rest length of the constraint.
    pub length: f64,
    /// Spring frequency; zero makes the joint rigid.
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl DistanceJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, length: f64) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            length: length.max(LINEAR_SLOP),
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) length: f64,
    pub(crate) frequency_hz: f64,
    pub(crate) damping_ratio: f64,

    impulse: f64,
    gamma: f64,
    bias: f64,

    index_a: usize,
    index_b: usize,
    u: DVec2,
    ra: DVec2,
    rb: DVec2,
    local_center_a: DVec2,
    local_center_b: DVec2,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    mass: f64,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length.max(LINEAR_SLOP),
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            index_a: 0,
            index_b: 0,
            u: DVec2::ZERO,
            ra: DVec2::ZERO,
            rb: DVec2::ZERO,
            local_center_a: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            mass: 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn set_length(&mut self, length: f64) {
        self.length = length.max(LINEAR_SLOP);
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
        self.u = pos_b.c + self.rb - pos_a.c - self.ra;

        let current_length = self.u.length();
        if current_length > LINEAR_SLOP {
            self.u /= current_length;
        } else {
            self.u = DVec2::ZERO;
        }

        let cr_a = cross(self.ra, self.u);
        let cr_b = cross(self.rb, self.u);
        let mut inv_mass = self.inv_mass_a
            + self.inv_i_a * cr_a * cr_a
            + self.inv_mass_b
            + self.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = current_length - self.length;
            let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            let k = self.mass * omega * omega;

            let h = data.step.dt;
            self.gamma = h * (d + h * k);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = self.impulse * self.u;
            data.velocities[self.index_a].v -= self.inv_mass_a * p;
            data.velocities[self.index_a].w -= self.inv_i_a * cross(self.ra, p);
            data.velocities[self.index_b].v += self.inv_mass_b * p;
            data.velocities[self.index_b].w += self.inv_i_b * cross(self.rb, p);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let va = data.velocities[self.index_a];
        let vb = data.velocities[self.index_b];

        let vp_a = va.v + cross_sv(va.w, self.ra);
        let vp_b = vb.v + cross_sv(vb.w, self.rb);
        let c_dot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (c_dot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        data.velocities[self.index_a].v -= self.inv_mass_a * p;
        data.velocities[self.index_a].w -= self.inv_i_a * cross(self.ra, p);
        data.velocities[self.index_b].v += self.inv_mass_b * p;
        data.velocities[self.index_b].w += self.inv_i_b * cross(self.rb, p);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        if self.frequency_hz > 0.0 {
            // Springs carry their error; there is nothing to correct.
            return true;
        }

        let pos_a = data.positions[self.index_a];
        let pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let mut u = pos_b.c + rb - pos_a.c - ra;

        let current_length = u.length();
        if current_length > f64::EPSILON {
            u /= current_length;
        }
        let c = (current_length - self.length)
            .clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        data.positions[self.index_a].c -= self.inv_mass_a * p;
        data.positions[self.index_a].a -= self.inv_i_a * cross(ra, p);
        data.positions[self.index_b].c += self.inv_mass_b * p;
        data.positions[self.index_b].a += self.inv_i_b * cross(rb, p);

        c.abs() < LINEAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.impulse * self.u
    }

    pub fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }
}
