//! Rope joint: an upper bound on the distance between two anchors.
//! Slack below the limit, a hard inextensible pull at it.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, LimitState, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RopeJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    pub max_length: f64,
}

impl RopeJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, max_length: f64) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            max_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RopeJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) max_length: f64,

    impulse: f64,
    length: f64,
    state: LimitState,

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

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            impulse: 0.0,
            length: 0.0,
            state: LimitState::Inactive,
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

    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    pub fn set_max_length(&mut self, length: f64) {
        self.max_length = length;
    }

    pub fn limit_state(&self) -> LimitState {
        self.state
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

        self.length = self.u.length();
        self.state = if self.length - self.max_length > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > LINEAR_SLOP {
            self.u /= self.length;
        } else {
            self.u = DVec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = cross(self.ra, self.u);
        let cr_b = cross(self.rb, self.u);
        let inv_mass = self.inv_mass_a
            + self.inv_i_a * cr_a * cr_a
            + self.inv_mass_b
            + self.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

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

        let c = self.length - self.max_length;
        let mut c_dot = self.u.dot(vp_b - vp_a);

        // Speculative pull-in when the rope is already overstretched.
        if c < 0.0 {
            c_dot += data.step.inv_dt * c;
        }

        let mut impulse = -self.mass * c_dot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        impulse = self.impulse - old_impulse;

        let p = impulse * self.u;
        data.velocities[self.index_a].v -= self.inv_mass_a * p;
        data.velocities[self.index_a].w -= self.inv_i_a * cross(self.ra, p);
        data.velocities[self.index_b].v += self.inv_mass_b * p;
        data.velocities[self.index_b].w += self.inv_i_b * cross(self.rb, p);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[self.index_a];
        let mut pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let mut u = pos_b.c + rb - pos_a.c - ra;

        let length = u.length();
        if length > f64::EPSILON {
            u /= length;
        }
        let c = (length - self.max_length).clamp(0.0, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        pos_a.c -= self.inv_mass_a * p;
        pos_a.a -= self.inv_i_a * cross(ra, p);
        pos_b.c += self.inv_mass_b * p;
        pos_b.a += self.inv_i_b * cross(rb, p);

        data.positions[self.index_a] = pos_a;
        data.positions[self.index_b] = pos_b;

        length - self.max_length < LINEAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.impulse * self.u
    }

    pub fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }
}
