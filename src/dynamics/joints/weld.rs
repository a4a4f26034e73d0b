//! Weld joint: locks relative translation and rotation, optionally
//! softened into a torsional spring.

use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, solve22_of33, solve33, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeldJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    pub reference_angle: f64,
    /// Non-zero turns the angular lock into a spring.
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl WeldJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) reference_angle: f64,
    pub(crate) frequency_hz: f64,
    pub(crate) damping_ratio: f64,

    impulse: DVec3,
    gamma: f64,
    bias: f64,

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
    k: DMat3,
    angular_mass: f64,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: DVec3::ZERO,
            gamma: 0.0,
            bias: 0.0,
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
            k: DMat3::ZERO,
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

        self.k = DMat3::from_cols(
            DVec3::new(
                ma + mb + self.ra.y * self.ra.y * ia + self.rb.y * self.rb.y * ib,
                -self.ra.y * self.ra.x * ia - self.rb.y * self.rb.x * ib,
                -self.ra.y * ia - self.rb.y * ib,
            ),
            DVec3::new(
                -self.ra.y * self.ra.x * ia - self.rb.y * self.rb.x * ib,
                ma + mb + self.ra.x * self.ra.x * ia + self.rb.x * self.rb.x * ib,
                self.ra.x * ia + self.rb.x * ib,
            ),
            DVec3::new(
                -self.ra.y * ia - self.rb.y * ib,
                self.ra.x * ia + self.rb.x * ib,
                ia + ib,
            ),
        );

        if self.frequency_hz > 0.0 {
            let inv_m = ia + ib;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };

            let c = pos_b.a - pos_a.a - self.reference_angle;
            let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
            let d = 2.0 * m * self.damping_ratio * omega;
            let k_spring = m * omega * omega;

            let h = data.step.dt;
            self.gamma = h * (d + h * k_spring);
            self.gamma = if self.gamma != 0.0 { 1.0 / self.gamma } else { 0.0 };
            self.bias = c * h * k_spring * self.gamma;

            let inv_m = inv_m + self.gamma;
            self.angular_mass = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
            self.angular_mass = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = DVec2::new(self.impulse.x, self.impulse.y);

            data.velocities[self.index_a].v -= ma * p;
            data.velocities[self.index_a].w -= ia * (cross(self.ra, p) + self.impulse.z);
            data.velocities[self.index_b].v += mb * p;
            data.velocities[self.index_b].w += ib * (cross(self.rb, p) + self.impulse.z);
        } else {
            self.impulse = DVec3::ZERO;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut va = data.velocities[self.index_a];
        let mut vb = data.velocities[self.index_b];
        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        if self.frequency_hz > 0.0 {
            // Soft angular row first, then the rigid linear rows.
            let c_dot2 = vb.w - va.w;
            let impulse2 = -self.angular_mass * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            va.w -= ia * impulse2;
            vb.w += ib * impulse2;

            let c_dot1 = vb.v + cross_sv(vb.w, self.rb) - va.v - cross_sv(va.w, self.ra);
            let impulse1 = -solve22_of33(self.k, c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            va.v -= ma * impulse1;
            va.w -= ia * cross(self.ra, impulse1);
            vb.v += mb * impulse1;
            vb.w += ib * cross(self.rb, impulse1);
        } else {
            let c_dot1 = vb.v + cross_sv(vb.w, self.rb) - va.v - cross_sv(va.w, self.ra);
            let c_dot2 = vb.w - va.w;
            let impulse = -solve33(self.k, DVec3::new(c_dot1.x, c_dot1.y, c_dot2));
            self.impulse += impulse;

            let p = DVec2::new(impulse.x, impulse.y);
            va.v -= ma * p;
            va.w -= ia * (cross(self.ra, p) + impulse.z);
            vb.v += mb * p;
            vb.w += ib * (cross(self.rb, p) + impulse.z);
        }

        data.velocities[self.index_a] = va;
        data.velocities[self.index_b] = vb;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[self.index_a];
        let mut pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);
        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let c1 = pos_b.c + rb - pos_a.c - ra;
        let position_error = c1.length();

        let k = DMat3::from_cols(
            DVec3::new(
                ma + mb + ra.y * ra.y * ia + rb.y * rb.y * ib,
                -ra.y * ra.x * ia - rb.y * rb.x * ib,
                -ra.y * ia - rb.y * ib,
            ),
            DVec3::new(
                -ra.y * ra.x * ia - rb.y * rb.x * ib,
                ma + mb + ra.x * ra.x * ia + rb.x * rb.x * ib,
                ra.x * ia + rb.x * ib,
            ),
            DVec3::new(
                -ra.y * ia - rb.y * ib,
                ra.x * ia + rb.x * ib,
                ia + ib,
            ),
        );

        let angular_error;
        if self.frequency_hz > 0.0 {
            // The spring owns the angle; only translation is corrected.
            angular_error = 0.0;
            let impulse = -solve22_of33(k, c1);

            pos_a.c -= ma * impulse;
            pos_a.a -= ia * cross(ra, impulse);
            pos_b.c += mb * impulse;
            pos_b.a += ib * cross(rb, impulse);
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = -solve33(k, DVec3::new(c1.x, c1.y, c2));
            let p = DVec2::new(impulse.x, impulse.y);

            pos_a.c -= ma * p;
            pos_a.a -= ia * (cross(ra, p) + impulse.z);
            pos_b.c += mb * p;
            pos_b.a += ib * (cross(rb, p) + impulse.z);
        }

        data.positions[self.index_a] = pos_a;
        data.positions[self.index_b] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * DVec2::new(self.impulse.x, self.impulse.y)
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.z
    }
}
