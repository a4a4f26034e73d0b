//! Pulley joint: an idealized rope over two ground anchors,
//! constraining `length_a + ratio * length_b` to a constant.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::LINEAR_SLOP;
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulleyJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    /// Fixed world anchor the A-side rope hangs from.
    pub ground_anchor_a: DVec2,
    pub ground_anchor_b: DVec2,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    /// Rest lengths of the two rope segments.
    pub length_a: f64,
    pub length_b: f64,
    /// Block-and-tackle ratio applied to the B side.
    pub ratio: f64,
}

impl PulleyJointDef {
    pub fn new(
        body_a: EntityId,
        body_b: EntityId,
        ground_anchor_a: DVec2,
        ground_anchor_b: DVec2,
        length_a: f64,
        length_b: f64,
        ratio: f64,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            length_a,
            length_b,
            ratio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PulleyJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) ground_anchor_a: DVec2,
    pub(crate) ground_anchor_b: DVec2,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) length_a: f64,
    pub(crate) length_b: f64,
    pub(crate) ratio: f64,
    constant: f64,

    impulse: f64,

    index_a: usize,
    index_b: usize,
    ua: DVec2,
    ub: DVec2,
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

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Self {
        debug_assert!(def.ratio > f64::EPSILON);
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            ratio: def.ratio,
            constant: def.length_a + def.ratio * def.length_b,
            impulse: 0.0,
            index_a: 0,
            index_b: 0,
            ua: DVec2::ZERO,
            ub: DVec2::ZERO,
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

    pub fn ratio(&self) -> f64 {
        self.ratio
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

        self.ua = pos_a.c + self.ra - self.ground_anchor_a;
        self.ub = pos_b.c + self.rb - self.ground_anchor_b;

        let length_a = self.ua.length();
        let length_b = self.ub.length();

        if length_a > 10.0 * LINEAR_SLOP {
            self.ua /= length_a;
        } else {
            self.ua = DVec2::ZERO;
        }
        if length_b > 10.0 * LINEAR_SLOP {
            self.ub /= length_b;
        } else {
            self.ub = DVec2::ZERO;
        }

        let ru_a = cross(self.ra, self.ua);
        let ru_b = cross(self.rb, self.ub);

        let mass_a = self.inv_mass_a + self.inv_i_a * ru_a * ru_a;
        let mass_b = self.inv_mass_b + self.inv_i_b * ru_b * ru_b;
        self.mass = mass_a + self.ratio * self.ratio * mass_b;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let pa = -self.impulse * self.ua;
            let pb = -self.ratio * self.impulse * self.ub;

            data.velocities[self.index_a].v += self.inv_mass_a * pa;
            data.velocities[self.index_a].w += self.inv_i_a * cross(self.ra, pa);
            data.velocities[self.index_b].v += self.inv_mass_b * pb;
            data.velocities[self.index_b].w += self.inv_i_b * cross(self.rb, pb);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let va = data.velocities[self.index_a];
        let vb = data.velocities[self.index_b];

        let vp_a = va.v + cross_sv(va.w, self.ra);
        let vp_b = vb.v + cross_sv(vb.w, self.rb);

        let c_dot = -self.ua.dot(vp_a) - self.ratio * self.ub.dot(vp_b);
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        let pa = -impulse * self.ua;
        let pb = -self.ratio * impulse * self.ub;

        data.velocities[self.index_a].v += self.inv_mass_a * pa;
        data.velocities[self.index_a].w += self.inv_i_a * cross(self.ra, pa);
        data.velocities[self.index_b].v += self.inv_mass_b * pb;
        data.velocities[self.index_b].w += self.inv_i_b * cross(self.rb, pb);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[self.index_a];
        let mut pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);

        // Anchors recomputed at the corrected poses, not the ones cached
        // by the velocity init.
        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let mut ua = pos_a.c + ra - self.ground_anchor_a;
        let mut ub = pos_b.c + rb - self.ground_anchor_b;

        let length_a = ua.length();
        let length_b = ub.length();

        if length_a > 10.0 * LINEAR_SLOP {
            ua /= length_a;
        } else {
            ua = DVec2::ZERO;
        }
        if length_b > 10.0 * LINEAR_SLOP {
            ub /= length_b;
        } else {
            ub = DVec2::ZERO;
        }

        let ru_a = cross(ra, ua);
        let ru_b = cross(rb, ub);

        let mass_a = self.inv_mass_a + self.inv_i_a * ru_a * ru_a;
        let mass_b = self.inv_mass_b + self.inv_i_b * ru_b * ru_b;
        let mut mass = mass_a + self.ratio * self.ratio * mass_b;
        if mass > 0.0 {
            mass = 1.0 / mass;
        }

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;

        let pa = -impulse * ua;
        let pb = -self.ratio * impulse * ub;

        pos_a.c += self.inv_mass_a * pa;
        pos_a.a += self.inv_i_a * cross(ra, pa);
        pos_b.c += self.inv_mass_b * pb;
        pos_b.a += self.inv_i_b * cross(rb, pb);

        data.positions[self.index_a] = pos_a;
        data.positions[self.index_b] = pos_b;

        linear_error < LINEAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.impulse * self.ub
    }

    pub fn reaction_torque(&self, _inv_dt: f64) -> f64 {
        0.0
    }

    pub fn current_length_a(&self, bodies: &Arena<RigidBody>) -> f64 {
        let body = bodies.get(self.body_a).expect("pulley body destroyed");
        (body.world_point(self.local_anchor_a) - self.ground_anchor_a).length()
    }

    pub fn current_length_b(&self, bodies: &Arena<RigidBody>) -> f64 {
        let body = bodies.get(self.body_b).expect("pulley body destroyed");
        (body.world_point(self.local_anchor_b) - self.ground_anchor_b).length()
    }
}
