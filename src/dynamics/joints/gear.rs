//! Gear joint: couples the coordinates of two revolute/prismatic joints
//! so `coordinate_a + ratio * coordinate_b` stays constant. Spans four
//! bodies: the two driven bodies plus each geared joint's ground body.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, Joint, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, Rot};
use crate::PhysicsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GearJointDef {
    /// Revolute or prismatic joint between ground body C and body A.
    pub joint1: EntityId,
    /// Revolute or prismatic joint between ground body D and body B.
    pub joint2: EntityId,
    pub ratio: f64,
    pub collide_connected: bool,
}

impl GearJointDef {
    pub fn new(joint1: EntityId, joint2: EntityId, ratio: f64) -> Self {
        Self {
            joint1,
            joint2,
            ratio,
            collide_connected: false,
        }
    }
}

/// The geared joint's kind and the geometry needed to read its
/// coordinate from body poses alone.
#[derive(Debug, Clone, Copy)]
enum GearBase {
    Revolute {
        reference_angle: f64,
    },
    Prismatic {
        local_anchor_ground: DVec2,
        local_anchor_body: DVec2,
        local_axis: DVec2,
    },
}

#[derive(Debug, Clone)]
pub struct GearJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) body_c: EntityId,
    pub(crate) body_d: EntityId,
    pub(crate) collide_connected: bool,
    /// Ids of the geared joints, kept for introspection/serialization.
    pub(crate) joint1: EntityId,
    pub(crate) joint2: EntityId,
    base_a: GearBase,
    base_b: GearBase,
    pub(crate) ratio: f64,
    constant: f64,

    impulse: f64,

    index_a: usize,
    index_b: usize,
    index_c: usize,
    index_d: usize,
    lc_a: DVec2,
    lc_b: DVec2,
    lc_c: DVec2,
    lc_d: DVec2,
    m_a: f64,
    m_b: f64,
    m_c: f64,
    m_d: f64,
    i_a: f64,
    i_b: f64,
    i_c: f64,
    i_d: f64,
    jv_ac: DVec2,
    jv_bd: DVec2,
    jw_a: f64,
    jw_b: f64,
    jw_c: f64,
    jw_d: f64,
    mass: f64,
}

impl GearJoint {
    pub(crate) fn from_joints(
        def: &GearJointDef,
        joint1: &Joint,
        joint2: &Joint,
        bodies: &Arena<RigidBody>,
    ) -> Result<Self, PhysicsError> {
        if def.ratio == 0.0 || !def.ratio.is_finite() {
            return Err(PhysicsError::InvalidArgument(
                "gear ratio must be finite and non-zero",
            ));
        }

        let (base_a, body_c, body_a) = Self::extract_base(joint1)?;
        let (base_b, body_d, body_b) = Self::extract_base(joint2)?;

        let coordinate_a = Self::coordinate(&base_a, bodies, body_c, body_a)?;
        let coordinate_b = Self::coordinate(&base_b, bodies, body_d, body_b)?;

        Ok(Self {
            body_a,
            body_b,
            body_c,
            body_d,
            collide_connected: def.collide_connected,
            joint1: def.joint1,
            joint2: def.joint2,
            base_a,
            base_b,
            ratio: def.ratio,
            constant: coordinate_a + def.ratio * coordinate_b,
            impulse: 0.0,
            index_a: 0,
            index_b: 0,
            index_c: 0,
            index_d: 0,
            lc_a: DVec2::ZERO,
            lc_b: DVec2::ZERO,
            lc_c: DVec2::ZERO,
            lc_d: DVec2::ZERO,
            m_a: 0.0,
            m_b: 0.0,
            m_c: 0.0,
            m_d: 0.0,
            i_a: 0.0,
            i_b: 0.0,
            i_c: 0.0,
            i_d: 0.0,
            jv_ac: DVec2::ZERO,
            jv_bd: DVec2::ZERO,
            jw_a: 0.0,
            jw_b: 0.0,
            jw_c: 0.0,
            jw_d: 0.0,
            mass: 0.0,
        })
    }

    fn extract_base(joint: &Joint) -> Result<(GearBase, EntityId, EntityId), PhysicsError> {
        match joint {
            Joint::Revolute(r) => Ok((
                GearBase::Revolute {
                    reference_angle: r.reference_angle,
                },
                r.body_a,
                r.body_b,
            )),
            Joint::Prismatic(p) => Ok((
                GearBase::Prismatic {
                    local_anchor_ground: p.local_anchor_a,
                    local_anchor_body: p.local_anchor_b,
                    local_axis: p.local_axis_a,
                },
                p.body_a,
                p.body_b,
            )),
            _ => Err(PhysicsError::InvalidArgument(
                "gear joints require revolute or prismatic joints",
            )),
        }
    }

    fn coordinate(
        base: &GearBase,
        bodies: &Arena<RigidBody>,
        ground: EntityId,
        body: EntityId,
    ) -> Result<f64, PhysicsError> {
        let ground = bodies
            .get(ground)
            .ok_or(PhysicsError::InvalidArgument("gear ground body missing"))?;
        let body = bodies
            .get(body)
            .ok_or(PhysicsError::InvalidArgument("gear body missing"))?;
        Ok(match base {
            GearBase::Revolute { reference_angle } => {
                body.sweep.a - ground.sweep.a - reference_angle
            }
            GearBase::Prismatic {
                local_anchor_ground,
                local_anchor_body,
                local_axis,
            } => {
                let p_ground = ground.transform.apply(*local_anchor_ground);
                let p_body = body.transform.apply(*local_anchor_body);
                let axis = ground.transform.q.apply(*local_axis);
                (p_body - p_ground).dot(axis)
            }
        })
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
        let c = body_ref(bodies, self.body_c);
        let d = body_ref(bodies, self.body_d);
        self.index_a = a.index;
        self.index_b = b.index;
        self.index_c = c.index;
        self.index_d = d.index;
        self.lc_a = a.local_center;
        self.lc_b = b.local_center;
        self.lc_c = c.local_center;
        self.lc_d = d.local_center;
        self.m_a = a.inv_mass;
        self.m_b = b.inv_mass;
        self.m_c = c.inv_mass;
        self.m_d = d.inv_mass;
        self.i_a = a.inv_i;
        self.i_b = b.inv_i;
        self.i_c = c.inv_i;
        self.i_d = d.inv_i;

        let pos_a = data.positions[self.index_a];
        let pos_b = data.positions[self.index_b];
        let pos_c = data.positions[self.index_c];
        let pos_d = data.positions[self.index_d];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);
        let qc = Rot::from_angle(pos_c.a);
        let qd = Rot::from_angle(pos_d.a);

        self.mass = 0.0;

        match self.base_a {
            GearBase::Revolute { .. } => {
                self.jv_ac = DVec2::ZERO;
                self.jw_a = 1.0;
                self.jw_c = 1.0;
                self.mass += self.i_a + self.i_c;
            }
            GearBase::Prismatic {
                local_anchor_ground,
                local_anchor_body,
                local_axis,
            } => {
                let u = qc.apply(local_axis);
                let rc = qc.apply(local_anchor_ground - self.lc_c);
                let ra = qa.apply(local_anchor_body - self.lc_a);
                self.jv_ac = u;
                self.jw_c = cross(rc, u);
                self.jw_a = cross(ra, u);
                self.mass += self.m_c
                    + self.m_a
                    + self.i_c * self.jw_c * self.jw_c
                    + self.i_a * self.jw_a * self.jw_a;
            }
        }

        match self.base_b {
            GearBase::Revolute { .. } => {
                self.jv_bd = DVec2::ZERO;
                self.jw_b = self.ratio;
                self.jw_d = self.ratio;
                self.mass += self.ratio * self.ratio * (self.i_b + self.i_d);
            }
            GearBase::Prismatic {
                local_anchor_ground,
                local_anchor_body,
                local_axis,
            } => {
                let u = qd.apply(local_axis);
                let rd = qd.apply(local_anchor_ground - self.lc_d);
                let rb = qb.apply(local_anchor_body - self.lc_b);
                self.jv_bd = self.ratio * u;
                self.jw_d = self.ratio * cross(rd, u);
                self.jw_b = self.ratio * cross(rb, u);
                self.mass += self.ratio * self.ratio * (self.m_d + self.m_b)
                    + self.i_d * self.jw_d * self.jw_d
                    + self.i_b * self.jw_b * self.jw_b;
            }
        }

        self.mass = if self.mass > 0.0 { 1.0 / self.mass } else { 0.0 };

        if data.step.warm_starting {
            self.apply_impulse(data, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    /// Indexed updates so a shared ground body (C == D) accumulates both
    /// contributions.
    fn apply_impulse(&self, data: &mut SolverData, impulse: f64) {
        data.velocities[self.index_a].v += self.m_a * impulse * self.jv_ac;
        data.velocities[self.index_a].w += self.i_a * impulse * self.jw_a;
        data.velocities[self.index_b].v += self.m_b * impulse * self.jv_bd;
        data.velocities[self.index_b].w += self.i_b * impulse * self.jw_b;
        data.velocities[self.index_c].v -= self.m_c * impulse * self.jv_ac;
        data.velocities[self.index_c].w -= self.i_c * impulse * self.jw_c;
        data.velocities[self.index_d].v -= self.m_d * impulse * self.jv_bd;
        data.velocities[self.index_d].w -= self.i_d * impulse * self.jw_d;
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let va = data.velocities[self.index_a];
        let vb = data.velocities[self.index_b];
        let vc = data.velocities[self.index_c];
        let vd = data.velocities[self.index_d];

        let c_dot = self.jv_ac.dot(va.v - vc.v) + self.jv_bd.dot(vb.v - vd.v)
            + self.jw_a * va.w
            - self.jw_c * vc.w
            + self.jw_b * vb.w
            - self.jw_d * vd.w;

        let impulse = -self.mass * c_dot;
        self.impulse += impulse;
        self.apply_impulse(data, impulse);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let pos_a = data.positions[self.index_a];
        let pos_b = data.positions[self.index_b];
        let pos_c = data.positions[self.index_c];
        let pos_d = data.positions[self.index_d];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);
        let qc = Rot::from_angle(pos_c.a);
        let qd = Rot::from_angle(pos_d.a);

        let mut mass = 0.0;
        let (jv_ac, jw_a, jw_c, coordinate_a) = match self.base_a {
            GearBase::Revolute { reference_angle } => {
                mass += self.i_a + self.i_c;
                (DVec2::ZERO, 1.0, 1.0, pos_a.a - pos_c.a - reference_angle)
            }
            GearBase::Prismatic {
                local_anchor_ground,
                local_anchor_body,
                local_axis,
            } => {
                let u = qc.apply(local_axis);
                let rc = qc.apply(local_anchor_ground - self.lc_c);
                let ra = qa.apply(local_anchor_body - self.lc_a);
                let jw_c = cross(rc, u);
                let jw_a = cross(ra, u);
                mass += self.m_c + self.m_a + self.i_c * jw_c * jw_c + self.i_a * jw_a * jw_a;
                let pc = pos_c.c + rc;
                let pa = pos_a.c + ra;
                (u, jw_a, jw_c, (pa - pc).dot(u))
            }
        };
        let (jv_bd, jw_b, jw_d, coordinate_b) = match self.base_b {
            GearBase::Revolute { reference_angle } => {
                mass += self.ratio * self.ratio * (self.i_b + self.i_d);
                (
                    DVec2::ZERO,
                    self.ratio,
                    self.ratio,
                    pos_b.a - pos_d.a - reference_angle,
                )
            }
            GearBase::Prismatic {
                local_anchor_ground,
                local_anchor_body,
                local_axis,
            } => {
                let u = qd.apply(local_axis);
                let rd = qd.apply(local_anchor_ground - self.lc_d);
                let rb = qb.apply(local_anchor_body - self.lc_b);
                let jw_d = self.ratio * cross(rd, u);
                let jw_b = self.ratio * cross(rb, u);
                mass += self.ratio * self.ratio * (self.m_d + self.m_b)
                    + self.i_d * jw_d * jw_d
                    + self.i_b * jw_b * jw_b;
                let pd = pos_d.c + rd;
                let pb = pos_b.c + rb;
                (self.ratio * u, jw_b, jw_d, (pb - pd).dot(u))
            }
        };

        let c = coordinate_a + self.ratio * coordinate_b - self.constant;
        let impulse = if mass > 0.0 { -c / mass } else { 0.0 };

        data.positions[self.index_a].c += self.m_a * impulse * jv_ac;
        data.positions[self.index_a].a += self.i_a * impulse * jw_a;
        data.positions[self.index_b].c += self.m_b * impulse * jv_bd;
        data.positions[self.index_b].a += self.i_b * impulse * jw_b;
        data.positions[self.index_c].c -= self.m_c * impulse * jv_ac;
        data.positions[self.index_c].a -= self.i_c * impulse * jw_c;
        data.positions[self.index_d].c -= self.m_d * impulse * jv_bd;
        data.positions[self.index_d].a -= self.i_d * impulse * jw_d;

        // The coupled coordinate drifts slowly; the geared joints carry
        // their own positional correction.
        true
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * self.impulse * self.jv_ac
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse * self.jw_a
    }
}
