//! Prismatic joint: allows translation along one axis while locking
//! rotation, with optional limits and a drive motor.

use glam::{DMat2, DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::{ANGULAR_SLOP, LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, solve22, solve22_of33, solve33, LimitState, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrismaticJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    /// Translation axis in body A's frame, unit length.
    pub local_axis_a: DVec2,
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_translation: f64,
    pub upper_translation: f64,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_force: f64,
}

impl PrismaticJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, axis: DVec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            local_axis_a: axis.normalize(),
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) local_axis_a: DVec2,
    pub(crate) local_perp_a: DVec2,
    pub(crate) reference_angle: f64,

    pub(crate) enable_limit: bool,
    pub(crate) lower_translation: f64,
    pub(crate) upper_translation: f64,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f64,
    pub(crate) max_motor_force: f64,

    /// (perpendicular, angular, axial-limit) accumulated impulse.
    impulse: DVec3,
    motor_impulse: f64,
    limit_state: LimitState,

    index_a: usize,
    index_b: usize,
    local_center_a: DVec2,
    local_center_b: DVec2,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    axis: DVec2,
    perp: DVec2,
    s1: f64,
    s2: f64,
    a1: f64,
    a2: f64,
    k: DMat3,
    motor_mass: f64,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let local_axis_a = def.local_axis_a.normalize();
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_axis_a,
            local_perp_a: DVec2::new(-local_axis_a.y, local_axis_a.x),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            impulse: DVec3::ZERO,
            motor_impulse: 0.0,
            limit_state: LimitState::Inactive,
            index_a: 0,
            index_b: 0,
            local_center_a: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            axis: DVec2::ZERO,
            perp: DVec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: DMat3::ZERO,
            motor_mass: 0.0,
        }
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) {
        debug_assert!(lower <= upper);
        if lower != self.lower_translation || upper != self.upper_translation {
            self.impulse.z = 0.0;
            self.lower_translation = lower;
            self.upper_translation = upper;
        }
    }

    pub fn motor_force(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
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

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let d = pos_b.c + rb - pos_a.c - ra;

        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        // Axial (motor/limit) row.
        self.axis = qa.apply(self.local_axis_a);
        self.a1 = cross(d + ra, self.axis);
        self.a2 = cross(rb, self.axis);
        self.motor_mass = ma + mb + ia * self.a1 * self.a1 + ib * self.a2 * self.a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        // Perpendicular + angular rows.
        self.perp = qa.apply(self.local_perp_a);
        self.s1 = cross(d + ra, self.perp);
        self.s2 = cross(rb, self.perp);

        let k11 = ma + mb + ia * self.s1 * self.s1 + ib * self.s2 * self.s2;
        let k12 = ia * self.s1 + ib * self.s2;
        let k13 = ia * self.s1 * self.a1 + ib * self.s2 * self.a2;
        let mut k22 = ia + ib;
        if k22 == 0.0 {
            // Both bodies have fixed rotation; the angular row is free.
            k22 = 1.0;
        }
        let k23 = ia * self.a1 + ib * self.a2;
        let k33 = ma + mb + ia * self.a1 * self.a1 + ib * self.a2 * self.a2;

        self.k = DMat3::from_cols(
            DVec3::new(k11, k12, k13),
            DVec3::new(k12, k22, k23),
            DVec3::new(k13, k23, k33),
        );

        if self.enable_limit {
            let translation = self.axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.impulse.x * self.perp + (self.motor_impulse + self.impulse.z) * self.axis;
            let l1 = self.impulse.x * self.s1
                + self.impulse.y
                + (self.motor_impulse + self.impulse.z) * self.a1;
            let l2 = self.impulse.x * self.s2
                + self.impulse.y
                + (self.motor_impulse + self.impulse.z) * self.a2;

            data.velocities[self.index_a].v -= ma * p;
            data.velocities[self.index_a].w -= ia * l1;
            data.velocities[self.index_b].v += mb * p;
            data.velocities[self.index_b].w += ib * l2;
        } else {
            self.impulse = DVec3::ZERO;
            self.motor_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut va = data.velocities[self.index_a];
        let mut vb = data.velocities[self.index_b];
        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        // Motor along the axis.
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let c_dot = self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w;
            let mut impulse = self.motor_mass * (self.motor_speed - c_dot);
            let old_impulse = self.motor_impulse;
            let max_impulse = self.max_motor_force * data.step.dt;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            let p = impulse * self.axis;
            va.v -= ma * p;
            va.w -= ia * impulse * self.a1;
            vb.v += mb * p;
            vb.w += ib * impulse * self.a2;
        }

        let c_dot1 = DVec2::new(
            self.perp.dot(vb.v - va.v) + self.s2 * vb.w - self.s1 * va.w,
            vb.w - va.w,
        );

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let c_dot2 = self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w;
            let c_dot = DVec3::new(c_dot1.x, c_dot1.y, c_dot2);
            let mut df = -solve33(self.k, c_dot);

            match self.limit_state {
                LimitState::Equal => {
                    self.impulse += df;
                }
                LimitState::AtLower => {
                    let new_impulse = self.impulse.z + df.z;
                    if new_impulse < 0.0 {
                        let rhs = -c_dot1
                            + self.impulse.z * DVec2::new(self.k.z_axis.x, self.k.z_axis.y);
                        let reduced = solve22_of33(self.k, rhs);
                        df.x = reduced.x;
                        df.y = reduced.y;
                        df.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += df;
                    }
                }
                LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + df.z;
                    if new_impulse > 0.0 {
                        let rhs = -c_dot1
                            + self.impulse.z * DVec2::new(self.k.z_axis.x, self.k.z_axis.y);
                        let reduced = solve22_of33(self.k, rhs);
                        df.x = reduced.x;
                        df.y = reduced.y;
                        df.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += df;
                    }
                }
                LimitState::Inactive => unreachable!(),
            }

            let p = df.x * self.perp + df.z * self.axis;
            let l1 = df.x * self.s1 + df.y + df.z * self.a1;
            let l2 = df.x * self.s2 + df.y + df.z * self.a2;

            va.v -= ma * p;
            va.w -= ia * l1;
            vb.v += mb * p;
            vb.w += ib * l2;
        } else {
            // Limit inactive: just the perpendicular + angular rows.
            let k = DMat2::from_cols(
                DVec2::new(self.k.x_axis.x, self.k.x_axis.y),
                DVec2::new(self.k.y_axis.x, self.k.y_axis.y),
            );
            let df = solve22(k, -c_dot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;

            let p = df.x * self.perp;
            let l1 = df.x * self.s1 + df.y;
            let l2 = df.x * self.s2 + df.y;

            va.v -= ma * p;
            va.w -= ia * l1;
            vb.v += mb * p;
            vb.w += ib * l2;
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

        // Fresh geometry at the corrected poses.
        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let d = pos_b.c + rb - pos_a.c - ra;

        let axis = qa.apply(self.local_axis_a);
        let a1 = cross(d + ra, axis);
        let a2 = cross(rb, axis);
        let perp = qa.apply(self.local_perp_a);
        let s1 = cross(d + ra, perp);
        let s2 = cross(rb, perp);

        let c1 = DVec2::new(perp.dot(d), pos_b.a - pos_a.a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                c2 = translation.clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation + LINEAR_SLOP)
                    .clamp(-MAX_LINEAR_CORRECTION, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP)
                    .clamp(0.0, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse = if active {
            let k11 = ma + mb + ia * s1 * s1 + ib * s2 * s2;
            let k12 = ia * s1 + ib * s2;
            let k13 = ia * s1 * a1 + ib * s2 * a2;
            let mut k22 = ia + ib;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k23 = ia * a1 + ib * a2;
            let k33 = ma + mb + ia * a1 * a1 + ib * a2 * a2;
            let k = DMat3::from_cols(
                DVec3::new(k11, k12, k13),
                DVec3::new(k12, k22, k23),
                DVec3::new(k13, k23, k33),
            );
            -solve33(k, DVec3::new(c1.x, c1.y, c2))
        } else {
            let k11 = ma + mb + ia * s1 * s1 + ib * s2 * s2;
            let k12 = ia * s1 + ib * s2;
            let mut k22 = ia + ib;
            if k22 == 0.0 {
                k22 = 1.0;
            }
            let k = DMat2::from_cols(DVec2::new(k11, k12), DVec2::new(k12, k22));
            let impulse1 = -solve22(k, c1);
            DVec3::new(impulse1.x, impulse1.y, 0.0)
        };

        let p = impulse.x * perp + impulse.z * axis;
        let l1 = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l2 = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.c -= ma * p;
        pos_a.a -= ia * l1;
        pos_b.c += mb * p;
        pos_b.a += ib * l2;

        data.positions[self.index_a] = pos_a;
        data.positions[self.index_b] = pos_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * (self.impulse.x * self.perp + (self.motor_impulse + self.impulse.z) * self.axis)
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.impulse.y
    }
}
