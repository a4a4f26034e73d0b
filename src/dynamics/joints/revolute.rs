//! Revolute joint: pins two bodies at a shared point, with an optional
//! motor and angular limits.

use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION};
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, solve22, solve22_of33, solve33, LimitState, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, cross_sv, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevoluteJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    /// `angle_b - angle_a` at rest.
    pub reference_angle: f64,
    pub enable_limit: bool,
    pub lower_angle: f64,
    pub upper_angle: f64,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_torque: f64,
}

impl RevoluteJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) reference_angle: f64,

    pub(crate) enable_limit: bool,
    pub(crate) lower_angle: f64,
    pub(crate) upper_angle: f64,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f64,
    pub(crate) max_motor_torque: f64,

    /// (point x, point y, limit) accumulated impulse.
    impulse: DVec3,
    motor_impulse: f64,
    limit_state: LimitState,

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
    mass: DMat3,
    motor_mass: f64,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: DVec3::ZERO,
            motor_impulse: 0.0,
            limit_state: LimitState::Inactive,
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
            mass: DMat3::ZERO,
            motor_mass: 0.0,
        }
    }

    pub fn motor_speed(&self) -> f64 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_torque(&mut self, torque: f64) {
        self.max_motor_torque = torque;
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
    }

    pub fn enable_limit(&mut self, enable: bool) {
        if enable != self.enable_limit {
            self.enable_limit = enable;
            self.impulse.z = 0.0;
        }
    }

    pub fn set_limits(&mut self, lower: f64, upper: f64) {
        debug_assert!(lower <= upper);
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
    }

    pub fn motor_torque(&self, inv_dt: f64) -> f64 {
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

        self.ra = qa.apply(self.local_anchor_a - self.local_center_a);
        self.rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);
        let fixed_rotation = ia + ib == 0.0;

        self.mass = DMat3::from_cols(
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

        self.motor_mass = ia + ib;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = pos_b.a - pos_a.a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = DVec2::new(self.impulse.x, self.impulse.y);
            data.velocities[self.index_a].v -= ma * p;
            data.velocities[self.index_a].w -=
                ia * (cross(self.ra, p) + self.motor_impulse + self.impulse.z);
            data.velocities[self.index_b].v += mb * p;
            data.velocities[self.index_b].w +=
                ib * (cross(self.rb, p) + self.motor_impulse + self.impulse.z);
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
        let fixed_rotation = ia + ib == 0.0;

        // Motor
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let c_dot = vb.w - va.w - self.motor_speed;
            let mut impulse = -self.motor_mass * c_dot;
            let old_impulse = self.motor_impulse;
            let max_impulse = self.max_motor_torque * data.step.dt;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            va.w -= ia * impulse;
            vb.w += ib * impulse;
        }

        // Limit
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let c_dot1 = vb.v + cross_sv(vb.w, self.rb) - va.v - cross_sv(va.w, self.ra);
            let c_dot2 = vb.w - va.w;
            let c_dot = DVec3::new(c_dot1.x, c_dot1.y, c_dot2);
            let mut impulse = -solve33(self.mass, c_dot);

            match self.limit_state {
                LimitState::Equal => {
                    self.impulse += impulse;
                }
                LimitState::AtLower => {
                    let new_impulse = self.impulse.z + impulse.z;
                    if new_impulse < 0.0 {
                        let rhs = -c_dot1
                            + self.impulse.z * DVec2::new(self.mass.z_axis.x, self.mass.z_axis.y);
                        let reduced = solve22_of33(self.mass, rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    if new_impulse > 0.0 {
                        let rhs = -c_dot1
                            + self.impulse.z * DVec2::new(self.mass.z_axis.x, self.mass.z_axis.y);
                        let reduced = solve22_of33(self.mass, rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => unreachable!(),
            }

            let p = DVec2::new(impulse.x, impulse.y);
            va.v -= ma * p;
            va.w -= ia * (cross(self.ra, p) + impulse.z);
            vb.v += mb * p;
            vb.w += ib * (cross(self.rb, p) + impulse.z);
        } else {
            // Point-to-point only.
            let c_dot = vb.v + cross_sv(vb.w, self.rb) - va.v - cross_sv(va.w, self.ra);
            let k = glam::DMat2::from_cols(
                DVec2::new(self.mass.x_axis.x, self.mass.x_axis.y),
                DVec2::new(self.mass.y_axis.x, self.mass.y_axis.y),
            );
            let impulse = solve22(k, -c_dot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            va.v -= ma * impulse;
            va.w -= ia * cross(self.ra, impulse);
            vb.v += mb * impulse;
            vb.w += ib * cross(self.rb, impulse);
        }

        data.velocities[self.index_a] = va;
        data.velocities[self.index_b] = vb;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[self.index_a];
        let mut pos_b = data.positions[self.index_b];
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);
        let fixed_rotation = ia + ib == 0.0;

        let mut angular_error = 0.0;

        // Limit correction.
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let mut limit_impulse = 0.0;

            match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle)
                        .clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
                    limit_impulse = -self.motor_mass * c;
                    angular_error = c.abs();
                }
                LimitState::AtLower => {
                    let mut c = angle - self.lower_angle;
                    angular_error = -c;
                    c = (c + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0);
                    limit_impulse = -self.motor_mass * c;
                }
                LimitState::AtUpper => {
                    let mut c = angle - self.upper_angle;
                    angular_error = c;
                    c = (c - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION);
                    limit_impulse = -self.motor_mass * c;
                }
                LimitState::Inactive => unreachable!(),
            }

            pos_a.a -= ia * limit_impulse;
            pos_b.a += ib * limit_impulse;
        }

        // Point correction.
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);
        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);

        let c = pos_b.c + rb - pos_a.c - ra;
        let position_error = c.length();

        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let k = glam::DMat2::from_cols(
            DVec2::new(
                ma + mb + ia * ra.y * ra.y + ib * rb.y * rb.y,
                -ia * ra.x * ra.y - ib * rb.x * rb.y,
            ),
            DVec2::new(
                -ia * ra.x * ra.y - ib * rb.x * rb.y,
                ma + mb + ia * ra.x * ra.x + ib * rb.x * rb.x,
            ),
        );
        let impulse = -solve22(k, c);

        pos_a.c -= ma * impulse;
        pos_a.a -= ia * cross(ra, impulse);
        pos_b.c += mb * impulse;
        pos_b.a += ib * cross(rb, impulse);

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
