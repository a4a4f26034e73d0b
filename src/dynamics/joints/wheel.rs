//! Wheel joint: a prismatic suspension axis with a spring/damper, plus a
//! rotational motor. The standard vehicle suspension constraint.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::LINEAR_SLOP;
use crate::core::rigidbody::RigidBody;
use crate::dynamics::joints::{body_ref, SolverData};
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::math::{cross, Rot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelJointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub collide_connected: bool,
    pub local_anchor_a: DVec2,
    pub local_anchor_b: DVec2,
    /// Suspension travel axis in body A's frame, unit length.
    pub local_axis_a: DVec2,
    pub enable_motor: bool,
    pub motor_speed: f64,
    pub max_motor_torque: f64,
    /// Suspension spring frequency; zero locks the axis.
    pub frequency_hz: f64,
    pub damping_ratio: f64,
}

impl WheelJointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, axis: DVec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: DVec2::ZERO,
            local_anchor_b: DVec2::ZERO,
            local_axis_a: axis.normalize(),
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            frequency_hz: 2.0,
            damping_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WheelJoint {
    pub(crate) body_a: EntityId,
    pub(crate) body_b: EntityId,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: DVec2,
    pub(crate) local_anchor_b: DVec2,
    pub(crate) local_axis_a: DVec2,
    pub(crate) local_perp_a: DVec2,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f64,
    pub(crate) max_motor_torque: f64,
    pub(crate) frequency_hz: f64,
    pub(crate) damping_ratio: f64,

    impulse: f64,
    motor_impulse: f64,
    spring_impulse: f64,

    index_a: usize,
    index_b: usize,
    local_center_a: DVec2,
    local_center_b: DVec2,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    ax: DVec2,
    ay: DVec2,
    s_ax: f64,
    s_bx: f64,
    s_ay: f64,
    s_by: f64,
    mass: f64,
    motor_mass: f64,
    spring_mass: f64,
    bias: f64,
    gamma: f64,
}

impl WheelJoint {
    pub(crate) fn new(def: &WheelJointDef) -> Self {
        let local_axis_a = def.local_axis_a.normalize();
        Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_axis_a,
            local_perp_a: DVec2::new(-local_axis_a.y, local_axis_a.x),
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            motor_impulse: 0.0,
            spring_impulse: 0.0,
            index_a: 0,
            index_b: 0,
            local_center_a: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            ax: DVec2::ZERO,
            ay: DVec2::ZERO,
            s_ax: 0.0,
            s_bx: 0.0,
            s_ay: 0.0,
            s_by: 0.0,
            mass: 0.0,
            motor_mass: 0.0,
            spring_mass: 0.0,
            bias: 0.0,
            gamma: 0.0,
        }
    }

    pub fn set_motor_speed(&mut self, speed: f64) {
        self.motor_speed = speed;
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
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

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let d = pos_b.c + rb - pos_a.c - ra;

        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        // Point constraint perpendicular to the axis.
        self.ay = qa.apply(self.local_perp_a);
        self.s_ay = cross(d + ra, self.ay);
        self.s_by = cross(rb, self.ay);

        self.mass = ma + mb + ia * self.s_ay * self.s_ay + ib * self.s_by * self.s_by;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        // Suspension spring along the axis.
        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;
        if self.frequency_hz > 0.0 {
            self.ax = qa.apply(self.local_axis_a);
            self.s_ax = cross(d + ra, self.ax);
            self.s_bx = cross(rb, self.ax);

            let inv_mass = ma + mb + ia * self.s_ax * self.s_ax + ib * self.s_bx * self.s_bx;
            if inv_mass > 0.0 {
                self.spring_mass = 1.0 / inv_mass;

                let c = d.dot(self.ax);
                let omega = 2.0 * std::f64::consts::PI * self.frequency_hz;
                let damp = 2.0 * self.spring_mass * self.damping_ratio * omega;
                let k = self.spring_mass * omega * omega;

                let h = data.step.dt;
                self.gamma = h * (damp + h * k);
                if self.gamma > 0.0 {
                    self.gamma = 1.0 / self.gamma;
                }
                self.bias = c * h * k * self.gamma;

                self.spring_mass = inv_mass + self.gamma;
                if self.spring_mass > 0.0 {
                    self.spring_mass = 1.0 / self.spring_mass;
                }
            }
        } else {
            self.spring_impulse = 0.0;
        }

        // Rotational motor.
        if self.enable_motor {
            self.motor_mass = ia + ib;
            if self.motor_mass > 0.0 {
                self.motor_mass = 1.0 / self.motor_mass;
            }
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.spring_impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.impulse * self.ay + self.spring_impulse * self.ax;
            let la = self.impulse * self.s_ay + self.spring_impulse * self.s_ax + self.motor_impulse;
            let lb = self.impulse * self.s_by + self.spring_impulse * self.s_bx + self.motor_impulse;

            data.velocities[self.index_a].v -= ma * p;
            data.velocities[self.index_a].w -= ia * la;
            data.velocities[self.index_b].v += mb * p;
            data.velocities[self.index_b].w += ib * lb;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
            self.motor_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let mut va = data.velocities[self.index_a];
        let mut vb = data.velocities[self.index_b];
        let (ma, mb) = (self.inv_mass_a, self.inv_mass_b);
        let (ia, ib) = (self.inv_i_a, self.inv_i_b);

        // Spring.
        {
            let c_dot = self.ax.dot(vb.v - va.v) + self.s_bx * vb.w - self.s_ax * va.w;
            let impulse =
                -self.spring_mass * (c_dot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = impulse * self.ax;
            va.v -= ma * p;
            va.w -= ia * impulse * self.s_ax;
            vb.v += mb * p;
            vb.w += ib * impulse * self.s_bx;
        }

        // Motor.
        {
            let c_dot = vb.w - va.w - self.motor_speed;
            let mut impulse = -self.motor_mass * c_dot;

            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (self.motor_impulse + impulse).clamp(-max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            va.w -= ia * impulse;
            vb.w += ib * impulse;
        }

        // Perpendicular point constraint.
        {
            let c_dot = self.ay.dot(vb.v - va.v) + self.s_by * vb.w - self.s_ay * va.w;
            let impulse = -self.mass * c_dot;
            self.impulse += impulse;

            let p = impulse * self.ay;
            va.v -= ma * p;
            va.w -= ia * impulse * self.s_ay;
            vb.v += mb * p;
            vb.w += ib * impulse * self.s_by;
        }

        data.velocities[self.index_a] = va;
        data.velocities[self.index_b] = vb;
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[self.index_a];
        let mut pos_b = data.positions[self.index_b];
        let qa = Rot::from_angle(pos_a.a);
        let qb = Rot::from_angle(pos_b.a);

        let ra = qa.apply(self.local_anchor_a - self.local_center_a);
        let rb = qb.apply(self.local_anchor_b - self.local_center_b);
        let d = pos_b.c + rb - pos_a.c - ra;

        let ay = qa.apply(self.local_perp_a);
        let s_ay = cross(d + ra, ay);
        let s_by = cross(rb, ay);

        let c = d.dot(ay);

        let k = self.inv_mass_a
            + self.inv_mass_b
            + self.inv_i_a * self.s_ay * self.s_ay
            + self.inv_i_b * self.s_by * self.s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = impulse * ay;
        pos_a.c -= self.inv_mass_a * p;
        pos_a.a -= self.inv_i_a * impulse * s_ay;
        pos_b.c += self.inv_mass_b * p;
        pos_b.a += self.inv_i_b * impulse * s_by;

        data.positions[self.index_a] = pos_a;
        data.positions[self.index_b] = pos_b;

        c.abs() <= LINEAR_SLOP
    }

    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        inv_dt * (self.impulse * self.ay + self.spring_impulse * self.ax)
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        inv_dt * self.motor_impulse
    }
}
