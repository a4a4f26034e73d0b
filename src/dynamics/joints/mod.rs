//! Joints: constraints between body pairs solved by sequential impulses.
//!
//! Every joint implements the same three-phase protocol the contact
//! solver uses: `init_velocity_constraints` caches effective masses and
//! scales warm-start impulses by the step ratio,
//! `solve_velocity_constraints` clamps and applies impulses, and
//! `solve_position_constraints` corrects positional drift, reporting
//! convergence.

pub mod distance;
pub mod friction;
pub mod gear;
pub mod motor;
pub mod mouse;
pub mod prismatic;
pub mod pulley;
pub mod revolute;
pub mod rope;
pub mod weld;
pub mod wheel;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use motor::{MotorJoint, MotorJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use rope::{RopeJoint, RopeJointDef};
pub use weld::{WeldJoint, WeldJointDef};
pub use wheel::{WheelJoint, WheelJointDef};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::core::rigidbody::RigidBody;
use crate::dynamics::{Position, TimeStep, Velocity};
use crate::utils::allocator::{Arena, EntityId};

/// Scratch the joints solve against: island-local poses and velocities.
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Limit constraint state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower == upper: the limit acts as an equality constraint.
    Equal,
}

/// Island-view of one body, captured at constraint-init time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyRef {
    pub index: usize,
    pub local_center: DVec2,
    pub inv_mass: f64,
    pub inv_i: f64,
}

pub(crate) fn body_ref(bodies: &Arena<RigidBody>, id: EntityId) -> BodyRef {
    let body = bodies.get(id).expect("joint references a destroyed body");
    BodyRef {
        index: body.island_index,
        local_center: body.sweep.local_center,
        inv_mass: body.inv_mass,
        inv_i: body.inv_inertia,
    }
}

/// Solves `K x = b` for a 2x2 system, returning zero on a singular
/// matrix so a degenerate effective mass yields no impulse.
pub(crate) fn solve22(k: glam::DMat2, b: DVec2) -> DVec2 {
    let mut det = k.determinant();
    if det != 0.0 {
        det = 1.0 / det;
    }
    DVec2::new(
        det * (k.y_axis.y * b.x - k.y_axis.x * b.y),
        det * (k.x_axis.x * b.y - k.x_axis.y * b.x),
    )
}

/// Solves `K x = b` for a 3x3 system (columns ex/ey/ez), zero impulse on
/// singularity.
pub(crate) fn solve33(k: glam::DMat3, b: glam::DVec3) -> glam::DVec3 {
    let mut det = k.x_axis.dot(k.y_axis.cross(k.z_axis));
    if det != 0.0 {
        det = 1.0 / det;
    }
    glam::DVec3::new(
        det * b.dot(k.y_axis.cross(k.z_axis)),
        det * k.x_axis.dot(b.cross(k.z_axis)),
        det * k.x_axis.dot(k.y_axis.cross(b)),
    )
}

/// Solves against the top-left 2x2 block of a 3x3 system.
pub(crate) fn solve22_of33(k: glam::DMat3, b: DVec2) -> DVec2 {
    let a11 = k.x_axis.x;
    let a12 = k.y_axis.x;
    let a21 = k.x_axis.y;
    let a22 = k.y_axis.y;
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    DVec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Construction options for every joint kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
    Pulley(PulleyJointDef),
    Gear(GearJointDef),
    Mouse(MouseJointDef),
    Friction(FrictionJointDef),
    Rope(RopeJointDef),
    Wheel(WheelJointDef),
    Motor(MotorJointDef),
}

macro_rules! each_joint {
    ($self:expr, $j:ident => $body:expr) => {
        match $self {
            Joint::Distance($j) => $body,
            Joint::Revolute($j) => $body,
            Joint::Prismatic($j) => $body,
            Joint::Weld($j) => $body,
            Joint::Pulley($j) => $body,
            Joint::Gear($j) => $body,
            Joint::Mouse($j) => $body,
            Joint::Friction($j) => $body,
            Joint::Rope($j) => $body,
            Joint::Wheel($j) => $body,
            Joint::Motor($j) => $body,
        }
    };
}

/// Tagged union over the eleven joint kinds.
#[derive(Debug, Clone)]
pub enum Joint {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Pulley(PulleyJoint),
    Gear(GearJoint),
    Mouse(MouseJoint),
    Friction(FrictionJoint),
    Rope(RopeJoint),
    Wheel(WheelJoint),
    Motor(MotorJoint),
}

impl Joint {
    /// Builds a joint from its def. Gear joints need the referenced
    /// joints resolved and go through the world instead.
    pub(crate) fn from_def(def: &JointDef) -> Option<Self> {
        Some(match def {
            JointDef::Distance(d) => Joint::Distance(DistanceJoint::new(d)),
            JointDef::Revolute(d) => Joint::Revolute(RevoluteJoint::new(d)),
            JointDef::Prismatic(d) => Joint::Prismatic(PrismaticJoint::new(d)),
            JointDef::Weld(d) => Joint::Weld(WeldJoint::new(d)),
            JointDef::Pulley(d) => Joint::Pulley(PulleyJoint::new(d)),
            JointDef::Gear(_) => return None,
            JointDef::Mouse(d) => Joint::Mouse(MouseJoint::new(d)),
            JointDef::Friction(d) => Joint::Friction(FrictionJoint::new(d)),
            JointDef::Rope(d) => Joint::Rope(RopeJoint::new(d)),
            JointDef::Wheel(d) => Joint::Wheel(WheelJoint::new(d)),
            JointDef::Motor(d) => Joint::Motor(MotorJoint::new(d)),
        })
    }

    pub fn bodies(&self) -> (EntityId, EntityId) {
        each_joint!(self, j => (j.body_a, j.body_b))
    }

    /// Rebuilds a def describing this joint's configuration (accumulated
    /// impulses are not carried).
    pub fn to_def(&self) -> JointDef {
        match self {
            Joint::Distance(j) => JointDef::Distance(DistanceJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                length: j.length,
                frequency_hz: j.frequency_hz,
                damping_ratio: j.damping_ratio,
            }),
            Joint::Revolute(j) => JointDef::Revolute(RevoluteJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                reference_angle: j.reference_angle,
                enable_limit: j.enable_limit,
                lower_angle: j.lower_angle,
                upper_angle: j.upper_angle,
                enable_motor: j.enable_motor,
                motor_speed: j.motor_speed,
                max_motor_torque: j.max_motor_torque,
            }),
            Joint::Prismatic(j) => JointDef::Prismatic(PrismaticJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                local_axis_a: j.local_axis_a,
                reference_angle: j.reference_angle,
                enable_limit: j.enable_limit,
                lower_translation: j.lower_translation,
                upper_translation: j.upper_translation,
                enable_motor: j.enable_motor,
                motor_speed: j.motor_speed,
                max_motor_force: j.max_motor_force,
            }),
            Joint::Weld(j) => JointDef::Weld(WeldJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                reference_angle: j.reference_angle,
                frequency_hz: j.frequency_hz,
                damping_ratio: j.damping_ratio,
            }),
            Joint::Pulley(j) => JointDef::Pulley(PulleyJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                ground_anchor_a: j.ground_anchor_a,
                ground_anchor_b: j.ground_anchor_b,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                length_a: j.length_a,
                length_b: j.length_b,
                ratio: j.ratio,
            }),
            Joint::Gear(j) => JointDef::Gear(GearJointDef {
                joint1: j.joint1,
                joint2: j.joint2,
                ratio: j.ratio,
                collide_connected: j.collide_connected,
            }),
            Joint::Mouse(j) => JointDef::Mouse(MouseJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                target: j.target,
                local_anchor_b: j.local_anchor_b,
                max_force: j.max_force,
                frequency_hz: j.frequency_hz,
                damping_ratio: j.damping_ratio,
            }),
            Joint::Friction(j) => JointDef::Friction(FrictionJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                max_force: j.max_force,
                max_torque: j.max_torque,
            }),
            Joint::Rope(j) => JointDef::Rope(RopeJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                max_length: j.max_length,
            }),
            Joint::Wheel(j) => JointDef::Wheel(WheelJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                local_anchor_a: j.local_anchor_a,
                local_anchor_b: j.local_anchor_b,
                local_axis_a: j.local_axis_a,
                enable_motor: j.enable_motor,
                motor_speed: j.motor_speed,
                max_motor_torque: j.max_motor_torque,
                frequency_hz: j.frequency_hz,
                damping_ratio: j.damping_ratio,
            }),
            Joint::Motor(j) => JointDef::Motor(MotorJointDef {
                body_a: j.body_a,
                body_b: j.body_b,
                collide_connected: j.collide_connected,
                linear_offset: j.linear_offset,
                angular_offset: j.angular_offset,
                max_force: j.max_force,
                max_torque: j.max_torque,
                correction_factor: j.correction_factor,
            }),
        }
    }

    pub fn collide_connected(&self) -> bool {
        each_joint!(self, j => j.collide_connected)
    }

    /// Extra bodies the joint couples beyond its primary pair (gear
    /// joints reference the ground bodies of their geared joints).
    pub fn auxiliary_bodies(&self) -> Option<(EntityId, EntityId)> {
        match self {
            Joint::Gear(g) => Some((g.body_c, g.body_d)),
            _ => None,
        }
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        bodies: &Arena<RigidBody>,
    ) {
        each_joint!(self, j => j.init_velocity_constraints(data, bodies))
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        each_joint!(self, j => j.solve_velocity_constraints(data))
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        each_joint!(self, j => j.solve_position_constraints(data))
    }

    /// Reaction force on body B at the anchor, `inv_dt`-scaled from the
    /// accumulated impulse.
    pub fn reaction_force(&self, inv_dt: f64) -> DVec2 {
        each_joint!(self, j => j.reaction_force(inv_dt))
    }

    pub fn reaction_torque(&self, inv_dt: f64) -> f64 {
        each_joint!(self, j => j.reaction_torque(inv_dt))
    }
}
