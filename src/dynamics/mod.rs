//! Dynamics: persistent contacts, the sequential-impulse solvers, joints,
//! and island assembly.

pub mod contact;
pub mod contact_manager;
pub mod contact_solver;
pub mod island;
pub mod joints;

pub use contact::{Contact, ContactImpulse, ContactKey};
pub use contact_manager::{ContactFilter, ContactListener, ContactManager, DestructionListener};
pub use joints::{Joint, JointDef};

use glam::DVec2;

/// Per-step timing shared by every constraint solver.
#[derive(Debug, Clone, Copy)]
pub struct TimeStep {
    pub dt: f64,
    pub inv_dt: f64,
    /// dt / previous dt, used to scale warm-start impulses across
    /// variable steps.
    pub dt_ratio: f64,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

/// Island-local pose scratch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    pub c: DVec2,
    pub a: f64,
}

/// Island-local velocity scratch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity {
    pub v: DVec2,
    pub w: f64,
}
