//! Global tuning constants for the Planar Accelerator engine.
//!
//! Lengths are in meters, angles in radians. The solver constants follow
//! the usual sequential-impulse conventions; they are meant to be tuned
//! together, not individually.

use std::f64::consts::PI;

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f64; 2] = [0.0, -9.81];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f64 = 1.0 / 60.0;

/// Default velocity iterations per solver pass.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;

/// Default position iterations per solver pass.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 3;

/// Collision slop: small allowed overlap that keeps contacts persistent.
pub const LINEAR_SLOP: f64 = 0.005;

/// Angular analog of [`LINEAR_SLOP`].
pub const ANGULAR_SLOP: f64 = 2.0 / 180.0 * PI;

/// Skin radius carried by polygon shapes so their cores stay separated.
pub const POLYGON_RADIUS: f64 = 2.0 * LINEAR_SLOP;

/// Margin added around leaf AABBs in the dynamic tree so small motions do
/// not force a reinsertion.
pub const AABB_EXTENSION: f64 = 0.1;

/// Displacement multiplier used to predict where a moving proxy is headed.
pub const AABB_MULTIPLIER: f64 = 2.0;

/// Maximum translation of a body per step; larger motions are clamped.
pub const MAX_TRANSLATION: f64 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f64 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step; larger motions are clamped.
pub const MAX_ROTATION: f64 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f64 = MAX_ROTATION * MAX_ROTATION;

/// Baumgarte factor for the discrete position corrector.
pub const BAUMGARTE: f64 = 0.2;

/// Baumgarte factor used inside TOI sub-steps.
pub const TOI_BAUMGARTE: f64 = 0.75;

/// Maximum position correction applied in a single iteration.
pub const MAX_LINEAR_CORRECTION: f64 = 0.2;

/// Maximum angular position correction applied in a single iteration.
pub const MAX_ANGULAR_CORRECTION: f64 = 8.0 / 180.0 * PI;

/// Relative approach speed below which restitution is ignored.
pub const VELOCITY_THRESHOLD: f64 = 1.0;

/// Seconds a body must stay still before it is put to sleep.
pub const TIME_TO_SLEEP: f64 = 0.5;

/// Linear speed below which a body is considered still.
pub const LINEAR_SLEEP_TOLERANCE: f64 = 0.01;

/// Angular speed below which a body is considered still.
pub const ANGULAR_SLEEP_TOLERANCE: f64 = 2.0 / 180.0 * PI;

/// Contact points carried by a manifold.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Vertex budget for convex polygons.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// GJK iteration cap.
pub const MAX_DISTANCE_ITERATIONS: u32 = 20;

/// Outer iteration cap for the time-of-impact solver.
pub const MAX_TOI_ITERATIONS: u32 = 20;

/// Root-finder iteration cap inside a single TOI axis.
pub const MAX_TOI_ROOT_ITERATIONS: u32 = 50;

/// Contacts considered when building a TOI mini-island.
pub const MAX_TOI_CONTACTS: usize = 32;

/// TOI sub-steps allowed per body per step.
pub const MAX_SUB_STEPS: u32 = 8;

/// Position iterations inside a TOI sub-step.
pub const TOI_POSITION_ITERATIONS: u32 = 20;
