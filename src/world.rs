//! The world: owns the body/collider/joint graph and the contact
//! manager, and orchestrates the step.
//!
//! Step pipeline: find new contacts → narrow phase refresh → island
//! solve (forces, velocity iterations, integration, position
//! iterations) → continuous TOI pass → proxy synchronization. The world
//! locks itself for the duration; destruction requested from inside
//! callbacks is queued and applied when the step ends.

mod snapshot;

pub use snapshot::{BodySnapshot, WorldSnapshot};

use std::time::Instant;

use glam::DVec2;
use log::debug;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::collision::distance::DistanceProxy;
use crate::collision::toi::{time_of_impact, ToiInput, ToiState};
use crate::config::{
    DEFAULT_GRAVITY, MAX_SUB_STEPS, MAX_TOI_CONTACTS, TOI_POSITION_ITERATIONS,
};
use crate::core::collider::{Collider, ColliderDef};
use crate::core::rigidbody::{BodyDef, BodyType, RigidBody};
use crate::dynamics::contact::{Contact, ContactKey};
use crate::dynamics::contact_manager::{
    ContactFilter, ContactListener, ContactManager, DefaultContactFilter, DestructionListener,
};
use crate::dynamics::island::Island;
use crate::dynamics::joints::{GearJoint, Joint, JointDef};
use crate::dynamics::TimeStep;
use crate::utils::allocator::{Arena, EntityId};
use crate::utils::logging::ScopedTimer;
use crate::utils::math::{Rot, Transform2};
use crate::utils::profiling::PhysicsProfiler;
use crate::PhysicsError;

/// One reported ray-cast intersection.
#[derive(Debug, Clone, Copy)]
pub struct RayCastHit {
    pub collider: EntityId,
    pub child_index: usize,
    pub point: DVec2,
    pub normal: DVec2,
    pub fraction: f64,
}

/// Central simulation container orchestrating all subsystems.
pub struct World {
    pub(crate) bodies: Arena<RigidBody>,
    pub(crate) colliders: Arena<Collider>,
    pub(crate) joints: Arena<Joint>,
    pub(crate) contact_manager: ContactManager,
    gravity: DVec2,
    allow_sleep: bool,
    continuous_physics: bool,
    warm_starting: bool,
    auto_clear_forces: bool,
    locked: bool,
    new_colliders: bool,
    inv_dt0: f64,
    listener: Option<Box<dyn ContactListener>>,
    destruction_listener: Option<Box<dyn DestructionListener>>,
    contact_filter: Box<dyn ContactFilter>,
    pending_destroy_bodies: Vec<EntityId>,
    pending_destroy_colliders: Vec<EntityId>,
    pending_destroy_joints: Vec<EntityId>,
    island: Island,
    pub profiler: PhysicsProfiler,
}

impl Default for World {
    fn default() -> Self {
        Self::new(DVec2::from(DEFAULT_GRAVITY))
    }
}

impl World {
    pub fn new(gravity: DVec2) -> Self {
        Self::builder().gravity(gravity).build()
    }

    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }
}

pub struct WorldBuilder {
    gravity: DVec2,
    allow_sleep: bool,
    continuous_physics: bool,
    warm_starting: bool,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            gravity: DVec2::from(DEFAULT_GRAVITY),
            allow_sleep: true,
            continuous_physics: true,
            warm_starting: true,
        }
    }

    pub fn gravity(mut self, gravity: DVec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn continuous_physics(mut self, continuous: bool) -> Self {
        self.continuous_physics = continuous;
        self
    }

    pub fn warm_starting(mut self, warm: bool) -> Self {
        self.warm_starting = warm;
        self
    }

    pub fn build(self) -> World {
        World {
            bodies: Arena::new(),
            colliders: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(),
            gravity: self.gravity,
            allow_sleep: self.allow_sleep,
            continuous_physics: self.continuous_physics,
            warm_starting: self.warm_starting,
            auto_clear_forces: true,
            locked: false,
            new_colliders: false,
            inv_dt0: 0.0,
            listener: None,
            destruction_listener: None,
            contact_filter: Box::new(DefaultContactFilter),
            pending_destroy_bodies: Vec::new(),
            pending_destroy_colliders: Vec::new(),
            pending_destroy_joints: Vec::new(),
            island: Island::default(),
            profiler: PhysicsProfiler::default(),
        }
    }
}

impl World {
    pub fn gravity(&self) -> DVec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: DVec2) {
        self.gravity = gravity;
    }

    pub fn set_allow_sleeping(&mut self, allow: bool) {
        if allow == self.allow_sleep {
            return;
        }
        self.allow_sleep = allow;
        if !allow {
            let ids = self.bodies.ids();
            for id in ids {
                if let Some(body) = self.bodies.get_mut(id) {
                    body.set_awake(true);
                }
            }
        }
    }

    pub fn set_continuous_physics(&mut self, continuous: bool) {
        self.continuous_physics = continuous;
    }

    pub fn set_warm_starting(&mut self, warm: bool) {
        self.warm_starting = warm;
    }

    pub fn set_auto_clear_forces(&mut self, auto_clear: bool) {
        self.auto_clear_forces = auto_clear;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_contact_listener<L: ContactListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn set_destruction_listener<L: DestructionListener + 'static>(&mut self, listener: L) {
        self.destruction_listener = Some(Box::new(listener));
    }

    pub fn set_contact_filter<F: ContactFilter + 'static>(&mut self, filter: F) {
        self.contact_filter = Box::new(filter);
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn body_ids(&self) -> Vec<EntityId> {
        self.bodies.ids()
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.colliders.get(id)
    }

    pub fn joint(&self, id: EntityId) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn joint_mut(&mut self, id: EntityId) -> Option<&mut Joint> {
        self.joints.get_mut(id)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contact_manager.contacts.values()
    }

    // ----- creation / destruction -----

    pub fn create_body(&mut self, def: &BodyDef) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if !def.is_valid() {
            return Err(PhysicsError::InvalidArgument(
                "body def carries non-finite or negative values",
            ));
        }
        Ok(self.bodies.insert(RigidBody::from_def(def)))
    }

    /// Destroys a body and everything attached to it: colliders (with
    /// their proxies), then contacts, then joints. Queued when called
    /// during a step.
    pub fn destroy_body(&mut self, id: EntityId) {
        if self.locked {
            self.pending_destroy_bodies.push(id);
            return;
        }
        if !self.bodies.contains(id) {
            return;
        }

        let collider_ids = self
            .bodies
            .get(id)
            .map(|b| b.colliders.clone())
            .unwrap_or_default();
        for collider_id in collider_ids {
            if let Some(listener) = self.destruction_listener.as_deref_mut() {
                listener.collider_destroyed(collider_id);
            }
            self.contact_manager
                .destroy_contacts_for_collider(collider_id, self.listener.as_deref_mut());
            if let Some(mut collider) = self.colliders.remove(collider_id) {
                collider.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        // Any contact whose collider lookup now dangles.
        self.contact_manager.destroy_contacts_for_body(
            id,
            &self.colliders,
            self.listener.as_deref_mut(),
        );

        let joint_ids: Vec<EntityId> = self
            .joints
            .iter()
            .filter(|(_, joint)| {
                let (a, b) = joint.bodies();
                a == id
                    || b == id
                    || joint
                        .auxiliary_bodies()
                        .is_some_and(|(c, d)| c == id || d == id)
            })
            .map(|(joint_id, _)| joint_id)
            .collect();
        for joint_id in joint_ids {
            self.destroy_joint(joint_id);
        }

        self.bodies.remove(id);
    }

    pub fn create_collider(
        &mut self,
        body: EntityId,
        def: &ColliderDef,
    ) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        def.validate()?;
        let transform = self
            .bodies
            .get(body)
            .ok_or(PhysicsError::InvalidArgument("collider requires a live body"))?
            .transform;

        let id = self.colliders.insert(Collider::from_def(body, def));
        let collider = self.colliders.get_mut(id).expect("fresh collider");
        collider.create_proxies(id, &mut self.contact_manager.broad_phase, &transform);

        let body_mut = self.bodies.get_mut(body).expect("checked above");
        body_mut.colliders.push(id);

        if def.density > 0.0 {
            self.reset_mass_data(body);
        }

        // New proxies mean new candidate pairs next step.
        self.new_colliders = true;
        Ok(id)
    }

    /// Destroys a collider, its broad-phase proxies, and its contacts.
    /// Queued when called during a step.
    pub fn destroy_collider(&mut self, id: EntityId) {
        if self.locked {
            self.pending_destroy_colliders.push(id);
            return;
        }
        let Some(body_id) = self.colliders.get(id).map(|c| c.body) else {
            return;
        };

        if let Some(listener) = self.destruction_listener.as_deref_mut() {
            listener.collider_destroyed(id);
        }

        self.contact_manager
            .destroy_contacts_for_collider(id, self.listener.as_deref_mut());

        if let Some(mut collider) = self.colliders.remove(id) {
            collider.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.colliders.retain(|&c| c != id);
        }
        self.reset_mass_data(body_id);
    }

    pub fn create_joint(&mut self, def: &JointDef) -> Result<EntityId, PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }

        let joint = match def {
            JointDef::Gear(gear_def) => {
                let joint1 = self
                    .joints
                    .get(gear_def.joint1)
                    .ok_or(PhysicsError::InvalidArgument("gear joint1 missing"))?;
                let joint2 = self
                    .joints
                    .get(gear_def.joint2)
                    .ok_or(PhysicsError::InvalidArgument("gear joint2 missing"))?;
                Joint::Gear(GearJoint::from_joints(gear_def, joint1, joint2, &self.bodies)?)
            }
            _ => Joint::from_def(def).expect("non-gear defs always build"),
        };

        let (body_a, body_b) = joint.bodies();
        if body_a == body_b {
            return Err(PhysicsError::InvalidArgument(
                "joint must connect two distinct bodies",
            ));
        }
        if !self.bodies.contains(body_a) || !self.bodies.contains(body_b) {
            return Err(PhysicsError::InvalidArgument(
                "joint references a destroyed body",
            ));
        }

        let collide_connected = joint.collide_connected();
        let id = self.joints.insert(joint);

        // Existing contacts between the pair must re-run the filter.
        if !collide_connected {
            self.contact_manager
                .mark_filter_dirty_pair(body_a, body_b, &self.colliders);
        }

        if let Some(body) = self.bodies.get_mut(body_a) {
            body.set_awake(true);
        }
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.set_awake(true);
        }

        Ok(id)
    }

    /// Destroys a joint, waking both bodies. Gear joints geared on this
    /// joint go first. Queued during a step.
    pub fn destroy_joint(&mut self, id: EntityId) {
        if self.locked {
            self.pending_destroy_joints.push(id);
            return;
        }

        let dependent_gears: Vec<EntityId> = self
            .joints
            .iter()
            .filter(|(_, joint)| match joint {
                Joint::Gear(gear) => gear.joint1 == id || gear.joint2 == id,
                _ => false,
            })
            .map(|(gear_id, _)| gear_id)
            .collect();
        for gear_id in dependent_gears {
            self.destroy_joint(gear_id);
        }

        let Some(joint) = self.joints.remove(id) else {
            return;
        };
        if let Some(listener) = self.destruction_listener.as_deref_mut() {
            listener.joint_destroyed(id);
        }
        let (body_a, body_b) = joint.bodies();
        if let Some(body) = self.bodies.get_mut(body_a) {
            body.set_awake(true);
        }
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.set_awake(true);
        }
    }

    fn flush_pending_destruction(&mut self) {
        debug_assert!(!self.locked);
        let joints = std::mem::take(&mut self.pending_destroy_joints);
        for id in joints {
            self.destroy_joint(id);
        }
        let colliders = std::mem::take(&mut self.pending_destroy_colliders);
        for id in colliders {
            self.destroy_collider(id);
        }
        let bodies = std::mem::take(&mut self.pending_destroy_bodies);
        for id in bodies {
            self.destroy_body(id);
        }
    }

    // ----- body helpers that touch world state -----

    /// Moves a body to a pose and re-registers its proxies.
    pub fn set_body_transform(
        &mut self,
        id: EntityId,
        position: DVec2,
        angle: f64,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        if !(position.is_finite() && angle.is_finite()) {
            return Err(PhysicsError::InvalidArgument(
                "body transform must be finite",
            ));
        }
        let Some(body) = self.bodies.get_mut(id) else {
            return Err(PhysicsError::InvalidArgument("unknown body"));
        };
        body.set_pose(position, angle);
        let transform = body.transform;
        let collider_ids = body.colliders.clone();
        for collider_id in collider_ids {
            if let Some(collider) = self.colliders.get_mut(collider_id) {
                collider.synchronize(&mut self.contact_manager.broad_phase, &transform, &transform);
            }
        }
        Ok(())
    }

    /// Switches a body's type, rebuilding mass and waking contacts.
    pub fn set_body_type(&mut self, id: EntityId, body_type: BodyType) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(id) else {
            return Err(PhysicsError::InvalidArgument("unknown body"));
        };
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        if body_type == BodyType::Static {
            body.linear_velocity = DVec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
        }
        body.set_awake(true);
        body.force = DVec2::ZERO;
        body.torque = 0.0;
        self.reset_mass_data(id);

        // Stale pairs must be rebuilt under the new type rules.
        self.contact_manager
            .destroy_contacts_for_body(id, &self.colliders, self.listener.as_deref_mut());
        let collider_ids = self
            .bodies
            .get(id)
            .map(|b| b.colliders.clone())
            .unwrap_or_default();
        for collider_id in collider_ids {
            if let Some(collider) = self.colliders.get(collider_id) {
                collider.refilter(&mut self.contact_manager.broad_phase);
            }
        }
        self.new_colliders = true;
        Ok(())
    }

    /// Replaces a collider's filter and schedules pair regeneration.
    pub fn set_collider_filter(
        &mut self,
        id: EntityId,
        filter: crate::core::collider::CollisionFilter,
    ) {
        if let Some(collider) = self.colliders.get_mut(id) {
            collider.filter = filter;
        }
        if let Some(collider) = self.colliders.get(id) {
            collider.refilter(&mut self.contact_manager.broad_phase);
        }
        self.contact_manager.mark_filter_dirty(id);
        self.new_colliders = true;
    }

    /// Recomputes a body's mass properties from its collider densities.
    pub fn reset_mass_data(&mut self, id: EntityId) {
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        if body.body_type != BodyType::Dynamic {
            let body = self.bodies.get_mut(id).expect("checked above");
            body.mass = 0.0;
            body.inv_mass = 0.0;
            body.inertia = 0.0;
            body.inv_inertia = 0.0;
            body.sweep.local_center = DVec2::ZERO;
            body.sweep.c0 = body.transform.p;
            body.sweep.c = body.transform.p;
            return;
        }

        let mut mass = 0.0;
        let mut center = DVec2::ZERO;
        let mut inertia = 0.0;
        for &collider_id in &body.colliders {
            let Some(collider) = self.colliders.get(collider_id) else {
                continue;
            };
            if collider.density == 0.0 {
                continue;
            }
            let md = collider.shape.compute_mass(collider.density);
            mass += md.mass;
            center += md.mass * md.center;
            inertia += md.inertia;
        }

        if mass > 0.0 {
            center /= mass;
        } else {
            // Dynamic bodies need a unit fallback mass.
            mass = 1.0;
        }

        let body = self.bodies.get_mut(id).expect("checked above");
        body.set_mass_properties(mass, center, inertia);
    }

    /// Overrides the computed mass properties (inertia about the local
    /// origin, matching [`crate::collision::MassData`]).
    pub fn set_mass_data(
        &mut self,
        id: EntityId,
        mass: f64,
        center: DVec2,
        inertia: f64,
    ) -> Result<(), PhysicsError> {
        if self.locked {
            return Err(PhysicsError::WorldLocked);
        }
        let Some(body) = self.bodies.get_mut(id) else {
            return Err(PhysicsError::InvalidArgument("unknown body"));
        };
        if body.body_type != BodyType::Dynamic {
            return Err(PhysicsError::InvalidArgument(
                "mass overrides apply to dynamic bodies only",
            ));
        }
        if !(mass.is_finite() && center.is_finite() && inertia.is_finite()) || mass < 0.0 {
            return Err(PhysicsError::InvalidArgument(
                "mass data must be finite and non-negative",
            ));
        }
        body.set_mass_properties(mass, center, inertia);
        Ok(())
    }

    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = DVec2::ZERO;
            body.torque = 0.0;
        }
    }

    // ----- queries -----

    /// Reports every collider whose fat AABB overlaps `aabb`; the
    /// callback returns false to stop.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(EntityId) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| {
            let data = broad_phase.user_data(proxy);
            callback(data.collider)
        });
    }

    /// Casts a segment from `p1` to `p2`. The callback controls the
    /// traversal with its return value: -1 ignores the hit, 0 stops, a
    /// fraction clips the ray, 1 continues unchanged.
    pub fn ray_cast<F>(&self, p1: DVec2, p2: DVec2, mut callback: F)
    where
        F: FnMut(&RayCastHit) -> f64,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        broad_phase.ray_cast(&input, |sub_input, proxy| {
            let data = broad_phase.user_data(proxy);
            let Some(collider) = self.colliders.get(data.collider) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(collider.body) else {
                return sub_input.max_fraction;
            };

            match collider.shape.ray_cast(sub_input, &body.transform, data.child) {
                Some(output) => {
                    let point = (1.0 - output.fraction) * sub_input.p1
                        + output.fraction * sub_input.p2;
                    callback(&RayCastHit {
                        collider: data.collider,
                        child_index: data.child,
                        point,
                        normal: output.normal,
                        fraction: output.fraction,
                    })
                }
                None => sub_input.max_fraction,
            }
        });
    }

    // ----- stepping -----

    /// Advances the simulation by `dt`, running the given solver
    /// iteration counts.
    pub fn step(&mut self, dt: f64, velocity_iterations: u32, position_iterations: u32) {
        let _timer = ScopedTimer::new("world::step");
        let step_start = Instant::now();
        self.profiler.reset();

        // Register pairs for colliders created since the last step.
        if self.new_colliders {
            let t = Instant::now();
            self.contact_manager.find_new_contacts(
                &self.colliders,
                &self.bodies,
                &self.joints,
                self.contact_filter.as_ref(),
            );
            self.new_colliders = false;
            self.profiler.broad_phase_time += t.elapsed();
        }

        self.locked = true;

        let step = TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.warm_starting,
        };

        // Narrow phase refresh + begin/end events.
        {
            let t = Instant::now();
            self.contact_manager.collide(
                &self.colliders,
                &mut self.bodies,
                &self.joints,
                self.contact_filter.as_ref(),
                self.listener.as_deref_mut(),
            );
            self.profiler.collide_time = t.elapsed();
        }

        if step.dt > 0.0 {
            let t = Instant::now();
            self.solve(&step);
            self.profiler.solve_time = t.elapsed();
        }

        if self.continuous_physics && step.dt > 0.0 {
            let t = Instant::now();
            self.solve_toi(&step);
            self.profiler.toi_time = t.elapsed();
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;
        self.flush_pending_destruction();

        self.profiler.body_count = self.bodies.len();
        self.profiler.contact_count = self.contact_manager.contact_count();
        self.profiler.total_step_time = step_start.elapsed();
        debug!("{}", self.profiler.report());
    }

    /// Discrete solve: island decomposition + sequential impulses.
    fn solve(&mut self, step: &TimeStep) {
        // Clear island bookkeeping.
        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.island_flag = false;
        }
        let mut joint_in_island = vec![false; self.joints.slot_capacity()];

        // Per-slot adjacency, rebuilt each step in deterministic order.
        let body_slots = self.bodies.slot_capacity();
        let mut body_contacts: Vec<Vec<ContactKey>> = vec![Vec::new(); body_slots];
        for (key, contact) in self.contact_manager.contacts.iter() {
            if !contact.enabled || !contact.touching {
                continue;
            }
            let (Some(collider_a), Some(collider_b)) = (
                self.colliders.get(contact.collider_a),
                self.colliders.get(contact.collider_b),
            ) else {
                continue;
            };
            if collider_a.is_sensor || collider_b.is_sensor {
                continue;
            }
            body_contacts[collider_a.body.index()].push(*key);
            body_contacts[collider_b.body.index()].push(*key);
        }

        let mut body_joints: Vec<Vec<EntityId>> = vec![Vec::new(); body_slots];
        for (joint_id, joint) in self.joints.iter() {
            let (a, b) = joint.bodies();
            body_joints[a.index()].push(joint_id);
            body_joints[b.index()].push(joint_id);
        }

        let mut stack: Vec<EntityId> = Vec::with_capacity(self.bodies.len());
        for seed_id in self.bodies.ids() {
            let seed = self.bodies.get(seed_id).expect("seed body");
            if seed.island_flag || !seed.awake || !seed.enabled {
                continue;
            }
            // Static bodies join islands but never seed them.
            if seed.body_type == BodyType::Static {
                continue;
            }

            self.island.clear();
            stack.clear();
            stack.push(seed_id);
            self.bodies.get_mut(seed_id).expect("seed body").island_flag = true;

            while let Some(body_id) = stack.pop() {
                {
                    let index = self.island.bodies.len();
                    let body = self.bodies.get_mut(body_id).expect("island body");
                    body.island_index = index;
                    body.set_awake(true);
                    self.island.bodies.push(body_id);
                    if body.body_type == BodyType::Static {
                        continue;
                    }
                }

                for key in &body_contacts[body_id.index()] {
                    let contact = self
                        .contact_manager
                        .contacts
                        .get_mut(key)
                        .expect("adjacency holds live keys");
                    if contact.island_flag {
                        continue;
                    }
                    contact.island_flag = true;
                    self.island.contacts.push(*key);

                    let other_body = {
                        let collider_a = self.colliders.get(contact.collider_a).expect("live");
                        let collider_b = self.colliders.get(contact.collider_b).expect("live");
                        if collider_a.body == body_id {
                            collider_b.body
                        } else {
                            collider_a.body
                        }
                    };
                    let other = self.bodies.get_mut(other_body).expect("live body");
                    if !other.island_flag {
                        other.island_flag = true;
                        stack.push(other_body);
                    }
                }

                for &joint_id in &body_joints[body_id.index()] {
                    if joint_in_island[joint_id.index()] {
                        continue;
                    }
                    let joint = self.joints.get(joint_id).expect("live joint");
                    let (a, b) = joint.bodies();
                    let other_body = if a == body_id { b } else { a };
                    // Joints to disabled bodies do not bind islands.
                    if !self.bodies.get(other_body).map(|o| o.enabled).unwrap_or(false) {
                        continue;
                    }
                    joint_in_island[joint_id.index()] = true;
                    self.island.joints.push(joint_id);

                    let other = self.bodies.get_mut(other_body).expect("live body");
                    if !other.island_flag {
                        other.island_flag = true;
                        stack.push(other_body);
                    }
                }
            }

            self.island.solve(
                step,
                self.gravity,
                self.allow_sleep,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &self.colliders,
                self.listener.as_deref_mut(),
            );
            self.profiler.island_count += 1;

            // Statics may participate in several islands.
            for &body_id in &self.island.bodies {
                let body = self.bodies.get_mut(body_id).expect("island body");
                if body.body_type == BodyType::Static {
                    body.island_flag = false;
                }
            }
        }

        // Push updated poses into the broad phase and harvest new pairs.
        {
            let t = Instant::now();
            let body_ids = self.bodies.ids();
            for body_id in body_ids {
                let body = self.bodies.get(body_id).expect("live body");
                if !body.island_flag || body.body_type == BodyType::Static {
                    continue;
                }
                self.synchronize_colliders(body_id);
            }
            self.contact_manager.find_new_contacts(
                &self.colliders,
                &self.bodies,
                &self.joints,
                self.contact_filter.as_ref(),
            );
            self.profiler.broad_phase_time += t.elapsed();
        }
    }

    fn synchronize_colliders(&mut self, body_id: EntityId) {
        let Some(body) = self.bodies.get(body_id) else {
            return;
        };
        let q0 = Rot::from_angle(body.sweep.a0);
        let xf1 = Transform2 {
            p: body.sweep.c0 - q0.apply(body.sweep.local_center),
            q: q0,
        };
        let xf2 = body.transform;
        let collider_ids = body.colliders.clone();
        for collider_id in collider_ids {
            if let Some(collider) = self.colliders.get_mut(collider_id) {
                collider.synchronize(&mut self.contact_manager.broad_phase, &xf1, &xf2);
            }
        }
    }

    /// Continuous pass: sub-step bullets and fast bodies to their first
    /// time of impact so they cannot tunnel through thin geometry.
    fn solve_toi(&mut self, step: &TimeStep) {
        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
            body.sweep.alpha0 = 0.0;
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.island_flag = false;
            contact.toi_valid = false;
            contact.toi_count = 0;
        }

        // Sub-step until no impact remains inside this step.
        loop {
            let mut min_key: Option<ContactKey> = None;
            let mut min_alpha = 1.0;

            let keys: Vec<ContactKey> = self.contact_manager.contacts.keys().copied().collect();
            for key in keys {
                let contact = self.contact_manager.contacts.get(&key).expect("live");
                if !contact.enabled {
                    continue;
                }
                if contact.toi_count > MAX_SUB_STEPS {
                    continue;
                }

                let alpha = if contact.toi_valid {
                    contact.toi
                } else {
                    let (Some(collider_a), Some(collider_b)) = (
                        self.colliders.get(contact.collider_a),
                        self.colliders.get(contact.collider_b),
                    ) else {
                        continue;
                    };
                    if collider_a.is_sensor || collider_b.is_sensor {
                        continue;
                    }
                    let body_a_id = collider_a.body;
                    let body_b_id = collider_b.body;
                    let (Some(body_a), Some(body_b)) =
                        (self.bodies.get(body_a_id), self.bodies.get(body_b_id))
                    else {
                        continue;
                    };

                    let type_a = body_a.body_type;
                    let type_b = body_b.body_type;
                    debug_assert!(
                        type_a == BodyType::Dynamic || type_b == BodyType::Dynamic
                    );

                    let active_a = body_a.awake && type_a != BodyType::Static;
                    let active_b = body_b.awake && type_b != BodyType::Static;
                    if !active_a && !active_b {
                        continue;
                    }

                    // CCD applies to bullets and to dynamic-vs-static.
                    let collide_a = body_a.bullet || type_a != BodyType::Dynamic;
                    let collide_b = body_b.bullet || type_b != BodyType::Dynamic;
                    if !collide_a && !collide_b {
                        continue;
                    }

                    // Advance both sweeps to the later alpha0.
                    let alpha0 = body_a.sweep.alpha0.max(body_b.sweep.alpha0);
                    debug_assert!(alpha0 < 1.0);
                    let child_a = contact.child_a;
                    let child_b = contact.child_b;

                    {
                        let body_a = self.bodies.get_mut(body_a_id).expect("live");
                        if body_a.sweep.alpha0 < alpha0 {
                            body_a.sweep.advance(alpha0);
                        }
                    }
                    {
                        let body_b = self.bodies.get_mut(body_b_id).expect("live");
                        if body_b.sweep.alpha0 < alpha0 {
                            body_b.sweep.advance(alpha0);
                        }
                    }

                    let collider_a = self.colliders.get(contact.collider_a).expect("live");
                    let collider_b = self.colliders.get(contact.collider_b).expect("live");
                    let body_a = self.bodies.get(body_a_id).expect("live");
                    let body_b = self.bodies.get(body_b_id).expect("live");

                    let output = time_of_impact(&ToiInput {
                        proxy_a: DistanceProxy::from_shape(&collider_a.shape, child_a),
                        proxy_b: DistanceProxy::from_shape(&collider_b.shape, child_b),
                        sweep_a: body_a.sweep,
                        sweep_b: body_b.sweep,
                        t_max: 1.0,
                    });

                    let beta = output.t;
                    let alpha = if output.state == ToiState::Touching
                        || output.state == ToiState::Overlapped
                    {
                        (alpha0 + (1.0 - alpha0) * beta).min(1.0)
                    } else {
                        1.0
                    };

                    let contact = self.contact_manager.contacts.get_mut(&key).expect("live");
                    contact.toi = alpha;
                    contact.toi_valid = true;
                    alpha
                };

                if alpha < min_alpha {
                    min_alpha = alpha;
                    min_key = Some(key);
                }
            }

            let Some(key) = min_key else {
                break;
            };
            if min_alpha > 1.0 - 10.0 * f64::EPSILON {
                // No impact left inside this step.
                break;
            }

            // Advance the pair to the impact time and re-collide there.
            let (body_a_id, body_b_id) = {
                let contact = self.contact_manager.contacts.get(&key).expect("live");
                (
                    self.colliders
                        .get(contact.collider_a)
                        .expect("live")
                        .body,
                    self.colliders
                        .get(contact.collider_b)
                        .expect("live")
                        .body,
                )
            };

            let backup_a = self.bodies.get(body_a_id).expect("live").sweep;
            let backup_b = self.bodies.get(body_b_id).expect("live").sweep;

            self.bodies.get_mut(body_a_id).expect("live").advance(min_alpha);
            self.bodies.get_mut(body_b_id).expect("live").advance(min_alpha);

            {
                let contact = self.contact_manager.contacts.get_mut(&key).expect("live");
                contact.update(&self.colliders, &mut self.bodies, self.listener.as_deref_mut());
                contact.toi_valid = false;
                contact.toi_count += 1;

                if !contact.enabled || !contact.touching {
                    // Grazing pass: restore the motion and move on.
                    contact.enabled = false;
                    let body_a = self.bodies.get_mut(body_a_id).expect("live");
                    body_a.sweep = backup_a;
                    body_a.synchronize_transform();
                    let body_b = self.bodies.get_mut(body_b_id).expect("live");
                    body_b.sweep = backup_b;
                    body_b.synchronize_transform();
                    continue;
                }
            }

            self.bodies.get_mut(body_a_id).expect("live").set_awake(true);
            self.bodies.get_mut(body_b_id).expect("live").set_awake(true);

            // Build a mini-island: the impact pair plus everything
            // touching either body at the new poses.
            self.island.clear();
            {
                let body_a = self.bodies.get_mut(body_a_id).expect("live");
                body_a.island_flag = true;
                body_a.island_index = 0;
            }
            {
                let body_b = self.bodies.get_mut(body_b_id).expect("live");
                body_b.island_flag = true;
                body_b.island_index = 1;
            }
            self.island.bodies.push(body_a_id);
            self.island.bodies.push(body_b_id);
            self.contact_manager
                .contacts
                .get_mut(&key)
                .expect("live")
                .island_flag = true;
            self.island.contacts.push(key);

            for seed_id in [body_a_id, body_b_id] {
                if self.bodies.get(seed_id).expect("live").body_type != BodyType::Dynamic {
                    continue;
                }
                let contact_keys: Vec<ContactKey> = self
                    .contact_manager
                    .contacts
                    .iter()
                    .filter(|(_, c)| {
                        let a = self.colliders.get(c.collider_a).map(|col| col.body);
                        let b = self.colliders.get(c.collider_b).map(|col| col.body);
                        a == Some(seed_id) || b == Some(seed_id)
                    })
                    .map(|(k, _)| *k)
                    .collect();

                for other_key in contact_keys {
                    if self.island.contacts.len() == MAX_TOI_CONTACTS {
                        break;
                    }
                    let contact = self.contact_manager.contacts.get(&other_key).expect("live");
                    if contact.island_flag {
                        continue;
                    }
                    let collider_a = self.colliders.get(contact.collider_a).expect("live");
                    let collider_b = self.colliders.get(contact.collider_b).expect("live");
                    if collider_a.is_sensor || collider_b.is_sensor {
                        continue;
                    }
                    let other_id = if collider_a.body == seed_id {
                        collider_b.body
                    } else {
                        collider_a.body
                    };
                    let other = self.bodies.get(other_id).expect("live");

                    // Regular dynamic bodies only join through bullets.
                    let seed_is_bullet = self.bodies.get(seed_id).expect("live").bullet;
                    if other.body_type == BodyType::Dynamic && !seed_is_bullet && !other.bullet
                    {
                        continue;
                    }

                    // Tentatively advance the other body to the TOI.
                    let backup = other.sweep;
                    let other_in_island = other.island_flag;
                    if !other_in_island {
                        self.bodies.get_mut(other_id).expect("live").advance(min_alpha);
                    }

                    {
                        let contact = self
                            .contact_manager
                            .contacts
                            .get_mut(&other_key)
                            .expect("live");
                        contact.update(
                            &self.colliders,
                            &mut self.bodies,
                            self.listener.as_deref_mut(),
                        );
                        let keep = contact.enabled && contact.touching;
                        if !keep {
                            let other = self.bodies.get_mut(other_id).expect("live");
                            other.sweep = backup;
                            other.synchronize_transform();
                            continue;
                        }
                        contact.island_flag = true;
                    }
                    self.island.contacts.push(other_key);

                    if other_in_island {
                        continue;
                    }
                    let index = self.island.bodies.len();
                    let other = self.bodies.get_mut(other_id).expect("live");
                    other.island_flag = true;
                    other.island_index = index;
                    if other.body_type != BodyType::Static {
                        other.set_awake(true);
                    }
                    self.island.bodies.push(other_id);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };
            self.island.solve_toi(
                &sub_step,
                body_a_id,
                body_b_id,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &self.colliders,
                self.listener.as_deref_mut(),
            );
            self.profiler.toi_sub_steps += 1;

            // Reset flags; displaced bodies invalidate their cached TOIs.
            let island_bodies = self.island.bodies.clone();
            for body_id in island_bodies {
                let body = self.bodies.get_mut(body_id).expect("live");
                body.island_flag = false;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                self.synchronize_colliders(body_id);

                let touched: Vec<ContactKey> = self
                    .contact_manager
                    .contacts
                    .iter()
                    .filter(|(_, c)| {
                        let a = self.colliders.get(c.collider_a).map(|col| col.body);
                        let b = self.colliders.get(c.collider_b).map(|col| col.body);
                        a == Some(body_id) || b == Some(body_id)
                    })
                    .map(|(k, _)| *k)
                    .collect();
                for k in touched {
                    let contact = self.contact_manager.contacts.get_mut(&k).expect("live");
                    contact.toi_valid = false;
                    contact.island_flag = false;
                }
            }

            // Displacement may have opened fresh pairs; grab them before
            // the next sub-step.
            self.contact_manager.find_new_contacts(
                &self.colliders,
                &self.bodies,
                &self.joints,
                self.contact_filter.as_ref(),
            );
        }
    }
}
