//! Island solve: one connected component of awake dynamic bodies with
//! their contacts and joints, integrated and solved as a unit.
//!
//! Velocity pass order is joints first, then contacts, per iteration;
//! the position pass runs both and stops early when everything reports
//! convergence. Sleep bookkeeping happens here because an island sleeps
//! or wakes as a whole.

use std::collections::BTreeMap;

use glam::DVec2;
use log::trace;

use crate::config::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP, TOI_POSITION_ITERATIONS,
};
use crate::core::collider::Collider;
use crate::core::rigidbody::{BodyType, RigidBody};
use crate::dynamics::contact::{Contact, ContactKey};
use crate::dynamics::contact_manager::ContactListener;
use crate::dynamics::contact_solver::{ContactInit, ContactSolver};
use crate::dynamics::joints::{Joint, SolverData};
use crate::dynamics::{Position, TimeStep, Velocity};
use crate::utils::allocator::{Arena, EntityId};

/// A connected set of bodies, contacts, and joints solved together.
#[derive(Debug, Default)]
pub struct Island {
    pub bodies: Vec<EntityId>,
    pub contacts: Vec<ContactKey>,
    pub joints: Vec<EntityId>,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    fn gather_contact_inits(
        &self,
        contacts: &BTreeMap<ContactKey, Contact>,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
    ) -> Vec<ContactInit> {
        self.contacts
            .iter()
            .filter_map(|key| {
                let contact = contacts.get(key)?;
                if contact.manifold.point_count() == 0 {
                    return None;
                }
                let collider_a = colliders.get(contact.collider_a)?;
                let collider_b = colliders.get(contact.collider_b)?;
                let body_a = bodies.get(collider_a.body)?;
                let body_b = bodies.get(collider_b.body)?;
                Some(ContactInit {
                    key: *key,
                    manifold: contact.manifold.clone(),
                    index_a: body_a.island_index,
                    index_b: body_b.island_index,
                    inv_mass_a: body_a.inv_mass,
                    inv_mass_b: body_b.inv_mass,
                    inv_i_a: body_a.inv_inertia,
                    inv_i_b: body_b.inv_inertia,
                    local_center_a: body_a.sweep.local_center,
                    local_center_b: body_b.sweep.local_center,
                    radius_a: collider_a.shape.radius(),
                    radius_b: collider_b.shape.radius(),
                    friction: contact.friction,
                    restitution: contact.restitution,
                    tangent_speed: contact.tangent_speed,
                })
            })
            .collect()
    }

    /// Full discrete solve: integrate forces, velocity iterations,
    /// integrate positions, position iterations, write back, sleep.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        step: &TimeStep,
        gravity: DVec2,
        allow_sleep: bool,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut BTreeMap<ContactKey, Contact>,
        joints_arena: &mut Arena<Joint>,
        colliders: &Arena<Collider>,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let h = step.dt;

        // Integrate forces into island-local scratch.
        let mut positions = Vec::with_capacity(self.bodies.len());
        let mut velocities = Vec::with_capacity(self.bodies.len());
        for &id in &self.bodies {
            let body = bodies.get(id).expect("island body destroyed mid-step");
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                // Implicit damping: v2 = v1 / (1 + h * d).
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            positions.push(Position { c, a });
            velocities.push(Velocity { v, w });
        }

        let inits = self.gather_contact_inits(contacts, colliders, bodies);
        let mut contact_solver = ContactSolver::new(*step, inits);
        contact_solver.initialize_velocity_constraints(&positions, &velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut velocities);
        }

        {
            let mut data = SolverData {
                step: *step,
                positions: &mut positions,
                velocities: &mut velocities,
            };
            for &joint_id in &self.joints {
                if let Some(joint) = joints_arena.get_mut(joint_id) {
                    joint.init_velocity_constraints(&mut data, bodies);
                }
            }

            for _ in 0..step.velocity_iterations {
                for &joint_id in &self.joints {
                    if let Some(joint) = joints_arena.get_mut(joint_id) {
                        joint.solve_velocity_constraints(&mut data);
                    }
                }
                contact_solver.solve_velocity_constraints(data.velocities);
            }
        }
        contact_solver.store_impulses();

        // Integrate positions, clamping large motion.
        for i in 0..self.bodies.len() {
            let mut c = positions[i].c;
            let mut a = positions[i].a;
            let mut v = velocities[i].v;
            let mut w = velocities[i].w;

            let translation = h * v;
            if translation.length_squared() > MAX_TRANSLATION_SQUARED {
                v *= MAX_TRANSLATION / translation.length();
            }
            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                w *= MAX_ROTATION / rotation.abs();
            }

            c += h * v;
            a += h * w;

            positions[i] = Position { c, a };
            velocities[i] = Velocity { v, w };
        }

        // Position correction.
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(&mut positions);

            let mut joints_okay = true;
            {
                let mut data = SolverData {
                    step: *step,
                    positions: &mut positions,
                    velocities: &mut velocities,
                };
                for &joint_id in &self.joints {
                    if let Some(joint) = joints_arena.get_mut(joint_id) {
                        joints_okay &= joint.solve_position_constraints(&mut data);
                    }
                }
            }

            if contacts_okay && joints_okay {
                position_solved = true;
                break;
            }
        }

        // Write back.
        for (i, &id) in self.bodies.iter().enumerate() {
            let body = bodies.get_mut(id).expect("island body destroyed mid-step");
            body.sweep.c = positions[i].c;
            body.sweep.a = positions[i].a;
            body.linear_velocity = velocities[i].v;
            body.angular_velocity = velocities[i].w;
            body.synchronize_transform();
        }

        // Persist solved impulses for next step's warm start.
        for (key, manifold) in contact_solver.solved_manifolds() {
            if let Some(contact) = contacts.get_mut(&key) {
                for (mp, solved) in contact.manifold.points.iter_mut().zip(&manifold.points) {
                    mp.normal_impulse = solved.normal_impulse;
                    mp.tangent_impulse = solved.tangent_impulse;
                }
            }
        }

        if let Some(listener) = listener.as_deref_mut() {
            for (key, impulse) in contact_solver.impulses() {
                if let Some(contact) = contacts.get(&key) {
                    listener.post_solve(contact, &impulse);
                }
            }
        }

        if allow_sleep {
            let mut min_sleep_time = f64::MAX;
            let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
            let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

            for &id in &self.bodies {
                let body = bodies.get_mut(id).expect("island body destroyed mid-step");
                if body.body_type == BodyType::Static {
                    continue;
                }

                if !body.allow_sleep
                    || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                    || body.linear_velocity.length_squared() > lin_tol_sqr
                {
                    body.sleep_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    body.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(body.sleep_time);
                }
            }

            if min_sleep_time >= TIME_TO_SLEEP && position_solved {
                trace!("island of {} bodies going to sleep", self.bodies.len());
                for &id in &self.bodies {
                    if let Some(body) = bodies.get_mut(id) {
                        body.set_awake(false);
                    }
                }
            }
        }
    }

    /// TOI sub-step solve: position-only rescue of the two sub-stepped
    /// bodies, then a velocity pass, integrating the remaining sub-step.
    /// No warm starting; TOI impulses are deliberately not persisted.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_toi(
        &self,
        sub_step: &TimeStep,
        toi_body_a: EntityId,
        toi_body_b: EntityId,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut BTreeMap<ContactKey, Contact>,
        colliders: &Arena<Collider>,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let toi_index_a = bodies.get(toi_body_a).map(|b| b.island_index).unwrap_or(0);
        let toi_index_b = bodies.get(toi_body_b).map(|b| b.island_index).unwrap_or(0);

        let mut positions = Vec::with_capacity(self.bodies.len());
        let mut velocities = Vec::with_capacity(self.bodies.len());
        for &id in &self.bodies {
            let body = bodies.get(id).expect("island body destroyed mid-step");
            positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let inits = self.gather_contact_inits(contacts, colliders, bodies);
        let mut contact_solver = ContactSolver::new(*sub_step, inits);

        for _ in 0..TOI_POSITION_ITERATIONS {
            if contact_solver.solve_toi_position_constraints(&mut positions, toi_index_a, toi_index_b)
            {
                break;
            }
        }

        // The corrected poses become the new sweep starts for the two
        // sub-stepped bodies.
        if let Some(body) = bodies.get_mut(toi_body_a) {
            body.sweep.c0 = positions[toi_index_a].c;
            body.sweep.a0 = positions[toi_index_a].a;
        }
        if let Some(body) = bodies.get_mut(toi_body_b) {
            body.sweep.c0 = positions[toi_index_b].c;
            body.sweep.a0 = positions[toi_index_b].a;
        }

        contact_solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut velocities);
        }

        let h = sub_step.dt;
        for i in 0..self.bodies.len() {
            let mut c = positions[i].c;
            let mut a = positions[i].a;
            let mut v = velocities[i].v;
            let mut w = velocities[i].w;

            let translation = h * v;
            if translation.length_squared() > MAX_TRANSLATION_SQUARED {
                v *= MAX_TRANSLATION / translation.length();
            }
            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                w *= MAX_ROTATION / rotation.abs();
            }

            c += h * v;
            a += h * w;

            let body = bodies
                .get_mut(self.bodies[i])
                .expect("island body destroyed mid-step");
            body.sweep.c = c;
            body.sweep.a = a;
            body.linear_velocity = v;
            body.angular_velocity = w;
            body.synchronize_transform();
        }

        if let Some(listener) = listener.as_deref_mut() {
            for (key, impulse) in contact_solver.impulses() {
                if let Some(contact) = contacts.get(&key) {
                    listener.post_solve(contact, &impulse);
                }
            }
        }
    }
}
