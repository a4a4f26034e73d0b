//! World serialization: the graph flattened to a plain def tree.
//!
//! Cross references are encoded as dense indices (bodies by snapshot
//! order, gear joints by joint order) and resolved on load in two
//! passes: bodies and colliders first, then plain joints, then gear
//! joints that reference them.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::core::collider::ColliderDef;
use crate::core::rigidbody::BodyDef;
use crate::dynamics::joints::JointDef;
use crate::utils::allocator::EntityId;
use crate::world::World;
use crate::PhysicsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub def: BodyDef,
    pub colliders: Vec<ColliderDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub gravity: DVec2,
    pub bodies: Vec<BodySnapshot>,
    /// Joint defs with body (and joint, for gears) references rewritten
    /// to dense snapshot indices.
    pub joints: Vec<JointDef>,
}

fn remap_def(def: &JointDef, map_body: impl Fn(EntityId) -> EntityId) -> JointDef {
    let mut def = def.clone();
    match &mut def {
        JointDef::Distance(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Revolute(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Prismatic(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Weld(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Pulley(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Gear(_) => {}
        JointDef::Mouse(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Friction(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Rope(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Wheel(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
        JointDef::Motor(d) => {
            d.body_a = map_body(d.body_a);
            d.body_b = map_body(d.body_b);
        }
    }
    def
}

impl World {
    /// Captures the world graph as plain defs. Transient solver state
    /// (accumulated impulses, contacts, sleep timers) is not persisted.
    pub fn snapshot(&self) -> WorldSnapshot {
        let body_ids = self.bodies.ids();
        let body_index = |id: EntityId| {
            let index = body_ids
                .iter()
                .position(|&b| b == id)
                .expect("joint references a live body");
            EntityId::new(index, 0)
        };

        let bodies = body_ids
            .iter()
            .map(|&id| {
                let body = self.bodies.get(id).expect("live body");
                let def = BodyDef {
                    body_type: body.body_type,
                    position: body.transform.p,
                    angle: body.sweep.a,
                    linear_velocity: body.linear_velocity,
                    angular_velocity: body.angular_velocity,
                    linear_damping: body.linear_damping,
                    angular_damping: body.angular_damping,
                    fixed_rotation: body.fixed_rotation,
                    bullet: body.bullet,
                    gravity_scale: body.gravity_scale,
                    allow_sleep: body.allow_sleep,
                    awake: body.awake,
                    enabled: body.enabled,
                    user_data: body.user_data,
                };
                let colliders = body
                    .colliders
                    .iter()
                    .filter_map(|&cid| self.colliders.get(cid))
                    .map(|collider| ColliderDef {
                        shape: collider.shape.clone(),
                        density: collider.density,
                        friction: collider.friction,
                        restitution: collider.restitution,
                        is_sensor: collider.is_sensor,
                        filter: collider.filter,
                    })
                    .collect();
                BodySnapshot { def, colliders }
            })
            .collect();

        let joint_ids = self.joints.ids();
        let joint_index = |id: EntityId| {
            let index = joint_ids
                .iter()
                .position(|&j| j == id)
                .expect("gear references a live joint");
            EntityId::new(index, 0)
        };

        let joints = joint_ids
            .iter()
            .map(|&id| {
                let def = self.joints.get(id).expect("live joint").to_def();
                let mut def = remap_def(&def, body_index);
                if let JointDef::Gear(gear) = &mut def {
                    gear.joint1 = joint_index(gear.joint1);
                    gear.joint2 = joint_index(gear.joint2);
                }
                def
            })
            .collect();

        WorldSnapshot {
            gravity: self.gravity(),
            bodies,
            joints,
        }
    }

    /// Rebuilds a world from a snapshot.
    pub fn restore(snapshot: &WorldSnapshot) -> Result<World, PhysicsError> {
        let mut world = World::new(snapshot.gravity);

        // Pass 1: bodies and their colliders.
        let mut body_map = Vec::with_capacity(snapshot.bodies.len());
        for body_snapshot in &snapshot.bodies {
            let id = world.create_body(&body_snapshot.def)?;
            for collider_def in &body_snapshot.colliders {
                world.create_collider(id, collider_def)?;
            }
            body_map.push(id);
        }

        // Pass 2: plain joints, remembering ids by snapshot position. A
        // dangling body index maps to the null id and fails inside
        // create_joint.
        let mut joint_map: Vec<Option<EntityId>> = vec![None; snapshot.joints.len()];
        for (index, def) in snapshot.joints.iter().enumerate() {
            if matches!(def, JointDef::Gear(_)) {
                continue;
            }
            let def = remap_def(def, |id| {
                body_map.get(id.index()).copied().unwrap_or_default()
            });
            joint_map[index] = Some(world.create_joint(&def)?);
        }

        // Pass 3: gear joints over the restored joints.
        for (index, def) in snapshot.joints.iter().enumerate() {
            let JointDef::Gear(gear) = def else {
                continue;
            };
            let joint1 = joint_map
                .get(gear.joint1.index())
                .copied()
                .flatten()
                .ok_or(PhysicsError::InvalidArgument(
                    "snapshot gear references a missing joint",
                ))?;
            let joint2 = joint_map
                .get(gear.joint2.index())
                .copied()
                .flatten()
                .ok_or(PhysicsError::InvalidArgument(
                    "snapshot gear references a missing joint",
                ))?;
            let mut gear = gear.clone();
            gear.joint1 = joint1;
            gear.joint2 = joint2;
            joint_map[index] = Some(world.create_joint(&JointDef::Gear(gear))?);
        }

        Ok(world)
    }
}
