//! Contact lifecycle: pair creation from the broad phase, narrow-phase
//! refresh, and destruction when pairs separate or filters change.

use std::collections::{BTreeMap, HashSet};

use log::trace;

use crate::collision::broadphase::BroadPhase;
use crate::core::collider::{Collider, ProxyData};
use crate::core::rigidbody::{BodyType, RigidBody};
use crate::dynamics::contact::{Contact, ContactImpulse, ContactKey};
use crate::dynamics::joints::Joint;
use crate::utils::allocator::{Arena, EntityId};

/// Observes contact lifetime and solver results. All callbacks run
/// synchronously inside `World::step`; world mutation from inside them
/// must go through the deferred-destruction queue.
pub trait ContactListener {
    fn begin_contact(&mut self, _contact: &Contact) {}
    fn end_contact(&mut self, _contact: &Contact) {}
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &crate::collision::Manifold) {}
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Observes cascaded destruction of colliders and joints.
pub trait DestructionListener {
    fn collider_destroyed(&mut self, _collider: EntityId) {}
    fn joint_destroyed(&mut self, _joint: EntityId) {}
}

/// User hook deciding whether two colliders may generate contacts.
pub trait ContactFilter {
    fn should_collide(&self, a: &Collider, b: &Collider) -> bool {
        a.filter.should_collide(&b.filter)
    }
}

/// The built-in category/mask/group filter.
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {}

pub struct ContactManager {
    pub broad_phase: BroadPhase<ProxyData>,
    /// Keyed by canonical proxy pair; BTreeMap iteration is the sorted
    /// pair order the broad phase emits, keeping every downstream loop
    /// deterministic.
    pub contacts: BTreeMap<ContactKey, Contact>,
}

impl Default for ContactManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactManager {
    pub fn new() -> Self {
        Self {
            broad_phase: BroadPhase::new(),
            contacts: BTreeMap::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Bodies joined by a joint with `collide_connected == false` skip
    /// contact creation entirely.
    fn non_colliding_joint_pairs(joints: &Arena<Joint>) -> HashSet<(usize, usize)> {
        let mut set = HashSet::new();
        for (_, joint) in joints.iter() {
            if !joint.collide_connected() {
                let (a, b) = joint.bodies();
                let key = (a.index().min(b.index()), a.index().max(b.index()));
                set.insert(key);
            }
        }
        set
    }

    /// Consumes broad-phase moves and creates contacts for new pairs.
    pub fn find_new_contacts(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
        joints: &Arena<Joint>,
        filter: &dyn ContactFilter,
    ) {
        let skip_pairs = Self::non_colliding_joint_pairs(joints);

        let mut created: Vec<(ContactKey, Contact)> = Vec::new();
        let contacts = &self.contacts;
        self.broad_phase.update_pairs(|data_a, data_b| {
            let (Some(collider_a), Some(collider_b)) =
                (colliders.get(data_a.collider), colliders.get(data_b.collider))
            else {
                return;
            };

            let body_a_id = collider_a.body;
            let body_b_id = collider_b.body;
            if body_a_id == body_b_id {
                return;
            }

            let (Some(body_a), Some(body_b)) = (bodies.get(body_a_id), bodies.get(body_b_id))
            else {
                return;
            };

            // At least one side must be able to respond.
            if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
                return;
            }
            if !body_a.enabled || !body_b.enabled {
                return;
            }

            let joint_key = (
                body_a_id.index().min(body_b_id.index()),
                body_a_id.index().max(body_b_id.index()),
            );
            if skip_pairs.contains(&joint_key) {
                return;
            }

            if !filter.should_collide(collider_a, collider_b) {
                return;
            }

            let proxy_a = collider_a.proxies[data_a.child].proxy_id;
            let proxy_b = collider_b.proxies[data_b.child].proxy_id;
            let key = ContactKey::new(proxy_a, proxy_b);
            if contacts.contains_key(&key) || created.iter().any(|(k, _)| *k == key) {
                return;
            }

            if let Some(contact) = Contact::try_new(
                data_a.collider,
                data_a.child,
                data_b.collider,
                data_b.child,
                colliders,
            ) {
                created.push((key, contact));
            }
        });

        if !created.is_empty() {
            trace!("broad phase created {} contact(s)", created.len());
        }
        for (key, contact) in created {
            self.contacts.insert(key, contact);
        }
    }

    /// Narrow-phase update over all contacts: destroys separated or
    /// newly-filtered pairs, refreshes manifolds, and fires begin/end
    /// events through `listener`.
    pub fn collide(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &mut Arena<RigidBody>,
        joints: &Arena<Joint>,
        filter: &dyn ContactFilter,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let skip_pairs = Self::non_colliding_joint_pairs(joints);
        let mut destroyed: Vec<ContactKey> = Vec::new();

        let keys: Vec<ContactKey> = self.contacts.keys().copied().collect();
        for key in keys {
            let contact = self.contacts.get_mut(&key).expect("contact disappeared");

            let (Some(collider_a), Some(collider_b)) = (
                colliders.get(contact.collider_a),
                colliders.get(contact.collider_b),
            ) else {
                destroyed.push(key);
                continue;
            };

            // A filter edit invalidates existing pairs.
            if contact.filter_dirty {
                contact.filter_dirty = false;
                let joint_key = (
                    collider_a.body.index().min(collider_b.body.index()),
                    collider_a.body.index().max(collider_b.body.index()),
                );
                if skip_pairs.contains(&joint_key)
                    || !filter.should_collide(collider_a, collider_b)
                {
                    destroyed.push(key);
                    continue;
                }
            }

            let (Some(body_a), Some(body_b)) =
                (bodies.get(collider_a.body), bodies.get(collider_b.body))
            else {
                destroyed.push(key);
                continue;
            };

            let active_a = body_a.awake && body_a.body_type != BodyType::Static;
            let active_b = body_b.awake && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            // Proxy AABBs drifted apart: the pair is gone.
            if !self.broad_phase.test_overlap(key.0, key.1) {
                destroyed.push(key);
                continue;
            }

            contact.update(colliders, bodies, listener.as_deref_mut());
        }

        for key in destroyed {
            self.destroy(key, listener.as_deref_mut());
        }
    }

    /// Unlinks and drops a contact, reporting `end_contact` if it was
    /// touching.
    pub fn destroy(&mut self, key: ContactKey, listener: Option<&mut (dyn ContactListener + '_)>) {
        if let Some(contact) = self.contacts.remove(&key) {
            if contact.touching {
                if let Some(listener) = listener {
                    listener.end_contact(&contact);
                }
            }
        }
    }

    /// Drops every contact touching the given collider, e.g. when the
    /// collider is destroyed.
    pub fn destroy_contacts_for_collider(
        &mut self,
        collider: EntityId,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let keys: Vec<ContactKey> = self
            .contacts
            .iter()
            .filter(|(_, c)| c.collider_a == collider || c.collider_b == collider)
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.destroy(key, listener.as_deref_mut());
        }
    }

    /// Drops every contact touching the given body.
    pub fn destroy_contacts_for_body(
        &mut self,
        body: EntityId,
        colliders: &Arena<Collider>,
        mut listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let keys: Vec<ContactKey> = self
            .contacts
            .iter()
            .filter(|(_, c)| {
                let a = colliders.get(c.collider_a).map(|col| col.body);
                let b = colliders.get(c.collider_b).map(|col| col.body);
                a == Some(body) || b == Some(body)
            })
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.destroy(key, listener.as_deref_mut());
        }
    }

    /// Marks contacts involving a collider for a filter re-check.
    pub fn mark_filter_dirty(&mut self, collider: EntityId) {
        for contact in self.contacts.values_mut() {
            if contact.collider_a == collider || contact.collider_b == collider {
                contact.filter_dirty = true;
            }
        }
    }

    /// Marks contacts between two bodies for a filter re-check, used
    /// when a non-colliding joint is created between them.
    pub fn mark_filter_dirty_pair(
        &mut self,
        body_a: EntityId,
        body_b: EntityId,
        colliders: &Arena<Collider>,
    ) {
        for contact in self.contacts.values_mut() {
            let a = colliders.get(contact.collider_a).map(|c| c.body);
            let b = colliders.get(contact.collider_b).map(|c| c.body);
            if (a == Some(body_a) && b == Some(body_b)) || (a == Some(body_b) && b == Some(body_a))
            {
                contact.filter_dirty = true;
            }
        }
    }
}
