//! Broad phase: a move buffer layered on the dynamic AABB tree.
//!
//! Proxy creation and movement enqueue the proxy id; `update_pairs`
//! queries the tree once per moved proxy and reports each unique
//! overlapping pair exactly once, in ascending `(min_id, max_id)` order,
//! so downstream contact creation is deterministic.

use glam::DVec2;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::collision::dynamic_tree::{DynamicTree, NULL_NODE};

pub type ProxyId = usize;

pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<ProxyId>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::new(),
        }
    }

    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.move_buffer.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        // Stale entries must not reach the tree after the slot is freed.
        self.move_buffer.retain(|&moved| moved != id);
        self.tree.destroy_proxy(id);
    }

    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: DVec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.move_buffer.push(id);
        }
    }

    /// Re-queues a proxy whose pairs must be refreshed without motion
    /// (filter changes, explicit touch).
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    pub fn fat_aabb(&self, id: ProxyId) -> &Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: ProxyId) -> T {
        self.tree.user_data(id)
    }

    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(self.tree.fat_aabb(b))
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_area_ratio(&self) -> f64 {
        self.tree.area_ratio()
    }

    pub fn pending_moves(&self) -> usize {
        self.move_buffer.len()
    }

    /// Emits every unique overlapping pair with at least one endpoint in
    /// the move buffer, ascending by `(min_id, max_id)`, then clears the
    /// buffer.
    pub fn update_pairs<F>(&mut self, mut add_pair: F)
    where
        F: FnMut(T, T),
    {
        let mut moved = std::mem::take(&mut self.move_buffer);
        moved.sort_unstable();
        moved.dedup();

        let mut pairs: Vec<(ProxyId, ProxyId)> = Vec::new();
        for &query_id in &moved {
            if query_id == NULL_NODE {
                continue;
            }
            let fat = *self.tree.fat_aabb(query_id);
            self.tree.query(&fat, |other| {
                if other != query_id {
                    pairs.push((query_id.min(other), query_id.max(other)));
                }
                true
            });
        }

        // Both endpoints moving reports the pair from each side.
        pairs.sort_unstable();
        pairs.dedup();

        for (a, b) in pairs {
            add_pair(self.tree.user_data(a), self.tree.user_data(b));
        }
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f64,
    {
        self.tree.ray_cast(input, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(x: f64, y: f64) -> Aabb {
        Aabb::new(DVec2::new(x, y), DVec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn update_pairs_reports_each_pair_once_sorted() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        let a = bp.create_proxy(unit(0.0, 0.0), 0);
        let b = bp.create_proxy(unit(0.5, 0.0), 1);
        let _c = bp.create_proxy(unit(10.0, 0.0), 2);

        let mut emitted = Vec::new();
        bp.update_pairs(|x, y| emitted.push((x, y)));
        assert_eq!(emitted, vec![(0, 1)]);

        // Nothing moved: no pairs.
        emitted.clear();
        bp.update_pairs(|x, y| emitted.push((x, y)));
        assert!(emitted.is_empty());

        // Moving both endpoints still yields the pair once.
        bp.move_proxy(a, unit(0.1, 5.0), DVec2::new(0.0, 5.0));
        bp.move_proxy(b, unit(0.2, 5.0), DVec2::new(0.0, 5.0));
        bp.update_pairs(|x, y| emitted.push((x, y)));
        assert_eq!(emitted, vec![(0, 1)]);
    }

    #[test]
    fn destroyed_proxy_never_reported() {
        let mut bp: BroadPhase<usize> = BroadPhase::new();
        let a = bp.create_proxy(unit(0.0, 0.0), 0);
        let _b = bp.create_proxy(unit(0.5, 0.0), 1);
        bp.destroy_proxy(a);
        let mut emitted = Vec::new();
        bp.update_pairs(|x, y| emitted.push((x, y)));
        assert!(emitted.is_empty());
    }
}
