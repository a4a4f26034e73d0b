//! Self-balancing dynamic AABB tree used by the broad phase.
//!
//! Leaves hold fattened copies of client AABBs so small motions do not
//! restructure the tree. Insertion descends by the surface-area
//! heuristic; every mutation rebalances with AVL-style rotations on the
//! way back to the root. Node ids are stable until the proxy is
//! destroyed, handed out from an internal free list.

use glam::DVec2;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::config::{AABB_EXTENSION, AABB_MULTIPLIER};

pub const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent when allocated, next free slot when on the free list.
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic AABB tree with fat leaves.
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
        }
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list != NULL_NODE {
            let id = self.free_list;
            self.free_list = self.nodes[id].parent;
            let node = &mut self.nodes[id];
            node.parent = NULL_NODE;
            node.child1 = NULL_NODE;
            node.child2 = NULL_NODE;
            node.height = 0;
            node.user_data = None;
            return id;
        }

        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            aabb: Aabb::default(),
            user_data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
        });
        id
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        node.parent = self.free_list;
        node.height = -1;
        node.user_data = None;
        self.free_list = id;
    }

    /// Creates a leaf proxy with a fattened AABB, returns its stable id.
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> usize {
        let id = self.allocate_node();
        self.nodes[id].aabb = aabb.extend(AABB_EXTENSION);
        self.nodes[id].user_data = Some(user_data);
        self.nodes[id].height = 0;
        self.insert_leaf(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: usize) {
        debug_assert!(self.nodes[id].is_leaf());
        self.remove_leaf(id);
        self.free_node(id);
    }

    /// Moves a proxy to a new client AABB. Returns false when the new
    /// bounds still fit the stored fat AABB and no restructure happened.
    pub fn move_proxy(&mut self, id: usize, aabb: Aabb, displacement: DVec2) -> bool {
        debug_assert!(self.nodes[id].is_leaf());
        if self.nodes[id].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id);

        // Predict motion: extend by the skin, then stretch toward where
        // the displacement says the proxy is going.
        let mut fat = aabb.extend(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            fat.lower.x += d.x;
        } else {
            fat.upper.x += d.x;
        }
        if d.y < 0.0 {
            fat.lower.y += d.y;
        } else {
            fat.upper.y += d.y;
        }

        self.nodes[id].aabb = fat;
        self.insert_leaf(id);
        true
    }

    pub fn fat_aabb(&self, id: usize) -> &Aabb {
        &self.nodes[id].aabb
    }

    pub fn user_data(&self, id: usize) -> T {
        self.nodes[id]
            .user_data
            .expect("user data requested for a non-leaf node")
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Total node perimeter over root perimeter, a balance quality metric.
    pub fn area_ratio(&self) -> f64 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        if root_area == 0.0 {
            return 0.0;
        }
        let mut total = 0.0;
        for node in &self.nodes {
            if node.height >= 0 {
                total += node.aabb.perimeter();
            }
        }
        total / root_area
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // SAH descent: at each node choose the cheaper of creating the
        // sibling here versus pushing the leaf into a child.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            let area = self.nodes[index].aabb.perimeter();
            let combined_area = self.nodes[index].aabb.combine(&leaf_aabb).perimeter();

            // Cost of making a new parent for this node and the leaf.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf deeper.
            let inheritance_cost = 2.0 * (combined_area - area);

            let child_cost = |tree: &Self, child: usize| {
                let combined = leaf_aabb.combine(&tree.nodes[child].aabb);
                if tree.nodes[child].is_leaf() {
                    combined.perimeter() + inheritance_cost
                } else {
                    let old_area = tree.nodes[child].aabb.perimeter();
                    combined.perimeter() - old_area + inheritance_cost
                }
            };

            let cost1 = child_cost(self, child1);
            let cost2 = child_cost(self, child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.combine(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.refit_upward(new_parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_upward(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    /// Walks to the root rebalancing and tightening AABBs/heights.
    fn refit_upward(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            self.nodes[index].height =
                1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    /// Rotates the subtree rooted at `a` if its children differ in height
    /// by more than one. Returns the new subtree root.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }

        let b = self.nodes[a].child1;
        let c = self.nodes[a].child2;
        let balance = self.nodes[c].height - self.nodes[b].height;

        if balance > 1 {
            self.rotate_up(a, c, b)
        } else if balance < -1 {
            self.rotate_up(a, b, c)
        } else {
            a
        }
    }

    /// Rotates child `up` above node `a`; `keep` is a's other child.
    fn rotate_up(&mut self, a: usize, up: usize, keep: usize) -> usize {
        let f = self.nodes[up].child1;
        let g = self.nodes[up].child2;

        // up takes a's place.
        self.nodes[up].child1 = a;
        self.nodes[up].parent = self.nodes[a].parent;
        self.nodes[a].parent = up;

        let up_parent = self.nodes[up].parent;
        if up_parent != NULL_NODE {
            if self.nodes[up_parent].child1 == a {
                self.nodes[up_parent].child1 = up;
            } else {
                self.nodes[up_parent].child2 = up;
            }
        } else {
            self.root = up;
        }

        // The taller grandchild stays with up, the other drops to a.
        let (tall, short) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up].child2 = tall;
        if self.nodes[a].child1 == up {
            self.nodes[a].child1 = short;
        } else {
            self.nodes[a].child2 = short;
        }
        self.nodes[short].parent = a;

        self.nodes[a].aabb = self.nodes[keep].aabb.combine(&self.nodes[short].aabb);
        self.nodes[up].aabb = self.nodes[a].aabb.combine(&self.nodes[tall].aabb);
        self.nodes[a].height = 1 + self.nodes[keep].height.max(self.nodes[short].height);
        self.nodes[up].height = 1 + self.nodes[a].height.max(self.nodes[tall].height);

        up
    }

    /// Pre-order traversal of leaves overlapping `aabb`. The callback may
    /// return false to stop the query.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(index) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Ray cast through the tree. At each overlapped leaf the callback is
    /// invoked with the current clipped input; it returns the new max
    /// fraction (0 stops, the unchanged value continues, smaller values
    /// shrink the ray).
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, usize) -> f64,
    {
        let p1 = input.p1;
        let p2 = input.p2;
        let mut max_fraction = input.max_fraction;

        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.test_segment(p1, p2, max_fraction) {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, index);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Checks structural invariants; used by tests and debug assertions.
    pub fn validate(&self) -> bool {
        self.validate_node(self.root)
    }

    fn validate_node(&self, index: usize) -> bool {
        if index == NULL_NODE {
            return true;
        }
        let node = &self.nodes[index];
        if index == self.root && node.parent != NULL_NODE {
            return false;
        }
        if node.is_leaf() {
            return node.child2 == NULL_NODE && node.height == 0 && node.user_data.is_some();
        }

        let child1 = node.child1;
        let child2 = node.child2;
        if self.nodes[child1].parent != index || self.nodes[child2].parent != index {
            return false;
        }
        let expected_height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
        if node.height != expected_height {
            return false;
        }
        let combined = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);
        if !node.aabb.contains(&combined) {
            return false;
        }
        if (self.nodes[child1].height - self.nodes[child2].height).abs() > 1 {
            return false;
        }
        self.validate_node(child1) && self.validate_node(child2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_box(x: f64, y: f64) -> Aabb {
        Aabb::new(DVec2::new(x, y), DVec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn create_and_query_single_proxy() {
        let mut tree: DynamicTree<u32> = DynamicTree::new();
        let id = tree.create_proxy(small_box(0.0, 0.0), 7);
        let mut hits = Vec::new();
        tree.query(&small_box(0.5, 0.5), |node| {
            hits.push(tree.user_data(node));
            true
        });
        assert_eq!(hits, vec![7]);
        assert!(tree.fat_aabb(id).contains(&small_box(0.0, 0.0)));
    }

    #[test]
    fn move_within_fat_bounds_is_a_no_op() {
        let mut tree: DynamicTree<u32> = DynamicTree::new();
        let id = tree.create_proxy(small_box(0.0, 0.0), 1);
        // Inside the skin: no restructure.
        assert!(!tree.move_proxy(id, small_box(0.02, 0.02), DVec2::new(0.02, 0.02)));
        // Far outside: reinsert.
        assert!(tree.move_proxy(id, small_box(5.0, 5.0), DVec2::new(5.0, 5.0)));
        assert!(tree.validate());
    }

    #[test]
    fn tree_stays_balanced_under_sorted_insertion() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let n = 64;
        for i in 0..n {
            tree.create_proxy(small_box(i as f64 * 1.5, 0.0), i);
        }
        assert!(tree.validate());
        // A balanced tree over 64 leaves should be near log2(64) = 6.
        assert!(tree.height() <= 12, "height {} too large", tree.height());
        assert!(tree.area_ratio() >= 1.0);
    }

    #[test]
    fn destroyed_ids_are_recycled() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        let a = tree.create_proxy(small_box(0.0, 0.0), 0);
        let b = tree.create_proxy(small_box(2.0, 0.0), 1);
        tree.destroy_proxy(a);
        let c = tree.create_proxy(small_box(4.0, 0.0), 2);
        assert!(c == a || c > b, "free list should hand back the slot");
        assert!(tree.validate());
    }

    #[test]
    fn ray_cast_visits_leaf_on_path() {
        let mut tree: DynamicTree<usize> = DynamicTree::new();
        for i in 0..8 {
            tree.create_proxy(small_box(i as f64 * 3.0, 0.0), i);
        }
        let mut visited = Vec::new();
        tree.ray_cast(
            &RayCastInput {
                p1: DVec2::new(-1.0, 0.5),
                p2: DVec2::new(30.0, 0.5),
                max_fraction: 1.0,
            },
            |input, node| {
                visited.push(tree.user_data(node));
                input.max_fraction
            },
        );
        visited.sort_unstable();
        assert_eq!(visited, (0..8).collect::<Vec<_>>());
    }
}
