use glam::DVec2;
use planar_accelerator::collision::dynamic_tree::DynamicTree;
use planar_accelerator::collision::Aabb;

/// Deterministic PRNG so failures reproduce exactly.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let t = (self.next() % 1_000_000) as f64 / 1_000_000.0;
        lo + t * (hi - lo)
    }
}

fn random_aabb(rng: &mut Lcg) -> Aabb {
    let x = rng.uniform(-50.0, 50.0);
    let y = rng.uniform(-50.0, 50.0);
    let w = rng.uniform(0.1, 4.0);
    let h = rng.uniform(0.1, 4.0);
    Aabb::new(DVec2::new(x, y), DVec2::new(x + w, y + h))
}

#[test]
fn stress_random_operations_keep_invariants() {
    let mut rng = Lcg(0x5eed);
    let mut tree: DynamicTree<usize> = DynamicTree::new();
    let mut live: Vec<(usize, usize)> = Vec::new(); // (proxy id, tag)
    let mut next_tag = 0usize;

    // Seed population.
    for _ in 0..128 {
        let id = tree.create_proxy(random_aabb(&mut rng), next_tag);
        live.push((id, next_tag));
        next_tag += 1;
    }

    for op in 0..10_000 {
        match rng.next() % 3 {
            0 => {
                let id = tree.create_proxy(random_aabb(&mut rng), next_tag);
                live.push((id, next_tag));
                next_tag += 1;
            }
            1 => {
                if live.len() > 8 {
                    let index = (rng.next() as usize) % live.len();
                    let (id, _) = live.swap_remove(index);
                    tree.destroy_proxy(id);
                }
            }
            _ => {
                if !live.is_empty() {
                    let index = (rng.next() as usize) % live.len();
                    let (id, _) = live[index];
                    let aabb = random_aabb(&mut rng);
                    let displacement =
                        DVec2::new(rng.uniform(-2.0, 2.0), rng.uniform(-2.0, 2.0));
                    tree.move_proxy(id, aabb, displacement);
                }
            }
        }

        if op % 500 == 0 {
            assert!(tree.validate(), "tree invariants broken at op {op}");
        }
    }

    assert!(tree.validate());
    assert!(tree.area_ratio() >= 1.0);

    // Query results must match a brute-force oracle over the fat AABBs.
    for _ in 0..50 {
        let query = random_aabb(&mut rng);

        let mut expected: Vec<usize> = live
            .iter()
            .filter(|(id, _)| tree.fat_aabb(*id).overlaps(&query))
            .map(|(_, tag)| *tag)
            .collect();
        expected.sort_unstable();

        let mut actual = Vec::new();
        tree.query(&query, |node| {
            actual.push(tree.user_data(node));
            true
        });
        actual.sort_unstable();

        assert_eq!(expected, actual);
    }
}

#[test]
fn query_early_exit_stops_traversal() {
    let mut tree: DynamicTree<usize> = DynamicTree::new();
    for i in 0..16 {
        tree.create_proxy(
            Aabb::new(DVec2::new(0.0, 0.0), DVec2::new(1.0, 1.0)),
            i,
        );
    }
    let mut visits = 0;
    tree.query(
        &Aabb::new(DVec2::new(0.2, 0.2), DVec2::new(0.8, 0.8)),
        |_| {
            visits += 1;
            false
        },
    );
    assert_eq!(visits, 1);
}
