//! Sequential-impulse contact constraint solver.
//!
//! Velocity constraints accumulate a non-negative normal impulse and a
//! friction impulse clamped to the friction cone; warm starting seeds
//! both from the previous step. Position constraints push overlapping
//! bodies apart with a Baumgarte-limited pseudo impulse that never adds
//! momentum.

use glam::DVec2;

use crate::collision::manifold::{Manifold, ManifoldType};
use crate::config::{
    BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};
use crate::dynamics::contact::{ContactImpulse, ContactKey};
use crate::dynamics::{Position, TimeStep, Velocity};
use crate::utils::math::{cross, cross_sv, Rot, Transform2};

/// Everything the solver needs to know about one contact, gathered by
/// the island so no arena borrows outlive setup.
#[derive(Debug, Clone)]
pub struct ContactInit {
    pub key: ContactKey,
    pub manifold: Manifold,
    pub index_a: usize,
    pub index_b: usize,
    pub inv_mass_a: f64,
    pub inv_mass_b: f64,
    pub inv_i_a: f64,
    pub inv_i_b: f64,
    pub local_center_a: DVec2,
    pub local_center_b: DVec2,
    pub radius_a: f64,
    pub radius_b: f64,
    pub friction: f64,
    pub restitution: f64,
    pub tangent_speed: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    ra: DVec2,
    rb: DVec2,
    normal_impulse: f64,
    tangent_impulse: f64,
    normal_mass: f64,
    tangent_mass: f64,
    velocity_bias: f64,
}

#[derive(Debug, Clone)]
struct ContactVelocityConstraint {
    points: Vec<VelocityConstraintPoint>,
    normal: DVec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    friction: f64,
    restitution: f64,
    tangent_speed: f64,
    contact_index: usize,
}

#[derive(Debug, Clone)]
struct ContactPositionConstraint {
    local_points: Vec<DVec2>,
    local_normal: DVec2,
    local_point: DVec2,
    manifold_type: ManifoldType,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f64,
    inv_mass_b: f64,
    inv_i_a: f64,
    inv_i_b: f64,
    local_center_a: DVec2,
    local_center_b: DVec2,
    radius_a: f64,
    radius_b: f64,
}

pub struct ContactSolver {
    step: TimeStep,
    inits: Vec<ContactInit>,
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    pub fn new(step: TimeStep, inits: Vec<ContactInit>) -> Self {
        let mut velocity_constraints = Vec::with_capacity(inits.len());
        let mut position_constraints = Vec::with_capacity(inits.len());

        for (contact_index, init) in inits.iter().enumerate() {
            debug_assert!(init.manifold.point_count() > 0);

            velocity_constraints.push(ContactVelocityConstraint {
                points: init
                    .manifold
                    .points
                    .iter()
                    .map(|mp| VelocityConstraintPoint {
                        // Warm-start impulses scaled for the step-length
                        // change; dropped entirely when warm starting is
                        // off.
                        normal_impulse: if step.warm_starting {
                            step.dt_ratio * mp.normal_impulse
                        } else {
                            0.0
                        },
                        tangent_impulse: if step.warm_starting {
                            step.dt_ratio * mp.tangent_impulse
                        } else {
                            0.0
                        },
                        ..Default::default()
                    })
                    .collect(),
                normal: DVec2::ZERO,
                index_a: init.index_a,
                index_b: init.index_b,
                inv_mass_a: init.inv_mass_a,
                inv_mass_b: init.inv_mass_b,
                inv_i_a: init.inv_i_a,
                inv_i_b: init.inv_i_b,
                friction: init.friction,
                restitution: init.restitution,
                tangent_speed: init.tangent_speed,
                contact_index,
            });

            position_constraints.push(ContactPositionConstraint {
                local_points: init.manifold.points.iter().map(|mp| mp.local_point).collect(),
                local_normal: init.manifold.local_normal,
                local_point: init.manifold.local_point,
                manifold_type: init.manifold.manifold_type,
                index_a: init.index_a,
                index_b: init.index_b,
                inv_mass_a: init.inv_mass_a,
                inv_mass_b: init.inv_mass_b,
                inv_i_a: init.inv_i_a,
                inv_i_b: init.inv_i_b,
                local_center_a: init.local_center_a,
                local_center_b: init.local_center_b,
                radius_a: init.radius_a,
                radius_b: init.radius_b,
            });
        }

        Self {
            step,
            inits,
            velocity_constraints,
            position_constraints,
        }
    }

    /// Builds world-space constraint data from the current island poses.
    pub fn initialize_velocity_constraints(
        &mut self,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for vc in &mut self.velocity_constraints {
            let init = &self.inits[vc.contact_index];

            let xf_a = island_transform(&positions[vc.index_a], init.local_center_a);
            let xf_b = island_transform(&positions[vc.index_b], init.local_center_b);

            let world_manifold = crate::collision::manifold::WorldManifold::initialize(
                &init.manifold,
                &xf_a,
                init.radius_a,
                &xf_b,
                init.radius_b,
            );

            vc.normal = world_manifold.normal;
            let tangent = DVec2::new(vc.normal.y, -vc.normal.x);

            let c_a = positions[vc.index_a].c;
            let c_b = positions[vc.index_b].c;
            let v_a = velocities[vc.index_a];
            let v_b = velocities[vc.index_b];

            for (i, point) in vc.points.iter_mut().enumerate() {
                point.ra = world_manifold.points[i] - c_a;
                point.rb = world_manifold.points[i] - c_b;

                let rn_a = cross(point.ra, vc.normal);
                let rn_b = cross(point.rb, vc.normal);
                let k_normal = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn_a * rn_a
                    + vc.inv_i_b * rn_b * rn_b;
                point.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(point.ra, tangent);
                let rt_b = cross(point.rb, tangent);
                let k_tangent = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rt_a * rt_a
                    + vc.inv_i_b * rt_b * rt_b;
                point.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias from the approach speed.
                point.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b.v + cross_sv(v_b.w, point.rb) - v_a.v - cross_sv(v_a.w, point.ra),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    point.velocity_bias = -vc.restitution * v_rel;
                }
            }
        }
    }

    /// Applies last step's impulses so the iterative solve starts close
    /// to the solution.
    pub fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];
            let tangent = DVec2::new(vc.normal.y, -vc.normal.x);

            for point in &vc.points {
                let p = point.normal_impulse * vc.normal + point.tangent_impulse * tangent;
                v_a.v -= vc.inv_mass_a * p;
                v_a.w -= vc.inv_i_a * cross(point.ra, p);
                v_b.v += vc.inv_mass_b * p;
                v_b.w += vc.inv_i_b * cross(point.rb, p);
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];
            let normal = vc.normal;
            let tangent = DVec2::new(normal.y, -normal.x);

            for point in &mut vc.points {
                // Normal impulse, accumulated and clamped to >= 0.
                let dv = v_b.v + cross_sv(v_b.w, point.rb) - v_a.v - cross_sv(v_a.w, point.ra);
                let vn = dv.dot(normal);
                let lambda = -point.normal_mass * (vn - point.velocity_bias);

                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let delta = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = delta * normal;
                v_a.v -= vc.inv_mass_a * p;
                v_a.w -= vc.inv_i_a * cross(point.ra, p);
                v_b.v += vc.inv_mass_b * p;
                v_b.w += vc.inv_i_b * cross(point.rb, p);
            }

            for point in &mut vc.points {
                // Friction impulse, clamped to the cone set by the
                // accumulated normal impulse.
                let dv = v_b.v + cross_sv(v_b.w, point.rb) - v_a.v - cross_sv(v_a.w, point.ra);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = point.tangent_mass * (-vt);

                let max_friction = vc.friction * point.normal_impulse;
                let new_impulse = (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let delta = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = delta * tangent;
                v_a.v -= vc.inv_mass_a * p;
                v_a.w -= vc.inv_i_a * cross(point.ra, p);
                v_b.v += vc.inv_mass_b * p;
                v_b.w += vc.inv_i_b * cross(point.rb, p);
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// Writes accumulated impulses back into the init manifolds; the
    /// island copies them into the persistent contacts.
    pub fn store_impulses(&mut self) {
        for vc in &self.velocity_constraints {
            let manifold = &mut self.inits[vc.contact_index].manifold;
            for (mp, point) in manifold.points.iter_mut().zip(&vc.points) {
                mp.normal_impulse = point.normal_impulse;
                mp.tangent_impulse = point.tangent_impulse;
            }
        }
    }

    pub fn impulses(&self) -> Vec<(ContactKey, ContactImpulse)> {
        self.velocity_constraints
            .iter()
            .map(|vc| {
                let mut impulse = ContactImpulse {
                    count: vc.points.len(),
                    ..Default::default()
                };
                for (i, point) in vc.points.iter().enumerate().take(MAX_MANIFOLD_POINTS) {
                    impulse.normal_impulses[i] = point.normal_impulse;
                    impulse.tangent_impulses[i] = point.tangent_impulse;
                }
                (self.inits[vc.contact_index].key, impulse)
            })
            .collect()
    }

    pub fn solved_manifolds(&self) -> impl Iterator<Item = (ContactKey, &Manifold)> {
        self.inits.iter().map(|init| (init.key, &init.manifold))
    }

    /// Discrete position corrector. Returns true when the worst
    /// separation is within tolerance.
    pub fn solve_position_constraints(&mut self, positions: &mut [Position]) -> bool {
        self.solve_positions(positions, BAUMGARTE, None)
    }

    /// TOI position corrector: only the two sub-stepped bodies receive
    /// corrections; everything else in the mini-island is an anchor.
    pub fn solve_toi_position_constraints(
        &mut self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        self.solve_positions(positions, TOI_BAUMGARTE, Some((toi_index_a, toi_index_b)))
    }

    fn solve_positions(
        &mut self,
        positions: &mut [Position],
        baumgarte: f64,
        toi_pair: Option<(usize, usize)>,
    ) -> bool {
        let mut min_separation = 0.0_f64;

        for pc in &self.position_constraints {
            let (inv_mass_a, inv_i_a, inv_mass_b, inv_i_b) = match toi_pair {
                None => (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b),
                Some((ia, ib)) => {
                    let a_active = pc.index_a == ia || pc.index_a == ib;
                    let b_active = pc.index_b == ia || pc.index_b == ib;
                    (
                        if a_active { pc.inv_mass_a } else { 0.0 },
                        if a_active { pc.inv_i_a } else { 0.0 },
                        if b_active { pc.inv_mass_b } else { 0.0 },
                        if b_active { pc.inv_i_b } else { 0.0 },
                    )
                }
            };

            for point_index in 0..pc.local_points.len() {
                let xf_a = island_transform(&positions[pc.index_a], pc.local_center_a);
                let xf_b = island_transform(&positions[pc.index_b], pc.local_center_b);

                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, point_index);
                min_separation = min_separation.min(separation);

                let ra = point - positions[pc.index_a].c;
                let rb = point - positions[pc.index_b].c;

                // Limited correction prevents overshoot.
                let c = (baumgarte * (separation + LINEAR_SLOP))
                    .clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = cross(ra, normal);
                let rn_b = cross(rb, normal);
                let k =
                    inv_mass_a + inv_mass_b + inv_i_a * rn_a * rn_a + inv_i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * normal;

                positions[pc.index_a].c -= inv_mass_a * p;
                positions[pc.index_a].a -= inv_i_a * cross(ra, p);
                positions[pc.index_b].c += inv_mass_b * p;
                positions[pc.index_b].a += inv_i_b * cross(rb, p);
            }
        }

        // Accept up to 3 slops of residual overlap.
        min_separation >= -3.0 * LINEAR_SLOP
    }
}

fn island_transform(position: &Position, local_center: DVec2) -> Transform2 {
    let q = Rot::from_angle(position.a);
    Transform2 {
        p: position.c - q.apply(local_center),
        q,
    }
}

/// Point/normal/separation for one manifold point at the given poses.
fn position_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Transform2,
    xf_b: &Transform2,
    index: usize,
) -> (DVec2, DVec2, f64) {
    match pc.manifold_type {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize_or_zero();
            let point = 0.5 * (point_a + point_b);
            let separation =
                (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            let separation =
                (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            let separation =
                (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Report with A as the reference so the push direction is
            // consistent.
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::{ContactFeature, ManifoldPoint};

    fn head_on_init() -> ContactInit {
        // Two unit-mass circles, B to the right of A, overlapping 0.1.
        ContactInit {
            key: ContactKey::new(0, 1),
            manifold: Manifold {
                manifold_type: ManifoldType::Circles,
                local_normal: DVec2::ZERO,
                local_point: DVec2::ZERO,
                points: vec![ManifoldPoint {
                    local_point: DVec2::ZERO,
                    feature: ContactFeature::vertex_vertex(0, 0),
                    ..Default::default()
                }],
            },
            index_a: 0,
            index_b: 1,
            inv_mass_a: 1.0,
            inv_mass_b: 1.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            local_center_a: DVec2::ZERO,
            local_center_b: DVec2::ZERO,
            radius_a: 0.5,
            radius_b: 0.5,
            friction: 0.0,
            restitution: 0.0,
            tangent_speed: 0.0,
        }
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn normal_impulse_stops_approach() {
        let mut solver = ContactSolver::new(step(), vec![head_on_init()]);
        let positions = vec![
            Position {
                c: DVec2::new(0.0, 0.0),
                a: 0.0,
            },
            Position {
                c: DVec2::new(0.9, 0.0),
                a: 0.0,
            },
        ];
        let mut velocities = vec![
            Velocity {
                v: DVec2::new(0.5, 0.0),
                w: 0.0,
            },
            Velocity {
                v: DVec2::new(-0.5, 0.0),
                w: 0.0,
            },
        ];
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        let approach = (velocities[1].v - velocities[0].v).x;
        assert!(
            approach >= -1e-9,
            "bodies still approaching: {approach}"
        );
        // Impulse invariant: the accumulated normal impulse is positive.
        solver.store_impulses();
        let (_, impulse) = solver.impulses()[0];
        assert!(impulse.normal_impulses[0] > 0.0);
    }

    #[test]
    fn position_solve_reduces_overlap() {
        let mut solver = ContactSolver::new(step(), vec![head_on_init()]);
        let mut positions = vec![
            Position {
                c: DVec2::new(0.0, 0.0),
                a: 0.0,
            },
            Position {
                c: DVec2::new(0.9, 0.0),
                a: 0.0,
            },
        ];
        let before = positions[1].c.x - positions[0].c.x;
        for _ in 0..10 {
            if solver.solve_position_constraints(&mut positions) {
                break;
            }
        }
        let after = positions[1].c.x - positions[0].c.x;
        assert!(after > before, "separation should grow: {before} -> {after}");
    }
}
