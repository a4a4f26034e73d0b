//! Sutherland-Hodgman style segment clipping used by the face-based
//! collide routines.

use glam::DVec2;

use crate::collision::manifold::{ContactFeature, FeatureKind};

/// A candidate contact point during clipping, tagged with the feature
/// that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipVertex {
    pub v: DVec2,
    pub feature: ContactFeature,
}

/// Clips the segment `v_in` against the half-plane
/// `dot(normal, x) - offset <= 0`. Returns the surviving points (0..=2).
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: DVec2,
    offset: f64,
    vertex_index_a: u8,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The segment straddles the plane: emit the intersection, labeled as
    // a fresh vertex-on-A / face-on-B feature.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count].v = v_in[0].v + interp * (v_in[1].v - v_in[0].v);
        v_out[count].feature = ContactFeature {
            index_a: vertex_index_a,
            index_b: v_in[0].feature.index_b,
            kind_a: FeatureKind::Vertex,
            kind_b: FeatureKind::Face,
        };
        count += 1;
    }

    (v_out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straddling_segment_is_split() {
        let v_in = [
            ClipVertex {
                v: DVec2::new(-1.0, 0.0),
                ..Default::default()
            },
            ClipVertex {
                v: DVec2::new(1.0, 0.0),
                ..Default::default()
            },
        ];
        let (out, count) = clip_segment_to_line(&v_in, DVec2::X, 0.5, 3);
        assert_eq!(count, 2);
        assert!(out[0].v.x <= 0.5 && out[1].v.x <= 0.5 + 1e-12);
        assert_eq!(out[1].feature.index_a, 3);
    }

    #[test]
    fn fully_outside_segment_is_dropped() {
        let v_in = [
            ClipVertex {
                v: DVec2::new(1.0, 0.0),
                ..Default::default()
            },
            ClipVertex {
                v: DVec2::new(2.0, 0.0),
                ..Default::default()
            },
        ];
        let (_, count) = clip_segment_to_line(&v_in, DVec2::X, 0.5, 0);
        assert_eq!(count, 0);
    }
}
