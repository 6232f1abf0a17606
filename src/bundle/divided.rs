//! Divided half-edges: each edge split at its midpoint into a source half
//! and a target half, each ordered from its anchor node toward the midpoint.

use bevy::math::Vec2;

/// Edges shorter than this are treated as zero-length.
pub const MIN_EDGE_LENGTH: f32 = 1e-6;

/// Which endpoint a half-edge is anchored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// One half of a divided edge: anchor, interior points, midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HalfEdge {
    pub side: Side,
    pub points: Vec<Vec2>,
}

impl HalfEdge {
    fn straight(side: Side, anchor: Vec2, midpoint: Vec2, interior: usize) -> Self {
        let steps = (interior + 1) as f32;
        let points = (0..=interior + 1)
            .map(|i| {
                if i == 0 {
                    anchor
                } else if i == interior + 1 {
                    midpoint
                } else {
                    anchor.lerp(midpoint, i as f32 / steps)
                }
            })
            .collect();
        Self { side, points }
    }

    pub fn anchor(&self) -> Vec2 {
        self.points[0]
    }

    pub fn midpoint(&self) -> Vec2 {
        self.points[self.points.len() - 1]
    }

    pub fn interior_count(&self) -> usize {
        self.points.len() - 2
    }

    pub fn arc_length(&self) -> f32 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// Redistributes the half to `interior` equally spaced interior points
    /// along its current arc. Anchor and midpoint are kept bit-for-bit.
    pub fn resample(&mut self, interior: usize) {
        let anchor = self.anchor();
        let midpoint = self.midpoint();
        let total = self.arc_length();
        if total < MIN_EDGE_LENGTH {
            *self = Self::straight(self.side, anchor, midpoint, interior);
            return;
        }

        let spacing = total / (interior + 1) as f32;
        let mut out = Vec::with_capacity(interior + 2);
        out.push(anchor);

        let mut seg = 0;
        let mut seg_start = 0.0;
        for i in 1..=interior {
            let target = spacing * i as f32;
            while seg + 1 < self.points.len() - 1 {
                let len = self.points[seg].distance(self.points[seg + 1]);
                if seg_start + len >= target {
                    break;
                }
                seg_start += len;
                seg += 1;
            }
            let a = self.points[seg];
            let b = self.points[seg + 1];
            let len = a.distance(b);
            let t = if len > 0.0 {
                ((target - seg_start) / len).clamp(0.0, 1.0)
            } else {
                0.0
            };
            out.push(a.lerp(b, t));
        }

        out.push(midpoint);
        self.points = out;
    }
}

/// An edge as two half-edges sharing one midpoint.
///
/// The full polyline has `2n + 3` points for `n` interior points per half;
/// index `n + 1` is the shared midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DividedEdge {
    pub source_half: HalfEdge,
    pub target_half: HalfEdge,
}

impl DividedEdge {
    /// Straight initial state: both halves run from their anchor to the
    /// geometric midpoint.
    pub fn new(source: Vec2, target: Vec2, interior: usize) -> Self {
        let midpoint = source.lerp(target, 0.5);
        Self {
            source_half: HalfEdge::straight(Side::Source, source, midpoint, interior),
            target_half: HalfEdge::straight(Side::Target, target, midpoint, interior),
        }
    }

    pub fn interior_count(&self) -> usize {
        self.source_half.interior_count()
    }

    /// Number of points on the full polyline.
    pub fn point_count(&self) -> usize {
        self.source_half.points.len() + self.target_half.points.len() - 1
    }

    pub fn midpoint(&self) -> Vec2 {
        self.source_half.midpoint()
    }

    /// Source-to-target polyline.
    pub fn polyline(&self) -> Vec<Vec2> {
        let mut out = Vec::with_capacity(self.point_count());
        out.extend_from_slice(&self.source_half.points);
        out.extend(self.target_half.points.iter().rev().skip(1));
        out
    }

    /// Writes a full polyline back into the two halves. Anchors are not
    /// touched; the midpoint is written to both halves.
    pub fn apply(&mut self, polyline: &[Vec2]) {
        debug_assert_eq!(polyline.len(), self.point_count());
        let half = self.source_half.points.len();
        let last = polyline.len() - 1;
        for k in 1..half {
            self.source_half.points[k] = polyline[k];
            self.target_half.points[k] = polyline[last - k];
        }
    }

    /// Resamples both halves to `interior` points each.
    pub fn resample(&mut self, interior: usize) {
        self.source_half.resample(interior);
        self.target_half.resample(interior);
    }
}

/// Self-loops and zero-length edges are not divided.
pub fn is_degenerate(source: Vec2, target: Vec2, self_loop: bool) -> bool {
    self_loop || source.distance(target) < MIN_EDGE_LENGTH
}
