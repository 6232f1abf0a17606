//! Pairwise edge compatibility and the pruned influence graph.
//!
//! Scores combine four terms in [0, 1] by product:
//! angle `max(0, cos θ)` (or `|cos θ|` when opposing edges may bundle),
//! scale `2 / (lavg / lmin + lmax / lavg)`, position `lavg / (lavg + |Δmid|)`,
//! and visibility `min(V(P, Q), V(Q, P))`.

use bevy::math::Vec2;
use bevy::tasks::{ComputeTaskPool, ParallelSlice, TaskPool};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::progress::{Phase, ProgressEvent, ProgressObserver};
use crate::core::spatial::SpatialGrid;

const EPSILON: f32 = 1e-6;
/// Pairs with a coordinate beyond this are scored on a rescaled copy.
const RESCALE_ABOVE: f32 = 1e15;

/// Straight-line geometry of one edge, as seen by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub source: Vec2,
    pub target: Vec2,
}

impl Segment {
    pub fn new(source: Vec2, target: Vec2) -> Self {
        Self { source, target }
    }

    pub fn vector(&self) -> Vec2 {
        self.target - self.source
    }

    /// Euclidean length, finite whenever the difference vector is.
    pub fn length(&self) -> f32 {
        let v = self.vector();
        let len = v.length();
        if len.is_finite() || !v.is_finite() {
            return len;
        }
        let m = v.abs().max_element();
        m * (v / m).length()
    }

    pub fn midpoint(&self) -> Vec2 {
        self.source.lerp(self.target, 0.5)
    }

    fn extent(&self) -> f32 {
        self.source.abs().max_element().max(self.target.abs().max_element())
    }

    fn scaled(&self, factor: f32) -> Self {
        Self::new(self.source * factor, self.target * factor)
    }
}

/// The four sub-scores of one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compatibility {
    pub angle: f32,
    pub scale: f32,
    pub position: f32,
    pub visibility: f32,
    /// Edges point in opposite directions.
    pub opposing: bool,
}

impl Compatibility {
    /// Product of the terms in [0, 1]. A non-finite product scores 0.
    pub fn score(&self) -> f32 {
        let s = self.angle * self.scale * self.position * self.visibility;
        if s.is_finite() {
            s.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Projection of `point` onto the infinite line through `seg`.
fn project(point: Vec2, seg: &Segment) -> Vec2 {
    let v = seg.vector();
    let len2 = v.length_squared();
    if len2 < EPSILON * EPSILON {
        return seg.source;
    }
    seg.source + v * ((point - seg.source).dot(v) / len2)
}

fn visibility(p: &Segment, q: &Segment) -> f32 {
    let i0 = project(q.source, p);
    let i1 = project(q.target, p);
    let span = i0.distance(i1);
    if span < EPSILON {
        return 0.0;
    }
    let im = i0.lerp(i1, 0.5);
    (1.0 - 2.0 * p.midpoint().distance(im) / span).max(0.0)
}

/// Scores a pair of edges. Zero-length edges are compatible with nothing.
///
/// Every term is a ratio, so very large pairs are scored after dividing
/// both by their shared extent.
pub fn compatibility(p: &Segment, q: &Segment, bidirectional: bool) -> Compatibility {
    let extent = p.extent().max(q.extent());
    if extent > RESCALE_ABOVE && extent.is_finite() {
        let factor = extent.recip();
        return compatibility(&p.scaled(factor), &q.scaled(factor), bidirectional);
    }

    let lp = p.length();
    let lq = q.length();
    if lp < EPSILON || lq < EPSILON {
        return Compatibility {
            angle: 0.0,
            scale: 0.0,
            position: 0.0,
            visibility: 0.0,
            opposing: false,
        };
    }

    let cos = (p.vector().dot(q.vector()) / (lp * lq)).clamp(-1.0, 1.0);
    let opposing = bidirectional && cos < 0.0;
    let angle = if bidirectional { cos.abs() } else { cos.max(0.0) };

    let lavg = (lp + lq) * 0.5;
    let scale = 2.0 / (lavg / lp.min(lq) + lp.max(lq) / lavg);
    let position = lavg / (lavg + p.midpoint().distance(q.midpoint()));
    let visibility = visibility(p, q).min(visibility(q, p));

    Compatibility {
        angle,
        scale: scale.clamp(0.0, 1.0),
        position,
        visibility,
        opposing,
    }
}

/// Convenience for the combined score.
pub fn score(p: &Segment, q: &Segment, bidirectional: bool) -> f32 {
    compatibility(p, q, bidirectional).score()
}

/// One retained neighbour in the influence graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compatible {
    pub edge: usize,
    pub score: f32,
    pub opposing: bool,
}

/// Sparse symmetric influence graph: per edge, its partners above the
/// threshold, sorted by edge index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatibilityGraph {
    adjacency: Vec<Vec<Compatible>>,
}

impl CompatibilityGraph {
    pub fn edge_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn neighbors(&self, edge: usize) -> &[Compatible] {
        self.adjacency.get(edge).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stored score, 0 for pruned or unknown pairs.
    pub fn score(&self, a: usize, b: usize) -> f32 {
        self.partner(a, b).map(|c| c.score).unwrap_or(0.0)
    }

    pub fn partner(&self, a: usize, b: usize) -> Option<&Compatible> {
        let list = self.neighbors(a);
        list.binary_search_by_key(&b, |c| c.edge)
            .ok()
            .map(|i| &list[i])
    }

    /// Number of unordered pairs kept.
    pub fn pair_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }
}

/// Builds the influence graph. `segments[i] == None` marks a degenerate edge.
///
/// Candidate pairs come from a midpoint grid: since the position term alone
/// drops below `threshold` beyond `lavg * (1 / threshold - 1)`, the radius
/// query never misses a pair that would survive pruning.
pub fn build_compatibility_graph(
    segments: &[Option<Segment>],
    threshold: f32,
    bidirectional: bool,
    observer: &dyn ProgressObserver,
) -> CompatibilityGraph {
    let n = segments.len();
    let lengths: Vec<f32> = segments
        .iter()
        .map(|s| s.map(|s| s.length()).unwrap_or(0.0))
        .collect();
    let live = lengths.iter().filter(|l| **l > 0.0).count();
    let max_len = lengths.iter().copied().fold(0.0, f32::max);
    let mean_len = if live > 0 {
        lengths.iter().sum::<f32>() / live as f32
    } else {
        1.0
    };

    let mut grid = SpatialGrid::new(mean_len);
    grid.rebuild(
        segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s.midpoint()))),
    );

    let reach = if threshold > 0.0 {
        1.0 / threshold - 1.0
    } else {
        f32::INFINITY
    };

    let pool = ComputeTaskPool::get_or_init(TaskPool::default);
    let done = AtomicUsize::new(0);
    let indices: Vec<usize> = (0..n).collect();
    let chunk = (n / (pool.thread_num().max(1) * 4)).max(1);

    let pairs: Vec<Vec<(usize, usize, Compatible)>> = indices.par_chunk_map(pool, chunk, |_, chunk| {
        let mut out = Vec::new();
        for &i in chunk {
            if let Some(p) = segments[i] {
                let radius = (lengths[i] + max_len) * 0.5 * reach * (1.0 + 1e-4) + EPSILON;
                for (j, _) in grid.query_radius(p.midpoint(), radius) {
                    if j <= i {
                        continue;
                    }
                    let Some(q) = segments[j] else {
                        continue;
                    };
                    let c = compatibility(&p, &q, bidirectional);
                    let s = c.score();
                    if s > 0.0 && s >= threshold {
                        out.push((i, j, Compatible { edge: j, score: s, opposing: c.opposing }));
                    }
                }
            }
            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
            observer.on_progress(ProgressEvent {
                phase: Phase::Preprocessing,
                completed,
                total: n,
            });
        }
        out
    });

    let mut adjacency: Vec<Vec<Compatible>> = vec![Vec::new(); n];
    for (i, j, c) in pairs.into_iter().flatten() {
        adjacency[i].push(c);
        adjacency[j].push(Compatible { edge: i, ..c });
    }
    for list in &mut adjacency {
        list.sort_by_key(|c| c.edge);
    }
    CompatibilityGraph { adjacency }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::NoProgress;

    fn seg(x0: f32, y0: f32, x1: f32, y1: f32) -> Segment {
        Segment::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn identical_edges_score_one() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        assert!((score(&a, &a, false) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parallel_neighbours_score_high() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let b = seg(0.0, 1.0, 10.0, 1.0);
        let c = compatibility(&a, &b, false);
        assert_eq!(c.angle, 1.0);
        assert!((c.scale - 1.0).abs() < 1e-6);
        assert!((c.visibility - 1.0).abs() < 1e-6);
        assert!(c.score() > 0.85);
    }

    #[test]
    fn perpendicular_and_opposing_edges_score_zero() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let up = seg(5.0, -5.0, 5.0, 5.0);
        let back = seg(10.0, 1.0, 0.0, 1.0);
        assert!(score(&a, &up, false).abs() < 1e-6);
        assert_eq!(score(&a, &back, false), 0.0);
    }

    #[test]
    fn bidirectional_marks_opposing_pairs() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let back = seg(10.0, 1.0, 0.0, 1.0);
        let c = compatibility(&a, &back, true);
        assert!(c.opposing);
        assert!(c.score() > 0.85);
    }

    #[test]
    fn visibility_drops_for_offset_edges() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let far = seg(20.0, 0.5, 30.0, 0.5);
        assert_eq!(compatibility(&a, &far, false).visibility, 0.0);
    }

    #[test]
    fn scale_penalises_length_disparity() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let short = seg(4.0, 1.0, 6.0, 1.0);
        let c = compatibility(&a, &short, false);
        assert!(c.scale < 0.6);
    }

    #[test]
    fn zero_length_is_incompatible() {
        let a = seg(0.0, 0.0, 10.0, 0.0);
        let dot = seg(3.0, 3.0, 3.0, 3.0);
        assert_eq!(score(&a, &dot, false), 0.0);
        assert_eq!(score(&dot, &a, false), 0.0);
    }

    #[test]
    fn huge_segments_score_like_their_small_copies() {
        let a = seg(-1e19, 0.0, 1e19, 0.0);
        let b = seg(-1e19, 1e17, 1e19, 1e17);
        assert_eq!(a.length(), 2e19);
        let big = score(&a, &b, false);
        let small = score(&seg(-1.0, 0.0, 1.0, 0.0), &seg(-1.0, 0.01, 1.0, 0.01), false);
        assert!(big.is_finite());
        assert!(big > 0.9, "score {big}");
        assert!((big - small).abs() < 1e-4);
        assert_eq!(big, score(&b, &a, false));

        let edge = seg(-f32::MAX, 0.0, f32::MAX, 0.0);
        assert!((0.0..=1.0).contains(&score(&edge, &a, true)));

        let graph = build_compatibility_graph(&[Some(a), Some(b)], 0.05, false, &NoProgress);
        assert_eq!(graph.neighbors(0).len(), 1);
        assert_eq!(graph.score(0, 1), big);
    }

    #[test]
    fn non_finite_terms_score_zero() {
        let c = Compatibility {
            angle: f32::NAN,
            scale: 1.0,
            position: 1.0,
            visibility: 1.0,
            opposing: false,
        };
        assert_eq!(c.score(), 0.0);
        assert_eq!(Compatibility { angle: f32::INFINITY, ..c }.score(), 0.0);
    }

    #[test]
    fn graph_is_symmetric_and_pruned() {
        let segments = vec![
            Some(seg(0.0, 0.0, 10.0, 0.0)),
            Some(seg(0.0, 1.0, 10.0, 1.0)),
            None,
            Some(seg(5.0, -5.0, 5.0, 5.0)),
            Some(seg(500.0, 0.0, 510.0, 0.0)),
        ];
        let graph = build_compatibility_graph(&segments, 0.05, false, &NoProgress);
        assert_eq!(graph.edge_count(), 5);
        assert!(graph.score(0, 1) > 0.8);
        assert_eq!(graph.score(0, 1), graph.score(1, 0));
        assert!(graph.neighbors(2).is_empty());
        assert!(graph.neighbors(3).is_empty());
        assert!(graph.neighbors(4).is_empty());
        assert_eq!(graph.pair_count(), 1);
    }

    #[test]
    fn threshold_one_prunes_everything_but_duplicates() {
        let segments = vec![
            Some(seg(0.0, 0.0, 10.0, 0.0)),
            Some(seg(0.0, 1.0, 10.0, 1.0)),
        ];
        let graph = build_compatibility_graph(&segments, 1.0, false, &NoProgress);
        assert_eq!(graph.pair_count(), 0);
    }

    #[test]
    fn zero_threshold_scans_all_pairs() {
        let segments = vec![
            Some(seg(0.0, 0.0, 10.0, 0.0)),
            Some(seg(1000.0, 0.0, 1010.0, 0.0)),
        ];
        let graph = build_compatibility_graph(&segments, 0.0, false, &NoProgress);
        // Far apart: position term is tiny, visibility is zero.
        assert_eq!(graph.pair_count(), 0);
        let segments = vec![
            Some(seg(0.0, 0.0, 10.0, 0.0)),
            Some(seg(0.0, 300.0, 10.0, 300.0)),
        ];
        let graph = build_compatibility_graph(&segments, 0.0, false, &NoProgress);
        assert_eq!(graph.pair_count(), 1);
    }

    #[test]
    fn grid_candidates_match_brute_force() {
        let mut segments = Vec::new();
        for i in 0..12 {
            let y = (i % 4) as f32 * 3.0;
            let x = (i / 4) as f32 * 7.0;
            segments.push(Some(seg(x, y, x + 9.0 + i as f32 * 0.3, y + (i % 3) as f32)));
        }
        let threshold = 0.1;
        let graph = build_compatibility_graph(&segments, threshold, false, &NoProgress);
        for i in 0..segments.len() {
            for j in 0..segments.len() {
                if i == j {
                    continue;
                }
                let s = score(segments[i].as_ref().unwrap(), segments[j].as_ref().unwrap(), false);
                if s >= threshold && s > 0.0 {
                    assert_eq!(graph.score(i, j), s, "pair ({i}, {j}) missing");
                } else {
                    assert_eq!(graph.score(i, j), 0.0);
                }
            }
        }
    }
}
