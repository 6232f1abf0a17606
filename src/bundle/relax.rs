//! Force-directed relaxation over divided edges.
//!
//! Every pass selects, for each movable control point, the corresponding
//! points on compatible partner edges. Iterations then move all points
//! synchronously: forces are computed from the iteration-start snapshot and
//! committed together after a barrier.

use bevy::math::Vec2;
use bevy::tasks::{ComputeTaskPool, ParallelSlice, TaskPool};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::bundle::compat::{Compatible, CompatibilityGraph};
use crate::bundle::divided::DividedEdge;
use crate::core::config::{BundleConfig, DEFAULT_STEP_FRACTION};
use crate::core::progress::{Phase, ProgressEvent, ProgressObserver};
use crate::core::spatial::SpatialGrid;

/// Below this distance two points are considered merged.
const MERGE_DISTANCE: f32 = 1e-6;

/// Parameters of one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassParams {
    /// 0-based pass index.
    pub index: usize,
    /// Interior points per half-edge during this pass.
    pub subdivisions: usize,
    /// Largest distance a point may travel during this pass.
    pub step: f32,
    pub iterations: usize,
}

impl PassParams {
    /// Per-iteration displacement cap.
    pub fn iteration_step(&self) -> f32 {
        self.step / self.iterations.max(1) as f32
    }
}

/// The full pass schedule for a run. `scale` is the mean edge length.
pub fn schedule(config: &BundleConfig, scale: f32) -> Vec<PassParams> {
    let base_step = config.step_size.unwrap_or(DEFAULT_STEP_FRACTION * scale);
    let mut subdivisions = config.initial_subdivisions;
    let mut step = base_step;
    let mut iterations = config.iterations as f32;
    let mut out = Vec::with_capacity(config.passes);
    for index in 0..config.passes {
        out.push(PassParams {
            index,
            subdivisions: subdivisions.min(config.max_subdivisions),
            step,
            iterations: (iterations.round() as usize).max(1),
        });
        subdivisions = config.subdivision_growth.next(subdivisions).min(config.max_subdivisions);
        step *= config.step_decay;
        iterations *= config.iteration_decay;
    }
    out
}

/// A partner point pulling on one control point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Influence {
    pub edge: usize,
    pub index: usize,
    /// Compatibility score of the pair.
    pub score: f32,
    /// Score times the optional weight factor.
    pub weight: f32,
    pub opposing: bool,
}

/// Per edge, per polyline index, the influences chosen for a pass.
/// Anchors (first and last index) never have influences.
pub type NeighbourSelection = Vec<Vec<Vec<Influence>>>;

/// Runs passes over a set of divided edges.
pub struct RelaxationEngine<'a> {
    compat: &'a CompatibilityGraph,
    config: &'a BundleConfig,
    /// Relative weight per edge, in [0, 1].
    weight_factor: Vec<f32>,
    attraction_radius: f32,
    lane_width: f32,
    scale: f32,
}

impl<'a> RelaxationEngine<'a> {
    pub fn new(
        compat: &'a CompatibilityGraph,
        config: &'a BundleConfig,
        weights: &[f32],
        scale: f32,
    ) -> Self {
        let max_weight = weights.iter().copied().fold(0.0, f32::max);
        let weight_factor = weights
            .iter()
            .map(|w| {
                if config.weight_attraction && max_weight > 0.0 {
                    w / max_weight
                } else {
                    1.0
                }
            })
            .collect();
        Self {
            compat,
            config,
            weight_factor,
            attraction_radius: config.attraction_radius * scale,
            lane_width: config.lane_width * scale,
            scale,
        }
    }

    fn corresponding(&self, index: usize, count: usize, opposing: bool) -> usize {
        if opposing {
            count - 1 - index
        } else {
            index
        }
    }

    /// Chooses the influencing partner points for every control point,
    /// from the current geometry. `edges[i] == None` marks an edge that is
    /// not bundled.
    pub fn select_neighbours(&self, edges: &[Option<DividedEdge>]) -> NeighbourSelection {
        let polylines: Vec<Option<Vec<Vec2>>> = edges
            .iter()
            .map(|e| e.as_ref().map(DividedEdge::polyline))
            .collect();
        let max_neighbors = self.config.max_neighbors;

        let crowded = (0..edges.len()).any(|i| self.compat.neighbors(i).len() > max_neighbors);
        let grid = crowded.then(|| {
            let count = polylines.iter().flatten().map(Vec::len).next().unwrap_or(2);
            let mut grid = SpatialGrid::new(self.scale / (count - 1).max(1) as f32);
            grid.rebuild(polylines.iter().enumerate().flat_map(|(e, line)| {
                line.iter().flat_map(move |pts| {
                    pts.iter()
                        .enumerate()
                        .skip(1)
                        .take(pts.len().saturating_sub(2))
                        .map(move |(k, p)| ((e, k), *p))
                })
            }));
            grid
        });

        polylines
            .iter()
            .enumerate()
            .map(|(e, line)| {
                let Some(points) = line else {
                    return Vec::new();
                };
                let partners = self.compat.neighbors(e);
                let count = points.len();
                (0..count)
                    .map(|k| {
                        if k == 0 || k + 1 == count || partners.is_empty() {
                            return Vec::new();
                        }
                        let make = |c: &Compatible, index: usize| Influence {
                            edge: c.edge,
                            index,
                            score: c.score,
                            weight: c.score * self.weight_factor[c.edge],
                            opposing: c.opposing,
                        };
                        match &grid {
                            Some(grid) if partners.len() > max_neighbors => grid
                                .nearest(points[k], max_neighbors, f32::INFINITY, |(f, idx)| {
                                    self.compat
                                        .partner(e, f)
                                        .is_some_and(|c| idx == self.corresponding(k, count, c.opposing))
                                })
                                .into_iter()
                                .filter_map(|((f, idx), _)| {
                                    self.compat.partner(e, f).map(|c| make(c, idx))
                                })
                                .collect(),
                            _ => partners
                                .iter()
                                .filter(|c| polylines[c.edge].is_some())
                                .map(|c| make(c, self.corresponding(k, count, c.opposing)))
                                .collect(),
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// New position of point `k` given the iteration-start snapshot.
    fn displaced(
        &self,
        snapshot: &[Option<Vec<Vec2>>],
        points: &[Vec2],
        k: usize,
        influences: &[Influence],
        step: f32,
    ) -> Vec2 {
        let p = points[k];
        let prev = points[k - 1];
        let next = points[k + 1];
        let spring = ((prev + next) * 0.5 - p) * self.config.spring_constant;

        let r = self.attraction_radius;
        let lane = if influences.iter().any(|i| i.opposing) {
            // Right-hand normal of the local direction.
            let t = (next - prev).normalize_or_zero();
            Vec2::new(t.y, -t.x) * self.lane_width
        } else {
            Vec2::ZERO
        };

        let mut pull = Vec2::ZERO;
        for inf in influences {
            let Some(partner) = snapshot[inf.edge].as_ref() else {
                continue;
            };
            let mut q = partner[inf.index];
            if inf.opposing {
                q += lane;
            }
            let v = q - p;
            if v.length_squared() < MERGE_DISTANCE * MERGE_DISTANCE {
                continue;
            }
            // w·v·r / (r² + |v|²), evaluated in units of r.
            let u = v / r;
            pull += u * (inf.weight / (1.0 + u.length_squared()));
        }
        let pull = pull.clamp_length_max(1.0);

        let delta = (spring + pull * step).clamp_length_max(step);
        if delta.is_finite() {
            p + delta
        } else {
            p
        }
    }

    /// Runs one pass in place and returns the neighbour selection it used.
    pub fn run_pass(
        &self,
        edges: &mut [Option<DividedEdge>],
        params: &PassParams,
        total_passes: usize,
        observer: &dyn ProgressObserver,
    ) -> NeighbourSelection {
        let selection = self.select_neighbours(edges);
        let pool = ComputeTaskPool::get_or_init(TaskPool::default);
        let step = params.iteration_step();
        let indices: Vec<usize> = (0..edges.len()).collect();
        let chunk = (edges.len() / (pool.thread_num().max(1) * 4)).max(1);
        let done = AtomicUsize::new(0);
        let total = edges.len();

        let mut snapshot: Vec<Option<Vec<Vec2>>> = edges
            .iter()
            .map(|e| e.as_ref().map(DividedEdge::polyline))
            .collect();

        for iteration in 0..params.iterations {
            let last = iteration + 1 == params.iterations;
            let current = &snapshot;
            let selection = &selection;
            let done = &done;
            let next: Vec<Vec<Option<Vec<Vec2>>>> = indices.par_chunk_map(pool, chunk, |_, chunk| {
                chunk
                    .iter()
                    .map(|&e| {
                        let moved = current[e].as_ref().and_then(|points| {
                            let influences = &selection[e];
                            if influences.iter().all(Vec::is_empty) {
                                return None;
                            }
                            let mut out = points.clone();
                            for k in 1..points.len() - 1 {
                                out[k] = self.displaced(current, points, k, &influences[k], step);
                            }
                            Some(out)
                        });
                        if last {
                            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                            observer.on_progress(ProgressEvent {
                                phase: Phase::Pass {
                                    index: params.index + 1,
                                    of: total_passes,
                                },
                                completed,
                                total,
                            });
                        }
                        moved
                    })
                    .collect()
            });
            // Barrier: every displacement is known before any is committed.
            for (e, moved) in next.into_iter().flatten().enumerate() {
                if let Some(points) = moved {
                    snapshot[e] = Some(points);
                }
            }
        }

        for (edge, points) in edges.iter_mut().zip(&snapshot) {
            if let (Some(edge), Some(points)) = (edge.as_mut(), points) {
                edge.apply(points);
            }
        }
        selection
    }
}
