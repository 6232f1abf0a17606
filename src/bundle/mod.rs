//! Divided edge bundling: validation, the pass loop and result assembly.
//!
//! ```no_run
//! use divided_edges::{bundle_edges, BundleConfig, DirectedGraph};
//!
//! let mut graph = DirectedGraph::new();
//! graph.add_node("a", 0.0, 0.0).add_node("b", 100.0, 0.0);
//! graph.add_edge("a", "b", 1.0);
//! let bundled = bundle_edges(&graph, &BundleConfig::default())?;
//! assert_eq!(bundled.edges.len(), 1);
//! # Ok::<(), divided_edges::BundleError>(())
//! ```

pub mod compat;
pub mod divided;
pub mod relax;

use bevy::log::{debug, info};
use bevy::math::Vec2;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::BundleConfig;
use crate::core::error::{BundleError, BundleResult};
use crate::core::graph::{BundleOverlay, BundledGraph, DirectedGraph, EdgeBundle};
use crate::core::progress::{CancelToken, NoProgress, Phase, ProgressEvent, ProgressObserver};

use compat::{build_compatibility_graph, Segment};
use divided::{is_degenerate, DividedEdge};
use relax::{schedule, Influence, RelaxationEngine};

/// Configured bundling run. Reusable: every call to [`EdgeBundler::bundle`]
/// starts from the input graph and keeps no state between calls.
#[derive(Clone)]
pub struct EdgeBundler {
    config: BundleConfig,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelToken,
}

impl EdgeBundler {
    pub fn new(config: BundleConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Bundles `graph` and returns it annotated with one bundle per edge.
    pub fn bundle(&self, graph: &DirectedGraph) -> BundleResult<BundledGraph> {
        Ok(self.bundle_overlay(graph)?.merge(graph))
    }

    /// Bundles `graph` and returns only the computed attributes, keyed by
    /// edge id.
    pub fn bundle_overlay(&self, graph: &DirectedGraph) -> BundleResult<BundleOverlay> {
        let config = &self.config;
        config.validate()?;
        let endpoints = graph.resolve_endpoints()?;
        let observer = self.observer.as_ref();

        let segments: Vec<Option<Segment>> = graph
            .edges()
            .iter()
            .zip(&endpoints)
            .enumerate()
            .map(|(i, (edge, &(source, target)))| {
                if is_degenerate(source, target, edge.is_self_loop()) {
                    debug!("[BUNDLE] edge {} ({} -> {}) is degenerate, passing through", i, edge.source, edge.target);
                    None
                } else {
                    Some(Segment::new(source, target))
                }
            })
            .collect();
        let weights: Vec<f32> = graph.edges().iter().map(|e| e.weight).collect();

        let live: Vec<f32> = segments.iter().flatten().map(Segment::length).collect();
        let scale = if live.is_empty() {
            1.0
        } else {
            live.iter().sum::<f32>() / live.len() as f32
        };

        let passes = schedule(config, scale);
        let initial = passes
            .first()
            .map(|p| p.subdivisions)
            .unwrap_or(config.initial_subdivisions.min(config.max_subdivisions));
        let mut edges: Vec<Option<DividedEdge>> = segments
            .iter()
            .map(|s| s.map(|s| DividedEdge::new(s.source, s.target, initial)))
            .collect();

        let compat = build_compatibility_graph(
            &segments,
            config.compatibility_threshold,
            config.bidirectional,
            observer,
        );
        info!(
            "[BUNDLE] {} edges ({} bundled), {} compatible pairs, {} passes",
            edges.len(),
            live.len(),
            compat.pair_count(),
            passes.len()
        );

        let engine = RelaxationEngine::new(&compat, config, &weights, scale);
        let mut selection = None;
        for (i, params) in passes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("[BUNDLE] cancelled before pass {}/{}", i + 1, passes.len());
                return Err(BundleError::Cancelled {
                    completed: i,
                    total: passes.len(),
                });
            }
            let chosen = engine.run_pass(&mut edges, params, passes.len(), observer);
            if let Some(next) = passes.get(i + 1) {
                for edge in edges.iter_mut().flatten() {
                    edge.resample(next.subdivisions);
                }
            }
            debug!(
                "[BUNDLE] pass {}/{}: subdivisions={} step={:.4} iterations={}",
                i + 1,
                passes.len(),
                params.subdivisions,
                params.step,
                params.iterations
            );
            observer.on_progress(ProgressEvent {
                phase: Phase::Relaxation,
                completed: i + 1,
                total: passes.len(),
            });
            selection = Some(chosen);
        }
        let selection = match selection {
            Some(selection) => selection,
            None => engine.select_neighbours(&edges),
        };

        let bundles = endpoints
            .iter()
            .enumerate()
            .map(|(i, &(source, target))| match &edges[i] {
                Some(edge) => {
                    let polyline = edge.polyline();
                    if !polyline.iter().all(|p| p.is_finite()) {
                        return Err(BundleError::NonFiniteResult { edge: i });
                    }
                    let (bundle_compat, bundle_weight) =
                        aggregate(&selection[i], weights[i], &weights);
                    Ok(EdgeBundle {
                        polyline,
                        bundle_compat,
                        bundle_weight,
                        degenerate: false,
                    })
                }
                None => Ok(EdgeBundle {
                    polyline: vec![source, target],
                    bundle_compat: 0.0,
                    bundle_weight: weights[i],
                    degenerate: true,
                }),
            })
            .collect::<BundleResult<Vec<_>>>()?;

        Ok(BundleOverlay::from_bundles(bundles))
    }
}

/// Mean score over every selected slot, and own weight plus the
/// score-weighted weights of the distinct partners.
fn aggregate(slots: &[Vec<Influence>], weight: f32, weights: &[f32]) -> (f32, f32) {
    let mut sum = 0.0;
    let mut count = 0usize;
    let mut partners: BTreeMap<usize, f32> = BTreeMap::new();
    for influence in slots.iter().flatten() {
        sum += influence.score;
        count += 1;
        partners.insert(influence.edge, influence.score);
    }
    let compat = if count == 0 { 0.0 } else { sum / count as f32 };
    let extra: f32 = partners.iter().map(|(&f, &s)| s * weights[f]).sum();
    (compat, weight + extra)
}

/// Bundles `graph` with `config`, no progress reporting or cancellation.
pub fn bundle_edges(graph: &DirectedGraph, config: &BundleConfig) -> BundleResult<BundledGraph> {
    EdgeBundler::new(config.clone()).bundle(graph)
}

/// Largest distance of any polyline point from the straight segment between
/// its endpoints.
pub fn max_lateral_offset(polyline: &[Vec2]) -> f32 {
    let (Some(&a), Some(&b)) = (polyline.first(), polyline.last()) else {
        return 0.0;
    };
    let dir = (b - a).normalize_or_zero();
    if dir == Vec2::ZERO {
        return polyline.iter().map(|p| p.distance(a)).fold(0.0, f32::max);
    }
    polyline
        .iter()
        .map(|p| dir.perp_dot(*p - a).abs())
        .fold(0.0, f32::max)
}
