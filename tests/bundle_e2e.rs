//! End-to-end bundling runs through the public API.

use divided_edges::{
    bundle_edges, max_lateral_offset, BundleConfig, BundleError, CancelToken, DirectedGraph,
    EdgeBundler, EdgeId, Phase, ProgressEvent,
};
use std::sync::{Arc, Mutex};

const ROWS: usize = 6;
const ROW_GAP: f32 = 20.0;
const COLUMN_GAP: f32 = 200.0;

/// Twelve nodes in two columns, fourteen edges running left to right.
fn two_columns() -> DirectedGraph {
    let mut g = DirectedGraph::new();
    for i in 0..ROWS {
        g.add_node(format!("l{i}"), 0.0, i as f32 * ROW_GAP);
        g.add_node(format!("r{i}"), COLUMN_GAP, i as f32 * ROW_GAP);
    }
    for i in 0..ROWS {
        g.add_edge(format!("l{i}"), format!("r{i}"), 1.0);
    }
    for i in 0..ROWS - 1 {
        g.add_edge(format!("l{i}"), format!("r{}", i + 1), 2.0);
    }
    g.add_edge("l0", "r2", 1.5);
    g.add_edge("l3", "r5", 0.5);
    g.add_edge("l5", "r3", 3.0);
    g
}

fn mean_length(g: &DirectedGraph) -> f32 {
    let ends = g.resolve_endpoints().unwrap();
    ends.iter().map(|(s, t)| s.distance(*t)).sum::<f32>() / ends.len() as f32
}

#[test]
fn two_columns_pull_together_within_step_budget() {
    let graph = two_columns();
    assert_eq!(graph.nodes().len(), 12);
    assert_eq!(graph.edges().len(), 14);

    let config = BundleConfig::default();
    let out = bundle_edges(&graph, &config).unwrap();
    let budget = 0.1 * mean_length(&graph) * config.passes as f32;

    let mut largest: f32 = 0.0;
    for (edge, input) in out.edges.iter().zip(graph.edges()) {
        let offset = max_lateral_offset(&edge.bundle.polyline);
        assert!(offset > 0.0, "{} -> {} did not move", input.source, input.target);
        assert!(offset <= budget + 1e-3, "offset {offset} exceeds {budget}");
        assert!(edge.bundle.bundle_compat > 0.0 && edge.bundle.bundle_compat <= 1.0);
        largest = largest.max(offset);
    }
    assert!(largest > 1.0);
}

#[test]
fn explicit_step_size_bounds_displacement() {
    let graph = two_columns();
    let config = BundleConfig { step_size: Some(2.0), passes: 3, ..Default::default() };
    let out = bundle_edges(&graph, &config).unwrap();
    for edge in &out.edges {
        assert!(max_lateral_offset(&edge.bundle.polyline) <= 6.0 + 1e-3);
    }
}

#[test]
fn threshold_one_leaves_edges_straight() {
    let graph = two_columns();
    let config = BundleConfig { compatibility_threshold: 1.0, ..Default::default() };
    let out = bundle_edges(&graph, &config).unwrap();
    for edge in &out.edges {
        assert!(max_lateral_offset(&edge.bundle.polyline) < 1e-3);
        assert_eq!(edge.bundle.bundle_compat, 0.0);
        assert_eq!(edge.bundle.bundle_weight, edge.weight);
    }
}

#[test]
fn endpoints_and_weights_are_preserved() {
    let graph = two_columns();
    let out = bundle_edges(&graph, &BundleConfig::default()).unwrap();
    let ends = graph.resolve_endpoints().unwrap();
    assert_eq!(out.nodes, graph.nodes());
    for ((edge, input), (s, t)) in out.edges.iter().zip(graph.edges()).zip(ends) {
        let line = &edge.bundle.polyline;
        assert_eq!(line[0], s);
        assert_eq!(line[line.len() - 1], t);
        assert_eq!(edge.source, input.source);
        assert_eq!(edge.target, input.target);
        assert_eq!(edge.weight, input.weight);
        assert!(edge.bundle.bundle_weight >= edge.weight);
        assert!(!edge.bundle.degenerate);
    }
}

#[test]
fn polyline_length_follows_schedule() {
    let config = BundleConfig {
        passes: 4,
        initial_subdivisions: 1,
        max_subdivisions: 6,
        ..Default::default()
    };
    let out = bundle_edges(&two_columns(), &config).unwrap();
    // Subdivisions 1, 2, 4, 6: the last pass runs at 6 per half.
    for edge in &out.edges {
        assert_eq!(edge.bundle.polyline.len(), 2 * 6 + 3);
    }
}

#[test]
fn zero_passes_is_the_straight_baseline() {
    let config = BundleConfig { passes: 0, ..Default::default() };
    let out = bundle_edges(&two_columns(), &config).unwrap();
    for edge in &out.edges {
        assert_eq!(edge.bundle.polyline.len(), 5);
        assert!(max_lateral_offset(&edge.bundle.polyline) < 1e-4);
    }
}

#[test]
fn runs_are_deterministic() {
    let graph = two_columns();
    let config = BundleConfig::default();
    let a = bundle_edges(&graph, &config).unwrap();
    let b = bundle_edges(&graph, &config).unwrap();
    assert_eq!(a, b);
}

#[test]
fn degenerate_edges_pass_through() {
    let mut graph = two_columns();
    let looped = graph.add_edge("l1", "l1", 4.0);
    graph.add_node("twin", 0.0, ROW_GAP);
    let zero = graph.add_edge("l1", "twin", 1.0);
    let out = bundle_edges(&graph, &BundleConfig::default()).unwrap();

    for id in [looped, zero] {
        let edge = out.edge(id).unwrap();
        assert!(edge.bundle.degenerate);
        assert_eq!(edge.bundle.polyline.len(), 2);
        assert_eq!(edge.bundle.bundle_compat, 0.0);
        assert_eq!(edge.bundle.bundle_weight, edge.weight);
    }
    assert!(!out.edge(EdgeId(0)).unwrap().bundle.degenerate);
}

#[test]
fn missing_node_is_a_configuration_error() {
    let mut graph = two_columns();
    graph.add_edge("l0", "nowhere", 1.0);
    let err = bundle_edges(&graph, &BundleConfig::default()).unwrap_err();
    assert!(err.is_configuration_error());
    match err {
        BundleError::MissingNode { edge, node } => {
            assert_eq!(edge, 14);
            assert_eq!(node, "nowhere");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn negative_weight_is_rejected() {
    let mut graph = two_columns();
    graph.add_edge("l0", "r0", -1.0);
    let err = bundle_edges(&graph, &BundleConfig::default()).unwrap_err();
    assert!(matches!(err, BundleError::InvalidWeight { edge: 14, .. }));
}

#[test]
fn progress_covers_every_phase() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let config = BundleConfig { passes: 3, ..Default::default() };
    EdgeBundler::new(config)
        .with_observer(move |e: ProgressEvent| sink.lock().unwrap().push(e))
        .bundle(&two_columns())
        .unwrap();

    let events = events.lock().unwrap();
    let preprocessing = events.iter().filter(|e| e.phase == Phase::Preprocessing).count();
    assert_eq!(preprocessing, 14);
    let per_edge = events
        .iter()
        .filter(|e| matches!(e.phase, Phase::Pass { of: 3, .. }))
        .count();
    assert_eq!(per_edge, 14 * 3);
    let relaxation: Vec<usize> = events
        .iter()
        .filter(|e| e.phase == Phase::Relaxation)
        .map(|e| e.completed)
        .collect();
    assert_eq!(relaxation, vec![1, 2, 3]);
    assert!(events.iter().all(|e| e.completed <= e.total));
}

#[test]
fn cancel_between_passes() {
    let token = CancelToken::new();
    let trigger = token.clone();
    let err = EdgeBundler::new(BundleConfig::default())
        .with_cancel(token)
        .with_observer(move |e: ProgressEvent| {
            if e.phase == Phase::Relaxation && e.completed == 2 {
                trigger.cancel();
            }
        })
        .bundle(&two_columns())
        .unwrap_err();
    assert!(matches!(err, BundleError::Cancelled { completed: 2, total: 5 }));
    assert!(!err.is_configuration_error());
}

#[test]
fn opposing_edges_bundle_in_lanes_when_bidirectional() {
    let mut graph = DirectedGraph::new();
    graph
        .add_node("a", 0.0, 0.0)
        .add_node("b", 100.0, 0.0)
        .add_node("c", 0.0, 10.0)
        .add_node("d", 100.0, 10.0);
    graph.add_edge("a", "b", 1.0);
    graph.add_edge("d", "c", 1.0);

    let apart = bundle_edges(&graph, &BundleConfig::default()).unwrap();
    for edge in &apart.edges {
        assert!(max_lateral_offset(&edge.bundle.polyline) < 1e-3);
    }

    let config = BundleConfig { bidirectional: true, ..Default::default() };
    let lanes = bundle_edges(&graph, &config).unwrap();
    let lower = &lanes.edges[0].bundle.polyline;
    let upper = &lanes.edges[1].bundle.polyline;
    assert!(max_lateral_offset(lower) > 0.0);
    assert!(max_lateral_offset(upper) > 0.0);
    let mid = lower.len() / 2;
    assert!(lower[mid].y < upper[mid].y);
}

#[test]
fn huge_coordinates_still_bundle() {
    let mut graph = DirectedGraph::new();
    graph
        .add_node("a", -1e19, 0.0)
        .add_node("b", 1e19, 0.0)
        .add_node("c", -1e19, 1e17)
        .add_node("d", 1e19, 1e17);
    graph.add_edge("a", "b", 1.0);
    graph.add_edge("c", "d", 1.0);

    let out = bundle_edges(&graph, &BundleConfig::default()).unwrap();
    let lower = &out.edges[0].bundle.polyline;
    let upper = &out.edges[1].bundle.polyline;
    assert!(lower.iter().chain(upper).all(|p| p.is_finite()));
    assert!(lower.iter().any(|p| p.y > 0.0), "lower edge stayed flat");
    assert!(upper.iter().any(|p| p.y < 1e17), "upper edge stayed flat");
    assert!(out.edges[0].bundle.bundle_compat > 0.9);
}
