//! Directed graph input and the bundled output overlay.

use bevy::math::Vec2;
use std::collections::HashMap;

use crate::core::error::{BundleError, BundleResult};

/// Index of an edge in its graph (insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

/// A positioned node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub position: Vec2,
}

/// A directed, weighted edge between two node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f32,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// Directed graph with fixed node positions. Bundling never mutates it.
///
/// Edges are stored by node id and are not checked on insertion; the
/// bundler validates every reference before it starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectedGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl DirectedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>, x: f32, y: f32) -> &mut Self {
        self.nodes.push(Node {
            id: id.into(),
            position: Vec2::new(x, y),
        });
        self
    }

    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f32,
    ) -> EdgeId {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
            weight,
        });
        EdgeId(self.edges.len() - 1)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    /// Checks ids, coordinates and weights, and resolves every edge to its
    /// endpoint positions (source, target), in edge order.
    pub fn resolve_endpoints(&self) -> BundleResult<Vec<(Vec2, Vec2)>> {
        let mut positions: HashMap<&str, Vec2> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node.position.is_finite() {
                return Err(BundleError::NonFiniteCoordinate {
                    node: node.id.clone(),
                });
            }
            if positions.insert(node.id.as_str(), node.position).is_some() {
                return Err(BundleError::DuplicateNode(node.id.clone()));
            }
        }

        self.edges
            .iter()
            .enumerate()
            .map(|(i, edge)| {
                if !edge.weight.is_finite() || edge.weight < 0.0 {
                    return Err(BundleError::InvalidWeight {
                        edge: i,
                        weight: edge.weight,
                    });
                }
                let lookup = |id: &str| {
                    positions
                        .get(id)
                        .copied()
                        .ok_or_else(|| BundleError::MissingNode {
                            edge: i,
                            node: id.to_string(),
                        })
                };
                Ok((lookup(&edge.source)?, lookup(&edge.target)?))
            })
            .collect()
    }
}

/// Computed attributes of one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBundle {
    /// Routed path, source position first and target position last.
    pub polyline: Vec<Vec2>,
    /// Mean compatibility of the partners that pulled on this edge.
    pub bundle_compat: f32,
    /// Own weight plus compatibility-weighted partner weights.
    pub bundle_weight: f32,
    /// Self-loop or zero-length edge that was passed through unbundled.
    pub degenerate: bool,
}

impl EdgeBundle {
    pub fn xs(&self) -> Vec<f32> {
        self.polyline.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f32> {
        self.polyline.iter().map(|p| p.y).collect()
    }
}

/// Bundling results keyed by edge id, kept apart from the input graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleOverlay {
    bundles: Vec<EdgeBundle>,
}

impl BundleOverlay {
    pub(crate) fn from_bundles(bundles: Vec<EdgeBundle>) -> Self {
        Self { bundles }
    }

    pub fn get(&self, id: EdgeId) -> Option<&EdgeBundle> {
        self.bundles.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &EdgeBundle)> {
        self.bundles.iter().enumerate().map(|(i, b)| (EdgeId(i), b))
    }

    /// Joins the overlay with the graph it was computed from.
    pub fn merge(self, graph: &DirectedGraph) -> BundledGraph {
        let edges = graph
            .edges()
            .iter()
            .zip(self.bundles)
            .map(|(edge, bundle)| BundledEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                weight: edge.weight,
                bundle,
            })
            .collect();
        BundledGraph {
            nodes: graph.nodes().to_vec(),
            edges,
        }
    }
}

/// An input edge together with its routed path.
#[derive(Debug, Clone, PartialEq)]
pub struct BundledEdge {
    pub source: String,
    pub target: String,
    pub weight: f32,
    pub bundle: EdgeBundle,
}

/// Same topology as the input graph, each edge annotated with its bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundledGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<BundledEdge>,
}

impl BundledGraph {
    pub fn edge(&self, id: EdgeId) -> Option<&BundledEdge> {
        self.edges.get(id.0)
    }
}
