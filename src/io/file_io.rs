//! JSON snapshots: graphs in, bundled graphs out.

use bevy::log::info;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::{Read, Write};
use std::path::Path;

use crate::core::error::BundleResult;
use crate::core::graph::{BundledGraph, DirectedGraph};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SerializableNode {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub x: f32,
    pub y: f32,
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SerializableEdge {
    #[serde(deserialize_with = "id_from_any")]
    pub source_id: String,
    #[serde(deserialize_with = "id_from_any")]
    pub target_id: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

/// Input graph as stored on disk or piped on stdin.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<SerializableNode>,
    #[serde(default)]
    pub edges: Vec<SerializableEdge>,
}

/// Node ids may be written as strings or integers.
fn id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(n) => n.to_string(),
    })
}

impl GraphSnapshot {
    pub fn to_graph(&self) -> DirectedGraph {
        let mut graph = DirectedGraph::new();
        for node in &self.nodes {
            graph.add_node(node.id.clone(), node.x, node.y);
        }
        for edge in &self.edges {
            graph.add_edge(edge.source_id.clone(), edge.target_id.clone(), edge.weight);
        }
        graph
    }

    pub fn from_graph(graph: &DirectedGraph) -> Self {
        Self {
            nodes: graph
                .nodes()
                .iter()
                .map(|n| SerializableNode {
                    id: n.id.clone(),
                    x: n.position.x,
                    y: n.position.y,
                })
                .collect(),
            edges: graph
                .edges()
                .iter()
                .map(|e| SerializableEdge {
                    source_id: e.source.clone(),
                    target_id: e.target.clone(),
                    weight: e.weight,
                })
                .collect(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One edge of a bundled snapshot: the input edge plus its polyline as
/// parallel coordinate arrays.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SerializableBundledEdge {
    pub source_id: String,
    pub target_id: String,
    pub weight: f32,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub bundle_compat: f32,
    pub bundle_weight: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub degenerate: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BundledSnapshot {
    pub nodes: Vec<SerializableNode>,
    pub edges: Vec<SerializableBundledEdge>,
}

impl BundledSnapshot {
    pub fn from_bundled(graph: &BundledGraph) -> Self {
        Self {
            nodes: graph
                .nodes
                .iter()
                .map(|n| SerializableNode {
                    id: n.id.clone(),
                    x: n.position.x,
                    y: n.position.y,
                })
                .collect(),
            edges: graph
                .edges
                .iter()
                .map(|e| SerializableBundledEdge {
                    source_id: e.source.clone(),
                    target_id: e.target.clone(),
                    weight: e.weight,
                    x: e.bundle.xs(),
                    y: e.bundle.ys(),
                    bundle_compat: e.bundle.bundle_compat,
                    bundle_weight: e.bundle.bundle_weight,
                    degenerate: e.bundle.degenerate,
                })
                .collect(),
        }
    }
}

/// Parses a snapshot from any reader. Blank input is an empty graph.
pub fn read_snapshot_from(mut reader: impl Read) -> BundleResult<GraphSnapshot> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let buf = buf.trim();
    if buf.is_empty() {
        return Ok(GraphSnapshot::default());
    }
    Ok(serde_json::from_str(buf)?)
}

pub fn load_snapshot(path: &Path) -> BundleResult<GraphSnapshot> {
    let file = std::fs::File::open(path)?;
    let snapshot = read_snapshot_from(std::io::BufReader::new(file))?;
    info!(
        "[LOAD] {} nodes, {} edges from {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        path.display()
    );
    Ok(snapshot)
}

pub fn write_bundled_to(mut writer: impl Write, graph: &BundledGraph) -> BundleResult<()> {
    serde_json::to_writer_pretty(&mut writer, &BundledSnapshot::from_bundled(graph))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn save_bundled(path: &Path, graph: &BundledGraph) -> BundleResult<()> {
    let file = std::fs::File::create(path)?;
    write_bundled_to(std::io::BufWriter::new(file), graph)?;
    info!("[SAVE] Saved {} bundled edges to {}", graph.edges.len(), path.display());
    Ok(())
}
