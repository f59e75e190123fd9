//! Project graphs, the unit of persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::{Node, NodeKind};

/// The complete graph of one project.
///
/// A project graph is produced fresh on every analysis run and always
/// replaces the previously stored one wholesale. When it is too large for a
/// single document the stored record carries no nodes or edges and instead
/// lists its fragments in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGraph {
    pub project_id: String,
    pub project_name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub node_count: usize,
    pub edge_count: usize,
    /// Content fingerprint of the sources this graph was built from.
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    #[serde(default)]
    pub is_fragmented: bool,
    #[serde(default)]
    pub fragment_count: usize,
    #[serde(default)]
    pub fragment_ids: Vec<String>,
}

impl ProjectGraph {
    pub fn new(
        project_id: impl Into<String>,
        project_name: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            project_name: project_name.into(),
            node_count: nodes.len(),
            edge_count: edges.len(),
            nodes,
            edges,
            fingerprint: fingerprint.into(),
            generated_at: Utc::now(),
            tool_version: crate::TOOL_VERSION.to_string(),
            is_fragmented: false,
            fragment_count: 0,
            fragment_ids: Vec::new(),
        }
    }

    /// Number of declared code symbols, excluding project and file nodes.
    pub fn symbol_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n.kind, NodeKind::Project | NodeKind::File | NodeKind::Solution))
            .count()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_by_name(&self, fully_qualified_name: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.fully_qualified_name == fully_qualified_name)
    }

    /// Copy of this record without node or edge payload, linked to fragments.
    pub fn to_fragment_parent(&self, fragment_ids: Vec<String>) -> ProjectGraph {
        ProjectGraph {
            project_id: self.project_id.clone(),
            project_name: self.project_name.clone(),
            nodes: Vec::new(),
            edges: Vec::new(),
            node_count: self.node_count,
            edge_count: self.edge_count,
            fingerprint: self.fingerprint.clone(),
            generated_at: self.generated_at,
            tool_version: self.tool_version.clone(),
            is_fragmented: true,
            fragment_count: fragment_ids.len(),
            fragment_ids,
        }
    }
}

/// Lightweight summary of a node for the structural view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
}

/// Containment-only projection of a project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralView {
    pub project_id: String,
    pub nodes: Vec<NodeSummary>,
    /// `contains` edges followed by their `containedIn` inverses.
    pub edges: Vec<Edge>,
}

impl StructuralView {
    pub fn from_graph(graph: &ProjectGraph) -> Self {
        let nodes = graph
            .nodes
            .iter()
            .map(|n| NodeSummary {
                id: n.id.clone(),
                kind: n.kind,
                name: n.name.clone(),
            })
            .collect();

        let contains: Vec<Edge> = graph
            .edges
            .iter()
            .filter(|e| e.kind.is_structural())
            .cloned()
            .collect();
        let inverses: Vec<Edge> = contains.iter().filter_map(Edge::inverse).collect();

        Self {
            project_id: graph.project_id.clone(),
            nodes,
            edges: contains.into_iter().chain(inverses).collect(),
        }
    }
}

/// Header record preceding graph records in an export stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub generated_at: DateTime<Utc>,
    pub source_path: String,
    pub tool_version: String,
    pub project_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
}

impl GraphMetadata {
    pub fn for_graphs(source_path: impl Into<String>, graphs: &[ProjectGraph]) -> Self {
        Self {
            generated_at: Utc::now(),
            source_path: source_path.into(),
            tool_version: crate::TOOL_VERSION.to_string(),
            project_count: graphs.len(),
            node_count: graphs.iter().map(|g| g.nodes.len()).sum(),
            edge_count: graphs.iter().map(|g| g.edges.len()).sum(),
        }
    }
}
