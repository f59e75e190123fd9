//! Fragmentation: splitting oversized project graphs into bounded documents
//! and rebuilding them.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::GraphError;
use crate::model::{Edge, Fragment, Node, ProjectGraph};

/// A graph ready to hand to a gateway.
#[derive(Debug, Clone)]
pub enum Persistable {
    /// Fits in one document.
    Whole(ProjectGraph),
    /// Parent record without payload, plus its ordered fragments.
    Fragmented {
        parent: ProjectGraph,
        fragments: Vec<Fragment>,
    },
}

impl Persistable {
    pub fn record(&self) -> &ProjectGraph {
        match self {
            Persistable::Whole(graph) => graph,
            Persistable::Fragmented { parent, .. } => parent,
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        match self {
            Persistable::Whole(_) => &[],
            Persistable::Fragmented { fragments, .. } => fragments,
        }
    }
}

/// One node with its outgoing edges, or the edges of a source outside the graph.
struct Item<'a> {
    node: Option<&'a Node>,
    edges: Vec<&'a Edge>,
    size: usize,
}

/// Splits graphs whose serialized size exceeds the document limit.
#[derive(Debug, Clone, Copy)]
pub struct FragmentationEngine {
    max_document_bytes: usize,
    fill_ratio: f64,
}

impl FragmentationEngine {
    pub fn new(max_document_bytes: usize, fill_ratio: f64) -> Self {
        Self {
            max_document_bytes,
            fill_ratio,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.max_document_bytes, config.fragment_fill_ratio)
    }

    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    /// Serialized size in bytes.
    pub fn estimate_size<T: Serialize>(value: &T) -> Result<usize, GraphError> {
        Ok(serde_json::to_vec(value)?.len())
    }

    fn chunk_budget(&self) -> usize {
        ((self.max_document_bytes as f64) * self.fill_ratio) as usize
    }

    /// Keep the graph whole when it fits, otherwise split it.
    pub fn prepare(&self, graph: ProjectGraph) -> Result<Persistable, GraphError> {
        let size = Self::estimate_size(&graph)?;
        if size <= self.max_document_bytes {
            return Ok(Persistable::Whole(graph));
        }

        let fragments = self.split(&graph)?;
        debug!(
            project = %graph.project_name,
            size,
            fragments = fragments.len(),
            "Graph fragmented"
        );
        let ids = fragments.iter().map(|f| f.fragment_id.clone()).collect();
        Ok(Persistable::Fragmented {
            parent: graph.to_fragment_parent(ids),
            fragments,
        })
    }

    /// Bin-pack the graph into ordered fragments.
    ///
    /// Each node travels with all of its outgoing edges. A node whose item
    /// alone cannot fit in a document is an overflow error.
    pub fn split(&self, graph: &ProjectGraph) -> Result<Vec<Fragment>, GraphError> {
        let envelope = self.envelope_size(&graph.project_id, &graph.fingerprint)?;
        let items = Self::items(graph)?;
        let budget = self.chunk_budget().max(envelope);

        // Pass one: measure and pack.
        let mut chunks: Vec<Vec<Item<'_>>> = Vec::new();
        let mut current: Vec<Item<'_>> = Vec::new();
        let mut current_size = envelope;
        for item in items {
            if envelope + item.size > self.max_document_bytes {
                let node_id = item
                    .node
                    .map(|n| n.id.clone())
                    .or_else(|| item.edges.first().map(|e| e.source.clone()))
                    .unwrap_or_default();
                return Err(GraphError::FragmentationOverflow {
                    node_id,
                    size: envelope + item.size,
                    limit: self.max_document_bytes,
                });
            }
            if !current.is_empty() && current_size + item.size > budget {
                chunks.push(std::mem::take(&mut current));
                current_size = envelope;
            }
            current_size += item.size;
            current.push(item);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        // Pass two: number the chunks now that the total is known.
        let total_chunks = chunks.len();
        let mut fragments = Vec::with_capacity(total_chunks);
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let mut fragment = Fragment {
                fragment_id: Fragment::id_for(&graph.project_id, &graph.fingerprint, chunk_index),
                parent_project_id: graph.project_id.clone(),
                chunk_index,
                total_chunks,
                nodes: chunk.iter().filter_map(|i| i.node).cloned().collect(),
                edges: chunk
                    .iter()
                    .flat_map(|i| i.edges.iter().copied())
                    .cloned()
                    .collect(),
                estimated_bytes: 0,
            };
            fragment.estimated_bytes = Self::estimate_size(&fragment)?;
            fragments.push(fragment);
        }
        Ok(fragments)
    }

    /// Upper bound of a fragment's size without nodes or edges.
    fn envelope_size(&self, project_id: &str, fingerprint: &str) -> Result<usize, GraphError> {
        let widest = Fragment {
            fragment_id: Fragment::id_for(project_id, fingerprint, usize::MAX),
            parent_project_id: project_id.to_string(),
            chunk_index: usize::MAX,
            total_chunks: usize::MAX,
            nodes: Vec::new(),
            edges: Vec::new(),
            estimated_bytes: usize::MAX,
        };
        Self::estimate_size(&widest)
    }

    fn items(graph: &ProjectGraph) -> Result<Vec<Item<'_>>, GraphError> {
        let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut orphan_sources: Vec<&str> = Vec::new();
        let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &graph.edges {
            let source = edge.source.as_str();
            if !node_ids.contains(source) && !outgoing.contains_key(source) {
                orphan_sources.push(source);
            }
            outgoing.entry(source).or_default().push(edge);
        }

        let mut items = Vec::with_capacity(graph.nodes.len() + orphan_sources.len());
        for node in &graph.nodes {
            let edges = outgoing.remove(node.id.as_str()).unwrap_or_default();
            items.push(Self::item(Some(node), edges)?);
        }
        for source in orphan_sources {
            let edges = outgoing.remove(source).unwrap_or_default();
            items.push(Self::item(None, edges)?);
        }
        Ok(items)
    }

    fn item<'a>(node: Option<&'a Node>, edges: Vec<&'a Edge>) -> Result<Item<'a>, GraphError> {
        // One separator byte per element.
        let mut size = match node {
            Some(node) => Self::estimate_size(node)? + 1,
            None => 0,
        };
        for edge in &edges {
            size += Self::estimate_size(edge)? + 1;
        }
        Ok(Item { node, edges, size })
    }

    /// Rebuild a graph from its parent record and fragments.
    ///
    /// Fragments may arrive in any order. The set must be complete,
    /// consistently numbered and free of duplicates.
    pub fn reassemble(
        parent: &ProjectGraph,
        fragments: &[Fragment],
    ) -> Result<ProjectGraph, GraphError> {
        let mismatch = |message: String| GraphError::FragmentMismatch {
            project: parent.project_id.clone(),
            message,
        };

        if !parent.is_fragmented {
            return Err(mismatch("record is not fragmented".into()));
        }
        if fragments.len() != parent.fragment_count {
            return Err(mismatch(format!(
                "expected {} fragments, found {}",
                parent.fragment_count,
                fragments.len()
            )));
        }

        let mut ordered: Vec<&Fragment> = fragments.iter().collect();
        ordered.sort_by_key(|f| f.chunk_index);

        let mut nodes = Vec::with_capacity(parent.node_count);
        let mut edges = Vec::with_capacity(parent.edge_count);
        let mut seen_nodes = HashSet::new();
        let mut seen_edges = HashSet::new();
        for (expected, fragment) in ordered.into_iter().enumerate() {
            if fragment.chunk_index != expected {
                return Err(mismatch(format!(
                    "chunk {} missing, found {}",
                    expected, fragment.chunk_index
                )));
            }
            if fragment.total_chunks != parent.fragment_count {
                return Err(mismatch(format!(
                    "{} reports {} chunks, parent lists {}",
                    fragment.fragment_id, fragment.total_chunks, parent.fragment_count
                )));
            }
            if fragment.parent_project_id != parent.project_id
                || parent.fragment_ids.get(expected) != Some(&fragment.fragment_id)
            {
                return Err(mismatch(format!(
                    "{} does not belong to this record",
                    fragment.fragment_id
                )));
            }

            for node in &fragment.nodes {
                if !seen_nodes.insert(node.id.clone()) {
                    return Err(mismatch(format!("node {} appears twice", node.id)));
                }
                nodes.push(node.clone());
            }
            for edge in &fragment.edges {
                if !seen_edges.insert(edge.key()) {
                    return Err(mismatch(format!(
                        "edge {} -{}-> {} appears twice",
                        edge.source, edge.kind, edge.target
                    )));
                }
                edges.push(edge.clone());
            }
        }

        if nodes.len() != parent.node_count || edges.len() != parent.edge_count {
            return Err(mismatch(format!(
                "rebuilt {} nodes and {} edges, record lists {} and {}",
                nodes.len(),
                edges.len(),
                parent.node_count,
                parent.edge_count
            )));
        }

        let mut graph = parent.clone();
        graph.nodes = nodes;
        graph.edges = edges;
        graph.is_fragmented = false;
        graph.fragment_count = 0;
        graph.fragment_ids = Vec::new();
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeKind, NodeKind};

    /// Classes linked in a chain by `uses` edges.
    fn chain(classes: usize) -> ProjectGraph {
        let nodes: Vec<Node> = (0..classes)
            .map(|i| Node::new(NodeKind::Class, format!("C{i}"), format!("P.C{i}"), "project/p"))
            .collect();
        let edges = nodes
            .windows(2)
            .map(|pair| Edge::new(&pair[0].id, &pair[1].id, EdgeKind::Uses))
            .collect();
        ProjectGraph::new("project/p", "P", nodes, edges, "fp")
    }

    /// One project node containing every class.
    fn hub(classes: usize) -> ProjectGraph {
        let project = Node::new(NodeKind::Project, "P", "P.csproj", "project/p");
        let mut nodes = vec![project.clone()];
        let mut edges = Vec::new();
        for i in 0..classes {
            let class = Node::new(NodeKind::Class, format!("C{i}"), format!("P.C{i}"), &project.id);
            edges.push(Edge::new(&project.id, &class.id, EdgeKind::Contains));
            nodes.push(class);
        }
        ProjectGraph::new(&project.id, "P", nodes, edges, "fp")
    }

    #[test]
    fn test_small_graph_stays_whole() {
        let engine = FragmentationEngine::new(1 << 20, 0.9);
        assert!(matches!(
            engine.prepare(chain(3)).unwrap(),
            Persistable::Whole(_)
        ));
    }

    #[test]
    fn test_split_respects_limit_and_round_trips() {
        let engine = FragmentationEngine::new(8 * 1024, 0.9);
        let original = chain(200);
        let Persistable::Fragmented { parent, fragments } = engine.prepare(original.clone()).unwrap()
        else {
            panic!("expected fragmentation");
        };

        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.estimated_bytes <= 8 * 1024);
            assert_eq!(fragment.total_chunks, fragments.len());
        }
        assert_eq!(parent.fragment_ids.len(), fragments.len());

        let mut shuffled = fragments.clone();
        shuffled.reverse();
        let rebuilt = FragmentationEngine::reassemble(&parent, &shuffled).unwrap();
        assert_eq!(rebuilt.nodes.len(), original.nodes.len());
        let original_edges: HashSet<_> = original.edges.iter().map(Edge::key).collect();
        let rebuilt_edges: HashSet<_> = rebuilt.edges.iter().map(Edge::key).collect();
        assert_eq!(original_edges, rebuilt_edges);
    }

    #[test]
    fn test_hub_node_overflows() {
        // The project node carries every contains edge, so it cannot fit.
        let engine = FragmentationEngine::new(4 * 1024, 0.9);
        let result = engine.split(&hub(200));
        assert!(matches!(
            result,
            Err(GraphError::FragmentationOverflow { .. })
        ));
    }

    #[test]
    fn test_reassemble_rejects_missing_chunk() {
        let engine = FragmentationEngine::new(8 * 1024, 0.9);
        let Persistable::Fragmented { parent, mut fragments } = engine.prepare(chain(200)).unwrap()
        else {
            panic!("expected fragmentation");
        };
        fragments.remove(0);
        assert!(matches!(
            FragmentationEngine::reassemble(&parent, &fragments),
            Err(GraphError::FragmentMismatch { .. })
        ));
    }
}
