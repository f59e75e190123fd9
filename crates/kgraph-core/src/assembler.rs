//! Graph assembly: per-project accumulation and deduplication.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::extract::Extraction;
use crate::ids::IdRegistry;
use crate::model::{Edge, EdgeKey, EdgeKind, Node, NodeKind, ProjectGraph, StructuralView};

/// Accumulates the nodes and edges of one project.
///
/// Nodes are deduplicated by id with the first writer winning; repeated
/// edges fold into one edge whose `count` is the sum of occurrences. Output
/// preserves insertion order.
#[derive(Debug)]
pub struct GraphAssembler {
    project_id: String,
    project_name: String,
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<EdgeKey, usize>,
    ids: IdRegistry,
}

impl GraphAssembler {
    pub fn new(project_id: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            project_name: project_name.into(),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            ids: IdRegistry::new(),
        }
    }

    /// Add a node unless one with the same id exists. Returns whether it was added.
    pub fn add_node(&mut self, node: Node) -> Result<bool, GraphError> {
        self.ids.register(&node.id, &node.fully_qualified_name)?;
        if self.node_index.contains_key(&node.id) {
            return Ok(false);
        }
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(true)
    }

    /// Add an edge, merging its count into an existing `(source, target, kind)`.
    pub fn add_edge(&mut self, edge: Edge) {
        match self.edge_index.get(&edge.key()) {
            Some(&position) => self.edges[position].count += edge.count,
            None => {
                self.edge_index.insert(edge.key(), self.edges.len());
                self.edges.push(edge);
            }
        }
    }

    /// Merge everything extracted from one file.
    pub fn add_extraction(&mut self, extraction: Extraction) -> Result<(), GraphError> {
        for (id, fully_qualified_name) in &extraction.symbols {
            self.ids.register(id, fully_qualified_name)?;
        }
        for node in extraction.nodes {
            self.add_node(node)?;
        }
        for edge in extraction.edges {
            self.add_edge(edge);
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Freeze the project graph and its structural view.
    pub fn finish(mut self, fingerprint: impl Into<String>) -> (ProjectGraph, StructuralView) {
        for edge in self.indirect_calls() {
            self.add_edge(edge);
        }
        let graph = ProjectGraph::new(
            self.project_id,
            self.project_name,
            self.nodes,
            self.edges,
            fingerprint,
        );
        let structural = StructuralView::from_graph(&graph);
        (graph, structural)
    }

    /// `indirectCall` edges from each polymorphic call to every in-project
    /// method that overrides or implements its target, transitively.
    fn indirect_calls(&self) -> Vec<Edge> {
        let is_method = |id: &str| {
            self.node_index
                .get(id)
                .map(|&i| self.nodes[i].kind == NodeKind::Method)
                .unwrap_or_else(|| id.starts_with(NodeKind::Method.id_prefix()))
        };

        let mut realizations: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            if matches!(edge.kind, EdgeKind::Inherits | EdgeKind::Implements)
                && is_method(&edge.source)
                && is_method(&edge.target)
            {
                realizations
                    .entry(edge.target.as_str())
                    .or_default()
                    .push(edge.source.as_str());
            }
        }
        if realizations.is_empty() {
            return Vec::new();
        }

        let mut derived = Vec::new();
        for edge in &self.edges {
            let polymorphic = edge.kind == EdgeKind::Calls
                && edge.flags.is_some_and(|f| f.is_polymorphic());
            if !polymorphic {
                continue;
            }

            let mut visited: HashSet<&str> = HashSet::new();
            let mut queue: VecDeque<&str> = VecDeque::from([edge.target.as_str()]);
            while let Some(target) = queue.pop_front() {
                for &implementation in realizations.get(target).into_iter().flatten() {
                    if !visited.insert(implementation) {
                        continue;
                    }
                    if self.node_index.contains_key(implementation) && implementation != edge.source {
                        derived.push(
                            Edge::new(&edge.source, implementation, EdgeKind::IndirectCall)
                                .with_count(edge.count),
                        );
                    }
                    queue.push_back(implementation);
                }
            }
        }
        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CallFlags;

    fn method(fqn: &str) -> Node {
        Node::new(NodeKind::Method, fqn, fqn, "project/0")
    }

    #[test]
    fn test_first_writer_wins() {
        let mut assembler = GraphAssembler::new("project/0", "P");
        let mut first = Node::new(NodeKind::Class, "Cart", "Shop.Cart", "project/0");
        first.documentation = Some("first".into());
        let mut second = first.clone();
        second.documentation = Some("second".into());

        assert!(assembler.add_node(first).unwrap());
        assert!(!assembler.add_node(second).unwrap());
        let (graph, _) = assembler.finish("fp");
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].documentation.as_deref(), Some("first"));
    }

    #[test]
    fn test_edges_fold_counts() {
        let mut assembler = GraphAssembler::new("project/0", "P");
        for _ in 0..3 {
            assembler.add_edge(Edge::new("method/a", "method/b", EdgeKind::Calls));
        }
        assembler.add_edge(Edge::new("method/a", "method/b", EdgeKind::Uses));
        let (graph, _) = assembler.finish("fp");
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].count, 3);
        assert_eq!(graph.edge_count, 2);
    }

    #[test]
    fn test_id_collision_fails() {
        let mut assembler = GraphAssembler::new("project/0", "P");
        let a = Node::new(NodeKind::Class, "A", "N.A", "project/0");
        let mut forged = Node::new(NodeKind::Class, "B", "N.B", "project/0");
        forged.id = a.id.clone();

        assembler.add_node(a).unwrap();
        assert!(matches!(
            assembler.add_node(forged),
            Err(GraphError::IdCollision { .. })
        ));
    }

    #[test]
    fn test_indirect_calls_follow_realization_chain() {
        let mut assembler = GraphAssembler::new("project/0", "P");
        let caller = method("App.Run()");
        let contract = method("IRepo.Save()");
        let base = method("BaseRepo.Save()");
        let leaf = method("SqlRepo.Save()");
        let (caller_id, contract_id, base_id, leaf_id) =
            (caller.id.clone(), contract.id.clone(), base.id.clone(), leaf.id.clone());
        for node in [caller, contract, base, leaf] {
            assembler.add_node(node).unwrap();
        }

        assembler.add_edge(Edge::new(&base_id, &contract_id, EdgeKind::Implements));
        assembler.add_edge(Edge::new(&leaf_id, &base_id, EdgeKind::Inherits));
        assembler.add_edge(Edge::calls(
            &caller_id,
            &contract_id,
            CallFlags {
                is_abstract: true,
                ..Default::default()
            },
        ));

        let (graph, structural) = assembler.finish("fp");
        let indirect: Vec<&str> = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::IndirectCall)
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(indirect, vec![base_id.as_str(), leaf_id.as_str()]);
        assert!(structural.edges.is_empty());
    }
}
