//! Bounded slices of an oversized project graph.

use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::Node;

/// One chunk of a fragmented project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub fragment_id: String,
    pub parent_project_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Serialized size of this fragment in bytes.
    pub estimated_bytes: usize,
}

impl Fragment {
    /// Id of the chunk at `chunk_index` in the fragment set written for
    /// `fingerprint`. Sets of different fingerprints never share ids, so a
    /// new set can be stored next to the one its parent record still lists.
    pub fn id_for(parent_project_id: &str, fingerprint: &str, chunk_index: usize) -> String {
        format!(
            "{}#{}#{}",
            parent_project_id,
            Self::generation(fingerprint),
            chunk_index
        )
    }

    /// Short fingerprint prefix identifying one fragment set.
    pub fn generation(fingerprint: &str) -> String {
        fingerprint
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_differ_between_fingerprints() {
        let first = Fragment::id_for("project/ab12cd34", "0f1e2d3c4b5a", 0);
        assert_eq!(first, "project/ab12cd34#0f1e2d3c#0");
        assert_ne!(first, Fragment::id_for("project/ab12cd34", "99aa88bb77", 0));
        assert_eq!(first, Fragment::id_for("project/ab12cd34", "0f1e2d3c4b5a", 0));
    }
}
