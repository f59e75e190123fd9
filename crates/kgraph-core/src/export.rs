//! JSON Lines export of project graphs.
//!
//! A stream starts with one metadata record, followed by every node and then
//! every edge, one JSON object per line:
//! ```text
//! {"record":"metadata","generatedAt":...,"sourcePath":...,"nodeCount":...}
//! {"record":"node","id":"class/1a2b3c4d","kind":"Class",...}
//! {"record":"edge","source":...,"target":...,"kind":"implements","count":1}
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::GraphError;
use crate::model::{Edge, GraphMetadata, Node, ProjectGraph};

/// One line of an export stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "camelCase")]
pub enum ExportRecord {
    Metadata(GraphMetadata),
    Node(Node),
    Edge(Edge),
}

/// Write the metadata record and then all graph records. Returns the number
/// of lines written.
pub fn write_stream<W: Write>(
    writer: &mut W,
    metadata: &GraphMetadata,
    graphs: &[ProjectGraph],
) -> Result<usize, GraphError> {
    let mut lines = 0;
    let mut emit = |record: ExportRecord, writer: &mut W| -> Result<(), GraphError> {
        serde_json::to_writer(&mut *writer, &record)?;
        writer
            .write_all(b"\n")
            .map_err(|e| GraphError::io("<export>", e))?;
        lines += 1;
        Ok(())
    };

    emit(ExportRecord::Metadata(metadata.clone()), writer)?;
    for node in graphs.iter().flat_map(|g| &g.nodes) {
        emit(ExportRecord::Node(node.clone()), writer)?;
    }
    for edge in graphs.iter().flat_map(|g| &g.edges) {
        emit(ExportRecord::Edge(edge.clone()), writer)?;
    }
    writer.flush().map_err(|e| GraphError::io("<export>", e))?;
    Ok(lines)
}

/// Parse a stream written by [`write_stream`].
pub fn read_stream(input: &str) -> Result<Vec<ExportRecord>, GraphError> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(GraphError::from))
        .collect()
}
