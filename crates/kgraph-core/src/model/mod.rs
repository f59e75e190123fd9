//! Graph data model: nodes, edges, project graphs, fragments and run state.

mod edge;
mod fragment;
mod graph;
mod node;
mod source;
mod state;

pub use edge::{CallFlags, Edge, EdgeKey, EdgeKind};
pub use fragment::Fragment;
pub use graph::{GraphMetadata, NodeSummary, ProjectGraph, StructuralView};
pub use node::{Accessibility, Location, Node, NodeKind};
pub use source::{ProjectSource, SourceFile};
pub use state::{BatchCounters, ChangeKind, ProcessingState, ProjectRecord, ProjectStatus};
