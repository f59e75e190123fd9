pub mod assembler;
pub mod batch;
pub mod change;
pub mod config;
pub mod discovery;
pub mod error;
pub mod export;
pub mod extract;
pub mod fragmentation;
pub mod gateway;
pub mod ids;
pub mod model;
pub mod oracle;
pub mod syntax;
pub mod walker;

pub use batch::{BatchReport, BatchRunner, CancellationFlag, ProjectAnalysis, ProjectAnalyzer};
pub use config::Config;
pub use error::{Diagnostic, DiagnosticKind, GraphError};
pub use gateway::{open_gateway, PersistenceGateway};
pub use model::{Edge, EdgeKind, Node, NodeKind, ProcessingState, ProjectGraph, ProjectSource};

/// Version stamped into every graph and processing state.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
