//! Error types for graph construction and persistence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::oracle::OracleError;

/// Errors that can occur while building or persisting a code graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The project's sources do not form a valid compilation.
    #[error("Compilation failed for project {project}: {message}")]
    CompilationFailure { project: String, message: String },

    /// A single node with its outgoing edges exceeds the document limit.
    #[error("Node {node_id} needs {size} bytes with its edges, over the {limit} byte document limit")]
    FragmentationOverflow {
        node_id: String,
        size: usize,
        limit: usize,
    },

    /// Another writer replaced the project concurrently.
    #[error("Concurrent write conflict on project {0}")]
    PersistenceConflict(String),

    /// Two different symbols hash to the same identifier.
    #[error("ID collision: {id} is produced by both `{existing}` and `{incoming}`")]
    IdCollision {
        id: String,
        existing: String,
        incoming: String,
    },

    /// A stored fragment set does not rebuild its parent graph.
    #[error("Fragment set for {project} is inconsistent: {message}")]
    FragmentMismatch { project: String, message: String },

    /// A document is over the backend's size limit.
    #[error("Document {document} is {size} bytes, over the {limit} byte limit")]
    DocumentTooLarge {
        document: String,
        size: usize,
        limit: usize,
    },

    /// A language grammar could not be loaded.
    #[error("Language front end unavailable: {0}")]
    Grammar(String),

    /// The semantic oracle is unavailable.
    #[error("Semantic oracle unavailable: {0}")]
    Oracle(String),

    /// The persistence gateway failed.
    #[error("Persistence gateway error: {0}")]
    Gateway(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GraphError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GraphError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole batch rather than a single project.
    ///
    /// Infrastructure failures (grammar, oracle, gateway, configuration)
    /// are fatal and must be retried at batch level.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GraphError::Grammar(_)
                | GraphError::Oracle(_)
                | GraphError::Gateway(_)
                | GraphError::Config(_)
        )
    }
}

impl From<OracleError> for GraphError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Compilation { project, message } => {
                GraphError::CompilationFailure { project, message }
            }
            OracleError::Unavailable(message) => GraphError::Oracle(message),
        }
    }
}

impl From<GatewayError> for GraphError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Conflict(project) => GraphError::PersistenceConflict(project),
            GatewayError::DocumentTooLarge {
                document,
                size,
                limit,
            } => GraphError::DocumentTooLarge {
                document,
                size,
                limit,
            },
            other => GraphError::Gateway(other.to_string()),
        }
    }
}

/// A recoverable per-file or per-symbol problem.
///
/// Diagnostics never abort a project. They are collected into the project
/// outcome so skipped items stay visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: String,
    pub message: String,
}

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// A declaration or reference the oracle could not resolve.
    UnresolvedSymbol,
    /// A source file that could not be read.
    UnreadableFile,
    /// A source file skipped by size or extension rules.
    SkippedFile,
    /// A source file with syntax errors.
    ParseFailure,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unresolved(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::UnresolvedSymbol, path, message)
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.path, self.message)
    }
}
