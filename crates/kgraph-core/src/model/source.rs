//! Analysis inputs: projects and their source files.

use serde::{Deserialize, Serialize};

use super::node::NodeKind;
use crate::error::Diagnostic;
use crate::ids;

/// A source file loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the batch root, with `/` separators.
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Extension without the leading dot.
    pub fn extension(&self) -> Option<&str> {
        std::path::Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
    }
}

/// A project to analyze: a named set of source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSource {
    pub name: String,
    /// Project manifest (or directory) path relative to the batch root.
    pub path: String,
    pub files: Vec<SourceFile>,
    /// Problems met while loading the project's files, such as skipped or
    /// unreadable ones. Carried into the project's analysis outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ProjectSource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            files: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push(SourceFile::new(path, content));
        self
    }

    /// Stable project id, derived from the manifest path.
    pub fn id(&self) -> String {
        ids::node_id(NodeKind::Project, &self.path)
    }
}
