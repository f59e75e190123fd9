//! Semantic oracle: symbol resolution for declarations and references.
//!
//! The graph engine never resolves names itself. It asks a
//! [`SemanticOracle`] what a declaration or expression refers to and
//! receives a [`Symbol`] describing the target (fully qualified name,
//! assembly, modifiers, base type, transitive interfaces, signature types).
//! An [`OracleProvider`] prepares one oracle per project, which is where a
//! compiler front end would load references. The other projects of the
//! batch are handed over as a [`Workspace`], so types declared next door
//! resolve with the declaring project as their assembly.

mod index;
mod platform;

pub use index::{SourceIndexOracle, SourceIndexProvider};
pub use platform::PlatformFilter;

use std::sync::Arc;
use thiserror::Error;

use crate::model::{Accessibility, NodeKind, ProjectSource};
use crate::syntax::{CompilationUnit, SyntaxNode};

/// Oracle failures.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The project's sources do not form a valid compilation.
    #[error("Compilation of {project} failed: {message}")]
    Compilation { project: String, message: String },

    /// The resolver itself cannot be reached or loaded.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Kind of a resolved symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Interface,
    Struct,
    Enum,
    Delegate,
    Method,
    Constructor,
    Property,
    Field,
    EnumMember,
    /// Local variable or parameter. Never becomes a node.
    Local,
}

impl SymbolKind {
    /// Graph node kind for this symbol, `None` for locals.
    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            SymbolKind::Class => Some(NodeKind::Class),
            SymbolKind::Interface => Some(NodeKind::Interface),
            SymbolKind::Struct => Some(NodeKind::Struct),
            SymbolKind::Enum => Some(NodeKind::Enum),
            SymbolKind::Delegate => Some(NodeKind::Component),
            SymbolKind::Method | SymbolKind::Constructor => Some(NodeKind::Method),
            SymbolKind::Property => Some(NodeKind::Property),
            SymbolKind::Field | SymbolKind::EnumMember => Some(NodeKind::Field),
            SymbolKind::Local => None,
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Delegate
        )
    }
}

/// Reference to another symbol: enough to compute its node id and filter it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub fully_qualified_name: String,
    pub kind: SymbolKind,
    pub assembly: String,
}

impl SymbolRef {
    pub fn new(fully_qualified_name: impl Into<String>, kind: SymbolKind, assembly: impl Into<String>) -> Self {
        Self {
            fully_qualified_name: fully_qualified_name.into(),
            kind,
            assembly: assembly.into(),
        }
    }

    /// Id of the node this reference points at, `None` for locals.
    pub fn node_id(&self) -> Option<String> {
        self.kind
            .node_kind()
            .map(|kind| crate::ids::node_id(kind, &self.fully_qualified_name))
    }
}

/// A resolved symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub fully_qualified_name: String,
    pub namespace: String,
    /// Assembly (or project) declaring the symbol.
    pub assembly: String,
    pub accessibility: Accessibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub containing_type: Option<SymbolRef>,
    /// Immediate base type of a class.
    pub base_type: Option<SymbolRef>,
    /// Transitive interface set of a type.
    pub interfaces: Vec<SymbolRef>,
    /// Types mentioned in parameter lists, generic arguments included.
    pub parameter_types: Vec<SymbolRef>,
    /// Return type of a method, declared type of a field or property,
    /// generic arguments included.
    pub return_types: Vec<SymbolRef>,
    /// Base member an override replaces.
    pub overridden: Option<SymbolRef>,
    /// Interface members this member implements.
    pub implemented_members: Vec<SymbolRef>,
    /// Base and signature types as written that did not resolve.
    pub unresolved_types: Vec<String>,
}

impl Symbol {
    pub fn new(
        kind: SymbolKind,
        name: impl Into<String>,
        fully_qualified_name: impl Into<String>,
        assembly: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            fully_qualified_name: fully_qualified_name.into(),
            namespace: String::new(),
            assembly: assembly.into(),
            accessibility: Accessibility::NotApplicable,
            is_static: false,
            is_abstract: false,
            is_sealed: false,
            is_virtual: false,
            is_override: false,
            containing_type: None,
            base_type: None,
            interfaces: Vec::new(),
            parameter_types: Vec::new(),
            return_types: Vec::new(),
            overridden: None,
            implemented_members: Vec::new(),
            unresolved_types: Vec::new(),
        }
    }

    pub fn to_ref(&self) -> SymbolRef {
        SymbolRef::new(&self.fully_qualified_name, self.kind, &self.assembly)
    }

    pub fn node_id(&self) -> Option<String> {
        self.to_ref().node_id()
    }
}

/// Outcome of a resolution request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Box<Symbol>),
    /// Nothing matched; the text says what was looked up.
    Unresolved(String),
}

impl Resolution {
    pub fn resolved(symbol: Symbol) -> Self {
        Resolution::Resolved(Box::new(symbol))
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Resolution::Resolved(symbol) => Some(symbol),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Lexical position of the node being resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub unit: &'a CompilationUnit,
    /// Enclosing namespace, empty for the global namespace.
    pub namespace: &'a str,
    /// Fully qualified name of the enclosing type.
    pub containing_type: Option<&'a str>,
    /// Fully qualified name of the enclosing member.
    pub member: Option<&'a str>,
}

/// Resolves syntax nodes to symbols within one project.
pub trait SemanticOracle: Send + Sync {
    /// Resolve the symbol a declaration introduces.
    fn resolve_declaration(
        &self,
        node: &SyntaxNode,
        context: &ResolveContext<'_>,
    ) -> Result<Resolution, OracleError>;

    /// Resolve the symbol an invocation, object creation or member access targets.
    fn resolve_reference(
        &self,
        node: &SyntaxNode,
        context: &ResolveContext<'_>,
    ) -> Result<Resolution, OracleError>;
}

/// Parsed sources of one project, shared with the oracles of its siblings.
#[derive(Debug, Clone)]
pub struct WorkspaceProject {
    pub project_id: String,
    /// Assembly name the project's declarations resolve to.
    pub assembly: String,
    pub units: Arc<Vec<CompilationUnit>>,
}

/// Every project of a batch, visible to each project's oracle the way
/// referenced assemblies are visible to a compiler.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    projects: Vec<WorkspaceProject>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        project_id: impl Into<String>,
        assembly: impl Into<String>,
        units: Arc<Vec<CompilationUnit>>,
    ) {
        self.projects.push(WorkspaceProject {
            project_id: project_id.into(),
            assembly: assembly.into(),
            units,
        });
        self.projects
            .sort_by(|a, b| (&a.assembly, &a.project_id).cmp(&(&b.assembly, &b.project_id)));
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Projects other than `project_id`, ordered by assembly name.
    pub fn references<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a WorkspaceProject> {
        self.projects.iter().filter(move |p| p.project_id != project_id)
    }
}

/// Prepares a per-project oracle.
pub trait OracleProvider: Send + Sync {
    /// `units` are the project's own sources; `workspace` holds the batch,
    /// possibly including the project itself.
    fn open(
        &self,
        project: &ProjectSource,
        units: &[CompilationUnit],
        workspace: &Workspace,
    ) -> Result<Arc<dyn SemanticOracle>, OracleError>;
}
