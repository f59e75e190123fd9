//! Graph nodes: code elements such as types, members, files and projects.

use serde::{Deserialize, Serialize};

use crate::ids;

/// Kind of a code element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Solution,
    Project,
    File,
    Class,
    Interface,
    Struct,
    Enum,
    Method,
    Property,
    Field,
    /// Fallback for declarations without a dedicated kind (delegates, events).
    Component,
}

impl NodeKind {
    /// Prefix used in node ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            NodeKind::Solution => "solution",
            NodeKind::Project => "project",
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Struct => "struct",
            NodeKind::Enum => "enum",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
            NodeKind::Field => "field",
            NodeKind::Component => "component",
        }
    }

    /// Types can contain members and take part in inheritance.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            NodeKind::Class | NodeKind::Interface | NodeKind::Struct | NodeKind::Enum
        )
    }

    pub fn is_member(&self) -> bool {
        matches!(
            self,
            NodeKind::Method | NodeKind::Property | NodeKind::Field | NodeKind::Component
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Declared accessibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Accessibility {
    Public,
    Internal,
    Protected,
    ProtectedInternal,
    PrivateProtected,
    Private,
    #[default]
    NotApplicable,
}

impl Accessibility {
    /// Derive accessibility from raw modifier keywords.
    pub fn from_modifiers<S: AsRef<str>>(modifiers: &[S]) -> Option<Self> {
        let has = |m: &str| modifiers.iter().any(|x| x.as_ref() == m);
        if has("public") {
            Some(Accessibility::Public)
        } else if has("protected") && has("internal") {
            Some(Accessibility::ProtectedInternal)
        } else if has("private") && has("protected") {
            Some(Accessibility::PrivateProtected)
        } else if has("protected") {
            Some(Accessibility::Protected)
        } else if has("internal") {
            Some(Accessibility::Internal)
        } else if has("private") {
            Some(Accessibility::Private)
        } else {
            None
        }
    }
}

/// Source position of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file_path: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file_path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }
}

/// A code element in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// `<kind-prefix>/<hash8(fullyQualifiedName)>`
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub fully_qualified_name: String,
    /// Id of the owning project.
    pub project: String,
    pub namespace: String,
    pub accessibility: Accessibility,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_sealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// FQN of the enclosing type, members and nested types only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containing_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl Node {
    /// Create a node whose id is derived from `kind` and `fully_qualified_name`.
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        fully_qualified_name: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        let fully_qualified_name = fully_qualified_name.into();
        Self {
            id: ids::node_id(kind, &fully_qualified_name),
            kind,
            name: name.into(),
            fully_qualified_name,
            project: project.into(),
            namespace: String::new(),
            accessibility: Accessibility::NotApplicable,
            is_abstract: false,
            is_static: false,
            is_sealed: false,
            location: None,
            containing_type: None,
            documentation: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn contained_in(mut self, containing_type: impl Into<String>) -> Self {
        self.containing_type = Some(containing_type.into());
        self
    }

    pub fn with_documentation(mut self, documentation: Option<String>) -> Self {
        self.documentation = documentation;
        self
    }
}
