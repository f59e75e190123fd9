//! Language front end: compilation units and their syntax trees.
//!
//! A [`SourceParser`] turns one source file into a [`CompilationUnit`]: a
//! tree of declarations whose member bodies carry the expressions the graph
//! cares about (invocations, object creations, member accesses). The tree
//! is purely syntactic. Names are resolved later by a
//! [`SemanticOracle`](crate::oracle::SemanticOracle).

mod csharp;
mod registry;
mod treesitter;

pub use csharp::CSharpParser;
pub use registry::ParserRegistry;
pub use treesitter::TreeSitterParser;

use thiserror::Error;

/// Why a front end produced no compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The grammar itself is unusable; no file of the language can parse.
    #[error("{language} grammar failed to load: {message}")]
    Grammar { language: String, message: String },

    /// This one file could not be parsed.
    #[error("{path}: {message}")]
    Source { path: String, message: String },
}

impl ParseError {
    pub fn is_grammar(&self) -> bool {
        matches!(self, ParseError::Grammar { .. })
    }
}

/// Language front end.
///
/// Implement this trait for each language that should feed the graph.
pub trait SourceParser: Send + Sync {
    /// Parse a source file into a compilation unit.
    ///
    /// # Arguments
    /// * `path` - Path of the file relative to the batch root
    /// * `content` - Source code content
    fn parse_unit(&self, path: &str, content: &str) -> Result<CompilationUnit, ParseError>;

    /// Human-readable language name.
    fn language_name(&self) -> &'static str;

    /// File extensions this parser handles.
    fn supported_extensions(&self) -> &[&'static str];

    /// Check if this parser can handle the given file extension.
    fn can_parse(&self, extension: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompilationUnit {
    pub path: String,
    /// Imported namespaces (`using` directives), in source order.
    pub usings: Vec<String>,
    /// Top-level declarations.
    pub members: Vec<SyntaxNode>,
    /// The parser recovered from syntax errors in this file.
    pub has_errors: bool,
}

impl CompilationUnit {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Number of declarations in the unit, nested ones included.
    pub fn declaration_count(&self) -> usize {
        fn count(nodes: &[SyntaxNode]) -> usize {
            nodes
                .iter()
                .filter(|n| n.kind.is_declaration())
                .map(|n| 1 + count(&n.children))
                .sum()
        }
        count(&self.members)
    }
}

/// Kind of a syntax node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Namespace,
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
    Invocation,
    ObjectCreation,
    MemberAccess,
}

impl SyntaxKind {
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SyntaxKind::Class
                | SyntaxKind::Interface
                | SyntaxKind::Struct
                | SyntaxKind::Enum
                | SyntaxKind::Delegate
        )
    }

    pub fn is_member(&self) -> bool {
        matches!(
            self,
            SyntaxKind::Method
                | SyntaxKind::Constructor
                | SyntaxKind::Property
                | SyntaxKind::Field
                | SyntaxKind::EnumMember
        )
    }

    pub fn is_declaration(&self) -> bool {
        *self == SyntaxKind::Namespace || self.is_type() || self.is_member()
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            SyntaxKind::Invocation | SyntaxKind::ObjectCreation | SyntaxKind::MemberAccess
        )
    }
}

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Type as written, whitespace removed.
    pub type_text: String,
}

/// A declaration or an expression of interest.
///
/// Declarations nest (namespaces hold types, types hold members). Member
/// declarations hold the reference expressions of their bodies in source
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// Declared name, invoked or accessed member name, or created type.
    pub name: String,
    /// Receiver expression of an invocation or member access (`repo` in `repo.Save()`).
    pub receiver: Option<String>,
    /// Declared type of a field or property, return type of a method.
    pub type_text: Option<String>,
    /// Base types as written.
    pub bases: Vec<String>,
    pub parameters: Vec<Parameter>,
    /// Generic type parameters of a type or method declaration.
    pub type_parameters: Vec<String>,
    /// Number of arguments at a call site.
    pub argument_count: usize,
    pub modifiers: Vec<String>,
    /// Names of locals declared in a member body.
    pub locals: Vec<String>,
    /// Member has an implementation (block or expression body).
    pub has_body: bool,
    pub doc_comment: Option<String>,
    pub span: Span,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, name: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            name: name.into(),
            receiver: None,
            type_text: None,
            bases: Vec::new(),
            parameters: Vec::new(),
            type_parameters: Vec::new(),
            argument_count: 0,
            modifiers: Vec::new(),
            locals: Vec::new(),
            has_body: false,
            doc_comment: None,
            span,
            children: Vec::new(),
        }
    }

    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_type(mut self, type_text: impl Into<String>) -> Self {
        self.type_text = Some(type_text.into());
        self
    }

    pub fn with_bases<S: Into<String>>(mut self, bases: impl IntoIterator<Item = S>) -> Self {
        self.bases = bases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, type_text: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            type_text: type_text.into(),
        });
        self
    }

    pub fn with_modifiers<S: Into<String>>(mut self, modifiers: impl IntoIterator<Item = S>) -> Self {
        self.modifiers = modifiers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_arguments(mut self, count: usize) -> Self {
        self.argument_count = count;
        self
    }

    pub fn with_body(mut self) -> Self {
        self.has_body = true;
        self
    }

    pub fn with_child(mut self, child: SyntaxNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }
}

/// Remove all whitespace from a type or expression as written.
pub fn normalize_text(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
