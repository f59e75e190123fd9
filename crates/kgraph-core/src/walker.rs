//! Declaration walker: turns a compilation unit into declaration and
//! reference events.
//!
//! The walker keeps a frame stack of the enclosing namespace, type and member.
//! Frames are pushed on entry and popped on exit, so every event sees the
//! scope it was written in. A type's declaration event is always emitted
//! before the reference events of its members.

use tracing::warn;

use crate::error::Diagnostic;
use crate::model::Location;
use crate::oracle::{OracleError, Resolution, ResolveContext, SemanticOracle, Symbol, SymbolRef};
use crate::syntax::{CompilationUnit, SyntaxKind, SyntaxNode};

/// Lexical scope of an event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub namespace: String,
    pub current_type: Option<SymbolRef>,
    pub current_member: Option<SymbolRef>,
}

/// A declared type or member.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationEvent {
    pub symbol: Symbol,
    pub location: Location,
    /// Modifiers as written.
    pub modifiers: Vec<String>,
    pub doc_comment: Option<String>,
    /// Scope enclosing the declaration.
    pub scope: Scope,
}

/// An invocation, object creation or member access inside a member body.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEvent {
    pub scope: Scope,
    pub kind: SyntaxKind,
    /// Name as written at the reference site.
    pub name: String,
    pub location: Location,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    Declaration(DeclarationEvent),
    Reference(ReferenceEvent),
}

/// Events of one compilation unit, plus the declarations that were skipped.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub events: Vec<WalkEvent>,
    pub diagnostics: Vec<Diagnostic>,
}

impl WalkOutput {
    pub fn declarations(&self) -> impl Iterator<Item = &DeclarationEvent> {
        self.events.iter().filter_map(|e| match e {
            WalkEvent::Declaration(d) => Some(d),
            WalkEvent::Reference(_) => None,
        })
    }

    pub fn references(&self) -> impl Iterator<Item = &ReferenceEvent> {
        self.events.iter().filter_map(|e| match e {
            WalkEvent::Reference(r) => Some(r),
            WalkEvent::Declaration(_) => None,
        })
    }
}

enum Frame {
    Namespace(String),
    Type(SymbolRef),
    Member(SymbolRef),
}

/// Walks one compilation unit against a project oracle.
pub struct DeclarationWalker<'a> {
    oracle: &'a dyn SemanticOracle,
    unit: &'a CompilationUnit,
    frames: Vec<Frame>,
    output: WalkOutput,
}

impl<'a> DeclarationWalker<'a> {
    pub fn new(oracle: &'a dyn SemanticOracle, unit: &'a CompilationUnit) -> Self {
        Self {
            oracle,
            unit,
            frames: Vec::new(),
            output: WalkOutput::default(),
        }
    }

    /// Walk the whole unit. Oracle failures abort the walk.
    pub fn walk(mut self) -> Result<WalkOutput, OracleError> {
        let unit = self.unit;
        self.visit_all(&unit.members)?;
        Ok(self.output)
    }

    fn visit_all(&mut self, nodes: &'a [SyntaxNode]) -> Result<(), OracleError> {
        for node in nodes {
            self.visit(node)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: &'a SyntaxNode) -> Result<(), OracleError> {
        match node.kind {
            SyntaxKind::Namespace => {
                self.frames.push(Frame::Namespace(node.name.clone()));
                let result = self.visit_all(&node.children);
                self.frames.pop();
                result
            }
            kind if kind.is_declaration() => self.declare(node),
            kind if kind.is_reference() => self.reference(node),
            _ => Ok(()),
        }
    }

    fn declare(&mut self, node: &'a SyntaxNode) -> Result<(), OracleError> {
        let resolution = {
            let namespace = self.namespace();
            let containing = self.current_type().map(|t| t.fully_qualified_name.clone());
            let context = ResolveContext {
                unit: self.unit,
                namespace: &namespace,
                containing_type: containing.as_deref(),
                member: None,
            };
            self.oracle.resolve_declaration(node, &context)?
        };

        let symbol = match resolution {
            Resolution::Resolved(symbol) => *symbol,
            Resolution::Unresolved(what) => {
                warn!(path = %self.unit.path, symbol = %what, "Skipping unresolved declaration");
                self.output
                    .diagnostics
                    .push(Diagnostic::unresolved(&self.unit.path, what));
                return Ok(());
            }
        };

        let frame = if node.kind.is_type() {
            Frame::Type(symbol.to_ref())
        } else {
            Frame::Member(symbol.to_ref())
        };

        self.output.events.push(WalkEvent::Declaration(DeclarationEvent {
            symbol,
            location: self.location(node),
            modifiers: node.modifiers.clone(),
            doc_comment: node.doc_comment.clone(),
            scope: self.scope(),
        }));

        self.frames.push(frame);
        let result = self.visit_all(&node.children);
        self.frames.pop();
        result
    }

    fn reference(&mut self, node: &'a SyntaxNode) -> Result<(), OracleError> {
        let scope = self.scope();
        let resolution = {
            let containing = scope.current_type.as_ref().map(|t| t.fully_qualified_name.as_str());
            let member = scope.current_member.as_ref().map(|m| m.fully_qualified_name.as_str());
            let context = ResolveContext {
                unit: self.unit,
                namespace: &scope.namespace,
                containing_type: containing,
                member,
            };
            self.oracle.resolve_reference(node, &context)?
        };

        self.output.events.push(WalkEvent::Reference(ReferenceEvent {
            location: self.location(node),
            kind: node.kind,
            name: match &node.receiver {
                Some(receiver) => format!("{}.{}", receiver, node.name),
                None => node.name.clone(),
            },
            resolution,
            scope,
        }));
        Ok(())
    }

    fn namespace(&self) -> String {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Namespace(name) => Some(name.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn current_type(&self) -> Option<&SymbolRef> {
        self.frames.iter().rev().find_map(|f| match f {
            Frame::Type(symbol) => Some(symbol),
            _ => None,
        })
    }

    fn current_member(&self) -> Option<&SymbolRef> {
        match self.frames.last() {
            Some(Frame::Member(symbol)) => Some(symbol),
            _ => None,
        }
    }

    fn scope(&self) -> Scope {
        Scope {
            namespace: self.namespace(),
            current_type: self.current_type().cloned(),
            current_member: self.current_member().cloned(),
        }
    }

    fn location(&self, node: &SyntaxNode) -> Location {
        Location::new(&self.unit.path, node.span.line, node.span.column)
    }
}
