//! Tree-sitter helpers shared by language front ends.

use tree_sitter::{Language, Node, Parser as TSParser, Tree};

use super::{ParseError, Span};

/// Base tree-sitter parser holding a grammar known to load.
pub struct TreeSitterParser {
    name: &'static str,
    language: Language,
}

impl TreeSitterParser {
    /// Check the grammar against the linked tree-sitter runtime once, so an
    /// incompatible grammar fails here instead of on every file.
    pub fn new(name: &'static str, language: Language) -> Result<Self, ParseError> {
        let parser = Self { name, language };
        parser.parser()?;
        Ok(parser)
    }

    fn parser(&self) -> Result<TSParser, ParseError> {
        let mut parser = TSParser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ParseError::Grammar {
                language: self.name.to_string(),
                message: e.to_string(),
            })?;
        Ok(parser)
    }

    /// Parse source code into a tree-sitter tree.
    pub fn parse_tree(&self, path: &str, content: &str) -> Result<Tree, ParseError> {
        self.parser()?
            .parse(content, None)
            .ok_or_else(|| ParseError::Source {
                path: path.to_string(),
                message: "parser produced no tree".to_string(),
            })
    }

    pub fn language_name(&self) -> &'static str {
        self.name
    }

    /// Get text for a node from source content.
    pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
        &content[node.byte_range()]
    }

    /// Text of the child at `field`, if present.
    pub fn field_text<'a>(node: &Node, field: &str, content: &'a str) -> Option<&'a str> {
        node.child_by_field_name(field)
            .map(|child| Self::node_text(&child, content))
    }

    /// 1-based start position of a node.
    pub fn node_span(node: &Node) -> Span {
        let start = node.start_position();
        Span::new(start.row as u32 + 1, start.column as u32 + 1)
    }

    /// First direct child of the given kind.
    pub fn child_of_kind<'a>(node: &Node<'a>, kind: &str) -> Option<Node<'a>> {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|n| n.kind() == kind);
        found
    }

    /// All direct children of a specific kind.
    pub fn children_of_kind<'a>(node: &Node<'a>, kind: &str) -> Vec<Node<'a>> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|n| n.kind() == kind)
            .collect()
    }
}
