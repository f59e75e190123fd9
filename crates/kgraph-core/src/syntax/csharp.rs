//! C# front end using tree-sitter.

use regex::Regex;
use std::sync::OnceLock;
use tree_sitter::Node;

use super::treesitter::TreeSitterParser;
use super::{
    normalize_text, CompilationUnit, Parameter, ParseError, SourceParser, SyntaxKind, SyntaxNode,
};

/// Parents under which a bare identifier reads a value (field, property or local).
const VALUE_PARENTS: &[&str] = &[
    "argument",
    "assignment_expression",
    "binary_expression",
    "return_statement",
    "equals_value_clause",
    "variable_declarator",
    "arrow_expression_clause",
    "postfix_unary_expression",
    "prefix_unary_expression",
    "element_access_expression",
    "interpolation",
    "conditional_expression",
    "parenthesized_expression",
    "expression_statement",
];

/// C# parser using tree-sitter.
pub struct CSharpParser {
    base: TreeSitterParser,
}

impl CSharpParser {
    /// Fails when the bundled grammar is incompatible with the tree-sitter
    /// runtime.
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            base: TreeSitterParser::new("C#", tree_sitter_c_sharp::LANGUAGE.into())?,
        })
    }

    /// Collect the declarations directly under `container`.
    fn declarations(
        &self,
        container: Node,
        content: &str,
        usings: &mut Vec<String>,
    ) -> Vec<SyntaxNode> {
        let mut out = Vec::new();
        // Declarations after `namespace X;` belong to it.
        let mut file_namespace: Option<SyntaxNode> = None;

        let mut cursor = container.walk();
        for child in container.children(&mut cursor) {
            match child.kind() {
                "using_directive" => {
                    if let Some(target) = self.using_target(&child, content) {
                        usings.push(target);
                    }
                }
                "file_scoped_namespace_declaration" => {
                    let mut namespace = self.namespace_node(&child, content);
                    namespace.children = self.declarations(child, content, usings);
                    file_namespace = Some(namespace);
                }
                _ => {
                    let target = match file_namespace.as_mut() {
                        Some(namespace) => &mut namespace.children,
                        None => &mut out,
                    };
                    self.declare(child, content, usings, target);
                }
            }
        }

        if let Some(namespace) = file_namespace {
            out.push(namespace);
        }
        out
    }

    fn declare(&self, node: Node, content: &str, usings: &mut Vec<String>, out: &mut Vec<SyntaxNode>) {
        match node.kind() {
            "namespace_declaration" => {
                let mut namespace = self.namespace_node(&node, content);
                if let Some(body) = node.child_by_field_name("body") {
                    namespace.children = self.declarations(body, content, usings);
                }
                out.push(namespace);
            }
            "class_declaration" => out.push(self.type_declaration(node, content, SyntaxKind::Class)),
            "interface_declaration" => {
                out.push(self.type_declaration(node, content, SyntaxKind::Interface))
            }
            "struct_declaration" | "record_struct_declaration" => {
                out.push(self.type_declaration(node, content, SyntaxKind::Struct))
            }
            "record_declaration" => {
                let kind = if TreeSitterParser::child_of_kind(&node, "struct").is_some() {
                    SyntaxKind::Struct
                } else {
                    SyntaxKind::Class
                };
                out.push(self.type_declaration(node, content, kind));
            }
            "enum_declaration" => out.push(self.type_declaration(node, content, SyntaxKind::Enum)),
            "delegate_declaration" => {
                if let Some(name) = self.declared_name(&node, content) {
                    let mut decl = self.member_node(&node, content, SyntaxKind::Delegate, name);
                    decl.type_text = self.return_type(&node, content);
                    decl.parameters = self.parameters(&node, content);
                    out.push(decl);
                }
            }
            "method_declaration" => {
                if let Some(name) = self.declared_name(&node, content) {
                    let mut decl = self.member_node(&node, content, SyntaxKind::Method, name);
                    decl.type_text = self.return_type(&node, content);
                    decl.parameters = self.parameters(&node, content);
                    if let Some(body) = node.child_by_field_name("body") {
                        decl.has_body = true;
                        self.scan_body(body, content, &mut decl);
                    }
                    out.push(decl);
                }
            }
            "constructor_declaration" => {
                if let Some(name) = self.declared_name(&node, content) {
                    let mut decl = self.member_node(&node, content, SyntaxKind::Constructor, name);
                    decl.parameters = self.parameters(&node, content);
                    if let Some(initializer) =
                        TreeSitterParser::child_of_kind(&node, "constructor_initializer")
                    {
                        self.scan_body(initializer, content, &mut decl);
                    }
                    if let Some(body) = node.child_by_field_name("body") {
                        decl.has_body = true;
                        self.scan_body(body, content, &mut decl);
                    }
                    out.push(decl);
                }
            }
            "property_declaration" => {
                if let Some(name) = self.declared_name(&node, content) {
                    let mut decl = self.member_node(&node, content, SyntaxKind::Property, name);
                    decl.type_text =
                        TreeSitterParser::field_text(&node, "type", content).map(normalize_text);
                    if let Some(accessors) = node.child_by_field_name("accessors") {
                        decl.has_body = self.accessors_have_body(&accessors);
                        self.scan_body(accessors, content, &mut decl);
                    }
                    if let Some(value) = node.child_by_field_name("value") {
                        decl.has_body = true;
                        self.scan_body(value, content, &mut decl);
                    }
                    out.push(decl);
                }
            }
            "field_declaration" => self.fields(node, content, out),
            "enum_member_declaration" => {
                if let Some(name) = self.declared_name(&node, content) {
                    let mut decl = SyntaxNode::new(
                        SyntaxKind::EnumMember,
                        name,
                        TreeSitterParser::node_span(&node),
                    );
                    decl.doc_comment = self.xml_doc(&node, content);
                    out.push(decl);
                }
            }
            _ => {}
        }
    }

    fn namespace_node(&self, node: &Node, content: &str) -> SyntaxNode {
        let name = TreeSitterParser::field_text(node, "name", content)
            .map(normalize_text)
            .unwrap_or_default();
        SyntaxNode::new(SyntaxKind::Namespace, name, TreeSitterParser::node_span(node))
    }

    fn type_declaration(&self, node: Node, content: &str, kind: SyntaxKind) -> SyntaxNode {
        let name = self.declared_name(&node, content).unwrap_or_default();
        let mut decl = self.member_node(&node, content, kind, name);
        decl.bases = self.base_list(&node, content);

        let body = node
            .child_by_field_name("body")
            .or_else(|| TreeSitterParser::child_of_kind(&node, "declaration_list"))
            .or_else(|| TreeSitterParser::child_of_kind(&node, "enum_member_declaration_list"));
        if let Some(body) = body {
            let mut nested_usings = Vec::new();
            decl.children = self.declarations(body, content, &mut nested_usings);
        }

        // Positional record parameters are properties.
        if let Some(list) = TreeSitterParser::child_of_kind(&node, "parameter_list") {
            for parameter in self.parameter_list(&list, content) {
                let property = SyntaxNode::new(
                    SyntaxKind::Property,
                    parameter.name,
                    TreeSitterParser::node_span(&list),
                )
                .with_type(parameter.type_text)
                .with_modifiers(["public"]);
                decl.children.push(property);
            }
        }

        decl
    }

    /// Declaration node carrying span, modifiers and doc comment.
    fn member_node(&self, node: &Node, content: &str, kind: SyntaxKind, name: String) -> SyntaxNode {
        let mut decl = SyntaxNode::new(kind, name, TreeSitterParser::node_span(node));
        decl.modifiers = self.modifiers(node, content);
        decl.type_parameters = self.type_parameters(node, content);
        decl.doc_comment = self.xml_doc(node, content);
        decl
    }

    /// `T`, `TKey` of `class Map<T, TKey>` or `void Get<T>()`.
    fn type_parameters(&self, node: &Node, content: &str) -> Vec<String> {
        let Some(list) = node
            .child_by_field_name("type_parameters")
            .or_else(|| TreeSitterParser::child_of_kind(node, "type_parameter_list"))
        else {
            return Vec::new();
        };
        TreeSitterParser::children_of_kind(&list, "type_parameter")
            .iter()
            .filter_map(|parameter| {
                TreeSitterParser::field_text(parameter, "name", content)
                    .or_else(|| {
                        TreeSitterParser::child_of_kind(parameter, "identifier")
                            .map(|id| TreeSitterParser::node_text(&id, content))
                    })
                    .map(String::from)
            })
            .collect()
    }

    fn fields(&self, node: Node, content: &str, out: &mut Vec<SyntaxNode>) {
        let Some(declaration) = TreeSitterParser::child_of_kind(&node, "variable_declaration")
        else {
            return;
        };
        let type_text = TreeSitterParser::field_text(&declaration, "type", content).map(normalize_text);
        let modifiers = self.modifiers(&node, content);
        let doc_comment = self.xml_doc(&node, content);

        for declarator in TreeSitterParser::children_of_kind(&declaration, "variable_declarator") {
            let Some(name) = self.declared_name(&declarator, content) else {
                continue;
            };
            let mut field =
                SyntaxNode::new(SyntaxKind::Field, name, TreeSitterParser::node_span(&declarator));
            field.type_text = type_text.clone();
            field.modifiers = modifiers.clone();
            field.doc_comment = doc_comment.clone();

            let mut cursor = declarator.walk();
            for part in declarator.children(&mut cursor) {
                if Some(part) != declarator.child_by_field_name("name") && part.is_named() {
                    self.scan_body(part, content, &mut field);
                }
            }
            out.push(field);
        }
    }

    fn declared_name(&self, node: &Node, content: &str) -> Option<String> {
        let name = node
            .child_by_field_name("name")
            .or_else(|| TreeSitterParser::child_of_kind(node, "identifier"))?;
        Some(self.simple_name(&name, content))
    }

    /// Name without type arguments (`Get` for `Get<T>`).
    fn simple_name(&self, node: &Node, content: &str) -> String {
        if node.kind() == "generic_name" {
            if let Some(identifier) = TreeSitterParser::child_of_kind(node, "identifier") {
                return TreeSitterParser::node_text(&identifier, content).to_string();
            }
        }
        let text = TreeSitterParser::node_text(node, content);
        text.split('<').next().unwrap_or(text).trim().to_string()
    }

    fn return_type(&self, node: &Node, content: &str) -> Option<String> {
        TreeSitterParser::field_text(node, "returns", content)
            .or_else(|| TreeSitterParser::field_text(node, "type", content))
            .map(normalize_text)
    }

    fn parameters(&self, node: &Node, content: &str) -> Vec<Parameter> {
        node.child_by_field_name("parameters")
            .map(|list| self.parameter_list(&list, content))
            .unwrap_or_default()
    }

    fn parameter_list(&self, list: &Node, content: &str) -> Vec<Parameter> {
        TreeSitterParser::children_of_kind(list, "parameter")
            .iter()
            .map(|parameter| Parameter {
                name: TreeSitterParser::field_text(parameter, "name", content)
                    .unwrap_or_default()
                    .to_string(),
                type_text: TreeSitterParser::field_text(parameter, "type", content)
                    .map(normalize_text)
                    .unwrap_or_else(|| "object".to_string()),
            })
            .collect()
    }

    fn modifiers(&self, node: &Node, content: &str) -> Vec<String> {
        TreeSitterParser::children_of_kind(node, "modifier")
            .iter()
            .map(|m| TreeSitterParser::node_text(m, content).to_string())
            .collect()
    }

    fn base_list(&self, node: &Node, content: &str) -> Vec<String> {
        let Some(list) = node
            .child_by_field_name("bases")
            .or_else(|| TreeSitterParser::child_of_kind(node, "base_list"))
        else {
            return Vec::new();
        };

        let mut bases = Vec::new();
        let mut cursor = list.walk();
        for base in list.named_children(&mut cursor) {
            let base = match base.kind() {
                "primary_constructor_base_type" => base
                    .child_by_field_name("type")
                    .or_else(|| base.named_child(0))
                    .unwrap_or(base),
                _ => base,
            };
            let text = normalize_text(TreeSitterParser::node_text(&base, content));
            let text = text.split('(').next().unwrap_or_default().to_string();
            if !text.is_empty() {
                bases.push(text);
            }
        }
        bases
    }

    fn accessors_have_body(&self, accessors: &Node) -> bool {
        TreeSitterParser::children_of_kind(accessors, "accessor_declaration")
            .iter()
            .any(|a| a.child_by_field_name("body").is_some())
    }

    fn using_target(&self, node: &Node, content: &str) -> Option<String> {
        let text = TreeSitterParser::node_text(node, content)
            .trim()
            .trim_end_matches(';')
            .trim();
        let text = text.strip_prefix("global").map(str::trim_start).unwrap_or(text);
        let text = text.strip_prefix("using")?.trim_start();
        if text.contains('=') {
            return None;
        }
        let text = text.strip_prefix("static ").unwrap_or(text);
        Some(normalize_text(text))
    }

    fn xml_doc(&self, node: &Node, content: &str) -> Option<String> {
        static TAG: OnceLock<Option<Regex>> = OnceLock::new();

        let mut comments = Vec::new();
        let mut sibling = node.prev_sibling();
        while let Some(s) = sibling {
            if s.kind() != "comment" {
                break;
            }
            let text = TreeSitterParser::node_text(&s, content);
            if !text.starts_with("///") {
                break;
            }
            comments.push(text.trim_start_matches("///").trim().to_string());
            sibling = s.prev_sibling();
        }

        if comments.is_empty() {
            return None;
        }
        comments.reverse();

        let joined = comments.join(" ");
        let cleaned = match TAG.get_or_init(|| Regex::new(r"<[^>]*>").ok()) {
            Some(tag) => tag.replace_all(&joined, " ").into_owned(),
            None => joined,
        };
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        (!cleaned.is_empty()).then_some(cleaned)
    }

    /// Collect references and locals of a member body into `member`.
    fn scan_body(&self, body: Node, content: &str, member: &mut SyntaxNode) {
        let mut references = Vec::new();
        let mut locals = Vec::new();
        self.scan(body, content, &mut references, &mut locals);
        member.children.extend(references);
        for local in locals {
            if !member.locals.contains(&local) {
                member.locals.push(local);
            }
        }
    }

    fn scan(&self, node: Node, content: &str, refs: &mut Vec<SyntaxNode>, locals: &mut Vec<String>) {
        match node.kind() {
            "invocation_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    self.invocation(node, function, content, refs, locals);
                }
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    self.scan(arguments, content, refs, locals);
                }
                return;
            }
            "object_creation_expression" => {
                if let Some(type_node) = node.child_by_field_name("type") {
                    let created = normalize_text(TreeSitterParser::node_text(&type_node, content));
                    refs.push(
                        SyntaxNode::new(
                            SyntaxKind::ObjectCreation,
                            created,
                            TreeSitterParser::node_span(&node),
                        )
                        .with_arguments(self.argument_count(&node)),
                    );
                }
                for field in ["arguments", "initializer"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.scan(child, content, refs, locals);
                    }
                }
                return;
            }
            "member_access_expression" => {
                if let (Some(name), Some(receiver)) = (
                    node.child_by_field_name("name"),
                    node.child_by_field_name("expression"),
                ) {
                    refs.push(
                        SyntaxNode::new(
                            SyntaxKind::MemberAccess,
                            self.simple_name(&name, content),
                            TreeSitterParser::node_span(&node),
                        )
                        .with_receiver(normalize_text(TreeSitterParser::node_text(
                            &receiver, content,
                        ))),
                    );
                    self.scan(receiver, content, refs, locals);
                }
                return;
            }
            "identifier" => {
                if self.is_value_access(&node) {
                    refs.push(SyntaxNode::new(
                        SyntaxKind::MemberAccess,
                        TreeSitterParser::node_text(&node, content),
                        TreeSitterParser::node_span(&node),
                    ));
                }
                return;
            }
            "variable_declarator" | "catch_declaration" | "declaration_expression"
            | "local_function_statement" | "parameter" => {
                if let Some(name) = TreeSitterParser::field_text(&node, "name", content) {
                    locals.push(name.to_string());
                }
            }
            "single_variable_designation" => {
                locals.push(TreeSitterParser::node_text(&node, content).to_string());
            }
            "foreach_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    if left.kind() == "identifier" {
                        locals.push(TreeSitterParser::node_text(&left, content).to_string());
                    }
                }
            }
            "lambda_expression" => {
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    if matches!(parameters.kind(), "identifier" | "implicit_parameter") {
                        locals.push(TreeSitterParser::node_text(&parameters, content).to_string());
                    }
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.scan(child, content, refs, locals);
        }
    }

    fn invocation(
        &self,
        node: Node,
        function: Node,
        content: &str,
        refs: &mut Vec<SyntaxNode>,
        locals: &mut Vec<String>,
    ) {
        let span = TreeSitterParser::node_span(&node);
        let arguments = self.argument_count(&node);

        match function.kind() {
            "member_access_expression" => {
                let Some(name) = function.child_by_field_name("name") else {
                    return;
                };
                let receiver = function.child_by_field_name("expression");
                let mut call =
                    SyntaxNode::new(SyntaxKind::Invocation, self.simple_name(&name, content), span)
                        .with_arguments(arguments);
                call.receiver =
                    receiver.map(|r| normalize_text(TreeSitterParser::node_text(&r, content)));
                refs.push(call);
                if let Some(receiver) = receiver {
                    self.scan(receiver, content, refs, locals);
                }
            }
            "identifier" | "generic_name" => {
                refs.push(
                    SyntaxNode::new(
                        SyntaxKind::Invocation,
                        self.simple_name(&function, content),
                        span,
                    )
                    .with_arguments(arguments),
                );
            }
            "member_binding_expression" => {
                let Some(name) = function.child_by_field_name("name") else {
                    return;
                };
                let mut call =
                    SyntaxNode::new(SyntaxKind::Invocation, self.simple_name(&name, content), span)
                        .with_arguments(arguments);
                call.receiver = self.conditional_receiver(&node, content);
                refs.push(call);
            }
            _ => self.scan(function, content, refs, locals),
        }
    }

    /// Receiver of `a?.M()`: the condition of the enclosing conditional access.
    fn conditional_receiver(&self, node: &Node, content: &str) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.kind() == "conditional_access_expression" {
                return TreeSitterParser::field_text(&parent, "condition", content)
                    .map(normalize_text);
            }
            current = parent.parent();
        }
        None
    }

    fn argument_count(&self, node: &Node) -> usize {
        node.child_by_field_name("arguments")
            .map(|args| TreeSitterParser::children_of_kind(&args, "argument").len())
            .unwrap_or(0)
    }

    fn is_value_access(&self, node: &Node) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        if parent.child_by_field_name("name") == Some(*node) {
            return false;
        }
        if !VALUE_PARENTS.contains(&parent.kind()) {
            return false;
        }
        // `new T { Name = x }` assigns a member of T, not of the enclosing type.
        if parent.kind() == "assignment_expression" {
            let in_initializer = parent
                .parent()
                .map(|g| g.kind() == "initializer_expression")
                .unwrap_or(false);
            if in_initializer && parent.child_by_field_name("left") == Some(*node) {
                return false;
            }
        }
        true
    }
}

impl SourceParser for CSharpParser {
    fn parse_unit(&self, path: &str, content: &str) -> Result<CompilationUnit, ParseError> {
        let tree = self.base.parse_tree(path, content)?;
        let root = tree.root_node();

        let mut unit = CompilationUnit::new(path);
        unit.has_errors = root.has_error();
        unit.members = self.declarations(root, content, &mut unit.usings);

        Ok(unit)
    }

    fn language_name(&self) -> &'static str {
        self.base.language_name()
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["cs"]
    }
}
