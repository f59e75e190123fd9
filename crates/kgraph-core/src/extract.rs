//! Relationship extraction: walk events plus oracle facts become nodes and
//! typed edges.

use tracing::warn;

use crate::config::AnalysisConfig;
use crate::error::Diagnostic;
use crate::model::{CallFlags, Edge, EdgeKind, Node};
use crate::oracle::{PlatformFilter, Resolution, Symbol, SymbolKind, SymbolRef};
use crate::walker::{DeclarationEvent, ReferenceEvent, WalkEvent, WalkOutput};

/// Filters applied while extracting edges.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    pub platform: PlatformFilter,
    /// Base type that never produces an `inherits` edge.
    pub root_object_type: String,
}

impl ExtractionRules {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            platform: PlatformFilter::from_config(config),
            root_object_type: config.root_object_type.clone(),
        }
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// Nodes and edges extracted from one file.
#[derive(Debug, Default)]
pub struct Extraction {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// `(id, fully qualified name)` of every symbol an edge or node points at.
    pub symbols: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    fn edge(&mut self, source: &str, target: &SymbolRef, kind: EdgeKind) -> Option<&mut Edge> {
        let target_id = target.node_id()?;
        self.symbols
            .push((target_id.clone(), target.fully_qualified_name.clone()));
        self.edges.push(Edge::new(source, target_id, kind));
        self.edges.last_mut()
    }
}

/// Applies the extraction rules to walk events of one project.
pub struct RelationshipExtractor {
    rules: ExtractionRules,
    project_id: String,
}

impl RelationshipExtractor {
    pub fn new(rules: ExtractionRules, project_id: impl Into<String>) -> Self {
        Self {
            rules,
            project_id: project_id.into(),
        }
    }

    /// Extract from the events of one file; top-level types hang off `file_id`.
    pub fn extract(&self, walk: &WalkOutput, file_id: &str) -> Extraction {
        let mut out = Extraction::default();
        for event in &walk.events {
            match event {
                WalkEvent::Declaration(declaration) => self.declaration(declaration, file_id, &mut out),
                WalkEvent::Reference(reference) => self.reference(reference, &mut out),
            }
        }
        out
    }

    fn declaration(&self, event: &DeclarationEvent, file_id: &str, out: &mut Extraction) {
        let symbol = &event.symbol;
        let (Some(kind), Some(id)) = (symbol.kind.node_kind(), symbol.node_id()) else {
            return;
        };

        let mut node = Node::new(kind, &symbol.name, &symbol.fully_qualified_name, &self.project_id)
            .in_namespace(&symbol.namespace)
            .with_accessibility(symbol.accessibility)
            .at(event.location.clone())
            .with_documentation(event.doc_comment.clone());
        node.is_abstract = symbol.is_abstract;
        node.is_static = symbol.is_static;
        node.is_sealed = symbol.is_sealed;
        if let Some(containing) = &symbol.containing_type {
            node = node.contained_in(&containing.fully_qualified_name);
        }
        out.symbols.push((id.clone(), symbol.fully_qualified_name.clone()));
        out.nodes.push(node);

        match &event.scope.current_type {
            Some(parent) => {
                if let Some(parent_id) = parent.node_id() {
                    out.edges.push(Edge::new(parent_id, &id, EdgeKind::Contains));
                }
            }
            None => out.edges.push(Edge::new(file_id, &id, EdgeKind::Contains)),
        }

        if symbol.kind.is_type() {
            self.type_edges(symbol, &id, out);
        } else {
            self.member_edges(symbol, &id, out);
        }

        for missing in &symbol.unresolved_types {
            out.diagnostics.push(Diagnostic::unresolved(
                &event.location.file_path,
                format!(
                    "type `{}` in {} at line {}",
                    missing, symbol.fully_qualified_name, event.location.line
                ),
            ));
        }
    }

    fn type_edges(&self, symbol: &Symbol, id: &str, out: &mut Extraction) {
        if let Some(base) = &symbol.base_type {
            if base.fully_qualified_name != self.rules.root_object_type {
                out.edge(id, base, EdgeKind::Inherits);
            }
        }
        for interface in &symbol.interfaces {
            out.edge(id, interface, EdgeKind::Implements);
        }
        // Delegate signatures.
        self.signature_uses(symbol, id, out);
    }

    fn member_edges(&self, symbol: &Symbol, id: &str, out: &mut Extraction) {
        if let Some(overridden) = &symbol.overridden {
            out.edge(id, overridden, EdgeKind::Inherits);
        }
        for implemented in &symbol.implemented_members {
            out.edge(id, implemented, EdgeKind::Implements);
        }
        self.signature_uses(symbol, id, out);
    }

    fn signature_uses(&self, symbol: &Symbol, id: &str, out: &mut Extraction) {
        let mut seen: Vec<&SymbolRef> = Vec::new();
        for used in symbol.parameter_types.iter().chain(&symbol.return_types) {
            if self.rules.platform.is_platform(used) || seen.contains(&used) {
                continue;
            }
            seen.push(used);
            out.edge(id, used, EdgeKind::Uses);
        }
    }

    fn reference(&self, event: &ReferenceEvent, out: &mut Extraction) {
        let Some(caller) = event.scope.current_member.as_ref().and_then(SymbolRef::node_id) else {
            return;
        };

        let target = match &event.resolution {
            Resolution::Resolved(symbol) => symbol,
            Resolution::Unresolved(what) => {
                warn!(
                    path = %event.location.file_path,
                    line = event.location.line,
                    symbol = %what,
                    "Unresolved reference dropped"
                );
                out.diagnostics.push(Diagnostic::unresolved(
                    &event.location.file_path,
                    format!("{} at line {}", what, event.location.line),
                ));
                return;
            }
        };
        if target.kind == SymbolKind::Local || self.is_platform_target(target) {
            return;
        }

        match target.kind {
            SymbolKind::Method | SymbolKind::Constructor => {
                let flags = CallFlags {
                    is_virtual: target.is_virtual,
                    is_abstract: target.is_abstract,
                    is_override: target.is_override,
                };
                if let Some(edge) = out.edge(&caller, &target.to_ref(), EdgeKind::Calls) {
                    edge.flags = Some(flags);
                }

                if let Some(contract) = &target.containing_type {
                    if contract.kind == SymbolKind::Interface || target.is_abstract {
                        out.edge(&caller, contract, EdgeKind::CallsVia);
                    }
                }
            }
            _ => {
                out.edge(&caller, &target.to_ref(), EdgeKind::Uses);
            }
        }
    }

    fn is_platform_target(&self, target: &Symbol) -> bool {
        self.rules.platform.is_platform(&target.to_ref())
            || target
                .containing_type
                .as_ref()
                .is_some_and(|t| self.rules.platform.is_platform(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::SourceIndexOracle;
    use crate::syntax::{CSharpParser, SourceParser};
    use crate::walker::DeclarationWalker;

    fn extract(source: &str) -> Extraction {
        let unit = CSharpParser::new().unwrap().parse_unit("Shop.cs", source).unwrap();
        let oracle =
            SourceIndexOracle::build("Shop", "System.Private.CoreLib", std::slice::from_ref(&unit));
        let walk = DeclarationWalker::new(&oracle, &unit).walk().unwrap();
        RelationshipExtractor::new(ExtractionRules::default(), "project/00000000")
            .extract(&walk, "file/11111111")
    }

    fn id(kind: crate::model::NodeKind, fqn: &str) -> String {
        crate::ids::node_id(kind, fqn)
    }

    fn has_edge(out: &Extraction, source: &str, target: &str, kind: EdgeKind) -> bool {
        out.edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind)
    }

    #[test]
    fn test_type_rules() {
        use crate::model::NodeKind;
        let out = extract(
            r#"
namespace P
{
    interface IB { void M(); }
    class B : IB { public void M() { } }
    class A : B { }
}
"#,
        );
        let a = id(NodeKind::Class, "P.A");
        let b = id(NodeKind::Class, "P.B");
        let ib = id(NodeKind::Interface, "P.IB");

        assert!(has_edge(&out, &a, &b, EdgeKind::Inherits));
        assert!(has_edge(&out, &b, &ib, EdgeKind::Implements));
        assert!(has_edge(&out, &a, &ib, EdgeKind::Implements));
        assert!(has_edge(&out, "file/11111111", &a, EdgeKind::Contains));
        assert!(has_edge(
            &out,
            &id(NodeKind::Method, "P.B.M()"),
            &id(NodeKind::Method, "P.IB.M()"),
            EdgeKind::Implements
        ));
        assert!(!out.edges.iter().any(|e| e.kind == EdgeKind::Inherits && e.source == b));
    }

    #[test]
    fn test_member_rules() {
        use crate::model::NodeKind;
        let out = extract(
            r#"
namespace Shop
{
    public class Order { public int Total; }
    public interface IRepo { void Save(Order order); }
    public abstract class Base { public virtual string Describe() { return ""; } }
    public class Service : Base
    {
        private IRepo _repo;
        public override string Describe() { return "service"; }
        public Order Place(string name, Order draft)
        {
            var order = new Order();
            _repo.Save(order);
            System.Console.WriteLine(draft.Total);
            Missing();
            return order;
        }
    }
}
"#,
        );
        let place = id(NodeKind::Method, "Shop.Service.Place(string, Order)");
        let order = id(NodeKind::Class, "Shop.Order");
        let save = id(NodeKind::Method, "Shop.IRepo.Save(Order)");
        let repo = id(NodeKind::Interface, "Shop.IRepo");

        let node = out.nodes.iter().find(|n| n.id == place).unwrap();
        assert_eq!(node.containing_type.as_deref(), Some("Shop.Service"));

        assert!(has_edge(
            &out,
            &id(NodeKind::Class, "Shop.Service"),
            &place,
            EdgeKind::Contains
        ));
        assert!(has_edge(&out, &place, &order, EdgeKind::Uses));
        let call = out
            .edges
            .iter()
            .find(|e| e.source == place && e.target == save && e.kind == EdgeKind::Calls)
            .unwrap();
        assert!(call.flags.unwrap().is_abstract);
        assert!(has_edge(&out, &place, &repo, EdgeKind::CallsVia));
        assert!(has_edge(
            &out,
            &place,
            &id(NodeKind::Field, "Shop.Order.Total"),
            EdgeKind::Uses
        ));
        assert!(has_edge(
            &out,
            &id(NodeKind::Method, "Shop.Service.Describe()"),
            &id(NodeKind::Method, "Shop.Base.Describe()"),
            EdgeKind::Inherits
        ));

        // `string` parameters and returns are platform types.
        assert!(!out
            .edges
            .iter()
            .any(|e| e.target == id(NodeKind::Class, "System.String")));
        assert!(out.diagnostics.iter().any(|d| d.message.contains("Missing")));
    }

    #[test]
    fn test_unresolved_signature_types_are_diagnosed() {
        let out = extract(
            "namespace Shop { class Cart : Basket { Coupon Apply(Discount d, int n) { return null; } } }",
        );
        let messages: Vec<&str> = out.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("`Basket` in Shop.Cart")));
        assert!(messages.iter().any(|m| m.contains("`Discount` in Shop.Cart.Apply")));
        assert!(messages.iter().any(|m| m.contains("`Coupon` in Shop.Cart.Apply")));
        assert_eq!(out.diagnostics.len(), 3);
        assert!(out.diagnostics.iter().all(|d| d.path == "Shop.cs"));
    }
}
