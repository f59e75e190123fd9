//! Graph edges: directed, counted relationships between nodes.

use serde::{Deserialize, Serialize};

/// Kind of relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Method invokes method (or constructor).
    Calls,
    /// Caller dispatches through an interface or abstract contract type.
    CallsVia,
    /// Caller may reach an override or implementation at runtime.
    IndirectCall,
    /// Type implements interface, or method implements interface member.
    Implements,
    /// Type extends base type, or method overrides base method.
    Inherits,
    /// Member depends on a type or reads/writes a field or property.
    Uses,
    /// Scope directly declares a member.
    Contains,
    /// Inverse of `Contains`, used by the structural view.
    ContainedIn,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::CallsVia => "callsVia",
            EdgeKind::IndirectCall => "indirectCall",
            EdgeKind::Implements => "implements",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Uses => "uses",
            EdgeKind::Contains => "contains",
            EdgeKind::ContainedIn => "containedIn",
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, EdgeKind::Contains | EdgeKind::ContainedIn)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch flags of a call target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFlags {
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_override: bool,
}

impl CallFlags {
    /// Whether the target can be dispatched to another implementation.
    pub fn is_polymorphic(&self) -> bool {
        self.is_virtual || self.is_abstract || self.is_override
    }
}

/// Identity of an edge: `(source, target, kind)`.
pub type EdgeKey = (String, String, EdgeKind);

/// A directed relationship between two node ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    /// Number of occurrences merged into this edge.
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<CallFlags>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            count: 1,
            flags: None,
        }
    }

    pub fn calls(source: impl Into<String>, target: impl Into<String>, flags: CallFlags) -> Self {
        Self::new(source, target, EdgeKind::Calls).with_flags(flags)
    }

    pub fn with_flags(mut self, flags: CallFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.kind)
    }

    /// The reversed structural edge (`contains` becomes `containedIn`).
    pub fn inverse(&self) -> Option<Edge> {
        let kind = match self.kind {
            EdgeKind::Contains => EdgeKind::ContainedIn,
            EdgeKind::ContainedIn => EdgeKind::Contains,
            _ => return None,
        };
        Some(Edge::new(self.target.clone(), self.source.clone(), kind).with_count(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_lower_camel() {
        for kind in [
            EdgeKind::Calls,
            EdgeKind::CallsVia,
            EdgeKind::IndirectCall,
            EdgeKind::Implements,
            EdgeKind::Inherits,
            EdgeKind::Uses,
            EdgeKind::Contains,
            EdgeKind::ContainedIn,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_call_edge_carries_flags() {
        let flags = CallFlags {
            is_virtual: true,
            ..Default::default()
        };
        let edge = Edge::calls("method/aaaaaaaa", "method/bbbbbbbb", flags);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["flags"]["isVirtual"], true);
        assert_eq!(json["count"], 1);
        assert!(flags.is_polymorphic());
    }

    #[test]
    fn test_inverse_only_for_structural_edges() {
        let contains = Edge::new("class/aaaaaaaa", "method/bbbbbbbb", EdgeKind::Contains);
        let inverse = contains.inverse().unwrap();
        assert_eq!(inverse.kind, EdgeKind::ContainedIn);
        assert_eq!(inverse.source, "method/bbbbbbbb");
        assert!(Edge::new("a/1", "b/2", EdgeKind::Uses).inverse().is_none());
    }
}
