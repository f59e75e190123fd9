//! Deterministic node identifiers.
//!
//! An id is `<kind-prefix>/<hash8>` where `hash8` is the first 8 hex
//! characters of the SHA-256 of the fully qualified name. Ids never depend on
//! timestamps, file order or object identity.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::GraphError;
use crate::model::NodeKind;

/// Compute the id of a node from its kind and fully qualified name.
pub fn node_id(kind: NodeKind, fully_qualified_name: &str) -> String {
    format!("{}/{}", kind.id_prefix(), hash8(fully_qualified_name))
}

/// First 8 hex characters of the SHA-256 of `input`.
pub fn hash8(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}

/// Full hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether `id` has the `<kind-prefix>/<8-hex-chars>` shape.
pub fn is_well_formed(id: &str) -> bool {
    let Some((prefix, hash)) = id.split_once('/') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_lowercase())
        && hash.len() == 8
        && hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// Tracks which fully qualified name produced each id within one project.
///
/// Registering a second, different name under an existing id is a
/// data-integrity error.
#[derive(Debug, Default)]
pub struct IdRegistry {
    owners: HashMap<String, String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was derived from `fully_qualified_name`.
    pub fn register(&mut self, id: &str, fully_qualified_name: &str) -> Result<(), GraphError> {
        match self.owners.get(id) {
            Some(existing) if existing != fully_qualified_name => Err(GraphError::IdCollision {
                id: id.to_string(),
                existing: existing.clone(),
                incoming: fully_qualified_name.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.owners
                    .insert(id.to_string(), fully_qualified_name.to_string());
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = node_id(NodeKind::Class, "Shop.Orders.OrderService");
        let b = node_id(NodeKind::Class, "Shop.Orders.OrderService");
        assert_eq!(a, b);
        assert!(a.starts_with("class/"));
        assert!(is_well_formed(&a));
    }

    #[test]
    fn test_kind_changes_prefix_only() {
        let class = node_id(NodeKind::Class, "Shop.Item");
        let strukt = node_id(NodeKind::Struct, "Shop.Item");
        assert_ne!(class, strukt);
        assert_eq!(class.split('/').nth(1), strukt.split('/').nth(1));
    }

    #[test]
    fn test_hash8_known_value() {
        // sha256("") = e3b0c442...
        assert_eq!(hash8(""), "e3b0c442");
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed("method/0a1b2c3d"));
        assert!(!is_well_formed("method/0A1B2C3D"));
        assert!(!is_well_formed("method0a1b2c3d"));
        assert!(!is_well_formed("/0a1b2c3d"));
        assert!(!is_well_formed("method/0a1b2c3"));
    }

    #[test]
    fn test_registry_detects_collision() {
        let mut registry = IdRegistry::new();
        registry.register("class/00000000", "A.B").unwrap();
        registry.register("class/00000000", "A.B").unwrap();
        let err = registry.register("class/00000000", "C.D").unwrap_err();
        assert!(matches!(err, GraphError::IdCollision { .. }));
        assert_eq!(registry.len(), 1);
    }
}
