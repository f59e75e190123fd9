//! Persistence gateways: where project graphs, fragments and processing
//! states are stored.
//!
//! Every record is upserted by id. Writing a project record removes any of
//! its fragments the record no longer lists, so a re-analyzed project always
//! replaces its previous graph wholesale. Fragments are written first under
//! ids unique to their fingerprint; until the parent lands, the previous
//! record keeps pointing at its own, untouched set.

mod error;
mod file;
mod memory;
mod surreal;

pub use error::GatewayError;
pub use file::FileGateway;
pub use memory::MemoryGateway;
pub use surreal::SurrealGateway;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::GraphError;
use crate::fragmentation::FragmentationEngine;
use crate::model::{Fragment, ProcessingState, ProjectGraph};

/// Storage backend for graphs and processing state.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Largest document the backend accepts, in serialized bytes.
    fn max_document_bytes(&self) -> usize;

    /// Insert or replace a project record.
    async fn upsert_project(&self, graph: &ProjectGraph) -> Result<(), GatewayError>;

    /// Insert or replace fragment records.
    async fn upsert_fragments(&self, fragments: &[Fragment]) -> Result<(), GatewayError>;

    async fn upsert_processing_state(&self, state: &ProcessingState) -> Result<(), GatewayError>;

    async fn get_processing_state(
        &self,
        batch_key: &str,
    ) -> Result<Option<ProcessingState>, GatewayError>;

    /// Remove a project record and all of its fragments.
    async fn delete_project(&self, project_id: &str) -> Result<(), GatewayError>;

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectGraph>, GatewayError>;

    /// Fragments of a project, ordered by chunk index.
    async fn get_fragments(&self, project_id: &str) -> Result<Vec<Fragment>, GatewayError>;
}

/// Reject a document whose serialized size exceeds `limit`.
pub fn check_document_size<T: Serialize>(
    document: &str,
    value: &T,
    limit: usize,
) -> Result<(), GatewayError> {
    ensure_fits(document, serde_json::to_vec(value)?.len(), limit)
}

/// Reject an already encoded document of `size` bytes exceeding `limit`.
pub fn ensure_fits(document: &str, size: usize, limit: usize) -> Result<(), GatewayError> {
    if size > limit {
        return Err(GatewayError::DocumentTooLarge {
            document: document.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Load a project graph, reassembling it when it was stored in fragments.
pub async fn load_project(
    gateway: &dyn PersistenceGateway,
    project_id: &str,
) -> Result<Option<ProjectGraph>, GraphError> {
    let Some(record) = gateway.get_project(project_id).await? else {
        return Ok(None);
    };
    if !record.is_fragmented {
        return Ok(Some(record));
    }
    // Sets left behind by a write whose parent never landed are ignored.
    let fragments: Vec<_> = gateway
        .get_fragments(project_id)
        .await?
        .into_iter()
        .filter(|f| record.fragment_ids.contains(&f.fragment_id))
        .collect();
    FragmentationEngine::reassemble(&record, &fragments).map(Some)
}

/// Open the backend named in the storage configuration.
pub async fn open_gateway(
    config: &StorageConfig,
) -> Result<Arc<dyn PersistenceGateway>, GatewayError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryGateway::new(config.max_document_bytes))),
        "file" => Ok(Arc::new(FileGateway::new(
            config.graphs_path(),
            config.max_document_bytes,
        ))),
        "surreal" => {
            let gateway =
                SurrealGateway::open(&config.database_path(), config.max_document_bytes).await?;
            Ok(Arc::new(gateway))
        }
        other => Err(GatewayError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_document_size() {
        assert!(check_document_size("small", &"abc", 16).is_ok());
        let err = check_document_size("big", &"x".repeat(64), 16).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::DocumentTooLarge { size: 66, limit: 16, .. }
        ));
    }

    #[tokio::test]
    async fn test_open_unknown_backend() {
        let config = StorageConfig {
            backend: "tape".into(),
            ..Default::default()
        };
        assert!(matches!(
            open_gateway(&config).await,
            Err(GatewayError::UnknownBackend(_))
        ));
    }
}
