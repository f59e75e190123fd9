//! SurrealDB embedded gateway.

use async_trait::async_trait;
use std::path::Path;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;

use crate::model::{Fragment, ProcessingState, ProjectGraph};

use super::{check_document_size, GatewayError, PersistenceGateway};

/// Gateway backed by an embedded RocksDB SurrealDB instance.
pub struct SurrealGateway {
    db: Surreal<Db>,
    max_document_bytes: usize,
}

impl SurrealGateway {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path, max_document_bytes: usize) -> Result<Self, GatewayError> {
        let db = Surreal::new::<RocksDb>(path).await?;
        db.use_ns("kgraph").use_db("graph").await?;

        let gateway = Self {
            db,
            max_document_bytes,
        };
        gateway.initialize_schema().await?;
        Ok(gateway)
    }

    async fn initialize_schema(&self) -> Result<(), GatewayError> {
        self.db
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS project SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS project_id ON project FIELDS projectId UNIQUE;

                DEFINE TABLE IF NOT EXISTS fragment SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS fragment_parent ON fragment FIELDS parentProjectId;

                DEFINE TABLE IF NOT EXISTS processing_state SCHEMALESS;
                "#,
            )
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SurrealGateway {
    fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    async fn upsert_project(&self, graph: &ProjectGraph) -> Result<(), GatewayError> {
        check_document_size(&graph.project_id, graph, self.max_document_bytes)?;

        self.db
            .query("DELETE fragment WHERE parentProjectId = $project AND fragmentId NOTINSIDE $keep")
            .bind(("project", graph.project_id.clone()))
            .bind(("keep", graph.fragment_ids.clone()))
            .await?
            .check()?;

        let _: Option<ProjectGraph> = self
            .db
            .upsert(("project", graph.project_id.as_str()))
            .content(graph.clone())
            .await?;
        Ok(())
    }

    async fn upsert_fragments(&self, fragments: &[Fragment]) -> Result<(), GatewayError> {
        for fragment in fragments {
            check_document_size(&fragment.fragment_id, fragment, self.max_document_bytes)?;
            let _: Option<Fragment> = self
                .db
                .upsert(("fragment", fragment.fragment_id.as_str()))
                .content(fragment.clone())
                .await?;
        }
        Ok(())
    }

    async fn upsert_processing_state(&self, state: &ProcessingState) -> Result<(), GatewayError> {
        let _: Option<ProcessingState> = self
            .db
            .upsert(("processing_state", state.batch_key.as_str()))
            .content(state.clone())
            .await?;
        Ok(())
    }

    async fn get_processing_state(
        &self,
        batch_key: &str,
    ) -> Result<Option<ProcessingState>, GatewayError> {
        Ok(self.db.select(("processing_state", batch_key)).await?)
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), GatewayError> {
        // Separate queries, one statement each.
        self.db
            .query("DELETE fragment WHERE parentProjectId = $project")
            .bind(("project", project_id.to_string()))
            .await?
            .check()?;
        let _: Option<ProjectGraph> = self.db.delete(("project", project_id)).await?;
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectGraph>, GatewayError> {
        Ok(self.db.select(("project", project_id)).await?)
    }

    async fn get_fragments(&self, project_id: &str) -> Result<Vec<Fragment>, GatewayError> {
        let fragments: Vec<Fragment> = self
            .db
            .query("SELECT * FROM fragment WHERE parentProjectId = $project ORDER BY chunkIndex")
            .bind(("project", project_id.to_string()))
            .await?
            .take(0)?;
        Ok(fragments)
    }
}
