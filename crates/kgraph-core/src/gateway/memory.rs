use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::model::{Fragment, ProcessingState, ProjectGraph};

use super::{check_document_size, GatewayError, PersistenceGateway};

/// Write counters of a [`MemoryGateway`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub projects: usize,
    pub fragments: usize,
    pub states: usize,
    pub deletes: usize,
}

/// In-process gateway that counts every write.
#[derive(Debug)]
pub struct MemoryGateway {
    max_document_bytes: usize,
    projects: RwLock<HashMap<String, ProjectGraph>>,
    fragments: RwLock<HashMap<String, Fragment>>,
    states: RwLock<HashMap<String, ProcessingState>>,
    project_writes: AtomicUsize,
    fragment_writes: AtomicUsize,
    state_writes: AtomicUsize,
    deletes: AtomicUsize,
    pending_conflicts: AtomicUsize,
}

impl MemoryGateway {
    pub fn new(max_document_bytes: usize) -> Self {
        Self {
            max_document_bytes,
            projects: RwLock::new(HashMap::new()),
            fragments: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            project_writes: AtomicUsize::new(0),
            fragment_writes: AtomicUsize::new(0),
            state_writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            pending_conflicts: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> WriteCounts {
        WriteCounts {
            projects: self.project_writes.load(Ordering::SeqCst),
            fragments: self.fragment_writes.load(Ordering::SeqCst),
            states: self.state_writes.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_writes(&self) {
        self.project_writes.store(0, Ordering::SeqCst);
        self.fragment_writes.store(0, Ordering::SeqCst);
        self.state_writes.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }

    /// Make the next `count` project writes fail with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.projects.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn fragment_count(&self) -> usize {
        self.fragments.read().await.len()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_DOCUMENT_BYTES)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    async fn upsert_project(&self, graph: &ProjectGraph) -> Result<(), GatewayError> {
        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GatewayError::Conflict(graph.project_id.clone()));
        }
        check_document_size(&graph.project_id, graph, self.max_document_bytes)?;

        self.fragments.write().await.retain(|id, fragment| {
            fragment.parent_project_id != graph.project_id || graph.fragment_ids.contains(id)
        });
        self.projects
            .write()
            .await
            .insert(graph.project_id.clone(), graph.clone());
        self.project_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_fragments(&self, fragments: &[Fragment]) -> Result<(), GatewayError> {
        for fragment in fragments {
            check_document_size(&fragment.fragment_id, fragment, self.max_document_bytes)?;
        }
        let mut stored = self.fragments.write().await;
        for fragment in fragments {
            stored.insert(fragment.fragment_id.clone(), fragment.clone());
            self.fragment_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn upsert_processing_state(&self, state: &ProcessingState) -> Result<(), GatewayError> {
        self.states
            .write()
            .await
            .insert(state.batch_key.clone(), state.clone());
        self.state_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_processing_state(
        &self,
        batch_key: &str,
    ) -> Result<Option<ProcessingState>, GatewayError> {
        Ok(self.states.read().await.get(batch_key).cloned())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), GatewayError> {
        self.fragments
            .write()
            .await
            .retain(|_, fragment| fragment.parent_project_id != project_id);
        self.projects.write().await.remove(project_id);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectGraph>, GatewayError> {
        Ok(self.projects.read().await.get(project_id).cloned())
    }

    async fn get_fragments(&self, project_id: &str) -> Result<Vec<Fragment>, GatewayError> {
        let mut fragments: Vec<Fragment> = self
            .fragments
            .read()
            .await
            .values()
            .filter(|f| f.parent_project_id == project_id)
            .cloned()
            .collect();
        fragments.sort_by_key(|f| f.chunk_index);
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let gateway = MemoryGateway::default();
        let graph = ProjectGraph::new("project/1", "P", Vec::new(), Vec::new(), "fp");
        gateway.inject_conflicts(1);

        assert!(matches!(
            gateway.upsert_project(&graph).await,
            Err(GatewayError::Conflict(_))
        ));
        gateway.upsert_project(&graph).await.unwrap();
        assert_eq!(gateway.writes().projects, 1);
    }

    #[tokio::test]
    async fn test_rejects_oversized_project() {
        let gateway = MemoryGateway::new(64);
        let graph = ProjectGraph::new("project/1", "P", Vec::new(), Vec::new(), "fp");
        assert!(matches!(
            gateway.upsert_project(&graph).await,
            Err(GatewayError::DocumentTooLarge { .. })
        ));
        assert_eq!(gateway.writes().projects, 0);
    }
}
