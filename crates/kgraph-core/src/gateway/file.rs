use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::model::{Fragment, ProcessingState, ProjectGraph};

use super::{ensure_fits, GatewayError, PersistenceGateway};

/// JSON-file gateway.
///
/// Layout under the base directory:
/// ```text
/// graphs/
///   projects/{project-id}.json
///   fragments/{fragment-id}.json
///   state/{batch-key}.json
/// ```
/// Ids are made file-safe by replacing `/`, `#` and other separators with `_`.
/// Files are written to a temporary sibling and renamed into place. Size
/// limits apply to the pretty-printed bytes actually written.
pub struct FileGateway {
    base_path: PathBuf,
    max_document_bytes: usize,
}

impl FileGateway {
    pub fn new(base_path: impl Into<PathBuf>, max_document_bytes: usize) -> Self {
        Self {
            base_path: base_path.into(),
            max_document_bytes,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn projects_dir(&self) -> PathBuf {
        self.base_path.join("projects")
    }

    fn fragments_dir(&self) -> PathBuf {
        self.base_path.join("fragments")
    }

    fn state_dir(&self) -> PathBuf {
        self.base_path.join("state")
    }

    fn project_file(&self, project_id: &str) -> PathBuf {
        self.projects_dir()
            .join(format!("{}.json", file_safe(project_id)))
    }

    fn fragment_file(&self, fragment_id: &str) -> PathBuf {
        self.fragments_dir()
            .join(format!("{}.json", file_safe(fragment_id)))
    }

    fn state_file(&self, batch_key: &str) -> PathBuf {
        self.state_dir().join(format!("{}.json", file_safe(batch_key)))
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<(), GatewayError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| GatewayError::io(dir, e))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), GatewayError> {
        self.write_encoded(path, serde_json::to_vec_pretty(value)?)
            .await
    }

    /// Encode a size-limited document, failing before anything is touched.
    fn encode_bounded<T: Serialize>(&self, document: &str, value: &T) -> Result<Vec<u8>, GatewayError> {
        let json = serde_json::to_vec_pretty(value)?;
        ensure_fits(document, json.len(), self.max_document_bytes)?;
        Ok(json)
    }

    async fn write_encoded(&self, path: &Path, json: Vec<u8>) -> Result<(), GatewayError> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent).await?;
        }
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, json)
            .await
            .map_err(|e| GatewayError::io(&temp, e))?;
        fs::rename(&temp, path)
            .await
            .map_err(|e| GatewayError::io(path, e))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, GatewayError> {
        match fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GatewayError::io(path, e)),
        }
    }

    async fn remove(&self, path: &Path) -> Result<(), GatewayError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::io(path, e)),
        }
    }

    /// Fragment files of a project, found by file-name prefix.
    async fn fragment_files(&self, project_id: &str) -> Result<Vec<PathBuf>, GatewayError> {
        let dir = self.fragments_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GatewayError::io(&dir, e)),
        };

        let prefix = format!("{}_", file_safe(project_id));
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| GatewayError::io(&dir, e))?
        {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
            if matches {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    async fn upsert_project(&self, graph: &ProjectGraph) -> Result<(), GatewayError> {
        let json = self.encode_bounded(&graph.project_id, graph)?;

        let keep: Vec<PathBuf> = graph
            .fragment_ids
            .iter()
            .map(|id| self.fragment_file(id))
            .collect();
        for stale in self.fragment_files(&graph.project_id).await? {
            if !keep.contains(&stale) {
                self.remove(&stale).await?;
            }
        }

        self.write_encoded(&self.project_file(&graph.project_id), json)
            .await
    }

    async fn upsert_fragments(&self, fragments: &[Fragment]) -> Result<(), GatewayError> {
        let encoded = fragments
            .iter()
            .map(|f| Ok((self.fragment_file(&f.fragment_id), self.encode_bounded(&f.fragment_id, f)?)))
            .collect::<Result<Vec<_>, GatewayError>>()?;
        for (path, json) in encoded {
            self.write_encoded(&path, json).await?;
        }
        Ok(())
    }

    async fn upsert_processing_state(&self, state: &ProcessingState) -> Result<(), GatewayError> {
        self.write_json(&self.state_file(&state.batch_key), state)
            .await
    }

    async fn get_processing_state(
        &self,
        batch_key: &str,
    ) -> Result<Option<ProcessingState>, GatewayError> {
        self.read_json(&self.state_file(batch_key)).await
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), GatewayError> {
        for fragment in self.fragment_files(project_id).await? {
            self.remove(&fragment).await?;
        }
        self.remove(&self.project_file(project_id)).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectGraph>, GatewayError> {
        self.read_json(&self.project_file(project_id)).await
    }

    async fn get_fragments(&self, project_id: &str) -> Result<Vec<Fragment>, GatewayError> {
        let mut fragments = Vec::new();
        for path in self.fragment_files(project_id).await? {
            if let Some(fragment) = self.read_json::<Fragment>(&path).await? {
                fragments.push(fragment);
            }
        }
        fragments.sort_by_key(|f| f.chunk_index);
        Ok(fragments)
    }
}

/// File-name-safe form of a record id.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_safe_ids() {
        assert_eq!(file_safe("project/ab12cd34"), "project_ab12cd34");
        assert_eq!(file_safe("project/ab12cd34#0f1e2d3c#3"), "project_ab12cd34_0f1e2d3c_3");
        assert_eq!(file_safe("my repo"), "my_repo");
    }

    #[tokio::test]
    async fn test_limit_applies_to_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let graph = ProjectGraph::new("project/1", "P", Vec::new(), Vec::new(), "fp");
        let compact = serde_json::to_vec(&graph).unwrap().len();
        let pretty = serde_json::to_vec_pretty(&graph).unwrap().len();
        assert!(compact < pretty);

        // Fits compact, but not as written.
        let gateway = FileGateway::new(dir.path(), compact);
        assert!(matches!(
            gateway.upsert_project(&graph).await,
            Err(GatewayError::DocumentTooLarge { .. })
        ));
        assert!(gateway.get_project("project/1").await.unwrap().is_none());

        let gateway = FileGateway::new(dir.path(), pretty);
        gateway.upsert_project(&graph).await.unwrap();
        let written = std::fs::metadata(gateway.project_file("project/1")).unwrap().len();
        assert!(written as usize <= gateway.max_document_bytes());
    }
}
