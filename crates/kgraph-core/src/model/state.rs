//! Per-batch processing state, read by the next run to decide what to skip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How a project's sources compare with the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Updated,
    Unchanged,
}

/// Terminal outcome of a project within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    New,
    Updated,
    Skipped,
    Failed,
    Fragmented,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Per-project entry of a processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub project_id: String,
    pub project_name: String,
    pub change: ChangeKind,
    pub status: ProjectStatus,
    /// Fingerprint of the last successfully persisted graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
    pub fragment_count: usize,
    /// Number of recovered per-file or per-symbol problems.
    pub diagnostics: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate outcome counters of a batch.
///
/// `fragmented` overlaps `new` and `updated`: a fragmented project counts
/// in both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCounters {
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fragmented: usize,
    pub cancelled: usize,
}

impl BatchCounters {
    pub fn processed(&self) -> usize {
        self.new + self.updated + self.skipped + self.failed
    }
}

/// One record per analysis batch.
///
/// Built while the batch runs and frozen by [`ProcessingState::complete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    pub batch_key: String,
    pub run_id: Uuid,
    /// Fingerprint over every project fingerprint in the batch.
    pub source_fingerprint: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub tool_version: String,
    pub projects: BTreeMap<String, ProjectRecord>,
    pub counters: BatchCounters,
}

impl ProcessingState {
    /// Start the state of a new batch run.
    pub fn begin(batch_key: impl Into<String>) -> Self {
        Self {
            batch_key: batch_key.into(),
            run_id: Uuid::new_v4(),
            source_fingerprint: String::new(),
            started_at: Utc::now(),
            completed_at: None,
            cancelled: false,
            tool_version: crate::TOOL_VERSION.to_string(),
            projects: BTreeMap::new(),
            counters: BatchCounters::default(),
        }
    }

    /// Add the outcome of a project processed in this run.
    pub fn record(&mut self, record: ProjectRecord) {
        match record.status {
            ProjectStatus::Skipped => self.counters.skipped += 1,
            ProjectStatus::Failed => self.counters.failed += 1,
            ProjectStatus::New | ProjectStatus::Updated | ProjectStatus::Fragmented => {
                match record.change {
                    ChangeKind::Updated => self.counters.updated += 1,
                    _ => self.counters.new += 1,
                }
                if record.status == ProjectStatus::Fragmented {
                    self.counters.fragmented += 1;
                }
            }
        }
        self.projects.insert(record.project_id.clone(), record);
    }

    /// Keep the previous record of a project this run never started.
    pub fn carry_forward(&mut self, project_id: &str, previous: Option<ProjectRecord>) {
        self.counters.cancelled += 1;
        if let Some(record) = previous {
            self.projects.insert(project_id.to_string(), record);
        }
    }

    /// Freeze the state at the end of the run.
    pub fn complete(mut self, source_fingerprint: impl Into<String>, cancelled: bool) -> Self {
        self.source_fingerprint = source_fingerprint.into();
        self.cancelled = cancelled;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn project(&self, project_id: &str) -> Option<&ProjectRecord> {
        self.projects.get(project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, change: ChangeKind, status: ProjectStatus) -> ProjectRecord {
        ProjectRecord {
            project_id: id.into(),
            project_name: id.into(),
            change,
            status,
            fingerprint: Some("fp".into()),
            node_count: 1,
            edge_count: 0,
            fragment_count: 0,
            diagnostics: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_counters_follow_status() {
        let mut state = ProcessingState::begin("batch");
        state.record(record("a", ChangeKind::New, ProjectStatus::New));
        state.record(record("b", ChangeKind::Updated, ProjectStatus::Fragmented));
        state.record(record("c", ChangeKind::Unchanged, ProjectStatus::Skipped));
        state.record(record("d", ChangeKind::Updated, ProjectStatus::Failed));
        state.carry_forward("e", None);

        let c = state.counters;
        assert_eq!((c.new, c.updated, c.skipped, c.failed), (1, 1, 1, 1));
        assert_eq!(c.fragmented, 1);
        assert_eq!(c.cancelled, 1);
        assert_eq!(c.processed(), 4);
        assert_eq!(state.projects.len(), 4);
    }

    #[test]
    fn test_complete_freezes_metadata() {
        let state = ProcessingState::begin("batch").complete("abc", true);
        assert!(state.is_complete());
        assert!(state.cancelled);
        assert_eq!(state.source_fingerprint, "abc");
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = ProcessingState::begin("batch");
        state.record(record("a", ChangeKind::New, ProjectStatus::New));
        let state = state.complete("fp", false);
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"batchKey\""));
        let back: ProcessingState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
