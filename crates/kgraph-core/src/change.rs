//! Change detection: content fingerprints and project classification.

use chrono::Utc;

use crate::ids::sha256_hex;
use crate::model::{
    ChangeKind, ProcessingState, ProjectGraph, ProjectRecord, ProjectStatus, SourceFile,
};

/// Order-independent fingerprint of a set of source files.
///
/// SHA-256 over the sorted `path \0 sha256(content)` lines, so reordering
/// files never changes it but renaming or editing one does.
pub fn fingerprint(files: &[SourceFile]) -> String {
    let mut lines: Vec<String> = files
        .iter()
        .map(|f| format!("{}\0{}", f.path, sha256_hex(f.content.as_bytes())))
        .collect();
    lines.sort();
    sha256_hex(lines.join("\n").as_bytes())
}

/// Fingerprint of a whole batch from its project fingerprints.
pub fn batch_fingerprint<'a>(project_fingerprints: impl IntoIterator<Item = &'a str>) -> String {
    let mut all: Vec<&str> = project_fingerprints.into_iter().collect();
    all.sort_unstable();
    sha256_hex(all.join("\n").as_bytes())
}

/// Classifies projects against the previous run's state.
///
/// Owns the previous [`ProcessingState`] for the duration of a batch.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<ProcessingState>,
}

impl ChangeDetector {
    pub fn new(previous: Option<ProcessingState>) -> Self {
        Self { previous }
    }

    pub fn previous(&self) -> Option<&ProcessingState> {
        self.previous.as_ref()
    }

    pub fn previous_record(&self, project_id: &str) -> Option<&ProjectRecord> {
        self.previous.as_ref().and_then(|s| s.project(project_id))
    }

    /// Last successfully persisted fingerprint of a project.
    pub fn previous_fingerprint(&self, project_id: &str) -> Option<&str> {
        self.previous_record(project_id)
            .and_then(|r| r.fingerprint.as_deref())
    }

    pub fn classify(&self, project_id: &str, fingerprint: &str) -> ChangeKind {
        match self.previous_fingerprint(project_id) {
            None => ChangeKind::New,
            Some(previous) if previous == fingerprint => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Updated,
        }
    }

    /// Ids of previously recorded projects missing from `current`.
    pub fn removed<'a>(&'a self, current: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        self.previous
            .iter()
            .flat_map(|s| s.projects.keys())
            .filter(move |id| !current.contains(*id))
            .map(String::as_str)
    }

    /// Record of a project whose graph was persisted.
    pub fn persisted(&self, change: ChangeKind, graph: &ProjectGraph, diagnostics: usize) -> ProjectRecord {
        let status = if graph.is_fragmented {
            ProjectStatus::Fragmented
        } else if change == ChangeKind::Updated {
            ProjectStatus::Updated
        } else {
            ProjectStatus::New
        };
        ProjectRecord {
            project_id: graph.project_id.clone(),
            project_name: graph.project_name.clone(),
            change,
            status,
            fingerprint: Some(graph.fingerprint.clone()),
            node_count: graph.node_count,
            edge_count: graph.edge_count,
            fragment_count: graph.fragment_count,
            diagnostics,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Record of an unchanged project; counts come from its previous record.
    pub fn skipped(&self, project_id: &str, project_name: &str, fingerprint: &str) -> ProjectRecord {
        let previous = self.previous_record(project_id);
        ProjectRecord {
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            change: ChangeKind::Unchanged,
            status: ProjectStatus::Skipped,
            fingerprint: Some(fingerprint.to_string()),
            node_count: previous.map(|r| r.node_count).unwrap_or_default(),
            edge_count: previous.map(|r| r.edge_count).unwrap_or_default(),
            fragment_count: previous.map(|r| r.fragment_count).unwrap_or_default(),
            diagnostics: previous.map(|r| r.diagnostics).unwrap_or_default(),
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Record of a failed project. The prior fingerprint and counts are kept
    /// because the prior graph stays in storage.
    pub fn failed(
        &self,
        project_id: &str,
        project_name: &str,
        change: ChangeKind,
        diagnostics: usize,
        error: impl Into<String>,
    ) -> ProjectRecord {
        let previous = self.previous_record(project_id);
        ProjectRecord {
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            change,
            status: ProjectStatus::Failed,
            fingerprint: previous.and_then(|r| r.fingerprint.clone()),
            node_count: previous.map(|r| r.node_count).unwrap_or_default(),
            edge_count: previous.map(|r| r.edge_count).unwrap_or_default(),
            fragment_count: previous.map(|r| r.fragment_count).unwrap_or_default(),
            diagnostics,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("a/One.cs", "class One { }"),
            SourceFile::new("a/Two.cs", "class Two { }"),
        ]
    }

    #[test]
    fn test_fingerprint_ignores_file_order() {
        let mut reversed = files();
        reversed.reverse();
        assert_eq!(fingerprint(&files()), fingerprint(&reversed));
        assert_eq!(fingerprint(&files()).len(), 64);
    }

    #[test]
    fn test_fingerprint_sees_paths_and_content() {
        let base = fingerprint(&files());

        let mut renamed = files();
        renamed[0].path = "b/One.cs".into();
        assert_ne!(base, fingerprint(&renamed));

        let mut edited = files();
        edited[1].content.push(' ');
        assert_ne!(base, fingerprint(&edited));
    }

    #[test]
    fn test_classification() {
        let graph = ProjectGraph::new("project/1", "P", Vec::new(), Vec::new(), "fp1");
        let mut state = ProcessingState::begin("batch");
        let detector = ChangeDetector::new(None);
        state.record(detector.persisted(ChangeKind::New, &graph, 0));

        let detector = ChangeDetector::new(Some(state));
        assert_eq!(detector.classify("project/1", "fp1"), ChangeKind::Unchanged);
        assert_eq!(detector.classify("project/1", "fp2"), ChangeKind::Updated);
        assert_eq!(detector.classify("project/2", "fp1"), ChangeKind::New);

        let current = vec!["project/2".to_string()];
        assert_eq!(detector.removed(&current).collect::<Vec<_>>(), vec!["project/1"]);
    }

    #[test]
    fn test_failed_keeps_prior_fingerprint() {
        let graph = ProjectGraph::new("project/1", "P", Vec::new(), Vec::new(), "fp1");
        let mut state = ProcessingState::begin("batch");
        state.record(ChangeDetector::default().persisted(ChangeKind::New, &graph, 0));
        let detector = ChangeDetector::new(Some(state));

        let record = detector.failed("project/1", "P", ChangeKind::Updated, 2, "boom");
        assert_eq!(record.status, ProjectStatus::Failed);
        assert_eq!(record.fingerprint.as_deref(), Some("fp1"));
        assert_eq!(record.error.as_deref(), Some("boom"));

        // A failure with no prior success still counts as new next time.
        let first = ChangeDetector::default().failed("project/9", "Q", ChangeKind::New, 0, "x");
        let mut state = ProcessingState::begin("batch");
        state.record(first);
        let detector = ChangeDetector::new(Some(state));
        assert_eq!(detector.classify("project/9", "any"), ChangeKind::New);
    }
}
