//! Batch orchestration: analyze many projects, persist their graphs and
//! record one processing state per batch.

mod analyze;
mod runner;

pub use analyze::{ParsedProject, ProjectAnalysis, ProjectAnalyzer};
pub use runner::{BatchReport, BatchRunner};

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::change::fingerprint;
use crate::error::GraphError;
use crate::model::ProjectSource;
use crate::oracle::Workspace;

/// Cooperative cancellation shared between the caller and a running batch.
///
/// Projects already in flight finish; projects not yet started are carried
/// forward from the previous processing state.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-project parse outcomes, in input order, and the workspace built from
/// the projects that parsed.
pub(crate) type ParsedBatch = (Vec<Result<ParsedProject, GraphError>>, Arc<Workspace>);

/// Parse every project on blocking threads so each project's oracle can see
/// the declarations of its siblings. Fatal errors abort the whole batch.
pub(crate) async fn parse_batch(
    analyzer: &Arc<ProjectAnalyzer>,
    projects: &[ProjectSource],
    concurrency: usize,
) -> Result<ParsedBatch, GraphError> {
    let outcomes: Vec<Result<ParsedProject, GraphError>> =
        stream::iter(projects.iter().cloned().map(|project| {
            let analyzer = Arc::clone(analyzer);
            async move {
                let name = project.name.clone();
                tokio::task::spawn_blocking(move || analyzer.parse(&project))
                    .await
                    .unwrap_or_else(|e| {
                        Err(GraphError::CompilationFailure {
                            project: name,
                            message: format!("parse task failed: {}", e),
                        })
                    })
            }
        }))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut workspace = Workspace::new();
    let mut parsed = Vec::with_capacity(outcomes.len());
    for (project, outcome) in projects.iter().zip(outcomes) {
        let outcome = match outcome {
            Err(e) if e.is_fatal() => return Err(e),
            other => other,
        };
        if let Ok(found) = &outcome {
            workspace.add(project.id(), &project.name, Arc::clone(&found.units));
        }
        parsed.push(outcome);
    }
    debug!(projects = workspace.len(), "Workspace parsed");
    Ok((parsed, Arc::new(workspace)))
}

/// Analyze projects without persisting them, preserving input order.
///
/// Used by exports and dry runs. Each entry carries the project name and its
/// analysis outcome. Types declared in one project resolve from the others.
pub async fn analyze_projects(
    analyzer: Arc<ProjectAnalyzer>,
    projects: Vec<ProjectSource>,
    concurrency: usize,
) -> Result<Vec<(String, Result<ProjectAnalysis, GraphError>)>, GraphError> {
    let (parsed, workspace) = parse_batch(&analyzer, &projects, concurrency).await?;

    let results = stream::iter(projects.into_iter().zip(parsed).map(|(project, parsed)| {
        let analyzer = Arc::clone(&analyzer);
        let workspace = Arc::clone(&workspace);
        async move {
            let name = project.name.clone();
            let fp = fingerprint(&project.files);
            let outcome = match parsed {
                Ok(parsed) => tokio::task::spawn_blocking(move || {
                    analyzer.analyze_parsed(&project, parsed, &workspace, &fp)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(GraphError::CompilationFailure {
                        project: name.clone(),
                        message: format!("analysis task failed: {}", e),
                    })
                }),
                Err(e) => Err(e),
            };
            (name, outcome)
        }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await;
    Ok(results)
}
