use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::change::{batch_fingerprint, fingerprint, ChangeDetector};
use crate::config::Config;
use crate::error::{Diagnostic, GraphError};
use crate::fragmentation::{FragmentationEngine, Persistable};
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::model::{ChangeKind, ProcessingState, ProjectRecord, ProjectSource};
use crate::oracle::Workspace;

use super::{parse_batch, CancellationFlag, ParsedProject, ProjectAnalysis, ProjectAnalyzer};

/// Outcome of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub state: ProcessingState,
    /// Recovered problems per project id. Projects without any are absent.
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
    /// Projects of the previous run that are gone from this one.
    pub removed: Vec<String>,
}

enum Outcome {
    Recorded {
        record: ProjectRecord,
        diagnostics: Vec<Diagnostic>,
    },
    Cancelled {
        project_id: String,
    },
}

impl Outcome {
    fn recorded(record: ProjectRecord) -> Self {
        Outcome::Recorded {
            record,
            diagnostics: Vec::new(),
        }
    }
}

/// Runs analysis batches against one persistence gateway.
pub struct BatchRunner {
    analyzer: Arc<ProjectAnalyzer>,
    gateway: Arc<dyn PersistenceGateway>,
    fragmentation: FragmentationEngine,
    max_concurrent_projects: usize,
    persist_retries: u32,
    batch_attempts: u32,
}

impl BatchRunner {
    pub fn new(
        analyzer: Arc<ProjectAnalyzer>,
        gateway: Arc<dyn PersistenceGateway>,
        config: &Config,
    ) -> Self {
        let limit = config
            .storage
            .max_document_bytes
            .min(gateway.max_document_bytes());
        Self {
            analyzer,
            gateway,
            fragmentation: FragmentationEngine::new(limit, config.storage.fragment_fill_ratio),
            max_concurrent_projects: config.batch.max_concurrent_projects.max(1),
            persist_retries: config.batch.persist_retries.max(1),
            batch_attempts: config.batch.batch_attempts.max(1),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_projects: usize) -> Self {
        self.max_concurrent_projects = max_concurrent_projects.max(1);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    /// Analyze and persist every project, then write the processing state.
    ///
    /// Per-project failures are recorded in the state. Infrastructure
    /// failures abort the attempt; the batch is retried up to
    /// `batch.batch_attempts` times before the error is returned.
    #[instrument(skip(self, projects, cancel), fields(projects = projects.len()))]
    pub async fn run(
        &self,
        batch_key: &str,
        projects: Vec<ProjectSource>,
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, GraphError> {
        let mut attempt = 1;
        loop {
            match self.run_once(batch_key, projects.clone(), cancel).await {
                Err(e) if e.is_fatal() && attempt < self.batch_attempts => {
                    warn!(attempt, error = %e, "Batch failed, retrying");
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run_once(
        &self,
        batch_key: &str,
        projects: Vec<ProjectSource>,
        cancel: &CancellationFlag,
    ) -> Result<BatchReport, GraphError> {
        let previous = self.gateway.get_processing_state(batch_key).await?;
        let detector = ChangeDetector::new(previous);
        let mut state = ProcessingState::begin(batch_key);
        info!(run_id = %state.run_id, "Batch started");

        let plan: Vec<(String, ChangeKind)> = projects
            .iter()
            .map(|project| {
                let fp = fingerprint(&project.files);
                let change = detector.classify(&project.id(), &fp);
                (fp, change)
            })
            .collect();
        let current_ids: Vec<String> = projects.iter().map(ProjectSource::id).collect();
        let source_fingerprint = batch_fingerprint(plan.iter().map(|(fp, _)| fp.as_str()));

        // Unchanged projects are parsed too when anything changed, so their
        // declarations stay visible to the projects that reference them.
        let needs_analysis = !cancel.is_cancelled()
            && plan.iter().any(|(_, change)| *change != ChangeKind::Unchanged);
        let (parsed, workspace): (Vec<Option<Result<ParsedProject, GraphError>>>, Arc<Workspace>) =
            if needs_analysis {
                let (parsed, workspace) =
                    parse_batch(&self.analyzer, &projects, self.max_concurrent_projects).await?;
                (parsed.into_iter().map(Some).collect(), workspace)
            } else {
                (projects.iter().map(|_| None).collect(), Arc::new(Workspace::new()))
            };

        let outcomes: Vec<Outcome> = stream::iter(projects.into_iter().zip(plan).zip(parsed).map(
            |((project, (fp, change)), parsed)| {
                self.process(&detector, project, fp, change, parsed, &workspace, cancel)
            },
        ))
        .buffer_unordered(self.max_concurrent_projects)
        .try_collect()
        .await?;

        let mut diagnostics = BTreeMap::new();
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                Outcome::Recorded {
                    record,
                    diagnostics: found,
                } => {
                    if !found.is_empty() {
                        diagnostics.insert(record.project_id.clone(), found);
                    }
                    state.record(record);
                }
                Outcome::Cancelled { project_id } => {
                    cancelled = true;
                    state.carry_forward(&project_id, detector.previous_record(&project_id).cloned());
                }
            }
        }

        let removed: Vec<String> = detector.removed(&current_ids).map(String::from).collect();
        for project_id in &removed {
            self.gateway.delete_project(project_id).await?;
            info!(project_id = %project_id, "Removed project deleted");
        }

        let state = state.complete(source_fingerprint, cancelled);
        self.gateway.upsert_processing_state(&state).await?;

        let counters = state.counters;
        info!(
            new = counters.new,
            updated = counters.updated,
            skipped = counters.skipped,
            failed = counters.failed,
            fragmented = counters.fragmented,
            cancelled = counters.cancelled,
            "Batch complete"
        );
        Ok(BatchReport {
            state,
            diagnostics,
            removed,
        })
    }

    /// Analyze and persist one project. Only fatal errors are returned.
    #[allow(clippy::too_many_arguments)]
    async fn process(
        &self,
        detector: &ChangeDetector,
        project: ProjectSource,
        fp: String,
        change: ChangeKind,
        parsed: Option<Result<ParsedProject, GraphError>>,
        workspace: &Arc<Workspace>,
        cancel: &CancellationFlag,
    ) -> Result<Outcome, GraphError> {
        let project_id = project.id();
        let name = project.name.clone();
        if cancel.is_cancelled() {
            debug!(project = %name, "Cancelled before start");
            return Ok(Outcome::Cancelled { project_id });
        }
        if change == ChangeKind::Unchanged {
            info!(project = %name, "Unchanged, skipped");
            return Ok(Outcome::recorded(detector.skipped(&project_id, &name, &fp)));
        }

        let analyzer = Arc::clone(&self.analyzer);
        let workspace = Arc::clone(workspace);
        let task_fp = fp.clone();
        let analysis = tokio::task::spawn_blocking(move || match parsed {
            Some(Ok(parsed)) => analyzer.analyze_parsed(&project, parsed, &workspace, &task_fp),
            Some(Err(e)) => Err(e),
            None => analyzer.analyze(&project, &task_fp),
        })
        .await
        .unwrap_or_else(|e| {
            Err(GraphError::CompilationFailure {
                project: name.clone(),
                message: format!("analysis task failed: {}", e),
            })
        });

        let ProjectAnalysis {
            graph, diagnostics, ..
        } = match analysis {
            Ok(analysis) => analysis,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(project = %name, error = %e, "Project failed");
                return Ok(Outcome::recorded(
                    detector.failed(&project_id, &name, change, 0, e.to_string()),
                ));
            }
        };

        let persisted = match self.fragmentation.prepare(graph) {
            Ok(persistable) => self.persist(&persistable).await.map(|()| persistable),
            Err(e) => Err(e),
        };
        match persisted {
            Ok(persistable) => {
                let record = detector.persisted(change, persistable.record(), diagnostics.len());
                info!(
                    project = %name,
                    status = %record.status,
                    nodes = record.node_count,
                    edges = record.edge_count,
                    fragments = record.fragment_count,
                    "Project persisted"
                );
                Ok(Outcome::Recorded {
                    record,
                    diagnostics,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(project = %name, error = %e, "Project failed");
                let record =
                    detector.failed(&project_id, &name, change, diagnostics.len(), e.to_string());
                Ok(Outcome::Recorded {
                    record,
                    diagnostics,
                })
            }
        }
    }

    /// Write fragments and then the parent record, retrying on conflicts.
    async fn persist(&self, persistable: &Persistable) -> Result<(), GraphError> {
        let mut attempt = 1;
        loop {
            match self.write(persistable).await.map_err(GraphError::from) {
                Err(GraphError::PersistenceConflict(project)) if attempt < self.persist_retries => {
                    warn!(project_id = %project, attempt, "Write conflict, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn write(&self, persistable: &Persistable) -> Result<(), GatewayError> {
        let fragments = persistable.fragments();
        if !fragments.is_empty() {
            self.gateway.upsert_fragments(fragments).await?;
        }
        self.gateway.upsert_project(persistable.record()).await
    }
}
