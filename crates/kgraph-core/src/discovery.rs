//! Discovery: finding solutions, projects and their source files.
//!
//! Discovery is split into a pure listing step ([`discover_candidates`]) and
//! an injected [`SelectionStrategy`], so callers choose what to analyze
//! without any interactive prompt.

use ignore::WalkBuilder;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{Diagnostic, DiagnosticKind, GraphError};
use crate::model::{ProjectSource, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateKind {
    Solution,
    Project,
}

/// A solution or project file found under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    /// File stem, e.g. `Shop` for `src/Shop.sln`.
    pub name: String,
    /// Path relative to the root, `/`-separated.
    pub path: String,
}

/// List every `.sln` and `.csproj` under `root`, solutions first, each group
/// sorted by path.
pub fn discover_candidates(root: &Path, config: &AnalysisConfig) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = walk(root, config)
        .filter_map(|entry| {
            let path = entry
                .map_err(|e| debug!(error = %e, "Unreadable entry skipped"))
                .ok()?;
            let kind = match extension(&path).as_deref() {
                Some("sln") => CandidateKind::Solution,
                Some("csproj") => CandidateKind::Project,
                _ => return None,
            };
            Some(Candidate {
                kind,
                name: stem(&path),
                path: relative(root, &path),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        (a.kind != CandidateKind::Solution, &a.path).cmp(&(b.kind != CandidateKind::Solution, &b.path))
    });
    candidates
}

/// Picks the candidate to analyze.
pub trait SelectionStrategy {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// The first candidate in discovery order (a solution when there is one).
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl SelectionStrategy for FirstMatch {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.first()
    }
}

/// The candidate whose name or path matches, case-insensitively.
#[derive(Debug, Clone)]
pub struct ByName(pub String);

impl SelectionStrategy for ByName {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.iter().find(|c| {
            c.name.eq_ignore_ascii_case(&self.0) || c.path.eq_ignore_ascii_case(&self.0)
        })
    }
}

/// Projects loaded from disk. Files a project could not use are diagnosed on
/// that project; `diagnostics` holds the problems that belong to no project.
#[derive(Debug, Default)]
pub struct LoadedProjects {
    pub projects: Vec<ProjectSource>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Load the projects of `selected`, or of every project under `root` when
/// nothing is selected.
///
/// A root without any project file becomes a single project named after the
/// directory.
pub fn load_projects(
    root: &Path,
    selected: Option<&Candidate>,
    config: &AnalysisConfig,
) -> Result<LoadedProjects, GraphError> {
    if !root.is_dir() {
        return Err(GraphError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let manifests: Vec<String> = match selected {
        Some(candidate) if candidate.kind == CandidateKind::Solution => {
            solution_projects(root, &candidate.path)?
        }
        Some(candidate) => vec![candidate.path.clone()],
        None => discover_candidates(root, config)
            .into_iter()
            .filter(|c| c.kind == CandidateKind::Project)
            .map(|c| c.path)
            .collect(),
    };

    let mut loaded = LoadedProjects::default();
    if manifests.is_empty() {
        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "root".to_string());
        let mut project = ProjectSource::new(name, ".");
        collect_files(root, Path::new(""), &[], config, &mut project);
        loaded.projects.push(project);
        return Ok(loaded);
    }

    let project_dirs: Vec<PathBuf> = manifests.iter().map(|m| manifest_dir(m)).collect();
    for (manifest, dir) in manifests.iter().zip(&project_dirs) {
        if !root.join(manifest).is_file() {
            warn!(manifest = %manifest, "Project file listed but missing");
            loaded.diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnreadableFile,
                manifest,
                "project file not found",
            ));
            continue;
        }
        let nested: Vec<PathBuf> = project_dirs
            .iter()
            .filter(|other| *other != dir && other.starts_with(dir))
            .cloned()
            .collect();

        let mut project = ProjectSource::new(stem(Path::new(manifest)), manifest.as_str());
        collect_files(root, dir, &nested, config, &mut project);
        debug!(
            project = %project.name,
            files = project.files.len(),
            diagnostics = project.diagnostics.len(),
            "Project loaded"
        );
        loaded.projects.push(project);
    }
    Ok(loaded)
}

/// Project paths listed in a solution file, relative to the root.
fn solution_projects(root: &Path, solution: &str) -> Result<Vec<String>, GraphError> {
    static PROJECT_LINE: OnceLock<Option<Regex>> = OnceLock::new();

    let path = root.join(solution);
    let content = fs::read_to_string(&path).map_err(|e| GraphError::io(&path, e))?;
    let Some(pattern) = PROJECT_LINE.get_or_init(|| {
        Regex::new(r#"Project\("\{[^}]*\}"\)\s*=\s*"[^"]*"\s*,\s*"([^"]+)""#).ok()
    }) else {
        return Ok(Vec::new());
    };

    let base = manifest_dir(solution);
    let mut projects: Vec<String> = pattern
        .captures_iter(&content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace('\\', "/"))
        .filter(|p| p.ends_with(".csproj"))
        .map(|p| normalize(&base.join(p)))
        .collect();
    projects.sort();
    projects.dedup();
    Ok(projects)
}

/// Read every source file under `dir` into `project`, skipping nested
/// projects. Files that cannot be used are diagnosed on the project.
fn collect_files(
    root: &Path,
    dir: &Path,
    nested: &[PathBuf],
    config: &AnalysisConfig,
    project: &mut ProjectSource,
) {
    let diagnostics = &mut project.diagnostics;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in walk(&root.join(dir), config) {
        match entry {
            Ok(path) => {
                let included = extension(&path).is_some_and(|ext| {
                    config
                        .include_extensions
                        .iter()
                        .any(|e| e.eq_ignore_ascii_case(&ext))
                });
                if included {
                    paths.push(path);
                }
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Directory entry unreadable");
                let location = match normalize(dir) {
                    rel if rel.is_empty() => ".".to_string(),
                    rel => rel,
                };
                diagnostics.push(Diagnostic::new(DiagnosticKind::UnreadableFile, location, e.to_string()));
            }
        }
    }
    paths.sort();

    for path in paths {
        let rel = relative(root, &path);
        if nested.iter().any(|n| Path::new(&rel).starts_with(n)) {
            continue;
        }

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                diagnostics.push(Diagnostic::new(DiagnosticKind::UnreadableFile, &rel, e.to_string()));
                continue;
            }
        };
        if size > config.max_file_size {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::SkippedFile,
                &rel,
                format!("{} bytes exceeds limit of {}", size, config.max_file_size),
            ));
            continue;
        }

        match fs::read_to_string(&path) {
            Ok(content) => project.files.push(SourceFile::new(rel, content)),
            Err(e) => {
                warn!(path = %rel, error = %e, "Unreadable source file");
                diagnostics.push(Diagnostic::new(DiagnosticKind::UnreadableFile, &rel, e.to_string()));
            }
        }
    }
}

/// Files under `dir`, honoring ignore files and excluded directory names.
/// Entries the walker cannot read come back as errors.
fn walk(dir: &Path, config: &AnalysisConfig) -> impl Iterator<Item = Result<PathBuf, ignore::Error>> {
    let excluded = config.exclude_dirs.clone();
    WalkBuilder::new(dir)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && excluded
                    .iter()
                    .any(|name| entry.file_name().to_str() == Some(name.as_str())))
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => entry
                .file_type()
                .is_some_and(|t| t.is_file())
                .then(|| Ok(entry.into_path())),
            Err(e) => Some(Err(e)),
        })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn manifest_dir(manifest: &str) -> PathBuf {
    Path::new(manifest)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn relative(root: &Path, path: &Path) -> String {
    normalize(path.strip_prefix(root).unwrap_or(path))
}

/// `/`-separated path with `.` and `..` components folded.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                parts.pop();
            }
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}
