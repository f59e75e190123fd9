//! Single-project analysis: parse, resolve, walk, extract, assemble.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::assembler::GraphAssembler;
use crate::config::AnalysisConfig;
use crate::error::{Diagnostic, DiagnosticKind, GraphError};
use crate::extract::{ExtractionRules, RelationshipExtractor};
use crate::model::{Edge, EdgeKind, Location, Node, NodeKind, ProjectGraph, ProjectSource, StructuralView};
use crate::oracle::{OracleProvider, SourceIndexProvider, Workspace};
use crate::syntax::{CompilationUnit, ParseError, ParserRegistry};
use crate::walker::DeclarationWalker;

/// Result of analyzing one project.
#[derive(Debug, Clone)]
pub struct ProjectAnalysis {
    pub graph: ProjectGraph,
    pub structural: StructuralView,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compilation units of one project plus the problems found reading them.
#[derive(Debug, Clone, Default)]
pub struct ParsedProject {
    pub units: Arc<Vec<CompilationUnit>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds the graph of one project. Stateless between projects.
pub struct ProjectAnalyzer {
    registry: ParserRegistry,
    provider: Arc<dyn OracleProvider>,
    rules: ExtractionRules,
}

impl ProjectAnalyzer {
    /// Fails when a built-in grammar cannot be loaded.
    pub fn new(
        provider: Arc<dyn OracleProvider>,
        rules: ExtractionRules,
    ) -> Result<Self, GraphError> {
        Ok(Self {
            registry: ParserRegistry::new().map_err(grammar_error)?,
            provider,
            rules,
        })
    }

    /// Analyzer backed by the source-index oracle, parsing only the
    /// configured extensions.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, GraphError> {
        let analyzer = Self::new(
            Arc::new(SourceIndexProvider::from_config(config)),
            ExtractionRules::from_config(config),
        )?;
        Ok(analyzer.with_registry(|registry| registry.restricted_to(&config.include_extensions)))
    }

    /// Replace or adjust the parser registry.
    pub fn with_registry(mut self, adjust: impl FnOnce(ParserRegistry) -> ParserRegistry) -> Self {
        self.registry = adjust(self.registry);
        self
    }

    /// Analyze one project on its own, with no sibling projects visible.
    /// Runs synchronously; callers on an async runtime should move it to a
    /// blocking thread.
    pub fn analyze(
        &self,
        project: &ProjectSource,
        fingerprint: &str,
    ) -> Result<ProjectAnalysis, GraphError> {
        let parsed = self.parse(project)?;
        self.analyze_parsed(project, parsed, &Workspace::new(), fingerprint)
    }

    /// Parse every file of a project in path order.
    ///
    /// Unparseable files become diagnostics; only a grammar that cannot load
    /// is an error.
    #[instrument(skip_all, fields(project = %project.name))]
    pub fn parse(&self, project: &ProjectSource) -> Result<ParsedProject, GraphError> {
        let mut diagnostics = project.diagnostics.clone();

        let mut files: Vec<_> = project.files.iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut units: Vec<CompilationUnit> = Vec::with_capacity(files.len());
        for file in &files {
            let Some(parser) = self.registry.parser_for_path(&file.path) else {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::SkippedFile,
                    &file.path,
                    "no parser for extension",
                ));
                continue;
            };
            match parser.parse_unit(&file.path, &file.content) {
                Ok(unit) => {
                    if unit.has_errors {
                        warn!(path = %file.path, "Syntax errors, analyzing recovered tree");
                        diagnostics.push(Diagnostic::new(
                            DiagnosticKind::ParseFailure,
                            &file.path,
                            "syntax errors",
                        ));
                    }
                    debug!(path = %file.path, declarations = unit.declaration_count(), "Parsed");
                    units.push(unit);
                }
                Err(e) if e.is_grammar() => return Err(grammar_error(e)),
                Err(e) => {
                    warn!(path = %file.path, error = %e, "Parse failed");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ParseFailure,
                        &file.path,
                        e.to_string(),
                    ));
                }
            }
        }
        Ok(ParsedProject {
            units: Arc::new(units),
            diagnostics,
        })
    }

    /// Build the graph of a parsed project. Declarations of the other
    /// projects in `workspace` resolve as references.
    #[instrument(skip_all, fields(project = %project.name, workspace = workspace.len()))]
    pub fn analyze_parsed(
        &self,
        project: &ProjectSource,
        parsed: ParsedProject,
        workspace: &Workspace,
        fingerprint: &str,
    ) -> Result<ProjectAnalysis, GraphError> {
        let project_id = project.id();
        let ParsedProject {
            units,
            mut diagnostics,
        } = parsed;

        let oracle = self.provider.open(project, &units, workspace)?;
        let extractor = RelationshipExtractor::new(self.rules.clone(), &project_id);
        let mut assembler = GraphAssembler::new(&project_id, &project.name);
        assembler.add_node(Node::new(
            NodeKind::Project,
            &project.name,
            &project.path,
            &project_id,
        ))?;

        for unit in units.iter() {
            let file_node = Node::new(NodeKind::File, file_name(&unit.path), &unit.path, &project_id)
                .at(Location::new(&unit.path, 1, 1));
            let file_id = file_node.id.clone();
            assembler.add_node(file_node)?;
            assembler.add_edge(Edge::new(&project_id, &file_id, EdgeKind::Contains));

            let walk = DeclarationWalker::new(oracle.as_ref(), unit).walk()?;
            let extraction = extractor.extract(&walk, &file_id);
            diagnostics.extend(walk.diagnostics);
            diagnostics.extend(extraction.diagnostics.iter().cloned());
            assembler.add_extraction(extraction)?;
        }

        let (graph, structural) = assembler.finish(fingerprint);
        if !project.files.is_empty() && graph.symbol_count() == 0 {
            return Err(GraphError::CompilationFailure {
                project: project.name.clone(),
                message: format!("no symbols produced from {} files", project.files.len()),
            });
        }

        debug!(
            nodes = graph.node_count,
            edges = graph.edge_count,
            diagnostics = diagnostics.len(),
            "Project assembled"
        );
        Ok(ProjectAnalysis {
            graph,
            structural,
            diagnostics,
        })
    }
}

fn grammar_error(err: ParseError) -> GraphError {
    GraphError::Grammar(err.to_string())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
