use std::sync::Arc;

use kgraph_core::discovery::load_projects;
use kgraph_core::extract::ExtractionRules;
use kgraph_core::gateway::{load_project, FileGateway, MemoryGateway};
use kgraph_core::ids::node_id;
use kgraph_core::model::ProjectStatus;
use kgraph_core::oracle::{OracleError, OracleProvider, SemanticOracle, Workspace};
use kgraph_core::syntax::{CompilationUnit, ParseError, ParserRegistry, SourceParser};
use kgraph_core::{
    BatchRunner, CancellationFlag, Config, DiagnosticKind, EdgeKind, GraphError, NodeKind,
    PersistenceGateway, ProjectAnalyzer, ProjectSource,
};

fn shop() -> ProjectSource {
    ProjectSource::new("Shop", "src/Shop/Shop.csproj")
        .with_file(
            "src/Shop/Cart.cs",
            r#"
namespace Shop
{
    public class Cart
    {
        private readonly Pricing _pricing = new Pricing();
        public decimal Total() { return _pricing.Price(); }
    }
}
"#,
        )
        .with_file(
            "src/Shop/Pricing.cs",
            "namespace Shop { public class Pricing { public decimal Price() { return 1; } } }",
        )
}

fn billing() -> ProjectSource {
    ProjectSource::new("Billing", "src/Billing/Billing.csproj").with_file(
        "src/Billing/Invoice.cs",
        "namespace Billing { public class Invoice { public void Send() { } } }",
    )
}

fn runner_with(gateway: Arc<dyn PersistenceGateway>, config: &Config) -> BatchRunner {
    let analyzer = Arc::new(ProjectAnalyzer::from_config(&config.analysis).unwrap());
    BatchRunner::new(analyzer, gateway, config)
}

fn runner(gateway: Arc<MemoryGateway>) -> BatchRunner {
    runner_with(gateway, &Config::default())
}

#[tokio::test]
async fn test_first_run_persists_every_project() {
    let gateway = Arc::new(MemoryGateway::default());
    let report = runner(gateway.clone())
        .run("repo", vec![shop(), billing()], &CancellationFlag::new())
        .await
        .unwrap();

    let state = &report.state;
    assert!(state.is_complete());
    assert!(!state.cancelled);
    assert_eq!(state.counters.new, 2);
    assert_eq!(state.counters.failed, 0);
    assert_eq!(state.projects.len(), 2);

    let record = state.project(&shop().id()).unwrap();
    assert_eq!(record.status, ProjectStatus::New);
    assert!(record.fingerprint.is_some());

    let graph = load_project(gateway.as_ref(), &shop().id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(graph.node_count, record.node_count);
    assert!(graph.node_by_name("Shop.Cart").is_some());
    assert_eq!(gateway.writes().projects, 2);
    assert_eq!(gateway.writes().states, 1);
}

#[tokio::test]
async fn test_unchanged_rerun_skips_without_project_writes() {
    let gateway = Arc::new(MemoryGateway::default());
    let runner = runner(gateway.clone());
    let first = runner
        .run("repo", vec![shop(), billing()], &CancellationFlag::new())
        .await
        .unwrap();
    gateway.reset_writes();

    let second = runner
        .run("repo", vec![billing(), shop()], &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(second.state.counters.skipped, 2);
    assert_eq!(second.state.counters.processed(), 2);
    assert!(second
        .state
        .projects
        .values()
        .all(|r| r.status == ProjectStatus::Skipped));
    assert_eq!(gateway.writes().projects, 0);
    assert_eq!(gateway.writes().fragments, 0);
    assert_eq!(gateway.writes().states, 1);
    assert_eq!(first.state.source_fingerprint, second.state.source_fingerprint);
    assert_ne!(first.state.run_id, second.state.run_id);

    let skipped = second.state.project(&shop().id()).unwrap();
    let original = first.state.project(&shop().id()).unwrap();
    assert_eq!(skipped.node_count, original.node_count);
    assert_eq!(skipped.fingerprint, original.fingerprint);
}

#[tokio::test]
async fn test_edited_project_is_updated_alone() {
    let gateway = Arc::new(MemoryGateway::default());
    let runner = runner(gateway.clone());
    runner
        .run("repo", vec![shop(), billing()], &CancellationFlag::new())
        .await
        .unwrap();
    gateway.reset_writes();

    let edited = billing().with_file(
        "src/Billing/Ledger.cs",
        "namespace Billing { public class Ledger { } }",
    );
    let report = runner
        .run("repo", vec![shop(), edited.clone()], &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.state.counters.updated, 1);
    assert_eq!(report.state.counters.skipped, 1);
    assert_eq!(
        report.state.project(&edited.id()).unwrap().status,
        ProjectStatus::Updated
    );
    assert_eq!(gateway.writes().projects, 1);
    let graph = gateway.get_project(&edited.id()).await.unwrap().unwrap();
    assert!(graph.node_by_name("Billing.Ledger").is_some());
}

#[tokio::test]
async fn test_failed_project_keeps_prior_graph() {
    let gateway = Arc::new(MemoryGateway::default());
    let runner = runner(gateway.clone());
    let first = runner
        .run("repo", vec![shop(), billing()], &CancellationFlag::new())
        .await
        .unwrap();
    let prior = gateway.get_project(&billing().id()).await.unwrap().unwrap();

    let broken = ProjectSource::new("Billing", "src/Billing/Billing.csproj")
        .with_file("src/Billing/Invoice.cs", "// everything was deleted");
    let report = runner
        .run("repo", vec![shop(), broken.clone()], &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.state.counters.failed, 1);
    assert_eq!(report.state.counters.skipped, 1);
    let record = report.state.project(&broken.id()).unwrap();
    assert_eq!(record.status, ProjectStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("no symbols"));
    assert_eq!(
        record.fingerprint,
        first.state.project(&billing().id()).unwrap().fingerprint
    );

    let stored = gateway.get_project(&broken.id()).await.unwrap().unwrap();
    assert_eq!(stored, prior);
}

/// A project with one file declaring `services` classes.
fn big(services: usize) -> ProjectSource {
    let mut source = String::from("namespace Big {\n");
    for i in 0..services {
        source.push_str(&format!(
            "public class Service{i} {{ public void Run{i}() {{ }} public int Count{i}; }}\n"
        ));
    }
    source.push('}');
    ProjectSource::new("Big", "Big/Big.csproj").with_file("Big/Services.cs", source)
}

fn small_documents() -> Config {
    let mut config = Config::default();
    config.storage.max_document_bytes = 64 * 1024;
    config
}

#[tokio::test]
async fn test_oversized_project_is_fragmented() {
    let big = big(300);
    let config = small_documents();
    let gateway = Arc::new(MemoryGateway::new(config.storage.max_document_bytes));
    let report = runner_with(gateway.clone(), &config)
        .run("big", vec![big.clone()], &CancellationFlag::new())
        .await
        .unwrap();

    let record = report.state.project(&big.id()).unwrap();
    assert_eq!(record.status, ProjectStatus::Fragmented);
    assert_eq!(report.state.counters.fragmented, 1);
    assert_eq!(report.state.counters.new, 1);
    assert!(record.fragment_count > 1);
    assert_eq!(gateway.fragment_count().await, record.fragment_count);

    let graph = load_project(gateway.as_ref(), &big.id())
        .await
        .unwrap()
        .unwrap();
    assert!(!graph.is_fragmented);
    assert_eq!(graph.nodes.len(), record.node_count);
    assert_eq!(graph.edges.len(), record.edge_count);
    assert!(graph.node_by_name("Big.Service299").is_some());
}

#[tokio::test]
async fn test_failed_write_keeps_prior_fragments() {
    let config = small_documents();
    let gateway = Arc::new(MemoryGateway::new(config.storage.max_document_bytes));
    let runner = runner_with(gateway.clone(), &config);
    let first = runner
        .run("big", vec![big(300)], &CancellationFlag::new())
        .await
        .unwrap();
    let prior = first.state.project(&big(300).id()).unwrap().clone();
    assert!(prior.fragment_count > 1);

    gateway.inject_conflicts(100);
    let report = runner
        .run("big", vec![big(200)], &CancellationFlag::new())
        .await
        .unwrap();
    let record = report.state.project(&big(200).id()).unwrap();
    assert_eq!(record.status, ProjectStatus::Failed);
    assert_eq!(record.fingerprint, prior.fingerprint);

    let graph = load_project(gateway.as_ref(), &big(300).id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(graph.nodes.len(), prior.node_count);
    assert!(graph.node_by_name("Big.Service299").is_some());

    // The next successful write replaces the set and drops leftovers.
    gateway.inject_conflicts(0);
    let report = runner
        .run("big", vec![big(200)], &CancellationFlag::new())
        .await
        .unwrap();
    let record = report.state.project(&big(200).id()).unwrap();
    assert_eq!(record.status, ProjectStatus::Fragmented);
    assert_eq!(gateway.fragment_count().await, record.fragment_count);
    let graph = load_project(gateway.as_ref(), &big(200).id())
        .await
        .unwrap()
        .unwrap();
    assert!(graph.node_by_name("Big.Service299").is_none());
    assert!(graph.node_by_name("Big.Service199").is_some());
}

#[tokio::test]
async fn test_file_backend_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let gateway = Arc::new(FileGateway::new(
        dir.path(),
        config.storage.max_document_bytes,
    ));
    let runner = runner_with(gateway.clone(), &config);

    runner
        .run("repo", vec![shop()], &CancellationFlag::new())
        .await
        .unwrap();
    assert!(dir.path().join("projects").is_dir());
    assert!(dir.path().join("state").join("repo.json").is_file());

    let second = runner
        .run("repo", vec![shop()], &CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(second.state.counters.skipped, 1);
    let stored = gateway.get_processing_state("repo").await.unwrap().unwrap();
    assert_eq!(stored, second.state);
}

fn library() -> ProjectSource {
    ProjectSource::new("Lib", "src/Lib/Lib.csproj").with_file(
        "src/Lib/Order.cs",
        "namespace Lib.Models { public class Order { public void Ship() { } } }",
    )
}

fn application() -> ProjectSource {
    ProjectSource::new("App", "src/App/App.csproj").with_file(
        "src/App/Service.cs",
        r#"
using Lib.Models;
namespace App
{
    public class Service : Order
    {
        public void Place(Order o) { o.Ship(); }
    }
}
"#,
    )
}

#[tokio::test]
async fn test_sibling_project_types_link_across_graphs() {
    let gateway = Arc::new(MemoryGateway::default());
    let report = runner(gateway.clone())
        .run("repo", vec![application(), library()], &CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(report.state.counters.new, 2);

    let app = load_project(gateway.as_ref(), &application().id())
        .await
        .unwrap()
        .unwrap();
    let lib = load_project(gateway.as_ref(), &library().id())
        .await
        .unwrap()
        .unwrap();

    let order = node_id(NodeKind::Class, "Lib.Models.Order");
    let ship = node_id(NodeKind::Method, "Lib.Models.Order.Ship()");
    assert_eq!(lib.node_by_name("Lib.Models.Order").unwrap().id, order);
    assert_eq!(lib.node_by_name("Lib.Models.Order.Ship()").unwrap().id, ship);

    let service = app.node_by_name("App.Service").unwrap();
    let place = app
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Method && n.fully_qualified_name.starts_with("App.Service.Place("))
        .unwrap();
    let has_edge = |source: &str, target: &str, kind: EdgeKind| {
        app.edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind)
    };
    assert!(has_edge(&service.id, &order, EdgeKind::Inherits));
    assert!(has_edge(&place.id, &order, EdgeKind::Uses));
    assert!(has_edge(&place.id, &ship, EdgeKind::Calls));
    assert!(app.node_by_name("Lib.Models.Order").is_none());

    let unresolved = report
        .diagnostics
        .get(&application().id())
        .into_iter()
        .flatten()
        .filter(|d| d.kind == DiagnosticKind::UnresolvedSymbol)
        .count();
    assert_eq!(unresolved, 0);
}

#[tokio::test]
async fn test_skipped_files_reach_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("Shop")).unwrap();
    std::fs::write(root.join("Shop/Shop.csproj"), "<Project />").unwrap();
    std::fs::write(root.join("Shop/Cart.cs"), "namespace Shop { class Cart { } }").unwrap();
    std::fs::write(
        root.join("Shop/Generated.cs"),
        format!("namespace Shop {{ class Generated {{ }} }} // {}", "x".repeat(256)),
    )
    .unwrap();

    let mut config = Config::default();
    config.analysis.max_file_size = 128;
    let loaded = load_projects(root, None, &config.analysis).unwrap();
    assert_eq!(loaded.projects.len(), 1);
    let project_id = loaded.projects[0].id();

    let gateway = Arc::new(MemoryGateway::default());
    let report = runner_with(gateway.clone(), &config)
        .run("shop", loaded.projects, &CancellationFlag::new())
        .await
        .unwrap();

    let diagnostics = &report.diagnostics[&project_id];
    assert!(diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::SkippedFile && d.path == "Shop/Generated.cs"));
    let record = report.state.project(&project_id).unwrap();
    assert_eq!(record.status, ProjectStatus::New);
    assert_eq!(record.diagnostics, diagnostics.len());

    let graph = gateway.get_project(&project_id).await.unwrap().unwrap();
    assert!(graph.node_by_name("Shop.Cart").is_some());
    assert!(graph.node_by_name("Shop.Generated").is_none());
}

struct Unavailable;

impl OracleProvider for Unavailable {
    fn open(
        &self,
        _project: &ProjectSource,
        _units: &[CompilationUnit],
        _workspace: &Workspace,
    ) -> Result<Arc<dyn SemanticOracle>, OracleError> {
        Err(OracleError::Unavailable("compiler service down".into()))
    }
}

#[tokio::test]
async fn test_unavailable_oracle_aborts_batch() {
    let gateway = Arc::new(MemoryGateway::default());
    let mut config = Config::default();
    config.batch.batch_attempts = 1;
    let analyzer = Arc::new(
        ProjectAnalyzer::new(Arc::new(Unavailable), ExtractionRules::default()).unwrap(),
    );
    let runner = BatchRunner::new(analyzer, gateway.clone(), &config);

    let err = runner
        .run("repo", vec![shop()], &CancellationFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Oracle(_)));
    assert_eq!(gateway.writes().states, 0);
    assert!(gateway.get_processing_state("repo").await.unwrap().is_none());
}

struct IncompatibleGrammar;

impl SourceParser for IncompatibleGrammar {
    fn parse_unit(&self, _path: &str, _content: &str) -> Result<CompilationUnit, ParseError> {
        Err(ParseError::Grammar {
            language: "C#".into(),
            message: "Incompatible language version 15. Expected minimum 13, maximum 14".into(),
        })
    }

    fn language_name(&self) -> &'static str {
        "C#"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["cs"]
    }
}

#[tokio::test]
async fn test_unloadable_grammar_aborts_batch() {
    let gateway = Arc::new(MemoryGateway::default());
    let mut config = Config::default();
    config.batch.batch_attempts = 2;
    let analyzer = ProjectAnalyzer::from_config(&config.analysis)
        .unwrap()
        .with_registry(|_| ParserRegistry::from_parsers(vec![Arc::new(IncompatibleGrammar)]));
    let runner = BatchRunner::new(Arc::new(analyzer), gateway.clone(), &config);

    let err = runner
        .run("repo", vec![shop(), billing()], &CancellationFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Grammar(_)));
    assert_eq!(gateway.writes().projects, 0);
    assert!(gateway.get_processing_state("repo").await.unwrap().is_none());
}
