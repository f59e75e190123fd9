use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kgraph_core::batch::analyze_projects;
use kgraph_core::config::LoggingConfig;
use kgraph_core::discovery::{
    discover_candidates, load_projects, ByName, CandidateKind, FirstMatch, LoadedProjects,
    SelectionStrategy,
};
use kgraph_core::export::write_stream;
use kgraph_core::model::{GraphMetadata, ProcessingState};
use kgraph_core::{open_gateway, BatchRunner, CancellationFlag, Config, ProjectAnalyzer};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "Build and persist a code knowledge graph of a C# codebase", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./kgraph.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a source tree and persist its graph
    Analyze {
        /// Root directory of the source tree
        root: PathBuf,
        /// Solution or project to analyze, by name or relative path
        #[arg(long)]
        solution: Option<String>,
        /// Storage backend: file, surreal or memory
        #[arg(long)]
        backend: Option<String>,
        /// Projects analyzed at the same time
        #[arg(long)]
        concurrency: Option<usize>,
        /// Print the processing state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the processing state of the last run
    Status {
        root: PathBuf,
        #[arg(long)]
        backend: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Analyze without persisting and write a JSON Lines graph
    Export {
        root: PathBuf,
        #[arg(long)]
        solution: Option<String>,
        /// Output file (default: stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// List solutions and projects under a directory
    Discover {
        root: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print a default kgraph.toml
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("Failed to load {}", path.display()))?,
        None => Config::load().wrap_err("Failed to load configuration")?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Analyze {
            root,
            solution,
            backend,
            concurrency,
            json,
        } => analyze(config, &root, solution.as_deref(), backend, concurrency, json).await,
        Commands::Status {
            root,
            backend,
            json,
        } => status(config, &root, backend, json).await,
        Commands::Export {
            root,
            solution,
            out,
        } => export(config, &root, solution.as_deref(), out.as_deref()).await,
        Commands::Discover { root, json } => discover(&config, &root, json),
        Commands::InitConfig => {
            print!("{}", Config::default_config_string());
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Apply command-line overrides and anchor a relative data dir at the root.
fn prepare_config(
    mut config: Config,
    root: &Path,
    backend: Option<String>,
    concurrency: Option<usize>,
) -> Result<Config> {
    if let Some(backend) = backend {
        config.storage.backend = backend;
    }
    if let Some(n) = concurrency {
        config.batch.max_concurrent_projects = n;
    }
    if Path::new(&config.storage.data_dir).is_relative() {
        config.storage.data_dir = root.join(&config.storage.data_dir).display().to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Discover candidates under `root` and load the selected projects.
///
/// Without `--solution` the first solution is used; a tree without any
/// solution loads every project.
fn load_sources(config: &Config, root: &Path, solution: Option<&str>) -> Result<LoadedProjects> {
    let candidates = discover_candidates(root, &config.analysis);
    let selected = match solution {
        Some(name) => Some(
            ByName(name.to_string())
                .select(&candidates)
                .ok_or_else(|| eyre!("No solution or project named `{}`", name))?,
        ),
        None => FirstMatch
            .select(&candidates)
            .filter(|c| c.kind == CandidateKind::Solution),
    };
    if let Some(candidate) = selected {
        info!(name = %candidate.name, path = %candidate.path, "Selected");
    }

    let loaded = load_projects(root, selected, &config.analysis)?;
    for diagnostic in &loaded.diagnostics {
        warn!(path = %diagnostic.path, kind = ?diagnostic.kind, "{}", diagnostic.message);
    }
    Ok(loaded)
}

fn spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")?);
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

async fn analyze(
    config: Config,
    root: &Path,
    solution: Option<&str>,
    backend: Option<String>,
    concurrency: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = prepare_config(config, root, backend, concurrency)?;
    let loaded = load_sources(&config, root, solution)?;
    if loaded.projects.is_empty() {
        return Err(eyre!("No projects found under {}", root.display()));
    }

    let gateway = open_gateway(&config.storage).await?;
    let analyzer = Arc::new(ProjectAnalyzer::from_config(&config.analysis)?);
    let runner = BatchRunner::new(analyzer, gateway, &config);
    let batch_key = config.batch.batch_key_for(root);

    let cancel = CancellationFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the running projects finish...");
            on_signal.cancel();
        }
    });

    let bar = spinner(format!(
        "Analyzing {} projects ({})",
        loaded.projects.len(),
        batch_key
    ))?;
    let result = runner.run(&batch_key, loaded.projects, &cancel).await;
    bar.finish_and_clear();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.state)?);
        return Ok(());
    }
    print_state(&report.state);
    for (project_id, diagnostics) in &report.diagnostics {
        println!("  {} diagnostics in {}", diagnostics.len(), project_id);
    }
    for project_id in &report.removed {
        println!("  removed {}", project_id);
    }
    Ok(())
}

async fn status(config: Config, root: &Path, backend: Option<String>, json: bool) -> Result<()> {
    let config = prepare_config(config, root, backend, None)?;
    let gateway = open_gateway(&config.storage).await?;
    let batch_key = config.batch.batch_key_for(root);

    match gateway.get_processing_state(&batch_key).await? {
        Some(state) if json => println!("{}", serde_json::to_string_pretty(&state)?),
        Some(state) => print_state(&state),
        None => println!(
            "No processing state for batch `{}`. Use 'kgraph analyze {}' first.",
            batch_key,
            root.display()
        ),
    }
    Ok(())
}

async fn export(config: Config, root: &Path, solution: Option<&str>, out: Option<&Path>) -> Result<()> {
    let config = prepare_config(config, root, None, None)?;
    let loaded = load_sources(&config, root, solution)?;
    let analyzer = Arc::new(ProjectAnalyzer::from_config(&config.analysis)?);

    let bar = spinner(format!("Analyzing {} projects", loaded.projects.len()))?;
    let results = analyze_projects(
        analyzer,
        loaded.projects,
        config.batch.max_concurrent_projects,
    )
    .await;
    bar.finish_and_clear();
    let results = results?;

    let mut graphs = Vec::with_capacity(results.len());
    for (name, result) in results {
        match result {
            Ok(analysis) => graphs.push(analysis.graph),
            Err(e) => warn!(project = %name, error = %e, "Project skipped from export"),
        }
    }

    let metadata = GraphMetadata::for_graphs(root.display().to_string(), &graphs);
    let lines = match out {
        Some(path) => {
            let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
            write_stream(&mut BufWriter::new(file), &metadata, &graphs)?
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let lines = write_stream(&mut lock, &metadata, &graphs)?;
            lock.flush()?;
            lines
        }
    };
    eprintln!(
        "Exported {} projects, {} nodes, {} edges ({} lines)",
        metadata.project_count, metadata.node_count, metadata.edge_count, lines
    );
    Ok(())
}

fn discover(config: &Config, root: &Path, json: bool) -> Result<()> {
    let candidates = discover_candidates(root, &config.analysis);
    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }
    if candidates.is_empty() {
        println!("No solutions or projects under {}. The directory is analyzed as one project.", root.display());
        return Ok(());
    }
    for candidate in &candidates {
        let kind = match candidate.kind {
            CandidateKind::Solution => "solution",
            CandidateKind::Project => "project",
        };
        println!("{:<9} {:<30} {}", kind, candidate.name, candidate.path);
    }
    Ok(())
}

fn print_state(state: &ProcessingState) {
    let counters = state.counters;
    let finished = state.completed_at.unwrap_or_else(Utc::now);
    let elapsed = finished - state.started_at;

    println!("Batch:    {}", state.batch_key);
    println!("  Run:      {}", state.run_id);
    println!(
        "  Started:  {} ({:.1}s)",
        state.started_at.format("%Y-%m-%d %H:%M:%S"),
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    if state.cancelled {
        println!("  Cancelled: {} projects not started", counters.cancelled);
    }
    println!(
        "  New: {}  Updated: {}  Skipped: {}  Failed: {}  Fragmented: {}",
        counters.new, counters.updated, counters.skipped, counters.failed, counters.fragmented
    );
    println!();
    for record in state.projects.values() {
        println!(
            "  {:<10} {:<30} {:>6} nodes {:>7} edges{}",
            record.status.to_string(),
            record.project_name,
            record.node_count,
            record.edge_count,
            record
                .error
                .as_deref()
                .map(|e| format!("  ({})", e))
                .unwrap_or_default()
        );
    }
}
