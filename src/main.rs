use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskweave_core::config::AppConfig;
use taskweave_core::types::NodeId;
use taskweave_graph::algo::{
    betweenness_centrality, dijkstra, eigenvector_centrality, path_cost, EigenvectorOptions,
    DEFAULT_WEIGHT_KEY,
};
use taskweave_graph::{Graph, Topology};
use taskweave_workflow::{TaskRegistry, Workflow, WorkflowRunner};

const DEFAULT_CONFIG: &str = "taskweave.toml";

#[derive(Parser)]
#[command(name = "taskweave", version, about = "Graph-based workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a persisted workflow to completion
    Run {
        /// Workflow graph (JSON)
        workflow: PathBuf,
        /// Write the final graph here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print every workflow event to stderr as a JSON line
        #[arg(long)]
        events: bool,
    },
    /// Check that every task resolves to a kind and passes the task schema
    Validate {
        /// Workflow graph (JSON)
        workflow: PathBuf,
    },
    /// Centrality scores and weighted shortest path over a graph
    Analyze {
        /// Graph (JSON)
        graph: PathBuf,
        /// Restrict the analysis to these nodes
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<NodeId>,
        /// Shortest path start
        #[arg(long, requires = "to")]
        from: Option<NodeId>,
        /// Shortest path end
        #[arg(long, requires = "from")]
        to: Option<NodeId>,
        /// Edge attribute holding the weight
        #[arg(long, default_value = DEFAULT_WEIGHT_KEY)]
        weight: String,
    },
    /// Print the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "taskweave", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_filter().unwrap_or("taskweave=info,warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            workflow,
            output,
            events,
        } => run_workflow(&config, &workflow, output.as_deref(), events).await,
        Commands::Validate { workflow } => validate_workflow(&config, &workflow),
        Commands::Analyze {
            graph,
            nodes,
            from,
            to,
            weight,
        } => analyze_graph(&graph, &nodes, from.zip(to), &weight),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

/// Load the config file. A missing file at the default path means defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(AppConfig::default());
    }
    Ok(AppConfig::load(path)?)
}

async fn run_workflow(
    config: &AppConfig,
    path: &Path,
    output: Option<&Path>,
    events: bool,
) -> anyhow::Result<()> {
    let mut workflow = Workflow::load(path, config)?;
    let registry = TaskRegistry::with_builtins(&config.scheduler);
    let runner = WorkflowRunner::new(config.scheduler.clone(), registry);

    let printer = events.then(|| {
        let mut rx = runner.event_bus().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => eprintln!("{}", line),
                        Err(e) => warn!(error = %e, "Failed to encode event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling workflow");
            cancel.cancel();
        }
    });

    let summary = runner.run(&mut workflow).await?;
    drop(runner);
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    if let Some(out) = output {
        workflow.save(out)?;
        info!(path = %out.display(), "Wrote final workflow");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_workflow(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let workflow = Workflow::load(path, config)?;
    workflow.validate_all()?;

    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    for id in workflow.graph().node_ids() {
        *kinds.entry(workflow.kind(id)?.to_string()).or_default() += 1;
    }
    println!(
        "{}: {} tasks, {} edges",
        path.display(),
        workflow.graph().node_count(),
        workflow.graph().edge_count()
    );
    for (kind, count) in kinds {
        println!("  {:<14} {}", kind, count);
    }
    Ok(())
}

fn analyze_graph(
    path: &Path,
    nodes: &[NodeId],
    endpoints: Option<(NodeId, NodeId)>,
    weight: &str,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let graph: Graph = serde_json::from_str(&content)?;

    let report = if nodes.is_empty() {
        analyze(&graph, endpoints, weight)?
    } else {
        let view = graph.subgraph(nodes.iter().copied())?;
        analyze(&view, endpoints, weight)?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn analyze<G: Topology + ?Sized>(
    graph: &G,
    endpoints: Option<(NodeId, NodeId)>,
    weight: &str,
) -> anyhow::Result<Value> {
    let mut report = json!({
        "nodes": graph.node_ids().len(),
        "betweenness": betweenness_centrality(graph, true, weight),
        "eigenvector": eigenvector_centrality(graph, &EigenvectorOptions::default()),
    });
    if let Some((from, to)) = endpoints {
        let path = dijkstra(graph, from, to, weight)?;
        let cost = path_cost(graph, &path, weight)?;
        report["shortest_path"] = json!({ "path": path, "cost": cost });
    }
    Ok(report)
}
