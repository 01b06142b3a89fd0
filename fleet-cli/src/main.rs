// ABOUTME: fleet command-line front end - lists and resolves agents, previews routing,
// ABOUTME: and runs single, parallel or chain orchestrations with JSON output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fleet::prelude::*;
use fleet::supervisor::DEFAULT_AGENT_COMMAND;

#[derive(Parser)]
#[command(name = "fleet", version, about = "Subagent orchestration and model routing")]
struct Cli {
    /// Working directory (defaults to the current directory).
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// JSON model list: {"models": [{"provider", "id", "cost": {"input", "output"}}]}.
    /// Credentials come from <PROVIDER>_API_KEY.
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered agents.
    Agents {
        #[arg(long, default_value = "both")]
        scope: AgentScope,
    },
    /// Show how a requested agent name resolves.
    Resolve { name: String },
    /// Show which model a task would be routed to.
    ///
    /// The CLI has no provider client, so tasks are not classified: routing
    /// always uses the fallback classification (primary type, complexity 3,
    /// reasoning "fallback"). Pin a model with --model to bypass it.
    Route {
        task: String,
        /// Model hint or routing keyword (auto, auto-cheap, premium, ...).
        #[arg(long)]
        model: Option<String>,
        #[arg(long, value_enum)]
        cost: Option<CostArg>,
    },
    /// Run subagents.
    ///
    /// Routed models use the fallback classification, as with `route`.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, requires = "task")]
    agent: Option<String>,
    #[arg(long, requires = "agent")]
    task: Option<String>,
    /// JSON file with an array of {agent, task, cwd?, model?} run in parallel.
    #[arg(long)]
    tasks: Option<PathBuf>,
    /// JSON file with an array of {agent, task, cwd?, model?} run as a chain.
    #[arg(long)]
    chain: Option<PathBuf>,
    #[arg(long)]
    isolation: Option<IsolationMode>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_enum)]
    cost: Option<CostArg>,
    /// Model inherited when routing cannot pick one.
    #[arg(long)]
    parent_model: Option<String>,
    #[arg(long, default_value = DEFAULT_AGENT_COMMAND)]
    agent_command: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum CostArg {
    Eco,
    Balanced,
    Premium,
}

impl From<CostArg> for CostPreference {
    fn from(arg: CostArg) -> Self {
        match arg {
            CostArg::Eco => CostPreference::Eco,
            CostArg::Balanced => CostPreference::Balanced,
            CostArg::Premium => CostPreference::Premium,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("reading current directory")?,
    };

    match cli.command {
        Command::Agents { scope } => {
            let catalog = AgentCatalog::discover(&AgentDirectories::standard(&cwd), scope);
            print_json(&catalog.list())
        }
        Command::Resolve { name } => {
            let catalog =
                AgentCatalog::discover(&AgentDirectories::standard(&cwd), AgentScope::Both);
            let resolved = catalog.resolve(&name)?;
            let isolation =
                fleet::agent::resolve_isolation(None, &resolved.config, catalog.defaults());
            print_json(&serde_json::json!({
                "resolution": resolved.resolution,
                "requested": resolved.requested_name,
                "isolation": isolation,
                "agent": resolved.config,
            }))
        }
        Command::Route { task, model, cost } => {
            let registry = load_registry(cli.models.as_deref())?;
            let snapshot = Arc::new(RegistrySnapshot::capture(registry).await);
            let router =
                ModelRouter::new(snapshot, load_routing_config(&cwd), TaskClassifier::disabled());
            let overrides = RoutingOverrides {
                cost_preference: cost.map(Into::into),
                ..Default::default()
            };
            match router.route_model(&task, model.as_deref(), Some(&overrides)).await {
                Ok(routed) => print_json(&serde_json::json!({
                    "model": routed.model.qualified_id(),
                    "preference": routed.preference,
                    "classification": routed.classification,
                })),
                Err(failure) => bail!("routing failed: {}", failure),
            }
        }
        Command::Run(args) => run(args, cli.models.as_deref(), cwd).await,
    }
}

async fn run(args: RunArgs, models: Option<&Path>, cwd: PathBuf) -> Result<()> {
    let mut request = match (&args.agent, &args.task, &args.tasks, &args.chain) {
        (Some(agent), Some(task), None, None) => OrchestrationRequest::single(agent, task),
        (None, None, Some(path), None) => OrchestrationRequest::parallel(read_tasks(path)?),
        (None, None, None, Some(path)) => OrchestrationRequest::chain(read_tasks(path)?),
        _ => bail!("give exactly one of --agent/--task, --tasks or --chain"),
    };
    request = request.cwd(&cwd);
    if let Some(isolation) = args.isolation {
        request = request.isolation(isolation);
    }
    if let Some(model) = &args.model {
        request = request.model(model);
    }
    if let Some(cost) = args.cost {
        request = request.routing(RoutingOverrides {
            cost_preference: Some(cost.into()),
            ..Default::default()
        });
    }

    let mut routing = load_routing_config(&cwd);
    if models.is_none() && routing.enabled {
        tracing::info!("no model list given; children use their own default model");
        routing.enabled = false;
    }

    let mut options = OrchestratorOptions::default().cwd(&cwd);
    if let Some(parent) = args.parent_model {
        options = options.parent_model(parent);
    }

    let catalog = AgentCatalog::discover(&AgentDirectories::standard(&cwd), AgentScope::Both);
    let orchestrator = Orchestrator::new(
        catalog,
        load_registry(models)?,
        Arc::new(ProcessSupervisor::new(args.agent_command)),
    )
    .with_routing_config(routing)
    .with_options(options);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling subagents");
            on_interrupt.cancel();
        }
    });

    let outcome = orchestrator.run(request, cancel).await?;
    eprintln!("{}", outcome.summary());
    print_json(&outcome)?;
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn load_registry(path: Option<&Path>) -> Result<Arc<dyn ModelRegistry>> {
    let registry = match path {
        Some(path) => StaticModelRegistry::from_json_file(path)?.with_env_keys(),
        None => StaticModelRegistry::new(),
    };
    Ok(Arc::new(registry))
}

fn read_tasks(path: &Path) -> Result<Vec<TaskSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading tasks from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing tasks in {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
