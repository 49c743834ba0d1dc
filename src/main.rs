//! falconflow - flow runner
//!
//! Loads a JSON flow definition and runs it on the perception runtime, or
//! checks it without running.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use falconflow::{
    config::{LoggingSettings, RuntimeConfig},
    perception::PerceptionPluginManager,
    pipeline::{FlowDefinition, FlowExecutor, NodeFactory, NodeParams, NodeServices},
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "falconflow", version, about = "Run perception flows")]
struct Cli {
    /// Runtime config file (TOML)
    #[arg(long, short, global = true, env = "FALCONFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a flow until Enter is pressed or the duration elapses
    Run {
        flow: PathBuf,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Override the configured tick rate (Hz, 0 = unthrottled)
        #[arg(long)]
        tick_rate: Option<u32>,
    },
    /// Check a flow's templates and parameters without running it
    Validate { flow: PathBuf },
    /// List registered node template ids
    Types,
}

fn init_logging(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.filter))?;

    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn run(config: &RuntimeConfig, flow: &Path, duration: Option<Duration>, tick_rate: Option<u32>) -> anyhow::Result<()> {
    let perception = Arc::new(PerceptionPluginManager::with_builtin_backends());
    let added = config
        .register_detectors(&perception)
        .context("registering configured detectors")?;
    tracing::info!("Registered {} detector(s) from config", added);

    let tick_rate = tick_rate.unwrap_or(config.executor.tick_rate_hz);
    let mut executor = FlowExecutor::with_factory(NodeFactory::global())
        .with_services(NodeServices::new(perception))
        .with_tick_rate(tick_rate);
    executor.bus().subscribe(|msg| tracing::info!(target: "falconflow::bus", "[{}] {}", msg.category, msg.text));

    executor
        .load_flow_from_file(flow)
        .with_context(|| format!("loading {}", flow.display()))?;
    executor.start().context("starting flow")?;

    match duration {
        Some(d) => std::thread::sleep(d),
        None => {
            println!("Running, press Enter to stop");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
        }
    }

    let ticks = executor.tick_count();
    executor.stop();
    tracing::info!("Stopped after {} ticks", ticks);
    Ok(())
}

fn validate(flow: &Path) -> anyhow::Result<()> {
    let definition =
        FlowDefinition::from_file(flow).with_context(|| format!("parsing {}", flow.display()))?;
    let factory = NodeFactory::global();
    factory.initialize_default_types();

    let mut problems = Vec::new();
    for node in &definition.nodes {
        if !factory.is_registered(&node.template_id) {
            problems.push(format!("node '{}': unknown template '{}'", node.node_id, node.template_id));
            continue;
        }
        if let Err(e) = NodeParams::from_json(&node.template_id, &node.parameters) {
            problems.push(format!("node '{}': {}", node.node_id, e));
        }
    }
    for edge in &definition.edges {
        for endpoint in [&edge.from_node_id, &edge.to_node_id] {
            if definition.node(endpoint).is_none() {
                problems.push(format!("edge '{}': unknown node '{}'", edge.edge_id, endpoint));
            }
        }
    }

    if !problems.is_empty() {
        for p in &problems {
            eprintln!("  {}", p);
        }
        bail!("flow '{}' has {} problem(s)", definition.flow_id, problems.len());
    }
    println!(
        "flow '{}' OK ({} nodes, {} edges)",
        definition.flow_id,
        definition.nodes.len(),
        definition.edges.len()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::load_or_default(cli.config.as_deref());
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Command::Run {
            flow,
            duration_secs,
            tick_rate,
        } => run(&config, &flow, duration_secs.map(Duration::from_secs), tick_rate),
        Command::Validate { flow } => validate(&flow),
        Command::Types => {
            let factory = NodeFactory::global();
            factory.initialize_default_types();
            for template_id in factory.registered_types() {
                println!("{}", template_id);
            }
            Ok(())
        }
    }
}
