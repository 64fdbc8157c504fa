//! `weave-check`: the external testing CLI from specification §6 — a thin
//! front door over [`weave::testing::TestingEngine`], in the same spirit as
//! the teacher's own `main.rs`/`cli.rs` split over its reactor core.

mod scenarios;

use std::fs;
use std::path::PathBuf;

use structopt::StructOpt;

use weave::config::WeaveConfig;
use weave::testing::{StrategyKind, TestingEngine};

/// Systematically test a bundled `weave` actor program for concurrency
/// bugs.
#[derive(Debug, StructOpt)]
#[structopt(name = "weave-check")]
struct Cli {
    /// Path to a TOML configuration file, layered under the flags below.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Number of testing iterations to run.
    #[structopt(long)]
    iterations: Option<u64>,

    /// Exploration strategy to drive the scheduler with.
    #[structopt(long)]
    strategy: Option<StrategyKind>,

    /// Seed for the first iteration; later iterations derive from it.
    #[structopt(long)]
    seed: Option<u64>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run a bundled scenario under the testing engine.
    Run {
        /// Name of the scenario to run (see `weave-check list`).
        scenario: String,
    },
    /// List the bundled scenarios.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::from_args();

    match &cli.command {
        Command::List => {
            for name in scenarios::names() {
                println!("{}", name);
            }
            return Ok(());
        }
        Command::Run { scenario } => run_scenario(scenario, &cli).await,
    }
}

async fn run_scenario(scenario: &str, cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => WeaveConfig::from_file(path)?,
        None => WeaveConfig::default(),
    };
    if let Some(iterations) = cli.iterations {
        config.testing.iterations = iterations;
    }
    if let Some(strategy) = cli.strategy {
        config.testing.strategy = strategy;
    }
    if let Some(seed) = cli.seed {
        config.testing.seed = seed;
    }

    let entry = scenarios::lookup(scenario).ok_or_else(|| {
        anyhow::anyhow!("unknown scenario '{}' (see `weave-check list`)", scenario)
    })?;

    tracing::info!(%scenario, iterations = config.testing.iterations, "starting run");
    let engine = TestingEngine::new(config.testing.clone(), entry);
    let result = engine.run().await;
    println!("{} iteration(s) run", result.iterations_run);

    if result.passed() {
        println!("no bugs found");
        return Ok(());
    }

    fs::create_dir_all(&config.output.directory)?;
    for bug in &result.bugs {
        let base = config
            .output
            .directory
            .join(format!("{}-iter{}", scenario, bug.iteration));
        if config.output.write_trace {
            fs::write(base.with_extension("trace"), bug.trace_text())?;
        }
        if config.output.write_actor_graph {
            fs::write(base.with_extension("xml"), bug.actor_graph_xml())?;
        }
        println!("bug found in iteration {}: {}", bug.iteration, bug.error);
        println!("replay with: {}", bug.replay_command(scenario));
    }
    anyhow::bail!("{} bug(s) found", result.bugs.len())
}
