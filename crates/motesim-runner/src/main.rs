//! CLI entry point for the motesim simulator.

use clap::Parser;
use motesim_runner::{Scenario, ScenarioError, SimError, SimTime, SimulationReport};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "motesim",
    about = "Deterministic discrete-event simulation of motes with oscillator drift"
)]
struct Cli {
    /// YAML scenario file; when given, the inline node flags are ignored.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Seed for the radio layout and all per-node random streams.
    #[arg(long, default_value_t = 1234)]
    seed: u64,

    /// Number of motes.
    #[arg(long, default_value_t = 1)]
    nodes: u32,

    /// Deviation ratio for every mote (observed / reference frequency).
    #[arg(long, default_value_t = 0.01)]
    deviation: f64,

    /// Simulated run length in seconds.
    #[arg(long, default_value_t = 30.0)]
    limit_secs: f64,

    /// Emit the report as JSON instead of the human-readable table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum RunnerError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), RunnerError> {
    let scenario = match &cli.scenario {
        Some(path) => {
            info!(path = %path.display(), "loading scenario");
            Scenario::from_path(path)?
        }
        None => Scenario::uniform(
            cli.seed,
            cli.nodes,
            cli.deviation,
            SimTime::from_secs(cli.limit_secs),
        ),
    };

    let report = scenario.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    for node in &report.nodes {
        println!(
            "node {}: sim_time={:7.3}s local_time={:7.3}s cycles={:8.3}Mcyc \
             observed={:7.3}% requested={:7.3}%",
            node.node,
            node.scheduler_time_us as f64 / 1e6,
            node.local_time_us as f64 / 1e6,
            node.cycles as f64 / 1e6,
            node.observed_ratio * 100.0,
            node.deviation * 100.0,
        );
    }
    println!(
        "events: {} exec, {} radio, {} broadcasts, {} duplicates dropped, final time {:.3}s",
        report.stats.exec_events,
        report.stats.radio_events,
        report.stats.broadcasts,
        report.stats.duplicates_dropped,
        report.stats.final_time_us as f64 / 1e6,
    );
}
