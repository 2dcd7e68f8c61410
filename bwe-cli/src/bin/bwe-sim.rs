//! BWE Simulator - run estimator flows over simulated links
//!
//! Runs every flow of a scenario on its own thread and prints a per-flow
//! summary once the simulated duration has elapsed.

use anyhow::anyhow;
use bwe_cli::config::{EstimatorKind, FlowSettings, ScenarioConfig, SimulationConfig};
use bwe_cli::stats::{compact_report, display_flow_reports};
use bwe_core::packet::FlowId;
use bwe_core::receiver::ReceiverError;
use bwe_core::sender::BandwidthEstimatorType;
use bwe_sim::flow::{FlowConfig, FlowReport, FlowSimulation};
use clap::Parser;
use crossbeam::channel::{self, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bwe-sim")]
#[command(about = "Bandwidth estimation flow simulator", long_about = None)]
struct Args {
    /// Scenario file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Estimator for every flow (null, nada, remb, send-side, tcp, bbr)
    #[arg(short, long)]
    estimator: Option<String>,

    /// Number of flows when no scenario file is given
    #[arg(short, long, default_value = "1")]
    flows: usize,

    /// Simulated duration in milliseconds
    #[arg(short, long)]
    duration_ms: Option<i64>,

    /// Write an example scenario to this path and exit
    #[arg(long)]
    write_example: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    if let Some(path) = &args.write_example {
        ScenarioConfig::example().to_file(path)?;
        tracing::info!("Example scenario written to {}", path.display());
        return Ok(());
    }

    let mut scenario = match &args.config {
        Some(path) => {
            tracing::info!("Loading scenario from {}", path.display());
            if args.flows != 1 {
                tracing::warn!("--flows is ignored when a scenario file is given");
            }
            ScenarioConfig::from_file(path)?
        }
        None => default_scenario(args.flows),
    };

    if let Some(name) = &args.estimator {
        let estimator: BandwidthEstimatorType = name.parse()?;
        for flow in &mut scenario.flows {
            flow.estimator = EstimatorKind::from(estimator);
        }
    }
    if let Some(duration_ms) = args.duration_ms {
        scenario.simulation.duration_ms = duration_ms;
    }

    scenario.validate()?;

    tracing::info!(
        "Simulating {} flow(s) for {} ms",
        scenario.flows.len(),
        scenario.simulation.duration_ms
    );

    let reports = run_scenario(&scenario)?;
    display_flow_reports(&reports);

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_scenario(flows: usize) -> ScenarioConfig {
    let flows = (0..flows.max(1))
        .map(|index| FlowSettings::new(index as FlowId, EstimatorKind::Nada))
        .collect();

    ScenarioConfig {
        flows,
        ..ScenarioConfig::example()
    }
}

/// Run all flows in parallel and return their final reports ordered by flow id
fn run_scenario(scenario: &ScenarioConfig) -> anyhow::Result<Vec<FlowReport>> {
    let summary: RwLock<BTreeMap<FlowId, FlowReport>> = RwLock::new(BTreeMap::new());
    let (progress_tx, progress_rx) = channel::unbounded::<FlowReport>();

    crossbeam::scope(|s| -> anyhow::Result<()> {
        let mut handles = Vec::new();
        for config in scenario.flow_configs() {
            let timing = scenario.simulation.clone();
            let progress = progress_tx.clone();
            handles.push(s.spawn(move |_| run_flow(config, timing, progress)));
        }
        drop(progress_tx);

        for report in progress_rx.iter() {
            tracing::info!("{}", compact_report(&report));
            summary.write().insert(report.flow_id, report);

            let summary = summary.read();
            let total_kbps: u64 = summary.values().map(|r| r.recent_kbps as u64).sum();
            tracing::debug!("Aggregate receiving rate: {} kbps", total_kbps);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("flow thread panicked"))??;
        }
        Ok(())
    })
    .map_err(|_| anyhow!("simulation thread panicked"))??;

    Ok(summary.into_inner().into_values().collect())
}

/// Drive one flow, publishing a report every reporting interval
fn run_flow(
    config: FlowConfig,
    timing: SimulationConfig,
    progress: Sender<FlowReport>,
) -> Result<(), ReceiverError> {
    let flow_id = config.flow_id;
    let mut flow = FlowSimulation::new(config)?;
    let mut checkpoint_ms = timing.report_interval_ms.min(timing.duration_ms);

    loop {
        let report = flow.run_until(checkpoint_ms, timing.step_ms);
        let done = report.end_time_ms >= timing.duration_ms;

        if progress.send(report).is_err() {
            tracing::warn!("Flow {}: report channel closed", flow_id);
            break;
        }
        if done {
            break;
        }
        checkpoint_ms = (checkpoint_ms + timing.report_interval_ms).min(timing.duration_ms);
    }

    tracing::debug!("Flow {} finished", flow_id);
    Ok(())
}
