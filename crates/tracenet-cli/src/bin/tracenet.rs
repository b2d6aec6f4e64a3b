//! Tracenet CLI - contamination source inference on supply-chain networks
//!
//! Usage:
//!   tracenet <scenario.json>                          # Run the configured estimator
//!   tracenet <scenario.json> --estimator bfs-time     # Pick an estimator
//!   tracenet <scenario.json> -o json                  # Output results as JSON
//!   tracenet <scenario.json> --count-trajectories     # Size exact-estimator runs
//!   tracenet --list-estimators

use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::process;
use tracenet_core::{
    trajectory_counts, traceback, ContaminationReport, Estimator, FlowEdge, Reports,
    SupplyNetwork, TraceError, TracebackConfig, TracebackResult,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tracenet")]
#[command(version)]
#[command(about = "Tracenet - contamination source inference for supply-chain networks")]
#[command(
    long_about = "Rank the first-stage nodes of a multi-stage supply network by their posterior \
                  probability of being the source of a contamination event"
)]
struct Cli {
    /// Scenario JSON file
    #[arg(value_name = "FILE", required_unless_present = "list_estimators")]
    file: Option<String>,

    /// Estimator to run (overrides the scenario config)
    #[arg(short, long, value_name = "NAME")]
    estimator: Option<Estimator>,

    /// Feasibility fraction P (overrides the scenario config)
    #[arg(short, long, value_name = "P")]
    fraction: Option<f64>,

    /// Relative standard deviation of transit times (overrides the scenario config)
    #[arg(long, value_name = "X")]
    transport_dev: Option<f64>,

    /// Per-source trajectory limit for exact estimators
    #[arg(long, value_name = "N")]
    max_trajectories: Option<u128>,

    /// Output format: summary or json
    #[arg(short, long, default_value = "summary", value_name = "FORMAT")]
    output: String,

    /// List the available estimators instead of running
    #[arg(short, long)]
    list_estimators: bool,

    /// Print the trajectory-space size per feasible source and exit
    #[arg(long)]
    count_trajectories: bool,
}

/// Input file layout.
///
/// The network is given either as sparse `edges` or as dense `flow` and
/// `distance` matrices. A missing prior is uniform over stage-1 nodes.
#[derive(Deserialize)]
struct Scenario {
    stage_ends: Vec<usize>,
    #[serde(default)]
    edges: Vec<FlowEdge>,
    flow: Option<Vec<Vec<f64>>>,
    distance: Option<Vec<Vec<f64>>>,
    prior: Option<Vec<f64>>,
    reports: Vec<ContaminationReport>,
    #[serde(default)]
    config: TracebackConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_estimators {
        println!("Estimators:");
        for estimator in Estimator::ALL {
            let ts = if estimator.yields_start_time() {
                " (start time)"
            } else {
                ""
            };
            println!("  - {}{}", estimator, ts);
        }
        return;
    }

    let Some(file) = cli.file.as_deref() else {
        eprintln!("No scenario file given");
        process::exit(2);
    };

    let text = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file, e);
            process::exit(1);
        }
    };

    let scenario: Scenario = match serde_json::from_str(&text) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error parsing scenario '{}': {}", file, e);
            process::exit(1);
        }
    };

    let config = apply_overrides(scenario.config, &cli);

    let (network, reports, prior) = match load(scenario) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Invalid scenario: {}", e);
            process::exit(1);
        }
    };
    debug!(
        file,
        nodes = network.node_count(),
        edges = network.edge_count(),
        reports = reports.len(),
        estimator = %config.estimator,
        "scenario loaded"
    );

    if cli.count_trajectories {
        match trajectory_counts(&network, &reports, config.feasibility_fraction) {
            Ok(counts) => {
                println!("Trajectory counts ({} feasible sources):", counts.len());
                for (source, count) in counts {
                    println!("  {}: {}", source, count);
                }
            }
            Err(e) => {
                eprintln!("Error counting trajectories: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    match traceback(&network, &prior, &reports, &config) {
        Ok(result) => {
            info!(
                feasible = result.feasible.len(),
                failures = result.failures.len(),
                "traceback finished"
            );
            match cli.output.as_str() {
                "json" => match serde_json::to_string_pretty(&format_result(&result)) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing to JSON: {}", e);
                        process::exit(1);
                    }
                },
                _ => print_summary(&result),
            }
        }
        Err(e) => {
            eprintln!("Traceback failed: {}", e);
            process::exit(1);
        }
    }
}

fn apply_overrides(mut config: TracebackConfig, cli: &Cli) -> TracebackConfig {
    if let Some(estimator) = cli.estimator {
        config.estimator = estimator;
    }
    if let Some(fraction) = cli.fraction {
        config.feasibility_fraction = fraction;
    }
    if let Some(dev) = cli.transport_dev {
        config.time_model.transport_dev_frac = dev;
    }
    if cli.max_trajectories.is_some() {
        config.max_trajectories = cli.max_trajectories;
    }
    config
}

fn load(scenario: Scenario) -> Result<(SupplyNetwork, Reports, Vec<f64>), TraceError> {
    let network = match (scenario.flow, scenario.distance) {
        (Some(flow), Some(distance)) => {
            SupplyNetwork::from_dense(scenario.stage_ends, &flow, &distance)?
        }
        (None, None) => SupplyNetwork::new(scenario.stage_ends, scenario.edges)?,
        _ => {
            return Err(TraceError::Validation(
                "dense networks need both 'flow' and 'distance'".into(),
            ))
        }
    };
    let reports = Reports::new(scenario.reports)?;
    let prior = scenario.prior.unwrap_or_else(|| {
        let n = network.source_count();
        vec![1.0 / n as f64; n]
    });
    Ok((network, reports, prior))
}

fn print_summary(result: &TracebackResult) {
    println!("✓ Traceback with '{}' finished\n", result.estimator);
    println!(
        "Feasible sources ({}): {}",
        result.feasible.len(),
        result
            .feasible
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("\nPosterior:");
    for (source, p) in result.ranked() {
        if p == 0.0 {
            continue;
        }
        match result.start_time(source) {
            Some(ts) => println!("  {:>6}  p = {:.6}  ts* = {:.3}", source, p, ts),
            None => println!("  {:>6}  p = {:.6}", source, p),
        }
    }

    if !result.failures.is_empty() {
        println!("\nExcluded sources ({}):", result.failures.len());
        for failure in &result.failures {
            println!("  {}: {}", failure.source, failure.error);
        }
    }
}

fn format_result(result: &TracebackResult) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = result
        .failures
        .iter()
        .map(|f| json!({ "source": f.source, "error": f.error.to_string() }))
        .collect();
    json!({
        "estimator": result.estimator,
        "posterior": result.posterior,
        "start_times": result.start_times,
        "feasible": result.feasible,
        "most_likely_source": result.most_likely_source(),
        "failures": failures,
    })
}
