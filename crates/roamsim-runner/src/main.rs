//! `roamsim`: run a Wi-Fi roaming scenario from the command line.
//!
//! ```text
//! roamsim run --config scenarios/handoff.yaml --duration 60s
//! roamsim run --n-wifis 4 --n-stas 1 --stats-json stats.json
//! roamsim run --dump-config > my-scenario.yaml
//! roamsim metrics
//! ```

use clap::{Args, Parser, Subcommand};
use roamsim_runner::{
    build_simulation, create_event_loop, load_model, RunnerError, ScenarioConfig,
    SimulationStats,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "roamsim")]
#[command(about = "Wi-Fi roaming over a bridged wired backbone", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario
    Run(RunnerConfig),
    /// List every metric the simulator emits
    Metrics,
}

#[derive(Args, Debug)]
struct RunnerConfig {
    /// Scenario file (YAML). Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of access points
    #[arg(long)]
    n_wifis: Option<usize>,

    /// Stations per access point cell
    #[arg(long)]
    n_stas: Option<usize>,

    /// Simulated time, e.g. "60", "60s", "1m30s"
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<f64>,

    /// Random seed (shadowing)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Entity trace filter: comma-separated names, "entity:<id>" or "*", plus
    /// optional "category:<event|state|op|timer>" selectors
    #[arg(long)]
    trace: Option<String>,

    /// Log filter, e.g. "info" or "roamsim_wifi=debug". Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Disable the periodic position log
    #[arg(long)]
    no_position_log: bool,

    /// Write run statistics as JSON to this file instead of stdout
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Print the effective scenario as YAML and exit
    #[arg(long)]
    dump_config: bool,
}

/// Parse "90", "90s", "1m30s", "1h" or "2.5m" into seconds.
fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<f64>() {
        return Ok(secs);
    }

    let mut total = 0.0;
    let mut number = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let multiplier = match c {
            's' => 1.0,
            'm' => 60.0,
            'h' => 3600.0,
            _ => return Err(format!("unknown unit '{}' in '{}' (use s, m or h)", c, s)),
        };
        let value: f64 = number
            .parse()
            .map_err(|_| format!("missing number before '{}' in '{}'", c, s))?;
        total += value * multiplier;
        number.clear();
    }
    if !number.is_empty() {
        total += number
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}' in '{}'", number, s))?;
    }
    Ok(total)
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Apply command-line overrides on top of the loaded scenario.
fn scenario_from_args(args: &RunnerConfig) -> Result<ScenarioConfig, RunnerError> {
    let mut config = match &args.config {
        Some(path) => load_model(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(n) = args.n_wifis {
        config.topology.ap_count = n;
    }
    if let Some(n) = args.n_stas {
        config.topology.stations_per_cell = n;
    }
    if let Some(secs) = args.duration {
        config.duration_s = secs;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(trace) = &args.trace {
        config.trace = Some(trace.clone());
    }
    if args.no_position_log {
        config.mobility.position_log_interval_s = 0.0;
    }
    config.validate()?;
    Ok(config)
}

fn print_timeline(stats: &SimulationStats) {
    for station in &stats.stations {
        for record in &station.timeline {
            let from = record.from.map(|ap| ap.to_string());
            let to = record.to.map(|ap| ap.to_string());
            println!(
                "{} {}: {} -> {}",
                record.time,
                station.name,
                from.as_deref().unwrap_or("-"),
                to.as_deref().unwrap_or("-")
            );
        }
    }
}

fn run(args: RunnerConfig) -> Result<(), RunnerError> {
    let config = scenario_from_args(&args)?;
    if args.dump_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    init_logging(args.log_level.as_deref());
    info!(
        "Scenario: {} APs, {} stations per cell, {} s, seed {}",
        config.topology.ap_count, config.topology.stations_per_cell, config.duration_s, config.seed
    );

    let simulation = build_simulation(&config, config.seed)?;
    let mut event_loop = create_event_loop(simulation);
    let stats = event_loop.run_to_end()?;

    match &args.stats_json {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&stats)?)?;
            info!("Statistics written to {}", path.display());
            print_timeline(&stats);
        }
        None => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

fn print_metrics_info() {
    use roamsim_runner::metric_defs;

    println!("roamsim metrics");
    println!("===============\n");
    println!("Node-scoped metrics carry the labels:");
    println!("  - node: entity name (sta-0-0, ap1, ap1-bridge, switch, server)");
    println!("  - node_type: station, access_point, bridge, host");
    println!();

    let categories = [
        ("Wi-Fi management", "roamsim.wifi."),
        ("Bridging", "roamsim.bridge."),
        ("Flows", "roamsim.flow."),
        ("Simulation", "roamsim.simulation."),
    ];
    for (category, prefix) in categories {
        println!("## {}\n", category);
        for metric in metric_defs::ALL.iter().filter(|m| m.name.starts_with(prefix)) {
            println!("  {}", metric.name);
            println!("    Type: {}", metric.kind);
            if !metric.unit_str().is_empty() {
                println!("    Unit: {}", metric.unit_str());
            }
            println!("    Description: {}", metric.description);
            if !metric.labels.is_empty() {
                println!("    Extra labels: {}", metric.labels.join(", "));
            }
            println!();
        }
    }
}

fn main() -> Result<(), RunnerError> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Metrics => {
            print_metrics_info();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60").unwrap(), 60.0);
        assert_eq!(parse_duration("60s").unwrap(), 60.0);
        assert_eq!(parse_duration("1m30s").unwrap(), 90.0);
        assert_eq!(parse_duration("1h").unwrap(), 3600.0);
        assert_eq!(parse_duration("2.5m").unwrap(), 150.0);
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "roamsim",
            "run",
            "--n-wifis",
            "4",
            "--n-stas",
            "1",
            "--duration",
            "30s",
            "--seed",
            "7",
            "--no-position-log",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = scenario_from_args(&args).unwrap();
        assert_eq!(config.topology.ap_count, 4);
        assert_eq!(config.topology.stations_per_cell, 1);
        assert_eq!(config.duration_s, 30.0);
        assert_eq!(config.seed, 7);
        assert_eq!(config.mobility.position_log_interval_s, 0.0);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["roamsim", "run", "--n-wifis", "0"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(matches!(
            scenario_from_args(&args),
            Err(RunnerError::Model(_))
        ));
    }
}
