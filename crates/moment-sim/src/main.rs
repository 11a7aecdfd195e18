//! moment simulator
//!
//! Drives the optimistic controllers against the in-memory store and checks
//! that local state converges on the stored rows.

mod simulator;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use moment_core::MomentConfig;
use simulator::{run_simulator, SimulatorConfig};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("moment-sim")
        .version(moment_core::VERSION)
        .about("Randomised simulator for the moment optimistic mutation layer")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a seeded simulation and check convergence")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("actions")
                        .long("actions")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of user actions to simulate"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.2")
                        .value_parser(value_parser!(f64))
                        .help("Probability in [0, 1] that a remote call fails"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Number of comment threads"),
                )
                .arg(
                    Arg::new("relations")
                        .long("relations")
                        .default_value("6")
                        .value_parser(value_parser!(usize))
                        .help("Number of likes, follows and memberships to toggle"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                ),
        )
}

const DEFAULT_LOG_FILTER: &str = "moment=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("MOMENT_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let format = env::var("MOMENT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Reports go to stdout; logs stay on stderr
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let failure_rate = args.get_one::<f64>("failure-rate").copied().unwrap_or(0.2);
            anyhow::ensure!(
                (0.0..=1.0).contains(&failure_rate),
                "--failure-rate must be between 0 and 1, got {failure_rate}"
            );

            let moment = match args.get_one::<PathBuf>("config") {
                Some(path) => MomentConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => MomentConfig::default(),
            };

            let defaults = SimulatorConfig::default();
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(defaults.seed),
                actions: args
                    .get_one::<u64>("actions")
                    .copied()
                    .unwrap_or(defaults.actions),
                failure_rate,
                threads: args
                    .get_one::<usize>("threads")
                    .copied()
                    .unwrap_or(defaults.threads),
                relations: args
                    .get_one::<usize>("relations")
                    .copied()
                    .unwrap_or(defaults.relations),
                stop_on_first_violation: args.get_flag("stop-on-violation"),
                moment,
            };

            let report = run_simulator(config).await;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        _ => Ok(()),
    }
}
