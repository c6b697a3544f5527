use std::path::PathBuf;

use clap::{Parser, Subcommand};
use meshrelay_sim::{run_scenario, Scenario, SimReport};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print the report
    Run {
        /// Path to the scenario file
        scenario: PathBuf,
        /// Overrides the scenario seed
        #[arg(long, env = "MESHRELAY_SEED")]
        seed: Option<u64>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a scenario without running it
    Check {
        scenario: PathBuf,
    },
}

fn print_summary(report: &SimReport) {
    println!(
        "seed={} elapsed_ms={} frames={} lost={} malformed={}",
        report.seed, report.elapsed_ms, report.frames_sent, report.frames_lost, report.frames_malformed
    );
    for message in &report.messages {
        let to = message
            .to
            .map_or_else(|| "broadcast".to_string(), |to| format!("{to:#010x}"));
        let status = match (message.send_error.as_deref(), message.acked, message.failure) {
            (Some(err), _, _) => format!("send failed: {err}"),
            (None, Some(true), _) => "acked".to_string(),
            (None, Some(false), Some(reason)) => format!("failed: {reason}"),
            _ => "no ack".to_string(),
        };
        println!(
            "msg {:#010x} -> {to} id={} delivered_to={:?} {status}",
            message.from, message.id, message.delivered_to
        );
    }
    for node in &report.nodes {
        println!(
            "node {:#010x} tx={} relayed={} retx={} dup={} routes={:?}",
            node.num,
            node.stats.tx_packets,
            node.stats.relayed,
            node.stats.retransmissions,
            node.stats.rx_duplicates,
            node.learned_routes
        );
    }
}

fn main() {
    let filter = std::env::var("MESHRELAY_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            json,
        } => {
            let report = match Scenario::load(&scenario).and_then(|s| run_scenario(&s, seed)) {
                Ok(report) => report,
                Err(err) => {
                    error!("scenario {} failed: {err}", scenario.display());
                    std::process::exit(1);
                }
            };
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(err) => {
                        error!("report encoding failed: {err}");
                        std::process::exit(1);
                    }
                }
            } else {
                print_summary(&report);
            }
        }
        Commands::Check { scenario } => match Scenario::load(&scenario) {
            Ok(loaded) => info!(
                "scenario {} ok: {} nodes, {} links, {} messages",
                scenario.display(),
                loaded.nodes.len(),
                loaded.links.len(),
                loaded.messages.len()
            ),
            Err(err) => {
                error!("scenario {} invalid: {err}", scenario.display());
                std::process::exit(1);
            }
        },
    }
}
