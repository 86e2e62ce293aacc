use std::io::Read;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use hivemind_agents::{AgentRegistry, EnvCredentials};
use hivemind_models::{HivemindConfig, Scenario};
use hivemind_store::RoundStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hivemind", about = "Weighted multi-agent consensus engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/hivemind.toml")]
    config: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one consensus round for a Scenario and print the RoundReport
    Decide {
        /// Read Scenario JSON from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Show configured agents and their breaker state
    Agents,
    /// Show recently journaled rounds
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show per-agent outcome statistics from the journal
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr (respects RUST_LOG); stdout carries only JSON output
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let config = hivemind::load_config(&cli.config)?;

    match cli.command {
        Command::Decide { input, pretty } => decide(&config, input.as_deref(), pretty).await,
        Command::Agents => {
            let registry = AgentRegistry::from_config(&config, Arc::new(EnvCredentials))
                .context("Failed to build agent registry")?;
            print_json(&registry.statuses(), true)
        }
        Command::History { limit } => {
            let store = journal(&config)?;
            let rows: Vec<_> = store
                .recent(limit)?
                .into_iter()
                .map(|row| {
                    serde_json::json!({
                        "round_id": row.round_id,
                        "symbol": row.symbol,
                        "action": row.action,
                        "confidence": row.confidence,
                        "confluence": row.confluence,
                        "quorum_met": row.quorum_met,
                        "participating_agents": row.participating_agents,
                        "decided_at": row.decided_at,
                    })
                })
                .collect();
            print_json(&rows, true)
        }
        Command::Stats => {
            let store = journal(&config)?;
            let rows: Vec<_> = store
                .agent_stats()?
                .into_iter()
                .map(|row| {
                    let success_rate = row.success_rate().round_dp(4);
                    serde_json::json!({
                        "stats": row,
                        "success_rate": success_rate.to_string(),
                    })
                })
                .collect();
            print_json(&rows, true)
        }
    }
}

async fn decide(config: &HivemindConfig, input: Option<&str>, pretty: bool) -> Result<()> {
    let scenario_json = if let Some(input_path) = input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };

    let scenario: Scenario =
        serde_json::from_str(&scenario_json).context("Failed to parse Scenario JSON")?;

    let engine = hivemind::build_engine(config, Arc::new(EnvCredentials))
        .context("Failed to build engine")?;
    let report = hivemind::evaluate(&engine, &scenario).await;

    print_json(&report, pretty)
}

fn journal(config: &HivemindConfig) -> Result<Arc<RoundStore>> {
    hivemind::open_store(config)?
        .ok_or_else(|| anyhow!("Journal is disabled; set [store] enabled = true"))
}

fn print_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
