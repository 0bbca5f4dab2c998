//! `pharmapos-client` entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pharmapos_client::{AppState, ClientConfig, JournalLocation, StatusHook};
use pharmapos_observability::{LogConfig, LogSink};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(name = "pharmapos-client")]
#[command(about = "Route pharmacy POS data between the hosted store and the local backend", long_about = None)]
struct Args {
    /// Local backend base URL (overrides PHARMAPOS_LOCAL_API_URL)
    #[arg(long, env = "PHARMAPOS_LOCAL_API_URL")]
    local_api_url: Option<String>,

    /// Journal held writes to this SQLite file
    #[arg(long)]
    journal: Option<std::path::PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep probing connectivity and replay held writes on reconnect (default)
    Run,
    /// Copy local rows into the hosted store
    Sync {
        /// Single table to sync (defaults to every table)
        table: Option<String>,
    },
    /// Compare row counts between the two stores
    Verify {
        /// Single table to check (defaults to every table)
        table: Option<String>,
    },
    /// Probe once and print the connectivity status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout carries command output; logs go to stderr unless overridden.
    let log = LogConfig::default()
        .with_sink(LogSink::Stderr)
        .overlay(|key| std::env::var(key).ok())
        .context("invalid logging configuration")?;
    pharmapos_observability::init_with(&log);

    let args = Args::parse();
    let mut config = ClientConfig::from_env().context("invalid PHARMAPOS_* configuration")?;
    if let Some(url) = &args.local_api_url {
        config = config.with_local_api_url(url.clone());
    }
    if let Some(path) = &args.journal {
        config = config.with_journal(JournalLocation::Path(path.clone()));
    }

    let state = AppState::from_config(&config)
        .await
        .context("failed to initialize client")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&state).await,
        Command::Status => {
            let outcome = state.probe.check_now().await;
            print(
                &json!({
                    "outcome": format!("{outcome:?}"),
                    "status": state.probe.get_status(),
                    "queued": state.queue.get_queue_size(),
                    "dead_letters": state.queue.dead_letters().len(),
                }),
                args.pretty,
            )
        }
        Command::Sync { table } => {
            state.probe.check_now().await;
            let results = match table {
                Some(table) => vec![(table.clone(), state.sync_manager.sync_table(&table).await)],
                None => owned(state.sync_manager.sync_all().await),
            };
            print(&per_table(results), args.pretty)
        }
        Command::Verify { table } => {
            state.probe.check_now().await;
            let results = match table {
                Some(table) => vec![(table.clone(), state.sync_manager.verify_consistency(&table).await)],
                None => owned(state.sync_manager.verify_all().await),
            };
            print(&per_table(results), args.pretty)
        }
    }
}

async fn run(state: &AppState) -> anyhow::Result<()> {
    let mut hook = StatusHook::new(&state.probe);
    tracing::info!(indicator = %hook.indicator(), queued = state.queue.get_queue_size(), "client running");
    let worker = state.start_worker();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            changed = hook.changed() => {
                if changed.is_none() {
                    break;
                }
                tracing::info!(
                    indicator = %hook.indicator(),
                    queued = state.queue.get_queue_size(),
                    "connectivity changed"
                );
            }
        }
    }

    tracing::info!("shutting down");
    worker.stop().await;
    Ok(())
}

fn owned<T>(results: Vec<(&'static str, T)>) -> Vec<(String, T)> {
    results.into_iter().map(|(t, r)| (t.to_string(), r)).collect()
}

fn per_table<T, E>(results: Vec<(String, Result<T, E>)>) -> Value
where
    T: Serialize,
    E: std::fmt::Display,
{
    Value::Array(
        results
            .into_iter()
            .map(|(table, result)| match result {
                Ok(report) => json!({ "table": table, "report": report }),
                Err(err) => json!({ "table": table, "error": err.to_string() }),
            })
            .collect(),
    )
}

fn print(value: &Value, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("failed to render output")?;
    println!("{text}");
    Ok(())
}
