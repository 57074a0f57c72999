use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lookout_core::app::{ShutterSummary, TaskCounts, WorkerStatus};
use lookout_core::domain::{Event, TaskRecord};
use lookout_core::impls::{EventCollector, InMemoryStore, SqliteStore};
use lookout_core::ports::MonitorStore;
use lookout_core::{Monitor, MonitorBuilder, MonitorConfig};

#[derive(Parser)]
#[command(name = "lookout", version, about = "Persist and inspect task queue events")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "LOOKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database; without it the store lives in memory
    #[arg(long, env = "LOOKOUT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON-lines events and persist them at every shutter
    Ingest {
        /// Event file; stdin when absent
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Forget finished tasks in memory after each shutter
        #[arg(long)]
        clear_after: bool,

        /// Print the resulting status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show active tasks, counts and workers
    Status {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
    /// Run one retention pass
    Cleanup,
}

#[derive(Serialize)]
struct StatusOutput {
    counts: TaskCounts,
    tasks: Vec<TaskRecord>,
    workers: Vec<WorkerStatus>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    let monitor = build_monitor(config, cli.db.as_deref())?;

    match cli.command {
        Command::Ingest {
            input,
            clear_after,
            json,
        } => {
            let (summary, interrupted) = ingest(&monitor, input, clear_after).await?;
            info!(
                shutters = summary.shutters,
                tasks_written = summary.tasks_written,
                tasks_skipped = summary.tasks_skipped,
                tasks_failed = summary.tasks_failed,
                expired = summary.expired,
                "ingest finished"
            );
            let printed = print_status(&monitor, 20, json);
            if interrupted {
                // The stdin reader may still be blocked in a read that the
                // runtime would wait for on shutdown.
                if let Err(err) = printed {
                    error!(error = %err, "failed to print status");
                }
                std::process::exit(130);
            }
            printed?;
        }
        Command::Status { limit, json } => print_status(&monitor, limit, json)?,
        Command::Cleanup => {
            let hidden = monitor.cleanup()?;
            println!("expired {hidden} task(s)");
        }
    }
    Ok(())
}

fn build_monitor(config: MonitorConfig, db: Option<&Path>) -> Result<Monitor<dyn MonitorStore>> {
    let store: Arc<dyn MonitorStore> = match db {
        Some(path) => Arc::new(
            SqliteStore::open(path, config.use_aware_timestamps)
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Arc::new(InMemoryStore::new()),
    };
    let monitor = MonitorBuilder::<dyn MonitorStore>::new(config)
        .store(store)
        .build()?;
    Ok(monitor)
}

/// Persist events until the input ends or Ctrl-C. The flag reports an interrupt.
async fn ingest(
    monitor: &Monitor<dyn MonitorStore>,
    input: Option<PathBuf>,
    clear_after: bool,
) -> Result<(ShutterSummary, bool)> {
    let collector = Arc::new(EventCollector::new());
    let shutter = monitor.spawn_shutter(collector.clone(), clear_after);

    let reader_collector = Arc::clone(&collector);
    let reader = tokio::task::spawn_blocking(move || read_events(input.as_deref(), &reader_collector));

    let interrupted = tokio::select! {
        read = reader => {
            let (accepted, rejected) = read.context("event reader panicked")??;
            info!(accepted, rejected, "event input exhausted");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, flushing collected events");
            true
        }
    };

    Ok((shutter.shutdown_and_join().await, interrupted))
}

/// Fold every line into the collector. Returns (accepted, rejected) counts.
fn read_events(input: Option<&Path>, collector: &EventCollector) -> Result<(u64, u64)> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (mut accepted, mut rejected) = (0, 0);
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("reading events")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(event) => {
                collector.push(&event);
                accepted += 1;
            }
            Err(err) => {
                warn!(line = n + 1, error = %err, "skipping malformed event");
                rejected += 1;
            }
        }
    }
    Ok((accepted, rejected))
}

fn print_status(monitor: &Monitor<dyn MonitorStore>, limit: usize, json: bool) -> Result<()> {
    let status = monitor.status();
    let output = StatusOutput {
        counts: status.counts()?,
        tasks: status.active_tasks(Some(limit))?,
        workers: status.workers()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("tasks ({} active)", output.counts.total());
    for task in &output.tasks {
        println!("  {task}");
    }
    println!("workers");
    for worker in &output.workers {
        let heartbeat = worker
            .record
            .last_heartbeat
            .map(|t| t.to_string())
            .unwrap_or_else(|| "never".to_string());
        let mark = if worker.alive { "online" } else { "offline" };
        println!("  {:<30} {:<8} {}", worker.record.hostname.as_str(), mark, heartbeat);
    }
    Ok(())
}
