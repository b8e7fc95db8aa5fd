//! `flowrun` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`      — execute a flow document with the dry-run driver.
//! - `validate` — check a flow document and print its execution order.
//! - `save`     — copy a flow document into the data directory.
//! - `load`     — print a stored flow document.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use engine::{ChannelEventSink, EngineConfig, Event, EventSink, FlowRunner, TracingEventSink};
use nodes::{Dispatcher, LoggingDriver};
use store::FlowStore;

#[derive(Parser)]
#[command(name = "flowrun", about = "Dependency-ordered UI automation flows", version)]
struct Cli {
    /// Directory holding saved flow documents [default: per-user data dir].
    #[arg(long, global = true, env = "FLOWRUN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory holding the last-opened marker [default: per-user config dir].
    #[arg(long, global = true, env = "FLOWRUN_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a flow document (pointer and keyboard actions are only logged).
    Run {
        /// Path to the flow JSON file.
        path: PathBuf,
        /// Size of the worker pool.
        #[arg(long, env = "FLOWRUN_WORKERS", default_value_t = EngineConfig::default().workers)]
        workers: usize,
        /// Abort the run after this many seconds.
        #[arg(long, env = "FLOWRUN_TIMEOUT_SECS", default_value_t = EngineConfig::default().run_timeout.as_secs())]
        timeout_secs: u64,
    },
    /// Validate a flow document and print its execution order.
    Validate {
        /// Path to the flow JSON file.
        path: PathBuf,
    },
    /// Store a flow document in the data directory.
    Save {
        /// Path to the flow JSON file.
        path: PathBuf,
        /// Name to store it under (`.json` is appended when missing).
        #[arg(long)]
        name: String,
    },
    /// Print a stored flow document, or list stored documents when no name
    /// is given.
    Load {
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run {
            path,
            workers,
            timeout_secs,
        } => {
            let document = read(&path)?;
            let config = EngineConfig {
                workers,
                run_timeout: Duration::from_secs(timeout_secs),
                ..EngineConfig::default()
            };
            run(&document, config).await
        }
        Command::Validate { path } => {
            let document = read(&path)?;
            match engine::plan(&document) {
                Ok(order) => {
                    println!("flow is valid, execution order: {}", order.join(" → "));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Save { path, name } => {
            let document = read(&path)?;
            let store = open_store(cli.data_dir, cli.config_dir)?;
            let saved = store.save_bytes(&document, &name)?;
            println!("{}", saved.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { name: Some(name) } => {
            let store = open_store(cli.data_dir, cli.config_dir)?;
            let bytes = store.load(&name)?;
            println!("{}", String::from_utf8_lossy(&bytes));
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { name: None } => {
            let store = open_store(cli.data_dir, cli.config_dir)?;
            if let Some(last) = store.last_opened()? {
                info!(path = %last.display(), "last opened flow");
            }
            for name in store.list()? {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Explicit directories win; the per-user defaults are only resolved when
/// one of them is missing.
fn open_store(data_dir: Option<PathBuf>, config_dir: Option<PathBuf>) -> anyhow::Result<FlowStore> {
    let (data_dir, config_dir) = match (data_dir, config_dir) {
        (Some(data), Some(config)) => (data, config),
        (data, config) => {
            let (default_data, default_config) = FlowStore::default_dirs()?;
            (data.unwrap_or(default_data), config.unwrap_or(default_config))
        }
    };
    Ok(FlowStore::new(data_dir, config_dir))
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read file {}", path.display()))
}

/// Run `document` to completion, logging every event.  Succeeds only when
/// the run reports `execution-completed`.
async fn run(document: &[u8], config: EngineConfig) -> anyhow::Result<ExitCode> {
    let dispatcher = Dispatcher::with_builtins(Arc::new(LoggingDriver::new()));
    let (sink, mut events) = ChannelEventSink::new();
    let runner = FlowRunner::new(dispatcher, Arc::new(sink), config);

    runner.start_execution(document).await?;

    let log = TracingEventSink;
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal().then(|| event.clone());
        log.emit(event);

        match terminal {
            Some(Event::ExecutionCompleted) => {
                info!("flow finished");
                return Ok(ExitCode::SUCCESS);
            }
            Some(other) => {
                warn!(event = other.name(), "flow did not complete");
                return Ok(ExitCode::FAILURE);
            }
            None => {}
        }
    }
    bail!("event stream ended before the run finished")
}
