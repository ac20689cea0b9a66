use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};
use crate::engine::{Engine, EngineEvent};
use crate::errors::CallerError;
use crate::flow::validator::Validator;
use crate::flow::{load_path, FlowDocument};
use crate::storage::Storage;

#[derive(Parser)]
#[command(name = "chatflow")]
#[command(about = "Chatflow - run scripted conversations from flow documents", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with a flow on the terminal
    Run {
        /// Flow document (JSON)
        flow: PathBuf,

        /// Initial variables (JSON object)
        #[arg(long)]
        storage: Option<String>,

        /// Read-only variables that survive clearVariables (JSON object)
        #[arg(long)]
        global: Option<String>,

        /// Prefix bot output with the time
        #[arg(long)]
        timestamps: bool,
    },

    /// Validate a flow document
    Check {
        /// Flow document (JSON)
        flow: PathBuf,

        /// Fail on warnings too
        #[arg(long)]
        strict: bool,
    },

    /// List the validation rules
    Rules,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::try_parse_from(args)?;
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration before anything else so errors show up first
    let config = Config::builder().config_path(cli.config).build()?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Run {
            flow,
            storage,
            global,
            timestamps,
        } => {
            let document = load_flow(&flow)?;
            for issue in Validator::new().validate(&document) {
                warn!(%issue, "flow has issues");
            }
            let storage = initial_storage(storage.as_deref(), global.as_deref())?;
            run_conversation(config, document, storage, timestamps).await?;
        }

        Commands::Check { flow, strict } => {
            let document = load_flow(&flow)?;
            let issues = Validator::new().validate(&document);
            let pages = document.pages().count();

            for issue in &issues {
                println!("  {}", issue);
            }

            let errors = issues.iter().filter(|issue| issue.is_error()).count();
            let warnings = issues.len() - errors;
            if errors > 0 || (strict && warnings > 0) {
                bail!(
                    "{}: {} error(s), {} warning(s)",
                    flow.display(),
                    errors,
                    warnings
                );
            }
            println!(
                "✓ {}: {} page(s), {} warning(s)",
                flow.display(),
                pages,
                warnings
            );
        }

        Commands::Rules => {
            for (id, description) in Validator::new().rules() {
                println!("  {:<18} {}", id, description);
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Already installed when embedded in a host
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_flow(path: &Path) -> Result<FlowDocument> {
    load_path(path).with_context(|| format!("Failed to load flow {}", path.display()))
}

fn initial_storage(local: Option<&str>, global: Option<&str>) -> Result<Storage> {
    let mut storage = match local {
        Some(json) => Storage::from_value(
            serde_json::from_str(json).context("Invalid --storage JSON")?,
        ),
        None => Storage::new(),
    };
    if let Some(json) = global {
        storage = storage.with_global(serde_json::from_str(json).context("Invalid --global JSON")?);
    }
    Ok(storage)
}

async fn run_conversation(
    config: Config,
    document: FlowDocument,
    storage: Storage,
    timestamps: bool,
) -> Result<()> {
    let engine = Engine::builder(document)
        .config(config.engine)
        .storage(storage)
        .build();

    let printer = tokio::spawn(print_events(engine.subscribe(), timestamps));
    engine.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let text = line.trim_end();
                if text == "/quit" {
                    break;
                }
                match engine.input_async(text).await {
                    Ok(()) => {}
                    Err(CallerError::NotWaitingInput) => eprintln!("(busy, input ignored)"),
                    Err(e) => return Err(e.into()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.stop().await;
    printer.await.context("Output task failed")?;
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>, timestamps: bool) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::Output(text)) => {
                if timestamps {
                    println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), text);
                } else {
                    println!("{}", text);
                }
            }
            Ok(EngineEvent::Error(error)) => eprintln!("! {}", error),
            Ok(EngineEvent::Exit) => break,
            Ok(event) => debug!(?event, "engine event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
