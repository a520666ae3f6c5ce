use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use datalens::analyser::Analyser;
use datalens::commands::{Dispatcher, FsAccess, Request, ToolCall, list_tools};
use datalens::config::EngineConfig;
use datalens::logging::LogOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "datalens",
    version,
    about = "In-memory dataset registry and analysis tools"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a JSON engine configuration file
    #[arg(long, global = true, env = "DATALENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory the tools may read from and write to (repeatable).
    /// Overrides `trusted_roots` from the configuration.
    #[arg(long = "root", global = true)]
    pub roots: Vec<PathBuf>,

    /// Also write rolling log files
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Directory for log files. Defaults to the platform data directory.
    #[arg(long, global = true, env = "DATALENS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the available tools and their arguments as JSON
    Tools,
    /// Execute a JSON array of tool calls in order and print every response
    Run {
        /// File holding `[{"name": ..., "arguments": {...}}, ...]`
        calls: PathBuf,
    },
    /// Answer newline-delimited JSON requests on stdin, one response line each
    Serve,
    /// Write the default configuration to a file
    InitConfig {
        /// Destination of the configuration file
        path: PathBuf,
    },
}

impl Cli {
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_to_file: self.log_file,
            log_dir: self.log_dir.clone(),
            ..LogOptions::default()
        }
    }
}

pub async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Tools => {
            let tools = serde_json::to_string_pretty(&list_tools())
                .context("Failed to serialize tool list")?;
            println!("{tools}");
            Ok(())
        }
        Commands::InitConfig { path } => {
            EngineConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Run { ref calls } => {
            let dispatcher = build_dispatcher(cli.config.as_deref(), &cli.roots)?;
            handle_run(&dispatcher, calls)
        }
        Commands::Serve => {
            let dispatcher = build_dispatcher(cli.config.as_deref(), &cli.roots)?;
            handle_serve(dispatcher).await
        }
    }
}

fn build_dispatcher(config: Option<&std::path::Path>, roots: &[PathBuf]) -> Result<Dispatcher> {
    let config = EngineConfig::load_or_default(config)?;
    let roots = if roots.is_empty() {
        config.trusted_roots.clone()
    } else {
        roots.to_vec()
    };
    let files = FsAccess::new(&roots).context("Failed to set up file access")?;
    tracing::info!(
        "Engine ready: max {} datasets, {} rows per load, trusted roots {:?}",
        config.max_datasets,
        config.max_rows_per_load,
        files.roots()
    );
    Ok(Dispatcher::new(
        Arc::new(Analyser::new(config)),
        Arc::new(files),
    ))
}

fn handle_run(dispatcher: &Dispatcher, calls_path: &std::path::Path) -> Result<()> {
    let contents = std::fs::read_to_string(calls_path)
        .with_context(|| format!("Failed to read tool calls from {}", calls_path.display()))?;
    let calls: Vec<ToolCall> =
        serde_json::from_str(&contents).context("Failed to parse tool calls JSON")?;
    tracing::info!("Running {} tool call(s) from {}", calls.len(), calls_path.display());

    let mut failures = 0;
    for call in &calls {
        let response = dispatcher.dispatch(call);
        if !response.is_success() {
            failures += 1;
        }
        println!("== {} ==", call.name);
        println!("{}", response.text());
        println!();
    }

    if failures > 0 {
        tracing::warn!("{failures} of {} tool call(s) failed", calls.len());
    }
    Ok(())
}

async fn handle_serve(dispatcher: Dispatcher) -> Result<()> {
    tracing::info!("Serving newline-delimited JSON on stdin/stdout");
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = tokio::task::JoinSet::new();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        // Engine calls are synchronous; keep them off the reactor threads.
        in_flight.spawn_blocking(move || {
            let reply = match serde_json::from_str::<Request>(&line) {
                Ok(request) => dispatcher.handle(&request),
                Err(e) => {
                    tracing::warn!("Unparseable request line: {e}");
                    serde_json::json!({
                        "id": null,
                        "error": { "kind": "InvalidArgumentError", "message": format!("bad request: {e}") },
                    })
                }
            };
            // Only fails once the writer is gone, at which point nobody is listening.
            let _ = tx.send(reply.to_string());
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Request task failed: {e}");
        }
    }
    drop(tx);
    writer.await.context("Stdout writer task failed")??;
    tracing::info!("Input closed, shutting down");
    Ok(())
}
