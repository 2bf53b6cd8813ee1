//! eventsync CLI — run, inspect and dry-run the per-block event scheduler.
//!
//! # Commands
//! ```text
//! eventsync run       --config <file.json>
//! eventsync info
//! eventsync job-name  --artifact <A> --event <E> [--namespace <N>]
//! eventsync validate  --config <file.json>
//! eventsync plan      --artifact <A> --event <E> --chain-height <H> --processed-height <P>
//!                     [--queued <B>]... [--stored <B>]...
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use eventsync_core::{
    job_name, ArtifactContract, ControllerBuilder, ControllerIdentity, EventSetStore, EvmEventSet,
    FatalShutdown, FetchJob, JobQueue, JobState, RawLogEntry, StaticInstance, SyncError,
    TickOutcome, FETCH_OPERATION,
};
use eventsync_evm::{EvmArtifact, HttpRpcClient};
use eventsync_storage::sqlite::SqliteStorage;
use eventsync_storage::{InMemoryEventSetStore, InMemoryHeightStore, InMemoryJobQueue};

mod config;
mod logging;
mod run;

use config::{ControllerEntry, RpcConfig, SyncConfig};
use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "eventsync",
    about = "Leader-scheduled, queue-dispatched EVM event ingestion (eventsync CLI)",
    version
)]
struct Cli {
    /// Debug-level logging (overrides the config file's level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured controllers until a fatal error or Ctrl-C
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show defaults and available backends
    Info,

    /// Print the queue job name for an (artifact, event) pair
    #[command(name = "job-name")]
    JobName {
        #[arg(long)]
        artifact: String,
        #[arg(long)]
        event: String,
        #[arg(long, default_value = "eventsync")]
        namespace: String,
    },

    /// Load and validate a config file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run one scheduler tick against in-memory backends and print the decision
    Plan {
        #[arg(long)]
        artifact: String,
        #[arg(long)]
        event: String,
        #[arg(long)]
        chain_height: u64,
        #[arg(long)]
        processed_height: u64,
        /// Block with a job already waiting in the queue (repeatable)
        #[arg(long)]
        queued: Vec<u64>,
        /// Block with an event set already stored (repeatable)
        #[arg(long)]
        stored: Vec<u64>,
        #[arg(long, default_value = "eventsync")]
        namespace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = SyncConfig::load(&config)?;
            init_tracing(&log_config(config.log.clone(), cli.verbose, cli.json_logs));
            cmd_run(config).await
        }
        command => {
            let quiet = LogConfig {
                level: "warn".into(),
                ..LogConfig::default()
            };
            init_tracing(&log_config(quiet, cli.verbose, cli.json_logs));
            run_tool(command).await
        }
    }
}

/// Commands that inspect or dry-run without touching external services.
async fn run_tool(command: Commands) -> Result<()> {
    match command {
        Commands::Run { .. } => anyhow::bail!("`run` is started from main"),
        Commands::Info => cmd_info(),
        Commands::JobName {
            artifact,
            event,
            namespace,
        } => cmd_job_name(&artifact, &event, &namespace),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Plan {
            artifact,
            event,
            chain_height,
            processed_height,
            queued,
            stored,
            namespace,
        } => {
            cmd_plan(PlanArgs {
                artifact,
                event,
                chain_height,
                processed_height,
                queued,
                stored,
                namespace,
            })
            .await
        }
    }
}

/// Command-line flags take precedence over the configured log settings.
fn log_config(mut log: LogConfig, verbose: bool, json_logs: bool) -> LogConfig {
    if verbose {
        log.level = "debug".into();
    }
    log.json |= json_logs;
    log
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_run(config: SyncConfig) -> Result<()> {
    let (database, rpc) = config.runtime()?;
    let rpc = rpc.clone();

    let storage = Arc::new(
        SqliteStorage::open(database)
            .await
            .with_context(|| format!("cannot open database '{database}'"))?,
    );
    let backends = run::Backends {
        heights: storage.clone(),
        store: storage,
    };

    let runtime = run::start(&config, backends, |entry| evm_artifact(entry, &rpc)).await?;
    info!(database, rpc = %rpc.url, "waiting for blocks");

    tokio::select! {
        fatal = runtime.wait_fatal() => {
            error!(error = %fatal, "fatal error, shutting down");
            runtime.stop();
            Err(anyhow::Error::new(fatal).context("eventsync halted"))
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "cannot listen for Ctrl-C");
            }
            info!("interrupted, shutting down");
            runtime.stop();
            Ok(())
        }
    }
}

fn evm_artifact(entry: &ControllerEntry, rpc: &RpcConfig) -> Result<Arc<dyn ArtifactContract>, SyncError> {
    let (Some(address), Some(topic0)) = (&entry.address, &entry.topic0) else {
        return Err(SyncError::Config(format!(
            "controller {} needs an address and topic0",
            entry.identity()
        )));
    };
    let client = HttpRpcClient::new(&rpc.url, rpc.timeout())?;
    let artifact = EvmArtifact::new(&entry.artifact, address, client)
        .event(&entry.event, topic0)
        .max_range(rpc.max_range);
    Ok(Arc::new(artifact))
}

fn cmd_info() -> Result<()> {
    let defaults = SyncConfig::default();
    println!("eventsync v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Defaults:");
    println!("  namespace          {}", defaults.controller.namespace);
    println!("  tick interval      {} ms", defaults.controller.tick_interval_ms);
    println!("  job concurrency    {}", eventsync_core::JOB_CONCURRENCY);
    println!("  queue attempts     {}", defaults.queue.max_attempts);
    println!("  keep completed     {}", defaults.queue.keep_completed);
    println!("  keep failed        {}", defaults.queue.keep_failed);
    println!();
    println!("Backends:");
    println!("  memory   event sets, global height, job queue");
    println!("  sqlite   event sets, global height  (eventsync-storage, feature=sqlite)");
    println!("  evm      eth_getLogs artifact       (eventsync-evm, HTTP with feature=http)");
    Ok(())
}

fn cmd_job_name(artifact: &str, event: &str, namespace: &str) -> Result<()> {
    let name = job_name(namespace, FETCH_OPERATION, &ControllerIdentity::new(artifact, event));
    println!("{name}");
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    let config = SyncConfig::load(path)?;
    println!("✓ {} is valid", path.display());
    println!("  tick interval: {} ms", config.controller.tick_interval_ms);
    println!("  max attempts:  {}", config.queue.max_attempts);
    match config.runtime() {
        Ok((database, rpc)) => println!("  runnable:      yes (database {database}, rpc {})", rpc.url),
        Err(err) => println!("  runnable:      no ({err})"),
    }
    for name in config.job_names() {
        println!("  job: {name}");
    }
    Ok(())
}

struct PlanArgs {
    artifact: String,
    event: String,
    chain_height: u64,
    processed_height: u64,
    queued: Vec<u64>,
    stored: Vec<u64>,
    namespace: String,
}

/// Artifact with no logs; `plan` never runs a fetch job.
struct DryRunArtifact(String);

#[async_trait]
impl ArtifactContract for DryRunArtifact {
    fn artifact_name(&self) -> &str {
        &self.0
    }

    async fn fetch_events(&self, _event: &str, _from: u64, _to: u64) -> Result<Vec<RawLogEntry>, SyncError> {
        Ok(vec![])
    }
}

async fn cmd_plan(args: PlanArgs) -> Result<()> {
    let queue = Arc::new(InMemoryJobQueue::default());
    let store = Arc::new(InMemoryEventSetStore::new());
    let heights = Arc::new(InMemoryHeightStore::with_heights(args.chain_height, args.processed_height));
    let shutdown = FatalShutdown::new();

    let controller = ControllerBuilder::new()
        .namespace(&args.namespace)
        .event_name(&args.event)
        .artifact(Arc::new(DryRunArtifact(args.artifact.clone())))
        .heights(heights)
        .queue(queue.clone())
        .store(store.clone())
        .instance(Arc::new(StaticInstance::leader()))
        .shutdown(Arc::new(shutdown.clone()))
        .build()
        .context("cannot build controller")?;

    // No handler is registered, so seeded jobs stay waiting.
    for block in &args.queued {
        queue.enqueue(controller.job_name(), FetchJob { block_number: *block }).await?;
    }
    for block in &args.stored {
        store
            .create(EvmEventSet {
                artifact_name: args.artifact.clone(),
                event_name: args.event.clone(),
                block_number: *block,
                events: vec![],
            })
            .await?;
    }

    let outcome = controller.event_background_fetcher().await;
    if let Some(err) = shutdown.error() {
        anyhow::bail!("fatal: {err}");
    }

    println!("job:      {}", controller.job_name());
    println!("heights:  chain={} processed={}", args.chain_height, args.processed_height);
    match outcome? {
        TickOutcome::NotReady => println!("decision: not ready (height counters uninitialized)"),
        TickOutcome::CaughtUp { height } => println!("decision: caught up at {height}"),
        TickOutcome::AlreadyQueued { block_number } => {
            println!("decision: skip, block {block_number} already queued")
        }
        TickOutcome::AlreadyStored { block_number } => {
            println!("decision: skip, block {block_number} already stored")
        }
        TickOutcome::Dispatched { block_number, job_id } => {
            println!("decision: dispatch block {block_number} (job #{job_id})")
        }
    }
    println!("waiting:  {}", queue.count(JobState::Waiting));
    Ok(())
}
