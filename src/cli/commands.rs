use crate::dispatcher::{DispatchConfig, RequestDispatcher};
use crate::extensions::ExtensionBus;
use crate::registry::AppRegistry;
use crate::runtime_config::{BatchMode, RuntimeConfig};
use crate::server::{GateService, HttpServer};
use crate::supervisor::{self, link, WorkerSupervisor};
use crate::validator::KeyValidator;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::process::Command;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Handle used to swap the active log filter at runtime.
pub type LogReloadHandle =
    tracing_subscriber::reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Command-line interface for eventgate.
#[derive(Parser)]
#[command(name = "eventgate")]
#[command(about = "Analytics ingestion and query gateway", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor with its pool of worker processes
    Serve {
        /// Base HTTP port; worker slot n serves on port + n
        #[arg(short, long, env = "EVENTGATE_PORT")]
        port: Option<u16>,

        /// Number of worker processes (default: CPU core count)
        #[arg(short, long, env = "EVENTGATE_WORKERS")]
        workers: Option<usize>,

        /// Bulk response timing: eager or safe
        #[arg(long, env = "EVENTGATE_BATCH_PROCESSING")]
        batch_mode: Option<String>,

        /// Path prefix stripped before request classification
        #[arg(long, env = "EVENTGATE_ROOT_PATH")]
        root_path: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long, env = "EVENTGATE_REQUEST_TIMEOUT_SECS")]
        request_timeout: Option<u64>,
    },
    /// Run one worker process (spawned by the supervisor, not by hand)
    #[command(hide = true)]
    Worker {
        /// Pool slot index; determines the bound port
        #[arg(long)]
        slot: usize,
    },
}

/// Parse arguments and run the selected command.
pub fn run(reload: LogReloadHandle) -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            workers,
            batch_mode,
            root_path,
            request_timeout,
        } => {
            let mut config = RuntimeConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(workers) = workers {
                config.worker_count = workers;
            }
            if let Some(mode) = batch_mode {
                config.batch_mode = BatchMode::from_str(&mode)
                    .ok_or_else(|| anyhow!("invalid batch mode {mode:?}, expected eager or safe"))?;
            }
            if let Some(root_path) = root_path {
                config.root_path = root_path;
            }
            if let Some(secs) = request_timeout {
                config.request_timeout_secs = secs;
            }
            run_supervisor(&config, reload)
        }
        Commands::Worker { slot } => run_worker(slot, reload),
    }
}

/// Supervisor process: spawn the pool and relay control traffic until a
/// termination signal arrives.
fn run_supervisor(config: &RuntimeConfig, reload: LogReloadHandle) -> Result<()> {
    let bus = ExtensionBus::new();
    bus.dispatch("/master", None, &json!({ "workers": config.worker_count }));

    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let worker_env = [
        ("EVENTGATE_PORT", config.port.to_string()),
        ("EVENTGATE_STACK_SIZE", format!("{:#x}", config.stack_size)),
        (
            "EVENTGATE_REQUEST_TIMEOUT_SECS",
            config.request_timeout_secs.to_string(),
        ),
        ("EVENTGATE_ROOT_PATH", config.root_path.clone()),
        ("EVENTGATE_TOKEN_SECRET", config.token_secret.clone()),
        (
            "EVENTGATE_BATCH_PROCESSING",
            match config.batch_mode {
                BatchMode::Eager => "eager".to_string(),
                BatchMode::Safe => "safe".to_string(),
            },
        ),
    ];

    let mut supervisor = WorkerSupervisor::new(config.worker_count, move |slot| {
        let mut cmd = Command::new(&exe);
        cmd.arg("worker").arg("--slot").arg(slot.to_string());
        for (key, value) in &worker_env {
            cmd.env(key, value);
        }
        cmd
    });

    // A worker-raised log reconfiguration also applies to the supervisor's
    // own subscriber, not just the sibling workers it is relayed to.
    supervisor.on_log_config(move |config| apply_log_config(&reload, config));

    #[cfg(unix)]
    supervisor::watch_signals(supervisor.shutdown_handle())?;

    supervisor.spawn_all()?;
    info!(
        port = config.port,
        workers = config.worker_count,
        "supervisor running"
    );
    supervisor.run();
    Ok(())
}

/// Worker process: serve HTTP on the slot's port and follow the control pipe.
fn run_worker(slot: usize, reload: LogReloadHandle) -> Result<()> {
    let config = RuntimeConfig::from_env();
    // One scheduler thread per worker process; concurrency comes from the
    // process pool, coroutines only interleave I/O within it.
    may::config()
        .set_workers(1)
        .set_stack_size(config.stack_size);

    let bus = Arc::new(ExtensionBus::new());
    let registry = Arc::new(RwLock::new(AppRegistry::new()));
    let validator = Arc::new(KeyValidator::new(Arc::clone(&registry)));
    let dispatcher = Arc::new(RequestDispatcher::new(
        Arc::clone(&bus),
        validator,
        registry,
        DispatchConfig::from_runtime(&config),
    ));

    bus.dispatch("/worker", None, &json!({ "slot": slot }));
    link::start_listener(Arc::clone(&bus), move |config| {
        apply_log_config(&reload, &config);
    });

    let port = u16::try_from(slot)
        .ok()
        .and_then(|offset| config.port.checked_add(offset))
        .ok_or_else(|| anyhow!("slot {slot} overflows the port range"))?;
    let service = GateService::new(dispatcher, Duration::from_secs(config.request_timeout_secs));
    let handle = HttpServer(service)
        .start(("0.0.0.0", port))
        .with_context(|| format!("failed to bind port {port}"))?;
    handle.wait_ready()?;
    info!(slot, port, pid = std::process::id(), "worker serving");

    handle
        .join()
        .map_err(|_| anyhow!("worker server coroutine panicked"))
}

/// Apply a supervisor-relayed logging reconfiguration. The `default` field
/// carries an env-filter directive string.
fn apply_log_config(reload: &LogReloadHandle, config: &Value) {
    let Some(directive) = config.get("default").and_then(Value::as_str) else {
        warn!("log config without a \"default\" directive, ignoring");
        return;
    };
    match EnvFilter::try_new(directive) {
        Ok(filter) => {
            if let Err(err) = reload.reload(filter) {
                warn!(%err, "failed to swap log filter");
            } else {
                info!(directive, "log filter updated");
            }
        }
        Err(err) => warn!(directive, %err, "invalid log directive"),
    }
}
