//! Environment-variable runtime configuration.
//!
//! Everything here is a tunable with a sensible default; the CLI flags in
//! [`crate::cli`] override the env where both exist.
//!
//! - `EVENTGATE_STACK_SIZE`: coroutine stack size, decimal or `0x` hex
//!   (default `0x10000`, 64 KB)
//! - `EVENTGATE_WORKERS`: worker process count (default: available CPU cores)
//! - `EVENTGATE_PORT`: base HTTP port (default 3001); worker slot `n` binds
//!   `port + n`
//! - `EVENTGATE_BATCH_PROCESSING`: `eager` or `safe` (default `eager`)
//! - `EVENTGATE_REQUEST_TIMEOUT_SECS`: per-connection timeout (default 120)
//! - `EVENTGATE_ROOT_PATH`: path prefix stripped before classification
//! - `EVENTGATE_TOKEN_SECRET`: HS256 secret for `/o/token`

use std::env;

/// When the bulk pipeline answers the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Answer "batch accepted" immediately, process sub-requests behind it.
    #[default]
    Eager,
    /// Defer the success response until every sub-request has drained.
    Safe,
}

impl BatchMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "eager" => Some(Self::Eager),
            "safe" => Some(Self::Safe),
            _ => None,
        }
    }
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Stack size for request coroutines in bytes.
    pub stack_size: usize,
    /// Number of worker processes the supervisor keeps alive.
    pub worker_count: usize,
    /// Base port; worker slot `n` serves on `port + n`.
    pub port: u16,
    pub batch_mode: BatchMode,
    /// Per-connection timeout in seconds.
    pub request_timeout_secs: u64,
    /// Prefix stripped from every request path before classification.
    pub root_path: String,
    /// Signing secret for issued auth tokens.
    pub token_secret: String,
}

fn parse_size(val: &str) -> Option<usize> {
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var("EVENTGATE_STACK_SIZE")
            .ok()
            .and_then(|s| parse_size(&s))
            .unwrap_or(0x10000);

        let worker_count = env::var("EVENTGATE_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or_else(default_worker_count);

        let port = env::var("EVENTGATE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        let batch_mode = env::var("EVENTGATE_BATCH_PROCESSING")
            .ok()
            .and_then(|s| BatchMode::from_str(&s))
            .unwrap_or_default();

        let request_timeout_secs = env::var("EVENTGATE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        let root_path = env::var("EVENTGATE_ROOT_PATH").unwrap_or_default();

        let token_secret =
            env::var("EVENTGATE_TOKEN_SECRET").unwrap_or_else(|_| "eventgate-dev-secret".to_string());

        Self {
            stack_size,
            worker_count,
            port,
            batch_mode,
            request_timeout_secs,
            root_path,
            token_secret,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: 0x10000,
            worker_count: default_worker_count(),
            port: 3001,
            batch_mode: BatchMode::Eager,
            request_timeout_secs: 120,
            root_path: String::new(),
            token_secret: "eventgate-dev-secret".to_string(),
        }
    }
}
