//! Worker-side end of the control plane.
//!
//! Inside a worker process, stdin carries control messages from the
//! supervisor and stdout carries messages back up. Everything else (HTTP,
//! logs) stays off these two pipes.

use crate::extensions::ExtensionBus;
use crate::supervisor::control::ControlMessage;
use anyhow::Result;
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Send one control message up to the supervisor.
pub fn send(message: &ControlMessage) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.flush()?;
    Ok(())
}

/// Consume control messages from stdin until the supervisor closes the pipe.
///
/// Broadcasts are re-raised on the worker's extension bus under their event
/// name. Log reconfiguration goes to `on_log_config`. Stdin EOF means the
/// supervisor is gone, so the worker exits.
pub fn start_listener(
    bus: Arc<ExtensionBus>,
    on_log_config: impl Fn(Value) + Send + 'static,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let message = match serde_json::from_str::<ControlMessage>(&line) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "discarding malformed control line");
                    continue;
                }
            };
            apply(&bus, &on_log_config, message);
        }
        info!("control pipe closed, worker exiting");
        std::process::exit(0);
    })
}

fn apply(bus: &ExtensionBus, on_log_config: &impl Fn(Value), message: ControlMessage) {
    match message {
        ControlMessage::LogConfig { config } => {
            info!("applying logging reconfiguration");
            on_log_config(config);
        }
        ControlMessage::Broadcast { event, data } => {
            if event.is_empty() {
                debug!("ignoring empty broadcast");
            } else {
                bus.dispatch(&event, None, &data);
            }
        }
        // Plugin lifecycle commands are supervisor-local; a worker receiving
        // one has nothing to do.
        other => debug!(?other, "ignoring supervisor-only command"),
    }
}
