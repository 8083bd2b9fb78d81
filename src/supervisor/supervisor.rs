//! Worker pool supervision: spawn N worker processes, relay control messages
//! between them, and replace any worker that exits for any reason.
//!
//! Each worker is a child OS process bound to its own port slot. The
//! supervisor never parses HTTP; its only jobs are pool-size maintenance and
//! control-plane fan-out.

use crate::supervisor::control::{relay_target, ControlMessage, RelayTarget};
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Something a monitor thread observed about one worker.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A control message arrived on the worker's stdout.
    Message { slot: usize, message: ControlMessage },
    /// The worker exited; the slot is now vacant.
    Exited { slot: usize, code: Option<i32> },
}

struct WorkerRecord {
    pid: u32,
    stdin: ChildStdin,
    child: Arc<Mutex<Child>>,
}

/// Maintains a fixed-size pool of worker processes.
///
/// The factory closure builds the `Command` for a given slot, so tests can
/// substitute arbitrary child programs for the real worker re-exec.
pub struct WorkerSupervisor {
    factory: Box<dyn Fn(usize) -> Command + Send>,
    slots: Vec<Option<WorkerRecord>>,
    events_tx: Sender<SupervisorEvent>,
    events_rx: Receiver<SupervisorEvent>,
    total_forked: u64,
    plugin_sync: bool,
    log_config: Option<Value>,
    log_hook: Option<Box<dyn Fn(&Value) + Send>>,
    shutting_down: Arc<AtomicBool>,
}

impl WorkerSupervisor {
    pub fn new<F>(worker_count: usize, factory: F) -> Self
    where
        F: Fn(usize) -> Command + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel();
        let mut slots = Vec::with_capacity(worker_count);
        slots.resize_with(worker_count, || None);
        Self {
            factory: Box::new(factory),
            slots,
            events_tx,
            events_rx,
            total_forked: 0,
            plugin_sync: false,
            log_config: None,
            log_hook: None,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the callback that applies a relayed logging reconfiguration to
    /// this process's own subscriber.
    pub fn on_log_config<F>(&mut self, hook: F)
    where
        F: Fn(&Value) + Send + 'static,
    {
        self.log_hook = Some(Box::new(hook));
    }

    /// Shared flag a signal handler can set to stop the run loop.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutting_down)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Lifetime spawn count, including replacements.
    #[must_use]
    pub fn total_forked(&self) -> u64 {
        self.total_forked
    }

    #[must_use]
    pub fn log_config(&self) -> Option<&Value> {
        self.log_config.as_ref()
    }

    /// Fill every vacant slot. Called once at startup.
    pub fn spawn_all(&mut self) -> Result<()> {
        for slot in 0..self.slots.len() {
            if self.slots[slot].is_none() {
                self.spawn_slot(slot)?;
            }
        }
        info!(workers = self.slots.len(), "worker pool started");
        Ok(())
    }

    fn spawn_slot(&mut self, slot: usize) -> Result<()> {
        let mut command = (self.factory)(slot);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn worker for slot {slot}"))?;
        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .context("worker child has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("worker child has no stdout pipe")?;
        let child = Arc::new(Mutex::new(child));
        self.monitor(slot, Arc::clone(&child), stdout);
        self.slots[slot] = Some(WorkerRecord { pid, stdin, child });
        self.total_forked += 1;
        info!(slot, pid, "worker spawned");
        Ok(())
    }

    /// One monitor thread per worker: stream control messages off the child's
    /// stdout, then report the exit once the pipe closes.
    fn monitor(
        &self,
        slot: usize,
        child: Arc<Mutex<Child>>,
        stdout: std::process::ChildStdout,
    ) {
        let events_tx = self.events_tx.clone();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ControlMessage>(&line) {
                    Ok(message) => {
                        if events_tx
                            .send(SupervisorEvent::Message { slot, message })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(slot, %err, "discarding malformed control line");
                    }
                }
            }
            // Pipe closed: reap the child so the slot can be refilled.
            let code = child
                .lock()
                .unwrap()
                .wait()
                .ok()
                .and_then(|status| status.code());
            let _ = events_tx.send(SupervisorEvent::Exited { slot, code });
        });
    }

    /// Block up to `timeout` for one event and handle it. Returns the handled
    /// event, or `None` if the timeout elapsed.
    pub fn poll(&mut self, timeout: Duration) -> Option<SupervisorEvent> {
        let event = match self.events_rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        };
        match &event {
            SupervisorEvent::Message { slot, message } => {
                self.handle_message(*slot, message.clone());
            }
            SupervisorEvent::Exited { slot, code } => {
                let slot = *slot;
                self.slots[slot] = None;
                if self.shutting_down.load(Ordering::SeqCst) {
                    debug!(slot, "worker exited during shutdown");
                } else {
                    warn!(slot, ?code, "worker exited, respawning");
                    if let Err(err) = self.spawn_slot(slot) {
                        error!(slot, %err, "failed to respawn worker");
                    }
                }
            }
        }
        Some(event)
    }

    /// Apply and fan out one worker-originated control message.
    pub fn handle_message(&mut self, from_slot: usize, message: ControlMessage) {
        match relay_target(&message) {
            RelayTarget::AllExceptSender => {
                if let ControlMessage::LogConfig { config } = &message {
                    info!(slot = from_slot, "logging reconfigured");
                    if let Some(hook) = &self.log_hook {
                        hook(config);
                    }
                    self.log_config = Some(config.clone());
                }
                self.forward(&message, Some(from_slot));
            }
            RelayTarget::AllWorkers => self.forward(&message, None),
            RelayTarget::LocalOnly => match message {
                ControlMessage::PluginSyncStart => self.plugin_sync = true,
                ControlMessage::PluginSyncStop => self.plugin_sync = false,
                ControlMessage::PluginCheck => {
                    if self.plugin_sync {
                        debug!(slot = from_slot, "plugin check suppressed, sync in progress");
                    } else {
                        info!(slot = from_slot, "plugin check requested");
                    }
                }
                _ => {}
            },
            RelayTarget::Ignore => {
                debug!(slot = from_slot, "ignoring empty broadcast");
            }
        }
    }

    fn forward(&mut self, message: &ControlMessage, except: Option<usize>) {
        for slot in 0..self.slots.len() {
            if Some(slot) == except {
                continue;
            }
            if let Err(err) = self.send_to(slot, message) {
                warn!(slot, %err, "failed to relay control message");
            }
        }
    }

    /// Write one JSON line to the worker's stdin. Vacant slots are skipped.
    pub fn send_to(&mut self, slot: usize, message: &ControlMessage) -> Result<()> {
        let Some(record) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return Ok(());
        };
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        record
            .stdin
            .write_all(line.as_bytes())
            .with_context(|| format!("worker {slot} stdin closed"))?;
        record.stdin.flush()?;
        Ok(())
    }

    /// Event loop: relay messages and keep the pool full until the shutdown
    /// flag is raised, then tear the pool down.
    pub fn run(&mut self) {
        while !self.shutting_down.load(Ordering::SeqCst) {
            self.poll(Duration::from_millis(250));
        }
        self.shutdown();
    }

    /// Stop respawning and terminate every worker. Closing stdin asks the
    /// worker to exit; kill covers workers that stopped listening.
    pub fn shutdown(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!("shutting down worker pool");
        for slot in 0..self.slots.len() {
            if let Some(record) = self.slots[slot].take() {
                drop(record.stdin);
                if let Err(err) = record.child.lock().unwrap().kill() {
                    debug!(slot, pid = record.pid, %err, "worker already gone");
                }
                let _ = record.child.lock().unwrap().wait();
            }
        }
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        if self.active_count() > 0 {
            self.shutdown();
        }
    }
}

/// Raise the shutdown flag on SIGTERM or SIGINT.
#[cfg(unix)]
pub fn watch_signals(flag: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "termination signal received");
            flag.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sleeper(_slot: usize) -> Command {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        cmd
    }

    #[test]
    fn test_spawn_all_fills_every_slot() {
        let mut sup = WorkerSupervisor::new(3, sleeper);
        sup.spawn_all().unwrap();
        assert_eq!(sup.active_count(), 3);
        assert_eq!(sup.total_forked(), 3);
        sup.shutdown();
        assert_eq!(sup.active_count(), 0);
    }

    #[test]
    fn test_killed_worker_is_respawned_once() {
        let mut sup = WorkerSupervisor::new(2, sleeper);
        sup.spawn_all().unwrap();
        let victim_pid = sup.slots[1].as_ref().unwrap().pid;
        unsafe {
            libc::kill(victim_pid as i32, libc::SIGKILL);
        }

        // Wait for the exit event and the replacement it triggers.
        let mut respawned = false;
        for _ in 0..40 {
            if let Some(SupervisorEvent::Exited { slot, .. }) =
                sup.poll(Duration::from_millis(250))
            {
                assert_eq!(slot, 1);
                respawned = true;
                break;
            }
        }
        assert!(respawned, "supervisor never observed the worker exit");
        assert_eq!(sup.active_count(), 2);
        assert_eq!(sup.total_forked(), 3);
        assert_ne!(sup.slots[1].as_ref().unwrap().pid, victim_pid);
        sup.shutdown();
    }

    #[test]
    fn test_no_respawn_during_shutdown() {
        let mut sup = WorkerSupervisor::new(1, sleeper);
        sup.spawn_all().unwrap();
        sup.shutdown_handle().store(true, Ordering::SeqCst);
        let pid = sup.slots[0].as_ref().unwrap().pid;
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
        for _ in 0..40 {
            if let Some(SupervisorEvent::Exited { .. }) = sup.poll(Duration::from_millis(250)) {
                break;
            }
        }
        assert_eq!(sup.active_count(), 0);
        assert_eq!(sup.total_forked(), 1);
    }

    #[test]
    fn test_control_round_trip_through_pipes() {
        // cat echoes stdin back out, so a message sent to the worker comes
        // back to the supervisor as a worker-originated event.
        let mut sup = WorkerSupervisor::new(1, |_slot| Command::new("cat"));
        sup.spawn_all().unwrap();
        sup.send_to(0, &ControlMessage::PluginCheck).unwrap();

        let mut received = None;
        for _ in 0..40 {
            if let Some(SupervisorEvent::Message { slot, message }) =
                sup.poll(Duration::from_millis(250))
            {
                received = Some((slot, message));
                break;
            }
        }
        assert_eq!(received, Some((0, ControlMessage::PluginCheck)));
        sup.shutdown();
    }

    #[test]
    fn test_log_config_applied_locally() {
        let applied = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&applied);
        let mut sup = WorkerSupervisor::new(0, sleeper);
        sup.on_log_config(move |config| *sink.lock().unwrap() = Some(config.clone()));
        sup.handle_message(
            0,
            ControlMessage::LogConfig {
                config: json!({ "default": "warn" }),
            },
        );
        assert_eq!(sup.log_config(), Some(&json!({ "default": "warn" })));
        // The hook ran against the supervisor's own logging state.
        assert_eq!(*applied.lock().unwrap(), Some(json!({ "default": "warn" })));
    }

    #[test]
    fn test_plugin_sync_latch() {
        let mut sup = WorkerSupervisor::new(0, sleeper);
        sup.handle_message(0, ControlMessage::PluginSyncStart);
        assert!(sup.plugin_sync);
        sup.handle_message(0, ControlMessage::PluginCheck);
        assert!(sup.plugin_sync);
        sup.handle_message(0, ControlMessage::PluginSyncStop);
        assert!(!sup.plugin_sync);
    }

    #[test]
    fn test_send_to_vacant_slot_is_noop() {
        let mut sup = WorkerSupervisor::new(2, sleeper);
        // No spawn: every slot vacant.
        assert!(sup.send_to(1, &ControlMessage::PluginCheck).is_ok());
    }
}
