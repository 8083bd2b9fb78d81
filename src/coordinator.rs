//! Terminal-response coordination.
//!
//! Every request context shares one [`ResponseCoordinator`]. Many logically
//! concurrent completions (validators, extension hooks, bulk sub-requests,
//! the connection timeout timer) may all try to answer the same HTTP request;
//! the coordinator guarantees that exactly one terminal write reaches the
//! connection, and supports a buffering mode so a whole bulk batch resolves
//! to a single response.

use may::sync::mpsc;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A terminal HTTP response produced by the dispatch pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
    /// Extra headers beyond Content-Type (name, value).
    pub headers: Vec<(String, String)>,
}

impl Reply {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: Vec::new(),
        }
    }

    /// Conventional `{"result": ...}` message body used by every endpoint.
    #[must_use]
    pub fn message(status: u16, message: &str) -> Self {
        Self::new(status, serde_json::json!({ "result": message }))
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    answered: bool,
    blocked: bool,
    buffered: Option<Reply>,
}

/// At-most-once response writer shared across all completions of one request.
///
/// The terminal write is delivered over a channel rather than performed
/// in-place so the connection coroutine can answer the client while a bulk
/// pipeline keeps processing behind it (eager mode).
#[derive(Clone)]
pub struct ResponseCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    tx: mpsc::Sender<Reply>,
}

impl ResponseCoordinator {
    /// Create a coordinator plus the receiving end the connection waits on.
    pub fn channel() -> (Self, mpsc::Receiver<Reply>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                state: Arc::new(Mutex::new(CoordinatorState::default())),
                tx,
            },
            rx,
        )
    }

    /// Perform the terminal write. A second call on an answered context is a
    /// no-op; while buffering is active the write is recorded instead of sent.
    pub fn write(&self, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        if state.answered {
            debug!(status = reply.status, "response already written, dropping");
            return;
        }
        if state.blocked {
            // Last write wins; unblock flushes at most the most recent one.
            state.buffered = Some(reply);
            return;
        }
        state.answered = true;
        drop(state);
        // Receiver gone means the connection already timed out or closed.
        let _ = self.tx.send(reply);
    }

    /// Shorthand for the conventional `{"result": ...}` write.
    pub fn write_message(&self, status: u16, message: &str) {
        self.write(Reply::message(status, message));
    }

    /// Terminal write that ignores buffering mode. Used by the connection
    /// timeout: a batch that has blocked responses must not be able to hold
    /// the client past the deadline. Still at most once.
    pub fn write_now(&self, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        if state.answered {
            debug!(status = reply.status, "response already written, dropping");
            return;
        }
        state.answered = true;
        state.buffered = None;
        drop(state);
        let _ = self.tx.send(reply);
    }

    /// Enter buffering mode: subsequent writes are recorded, not flushed.
    pub fn block_responses(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.answered {
            state.blocked = true;
        }
    }

    /// Leave buffering mode, flushing at most the most recent recorded write.
    pub fn unblock_responses(&self) {
        let mut state = self.state.lock().unwrap();
        state.blocked = false;
        if state.answered {
            state.buffered = None;
            return;
        }
        if let Some(reply) = state.buffered.take() {
            state.answered = true;
            drop(state);
            let _ = self.tx.send(reply);
        }
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.state.lock().unwrap().answered
    }
}
