//! Named-event extension bus.
//!
//! Interception points throughout the pipeline dispatch named events to
//! registered listeners: `/master` and `/worker` at startup, `/` before
//! classification, the unmatched `api_path`/`full_path` hooks, `/sdk` around
//! ingestion and `/sdk/end` at ingest completion, plus supervisor broadcasts.
//! Listeners for an event run in registration order and iteration stops at
//! the first one that claims the event.

use crate::context::RequestContext;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A pluggable interception point collaborator.
///
/// `ctx` is present for request-scoped events and absent for process-scoped
/// ones (startup roles, cross-worker broadcasts). Returning `true` claims the
/// event and stops iteration.
pub trait ExtensionListener: Send + Sync {
    fn on_event(&self, event: &str, ctx: Option<&mut RequestContext>, data: &Value) -> bool;
}

type Registration = (String, Arc<dyn ExtensionListener>);

/// Registry of listeners keyed by event name, iterated in registration order.
#[derive(Default)]
pub struct ExtensionBus {
    listeners: RwLock<Vec<Registration>>,
}

impl ExtensionBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event: &str, listener: Arc<dyn ExtensionListener>) {
        self.listeners
            .write()
            .unwrap()
            .push((event.to_string(), listener));
        debug!(
            event = %event,
            listeners = self.listener_count(event),
            "extension listener registered"
        );
    }

    /// Dispatch `event` to its listeners. Returns whether any listener
    /// claimed it.
    pub fn dispatch(&self, event: &str, mut ctx: Option<&mut RequestContext>, data: &Value) -> bool {
        let listeners: Vec<Arc<dyn ExtensionListener>> = {
            let guard = self.listeners.read().unwrap();
            guard
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in listeners {
            if listener.on_event(event, ctx.as_deref_mut(), data) {
                debug!(event = %event, "extension claimed event");
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}
