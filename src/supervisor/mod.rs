//! Multi-process worker supervision and the control plane between processes.
//!
//! The supervisor process owns no HTTP state; it keeps the pool of worker
//! processes at its configured size and relays [`control::ControlMessage`]s
//! between them. [`link`] is the worker-side end of the same pipes.

pub mod control;
pub mod link;
mod supervisor;

pub use control::{relay_target, ControlMessage, RelayTarget};
pub use supervisor::{SupervisorEvent, WorkerSupervisor};

#[cfg(unix)]
pub use supervisor::watch_signals;
