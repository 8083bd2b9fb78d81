//! # eventgate
//!
//! Multi-process HTTP front door for an analytics platform: SDK ingestion
//! (`/i`, `/i/bulk`), query and reporting reads (`/o/*`), and entity
//! management (`/i/apps`, `/i/users`, `/i/tasks`).
//!
//! ## Architecture
//!
//! A supervisor process keeps a fixed pool of worker processes alive, one
//! HTTP listener per pool slot, and relays control messages between them
//! ([`supervisor`]). Inside each worker, every connection is a may coroutine:
//! the service parses the request, classifies its path by the first two
//! segments ([`dispatcher`]), and hands a [`context::RequestContext`] to the
//! dispatcher on a fresh coroutine while the connection blocks on the
//! [`coordinator::ResponseCoordinator`] for the single terminal reply.
//!
//! The coordinator's at-most-once write gate is what makes the rest of the
//! pipeline composable: bulk batches ([`ingest::bulk`]) fan one request into
//! ordered sub-requests that all share the parent's coordinator, the timeout
//! timer races handlers without double-answering, and extension listeners
//! ([`extensions`]) can claim a request outright.

pub mod cli;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod extensions;
pub mod handlers;
pub mod ids;
pub mod ingest;
pub mod registry;
pub mod runtime_config;
pub mod server;
pub mod supervisor;
pub mod validator;

pub use context::RequestContext;
pub use coordinator::{Reply, ResponseCoordinator};
pub use dispatcher::RequestDispatcher;
pub use extensions::{ExtensionBus, ExtensionListener};
pub use ids::RequestId;
pub use runtime_config::{BatchMode, RuntimeConfig};
pub use validator::{KeyValidator, Privilege, Validation, Validator};
