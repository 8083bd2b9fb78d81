//! # Dispatcher Module
//!
//! Per-request classification and routing: each inbound request is parsed
//! into a [`crate::context::RequestContext`], threaded through the extension
//! interception points, and routed by its two-segment `api_path` to a
//! terminal handler (or rejected fail-fast).
//!
//! ## Request Flow
//!
//! 1. `GateService` parses the raw HTTP request and builds the context
//! 2. The `/` extension point fires with the full routing metadata; any
//!    listener may set `cancel_request`
//! 3. The `api_path` is matched against the fixed endpoint table
//! 4. Write endpoints pass through the app-key validator, read endpoints
//!    through the lighter user-privilege variants
//! 5. An unmatched path is offered to extensions by `api_path`, then by
//!    `full_path`, and only then answered `400 Invalid path`
//!
//! The dispatcher never talks to storage; the registry seam and the
//! validator are its only collaborators.

mod core;

pub use core::{classify_path, DispatchConfig, EndpointKind, RequestDispatcher};
