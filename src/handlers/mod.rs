//! Terminal endpoint handlers.
//!
//! Thin glue between the dispatcher and the response coordinator: every
//! handler receives an already-classified, already-validated context and
//! writes exactly one reply through it. Analytics computation itself is an
//! external collaborator; the query handlers answer with the aggregate
//! document skeletons the dashboard expects.

pub mod analytics;
pub mod apps;
pub mod export;
pub mod ping;
pub mod query;
pub mod tasks;
pub mod token;
pub mod users;

/// Third path segment, the management sub-action (`create`, `update`, ...).
#[must_use]
pub fn sub_action(full_path: &str) -> Option<&str> {
    full_path.split('/').filter(|s| !s.is_empty()).nth(2)
}
