//! # Ingestion Module
//!
//! Device-originated event submission: the single-ingest endpoint (`/i`) and
//! the bulk pipeline (`/i/bulk`) that fans one HTTP request out into many
//! logically independent sub-requests while coordinating exactly one terminal
//! response for the whole batch.

pub mod bulk;
pub mod single;
