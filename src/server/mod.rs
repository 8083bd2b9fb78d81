//! Worker HTTP front end: request parsing, the per-connection service, and
//! the may_minihttp server wrapper.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, ParsedRequest};
pub use response::{write_json_error, write_reply};
pub use service::GateService;
