//! Analytics query endpoint (`GET /o?method=...`).
//!
//! Aggregation itself is computed by an external collaborator; these
//! handlers answer with the aggregate document skeleton for the selected
//! method so the dashboard contract holds without a storage layer.

use crate::context::RequestContext;
use crate::coordinator::Reply;
use serde_json::json;

const METHODS: &[&str] = &[
    "sessions",
    "users",
    "events",
    "locations",
    "devices",
    "device_details",
    "carriers",
    "app_versions",
];

pub fn run(method: &str, ctx: &mut RequestContext) {
    if !METHODS.contains(&method) {
        ctx.coordinator.write_message(400, "Invalid method");
        return;
    }
    let app_id = ctx.app_id.clone().unwrap_or_default();
    ctx.coordinator.write(Reply::new(
        200,
        json!({
            "_id": app_id,
            "method": method,
            "meta": {},
        }),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_methods() {
        assert!(METHODS.contains(&"sessions"));
        assert!(METHODS.contains(&"events"));
        assert!(!METHODS.contains(&"drop_tables"));
    }
}
