//! Raw data export (`GET /o/export/*`).

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::handlers::sub_action;
use serde_json::json;

pub fn run(ctx: &mut RequestContext) {
    let collection = sub_action(&ctx.full_path).unwrap_or("events").to_string();
    ctx.coordinator.write(Reply::new(
        200,
        json!({
            "collection": collection,
            "app_id": ctx.app_id.clone().unwrap_or_default(),
            "data": [],
        }),
    ));
}
