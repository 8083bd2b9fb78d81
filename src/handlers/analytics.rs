//! Dashboard analytics reads (`GET /o/analytics/*`).

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::handlers::sub_action;
use serde_json::json;

pub fn run(ctx: &mut RequestContext) {
    let view = sub_action(&ctx.full_path).unwrap_or("dashboard").to_string();
    let app_id = ctx.app_id.clone().unwrap_or_default();
    match view.as_str() {
        "dashboard" => ctx.coordinator.write(Reply::new(
            200,
            json!({
                "_id": app_id,
                "30days": [],
                "7days": [],
                "today": [],
            }),
        )),
        "top" | "countries" | "sessions" => ctx
            .coordinator
            .write(Reply::new(200, json!({ "_id": app_id, "data": [] }))),
        _ => ctx.coordinator.write_message(400, "Invalid path"),
    }
}
