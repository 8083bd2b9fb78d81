//! Single-event ingest (`POST/GET /i`).

use crate::context::RequestContext;
use crate::dispatcher::RequestDispatcher;
use crate::ids;
use serde_json::Value;
use tracing::{debug, info};

/// Process one device submission. Requires `app_key` and `device_id`;
/// everything else is payload for the processing extension point.
pub fn process(dispatcher: &RequestDispatcher, ctx: &mut RequestContext) {
    let (Some(app_key), Some(device_id)) = (ctx.param_str("app_key"), ctx.param_str("device_id"))
    else {
        ctx.coordinator
            .write_message(400, "Missing parameter \"app_key\" or \"device_id\"");
        return;
    };

    ctx.app_user_id = Some(ids::app_user_id(&app_key, &device_id));

    // SDK interception point; a listener may cancel the request here.
    dispatcher.bus.dispatch("/sdk", Some(ctx), &Value::Null);
    if let Some(reason) = ctx.cancel_request.take() {
        info!(request_id = %ctx.request_id, reason = %reason, "ingest cancelled at /sdk");
        ctx.coordinator
            .write_message(400, &format!("Request cancelled: {reason}"));
        return;
    }

    if dispatcher.validator.validate_app_for_write_api(ctx).granted() {
        dispatcher.bus.dispatch("/sdk/end", Some(ctx), &Value::Null);
        ctx.coordinator.write_message(200, "Success");
        debug!(
            request_id = %ctx.request_id,
            app_user_id = ctx.app_user_id.as_deref().unwrap_or(""),
            "single ingest accepted"
        );
    }

    // Settle whatever the processing hooks registered before the context
    // goes away; failures are logged inside drain.
    ctx.pending.drain();
}
