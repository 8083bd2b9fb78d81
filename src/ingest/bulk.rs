//! Bulk ingestion pipeline (`POST /i/bulk`).
//!
//! One HTTP request carries a JSON-encoded array of sub-request field
//! mappings. Sub-requests are processed strictly in array order, one at a
//! time, with every asynchronous operation registered by index `i` settled
//! before index `i + 1` starts. The shared [`ResponseCoordinator`] buffers
//! all sub-request writes so the batch resolves to exactly one terminal
//! response, written eagerly ("batch accepted") or after the drain in safe
//! mode.
//!
//! [`ResponseCoordinator`]: crate::coordinator::ResponseCoordinator

use crate::context::RequestContext;
use crate::dispatcher::RequestDispatcher;
use crate::ids;
use crate::runtime_config::BatchMode;
use serde_json::{Map, Value};
use tracing::{debug, info};

fn field_str(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decompose and drive one bulk batch.
pub fn process(dispatcher: &RequestDispatcher, ctx: &mut RequestContext) {
    ctx.bulk = true;

    let items = match ctx.param_json("requests") {
        Ok(None) => {
            ctx.coordinator
                .write_message(400, "Missing parameter \"requests\"");
            return;
        }
        Ok(Some(Value::Array(items))) => items,
        Ok(Some(_)) | Err(_) => {
            ctx.coordinator
                .write_message(400, "Invalid parameter \"requests\"");
            return;
        }
    };

    let shared_app_key = ctx.param_str("app_key");

    // Eager mode answers "batch accepted" before any sub-processing; the
    // buffering below then swallows every per-item write attempt.
    if dispatcher.config.batch_mode != BatchMode::Safe {
        ctx.coordinator.write_message(200, "Success");
    }
    ctx.coordinator.block_responses();

    info!(
        request_id = %ctx.request_id,
        batch_size = items.len(),
        mode = ?dispatcher.config.batch_mode,
        "bulk batch accepted"
    );

    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(fields) = item else {
            debug!(index, "skipping non-object bulk item");
            continue;
        };
        let app_key = field_str(&fields, "app_key").or_else(|| shared_app_key.clone());
        let device_id = field_str(&fields, "device_id");
        let (Some(app_key), Some(device_id)) = (app_key, device_id) else {
            // Items without a resolvable identity are skipped, not errored.
            debug!(index, "skipping bulk item without app_key or device_id");
            continue;
        };

        let mut sub = RequestContext::sub_request(ctx, fields, &app_key, &device_id);
        sub.app_user_id = Some(ids::app_user_id(&app_key, &device_id));

        if dispatcher.validator.validate_app_for_write_api(&mut sub).granted() {
            dispatcher
                .bus
                .dispatch("/sdk/end", Some(&mut sub), &Value::Null);
        }

        // Strict sequential settlement: nothing from index i+1 starts until
        // all of index i's registered operations have settled.
        sub.pending.drain();
    }

    if dispatcher.config.batch_mode == BatchMode::Safe {
        ctx.coordinator.write_message(200, "Success");
    }
    ctx.coordinator.unblock_responses();
}
