//! App management (`/i/apps/{create|update|delete}`), global-admin gated.

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::handlers::sub_action;
use crate::registry::{is_valid_app_id, new_object_id, App, AppRegistry};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tracing::info;

pub fn run(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    match sub_action(&ctx.full_path) {
        Some("create") => create(registry, ctx),
        Some("update") => update(registry, ctx),
        Some("delete") => delete(registry, ctx),
        _ => ctx.coordinator.write_message(400, "Invalid path"),
    }
}

fn parse_args(ctx: &mut RequestContext) -> Option<Value> {
    match ctx.param_json("args") {
        Ok(Some(args @ Value::Object(_))) => Some(args),
        Ok(None) | Ok(Some(_)) | Err(_) => {
            ctx.coordinator
                .write_message(400, "Invalid parameter \"args\"");
            None
        }
    }
}

fn require_app_id(ctx: &mut RequestContext) -> Option<String> {
    match ctx.param_str("app_id") {
        Some(id) if is_valid_app_id(&id) => Some(id),
        Some(_) => {
            ctx.coordinator
                .write_message(400, "Invalid parameter \"app_id\"");
            None
        }
        None => {
            ctx.coordinator
                .write_message(400, "Missing parameter \"app_id\"");
            None
        }
    }
}

fn create(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(args) = parse_args(ctx) else { return };
    let Some(name) = args.get("name").and_then(|v| v.as_str()) else {
        ctx.coordinator
            .write_message(400, "Missing parameter \"name\"");
        return;
    };
    let id = new_object_id();
    let app = App {
        id: id.clone(),
        key: args
            .get("key")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(new_object_id),
        name: name.to_string(),
        country: args
            .get("country")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        timezone: args
            .get("timezone")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    };
    let mut guard = registry.write().unwrap();
    guard.insert_app(app.clone());
    info!(app_id = %id, name = %app.name, apps = guard.app_count(), "app created");
    drop(guard);
    ctx.coordinator.write(Reply::new(200, json!(app)));
}

fn update(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(app_id) = require_app_id(ctx) else { return };
    let Some(args) = parse_args(ctx) else { return };
    let mut guard = registry.write().unwrap();
    let Some(mut app) = guard.app_by_id(&app_id).cloned() else {
        ctx.coordinator.write_message(400, "App does not exist");
        return;
    };
    if let Some(name) = args.get("name").and_then(|v| v.as_str()) {
        app.name = name.to_string();
    }
    if let Some(country) = args.get("country").and_then(|v| v.as_str()) {
        app.country = Some(country.to_string());
    }
    if let Some(timezone) = args.get("timezone").and_then(|v| v.as_str()) {
        app.timezone = Some(timezone.to_string());
    }
    guard.insert_app(app.clone());
    drop(guard);
    ctx.coordinator.write(Reply::new(200, json!(app)));
}

fn delete(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(app_id) = require_app_id(ctx) else { return };
    let mut guard = registry.write().unwrap();
    let removed = guard.remove_app(&app_id);
    match removed {
        Some(app) => {
            info!(app_id = %app.id, apps = guard.app_count(), "app deleted");
            drop(guard);
            ctx.coordinator.write_message(200, "Success");
        }
        None => {
            drop(guard);
            ctx.coordinator.write_message(400, "App does not exist");
        }
    }
}
