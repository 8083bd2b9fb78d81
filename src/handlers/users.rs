//! Member management (`/i/users/{create|update|delete}`), global-admin gated.

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::handlers::sub_action;
use crate::registry::{new_object_id, AppRegistry, Member};
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

fn app_access(args: &Value) -> Vec<String> {
    args.get("app_access")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn create(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(args) = parse_args(ctx) else { return };
    let member = Member {
        id: new_object_id(),
        api_key: args
            .get("api_key")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(new_object_id),
        global_admin: args
            .get("global_admin")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        app_access: app_access(&args),
    };
    registry.write().unwrap().insert_member(member.clone());
    info!(member_id = %member.id, "member created");
    ctx.coordinator.write(Reply::new(200, json!(member)));
}

fn update(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(args) = parse_args(ctx) else { return };
    let Some(api_key) = args.get("api_key").and_then(|v| v.as_str()) else {
        ctx.coordinator
            .write_message(400, "Missing parameter \"api_key\"");
        return;
    };
    let mut guard = registry.write().unwrap();
    let Some(mut member) = guard.member_by_api_key(api_key).cloned() else {
        ctx.coordinator.write_message(400, "User does not exist");
        return;
    };
    if let Some(global_admin) = args.get("global_admin").and_then(|v| v.as_bool()) {
        member.global_admin = global_admin;
    }
    if args.get("app_access").is_some() {
        member.app_access = app_access(&args);
    }
    guard.insert_member(member.clone());
    drop(guard);
    ctx.coordinator.write(Reply::new(200, json!(member)));
}

fn delete(registry: &Arc<RwLock<AppRegistry>>, ctx: &mut RequestContext) {
    let Some(args) = parse_args(ctx) else { return };
    let Some(api_key) = args.get("api_key").and_then(|v| v.as_str()) else {
        ctx.coordinator
            .write_message(400, "Missing parameter \"api_key\"");
        return;
    };
    match registry.write().unwrap().remove_member(api_key) {
        Some(member) => {
            info!(member_id = %member.id, "member deleted");
            ctx.coordinator.write_message(200, "Success");
        }
        None => ctx.coordinator.write_message(400, "User does not exist"),
    }
}
