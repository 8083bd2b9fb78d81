//! Long-running report task management (`/i/tasks/*`).
//!
//! Only the trigger/bookkeeping surface lives here; scheduling internals are
//! an external collaborator.

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::handlers::sub_action;
use crate::registry::new_object_id;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type TaskStore = Arc<RwLock<HashMap<String, Value>>>;

pub fn run(tasks: &TaskStore, ctx: &mut RequestContext) {
    match sub_action(&ctx.full_path) {
        Some("create") => {
            let id = new_object_id();
            let request = ctx
                .param_json("args")
                .ok()
                .flatten()
                .unwrap_or(Value::Null);
            tasks.write().unwrap().insert(
                id.clone(),
                json!({ "_id": id, "status": "running", "request": request }),
            );
            ctx.coordinator
                .write(Reply::new(200, json!({ "result": "Success", "task_id": id })));
        }
        Some("update") => {
            let Some(task_id) = ctx.param_str("task_id") else {
                ctx.coordinator
                    .write_message(400, "Missing parameter \"task_id\"");
                return;
            };
            let mut guard = tasks.write().unwrap();
            match guard.get_mut(&task_id) {
                Some(task) => {
                    if let Some(status) = ctx.param_str("status") {
                        task["status"] = Value::String(status);
                    }
                    ctx.coordinator.write_message(200, "Success");
                }
                None => ctx.coordinator.write_message(400, "Task does not exist"),
            }
        }
        Some("delete") => {
            let Some(task_id) = ctx.param_str("task_id") else {
                ctx.coordinator
                    .write_message(400, "Missing parameter \"task_id\"");
                return;
            };
            match tasks.write().unwrap().remove(&task_id) {
                Some(_) => ctx.coordinator.write_message(200, "Success"),
                None => ctx.coordinator.write_message(400, "Task does not exist"),
            }
        }
        Some("reset") => {
            tasks.write().unwrap().clear();
            ctx.coordinator.write_message(200, "Success");
        }
        _ => ctx.coordinator.write_message(400, "Invalid path"),
    }
}
