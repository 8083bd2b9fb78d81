//! Per-request state threaded through the dispatch pipeline.

use crate::coordinator::ResponseCoordinator;
use crate::ids::RequestId;
use crate::registry::{App, Member};
use http::Method;
use may::coroutine;
use may::sync::mpsc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{error, warn};

/// Ordered list of in-flight asynchronous operations registered for one
/// request (or one bulk sub-request). The bulk pipeline drains the list fully
/// before advancing to the next sub-request; a rejected operation is logged
/// and treated as settled.
#[derive(Default)]
pub struct PendingOps {
    ops: Vec<(String, mpsc::Receiver<anyhow::Result<()>>)>,
}

impl PendingOps {
    /// Register an already-running operation by its completion channel.
    pub fn track(&mut self, label: &str, rx: mpsc::Receiver<anyhow::Result<()>>) {
        self.ops.push((label.to_string(), rx));
    }

    /// Spawn `op` on its own coroutine and track its completion.
    pub fn run<F>(&mut self, label: &str, stack_size: usize, op: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may
        // runtime. The operation is Send + 'static and reports its outcome
        // through the channel, never by unwinding across the spawn boundary.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    let _ = tx.send(op());
                })
        };
        match spawn_result {
            Ok(_) => self.track(label, rx),
            Err(e) => error!(label = %label, error = %e, "failed to spawn pending operation"),
        }
    }

    /// Wait for every tracked operation, in registration order. Failures are
    /// logged and treated as settled; the batch never aborts on one of them.
    pub fn drain(&mut self) {
        for (label, rx) in self.ops.drain(..) {
            match rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(label = %label, error = %e, "pending operation rejected, treating as settled");
                }
                Err(_) => {
                    warn!(label = %label, "pending operation dropped its completion channel");
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// One inbound HTTP request, or one synthetic sub-request of a bulk batch.
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    /// Full path with the configured root prefix stripped.
    pub full_path: String,
    /// First two path segments; the routing key.
    pub api_path: String,
    /// Merged query-string and JSON-body fields, string keyed.
    pub params: Map<String, Value>,
    /// Request headers, lowercase keys.
    pub headers: HashMap<String, String>,
    /// Shared terminal-response writer.
    pub coordinator: ResponseCoordinator,
    /// Set by an interception point to stop processing; interpreted only at
    /// the top of dispatch and after the `/` and `/sdk` extension points.
    pub cancel_request: Option<String>,
    /// True for synthetic sub-requests decomposed from a bulk batch.
    pub bulk: bool,
    pub pending: PendingOps,
    // Populated by the validator on success.
    pub app_id: Option<String>,
    pub app_user_id: Option<String>,
    pub app: Option<App>,
    pub member: Option<Member>,
    pub user: Option<Value>,
}

impl RequestContext {
    pub fn new(
        method: Method,
        full_path: String,
        api_path: String,
        params: Map<String, Value>,
        headers: HashMap<String, String>,
        coordinator: ResponseCoordinator,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            full_path,
            api_path,
            params,
            headers,
            coordinator,
            cancel_request: None,
            bulk: false,
            pending: PendingOps::default(),
            app_id: None,
            app_user_id: None,
            app: None,
            member: None,
            user: None,
        }
    }

    /// Build a synthetic sub-request from one decoded bulk item. The response
    /// handle is shared with the parent batch; everything else is fresh.
    pub fn sub_request(
        parent: &RequestContext,
        mut fields: Map<String, Value>,
        app_key: &str,
        device_id: &str,
    ) -> Self {
        fields.insert("app_key".to_string(), Value::String(app_key.to_string()));
        fields.insert("device_id".to_string(), Value::String(device_id.to_string()));
        let mut sub = Self::new(
            Method::POST,
            "/i".to_string(),
            "/i".to_string(),
            fields,
            parent.headers.clone(),
            parent.coordinator.clone(),
        );
        sub.bulk = true;
        sub
    }

    /// String view of a parameter; numbers are rendered, other shapes are not.
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<String> {
        match self.params.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Parse a parameter carrying an embedded JSON document. Distinguishes a
    /// missing parameter (`Ok(None)`) from a malformed one (`Err`).
    pub fn param_json(&self, name: &str) -> Result<Option<Value>, serde_json::Error> {
        match self.params.get(name) {
            None => Ok(None),
            Some(Value::String(raw)) => serde_json::from_str(raw).map(Some),
            Some(other) => Ok(Some(other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ResponseCoordinator;
    use serde_json::json;

    fn ctx_with(params: Map<String, Value>) -> RequestContext {
        let (coordinator, _rx) = ResponseCoordinator::channel();
        RequestContext::new(
            Method::GET,
            "/o/ping".to_string(),
            "/o/ping".to_string(),
            params,
            HashMap::new(),
            coordinator,
        )
    }

    #[test]
    fn test_param_str_coerces_numbers() {
        let mut params = Map::new();
        params.insert("ttl".to_string(), json!(900));
        params.insert("name".to_string(), json!("web"));
        params.insert("list".to_string(), json!([1]));
        let ctx = ctx_with(params);
        assert_eq!(ctx.param_str("ttl").as_deref(), Some("900"));
        assert_eq!(ctx.param_str("name").as_deref(), Some("web"));
        assert_eq!(ctx.param_str("list"), None);
        assert_eq!(ctx.param_str("missing"), None);
    }

    #[test]
    fn test_param_json_missing_vs_malformed() {
        let mut params = Map::new();
        params.insert("events".to_string(), json!("[{\"key\":\"login\"}]"));
        params.insert("broken".to_string(), json!("{not json"));
        let ctx = ctx_with(params);
        assert!(ctx.param_json("absent").unwrap().is_none());
        assert_eq!(
            ctx.param_json("events").unwrap(),
            Some(json!([{ "key": "login" }]))
        );
        assert!(ctx.param_json("broken").is_err());
    }

    #[test]
    fn test_sub_request_shares_coordinator() {
        let (coordinator, rx) = ResponseCoordinator::channel();
        let mut parent = RequestContext::new(
            Method::POST,
            "/i/bulk".to_string(),
            "/i/bulk".to_string(),
            Map::new(),
            HashMap::new(),
            coordinator,
        );
        parent.bulk = true;
        let sub = RequestContext::sub_request(&parent, Map::new(), "k1", "d1");
        assert!(sub.bulk);
        assert_eq!(sub.param_str("app_key").as_deref(), Some("k1"));
        sub.coordinator.write_message(200, "Success");
        parent.coordinator.write_message(200, "late");
        assert_eq!(rx.recv().unwrap().status, 200);
        assert!(rx.try_recv().is_err());
    }
}
