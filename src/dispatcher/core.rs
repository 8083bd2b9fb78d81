//! Dispatcher core - hot path for request classification and routing.

use crate::context::RequestContext;
use crate::coordinator::Reply;
use crate::extensions::ExtensionBus;
use crate::handlers;
use crate::ingest;
use crate::registry::{is_valid_app_id, AppRegistry};
use crate::runtime_config::{BatchMode, RuntimeConfig};
use crate::validator::{Privilege, Validator};
use http::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Built-in endpoint categories, keyed by exact `api_path` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    BulkIngest,
    SingleIngest,
    UserMgmt,
    AppMgmt,
    TaskMgmt,
    Query,
    Analytics,
    Export,
    Ping,
    Token,
}

fn classify_api_path(api_path: &str) -> Option<EndpointKind> {
    match api_path {
        "/i/bulk" => Some(EndpointKind::BulkIngest),
        "/i" => Some(EndpointKind::SingleIngest),
        "/i/users" => Some(EndpointKind::UserMgmt),
        "/i/apps" => Some(EndpointKind::AppMgmt),
        "/i/tasks" => Some(EndpointKind::TaskMgmt),
        "/o" => Some(EndpointKind::Query),
        "/o/analytics" => Some(EndpointKind::Analytics),
        "/o/export" => Some(EndpointKind::Export),
        "/o/ping" => Some(EndpointKind::Ping),
        "/o/token" => Some(EndpointKind::Token),
        _ => None,
    }
}

/// Strip the configured root prefix and resolve the two-segment routing key.
/// Returns `(api_path, full_path)`.
#[must_use]
pub fn classify_path(path: &str, root_path: &str) -> (String, String) {
    let stripped = if !root_path.is_empty() {
        path.strip_prefix(root_path).unwrap_or(path)
    } else {
        path
    };
    let full_path = if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    };
    let mut segments = full_path.split('/').filter(|s| !s.is_empty());
    let api_path = match (segments.next(), segments.next()) {
        (Some(a), Some(b)) => format!("/{a}/{b}"),
        (Some(a), None) => format!("/{a}"),
        _ => "/".to_string(),
    };
    (api_path, full_path)
}

/// Dispatcher configuration resolved at worker startup.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub root_path: String,
    pub batch_mode: BatchMode,
    pub token_secret: String,
    pub stack_size: usize,
}

impl DispatchConfig {
    #[must_use]
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            root_path: config.root_path.clone(),
            batch_mode: config.batch_mode,
            token_secret: config.token_secret.clone(),
            stack_size: config.stack_size,
        }
    }
}

/// Classifies inbound requests and routes them to terminal handlers.
pub struct RequestDispatcher {
    pub bus: Arc<ExtensionBus>,
    pub validator: Arc<dyn Validator>,
    pub registry: Arc<RwLock<AppRegistry>>,
    /// Long-running report tasks, keyed by task id. Thin management surface;
    /// scheduling internals live elsewhere.
    pub tasks: Arc<RwLock<HashMap<String, Value>>>,
    pub config: DispatchConfig,
}

impl RequestDispatcher {
    pub fn new(
        bus: Arc<ExtensionBus>,
        validator: Arc<dyn Validator>,
        registry: Arc<RwLock<AppRegistry>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            bus,
            validator,
            registry,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Drive one request from Classified to Responded. The terminal write
    /// always goes through the context's coordinator, exactly once.
    pub fn dispatch(&self, mut ctx: RequestContext) {
        // Cancellation checkpoint: a collaborator may have marked the context
        // before dispatch ever ran.
        if self.respond_if_cancelled(&mut ctx) {
            return;
        }

        if ctx.method == Method::OPTIONS {
            self.preflight(&ctx);
            return;
        }

        let routing_meta = json!({
            "apiPath": ctx.api_path,
            "fullPath": ctx.full_path,
            "method": ctx.method.as_str(),
        });
        self.bus.dispatch("/", Some(&mut ctx), &routing_meta);
        if self.respond_if_cancelled(&mut ctx) {
            return;
        }

        debug!(
            request_id = %ctx.request_id,
            api_path = %ctx.api_path,
            full_path = %ctx.full_path,
            "request classified"
        );

        match classify_api_path(&ctx.api_path) {
            Some(kind) => self.route(kind, &mut ctx),
            None => {
                let api_path = ctx.api_path.clone();
                let full_path = ctx.full_path.clone();
                if self.bus.dispatch(&api_path, Some(&mut ctx), &Value::Null) {
                    return;
                }
                if self.bus.dispatch(&full_path, Some(&mut ctx), &Value::Null) {
                    return;
                }
                info!(path = %full_path, "no handler or extension claimed path");
                ctx.coordinator.write_message(400, "Invalid path");
            }
        }
    }

    fn route(&self, kind: EndpointKind, ctx: &mut RequestContext) {
        match kind {
            EndpointKind::BulkIngest => ingest::bulk::process(self, ctx),
            EndpointKind::SingleIngest => ingest::single::process(self, ctx),
            EndpointKind::Ping => handlers::ping::respond(ctx),
            EndpointKind::Token => {
                if self.validator.validate_user(ctx, Privilege::MgmtRead).granted() {
                    handlers::token::issue(&self.config.token_secret, ctx);
                }
            }
            EndpointKind::Query => {
                if !self.require_app_id(ctx) {
                    return;
                }
                let Some(method) = ctx.param_str("method") else {
                    ctx.coordinator
                        .write_message(400, "Missing parameter \"method\"");
                    return;
                };
                if self.validator.validate_user(ctx, Privilege::DataRead).granted() {
                    handlers::query::run(&method, ctx);
                }
            }
            EndpointKind::Analytics => {
                if !self.require_app_id(ctx) {
                    return;
                }
                if self.validator.validate_user(ctx, Privilege::DataRead).granted() {
                    handlers::analytics::run(ctx);
                }
            }
            EndpointKind::Export => {
                if !self.require_app_id(ctx) {
                    return;
                }
                if self.validator.validate_user(ctx, Privilege::DataRead).granted() {
                    handlers::export::run(ctx);
                }
            }
            EndpointKind::AppMgmt => {
                if self
                    .validator
                    .validate_user(ctx, Privilege::GlobalAdmin)
                    .granted()
                {
                    handlers::apps::run(&self.registry, ctx);
                }
            }
            EndpointKind::UserMgmt => {
                if self
                    .validator
                    .validate_user(ctx, Privilege::GlobalAdmin)
                    .granted()
                {
                    handlers::users::run(&self.registry, ctx);
                }
            }
            EndpointKind::TaskMgmt => {
                if self.validator.validate_user(ctx, Privilege::MgmtRead).granted() {
                    handlers::tasks::run(&self.tasks, ctx);
                }
            }
        }
    }

    /// Fail-fast identifier validation: `app_id` must be present and
    /// 24-hex-shaped before any validator or handler runs.
    fn require_app_id(&self, ctx: &mut RequestContext) -> bool {
        match ctx.param_str("app_id") {
            None => {
                ctx.coordinator
                    .write_message(400, "Missing parameter \"app_id\"");
                false
            }
            Some(app_id) if !is_valid_app_id(&app_id) => {
                ctx.coordinator
                    .write_message(400, "Invalid parameter \"app_id\"");
                false
            }
            Some(_) => true,
        }
    }

    fn respond_if_cancelled(&self, ctx: &mut RequestContext) -> bool {
        if let Some(reason) = ctx.cancel_request.take() {
            info!(request_id = %ctx.request_id, reason = %reason, "request cancelled");
            ctx.coordinator
                .write_message(400, &format!("Request cancelled: {reason}"));
            return true;
        }
        false
    }

    /// CORS preflight: 200 with the fixed allow-headers set.
    fn preflight(&self, ctx: &RequestContext) {
        let mut reply = Reply::new(200, Value::Null);
        reply.headers = vec![
            (
                "Access-Control-Allow-Origin".to_string(),
                "*".to_string(),
            ),
            (
                "Access-Control-Allow-Headers".to_string(),
                "Content-Type, api_key".to_string(),
            ),
            (
                "Access-Control-Allow-Methods".to_string(),
                "GET, POST, OPTIONS".to_string(),
            ),
        ];
        ctx.coordinator.write(reply);
    }
}
