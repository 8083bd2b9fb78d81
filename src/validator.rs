//! Authorization/validation gate invoked before handlers run.
//!
//! The dispatcher only knows the [`Validator`] trait: on denial a validator
//! writes the error response itself through the context's coordinator and
//! reports `Denied`; on success it populates the post-validation context
//! fields (`app`, `member`) and the caller proceeds exactly once.
//! [`KeyValidator`] is the registry-backed implementation used in production
//! wiring and tests; real deployments may substitute their own.

use crate::context::RequestContext;
use crate::registry::AppRegistry;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Outcome of a validation call. `Denied` means the response has already
/// been written; the caller must not touch the coordinator again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Granted,
    Denied,
}

impl Validation {
    #[must_use]
    pub fn granted(self) -> bool {
        self == Validation::Granted
    }
}

/// Required privilege for the user-facing validation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    DataRead,
    /// Dashboard-originated mutation of app data. No built-in endpoint
    /// requires it (apps/users/tasks are admin- or mgmt-gated); it exists for
    /// extension listeners that add write endpoints and gate them through the
    /// shared validator.
    DataWrite,
    MgmtRead,
    GlobalAdmin,
}

pub trait Validator: Send + Sync {
    /// Gate for device-originated write (ingest) endpoints, keyed by `app_key`.
    fn validate_app_for_write_api(&self, ctx: &mut RequestContext) -> Validation;

    /// Gate for dashboard endpoints, keyed by `api_key` and the privilege the
    /// endpoint declares.
    fn validate_user(&self, ctx: &mut RequestContext, privilege: Privilege) -> Validation;
}

/// Registry-backed validator: app keys must resolve to a registered app and
/// member api keys must resolve to a member with the required privilege.
pub struct KeyValidator {
    registry: Arc<RwLock<AppRegistry>>,
}

impl KeyValidator {
    #[must_use]
    pub fn new(registry: Arc<RwLock<AppRegistry>>) -> Self {
        Self { registry }
    }
}

impl Validator for KeyValidator {
    fn validate_app_for_write_api(&self, ctx: &mut RequestContext) -> Validation {
        let Some(app_key) = ctx.param_str("app_key") else {
            ctx.coordinator
                .write_message(400, "Missing parameter \"app_key\"");
            return Validation::Denied;
        };
        let app = {
            let registry = self.registry.read().unwrap();
            registry.app_by_key(&app_key).cloned()
        };
        match app {
            Some(app) => {
                debug!(request_id = %ctx.request_id, app_id = %app.id, "app validated for write");
                ctx.app_id = Some(app.id.clone());
                ctx.app = Some(app);
                Validation::Granted
            }
            None => {
                ctx.coordinator.write_message(400, "App does not exist");
                Validation::Denied
            }
        }
    }

    fn validate_user(&self, ctx: &mut RequestContext, privilege: Privilege) -> Validation {
        let Some(api_key) = ctx.param_str("api_key") else {
            ctx.coordinator
                .write_message(400, "Missing parameter \"api_key\"");
            return Validation::Denied;
        };
        let member = {
            let registry = self.registry.read().unwrap();
            registry.member_by_api_key(&api_key).cloned()
        };
        let Some(member) = member else {
            ctx.coordinator.write_message(401, "User does not exist");
            return Validation::Denied;
        };

        // Resolve the target app when the endpoint names one.
        if let Some(app_id) = ctx.param_str("app_id") {
            let app = {
                let registry = self.registry.read().unwrap();
                registry.app_by_id(&app_id).cloned()
            };
            let Some(app) = app else {
                ctx.coordinator.write_message(400, "App does not exist");
                return Validation::Denied;
            };
            let allowed = match privilege {
                Privilege::GlobalAdmin => member.global_admin,
                _ => member.has_access(&app_id),
            };
            if !allowed {
                ctx.coordinator
                    .write_message(401, "User does not have right");
                return Validation::Denied;
            }
            ctx.app_id = Some(app.id.clone());
            ctx.app = Some(app);
        } else if privilege == Privilege::GlobalAdmin && !member.global_admin {
            ctx.coordinator
                .write_message(401, "User does not have right");
            return Validation::Denied;
        }

        debug!(request_id = %ctx.request_id, member_id = %member.id, ?privilege, "user validated");
        ctx.member = Some(member);
        Validation::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ResponseCoordinator;
    use crate::registry::{App, Member};
    use http::Method;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;

    const APP_ID: &str = "0123456789abcdef01234567";

    fn registry() -> Arc<RwLock<AppRegistry>> {
        let mut registry = AppRegistry::new();
        registry.insert_app(App {
            id: APP_ID.to_string(),
            key: "k1".to_string(),
            name: "mobile".to_string(),
            country: None,
            timezone: None,
        });
        registry.insert_member(Member {
            id: "m1".to_string(),
            api_key: "admin-key".to_string(),
            global_admin: true,
            app_access: Vec::new(),
        });
        registry.insert_member(Member {
            id: "m2".to_string(),
            api_key: "viewer-key".to_string(),
            global_admin: false,
            app_access: vec![APP_ID.to_string()],
        });
        Arc::new(RwLock::new(registry))
    }

    fn ctx(params: &[(&str, Value)]) -> (RequestContext, may::sync::mpsc::Receiver<crate::coordinator::Reply>) {
        let (coordinator, rx) = ResponseCoordinator::channel();
        let mut map = Map::new();
        for (k, v) in params {
            map.insert((*k).to_string(), v.clone());
        }
        (
            RequestContext::new(
                Method::GET,
                "/o".to_string(),
                "/o".to_string(),
                map,
                HashMap::new(),
                coordinator,
            ),
            rx,
        )
    }

    #[test]
    fn test_write_api_unknown_key_denied() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[("app_key", json!("nope"))]);
        assert_eq!(validator.validate_app_for_write_api(&mut ctx), Validation::Denied);
        let reply = rx.recv().unwrap();
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["result"], "App does not exist");
    }

    #[test]
    fn test_write_api_populates_app() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[("app_key", json!("k1"))]);
        assert!(validator.validate_app_for_write_api(&mut ctx).granted());
        assert_eq!(ctx.app_id.as_deref(), Some(APP_ID));
        assert_eq!(ctx.app.as_ref().map(|a| a.name.as_str()), Some("mobile"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_user_missing_api_key() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[]);
        assert_eq!(
            validator.validate_user(&mut ctx, Privilege::DataRead),
            Validation::Denied
        );
        assert_eq!(rx.recv().unwrap().status, 400);
    }

    #[test]
    fn test_user_without_app_access_gets_401() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[
            ("api_key", json!("viewer-key")),
            ("app_id", json!("ffffffffffffffffffffffff")),
        ]);
        assert_eq!(
            validator.validate_user(&mut ctx, Privilege::DataRead),
            Validation::Denied
        );
        // Unknown app id resolves before the access check.
        assert_eq!(rx.recv().unwrap().status, 400);
    }

    #[test]
    fn test_viewer_cannot_use_global_admin_api() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[("api_key", json!("viewer-key"))]);
        assert_eq!(
            validator.validate_user(&mut ctx, Privilege::GlobalAdmin),
            Validation::Denied
        );
        let reply = rx.recv().unwrap();
        assert_eq!(reply.status, 401);
        assert_eq!(reply.body["result"], "User does not have right");
    }

    #[test]
    fn test_data_write_follows_app_access() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[
            ("api_key", json!("viewer-key")),
            ("app_id", json!(APP_ID)),
        ]);
        assert!(validator
            .validate_user(&mut ctx, Privilege::DataWrite)
            .granted());
        assert!(rx.try_recv().is_err());

        // Same member, an app outside their access list.
        let other = "aaaaaaaaaaaaaaaaaaaaaaaa";
        let registry = registry();
        registry.write().unwrap().insert_app(App {
            id: other.to_string(),
            key: "k2".to_string(),
            name: "web".to_string(),
            country: None,
            timezone: None,
        });
        let validator = KeyValidator::new(registry);
        let (mut ctx, rx) = self::ctx(&[
            ("api_key", json!("viewer-key")),
            ("app_id", json!(other)),
        ]);
        assert_eq!(
            validator.validate_user(&mut ctx, Privilege::DataWrite),
            Validation::Denied
        );
        assert_eq!(rx.recv().unwrap().status, 401);
    }

    #[test]
    fn test_admin_granted_and_member_populated() {
        let validator = KeyValidator::new(registry());
        let (mut ctx, rx) = ctx(&[
            ("api_key", json!("admin-key")),
            ("app_id", json!(APP_ID)),
        ]);
        assert!(validator
            .validate_user(&mut ctx, Privilege::GlobalAdmin)
            .granted());
        assert_eq!(ctx.member.as_ref().map(|m| m.id.as_str()), Some("m1"));
        assert!(ctx.app.is_some());
        assert!(rx.try_recv().is_err());
    }
}
