//! Time-limited auth token issuance (`GET /o/token`).

use crate::context::RequestContext;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Default token lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 1800;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuing member id.
    pub sub: String,
    pub exp: u64,
    /// Whether the token may be used more than once.
    pub multi: bool,
}

pub fn issue(secret: &str, ctx: &mut RequestContext) {
    let ttl = ctx
        .param_str("ttl")
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|t| *t > 0)
        .unwrap_or(DEFAULT_TTL_SECS);
    let multi = ctx
        .param_str("multi")
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let member_id = ctx
        .member
        .as_ref()
        .map(|m| m.id.clone())
        .unwrap_or_default();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let claims = TokenClaims {
        sub: member_id,
        exp: now + ttl,
        multi,
    };

    match encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    ) {
        Ok(token) => ctx.coordinator.write_message(200, &token),
        Err(e) => {
            warn!(request_id = %ctx.request_id, error = %e, "token signing failed");
            ctx.coordinator.write_message(404, "Token could not be issued");
        }
    }
}
