//! In-memory app/member directory.
//!
//! The storage layer proper is an external collaborator; this registry is the
//! seam the validator and the management endpoints work against. Apps are
//! addressable both by their 24-hex id and by their SDK app key.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static HEX24: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new("^[0-9a-fA-F]{24}$").unwrap()
});

/// True when `id` has the canonical 24-hex-character app id shape.
#[must_use]
pub fn is_valid_app_id(id: &str) -> bool {
    HEX24.is_match(id)
}

/// Mint a fresh 24-hex object id (apps, members, tasks).
#[must_use]
pub fn new_object_id() -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(ulid::Ulid::new().to_string().as_bytes());
    let mut out = String::with_capacity(24);
    for byte in digest.iter().take(12) {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// One registered application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    /// 24-hex-character identifier.
    pub id: String,
    /// SDK ingestion key.
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A dashboard member, identified by their API key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: String,
    pub api_key: String,
    pub global_admin: bool,
    /// App ids this member may read/write when not a global admin.
    #[serde(default)]
    pub app_access: Vec<String>,
}

impl Member {
    /// Read or write access to the given app.
    #[must_use]
    pub fn has_access(&self, app_id: &str) -> bool {
        self.global_admin || self.app_access.iter().any(|a| a == app_id)
    }
}

/// Mutable directory of apps and members. The dispatcher holds it behind a
/// `RwLock`; management endpoints are the only writers.
#[derive(Debug, Default)]
pub struct AppRegistry {
    by_id: HashMap<String, App>,
    key_to_id: HashMap<String, String>,
    members: HashMap<String, Member>,
}

impl AppRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_app(&mut self, app: App) {
        self.key_to_id.insert(app.key.clone(), app.id.clone());
        self.by_id.insert(app.id.clone(), app);
    }

    pub fn remove_app(&mut self, app_id: &str) -> Option<App> {
        let app = self.by_id.remove(app_id)?;
        self.key_to_id.remove(&app.key);
        Some(app)
    }

    #[must_use]
    pub fn app_by_id(&self, app_id: &str) -> Option<&App> {
        self.by_id.get(app_id)
    }

    #[must_use]
    pub fn app_by_key(&self, app_key: &str) -> Option<&App> {
        self.key_to_id.get(app_key).and_then(|id| self.by_id.get(id))
    }

    pub fn insert_member(&mut self, member: Member) {
        self.members.insert(member.api_key.clone(), member);
    }

    pub fn remove_member(&mut self, api_key: &str) -> Option<Member> {
        self.members.remove(api_key)
    }

    #[must_use]
    pub fn member_by_api_key(&self, api_key: &str) -> Option<&Member> {
        self.members.get(api_key)
    }

    #[must_use]
    pub fn app_count(&self) -> usize {
        self.by_id.len()
    }
}
