//! `/admin/log/*` (spec.md §6): runtime log-level control against a
//! `tracing_subscriber::reload` handle — the idiomatic way to retune
//! levels at runtime in this ecosystem, rather than hand-rolling a
//! logging facade.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::reload::Handle;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelUpdate {
    pub system: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRegexUpdate {
    pub expression: String,
    pub level: String,
}

/// Tracks a default level plus per-target overrides, rebuilding and
/// reloading the process' `EnvFilter` whenever either changes. `S` is
/// whatever subscriber layer stack the binary assembled its `EnvFilter`
/// into (`piri-cli` wires a `tracing_subscriber::Registry`).
pub struct LogController<S> {
    default_level: RwLock<String>,
    targets: RwLock<HashMap<String, String>>,
    handle: Handle<EnvFilter, S>,
}

impl<S> LogController<S>
where
    S: 'static,
{
    pub fn new(handle: Handle<EnvFilter, S>, default_level: impl Into<String>) -> Self {
        Self { default_level: RwLock::new(default_level.into()), targets: RwLock::new(HashMap::new()), handle }
    }

    /// `GET /admin/log/list` → `{ loggers: map[string → level] }`. The
    /// default level is reported under the key `"default"`.
    pub fn list(&self) -> HashMap<String, String> {
        let mut loggers = self.targets.read().unwrap().clone();
        loggers.insert("default".to_string(), self.default_level.read().unwrap().clone());
        loggers
    }

    /// `POST /admin/log/set`. `system == "default"` retunes the base
    /// level; any other name becomes (or updates) a per-target directive.
    pub fn set(&self, system: &str, level: &str) -> Result<(), ApiError> {
        validate_level(level)?;
        if system == "default" {
            *self.default_level.write().unwrap() = level.to_ascii_lowercase();
        } else {
            self.targets.write().unwrap().insert(system.to_string(), level.to_ascii_lowercase());
        }
        self.reload()
    }

    /// `POST /admin/log/set-regex`: applies `level` to every already-known
    /// target whose name matches `expression`. There is no live registry
    /// of every possible `tracing` target a process might emit through, so
    /// this only retunes targets this controller already knows about —
    /// register one via `set` first if it hasn't logged anything yet.
    pub fn set_regex(&self, expression: &str, level: &str) -> Result<(), ApiError> {
        validate_level(level)?;
        let re = Regex::new(expression).map_err(|e| ApiError::BadRequest(format!("invalid regex: {e}")))?;

        let mut targets = self.targets.write().unwrap();
        let matching: Vec<String> = targets.keys().filter(|name| re.is_match(name)).cloned().collect();
        if matching.is_empty() {
            return Err(ApiError::NotFound);
        }
        for name in matching {
            targets.insert(name, level.to_ascii_lowercase());
        }
        drop(targets);
        self.reload()
    }

    fn reload(&self) -> Result<(), ApiError> {
        let default_level = self.default_level.read().unwrap().clone();
        let targets = self.targets.read().unwrap();

        let mut directive = default_level;
        for (target, level) in targets.iter() {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level);
        }
        drop(targets);

        let filter =
            EnvFilter::try_new(&directive).map_err(|e| ApiError::BadRequest(format!("invalid filter: {e}")))?;
        self.handle.reload(filter).map_err(|e| ApiError::Internal(e.to_string()))
    }
}

fn validate_level(level: &str) -> Result<(), ApiError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        _ => Err(ApiError::BadRequest(format!("unknown log level: {level}"))),
    }
}
