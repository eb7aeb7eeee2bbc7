//! The Config-Registry: a thread-safe, typed, observable configuration
//! store with all-or-nothing multi-key updates and optional persistence
//! (spec §4.3).
//!
//! State is one `RwLock`-protected map of `key → entry`, plus a
//! [`piri_events::ObserverRegistry`] keyed the same way: the same id-tagged
//! subscribe/unsubscribe/notify primitive the spec calls for (§9 Design
//! Notes), reused rather than reimplemented.

use std::collections::HashMap;
use std::sync::RwLock;

use piri_events::{ObserverId, ObserverRegistry};
use piri_schema::{Schema, SchemaError, TypedValue};
use piri_types::{ChangeSource, ConfigKey};
use thiserror::Error;

mod persist;
pub use persist::{PersistError, Persister, TomlPersister};

/// One registered configuration entry: its current value and the schema
/// that governs future updates to it.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub value: TypedValue,
    pub schema: Schema,
}

impl ConfigEntry {
    pub fn new(value: TypedValue, schema: Schema) -> Self {
        Self { value, schema }
    }
}

/// `(key, old_value, new_value, source)` — delivered to observers after a
/// successful commit (spec §3 "Change event").
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: ConfigKey,
    pub old: Option<TypedValue>,
    pub new: TypedValue,
    pub source: ChangeSource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigRegistryError {
    #[error("config key already registered: {0}")]
    DuplicateKey(String),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("validation failed for {key}: {cause}")]
    ValidationError { key: String, cause: SchemaError },
    #[error("persist failed: {0}")]
    PersistError(String),
}

/// The Config-Registry itself.
pub struct ConfigRegistry {
    entries: RwLock<HashMap<ConfigKey, ConfigEntry>>,
    observers: ObserverRegistry<ConfigKey, ChangeEvent>,
    persister: Option<Box<dyn Persister>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            observers: ObserverRegistry::new(),
            persister: None,
        }
    }

    pub fn with_persister(persister: impl Persister + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            observers: ObserverRegistry::new(),
            persister: Some(Box::new(persister)),
        }
    }

    /// Atomic bulk registration. Fails with `DuplicateKey` on *any*
    /// pre-existing key; no partial insert on failure.
    pub fn register_entries(
        &self,
        new_entries: HashMap<ConfigKey, ConfigEntry>,
    ) -> Result<(), ConfigRegistryError> {
        let mut entries = self.entries.write().unwrap();
        for key in new_entries.keys() {
            if entries.contains_key(key) {
                return Err(ConfigRegistryError::DuplicateKey(key.to_string()));
            }
        }
        entries.extend(new_entries);
        Ok(())
    }

    /// The five-phase update algorithm (spec §4.3): parse+validate all,
    /// snapshot, commit, optionally persist (rolling back on failure),
    /// then notify observers outside the lock.
    pub fn update(
        &self,
        updates: HashMap<ConfigKey, String>,
        persist: bool,
        source: ChangeSource,
    ) -> Result<(), ConfigRegistryError> {
        // Phase 1: parse + validate all, lock held only long enough to read schemas.
        let mut parsed: HashMap<ConfigKey, TypedValue> = HashMap::new();
        {
            let entries = self.entries.read().unwrap();
            for (key, raw) in &updates {
                let entry = entries
                    .get(key)
                    .ok_or_else(|| ConfigRegistryError::UnknownKey(key.to_string()))?;
                let typed = entry.schema.parse_and_validate(raw).map_err(|cause| {
                    ConfigRegistryError::ValidationError { key: key.to_string(), cause }
                })?;
                parsed.insert(key.clone(), typed);
            }
        }

        // Phase 2 + 3: snapshot old values, commit new ones, under one write lock.
        let mut old_values: HashMap<ConfigKey, Option<TypedValue>> = HashMap::new();
        {
            let mut entries = self.entries.write().unwrap();
            for (key, new_value) in &parsed {
                let entry = entries.get_mut(key).expect("validated above");
                old_values.insert(key.clone(), Some(entry.value));
                entry.value = *new_value;
            }
        }

        // Phase 4: persist, rolling back on failure.
        if persist
            && let Some(persister) = &self.persister
            && let Err(e) = persister.persist(&parsed)
        {
            let mut entries = self.entries.write().unwrap();
            for (key, old) in &old_values {
                if let (Some(entry), Some(old_value)) = (entries.get_mut(key), old) {
                    entry.value = *old_value;
                }
            }
            return Err(ConfigRegistryError::PersistError(e.to_string()));
        }

        // Phase 5: notify observers outside the lock, in registration order per key.
        for (key, new_value) in parsed {
            let event = ChangeEvent {
                key: key.clone(),
                old: old_values.get(&key).copied().flatten(),
                new: new_value,
                source,
            };
            self.observers.notify(&key, &event);
        }

        Ok(())
    }

    pub fn get_duration(&self, key: &ConfigKey, fallback: std::time::Duration) -> std::time::Duration {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .and_then(|e| e.value.as_duration())
            .unwrap_or(fallback)
    }

    pub fn get_i64(&self, key: &ConfigKey, fallback: i64) -> i64 {
        self.entries.read().unwrap().get(key).and_then(|e| e.value.as_i64()).unwrap_or(fallback)
    }

    pub fn get_u64(&self, key: &ConfigKey, fallback: u64) -> u64 {
        self.entries.read().unwrap().get(key).and_then(|e| e.value.as_u64()).unwrap_or(fallback)
    }

    /// Returns a snapshot of every entry, rendered as the persister would
    /// write it: durations as canonical strings, integers natively.
    pub fn get_all(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.to_string(), v.value.to_wire_string()))
            .collect()
    }

    /// Subscribes `observer` to changes on `key`. Fails with `UnknownKey`
    /// if the key has never been registered.
    pub fn subscribe<F>(&self, key: &ConfigKey, observer: F) -> Result<ObserverId, ConfigRegistryError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if !self.entries.read().unwrap().contains_key(key) {
            return Err(ConfigRegistryError::UnknownKey(key.to_string()));
        }
        Ok(self.observers.subscribe(key.clone(), observer))
    }

    pub fn unsubscribe(&self, key: &ConfigKey, id: ObserverId) {
        self.observers.unsubscribe(key, id);
    }

    /// `POST /admin/config/reload` (spec §6): re-reads every registered
    /// key's value from the persisted file and feeds it back through the
    /// ordinary `update` pipeline, so a reload gets the same validation,
    /// rollback, and notification guarantees a `PATCH` does. Keys absent
    /// from the file are left at their in-memory value.
    pub fn reload(&self) -> Result<(), ConfigRegistryError> {
        let persister = self
            .persister
            .as_ref()
            .ok_or_else(|| ConfigRegistryError::PersistError("no persister configured".to_string()))?;

        let keys: Vec<ConfigKey> = self.entries.read().unwrap().keys().cloned().collect();
        let mut updates = HashMap::new();
        for key in keys {
            match persister.read(&key) {
                Ok(Some(raw)) => {
                    updates.insert(key, raw);
                }
                Ok(None) => {}
                Err(e) => return Err(ConfigRegistryError::PersistError(e.to_string())),
            }
        }

        self.update(updates, false, ChangeSource::File)
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}
