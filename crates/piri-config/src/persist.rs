//! The persister contract and its TOML implementation (spec §4.3, §6).
//!
//! Given `map[key → typed_value]`, merge the updates into the *existing*
//! persisted document, preserving all other content: `toml_edit` keeps
//! comments, key ordering, and unrecognized keys untouched, which is the
//! whole reason this crate reaches for it instead of plain `toml`.
//! Durations are written in their canonical string form; integers keep
//! their native encoding. Dot-separated registry keys map to nested
//! tables: `pdp.aggregation.manager.poll_interval` becomes
//! `[pdp.aggregation.manager] poll_interval = ...`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use piri_schema::TypedValue;
use piri_types::ConfigKey;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Table, value};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("failed to write config file: {0}")]
    Write(String),
}

/// The registry's persistence seam. Implementations must merge updates
/// into whatever already exists rather than overwriting wholesale.
pub trait Persister: Send + Sync {
    fn persist(&self, updates: &HashMap<ConfigKey, TypedValue>) -> Result<(), PersistError>;

    /// Reads the current on-disk raw value for `key`, if present. Used by
    /// `ConfigRegistry::reload` (spec §6 `POST /admin/config/reload`:
    /// "re-read persisted file and apply") to feed the ordinary `update`
    /// pipeline rather than bypassing its validation/notification phases.
    fn read(&self, key: &ConfigKey) -> Result<Option<String>, PersistError>;
}

/// Persists updates into a TOML file on disk, preserving comments,
/// ordering, and unrecognized keys. Serializes its own writes behind a
/// mutex — the spec requires one writer at a time (§5).
pub struct TomlPersister {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

impl Persister for TomlPersister {
    fn persist(&self, updates: &HashMap<ConfigKey, TypedValue>) -> Result<(), PersistError> {
        let _guard = self.lock.lock().unwrap();

        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(PersistError::Io(e.to_string())),
        };

        let mut doc: DocumentMut =
            existing.parse().map_err(|e: toml_edit::TomlError| PersistError::Parse(e.to_string()))?;

        for (key, typed_value) in updates {
            set_nested(&mut doc, key, typed_value);
        }

        let tmp_path = self.path.with_extension("toml.tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistError::Write(e.to_string()))?;
        }
        fs::write(&tmp_path, doc.to_string()).map_err(|e| PersistError::Write(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| PersistError::Write(e.to_string()))?;

        Ok(())
    }

    fn read(&self, key: &ConfigKey) -> Result<Option<String>, PersistError> {
        let _guard = self.lock.lock().unwrap();

        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistError::Io(e.to_string())),
        };

        let doc: DocumentMut =
            existing.parse().map_err(|e: toml_edit::TomlError| PersistError::Parse(e.to_string()))?;

        Ok(get_nested(&doc, key))
    }
}

fn set_nested(doc: &mut DocumentMut, key: &ConfigKey, typed_value: &TypedValue) {
    let segments: Vec<&str> = key.segments().collect();
    let (leaf, path) = segments.split_last().expect("ConfigKey always has ≥1 segment");

    let mut table = doc.as_table_mut();
    for segment in path {
        table = table
            .entry(segment)
            .or_insert_with(|| Item::Table(Table::new()))
            .as_table_mut()
            .expect("nested config path segment is a table");
    }

    let toml_value = match typed_value {
        TypedValue::Duration(d) => value(piri_duration::format_canonical(*d)),
        TypedValue::Integer(i) => value(*i),
        TypedValue::UnsignedInteger(u) => value(*u as i64),
    };
    table[*leaf] = toml_value;
}

/// Mirror of [`set_nested`] for reads: walks the same dotted path and
/// renders whatever scalar it finds as a string, the form `update`
/// expects from its callers.
fn get_nested(doc: &DocumentMut, key: &ConfigKey) -> Option<String> {
    let segments: Vec<&str> = key.segments().collect();
    let (leaf, path) = segments.split_last().expect("ConfigKey always has ≥1 segment");

    let mut table = doc.as_table();
    for segment in path {
        table = table.get(segment)?.as_table()?;
    }

    let item = table.get(*leaf)?;
    if let Some(s) = item.as_str() {
        Some(s.to_string())
    } else if let Some(i) = item.as_integer() {
        Some(i.to_string())
    } else {
        item.as_value().map(|v| v.to_string().trim().trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(s: &str) -> ConfigKey {
        ConfigKey::new(s).unwrap()
    }

    #[test]
    fn persist_creates_nested_tables_for_dotted_keys() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.toml");
        let persister = TomlPersister::new(&path);

        let mut updates = HashMap::new();
        updates.insert(
            key("pdp.aggregation.manager.poll_interval"),
            TypedValue::Duration(Duration::from_secs(300)),
        );
        persister.persist(&updates).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[pdp.aggregation.manager]"));
        assert!(contents.contains("poll_interval = \"5m0s\""));
    }

    #[test]
    fn persist_preserves_existing_comments_and_unrelated_keys() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.toml");
        fs::write(
            &path,
            "# a comment that must survive\nother_key = \"untouched\"\n\n[pdp.aggregation.manager]\npoll_interval = \"1m0s\"\n",
        )
        .unwrap();

        let persister = TomlPersister::new(&path);
        let mut updates = HashMap::new();
        updates.insert(
            key("pdp.aggregation.manager.poll_interval"),
            TypedValue::Duration(Duration::from_secs(300)),
        );
        persister.persist(&updates).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# a comment that must survive"));
        assert!(contents.contains("other_key = \"untouched\""));
        assert!(contents.contains("poll_interval = \"5m0s\""));
    }

    #[test]
    fn persist_writes_integers_natively() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.toml");
        let persister = TomlPersister::new(&path);

        let mut updates = HashMap::new();
        updates.insert(key("limits.max_connections"), TypedValue::UnsignedInteger(42));
        persister.persist(&updates).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("max_connections = 42"));
    }

    #[test]
    fn persist_on_missing_file_creates_it() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("config.toml");
        let persister = TomlPersister::new(&path);

        let mut updates = HashMap::new();
        updates.insert(key("a"), TypedValue::Integer(1));
        persister.persist(&updates).unwrap();

        assert!(path.exists());
    }
}
