//! Versioned key-value settings stores
//!
//! The store is the only place settings live; there is no ambient global.
//! Callers hand a `&mut dyn SettingsStore` to the migrator and a `&dyn
//! SettingsStore` to [`crate::DirectoryConfig::from_settings`].

use super::keys::{default_for, SettingKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Flat, versioned key-value settings.
///
/// `None` and JSON `null` are the same state: writing either clears the key.
pub trait SettingsStore: Send + Sync {
    /// Read a raw value without applying defaults.
    fn get(&self, key: &SettingKey) -> Result<Option<Value>>;

    /// Write or clear a value.
    fn set(&mut self, key: &SettingKey, value: Option<Value>) -> Result<()>;

    /// Recorded schema version, `None` for a fresh or pre-versioning store.
    fn version(&self) -> Result<Option<u32>>;

    fn set_version(&mut self, version: u32) -> Result<()>;

    /// Persist pending changes. In-memory stores have nothing to do.
    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read a plugin key, falling back to its default.
    fn effective(&self, name: &str) -> Result<Option<Value>> {
        match self.get(&SettingKey::plugin(name))? {
            Some(value) => Ok(Some(value)),
            None => Ok(default_for(name)),
        }
    }
}

/// Serialized form of a settings store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Plugin keys
    #[serde(default)]
    pub plugin: BTreeMap<String, Value>,

    /// Host sections holding legacy keys
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl SettingsDocument {
    fn get(&self, key: &SettingKey) -> Option<Value> {
        let value = match key {
            SettingKey::Plugin(name) => self.plugin.get(name),
            SettingKey::Section { section, name } => {
                self.sections.get(section).and_then(|s| s.get(name))
            }
        };
        value.filter(|v| !v.is_null()).cloned()
    }

    fn set(&mut self, key: &SettingKey, value: Option<Value>) {
        let value = value.filter(|v| !v.is_null());
        match key {
            SettingKey::Plugin(name) => match value {
                Some(v) => {
                    self.plugin.insert(name.clone(), v);
                }
                None => {
                    self.plugin.remove(name);
                }
            },
            SettingKey::Section { section, name } => match value {
                Some(v) => {
                    self.sections
                        .entry(section.clone())
                        .or_default()
                        .insert(name.clone(), v);
                }
                None => {
                    if let Some(s) = self.sections.get_mut(section) {
                        s.remove(name);
                        if s.is_empty() {
                            self.sections.remove(section);
                        }
                    }
                }
            },
        }
    }
}

/// One superseded version of the plugin keys
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: Option<u32>,
    pub plugin: BTreeMap<String, Value>,
}

/// In-memory store. Keeps a snapshot of the plugin keys each time the
/// version changes; only the current mapping is live.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    document: SettingsDocument,
    history: Vec<Snapshot>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: SettingsDocument) -> Self {
        Self {
            document,
            history: Vec::new(),
        }
    }

    pub fn document(&self) -> &SettingsDocument {
        &self.document
    }

    /// Superseded versions, oldest first
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &SettingKey) -> Result<Option<Value>> {
        Ok(self.document.get(key))
    }

    fn set(&mut self, key: &SettingKey, value: Option<Value>) -> Result<()> {
        self.document.set(key, value);
        Ok(())
    }

    fn version(&self) -> Result<Option<u32>> {
        Ok(self.document.version)
    }

    fn set_version(&mut self, version: u32) -> Result<()> {
        if self.document.version != Some(version) {
            self.history.push(Snapshot {
                version: self.document.version,
                plugin: self.document.plugin.clone(),
            });
            self.document.version = Some(version);
        }
        Ok(())
    }
}

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Toml,
}

impl SettingsFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => SettingsFormat::Toml,
            _ => SettingsFormat::Json,
        }
    }
}

/// File-backed store. Reads the whole file on open, writes it back on
/// [`SettingsStore::save`].
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    format: SettingsFormat,
    inner: MemorySettingsStore,
    dirty: bool,
}

impl FileSettingsStore {
    /// Open a settings file. A missing file is an empty, unversioned store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = SettingsFormat::from_path(&path);

        let document = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Settings(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Self::decode(&content, format).map_err(|e| {
                Error::Settings(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!("Settings file {} not found, starting empty", path.display());
            SettingsDocument::default()
        };

        Ok(Self {
            path,
            format,
            inner: MemorySettingsStore::from_document(document),
            dirty: false,
        })
    }

    pub fn document(&self) -> &SettingsDocument {
        self.inner.document()
    }

    fn decode(content: &str, format: SettingsFormat) -> std::result::Result<SettingsDocument, String> {
        if content.trim().is_empty() {
            return Ok(SettingsDocument::default());
        }
        match format {
            SettingsFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            SettingsFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    fn encode(&self) -> Result<String> {
        match self.format {
            SettingsFormat::Json => Ok(serde_json::to_string_pretty(self.inner.document())?),
            SettingsFormat::Toml => toml::to_string_pretty(self.inner.document())
                .map_err(|e| Error::Settings(format!("Failed to encode settings: {}", e))),
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &SettingKey) -> Result<Option<Value>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &SettingKey, value: Option<Value>) -> Result<()> {
        self.dirty = true;
        self.inner.set(key, value)
    }

    fn version(&self) -> Result<Option<u32>> {
        self.inner.version()
    }

    fn set_version(&mut self, version: u32) -> Result<()> {
        self.dirty = true;
        self.inner.set_version(version)
    }

    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let content = self.encode()?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|e| {
            Error::Settings(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Settings(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!("Settings written to {}", self.path.display());
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ACCESS_CONTROL_SECTION, SEARCH_FILTER, URI};
    use serde_json::json;

    #[test]
    fn test_null_clears_key() {
        let mut store = MemorySettingsStore::new();
        let key = SettingKey::plugin(URI);

        store.set(&key, Some(json!("ldap://a"))).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(json!("ldap://a")));

        store.set(&key, Some(Value::Null)).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
        assert!(store.document().plugin.is_empty());
    }

    #[test]
    fn test_section_keys_are_separate() {
        let mut store = MemorySettingsStore::new();
        let legacy = SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_uri");
        store.set(&legacy, Some(json!("ldap://legacy"))).unwrap();

        assert_eq!(store.get(&SettingKey::plugin("ldap_uri")).unwrap(), None);
        assert_eq!(store.get(&legacy).unwrap(), Some(json!("ldap://legacy")));

        store.set(&legacy, None).unwrap();
        assert!(store.document().sections.is_empty());
    }

    #[test]
    fn test_effective_uses_defaults() {
        let mut store = MemorySettingsStore::new();
        assert_eq!(store.effective(SEARCH_FILTER).unwrap(), Some(json!("uid=%s")));
        store
            .set(&SettingKey::plugin(SEARCH_FILTER), Some(json!("mail=%s")))
            .unwrap();
        assert_eq!(store.effective(SEARCH_FILTER).unwrap(), Some(json!("mail=%s")));
        assert_eq!(store.effective(URI).unwrap(), None);
    }

    #[test]
    fn test_version_change_keeps_snapshot() {
        let mut store = MemorySettingsStore::new();
        store
            .set(&SettingKey::plugin("groups"), Some(json!("admins")))
            .unwrap();
        store.set_version(2).unwrap();
        store.set_version(2).unwrap();
        store.set_version(3).unwrap();

        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, None);
        assert_eq!(history[0].plugin["groups"], json!("admins"));
        assert_eq!(history[1].version, Some(2));
        assert_eq!(store.version().unwrap(), Some(3));
    }

    #[test]
    fn test_file_store_round_trip_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut store = FileSettingsStore::open(&path).unwrap();
        assert_eq!(store.version().unwrap(), None);
        store
            .set(&SettingKey::plugin(URI), Some(json!("ldaps://ldap.example.com")))
            .unwrap();
        store
            .set(&SettingKey::plugin(SEARCH_FILTER), Some(Value::Null))
            .unwrap();
        store.set_version(3).unwrap();
        store.save().unwrap();

        let reopened = FileSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.version().unwrap(), Some(3));
        assert_eq!(
            reopened.get(&SettingKey::plugin(URI)).unwrap(),
            Some(json!("ldaps://ldap.example.com"))
        );
        assert!(!reopened.document().plugin.contains_key(SEARCH_FILTER));
    }

    #[test]
    fn test_file_store_round_trip_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[sections.accessControl]\nldap_uri = \"ldap://legacy\"\nldap_tls_reqcert = \"demand\"\n",
        )
        .unwrap();

        let mut store = FileSettingsStore::open(&path).unwrap();
        assert_eq!(store.version().unwrap(), None);
        assert_eq!(
            store
                .get(&SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_uri"))
                .unwrap(),
            Some(json!("ldap://legacy"))
        );

        store
            .set(&SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_uri"), None)
            .unwrap();
        store.set_version(3).unwrap();
        store.save().unwrap();

        let reopened = FileSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.version().unwrap(), Some(3));
        assert_eq!(
            reopened
                .get(&SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_uri"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_unreadable_file_is_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileSettingsStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }
}
