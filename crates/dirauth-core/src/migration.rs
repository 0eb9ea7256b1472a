//! Settings schema migration
//!
//! Schema versions move forward one step at a time:
//!
//! - version 1 (implicit, never recorded): directory settings lived in the
//!   host's `accessControl` section
//! - version 2: settings moved into the plugin namespace
//! - version 3: role-based names replaced by group/OU names
//!
//! Each step is a fixed table of key renames. A rename writes the legacy
//! value (if any) to the new key and always clears the legacy key, so every
//! step is idempotent on its own and an interrupted run leaves the store
//! valid.

use crate::settings::{
    SettingKey, SettingsStore, ACCESS_CONTROL_SECTION, DEFAULT_ADMIN_GROUP, DEFAULT_USER_GROUP,
    OU, OU_FILTER, OU_MEMBER_FILTER, PLUGIN_IDENTIFIER, REQUEST_TLS_CERT, SEARCH_BASE,
    SETTINGS_VERSION, URI,
};
use crate::Result;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Intermediate V2 key that V3 renames to `ou`
pub const LEGACY_GROUPS: &str = "groups";

/// Rewrites a legacy value on its way to the new key
pub type ValueTransform = fn(legacy_key: &str, value: Value) -> Value;

/// One version transition
#[derive(Clone)]
pub struct MigrationStep {
    pub from_version: u32,
    pub to_version: u32,
    /// Host section holding the legacy keys; `None` for the plugin namespace
    pub source_section: Option<&'static str>,
    /// `(legacy, current)` pairs, applied in order
    pub renames: &'static [(&'static str, &'static str)],
    pub transform: ValueTransform,
}

const V1_TO_V2_RENAMES: &[(&str, &str)] = &[
    ("ldap_uri", URI),
    ("ldap_tls_reqcert", REQUEST_TLS_CERT),
    ("ldap_search_base", SEARCH_BASE),
    ("ldap_groups", LEGACY_GROUPS),
];

const V2_TO_V3_RENAMES: &[(&str, &str)] = &[
    ("default_role_admin", DEFAULT_ADMIN_GROUP),
    ("default_role_user", DEFAULT_USER_GROUP),
    ("group_filter", OU_FILTER),
    ("group_member_filter", OU_MEMBER_FILTER),
    (LEGACY_GROUPS, OU),
];

/// `ldap_tls_reqcert = "demand"` becomes `request_tls_cert = true`.
fn tls_reqcert_to_bool(legacy_key: &str, value: Value) -> Value {
    match (legacy_key, &value) {
        ("ldap_tls_reqcert", Value::String(s)) if s == "demand" => Value::Bool(true),
        _ => value,
    }
}

fn unchanged(_: &str, value: Value) -> Value {
    value
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("source_section", &self.source_section)
            .field("renames", &self.renames)
            .finish_non_exhaustive()
    }
}

impl MigrationStep {
    /// Move the directory settings out of `accessControl`.
    pub fn v1_to_v2() -> Self {
        Self {
            from_version: 1,
            to_version: 2,
            source_section: Some(ACCESS_CONTROL_SECTION),
            renames: V1_TO_V2_RENAMES,
            transform: tls_reqcert_to_bool,
        }
    }

    /// Replace role names with group names.
    pub fn v2_to_v3() -> Self {
        Self {
            from_version: 2,
            to_version: 3,
            source_section: None,
            renames: V2_TO_V3_RENAMES,
            transform: unchanged,
        }
    }

    /// Every legacy key this step reads and clears
    pub fn legacy_keys(&self) -> Vec<SettingKey> {
        self.renames
            .iter()
            .map(|(legacy, _)| self.legacy_key(legacy))
            .collect()
    }

    fn legacy_key(&self, name: &str) -> SettingKey {
        match self.source_section {
            Some(section) => SettingKey::section(section, name),
            None => SettingKey::plugin(name),
        }
    }

    /// Apply every rename of this step.
    pub fn apply(&self, store: &mut dyn SettingsStore, report: &mut MigrationReport) -> Result<()> {
        debug!(
            "Attempting to migrate settings from version {} to version {}",
            self.from_version, self.to_version
        );

        for (legacy_name, current_name) in self.renames {
            let legacy = self.legacy_key(legacy_name);
            let current = SettingKey::plugin(*current_name);

            match store.get(&legacy)? {
                Some(prev_value) => {
                    let cleaned = (self.transform)(legacy_name, prev_value.clone());
                    store.set(&current, Some(cleaned.clone()))?;
                    info!(
                        "{}={} setting migrated to {}={}",
                        legacy, prev_value, current, cleaned
                    );
                    report.migrated.push((legacy.clone(), current));
                }
                None => {
                    debug!("{}=None, migration not necessary", legacy);
                }
            }

            store.set(&legacy, None)?;
            report.cleared.push(legacy);
        }

        report.steps.push((self.from_version, self.to_version));
        Ok(())
    }
}

/// What a migration pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub from: Option<u32>,
    pub to: u32,
    /// `(from, to)` of each applied step
    pub steps: Vec<(u32, u32)>,
    /// `(legacy, current)` keys whose value was carried over
    pub migrated: Vec<(SettingKey, SettingKey)>,
    /// Legacy keys cleared, whether or not they held a value
    pub cleared: Vec<SettingKey>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Brings a settings store forward to the current schema version.
#[derive(Debug, Clone)]
pub struct SettingsMigrator {
    steps: Vec<MigrationStep>,
}

impl Default for SettingsMigrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsMigrator {
    pub fn new() -> Self {
        Self {
            steps: vec![MigrationStep::v1_to_v2(), MigrationStep::v2_to_v3()],
        }
    }

    /// Steps needed to go from `current` to `target`, in order.
    ///
    /// An unrecorded version is the oldest layout, so a fresh install runs
    /// every step. A store already at `target` (or past it) needs none.
    pub fn plan(&self, current: Option<u32>, target: u32) -> Vec<&MigrationStep> {
        if current == Some(target) {
            return Vec::new();
        }
        let start = current.unwrap_or(1);
        self.steps
            .iter()
            .filter(|step| step.from_version >= start && step.to_version <= target)
            .collect()
    }

    /// Migrate from `current` to `target` and record `target` as the store's
    /// version. Does not persist; see [`SettingsMigrator::run`].
    pub fn migrate(
        &self,
        store: &mut dyn SettingsStore,
        current: Option<u32>,
        target: u32,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            from: current,
            to: target,
            ..Default::default()
        };

        if current == Some(target) {
            return Ok(report);
        }

        if let Some(version) = current {
            if version > target {
                warn!(
                    "{} settings are at version {}, newer than supported version {}; leaving them untouched",
                    PLUGIN_IDENTIFIER, version, target
                );
                return Ok(report);
            }
        }

        info!(
            "Migrating {} settings from version {:?} to version {}",
            PLUGIN_IDENTIFIER, current, target
        );

        for step in self.plan(current, target) {
            step.apply(store, &mut report)?;
        }

        store.set_version(target)?;
        Ok(report)
    }

    /// Read the store's version, migrate to [`SETTINGS_VERSION`] and persist.
    ///
    /// Any store error is returned as-is; callers treat it as fatal.
    pub fn run(&self, store: &mut dyn SettingsStore) -> Result<MigrationReport> {
        let current = store.version()?;
        let report = self.migrate(store, current, SETTINGS_VERSION)?;
        if current != Some(SETTINGS_VERSION) {
            store.save()?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettingsStore, SettingsDocument};
    use serde_json::json;

    fn legacy_v1_store() -> MemorySettingsStore {
        let mut store = MemorySettingsStore::new();
        let section = |name: &str| SettingKey::section(ACCESS_CONTROL_SECTION, name);
        store
            .set(&section("ldap_uri"), Some(json!("ldap://ldap.example.com")))
            .unwrap();
        store
            .set(&section("ldap_tls_reqcert"), Some(json!("demand")))
            .unwrap();
        store
            .set(&section("ldap_search_base"), Some(json!("dc=example,dc=com")))
            .unwrap();
        store
            .set(&section("ldap_groups"), Some(json!("printer-admins,printer-users")))
            .unwrap();
        store
    }

    fn legacy_v2_store() -> MemorySettingsStore {
        let mut store = MemorySettingsStore::new();
        let plugin = SettingKey::plugin;
        store
            .set(&plugin(URI), Some(json!("ldap://ldap.example.com")))
            .unwrap();
        store.set(&plugin(REQUEST_TLS_CERT), Some(json!(true))).unwrap();
        store
            .set(&plugin(SEARCH_BASE), Some(json!("dc=example,dc=com")))
            .unwrap();
        store
            .set(&plugin(LEGACY_GROUPS), Some(json!("printer-admins,printer-users")))
            .unwrap();
        store.set_version(2).unwrap();
        store
    }

    fn plugin_keys(store: &MemorySettingsStore) -> SettingsDocument {
        let mut doc = store.document().clone();
        doc.version = None;
        doc
    }

    #[test]
    fn test_plan_fall_through() {
        let migrator = SettingsMigrator::new();
        let steps: Vec<_> = migrator
            .plan(None, 3)
            .iter()
            .map(|s| (s.from_version, s.to_version))
            .collect();
        assert_eq!(steps, vec![(1, 2), (2, 3)]);

        let steps: Vec<_> = migrator
            .plan(Some(2), 3)
            .iter()
            .map(|s| (s.from_version, s.to_version))
            .collect();
        assert_eq!(steps, vec![(2, 3)]);

        assert!(migrator.plan(Some(3), 3).is_empty());
        assert_eq!(migrator.plan(None, 2).len(), 1);
    }

    #[test]
    fn test_current_version_is_noop() {
        let mut store = MemorySettingsStore::new();
        store
            .set(&SettingKey::plugin("group_filter"), Some(json!("cn=%s")))
            .unwrap();
        store.set_version(3).unwrap();
        let before = store.document().clone();

        let report = SettingsMigrator::new()
            .migrate(&mut store, Some(3), 3)
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(store.document(), &before);
    }

    #[test]
    fn test_unversioned_migrates_to_v3() {
        let mut store = legacy_v1_store();
        let report = SettingsMigrator::new().run(&mut store).unwrap();

        assert_eq!(report.steps, vec![(1, 2), (2, 3)]);
        assert_eq!(store.version().unwrap(), Some(3));

        let get = |name: &str| store.get(&SettingKey::plugin(name)).unwrap();
        assert_eq!(get(URI), Some(json!("ldap://ldap.example.com")));
        assert_eq!(get(REQUEST_TLS_CERT), Some(json!(true)));
        assert_eq!(get(SEARCH_BASE), Some(json!("dc=example,dc=com")));
        assert_eq!(get(OU), Some(json!("printer-admins,printer-users")));
        assert_eq!(get(LEGACY_GROUPS), None);
    }

    #[test]
    fn test_v2_and_unversioned_land_on_same_state() {
        let migrator = SettingsMigrator::new();

        let mut from_v1 = legacy_v1_store();
        migrator.run(&mut from_v1).unwrap();

        let mut from_v2 = legacy_v2_store();
        let report = migrator.run(&mut from_v2).unwrap();
        assert_eq!(report.steps, vec![(2, 3)]);

        assert_eq!(plugin_keys(&from_v1), plugin_keys(&from_v2));
        assert_eq!(from_v1.version().unwrap(), from_v2.version().unwrap());
    }

    #[test]
    fn test_tls_reqcert_transform() {
        let mut store = MemorySettingsStore::new();
        store
            .set(
                &SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_tls_reqcert"),
                Some(json!("demand")),
            )
            .unwrap();
        SettingsMigrator::new().run(&mut store).unwrap();
        assert_eq!(
            store.get(&SettingKey::plugin(REQUEST_TLS_CERT)).unwrap(),
            Some(json!(true))
        );

        let mut store = MemorySettingsStore::new();
        store
            .set(
                &SettingKey::section(ACCESS_CONTROL_SECTION, "ldap_tls_reqcert"),
                Some(json!("never")),
            )
            .unwrap();
        SettingsMigrator::new().run(&mut store).unwrap();
        assert_eq!(
            store.get(&SettingKey::plugin(REQUEST_TLS_CERT)).unwrap(),
            Some(json!("never"))
        );
    }

    #[test]
    fn test_every_legacy_key_is_cleared() {
        let mut store = legacy_v1_store();
        store
            .set(&SettingKey::plugin("default_role_admin"), Some(json!(true)))
            .unwrap();
        store
            .set(&SettingKey::plugin("group_member_filter"), Some(json!("member=%s")))
            .unwrap();

        let migrator = SettingsMigrator::new();
        let report = migrator.run(&mut store).unwrap();

        for step in [MigrationStep::v1_to_v2(), MigrationStep::v2_to_v3()] {
            for key in step.legacy_keys() {
                assert_eq!(store.get(&key).unwrap(), None, "{} not cleared", key);
                assert!(report.cleared.contains(&key));
            }
        }
        assert_eq!(
            store.get(&SettingKey::plugin(DEFAULT_ADMIN_GROUP)).unwrap(),
            Some(json!(true))
        );
        assert_eq!(
            store.get(&SettingKey::plugin(OU_MEMBER_FILTER)).unwrap(),
            Some(json!("member=%s"))
        );
        assert!(store.document().sections.is_empty());
    }

    #[test]
    fn test_step_applied_twice_is_idempotent() {
        for step in [MigrationStep::v1_to_v2(), MigrationStep::v2_to_v3()] {
            let mut store = legacy_v1_store();
            store
                .set(&SettingKey::plugin("group_filter"), Some(json!("cn=%s")))
                .unwrap();

            let mut report = MigrationReport::default();
            step.apply(&mut store, &mut report).unwrap();
            let once = store.document().clone();

            step.apply(&mut store, &mut report).unwrap();
            assert_eq!(store.document(), &once);
        }
    }

    #[test]
    fn test_full_run_twice_is_idempotent() {
        let migrator = SettingsMigrator::new();
        let mut store = legacy_v1_store();
        migrator.run(&mut store).unwrap();
        let once = store.document().clone();

        let report = migrator.run(&mut store).unwrap();
        assert!(report.is_noop());
        assert_eq!(store.document(), &once);

        // forcing the whole chain again must not disturb migrated values
        migrator.migrate(&mut store, None, 3).unwrap();
        assert_eq!(store.document(), &once);
    }

    #[test]
    fn test_fresh_install_records_version() {
        let mut store = MemorySettingsStore::new();
        let report = SettingsMigrator::new().run(&mut store).unwrap();
        assert_eq!(report.from, None);
        assert!(report.migrated.is_empty());
        assert_eq!(store.version().unwrap(), Some(3));
        assert!(store.document().plugin.is_empty());
    }

    #[test]
    fn test_newer_store_left_alone() {
        let mut store = MemorySettingsStore::new();
        store.set_version(4).unwrap();
        let report = SettingsMigrator::new().run(&mut store).unwrap();
        assert!(report.is_noop());
        assert_eq!(store.version().unwrap(), Some(4));
    }
}
