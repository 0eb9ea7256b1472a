//! Write access policy for plugin settings
//!
//! Every plugin key is restricted to administrators. Users and anonymous
//! callers can read the effective configuration through the host but never
//! write it.

use super::keys::{defaults, SettingKey};
use super::store::SettingsStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Who is attempting a settings write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsAccess {
    Admin,
    User,
    Never,
}

/// Keys grouped by the lowest access level allowed to write them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestrictedPaths {
    pub admin: Vec<String>,
    pub user: Vec<String>,
    pub never: Vec<String>,
}

impl RestrictedPaths {
    pub fn required_access(&self, name: &str) -> SettingsAccess {
        if self.never.iter().any(|k| k == name) {
            SettingsAccess::Never
        } else if self.user.iter().any(|k| k == name) {
            SettingsAccess::User
        } else {
            // unknown keys are treated like the most restricted writable ones
            SettingsAccess::Admin
        }
    }
}

/// All plugin keys are admin-only.
pub fn restricted_paths() -> RestrictedPaths {
    RestrictedPaths {
        admin: defaults().keys().map(|k| k.to_string()).collect(),
        user: Vec::new(),
        never: Vec::new(),
    }
}

/// Write a plugin setting on behalf of `accessor`.
pub fn write_setting(
    store: &mut dyn SettingsStore,
    accessor: SettingsAccess,
    name: &str,
    value: Option<Value>,
) -> Result<()> {
    let allowed = match (restricted_paths().required_access(name), accessor) {
        (SettingsAccess::Never, _) | (_, SettingsAccess::Never) => false,
        (SettingsAccess::Admin, SettingsAccess::Admin) => true,
        (SettingsAccess::Admin, SettingsAccess::User) => false,
        (SettingsAccess::User, _) => true,
    };

    if !allowed {
        warn!(key = name, ?accessor, "Rejected settings write");
        return Err(Error::AccessDenied(format!(
            "{} may only be written by administrators",
            SettingKey::plugin(name)
        )));
    }

    store.set(&SettingKey::plugin(name), value)?;
    info!(key = name, "Setting updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettingsStore, URI};
    use serde_json::json;

    #[test]
    fn test_all_keys_admin_only() {
        let paths = restricted_paths();
        assert!(paths.user.is_empty());
        assert!(paths.never.is_empty());
        assert!(paths.admin.iter().any(|k| k == URI));
        assert_eq!(paths.required_access(URI), SettingsAccess::Admin);
    }

    #[test]
    fn test_admin_write_allowed() {
        let mut store = MemorySettingsStore::new();
        write_setting(
            &mut store,
            SettingsAccess::Admin,
            URI,
            Some(json!("ldap://ldap.example.com")),
        )
        .unwrap();
        assert_eq!(
            store.get(&SettingKey::plugin(URI)).unwrap(),
            Some(json!("ldap://ldap.example.com"))
        );
    }

    #[test]
    fn test_user_write_rejected() {
        let mut store = MemorySettingsStore::new();
        let err = write_setting(
            &mut store,
            SettingsAccess::User,
            URI,
            Some(json!("ldap://evil.example.com")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
        assert_eq!(store.get(&SettingKey::plugin(URI)).unwrap(), None);

        let err = write_setting(&mut store, SettingsAccess::Never, URI, None).unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }
}
