//! Setting names, defaults and addressing

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Current settings schema version
pub const SETTINGS_VERSION: u32 = 3;

/// Namespace the plugin keys live under
pub const PLUGIN_IDENTIFIER: &str = "auth_ldap";

/// Host section that held the V1 directory settings
pub const ACCESS_CONTROL_SECTION: &str = "accessControl";

pub const AUTH_PASSWORD: &str = "auth_password";
pub const AUTH_USER: &str = "auth_user";
pub const DEFAULT_ADMIN_GROUP: &str = "default_admin_group";
pub const DEFAULT_USER_GROUP: &str = "default_user_group";
pub const OU_FILTER: &str = "ou_filter";
pub const OU_MEMBER_FILTER: &str = "ou_member_filter";
pub const OU: &str = "ou";
pub const ADMIN_OU: &str = "admin_ou";
pub const USER_OU: &str = "user_ou";
pub const LOCAL_CACHE: &str = "local_cache";
pub const REQUEST_TLS_CERT: &str = "request_tls_cert";
pub const SEARCH_BASE: &str = "search_base";
pub const SEARCH_FILTER: &str = "search_filter";
pub const SEARCH_TERM_TRANSFORM: &str = "search_term_transform";
pub const TIMEOUT_SECONDS: &str = "timeout_seconds";
pub const URI: &str = "uri";
pub const USERID_FIELD: &str = "userid_field";
pub const USERID_PATTERN: &str = "userid_pattern";

/// Default directory operation timeout
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Defaults for every current (V3) plugin key. `Value::Null` means unset.
pub fn defaults() -> BTreeMap<&'static str, Value> {
    BTreeMap::from([
        (AUTH_PASSWORD, Value::Null),
        (AUTH_USER, Value::Null),
        (DEFAULT_ADMIN_GROUP, json!(false)),
        (DEFAULT_USER_GROUP, json!(true)),
        (OU_FILTER, json!("ou=%s")),
        (OU_MEMBER_FILTER, json!("uniqueMember=%s")),
        (OU, Value::Null),
        (ADMIN_OU, Value::Null),
        (USER_OU, Value::Null),
        (LOCAL_CACHE, json!(false)),
        (REQUEST_TLS_CERT, Value::Null),
        (SEARCH_BASE, Value::Null),
        (SEARCH_FILTER, json!("uid=%s")),
        (SEARCH_TERM_TRANSFORM, Value::Null),
        (TIMEOUT_SECONDS, json!(DEFAULT_TIMEOUT_SECONDS)),
        (URI, Value::Null),
        (USERID_FIELD, Value::Null),
        (USERID_PATTERN, Value::Null),
    ])
}

/// Default for a single plugin key, if the key is known and has a non-null default.
pub fn default_for(name: &str) -> Option<Value> {
    defaults().remove(name).filter(|v| !v.is_null())
}

/// Address of a single setting.
///
/// Plugin keys are flat; legacy keys are addressed by the host section
/// they were stored in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    Plugin(String),
    Section { section: String, name: String },
}

impl SettingKey {
    pub fn plugin(name: impl Into<String>) -> Self {
        SettingKey::Plugin(name.into())
    }

    pub fn section(section: impl Into<String>, name: impl Into<String>) -> Self {
        SettingKey::Section {
            section: section.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKey::Plugin(name) => write!(f, "plugins.{}.{}", PLUGIN_IDENTIFIER, name),
            SettingKey::Section { section, name } => write!(f, "{}.{}", section, name),
        }
    }
}
