//! Typed directory configuration
//!
//! Built once from a [`SettingsStore`] after migration. Everything the
//! authentication path needs is validated here, so a bad setting surfaces as
//! a single [`Error::Configuration`] instead of failing on each login.

use crate::settings::{self, SettingsStore};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder substituted into filter templates
pub const PLACEHOLDER: &str = "%s";

/// Server certificate policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsCertPolicy {
    /// Whatever the transport does by default
    #[default]
    Unspecified,
    /// Fail when the certificate is missing or invalid
    Require,
    /// Accept any certificate
    Ignore,
}

impl TlsCertPolicy {
    pub fn from_setting(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(TlsCertPolicy::Unspecified),
            Some(Value::Bool(true)) => Ok(TlsCertPolicy::Require),
            Some(Value::Bool(false)) => Ok(TlsCertPolicy::Ignore),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "" => Ok(TlsCertPolicy::Unspecified),
                "true" | "demand" | "require" | "hard" => Ok(TlsCertPolicy::Require),
                // "try" is treated like "allow"
                "false" | "never" | "allow" | "try" | "ignore" => Ok(TlsCertPolicy::Ignore),
                other => Err(Error::Configuration(format!(
                    "unknown {} value: {}",
                    settings::REQUEST_TLS_CERT,
                    other
                ))),
            },
            Some(other) => Err(Error::Configuration(format!(
                "unknown {} value: {}",
                settings::REQUEST_TLS_CERT,
                other
            ))),
        }
    }
}

/// Pure rewrite of the login identifier before it is searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTermTransform {
    Lower,
    Upper,
    Strip,
}

impl SearchTermTransform {
    pub fn apply(&self, term: &str) -> String {
        match self {
            SearchTermTransform::Lower => term.to_lowercase(),
            SearchTermTransform::Upper => term.to_uppercase(),
            SearchTermTransform::Strip => term.trim().to_string(),
        }
    }
}

impl FromStr for SearchTermTransform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lower" | "casefold" => Ok(SearchTermTransform::Lower),
            "upper" => Ok(SearchTermTransform::Upper),
            "strip" => Ok(SearchTermTransform::Strip),
            other => Err(Error::Configuration(format!(
                "unknown {}: {}",
                settings::SEARCH_TERM_TRANSFORM,
                other
            ))),
        }
    }
}

/// How to reach and query the directory
#[derive(Clone)]
pub struct DirectoryConfig {
    /// Server URL (ldap://, ldaps:// or ldapi://)
    pub uri: String,
    pub request_tls_cert: TlsCertPolicy,
    pub search_base: String,
    /// User filter template, e.g. `uid=%s`
    pub search_filter: String,
    pub search_term_transform: Option<SearchTermTransform>,
    /// Attribute holding the canonical user id
    pub userid_field: Option<String>,
    /// Extraction pattern applied to `userid_field`
    pub userid_pattern: Option<Regex>,
    /// Group lookup template, e.g. `ou=%s`
    pub ou_filter: String,
    /// Member attribute template, e.g. `uniqueMember=%s`
    pub ou_member_filter: String,
    /// Directory groups whose membership is reported on the identity
    pub groups: Vec<String>,
    /// Group whose members get the admin role
    pub admin_group_name: Option<String>,
    /// Group whose members get the user role
    pub user_group_name: Option<String>,
    pub default_admin_group: bool,
    pub default_user_group: bool,
    pub local_cache: bool,
    /// Service account used for searches; anonymous when unset
    pub bind_user: Option<String>,
    pub bind_password: Option<String>,
    /// Bound for each directory operation
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            request_tls_cert: TlsCertPolicy::Unspecified,
            search_base: String::new(),
            search_filter: "uid=%s".to_string(),
            search_term_transform: None,
            userid_field: None,
            userid_pattern: None,
            ou_filter: "ou=%s".to_string(),
            ou_member_filter: "uniqueMember=%s".to_string(),
            groups: Vec::new(),
            admin_group_name: None,
            user_group_name: None,
            default_admin_group: false,
            default_user_group: true,
            local_cache: false,
            bind_user: None,
            bind_password: None,
            timeout: Duration::from_secs(settings::DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("uri", &self.uri)
            .field("request_tls_cert", &self.request_tls_cert)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("search_term_transform", &self.search_term_transform)
            .field("userid_field", &self.userid_field)
            .field(
                "userid_pattern",
                &self.userid_pattern.as_ref().map(|r| r.as_str()),
            )
            .field("ou_filter", &self.ou_filter)
            .field("ou_member_filter", &self.ou_member_filter)
            .field("groups", &self.groups)
            .field("admin_group_name", &self.admin_group_name)
            .field("user_group_name", &self.user_group_name)
            .field("default_admin_group", &self.default_admin_group)
            .field("default_user_group", &self.default_user_group)
            .field("local_cache", &self.local_cache)
            .field("bind_user", &self.bind_user)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DirectoryConfig {
    /// Minimal valid configuration, everything else at defaults
    pub fn new(uri: impl Into<String>, search_base: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            search_base: search_base.into(),
            ..Default::default()
        }
    }

    /// Build from the current (V3) settings, applying defaults.
    pub fn from_settings(store: &dyn SettingsStore) -> Result<Self> {
        let get = |name: &str| -> Result<Option<Value>> {
            store
                .effective(name)
                .map_err(|e| Error::Configuration(format!("cannot read {}: {}", name, e)))
        };
        let string = |name: &str| string_setting(name, get(name)?);
        let boolean = |name: &str| bool_setting(name, get(name)?);

        let defaults = Self::default();

        let search_term_transform = string(settings::SEARCH_TERM_TRANSFORM)?
            .map(|s| s.parse::<SearchTermTransform>())
            .transpose()?;

        let userid_pattern = string(settings::USERID_PATTERN)?
            .map(|p| {
                Regex::new(&p).map_err(|e| {
                    Error::Configuration(format!("invalid {}: {}", settings::USERID_PATTERN, e))
                })
            })
            .transpose()?;

        let timeout = match get(settings::TIMEOUT_SECONDS)? {
            None => defaults.timeout,
            Some(value) => Duration::from_secs(value.as_u64().ok_or_else(|| {
                Error::Configuration(format!(
                    "{} must be a positive integer, got {}",
                    settings::TIMEOUT_SECONDS,
                    value
                ))
            })?),
        };

        let config = Self {
            uri: string(settings::URI)?.unwrap_or_default(),
            request_tls_cert: TlsCertPolicy::from_setting(
                get(settings::REQUEST_TLS_CERT)?.as_ref(),
            )?,
            search_base: string(settings::SEARCH_BASE)?.unwrap_or_default(),
            search_filter: string(settings::SEARCH_FILTER)?.unwrap_or(defaults.search_filter),
            search_term_transform,
            userid_field: string(settings::USERID_FIELD)?,
            userid_pattern,
            ou_filter: string(settings::OU_FILTER)?.unwrap_or(defaults.ou_filter),
            ou_member_filter: string(settings::OU_MEMBER_FILTER)?
                .unwrap_or(defaults.ou_member_filter),
            groups: list_setting(settings::OU, get(settings::OU)?)?,
            admin_group_name: string(settings::ADMIN_OU)?,
            user_group_name: string(settings::USER_OU)?,
            default_admin_group: boolean(settings::DEFAULT_ADMIN_GROUP)?
                .unwrap_or(defaults.default_admin_group),
            default_user_group: boolean(settings::DEFAULT_USER_GROUP)?
                .unwrap_or(defaults.default_user_group),
            local_cache: boolean(settings::LOCAL_CACHE)?.unwrap_or(defaults.local_cache),
            bind_user: string(settings::AUTH_USER)?,
            bind_password: string(settings::AUTH_PASSWORD)?,
            timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check everything a login attempt relies on.
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(Error::Configuration("uri is required".to_string()));
        }

        if !["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .any(|scheme| self.uri.starts_with(scheme))
        {
            return Err(Error::Configuration(
                "uri must start with ldap://, ldaps:// or ldapi://".to_string(),
            ));
        }

        if self.search_base.is_empty() {
            return Err(Error::Configuration("search_base is required".to_string()));
        }

        if !self.search_filter.contains(PLACEHOLDER) {
            return Err(Error::Configuration(
                "search_filter must contain a %s placeholder".to_string(),
            ));
        }

        if !self.ou_filter.contains(PLACEHOLDER) {
            return Err(Error::Configuration(
                "ou_filter must contain a %s placeholder".to_string(),
            ));
        }

        match self.ou_member_filter.split_once('=') {
            Some((attr, value))
                if !attr.trim_matches('(').is_empty() && value.contains(PLACEHOLDER) => {}
            _ => {
                return Err(Error::Configuration(
                    "ou_member_filter must look like attribute=%s".to_string(),
                ))
            }
        }

        if self.userid_pattern.is_some() && self.userid_field.is_none() {
            return Err(Error::Configuration(
                "userid_pattern requires userid_field".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(Error::Configuration("timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Apply the configured identifier transform, if any.
    pub fn transform_search_term(&self, identifier: &str) -> String {
        match self.search_term_transform {
            Some(transform) => transform.apply(identifier),
            None => identifier.to_string(),
        }
    }

    /// User search filter for an already-escaped search term
    pub fn build_search_filter(&self, escaped_term: &str) -> String {
        wrap_filter(self.search_filter.replace(PLACEHOLDER, escaped_term))
    }

    /// Group lookup filter for an already-escaped group name
    pub fn build_group_filter(&self, escaped_group: &str) -> String {
        wrap_filter(self.ou_filter.replace(PLACEHOLDER, escaped_group))
    }

    /// Attribute of a group entry that lists its members
    pub fn member_attribute(&self) -> &str {
        self.ou_member_filter
            .split_once('=')
            .map(|(attr, _)| attr.trim_matches('(').trim())
            .unwrap_or(&self.ou_member_filter)
    }

    /// Value the member attribute holds for `dn`
    pub fn member_value(&self, dn: &str) -> String {
        self.ou_member_filter
            .split_once('=')
            .map(|(_, value)| value.trim_end_matches(')').replace(PLACEHOLDER, dn))
            .unwrap_or_else(|| dn.to_string())
    }

    /// Every group that needs a membership lookup, without duplicates
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let candidates = self
            .admin_group_name
            .iter()
            .chain(self.user_group_name.iter())
            .chain(self.groups.iter());
        for name in candidates {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

fn wrap_filter(filter: String) -> String {
    if filter.starts_with('(') {
        filter
    } else {
        format!("({})", filter)
    }
}

fn string_setting(name: &str, value: Option<Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(Error::Configuration(format!(
            "{} must be a string, got {}",
            name, other
        ))),
    }
}

fn bool_setting(name: &str, value: Option<Value>) -> Result<Option<bool>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(Error::Configuration(format!(
                "{} must be a boolean, got {:?}",
                name, s
            ))),
        },
        Some(other) => Err(Error::Configuration(format!(
            "{} must be a boolean, got {}",
            name, other
        ))),
    }
}

/// Comma separated string or JSON array of strings
fn list_setting(name: &str, value: Option<Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(Error::Configuration(format!(
                    "{} entries must be strings, got {}",
                    name, other
                ))),
            })
            .filter(|r| !matches!(r, Ok(s) if s.is_empty()))
            .collect(),
        Some(other) => Err(Error::Configuration(format!(
            "{} must be a list of group names, got {}",
            name, other
        ))),
    }
}
