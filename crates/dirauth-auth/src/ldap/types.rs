//! Directory entries, identities and status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// ============================================================================
// Directory entries
// ============================================================================

/// Raw search result: a DN and its attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes.insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// All values of an attribute. Attribute names are case-insensitive.
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(|s| s.as_str())
    }
}

/// The single entry a login identifier resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub dn: String,
    /// Canonical user id used downstream
    pub user_id: String,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

// ============================================================================
// Identity
// ============================================================================

/// Local role derived from directory groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

/// Groups an entry belongs to and the roles they grant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub groups: BTreeSet<String>,
    pub roles: BTreeSet<Role>,
}

/// An authenticated (or looked-up) directory user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Identifier the caller logged in with
    pub identifier: String,
    /// Canonical user id extracted from the entry
    pub user_id: String,
    pub dn: String,
    pub groups: BTreeSet<String>,
    pub roles: BTreeSet<Role>,
    pub authenticated_at: DateTime<Utc>,
}

impl UserIdentity {
    pub fn new(identifier: &str, entry: ResolvedEntry, membership: GroupMembership) -> Self {
        Self {
            identifier: identifier.to_string(),
            user_id: entry.user_id,
            dn: entry.dn,
            groups: membership.groups,
            roles: membership.roles,
            authenticated_at: Utc::now(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Directory server information from the root DSE
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LdapServerInfo {
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub naming_contexts: Vec<String>,
    pub supported_ldap_version: Vec<String>,
}

impl LdapServerInfo {
    pub fn from_root_dse(entry: &DirectoryEntry) -> Self {
        Self {
            vendor: entry.first("vendorName").map(String::from),
            version: entry.first("vendorVersion").map(String::from),
            naming_contexts: entry.values("namingContexts").to_vec(),
            supported_ldap_version: entry.values("supportedLDAPVersion").to_vec(),
        }
    }
}

/// Manager status for operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryStatus {
    /// Whether a valid configuration is loaded
    pub configured: bool,
    pub uri: Option<String>,
    pub local_cache: bool,
    pub cached_identities: usize,
    /// Configuration problem, if any
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let entry = DirectoryEntry::new("uid=alice,dc=example,dc=com")
            .with_attribute("mail", &["alice@example.com"])
            .with_attribute("uniqueMember", &["a", "b"]);

        assert_eq!(entry.first("MAIL"), Some("alice@example.com"));
        assert_eq!(entry.values("uniquemember").len(), 2);
        assert!(entry.values("cn").is_empty());
    }

    #[test]
    fn test_identity_roles() {
        let entry = ResolvedEntry {
            dn: "uid=alice,dc=example,dc=com".to_string(),
            user_id: "alice".to_string(),
            attributes: HashMap::new(),
        };
        let membership = GroupMembership {
            groups: BTreeSet::from(["printer-admins".to_string()]),
            roles: BTreeSet::from([Role::Admin]),
        };
        let identity = UserIdentity::new("Alice", entry, membership);

        assert_eq!(identity.identifier, "Alice");
        assert_eq!(identity.user_id, "alice");
        assert!(identity.is_admin());
        assert!(!identity.has_role(Role::User));
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_root_dse_parsing() {
        let entry = DirectoryEntry::new("")
            .with_attribute("vendorName", &["OpenLDAP"])
            .with_attribute("namingContexts", &["dc=example,dc=com"])
            .with_attribute("supportedLDAPVersion", &["3"]);
        let info = LdapServerInfo::from_root_dse(&entry);
        assert_eq!(info.vendor.as_deref(), Some("OpenLDAP"));
        assert_eq!(info.version, None);
        assert_eq!(info.naming_contexts, vec!["dc=example,dc=com"]);
    }
}
