//! Login identifier to directory entry

use crate::ldap::directory::{DirectorySession, SearchScope};
use crate::ldap::types::{DirectoryEntry, ResolvedEntry};
use dirauth_core::{DirectoryConfig, Error, Result};
use tracing::debug;

/// Finds the single directory entry behind a login identifier
pub struct UserResolver;

impl UserResolver {
    /// Search for `identifier` under the search base.
    ///
    /// Exactly one match resolves; none is [`Error::UserNotFound`] and more
    /// than one is [`Error::AmbiguousUser`].
    pub async fn resolve(
        session: &mut dyn DirectorySession,
        config: &DirectoryConfig,
        identifier: &str,
    ) -> Result<ResolvedEntry> {
        let term = config.transform_search_term(identifier);
        let filter = config.build_search_filter(&ldap3::ldap_escape(&term));

        debug!("Searching for user with filter: {}", filter);

        let mut matches = session
            .search(&config.search_base, SearchScope::Subtree, &filter, &[])
            .await?;

        let entry = match matches.len() {
            0 => return Err(Error::UserNotFound(identifier.to_string())),
            1 => matches.remove(0),
            n => {
                return Err(Error::AmbiguousUser {
                    identifier: identifier.to_string(),
                    matches: n,
                })
            }
        };

        debug!("Found user DN: {}", entry.dn);

        let user_id = Self::extract_user_id(config, &entry, &term)?;
        Ok(ResolvedEntry {
            dn: entry.dn,
            user_id,
            attributes: entry.attributes,
        })
    }

    /// Canonical user id for a matched entry.
    ///
    /// Without `userid_field` the (transformed) search term is the id. With
    /// a pattern, its first capture group wins, else the whole match.
    pub fn extract_user_id(
        config: &DirectoryConfig,
        entry: &DirectoryEntry,
        search_term: &str,
    ) -> Result<String> {
        let field = match &config.userid_field {
            Some(field) => field,
            None => return Ok(search_term.to_string()),
        };

        let value = entry.first(field).ok_or_else(|| {
            Error::IdentifierExtraction(format!("{} has no {} attribute", entry.dn, field))
        })?;

        let pattern = match &config.userid_pattern {
            Some(pattern) => pattern,
            None => return Ok(value.to_string()),
        };

        let captures = pattern.captures(value).ok_or_else(|| {
            Error::IdentifierExtraction(format!(
                "{}={} does not match {}",
                field,
                value,
                pattern.as_str()
            ))
        })?;

        let extracted = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if extracted.is_empty() {
            return Err(Error::IdentifierExtraction(format!(
                "{} extracted an empty id from {}",
                pattern.as_str(),
                value
            )));
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::directory::Directory;
    use crate::ldap::memory::MemoryDirectory;
    use dirauth_core::SearchTermTransform;
    use regex::Regex;

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://memory", "dc=example,dc=com")
    }

    fn person(uid: &str, mail: &str) -> DirectoryEntry {
        DirectoryEntry::new(format!("uid={},ou=people,dc=example,dc=com", uid))
            .with_attribute("uid", &[uid])
            .with_attribute("mail", &[mail])
            .with_attribute("cn", &["Shared Name"])
    }

    async fn resolve(dir: &MemoryDirectory, config: &DirectoryConfig, id: &str) -> Result<ResolvedEntry> {
        let mut session = dir.connect(config).await?;
        UserResolver::resolve(session.as_mut(), config, id).await
    }

    #[tokio::test]
    async fn test_resolution_cardinality() {
        let dir = MemoryDirectory::new();
        dir.add_entry(person("alice", "alice@example.com"));
        dir.add_entry(person("bob", "bob@example.com"));

        let entry = resolve(&dir, &config(), "alice").await.unwrap();
        assert_eq!(entry.dn, "uid=alice,ou=people,dc=example,dc=com");
        assert_eq!(entry.user_id, "alice");

        assert!(matches!(
            resolve(&dir, &config(), "carol").await,
            Err(Error::UserNotFound(_))
        ));

        let by_cn = DirectoryConfig {
            search_filter: "cn=%s".to_string(),
            ..config()
        };
        assert!(matches!(
            resolve(&dir, &by_cn, "Shared Name").await,
            Err(Error::AmbiguousUser { matches: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_search_term_is_transformed_and_escaped() {
        let dir = MemoryDirectory::new();
        dir.add_entry(person("alice", "alice@example.com"));

        let lower = DirectoryConfig {
            search_term_transform: Some(SearchTermTransform::Lower),
            ..config()
        };
        assert_eq!(resolve(&dir, &lower, "ALICE").await.unwrap().user_id, "alice");

        // a wildcard in the identifier must not widen the search
        assert!(matches!(
            resolve(&dir, &config(), "*").await,
            Err(Error::UserNotFound(_))
        ));
    }

    #[test]
    fn test_extract_user_id_with_pattern() {
        let entry = person("alice", "alice@example.com");
        let config = DirectoryConfig {
            userid_field: Some("mail".to_string()),
            userid_pattern: Some(Regex::new(r"^([^@]+)@example\.com$").unwrap()),
            ..config()
        };
        assert_eq!(
            UserResolver::extract_user_id(&config, &entry, "alice").unwrap(),
            "alice"
        );

        let other = person("mallory", "mallory@elsewhere.org");
        assert!(matches!(
            UserResolver::extract_user_id(&config, &other, "mallory"),
            Err(Error::IdentifierExtraction(_))
        ));
    }

    #[test]
    fn test_extract_user_id_field_only() {
        let entry = person("alice", "alice@example.com");
        let config = DirectoryConfig {
            userid_field: Some("mail".to_string()),
            ..config()
        };
        assert_eq!(
            UserResolver::extract_user_id(&config, &entry, "alice").unwrap(),
            "alice@example.com"
        );

        let config = DirectoryConfig {
            userid_field: Some("employeeNumber".to_string()),
            ..config
        };
        assert!(matches!(
            UserResolver::extract_user_id(&config, &entry, "alice"),
            Err(Error::IdentifierExtraction(_))
        ));
    }
}
