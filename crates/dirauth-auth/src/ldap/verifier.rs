//! Password check by binding as the resolved entry

use crate::ldap::directory::DirectorySession;
use crate::ldap::types::ResolvedEntry;
use dirauth_core::{Error, Result};
use tracing::debug;

pub struct CredentialVerifier;

impl CredentialVerifier {
    /// Reject an empty password before any directory traffic. An empty
    /// password turns a simple bind into an unauthenticated bind, which
    /// servers accept.
    pub fn check_password(password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::EmptyCredential);
        }
        Ok(())
    }

    /// Bind as `entry` with `password`.
    ///
    /// Every rejection (wrong password, disabled or locked account) is the
    /// same [`Error::InvalidCredential`].
    pub async fn verify(
        session: &mut dyn DirectorySession,
        entry: &ResolvedEntry,
        password: &str,
    ) -> Result<()> {
        Self::check_password(password)?;

        if session.bind(&entry.dn, password).await? {
            debug!("Bind as {} accepted", entry.dn);
            Ok(())
        } else {
            debug!("Bind as {} rejected", entry.dn);
            Err(Error::InvalidCredential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::directory::Directory;
    use crate::ldap::memory::MemoryDirectory;
    use crate::ldap::types::DirectoryEntry;
    use dirauth_core::DirectoryConfig;
    use std::collections::HashMap;

    fn alice() -> ResolvedEntry {
        ResolvedEntry {
            dn: "uid=alice,dc=example,dc=com".to_string(),
            user_id: "alice".to_string(),
            attributes: HashMap::new(),
        }
    }

    async fn verify(dir: &MemoryDirectory, password: &str) -> Result<()> {
        let config = DirectoryConfig::new("ldap://memory", "dc=example,dc=com");
        let mut session = dir.connect(&config).await?;
        CredentialVerifier::verify(session.as_mut(), &alice(), password).await
    }

    #[tokio::test]
    async fn test_verify() {
        let dir = MemoryDirectory::new();
        dir.add_account(DirectoryEntry::new("uid=alice,dc=example,dc=com"), "secret");

        assert!(verify(&dir, "secret").await.is_ok());
        assert!(matches!(
            verify(&dir, "wrong").await,
            Err(Error::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_empty_password_never_binds() {
        let dir = MemoryDirectory::new();
        dir.add_account(DirectoryEntry::new("uid=alice,dc=example,dc=com"), "secret");

        assert!(matches!(verify(&dir, "").await, Err(Error::EmptyCredential)));
        assert_eq!(dir.binds(), 0);
    }
}
