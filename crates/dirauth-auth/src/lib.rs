//! Directory authentication for dirauth

pub mod ldap;

pub use ldap::{
    CredentialVerifier, Directory, DirectoryEntry, DirectorySession, DirectoryStatus,
    GroupMembership, GroupMembershipResolver, IdentityCache, LdapDirectory, LdapServerInfo,
    ResolvedEntry, Role, SearchScope, TimedSession, UserIdentity, UserManager, UserResolver,
};

#[cfg(any(test, feature = "test-utils"))]
pub use ldap::MemoryDirectory;
