//! LDAP authentication and authorization
//!
//! Works against:
//! - OpenLDAP, 389 Directory Server
//! - Microsoft Active Directory
//! - an in-memory directory for tests (`test-utils` feature)
//!
//! Features:
//! - Search-then-bind user authentication
//! - Group-based role mapping
//! - Identity caching
//! - TLS/STARTTLS support

mod cache;
mod client;
mod directory;
mod groups;
mod manager;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod resolver;
mod types;
mod verifier;

pub use cache::IdentityCache;
pub use client::LdapDirectory;
pub use directory::{timed, Directory, DirectorySession, SearchScope, TimedSession};
pub use groups::GroupMembershipResolver;
pub use manager::UserManager;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryDirectory;
pub use resolver::UserResolver;
pub use types::*;
pub use verifier::CredentialVerifier;
