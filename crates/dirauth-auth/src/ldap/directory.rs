//! Directory access seam
//!
//! The engine only needs connect, search and bind. [`Directory`] opens
//! sessions; a [`DirectorySession`] is owned by exactly one request and is
//! never shared, since a user bind changes the identity of the connection.

use crate::ldap::types::DirectoryEntry;
use async_trait::async_trait;
use dirauth_core::{DirectoryConfig, Error, Result};
use std::future::Future;
use std::time::Duration;

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base entry
    Base,
    /// The base entry and everything below it
    Subtree,
}

/// Opens sessions to a directory server
#[async_trait]
pub trait Directory: Send + Sync {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>>;
}

/// One connection to the directory
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind. `Ok(false)` means the server rejected the credentials;
    /// `Err` is reserved for transport and server failures.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool>;

    /// Search and return matching entries. An empty `attrs` requests all
    /// user attributes.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>>;

    async fn unbind(&mut self) -> Result<()>;
}

/// Run a directory operation under `limit`; elapsed time is reported as the
/// directory being unavailable.
pub async fn timed<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::DirectoryUnavailable(format!(
            "{} timed out after {:?}",
            operation, limit
        ))),
    }
}

/// Session wrapper that bounds every operation by the configured timeout
pub struct TimedSession {
    inner: Box<dyn DirectorySession>,
    timeout: Duration,
}

impl TimedSession {
    /// Connect through `directory`, bounding the connect itself too.
    pub async fn connect(directory: &dyn Directory, config: &DirectoryConfig) -> Result<Self> {
        let inner = timed(config.timeout, "connect", directory.connect(config)).await?;
        Ok(Self {
            inner,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl DirectorySession for TimedSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool> {
        timed(self.timeout, "bind", self.inner.bind(dn, password)).await
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        timed(
            self.timeout,
            "search",
            self.inner.search(base, scope, filter, attrs),
        )
        .await
    }

    async fn unbind(&mut self) -> Result<()> {
        timed(self.timeout, "unbind", self.inner.unbind()).await
    }
}
