//! LDAP directory backed by `ldap3`
//!
//! Handles LDAP, LDAPS and STARTTLS connections and maps server result codes
//! onto the crate's error taxonomy.

use crate::ldap::directory::{Directory, DirectorySession, SearchScope};
use crate::ldap::types::DirectoryEntry;
use async_trait::async_trait;
use dirauth_core::{DirectoryConfig, Error, Result, TlsCertPolicy};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::io;
use tracing::{debug, warn};

/// LDAP result codes the engine distinguishes
mod rc {
    pub const SUCCESS: u32 = 0;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const OTHER: u32 = 80;
}

/// Opens one `ldap3` connection per session
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapDirectory;

impl LdapDirectory {
    pub fn new() -> Self {
        Self
    }

    /// Connection settings for the configured TLS policy
    fn connection_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
        let settings = LdapConnSettings::new().set_conn_timeout(config.timeout);

        let settings = match config.request_tls_cert {
            TlsCertPolicy::Unspecified => settings,
            TlsCertPolicy::Ignore => settings.set_no_tls_verify(true),
            TlsCertPolicy::Require => {
                if config.uri.starts_with("ldapi://") {
                    return Err(Error::TlsVerification(
                        "a server certificate is required but ldapi:// never presents one"
                            .to_string(),
                    ));
                }
                // plain ldap:// must upgrade so a certificate gets presented
                settings
                    .set_starttls(config.uri.starts_with("ldap://"))
                    .set_no_tls_verify(false)
            }
        };

        Ok(settings)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>> {
        let settings = Self::connection_settings(config)?;

        debug!("Connecting to LDAP server: {}", config.uri);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &config.uri)
            .await
            .map_err(|e| connect_error(config, e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection error: {}", e);
            }
        });

        Ok(Box::new(LdapSession { ldap }))
    }
}

/// Live `ldap3` connection
pub struct LdapSession {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<bool> {
        let result = self
            .ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Bind failed: {}", e)))?;

        match result.rc {
            rc::SUCCESS => Ok(true),
            rc::BUSY | rc::UNAVAILABLE | rc::OTHER => Err(Error::DirectoryUnavailable(format!(
                "Bind failed with code {}: {}",
                result.rc, result.text
            ))),
            code => {
                if code != rc::INVALID_CREDENTIALS {
                    debug!("Bind for {} rejected with code {}", dn, code);
                }
                Ok(false)
            }
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        let scope = match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        };

        let ldap3::SearchResult(entries, result) = self
            .ldap
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Search failed: {}", e)))?;

        match result.rc {
            rc::SUCCESS => {}
            rc::NO_SUCH_OBJECT => {
                return Err(Error::Configuration(format!(
                    "search base {} does not exist",
                    base
                )))
            }
            code => {
                return Err(Error::DirectoryUnavailable(format!(
                    "Search error {}: {}",
                    code, result.text
                )))
            }
        }

        Ok(entries
            .into_iter()
            .map(|raw| {
                let entry = SearchEntry::construct(raw);
                DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry.attrs.into_iter().collect(),
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Unbind failed: {}", e)))
    }
}

/// Whether the connection negotiates TLS, either directly or through StartTLS
fn uses_tls(config: &DirectoryConfig) -> bool {
    config.uri.starts_with("ldaps://")
        || (config.request_tls_cert == TlsCertPolicy::Require && config.uri.starts_with("ldap://"))
}

/// Sort a connect failure into TLS or availability problems.
///
/// Once TLS is in play and certificates are checked, anything that breaks
/// the handshake or the StartTLS exchange is a TLS failure. Failing to reach
/// the server at all stays an availability problem.
fn connect_error(config: &DirectoryConfig, e: LdapError) -> Error {
    let verifying = config.request_tls_cert != TlsCertPolicy::Ignore;
    let tls_failure = match &e {
        LdapError::Rustls { .. } | LdapError::DNSName { .. } => verifying,
        LdapError::Io { source } => {
            verifying
                && uses_tls(config)
                && matches!(
                    source.kind(),
                    io::ErrorKind::InvalidData
                        | io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                )
        }
        // the server dropped or refused the StartTLS request
        LdapError::ResultRecv { .. } | LdapError::OpSend { .. } | LdapError::LdapResult { .. } => {
            verifying && uses_tls(config)
        }
        _ => false,
    };

    if tls_failure {
        Error::TlsVerification(format!("{}: {}", config.uri, e))
    } else {
        Error::DirectoryUnavailable(format!("Failed to connect to {}: {}", config.uri, e))
    }
}
