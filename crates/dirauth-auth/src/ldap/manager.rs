//! Authentication orchestration
//!
//! `authenticate` runs connect -> resolve -> verify -> groups with two
//! sessions per request: a service session for searches and a separate one
//! for the user bind. Both are closed before the call returns.

use crate::ldap::cache::IdentityCache;
use crate::ldap::directory::{Directory, DirectorySession, SearchScope, TimedSession};
use crate::ldap::groups::GroupMembershipResolver;
use crate::ldap::resolver::UserResolver;
use crate::ldap::types::{DirectoryStatus, LdapServerInfo, UserIdentity};
use crate::ldap::verifier::CredentialVerifier;
use dirauth_core::{AuthenticationFailed, DirectoryConfig, Error, Result, SettingsStore};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

enum ConfigState {
    Ready(Arc<DirectoryConfig>),
    Invalid(String),
}

/// Directory-backed user manager
pub struct UserManager {
    directory: Arc<dyn Directory>,
    config: RwLock<ConfigState>,
    cache: IdentityCache,
}

impl UserManager {
    /// Create a manager for a valid configuration.
    pub fn new(directory: Arc<dyn Directory>, config: DirectoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            directory,
            config: RwLock::new(ConfigState::Ready(Arc::new(config))),
            cache: IdentityCache::new(),
        })
    }

    /// Create a manager from migrated settings.
    ///
    /// A bad configuration does not stop the host: it is logged once here
    /// and every authentication attempt then fails with
    /// [`Error::Configuration`] until [`UserManager::reload`] fixes it.
    pub fn from_settings(directory: Arc<dyn Directory>, store: &dyn SettingsStore) -> Self {
        let state = match DirectoryConfig::from_settings(store) {
            Ok(config) => ConfigState::Ready(Arc::new(config)),
            Err(e) => {
                error!("LDAP authentication disabled: {}", e);
                ConfigState::Invalid(e.to_string())
            }
        };
        Self {
            directory,
            config: RwLock::new(state),
            cache: IdentityCache::new(),
        }
    }

    /// Current configuration, or the reason there is none.
    pub fn config(&self) -> Result<Arc<DirectoryConfig>> {
        match &*self.config.read() {
            ConfigState::Ready(config) => Ok(config.clone()),
            ConfigState::Invalid(reason) => Err(Error::Configuration(reason.clone())),
        }
    }

    /// Authenticate a user. All failures look the same to the caller; the
    /// cause is logged for operators.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> std::result::Result<UserIdentity, AuthenticationFailed> {
        match self.authenticate_detailed(identifier, password).await {
            Ok(identity) => {
                info!(
                    identifier,
                    dn = %identity.dn,
                    roles = ?identity.roles,
                    "LDAP authentication succeeded"
                );
                Ok(identity)
            }
            Err(e) => {
                warn!(
                    identifier,
                    code = e.code(),
                    transient = e.is_transient(),
                    "LDAP authentication failed: {}",
                    e
                );
                Err(AuthenticationFailed)
            }
        }
    }

    /// Authenticate a user and report exactly why it failed.
    ///
    /// With `local_cache` on, a cached identity is returned without any
    /// directory traffic and without re-checking the password.
    pub async fn authenticate_detailed(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<UserIdentity> {
        CredentialVerifier::check_password(password)?;
        // read before the config, so a reload in between always bumps it
        let generation = self.cache.generation().await;
        let config = self.config()?;

        if config.local_cache {
            if let Some(identity) = self.cache.get(identifier).await {
                debug!("Using cached identity for: {}", identifier);
                return Ok(identity);
            }
        }

        let identity = self
            .directory_authenticate(&config, identifier, password)
            .await?;

        if config.local_cache {
            self.cache
                .insert(identifier, identity.clone(), generation)
                .await;
        }

        Ok(identity)
    }

    /// Look a user up without a password. Cache hits are returned, but a
    /// lookup never populates the cache.
    pub async fn find_user(&self, identifier: &str) -> Result<Option<UserIdentity>> {
        let config = self.config()?;

        if config.local_cache {
            if let Some(identity) = self.cache.get(identifier).await {
                return Ok(Some(identity));
            }
        }

        let mut service = self.service_session(&config).await?;
        let result = async {
            let entry = match UserResolver::resolve(&mut service, &config, identifier).await {
                Ok(entry) => entry,
                Err(Error::UserNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            let membership =
                GroupMembershipResolver::resolve_groups(&mut service, &config, &entry).await;
            Ok(Some(UserIdentity::new(identifier, entry, membership)))
        }
        .await;
        close(&mut service).await;
        result
    }

    /// Connect, bind the service account and read the root DSE.
    pub async fn test_connection(&self) -> Result<LdapServerInfo> {
        let config = self.config()?;
        let mut service = self.service_session(&config).await?;
        let result = service
            .search("", SearchScope::Base, "(objectClass=*)", &ROOT_DSE_ATTRS)
            .await;
        close(&mut service).await;

        let info = match result?.first() {
            Some(entry) => LdapServerInfo::from_root_dse(entry),
            None => LdapServerInfo {
                supported_ldap_version: vec!["3".to_string()],
                ..Default::default()
            },
        };
        Ok(info)
    }

    pub async fn status(&self) -> DirectoryStatus {
        let cached_identities = self.cache.len().await;
        match self.config() {
            Ok(config) => DirectoryStatus {
                configured: true,
                uri: Some(config.uri.clone()),
                local_cache: config.local_cache,
                cached_identities,
                error: None,
            },
            Err(e) => DirectoryStatus {
                configured: false,
                uri: None,
                local_cache: false,
                cached_identities,
                error: Some(e.to_string()),
            },
        }
    }

    /// Swap in a new configuration and drop every cached identity.
    pub async fn reload(&self, config: DirectoryConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = ConfigState::Ready(Arc::new(config));
        self.cache.clear().await;
        info!("LDAP configuration reloaded");
        Ok(())
    }

    /// Rebuild the configuration from settings, see [`UserManager::reload`].
    pub async fn reload_from_settings(&self, store: &dyn SettingsStore) -> Result<()> {
        let config = DirectoryConfig::from_settings(store)?;
        self.reload(config).await
    }

    pub async fn invalidate(&self, identifier: &str) -> bool {
        self.cache.invalidate(identifier).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn directory_authenticate(
        &self,
        config: &DirectoryConfig,
        identifier: &str,
        password: &str,
    ) -> Result<UserIdentity> {
        // Step 1: connect and bind with the service account
        let mut service = self.service_session(config).await?;

        let result = async {
            // Step 2: search for the user
            let entry = UserResolver::resolve(&mut service, config, identifier).await?;

            // Step 3: verify the password on a separate connection
            let mut user_session = TimedSession::connect(self.directory.as_ref(), config).await?;
            let verified =
                CredentialVerifier::verify(&mut user_session, &entry, password).await;
            close(&mut user_session).await;
            verified?;

            // Step 4: groups and roles, looked up as the service account
            let membership =
                GroupMembershipResolver::resolve_groups(&mut service, config, &entry).await;

            Ok(UserIdentity::new(identifier, entry, membership))
        }
        .await;

        close(&mut service).await;
        result
    }

    /// New session bound as the service account, or anonymous without one.
    async fn service_session(&self, config: &DirectoryConfig) -> Result<TimedSession> {
        let mut session = TimedSession::connect(self.directory.as_ref(), config).await?;

        if let Some(bind_user) = &config.bind_user {
            let password = config.bind_password.as_deref().unwrap_or_default();
            match session.bind(bind_user, password).await {
                Ok(true) => {}
                Ok(false) => {
                    close(&mut session).await;
                    return Err(Error::Configuration(format!(
                        "service account bind as {} was rejected",
                        bind_user
                    )));
                }
                Err(e) => {
                    close(&mut session).await;
                    return Err(e);
                }
            }
        }

        Ok(session)
    }
}

const ROOT_DSE_ATTRS: [&str; 4] = [
    "vendorName",
    "vendorVersion",
    "namingContexts",
    "supportedLDAPVersion",
];

async fn close(session: &mut dyn DirectorySession) {
    if let Err(e) = session.unbind().await {
        debug!("Unbind failed: {}", e);
    }
}
