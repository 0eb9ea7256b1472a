//! Identity cache
//!
//! Entries never expire on their own; they live until invalidated or the
//! process restarts. A hit skips the directory entirely, including the
//! credential check.
//!
//! Every invalidation bumps a generation counter. An identity built before
//! the bump is refused on insert, so a login still in flight during a reload
//! cannot repopulate the cache with a stale result.

use crate::ldap::types::UserIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct CacheState {
    generation: u64,
    users: HashMap<String, UserIdentity>,
}

/// Shared identifier -> identity map. Clones share the same entries.
#[derive(Clone, Default)]
pub struct IdentityCache {
    state: Arc<RwLock<CacheState>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, identifier: &str) -> Option<UserIdentity> {
        self.state.read().await.users.get(identifier).cloned()
    }

    /// Current generation; read it before starting the work whose result
    /// gets inserted.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Insert unless the cache was invalidated since `generation`. Last write
    /// wins otherwise.
    pub async fn insert(&self, identifier: &str, identity: UserIdentity, generation: u64) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("Dropping stale identity for: {}", identifier);
            return false;
        }
        state.users.insert(identifier.to_string(), identity);
        true
    }

    pub async fn invalidate(&self, identifier: &str) -> bool {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.users.remove(identifier).is_some()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.users.clear();
        info!("LDAP identity cache cleared");
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
