//! Registry-scoped credential cache.
//!
//! One explicitly constructed instance is shared by the request handlers and
//! the background refresh task. Mutation is serialized per registry host:
//! concurrent callers for the same unseen registry share a single in-flight
//! acquisition, while different registries never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::provider::{CredentialProvider, MalformedCredential, ProviderError, RegistryCredential};

/// Errors surfaced by cache operations
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Provider could not produce a credential for the registry
    #[error("could not get registry credential for {registry}: {source}")]
    Acquisition {
        registry: String,
        #[source]
        source: ProviderError,
    },

    /// Cached credential could not be decoded
    #[error(transparent)]
    Malformed(#[from] MalformedCredential),
}

/// Cache of registry credentials keyed by registry host
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    entries: RwLock<HashMap<String, RegistryCredential>>,
    /// Per-registry acquisition guards; the outer lock is held only long
    /// enough to look up or insert a guard
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            entries: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached credential for a registry, acquiring one on miss.
    ///
    /// At most one acquisition per registry is in flight; callers that miss
    /// while another acquisition runs wait for it and then read its result.
    pub async fn get(&self, registry: &str) -> Result<RegistryCredential, CredentialError> {
        if let Some(found) = self.entries.read().await.get(registry) {
            return Ok(found.clone());
        }

        let guard = self.guard_for(registry).await;
        let _held = guard.lock().await;

        // A concurrent caller may have completed the same acquisition while
        // we waited on the guard
        if let Some(found) = self.entries.read().await.get(registry) {
            return Ok(found.clone());
        }

        self.acquire(registry).await
    }

    /// Eagerly acquire credentials for the configured registries plus the
    /// derived home registry.
    ///
    /// Fails fast on the first acquisition error so a misconfigured identity
    /// is caught at startup, not on the first admission request.
    pub async fn preload(
        &self,
        registries: &[String],
        home_registry: &str,
    ) -> Result<(), CredentialError> {
        for registry in registries {
            self.get(registry).await?;
        }

        if !self.entries.read().await.contains_key(home_registry) {
            self.get(home_registry).await?;
        }

        debug!(count = self.len().await, "preloaded registry credentials");
        Ok(())
    }

    /// Re-acquire every entry whose expiry falls within the lookahead window
    /// or has already passed.
    ///
    /// Invoked periodically by an external timer task; stops at the first
    /// acquisition error so the caller can alert on it.
    pub async fn refresh(&self, lookahead: Duration) -> Result<(), CredentialError> {
        let now = Timestamp::now();
        let expiring: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, credential)| credential.expires_within(lookahead, now))
            .map(|(registry, _)| registry.clone())
            .collect();

        for registry in expiring {
            let guard = self.guard_for(&registry).await;
            let _held = guard.lock().await;
            self.acquire(&registry).await?;
            debug!(registry = %registry, "refreshed registry credential");
        }

        Ok(())
    }

    /// Number of live cache entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn guard_for(&self, registry: &str) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().await;
        guards.entry(registry.to_string()).or_default().clone()
    }

    /// Fetch from the provider and store. Callers must hold the registry's
    /// guard.
    async fn acquire(&self, registry: &str) -> Result<RegistryCredential, CredentialError> {
        let credential =
            self.provider
                .fetch(registry)
                .await
                .map_err(|source| CredentialError::Acquisition {
                    registry: registry.to_string(),
                    source,
                })?;

        self.entries
            .write()
            .await
            .insert(registry.to_string(), credential.clone());
        debug!(registry, expires_at = %credential.expires_at, "cached registry credential");

        Ok(credential)
    }
}
