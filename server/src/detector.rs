//! Decides whether a connecting session is relayed through the translation bridge.
//!
//! Two signals are combined:
//! - the bridge's own registry, when the bridge is installed
//! - the reserved display-name prefix the bridge gives its players
//!
//! Without a registry only the name counts; with one, either signal is enough.
//! The answer is computed once per session and cached until disconnect.

use crate::config::DetectorConfig;
use crate::error::RegistryError;
use crate::host::BridgeRegistry;
use log::debug;
use shared::{has_bridge_marker, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct BridgeDetector {
    registry: Option<Arc<dyn BridgeRegistry>>,
    name_marker: String,
    registry_timeout: Duration,
    cache: Mutex<HashMap<SessionId, bool>>,
}

impl BridgeDetector {
    pub fn new(registry: Option<Arc<dyn BridgeRegistry>>, config: &DetectorConfig) -> Self {
        Self {
            registry,
            name_marker: config.name_marker.clone(),
            registry_timeout: config.registry_timeout(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry_available(&self) -> bool {
        self.registry.is_some()
    }

    /// Naming signal alone, for hooks that only see a display name.
    pub fn is_marked(&self, display_name: &str) -> bool {
        has_bridge_marker(display_name, &self.name_marker)
    }

    /// Classifies a session, consulting the cache first.
    ///
    /// The registry query runs off the caller's thread and is abandoned after
    /// the configured bound; a slow or failing registry reads as "no signal".
    pub async fn is_bridged(&self, id: SessionId, display_name: &str) -> bool {
        if let Some(cached) = self.cached(id) {
            return cached;
        }

        let named = self.is_marked(display_name);
        let bridged = match self.query_registry(id).await {
            Some(Ok(registered)) => registered || named,
            Some(Err(e)) => {
                debug!("Bridge registry lookup for {} failed: {}", id, e);
                named
            }
            None => named,
        };

        debug!(
            "Session {} ({}) bridged: {} (registry: {}, name: {})",
            id,
            display_name,
            bridged,
            self.registry_available(),
            named
        );

        // A concurrent classification of the same id may have landed first;
        // keep whichever was stored so the flag never changes once visible.
        let mut cache = self.lock_cache();
        *cache.entry(id).or_insert(bridged)
    }

    /// Classification already made for the session, without querying.
    pub fn cached(&self, id: SessionId) -> Option<bool> {
        self.lock_cache().get(&id).copied()
    }

    /// Drops the cached answer; called on disconnect.
    pub fn forget(&self, id: SessionId) {
        self.lock_cache().remove(&id);
    }

    /// `None` when no registry is installed.
    async fn query_registry(&self, id: SessionId) -> Option<Result<bool, RegistryError>> {
        let registry = Arc::clone(self.registry.as_ref()?);
        let lookup = tokio::task::spawn_blocking(move || registry.lookup(id));

        let result = match tokio::time::timeout(self.registry_timeout, lookup).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => Err(RegistryError::Unavailable(e.to_string())),
            Err(_) => Err(RegistryError::TimedOut(
                self.registry_timeout.as_millis() as u64,
            )),
        };
        Some(result)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, bool>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
