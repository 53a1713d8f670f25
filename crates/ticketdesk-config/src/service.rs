//! Configuration lookup contract and the binding that resolves request profiles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConfigId, Configuration};
use crate::validate::validate_snapshot;

/// Backend capable of looking up configuration profiles by identifier.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the profile stored under `id`, or `None` when it does not exist.
    async fn lookup(&self, id: ConfigId) -> ConfigResult<Option<Configuration>>;
}

/// Shared reference to a configuration backend.
pub type SharedConfigStore = Arc<dyn ConfigStore>;

/// Resolves configuration identifiers into validated, shareable snapshots.
#[derive(Clone)]
pub struct ConfigBinding {
    store: SharedConfigStore,
}

impl ConfigBinding {
    /// Bind to the supplied configuration backend.
    #[must_use]
    pub fn new(store: SharedConfigStore) -> Self {
        Self { store }
    }

    /// Resolve `id` into a snapshot whose identifier matches exactly.
    ///
    /// # Errors
    ///
    /// - `ConfigError::NotFound` for a zero identifier or an unknown profile.
    /// - `ConfigError::Mismatch` when the store returns another profile.
    /// - `ConfigError::InvalidField` when a ranged field is out of bounds.
    /// - `ConfigError::Backend` when the store itself fails.
    pub async fn resolve(&self, id: ConfigId) -> ConfigResult<Arc<Configuration>> {
        if id == 0 {
            return Err(ConfigError::NotFound { id });
        }

        let config = self
            .store
            .lookup(id)
            .await?
            .ok_or(ConfigError::NotFound { id })?;

        if config.id != id {
            warn!(requested = id, resolved = config.id, "configuration store returned another profile");
            return Err(ConfigError::Mismatch {
                requested: id,
                resolved: config.id,
            });
        }

        validate_snapshot(&config)?;
        debug!(config_id = id, "configuration resolved");
        Ok(Arc::new(config))
    }
}

/// In-process configuration store for embedded deployments and tests.
#[derive(Default)]
pub struct MemoryConfigStore {
    profiles: RwLock<HashMap<ConfigId, Configuration>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile, keyed by its own identifier.
    pub fn insert(&self, config: Configuration) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(config.id, config);
    }
}

impl FromIterator<Configuration> for MemoryConfigStore {
    fn from_iter<I: IntoIterator<Item = Configuration>>(iter: I) -> Self {
        let store = Self::new();
        for config in iter {
            store.insert(config);
        }
        store
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn lookup(&self, id: ConfigId) -> ConfigResult<Option<Configuration>> {
        Ok(self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MislabelledStore;

    #[async_trait]
    impl ConfigStore for MislabelledStore {
        async fn lookup(&self, _id: ConfigId) -> ConfigResult<Option<Configuration>> {
            let mut config = sample();
            config.id = 99;
            Ok(Some(config))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ConfigStore for FailingStore {
        async fn lookup(&self, _id: ConfigId) -> ConfigResult<Option<Configuration>> {
            Err(ConfigError::backend("lookup", io::Error::other("offline")))
        }
    }

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn lookup(&self, _id: ConfigId) -> ConfigResult<Option<Configuration>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test]
    async fn resolve_returns_matching_snapshot() -> ConfigResult<()> {
        let store: MemoryConfigStore = [sample()].into_iter().collect();
        let binding = ConfigBinding::new(Arc::new(store));
        let config = binding.resolve(1).await?;
        assert_eq!(config.id, 1);
        assert_eq!(config.log_level, 2);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_rejects_zero_without_consulting_store() {
        let store = Arc::new(CountingStore::default());
        let binding = ConfigBinding::new(store.clone());
        let result = binding.resolve(0).await;
        assert!(matches!(result, Err(ConfigError::NotFound { id: 0 })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_reports_unknown_profiles() {
        let binding = ConfigBinding::new(Arc::new(MemoryConfigStore::new()));
        let result = binding.resolve(4).await;
        assert!(matches!(result, Err(ConfigError::NotFound { id: 4 })));
    }

    #[tokio::test]
    async fn resolve_treats_identifier_mismatch_as_failure() {
        let binding = ConfigBinding::new(Arc::new(MislabelledStore));
        let result = binding.resolve(1).await;
        assert!(matches!(
            result,
            Err(ConfigError::Mismatch {
                requested: 1,
                resolved: 99
            })
        ));
    }

    #[tokio::test]
    async fn resolve_propagates_backend_failures() {
        let binding = ConfigBinding::new(Arc::new(FailingStore));
        let result = binding.resolve(1).await;
        assert!(matches!(
            result,
            Err(ConfigError::Backend {
                operation: "lookup",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn resolve_validates_ranged_fields() {
        let mut config = sample();
        config.log_level = 7;
        let store: MemoryConfigStore = [config].into_iter().collect();
        let binding = ConfigBinding::new(Arc::new(store));
        assert!(matches!(
            binding.resolve(1).await,
            Err(ConfigError::InvalidField { .. })
        ));
    }
}
