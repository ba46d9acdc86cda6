//! Live connector registry: at most one open driver per profile name.
//!
//! Mutations for one name are serialized through a per-name async lock whose
//! entry is pruned as soon as nobody holds or waits for it. A replacement is only installed after the new driver connected, so a
//! failed upsert leaves the previous instance serving. Superseded and
//! offloaded instances are closed after they leave the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sqlgate_connectors::{DriverCatalog, LiveConnector, PoolSettings};
use sqlgate_core::{GatewayError, Profile};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};

pub struct ConnectorRegistry {
    catalog: Arc<DriverCatalog>,
    settings: PoolSettings,
    live: RwLock<HashMap<String, Arc<LiveConnector>>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConnectorRegistry {
    pub fn new(catalog: Arc<DriverCatalog>, settings: PoolSettings) -> Self {
        Self {
            catalog,
            settings,
            live: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Serializes upsert/offload for `name` until the guard drops.
    pub async fn lock_name(&self, name: &str) -> NameGuard<'_> {
        let lock = Arc::clone(self.locks().entry(name.to_string()).or_default());
        let held = lock.lock_owned().await;
        NameGuard {
            registry: self,
            name: name.to_string(),
            held: Some(held),
        }
    }

    /// Per-name lock entries currently held or awaited.
    pub fn lock_count(&self) -> usize {
        self.locks().len()
    }

    pub async fn resolve(&self, name: &str) -> Result<Arc<LiveConnector>, GatewayError> {
        self.live
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("profile '{}' not found", name)))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.live.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Connects a new instance for `profile` and swaps it in.
    pub async fn upsert(&self, profile: &Profile) -> Result<Arc<LiveConnector>, GatewayError> {
        let _guard = self.lock_name(&profile.name).await;
        let live = self.open(profile).await?;
        self.replace(Arc::clone(&live)).await;
        Ok(live)
    }

    /// Closes and removes the instance for `name`; no-op when absent.
    pub async fn offload(&self, name: &str) -> bool {
        let _guard = self.lock_name(name).await;
        self.remove(name).await
    }

    /// Opens a driver for `profile` without installing it.
    pub async fn open(&self, profile: &Profile) -> Result<Arc<LiveConnector>, GatewayError> {
        let driver = self
            .catalog
            .connect(profile, &self.settings)
            .await
            .map_err(|e| {
                warn!("cannot open connector for '{}': {}", profile.name, e);
                GatewayError::from(e)
            })?;
        Ok(Arc::new(LiveConnector::new(profile.name.clone(), driver)))
    }

    /// Installs `live`, closing the instance it supersedes.
    /// Callers hold the name lock.
    pub async fn replace(&self, live: Arc<LiveConnector>) {
        let name = live.profile_name.clone();
        let old = self.live.write().await.insert(name.clone(), live);
        match old {
            Some(old) => {
                info!("replaced live connector '{}'", name);
                old.close().await;
            }
            None => info!("registered live connector '{}'", name),
        }
    }

    /// Removes and closes the instance for `name`. Callers hold the name lock.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = self.live.write().await.remove(name);
        match removed {
            Some(live) => {
                live.close().await;
                info!("offloaded live connector '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Closes every instance.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.live.write().await.drain().collect();
        for (_, live) in drained {
            live.close().await;
        }
        info!("connector registry shut down");
    }
}

/// Holds the per-name lock; the map entry goes with the last holder.
pub struct NameGuard<'a> {
    registry: &'a ConnectorRegistry,
    name: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut locks = self.registry.locks();
        // only the map's own reference left: no holder, no waiter
        if locks.get(&self.name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_catalog, fake_profile, FakeScript};
    use std::time::Duration;

    fn registry(script: FakeScript) -> (ConnectorRegistry, FakeScript) {
        let catalog = Arc::new(fake_catalog(script.clone()));
        (ConnectorRegistry::new(catalog, PoolSettings::default()), script)
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let (registry, _) = registry(FakeScript::default());
        let err = registry.resolve("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_replaces_and_closes_previous() {
        let (registry, script) = registry(FakeScript::default());
        let first = registry.upsert(&fake_profile("p1")).await.unwrap();
        let second = registry.upsert(&fake_profile("p1")).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.resolve("p1").await.unwrap(), &second));
        assert_eq!(script.open_instances(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn failed_connect_keeps_previous_instance() {
        let (registry, script) = registry(FakeScript::default());
        let first = registry.upsert(&fake_profile("p1")).await.unwrap();

        script.fail_connect(true);
        let err = registry.upsert(&fake_profile("p1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(Arc::ptr_eq(&registry.resolve("p1").await.unwrap(), &first));
        assert_eq!(script.open_instances(), 1);
    }

    #[tokio::test]
    async fn offload_is_idempotent() {
        let (registry, script) = registry(FakeScript::default());
        registry.upsert(&fake_profile("p1")).await.unwrap();
        assert!(registry.offload("p1").await);
        assert!(!registry.offload("p1").await);
        assert_eq!(script.open_instances(), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn lock_entries_are_pruned_after_release() {
        let (registry, _) = registry(FakeScript::default());
        registry.upsert(&fake_profile("p1")).await.unwrap();
        assert_eq!(registry.lock_count(), 0);

        for i in 0..1_000 {
            registry.offload(&format!("nope-{}", i)).await;
        }
        assert_eq!(registry.lock_count(), 0);

        let guard = registry.lock_name("p1").await;
        assert_eq!(registry.lock_count(), 1);
        drop(guard);
        assert!(registry.offload("p1").await);
        assert_eq!(registry.lock_count(), 0);
    }

    #[tokio::test]
    async fn waiter_keeps_the_lock_entry_alive() {
        let (registry, _) = registry(FakeScript::default());
        let registry = Arc::new(registry);
        let first = registry.lock_name("p1").await;

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let _second = registry.lock_name("p1").await;
                registry.lock_count()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(registry.lock_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_open_instance() {
        let script = FakeScript::default();
        script.set_connect_delay(Duration::from_millis(20));
        let (registry, script) = registry(script);
        let registry = Arc::new(registry);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.upsert(&fake_profile("p1")).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(registry.len().await, 1);
        assert_eq!(script.open_instances(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let (registry, script) = registry(FakeScript::default());
        registry.upsert(&fake_profile("a")).await.unwrap();
        registry.upsert(&fake_profile("b")).await.unwrap();
        registry.shutdown().await;
        assert_eq!(script.open_instances(), 0);
        assert!(registry.is_empty().await);
    }
}
