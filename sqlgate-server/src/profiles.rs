//! Profile store: merge, validation, masking and persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use sqlgate_connectors::DriverCatalog;
use sqlgate_core::{Auth, ConnectorDescriptor, GatewayError, Profile, SECRET_MASK};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Where stored profiles live between restarts.
#[async_trait]
pub trait ProfileBacking: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<Profile>>;

    /// Replaces the stored set with `profiles`.
    async fn save(&self, profiles: &[Profile]) -> anyhow::Result<()>;
}

/// Profiles as a pretty-printed JSON array in one file.
#[derive(Debug, Clone)]
pub struct JsonFileBacking {
    path: PathBuf,
}

impl JsonFileBacking {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileBacking for JsonFileBacking {
    async fn load(&self) -> anyhow::Result<Vec<Profile>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing profiles in {}", self.path.display()))
    }

    async fn save(&self, profiles: &[Profile]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(profiles)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        // Write-then-rename so readers never see a half-written file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// Non-persistent backing for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    profiles: Mutex<Vec<Profile>>,
}

impl MemoryBacking {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles: Mutex::new(profiles),
        }
    }

    pub fn snapshot(&self) -> Vec<Profile> {
        self.profiles
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProfileBacking for MemoryBacking {
    async fn load(&self) -> anyhow::Result<Vec<Profile>> {
        Ok(self.snapshot())
    }

    async fn save(&self, profiles: &[Profile]) -> anyhow::Result<()> {
        let mut stored = self
            .profiles
            .lock()
            .map_err(|_| anyhow::anyhow!("profile backing lock poisoned"))?;
        *stored = profiles.to_vec();
        Ok(())
    }
}

pub struct ProfileStore {
    backing: Arc<dyn ProfileBacking>,
    catalog: Arc<DriverCatalog>,
    profiles: RwLock<BTreeMap<String, Profile>>,
}

impl ProfileStore {
    /// Loads the stored profiles from `backing`.
    pub async fn open(
        backing: Arc<dyn ProfileBacking>,
        catalog: Arc<DriverCatalog>,
    ) -> anyhow::Result<Self> {
        let loaded = backing.load().await.context("loading stored profiles")?;
        info!("loaded {} stored profiles", loaded.len());
        let profiles = loaded.into_iter().map(|p| (p.name.clone(), p)).collect();
        Ok(Self {
            backing,
            catalog,
            profiles: RwLock::new(profiles),
        })
    }

    /// All profiles, secrets masked.
    pub async fn list(&self) -> Vec<Profile> {
        self.profiles
            .read()
            .await
            .values()
            .map(|p| p.masked(self.catalog.descriptor(&p.backend_type)))
            .collect()
    }

    /// Stored profile with its secrets in clear.
    pub async fn get(&self, name: &str) -> Option<Profile> {
        self.profiles.read().await.get(name).cloned()
    }

    /// All stored profiles, secrets in clear.
    pub async fn all(&self) -> Vec<Profile> {
        self.profiles.read().await.values().cloned().collect()
    }

    /// Merges `candidate` over the stored profile of the same name and
    /// validates the result. Nothing is persisted.
    pub async fn upsert_candidate(&self, candidate: Profile) -> Result<Profile, GatewayError> {
        let descriptor = self
            .catalog
            .descriptor(&candidate.backend_type)
            .ok_or_else(|| {
                GatewayError::validation(format!(
                    "unknown profile type '{}'",
                    candidate.backend_type
                ))
            })?;
        let previous = self.get(&candidate.name).await;
        merge_profile(candidate, previous.as_ref(), descriptor)
    }

    /// Stores `profile` and persists the whole set.
    pub async fn save(&self, profile: Profile) -> Result<(), GatewayError> {
        let mut profiles = self.profiles.write().await;
        let name = profile.name.clone();
        let previous = profiles.insert(name.clone(), profile);
        let snapshot: Vec<Profile> = profiles.values().cloned().collect();
        if let Err(e) = self.backing.save(&snapshot).await {
            match previous {
                Some(p) => profiles.insert(name.clone(), p),
                None => profiles.remove(&name),
            };
            error!("failed to persist profile '{}': {:#}", name, e);
            return Err(GatewayError::internal(format!(
                "failed to persist profile '{}'",
                name
            )));
        }
        info!("saved profile '{}'", name);
        Ok(())
    }

    /// Removes `name`; returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, GatewayError> {
        let mut profiles = self.profiles.write().await;
        let Some(removed) = profiles.remove(name) else {
            return Ok(false);
        };
        let snapshot: Vec<Profile> = profiles.values().cloned().collect();
        if let Err(e) = self.backing.save(&snapshot).await {
            profiles.insert(name.to_string(), removed);
            error!("failed to persist deletion of '{}': {:#}", name, e);
            return Err(GatewayError::internal(format!(
                "failed to delete profile '{}'",
                name
            )));
        }
        info!("deleted profile '{}'", name);
        Ok(true)
    }
}

/// Applies the upsert merge rules and validates against `descriptor`.
///
/// A submitted [`SECRET_MASK`] keeps the previous value, values that end up
/// blank are dropped, keys the descriptor does not declare are dropped, and
/// every required config must be present afterwards.
pub fn merge_profile(
    candidate: Profile,
    previous: Option<&Profile>,
    descriptor: &ConnectorDescriptor,
) -> Result<Profile, GatewayError> {
    let name = candidate.name.trim().to_string();
    if name.is_empty() {
        return Err(GatewayError::validation("profile name must not be empty"));
    }

    let configs = merge_fields(
        candidate.configs,
        previous.map(|p| &p.configs),
        |key| descriptor.config_field(key).is_some(),
    );
    let optionals = merge_fields(
        candidate.optionals,
        previous.map(|p| &p.optionals),
        |key| descriptor.optional_field(key).is_some(),
    );
    let auth = candidate.auth.and_then(|auth| {
        let password = match auth.password {
            Some(p) if p == SECRET_MASK => previous
                .and_then(|prev| prev.auth.as_ref())
                .and_then(|a| a.password.clone()),
            other => other,
        }
        .filter(|p| !p.trim().is_empty());
        if auth.username.trim().is_empty() && password.is_none() {
            None
        } else {
            Some(Auth {
                username: auth.username,
                password,
            })
        }
    });

    let missing: Vec<&str> = descriptor
        .required_fields()
        .filter(|f| !configs.contains_key(&f.name))
        .map(|f| f.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::validation(format!(
            "missing required field(s) for {}: {}",
            descriptor.backend_type,
            missing.join(", ")
        )));
    }

    Ok(Profile {
        backend_type: descriptor.backend_type.clone(),
        name,
        auth,
        configs,
        optionals,
    })
}

fn merge_fields(
    submitted: BTreeMap<String, String>,
    previous: Option<&BTreeMap<String, String>>,
    declared: impl Fn(&str) -> bool,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for (key, value) in submitted {
        if !declared(&key) {
            debug!("dropping undeclared field '{}'", key);
            continue;
        }
        let value = if value == SECRET_MASK {
            match previous.and_then(|p| p.get(&key)) {
                Some(kept) => kept.clone(),
                None => continue,
            }
        } else {
            value
        };
        if !value.trim().is_empty() {
            merged.insert(key, value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_connectors::mysql;

    fn catalog() -> Arc<DriverCatalog> {
        Arc::new(DriverCatalog::with_defaults())
    }

    fn mysql_profile(password: &str) -> Profile {
        Profile::new("MySQL", "m1")
            .with_config(mysql::ENDPOINT, "db.internal")
            .with_config(mysql::PORT, "3306")
            .with_config(mysql::DATABASE, "shop")
            .with_config(mysql::USERNAME, "app")
            .with_config(mysql::PASSWORD, password)
    }

    async fn store() -> (ProfileStore, Arc<MemoryBacking>) {
        let backing = Arc::new(MemoryBacking::default());
        let store = ProfileStore::open(backing.clone(), catalog()).await.unwrap();
        (store, backing)
    }

    async fn upsert(store: &ProfileStore, candidate: Profile) -> Result<Profile, GatewayError> {
        let merged = store.upsert_candidate(candidate).await?;
        store.save(merged.clone()).await?;
        Ok(merged)
    }

    #[tokio::test]
    async fn list_masks_secrets() {
        let (store, backing) = store().await;
        upsert(&store, mysql_profile("hunter2")).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed[0].config(mysql::PASSWORD), Some(SECRET_MASK));
        assert_eq!(listed[0].config(mysql::USERNAME), Some("app"));
        assert_eq!(backing.snapshot()[0].config(mysql::PASSWORD), Some("hunter2"));
    }

    #[tokio::test]
    async fn submitting_the_mask_keeps_the_secret() {
        let (store, _) = store().await;
        upsert(&store, mysql_profile("hunter2")).await.unwrap();

        let echoed = store.list().await.remove(0);
        upsert(&store, echoed).await.unwrap();
        assert_eq!(
            store.get("m1").await.unwrap().config(mysql::PASSWORD),
            Some("hunter2")
        );

        upsert(&store, mysql_profile("changed")).await.unwrap();
        assert_eq!(
            store.get("m1").await.unwrap().config(mysql::PASSWORD),
            Some("changed")
        );
    }

    #[tokio::test]
    async fn mask_for_an_auth_password_keeps_it() {
        let (store, _) = store().await;
        upsert(&store, mysql_profile("x").with_auth("root", Some("pw".into())))
            .await
            .unwrap();

        let masked = store.list().await.remove(0);
        assert_eq!(masked.auth.as_ref().unwrap().password.as_deref(), Some(SECRET_MASK));
        upsert(&store, masked).await.unwrap();
        let stored = store.get("m1").await.unwrap();
        assert_eq!(stored.auth.unwrap().password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn unknown_fields_are_dropped_and_blank_values_removed() {
        let (store, _) = store().await;
        let merged = store
            .upsert_candidate(
                mysql_profile("x")
                    .with_config("Extra", "1")
                    .with_config(mysql::SCHEMA, "  "),
            )
            .await
            .unwrap();
        assert!(merged.config("Extra").is_none());
        assert!(merged.config(mysql::SCHEMA).is_none());
    }

    #[tokio::test]
    async fn missing_required_field_is_a_validation_error() {
        let (store, _) = store().await;
        let mut candidate = mysql_profile("x");
        candidate.configs.remove(mysql::DATABASE);
        let err = store.upsert_candidate(candidate).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(err.message().contains(mysql::DATABASE));
    }

    #[tokio::test]
    async fn blank_required_field_is_a_validation_error() {
        let (store, _) = store().await;
        let err = store
            .upsert_candidate(mysql_profile(""))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_type_is_a_validation_error() {
        let (store, _) = store().await;
        let err = store
            .upsert_candidate(Profile::new("Oracle", "o1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn alias_type_is_stored_canonically() {
        let (store, _) = store().await;
        let merged = store
            .upsert_candidate(
                Profile::new("Postgres", "p1")
                    .with_config("endpoint", "h")
                    .with_config("port", "5432")
                    .with_config("database", "d"),
            )
            .await
            .unwrap();
        assert_eq!(merged.backend_type, "PostgreSQL");
    }

    #[tokio::test]
    async fn delete_removes_and_persists() {
        let (store, backing) = store().await;
        upsert(&store, mysql_profile("x")).await.unwrap();
        assert!(store.delete("m1").await.unwrap());
        assert!(!store.delete("m1").await.unwrap());
        assert!(backing.snapshot().is_empty());
    }

    #[tokio::test]
    async fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profiles.json");
        let backing = Arc::new(JsonFileBacking::new(&path));

        let store = ProfileStore::open(backing.clone(), catalog()).await.unwrap();
        assert!(store.list().await.is_empty());
        upsert(&store, mysql_profile("hunter2")).await.unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("profiles.json.tmp").exists());

        let reopened = ProfileStore::open(backing, catalog()).await.unwrap();
        assert_eq!(
            reopened.get("m1").await.unwrap().config(mysql::PASSWORD),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn corrupt_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, b"{not json").unwrap();
        let result = ProfileStore::open(Arc::new(JsonFileBacking::new(&path)), catalog()).await;
        assert!(result.is_err());
    }
}
