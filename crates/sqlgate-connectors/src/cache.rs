//! Introspection cache for one live connector.
//!
//! Entries are filled on first access and kept until [`MetadataCache::invalidate`];
//! there is no expiry timer. Failed lookups are not cached.

use std::collections::HashMap;

use sqlgate_core::{CollectionRef, TypeField};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ConnectorError;
use crate::BackendDriver;

/// `(database, collection, schema)`
type SchemaKey = (String, String, Option<String>);

#[derive(Debug, Default)]
pub struct MetadataCache {
    databases: RwLock<Option<Vec<String>>>,
    collections: RwLock<HashMap<String, Vec<CollectionRef>>>,
    schemas: RwLock<HashMap<SchemaKey, Vec<TypeField>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn databases(&self, driver: &dyn BackendDriver) -> Result<Vec<String>, ConnectorError> {
        if let Some(hit) = self.databases.read().await.as_ref() {
            return Ok(hit.clone());
        }
        let fresh = driver.list_databases().await?;
        *self.databases.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    pub async fn collections(
        &self,
        driver: &dyn BackendDriver,
        database: &str,
    ) -> Result<Vec<CollectionRef>, ConnectorError> {
        if let Some(hit) = self.collections.read().await.get(database) {
            return Ok(hit.clone());
        }
        let fresh = driver.list_collections(database).await?;
        self.collections
            .write()
            .await
            .insert(database.to_string(), fresh.clone());
        Ok(fresh)
    }

    pub async fn schema(
        &self,
        driver: &dyn BackendDriver,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TypeField>, ConnectorError> {
        let key = (
            database.to_string(),
            collection.to_string(),
            schema.map(str::to_string),
        );
        if let Some(hit) = self.schemas.read().await.get(&key) {
            return Ok(hit.clone());
        }
        let fresh = driver.get_schema(database, collection, schema).await?;
        self.schemas.write().await.insert(key, fresh.clone());
        Ok(fresh)
    }

    pub async fn invalidate(&self) {
        *self.databases.write().await = None;
        self.collections.write().await.clear();
        self.schemas.write().await.clear();
        debug!("metadata cache invalidated");
    }

    /// Number of cached entries across all three kinds.
    pub async fn len(&self) -> usize {
        usize::from(self.databases.read().await.is_some())
            + self.collections.read().await.len()
            + self.schemas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
