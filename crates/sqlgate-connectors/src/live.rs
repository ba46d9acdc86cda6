//! Runtime binding of a profile to an open driver.

use std::fmt;
use std::sync::Arc;

use sqlgate_core::{CollectionRef, TypeField};
use tracing::info;

use crate::cache::MetadataCache;
use crate::error::ConnectorError;
use crate::BackendDriver;

/// A profile's open driver together with its metadata cache.
pub struct LiveConnector {
    pub profile_name: String,
    pub backend_type: String,
    pub driver: Arc<dyn BackendDriver>,
    pub cache: MetadataCache,
}

impl fmt::Debug for LiveConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConnector")
            .field("profile_name", &self.profile_name)
            .field("backend_type", &self.backend_type)
            .finish()
    }
}

impl LiveConnector {
    pub fn new(profile_name: impl Into<String>, driver: Arc<dyn BackendDriver>) -> Self {
        Self {
            profile_name: profile_name.into(),
            backend_type: driver.backend_type().to_string(),
            driver,
            cache: MetadataCache::new(),
        }
    }

    pub async fn databases(&self) -> Result<Vec<String>, ConnectorError> {
        self.cache.databases(self.driver.as_ref()).await
    }

    pub async fn collections(&self, database: &str) -> Result<Vec<CollectionRef>, ConnectorError> {
        self.cache.collections(self.driver.as_ref(), database).await
    }

    pub async fn schema(
        &self,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TypeField>, ConnectorError> {
        self.cache
            .schema(self.driver.as_ref(), database, collection, schema)
            .await
    }

    /// Drops cached metadata and closes the driver's pool.
    pub async fn close(&self) {
        self.cache.invalidate().await;
        self.driver.close().await;
        info!("closed live connector '{}'", self.profile_name);
    }
}
