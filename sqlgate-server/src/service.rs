//! The gateway facade behind every remote operation.
//!
//! All connector failures are converted to [`GatewayError`] here; nothing
//! raw escapes to the transport.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlgate_connectors::{import_from_source, DriverCatalog, ImportRequest, LiveConnector, PoolSettings};
use sqlgate_core::{ConnectorDescriptor, GatewayError, Profile, QueryContext, TypeField};
use tracing::{error, info, warn};

use crate::metrics::GatewayMetrics;
use crate::profiles::ProfileStore;
use crate::query::{CancelRegistry, QueryHandle, QueryPipeline};
use crate::registry::ConnectorRegistry;

/// Where an import landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub collection: String,
}

pub struct Gateway {
    catalog: Arc<DriverCatalog>,
    profiles: ProfileStore,
    registry: ConnectorRegistry,
    pipeline: QueryPipeline,
    metrics: GatewayMetrics,
}

impl Gateway {
    pub fn new(
        catalog: Arc<DriverCatalog>,
        profiles: ProfileStore,
        settings: PoolSettings,
        metrics: GatewayMetrics,
    ) -> Self {
        let buffer = settings.query_buffer;
        Self {
            registry: ConnectorRegistry::new(Arc::clone(&catalog), settings),
            pipeline: QueryPipeline::new(CancelRegistry::new(), metrics.clone(), buffer),
            catalog,
            profiles,
            metrics,
        }
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Opens a live connector for every stored profile. Failures are logged
    /// and retried on the next lookup of that profile.
    pub async fn initialize(&self) {
        let stored = self.profiles.all().await;
        info!("initializing {} stored profiles", stored.len());
        for profile in stored {
            if let Err(e) = self.registry.upsert(&profile).await {
                warn!("profile '{}' not connected at startup: {}", profile.name, e);
            }
        }
        self.refresh_gauge().await;
    }

    pub fn available_configs(&self) -> Vec<ConnectorDescriptor> {
        self.catalog.descriptors()
    }

    pub async fn get_profiles(&self) -> Vec<Profile> {
        self.profiles.list().await
    }

    /// Merges, validates, connects, persists and swaps in one step per name.
    /// On any failure the stored profile and the running instance are kept.
    pub async fn upsert_profile(&self, candidate: Profile) -> Result<Vec<Profile>, GatewayError> {
        let guard = self.registry.lock_name(candidate.name.trim()).await;

        let profile = self.profiles.upsert_candidate(candidate).await?;
        let live = self.registry.open(&profile).await?;
        if let Err(e) = self.profiles.save(profile).await {
            live.close().await;
            return Err(e);
        }
        self.registry.replace(live).await;
        drop(guard);

        self.refresh_gauge().await;
        Ok(self.profiles.list().await)
    }

    /// Removes the profile and closes its live connector. Unknown names are
    /// a no-op.
    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, GatewayError> {
        if self.profiles.get(name).await.is_none() && !self.registry.contains(name).await {
            return Ok(self.profiles.list().await);
        }
        let guard = self.registry.lock_name(name).await;
        self.profiles.delete(name).await?;
        self.registry.remove(name).await;
        drop(guard);

        self.refresh_gauge().await;
        Ok(self.profiles.list().await)
    }

    pub async fn get_databases(&self, profile: &str) -> Result<Vec<String>, GatewayError> {
        let live = self.resolve(profile).await?;
        live.databases().await.map_err(wrap)
    }

    /// Collection names, schema-qualified where the backend has schemas.
    pub async fn get_collections(
        &self,
        profile: &str,
        database: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let live = self.resolve(profile).await?;
        let collections = live.collections(database).await.map_err(wrap)?;
        Ok(collections.iter().map(|c| c.qualified_name()).collect())
    }

    pub async fn get_collection_schema(
        &self,
        profile: &str,
        database: &str,
        collection: &str,
        schema: Option<&str>,
    ) -> Result<Vec<TypeField>, GatewayError> {
        let live = self.resolve(profile).await?;
        live.schema(database, collection, schema)
            .await
            .map_err(wrap)
    }

    pub async fn query(&self, profile: &str, ctx: QueryContext) -> Result<QueryHandle, GatewayError> {
        ctx.validate()?;
        let live = self.resolve(profile).await?;
        self.pipeline.execute(live, ctx).await
    }

    /// Cancels a running query; returns whether one was running.
    pub fn cancel_query(&self, identifier: &str) -> bool {
        let found = self.pipeline.cancels().cancel(identifier);
        if found {
            info!("cancel requested for query '{}'", identifier);
        }
        found
    }

    pub async fn import_from_file(
        &self,
        profile: &str,
        request: ImportRequest,
    ) -> Result<ImportResult, GatewayError> {
        if request.url.trim().is_empty() || request.collection.trim().is_empty() {
            return Err(GatewayError::validation("url and collection are required"));
        }
        let live = self.resolve(profile).await?;
        info!(
            "importing {} into '{}' {}.{}",
            request.url, profile, request.database, request.collection
        );
        let result = import_from_source(live.driver.as_ref(), &request).await;
        self.metrics.import_finished(result.is_ok());
        let rows = result.map_err(wrap)?;
        live.cache.invalidate().await;
        info!("imported {} rows into {}", rows, request.collection);
        Ok(ImportResult {
            database: request.database,
            schema: request.schema.filter(|s| !s.trim().is_empty()),
            collection: request.collection,
        })
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.refresh_gauge().await;
    }

    /// Live connector for `profile`, opening it lazily when the profile is
    /// stored but not connected yet.
    async fn resolve(&self, profile: &str) -> Result<Arc<LiveConnector>, GatewayError> {
        if let Ok(live) = self.registry.resolve(profile).await {
            return Ok(live);
        }
        if self.profiles.get(profile).await.is_none() {
            return Err(GatewayError::not_found(format!("profile '{}' not found", profile)));
        }
        let guard = self.registry.lock_name(profile).await;
        if let Ok(live) = self.registry.resolve(profile).await {
            return Ok(live);
        }
        let stored = self
            .profiles
            .get(profile)
            .await
            .ok_or_else(|| GatewayError::not_found(format!("profile '{}' not found", profile)))?;
        info!("connecting profile '{}' on first use", profile);
        let live = self.registry.open(&stored).await?;
        self.registry.replace(Arc::clone(&live)).await;
        drop(guard);

        self.refresh_gauge().await;
        Ok(live)
    }

    async fn refresh_gauge(&self) {
        self.metrics
            .live_connectors
            .set(self.registry.len().await as i64);
    }
}

fn wrap(e: sqlgate_connectors::ConnectorError) -> GatewayError {
    let err = GatewayError::from(e);
    if let GatewayError::Internal(detail) = &err {
        error!("internal error: {}", detail);
        return GatewayError::internal("unexpected gateway failure");
    }
    err
}
