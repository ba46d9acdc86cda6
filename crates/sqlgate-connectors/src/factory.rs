//! Descriptor catalog and driver construction by profile type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlgate_core::{ConnectorDescriptor, Profile};
use tracing::info;

use crate::error::ConnectorError;
use crate::{BackendDriver, MySqlDriver, PostgresDriver};

/// Pool sizing applied to every driver the catalog opens.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Rows buffered between a driver's producer task and its consumer.
    pub query_buffer: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(10),
            query_buffer: 64,
        }
    }
}

/// Builds drivers for one backend type.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    fn descriptor(&self) -> &ConnectorDescriptor;

    /// Other spellings of the type accepted in profiles.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn handles(&self, backend_type: &str) -> bool {
        self.descriptor().backend_type.eq_ignore_ascii_case(backend_type)
            || self
                .aliases()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(backend_type))
    }

    /// Opens a pool for `profile`, failing if the backend is unreachable.
    async fn connect(
        &self,
        profile: &Profile,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn BackendDriver>, ConnectorError>;
}

/// Static catalog of supported backend types.
pub struct DriverCatalog {
    factories: Vec<Arc<dyn ConnectorFactory>>,
}

impl DriverCatalog {
    pub fn new(factories: Vec<Arc<dyn ConnectorFactory>>) -> Self {
        Self { factories }
    }

    /// Catalog with the built-in PostgreSQL and MySQL drivers.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Arc::new(PostgresFactory::new()),
            Arc::new(MySqlFactory::new()),
        ])
    }

    pub fn descriptors(&self) -> Vec<ConnectorDescriptor> {
        self.factories
            .iter()
            .map(|f| f.descriptor().clone())
            .collect()
    }

    pub fn factory(&self, backend_type: &str) -> Option<&Arc<dyn ConnectorFactory>> {
        self.factories.iter().find(|f| f.handles(backend_type))
    }

    pub fn descriptor(&self, backend_type: &str) -> Option<&ConnectorDescriptor> {
        self.factory(backend_type).map(|f| f.descriptor())
    }

    pub async fn connect(
        &self,
        profile: &Profile,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn BackendDriver>, ConnectorError> {
        let factory = self
            .factory(&profile.backend_type)
            .ok_or_else(|| ConnectorError::UnsupportedType(profile.backend_type.clone()))?;
        let driver = factory.connect(profile, settings).await?;
        info!(
            "opened {} driver for profile '{}'",
            driver.backend_type(),
            profile.name
        );
        Ok(driver)
    }
}

/// Username and password for `profile`: taken from `auth` when present,
/// otherwise from the `user_key` / `password_key` configs.
pub(crate) fn credentials(
    profile: &Profile,
    user_key: &str,
    password_key: &str,
) -> (Option<String>, Option<String>) {
    match &profile.auth {
        Some(auth) => (Some(auth.username.clone()), auth.password.clone()),
        None => (
            profile.config(user_key).map(str::to_string),
            profile.config(password_key).map(str::to_string),
        ),
    }
}

/// Required config value, trimmed.
pub(crate) fn require_config<'a>(profile: &'a Profile, key: &str) -> Result<&'a str, ConnectorError> {
    profile
        .config(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConnectorError::ConfigError(format!("missing config '{}'", key)))
}

// ---------------------------------------------------------------------------
// Built-in factory implementations
// ---------------------------------------------------------------------------

pub struct PostgresFactory {
    descriptor: ConnectorDescriptor,
}

impl PostgresFactory {
    pub fn new() -> Self {
        Self {
            descriptor: crate::postgres::descriptor(),
        }
    }
}

impl Default for PostgresFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectorFactory for PostgresFactory {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    fn aliases(&self) -> &[&'static str] {
        &["Postgres", "postgresql"]
    }

    async fn connect(
        &self,
        profile: &Profile,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn BackendDriver>, ConnectorError> {
        Ok(Arc::new(PostgresDriver::connect(profile, settings).await?))
    }
}

pub struct MySqlFactory {
    descriptor: ConnectorDescriptor,
}

impl MySqlFactory {
    pub fn new() -> Self {
        Self {
            descriptor: crate::mysql::descriptor(),
        }
    }
}

impl Default for MySqlFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectorFactory for MySqlFactory {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    fn aliases(&self) -> &[&'static str] {
        &["MariaDB"]
    }

    async fn connect(
        &self,
        profile: &Profile,
        settings: &PoolSettings,
    ) -> Result<Arc<dyn BackendDriver>, ConnectorError> {
        Ok(Arc::new(MySqlDriver::connect(profile, settings).await?))
    }
}
