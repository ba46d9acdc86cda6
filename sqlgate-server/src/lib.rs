//! sqlgate Server - SQL gateway service
//!
//! Owns the process-wide state of the gateway:
//! - the profile store and its persisted backing
//! - the connector registry of live drivers, one per profile
//! - the streaming query pipeline and its cancel-handle registry
//! - the HTTP surface, configuration and Prometheus metrics

pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod profiles;
pub mod query;
pub mod registry;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use metrics::GatewayMetrics;
pub use profiles::{JsonFileBacking, MemoryBacking, ProfileBacking, ProfileStore};
pub use query::{CancelGuard, CancelRegistry, QueryHandle, QueryPipeline};
pub use registry::ConnectorRegistry;
pub use service::{Gateway, ImportResult};
