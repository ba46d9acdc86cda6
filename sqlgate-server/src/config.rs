//! Server configuration from flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use sqlgate_connectors::PoolSettings;

#[derive(Debug, Clone, Parser)]
#[command(name = "sqlgate-server", about = "SQL gateway over PostgreSQL and MySQL backends", version)]
pub struct ServerConfig {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "SQLGATE_BIND_HOST")]
    pub bind_host: String,

    /// HTTP port
    #[arg(long, default_value = "8201", env = "SQLGATE_PORT")]
    pub port: u16,

    /// JSON file holding the stored profiles
    #[arg(long, default_value = "./profiles.json", env = "SQLGATE_PROFILES_PATH")]
    pub profiles_path: PathBuf,

    /// Maximum pooled connections per profile
    #[arg(long, default_value = "8", env = "SQLGATE_MAX_POOL_SIZE")]
    pub max_pool_size: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, default_value = "10", env = "SQLGATE_ACQUIRE_TIMEOUT_SECS")]
    pub acquire_timeout_secs: u64,

    /// Frames buffered per query between the backend and the client
    #[arg(long, default_value = "64", env = "SQLGATE_QUERY_BUFFER")]
    pub query_buffer: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "SQLGATE_LOG")]
    pub log: String,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_pool_size,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            query_buffer: self.query_buffer,
        }
    }
}
