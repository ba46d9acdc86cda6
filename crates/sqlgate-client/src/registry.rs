//! Client cache keyed by gateway URL and credential fingerprint.
//!
//! A cached client is only handed out again while the caller presents the
//! same credentials. Any change to the normalized auth material evicts the
//! stale client before a fresh one is built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::client::GatewayClient;
use crate::error::ClientError;

/// How a client authenticates to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuth {
    None,
    Bearer(String),
    /// Trust the gateway certificate through a custom CA bundle.
    Tls { ca_pem: String },
}

impl ClientAuth {
    fn kind(&self) -> &'static str {
        match self {
            ClientAuth::None => "none",
            ClientAuth::Bearer(_) => "bearer",
            ClientAuth::Tls { .. } => "tls",
        }
    }

    fn material(&self) -> &str {
        match self {
            ClientAuth::None => "",
            ClientAuth::Bearer(token) => token,
            ClientAuth::Tls { ca_pem } => ca_pem,
        }
    }

    /// Hex SHA-256 over the auth kind and its normalized material.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize(self.material()).as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        let builder = reqwest::Client::builder();
        let builder = match self {
            ClientAuth::None => builder,
            ClientAuth::Bearer(token) => {
                let token = normalize(token);
                if token.is_empty() {
                    return Err(ClientError::InvalidAuth("empty bearer token".into()));
                }
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ClientError::InvalidAuth(e.to_string()))?;
                value.set_sensitive(true);
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, value);
                builder.default_headers(headers)
            }
            ClientAuth::Tls { ca_pem } => {
                let pem = normalize(ca_pem);
                if pem.is_empty() {
                    return Err(ClientError::InvalidAuth("empty CA certificate".into()));
                }
                let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                    .map_err(|e| ClientError::InvalidAuth(format!("bad CA certificate: {}", e)))?;
                builder.add_root_certificate(cert)
            }
        };
        Ok(builder.build()?)
    }
}

fn normalize(material: &str) -> String {
    material.replace("\r\n", "\n").trim().to_string()
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

struct Entry {
    fingerprint: String,
    client: Arc<GatewayClient>,
}

#[derive(Default)]
pub struct ClientRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The cached client for `url`, or a fresh one when none is cached or
    /// `auth` differs from the credentials it was built with.
    pub fn get(&self, url: &str, auth: ClientAuth) -> Result<Arc<GatewayClient>, ClientError> {
        let key = normalize_url(url);
        let fingerprint = auth.fingerprint();

        let mut entries = self.entries();
        if let Some(entry) = entries.get(&key) {
            if entry.fingerprint == fingerprint {
                return Ok(Arc::clone(&entry.client));
            }
            entries.remove(&key);
            info!("credentials changed for {}, evicting cached client", key);
        }

        let client = Arc::new(GatewayClient::new(&key, &auth)?);
        entries.insert(
            key,
            Entry {
                fingerprint,
                client: Arc::clone(&client),
            },
        );
        Ok(client)
    }

    pub fn remove(&self, url: &str) -> bool {
        self.entries().remove(&normalize_url(url)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
