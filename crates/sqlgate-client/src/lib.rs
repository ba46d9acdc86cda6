//! sqlgate Client - remote access to a gateway
//!
//! This crate provides:
//! - `GatewayClient`, an HTTP client for every gateway operation
//! - envelope re-assembly of streamed query results
//! - `ClientRegistry`, clients cached by URL and credential fingerprint

pub mod client;
pub mod error;
pub mod registry;

pub use client::{EnvelopeStream, GatewayClient, ImportedCollection, DEFAULT_FLAG};
pub use error::ClientError;
pub use registry::{ClientAuth, ClientRegistry};
