//! sqlgate Core - shared gateway model
//!
//! This crate holds everything the gateway, its drivers and its clients agree on:
//! - profiles and connector descriptors
//! - field typing (`SqlType` / `DisplayType`)
//! - query contexts and the result frame stream
//! - the incremental JSON result envelope
//! - the error taxonomy surfaced to callers

pub mod envelope;
pub mod error;
pub mod profile;
pub mod query;
pub mod types;
pub mod wire;

pub use envelope::EnvelopeWriter;
pub use error::{GatewayError, Result};
pub use profile::{Auth, ConfigField, ConfigKind, ConnectorDescriptor, Profile, SECRET_MASK};
pub use query::{ImportJob, QueryContext, QueryOutcome, ResultFrame, DEFAULT_MAX_ROW};
pub use types::{CollectionRef, DisplayType, SchemaField, SqlType, TypeField};
pub use wire::{WireError, WireFrame};
