//! Transport framing of [`ResultFrame`]s.
//!
//! Each frame travels as one JSON object. Row payloads are base64 so that
//! arbitrary row bytes survive any text transport; the receiver decodes them
//! back to the raw bytes before splicing them into the envelope.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::query::ResultFrame;
use crate::types::SchemaField;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFrame {
    Fields(Vec<SchemaField>),
    Row(String),
    Truncated(bool),
    /// Terminates a failed stream.
    Error(WireError),
}

impl WireFrame {
    /// Back to a result frame; an `error` frame becomes the error it carries.
    pub fn into_result(self) -> Result<ResultFrame> {
        match self {
            WireFrame::Fields(fields) => Ok(ResultFrame::Fields(fields)),
            WireFrame::Row(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(|raw| ResultFrame::Row(Bytes::from(raw)))
                .map_err(|e| GatewayError::internal(format!("bad row payload: {}", e))),
            WireFrame::Truncated(t) => Ok(ResultFrame::Truncated(t)),
            WireFrame::Error(e) => Err(GatewayError::from_code(&e.code, e.message)),
        }
    }
}

impl From<&ResultFrame> for WireFrame {
    fn from(frame: &ResultFrame) -> Self {
        match frame {
            ResultFrame::Fields(fields) => WireFrame::Fields(fields.clone()),
            ResultFrame::Row(row) => WireFrame::Row(STANDARD.encode(row)),
            ResultFrame::Truncated(t) => WireFrame::Truncated(*t),
        }
    }
}

impl From<&GatewayError> for WireFrame {
    fn from(err: &GatewayError) -> Self {
        WireFrame::Error(WireError {
            code: err.code().to_string(),
            message: err.message().to_string(),
        })
    }
}
