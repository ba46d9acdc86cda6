//! Incremental JSON envelope for a query's result stream.
//!
//! The writer produces
//!
//! ```text
//! {"records": [<row>,<row>,...],"fields": [...],"truncated": <bool>}
//! ```
//!
//! one chunk at a time. Rows are spliced in verbatim; only the trailing
//! `fields` and `truncated` values are held until [`EnvelopeWriter::finish`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::query::ResultFrame;

const OPEN: &[u8] = b"{\"records\": [";

#[derive(Debug, Default)]
pub struct EnvelopeWriter {
    opened: bool,
    wrote_row: bool,
    fields: Option<Bytes>,
    truncated: bool,
}

impl EnvelopeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes to emit for `frame`. May be empty.
    pub fn write_frame(&mut self, frame: &ResultFrame) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.open_into(&mut out);
        match frame {
            ResultFrame::Row(row) => {
                if self.wrote_row {
                    out.put_u8(b',');
                }
                out.extend_from_slice(row);
                self.wrote_row = true;
            }
            ResultFrame::Fields(fields) => {
                self.fields = Some(Bytes::from(serde_json::to_vec(fields)?));
            }
            ResultFrame::Truncated(truncated) => {
                self.truncated = *truncated;
            }
        }
        Ok(out.freeze())
    }

    /// Closes the records array and appends the trailing keys.
    pub fn finish(mut self) -> Bytes {
        let mut out = BytesMut::new();
        self.open_into(&mut out);
        out.put_u8(b']');
        out.extend_from_slice(b",\"fields\": ");
        match &self.fields {
            Some(fields) => out.extend_from_slice(fields),
            None => out.extend_from_slice(b"[]"),
        }
        out.extend_from_slice(b",\"truncated\": ");
        out.extend_from_slice(if self.truncated { b"true" } else { b"false" });
        out.put_u8(b'}');
        out.freeze()
    }

    fn open_into(&mut self, out: &mut BytesMut) {
        if !self.opened {
            out.extend_from_slice(OPEN);
            self.opened = true;
        }
    }
}
