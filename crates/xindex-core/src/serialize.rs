//! Versioned persistence of [`PerUnitIndex`] records.
//!
//! Cached indexes are stored as JSON inside an envelope:
//!
//! ```json
//! { "format_version": 3, "index": { ... } }
//! ```
//!
//! A record written with a different [`INDEX_FORMAT_VERSION`] is rejected with
//! [`SerializeError::VersionMismatch`] before its body is interpreted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::PerUnitIndex;

/// Format version of persisted indexes.
///
/// Increment this when:
/// - Adding/removing fields from serialized records
/// - Changing field types or serialization format
pub const INDEX_FORMAT_VERSION: u32 = 3;

/// Errors reading or writing persisted indexes.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The record was written by a different format version.
    #[error("index format version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// The record is not valid JSON for the expected shape.
    #[error("malformed index record: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    index: &'a PerUnitIndex,
}

#[derive(Deserialize)]
struct Envelope {
    index: PerUnitIndex,
}

/// Only the header, so a mismatched body is never parsed.
#[derive(Deserialize)]
struct Header {
    format_version: u32,
}

/// Serialize an index with the current format version.
pub fn to_bytes(index: &PerUnitIndex) -> Result<Vec<u8>, SerializeError> {
    Ok(serde_json::to_vec(&EnvelopeRef {
        format_version: INDEX_FORMAT_VERSION,
        index,
    })?)
}

/// Deserialize an index, rejecting other format versions.
pub fn from_bytes(bytes: &[u8]) -> Result<PerUnitIndex, SerializeError> {
    let header: Header = serde_json::from_slice(bytes)?;
    if header.format_version != INDEX_FORMAT_VERSION {
        return Err(SerializeError::VersionMismatch {
            found: header.format_version,
            expected: INDEX_FORMAT_VERSION,
        });
    }
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    Ok(envelope.index)
}
