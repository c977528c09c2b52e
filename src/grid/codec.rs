//! Versioned byte layout for grid entries.
//!
//! Layout: one schema-version byte followed by the bincode body. Backends
//! that persist raw bytes use this pair; backends that store typed values
//! may skip it. The version byte permits schema evolution without
//! breaking entries already in a cache.

use bincode::config::standard;
use thiserror::Error;

use crate::grid::processor::GridBucketState;

/// Schema version written by [`encode_entry`].
pub const SCHEMA_VERSION: u8 = 1;

/// Failure encoding or decoding a grid entry.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("entry encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("entry decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("empty entry payload")]
    Empty,

    #[error("unsupported entry schema version {0}")]
    UnsupportedVersion(u8),

    #[error("trailing bytes after entry body")]
    TrailingBytes,
}

/// Serialize an entry to its on-wire form.
pub fn encode_entry(entry: &GridBucketState) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serde::encode_to_vec(entry, standard())?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(SCHEMA_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Deserialize an entry from its on-wire form.
pub fn decode_entry(bytes: &[u8]) -> Result<GridBucketState, CodecError> {
    let (&version, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    if version != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let (entry, consumed) = bincode::serde::decode_from_slice(body, standard())?;
    if consumed != body.len() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(entry)
}
