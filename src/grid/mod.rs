//! Grid-backed buckets: state lives in a distributed key/value cache and
//! every mutation executes as an atomic entry transformation.

mod codec;
mod memory;
mod processor;
mod proxy;
mod remote;

pub use codec::{decode_entry, encode_entry, CodecError, SCHEMA_VERSION};
pub use memory::InMemoryGrid;
pub use processor::{
    CommandOutcome, EntryCommand, EntryProcessor, GridBucketState, InvocationResult,
};
pub use proxy::ProxyManager;
pub use remote::{RecoveryStrategy, RemoteBucket};

use thiserror::Error;

/// Failure raised by a grid backend (network, serialization, the cache
/// itself). Surfaced to callers unchanged; the library never retries.
#[derive(Debug, Error)]
#[error("grid backend failure: {message}")]
pub struct GridError {
    message: String,
}

impl GridError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A distributed key/value cache able to apply an [`EntryProcessor`]
/// atomically against one of its entries.
///
/// `invoke` must have read-modify-write semantics under the cache's own
/// per-key locking: load the current entry, run the processor, persist the
/// state it returns, all as one atomic step, possibly on a remote node.
/// [`GridBucketState`] values must round-trip losslessly; backends that
/// persist raw bytes can use [`encode_entry`]/[`decode_entry`].
pub trait GridBackend: Send + Sync {
    /// Apply `processor` atomically against the entry at `key`.
    fn invoke(&self, key: &str, processor: &EntryProcessor) -> Result<InvocationResult, GridError>;

    /// Remove the entry at `key`; returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, GridError>;
}
