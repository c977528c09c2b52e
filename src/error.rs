//! Error types for bucket operations.

use thiserror::Error;

use crate::grid::GridError;

/// Main error type for bucket operations.
///
/// All errors surface to the caller synchronously; contention on a bucket's
/// state cell is invisible looping, never an error.
#[derive(Error, Debug)]
pub enum BucketError {
    /// A caller-supplied argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A remote bucket's grid entry is absent and the handle was built with
    /// [`RecoveryStrategy::Throw`](crate::grid::RecoveryStrategy::Throw).
    #[error("no bucket state found for key {key:?}")]
    BucketNotFound {
        /// The grid key the handle is bound to.
        key: String,
    },

    /// A blocking consume was interrupted while parked. The reserved tokens
    /// remain debited.
    #[error("wait interrupted before the reservation completed")]
    WaitInterrupted,

    /// The underlying grid raised; passed through unchanged.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A replacement configuration could not be unambiguously mapped onto
    /// the current state.
    #[error("configuration replacement conflict: {0}")]
    ReconfigureConflict(String),

    /// Configuration parsing failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors while loading configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bucket operations.
pub type Result<T> = std::result::Result<T, BucketError>;
