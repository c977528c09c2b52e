//! Multi-bandwidth token-bucket rate limiting with local and grid-backed
//! buckets.
//!
//! Callers declare one or more [`Bandwidth`] limits (for example "1000
//! tokens per minute and 200 per 10 seconds"), obtain a bucket, and consume
//! tokens non-blockingly, blockingly up to a deadline, or asynchronously.
//! Every successful consumption debits every bandwidth by the same amount,
//! so the most restrictive limit always governs.
//!
//! [`LocalBucket`] keeps its state in-process. Remote buckets keep their
//! state in a key/value grid behind the [`grid::GridBackend`] trait; every
//! mutation ships as a named opcode the grid applies atomically, so any
//! number of processes can share one limit.
//!
//! ```
//! use std::time::Duration;
//! use gridbucket::{Bandwidth, LimitsConfig, LocalBucket, TokenBucket};
//!
//! # fn main() -> gridbucket::Result<()> {
//! let config = LimitsConfig::new(vec![
//!     Bandwidth::simple(1000, Duration::from_secs(60))?,
//!     Bandwidth::simple(200, Duration::from_secs(10))?,
//! ])?;
//! let bucket = LocalBucket::new(config);
//!
//! assert!(bucket.try_consume(1)?);
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod clock;
pub mod error;
pub mod grid;
pub mod limits;

pub use bucket::{
    AsyncTokenBucket, BlockingStrategy, InterruptHandle, InterruptibleParking, LocalBucket,
    ThreadParking, TokenBucket,
};
pub use error::{BucketError, Result};
pub use limits::{Bandwidth, LimitsConfig, Refill};
