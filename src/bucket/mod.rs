//! Bucket contracts: the consumer-facing trait, its in-process
//! implementation, and the blocking/async envelopes.

pub(crate) mod algorithm;
mod asynchronous;
pub mod blocking;
mod local;
pub mod state;

pub use asynchronous::AsyncTokenBucket;
pub use blocking::{
    BlockingStrategy, InterruptHandle, InterruptibleParking, ThreadParking, WaitInterrupted,
};
pub use local::LocalBucket;
pub use state::{BandwidthState, BucketState};

use crate::error::{BucketError, Result};
use crate::limits::LimitsConfig;

/// The operations every bucket supports, local or grid-backed.
///
/// All non-blocking operations are safe under arbitrary concurrent callers
/// and linearize against the bucket's state cell (or the grid's per-key
/// atomicity). The blocking variants reserve first and park outside the
/// critical section.
pub trait TokenBucket: Send + Sync {
    /// Consume exactly `tokens`, or nothing. Never blocks.
    fn try_consume(&self, tokens: i64) -> Result<bool>;

    /// Consume as many tokens as the most restrictive bandwidth allows, up
    /// to `limit` when given. Returns the amount consumed, possibly zero.
    fn try_consume_as_much_as_possible(&self, limit: Option<i64>) -> Result<i64>;

    /// Reserve `tokens` and report the nanoseconds the caller must wait
    /// before treating the consumption as complete, or `None` when the
    /// reservation cannot be granted within `max_wait_nanos` (or at all).
    /// A granted reservation debits immediately and may drive balances
    /// negative.
    fn try_consume_and_return_wait_nanos(
        &self,
        tokens: i64,
        max_wait_nanos: u64,
    ) -> Result<Option<u64>>;

    /// Return unused tokens or credit the bucket, capped at each
    /// bandwidth's capacity.
    fn add_tokens(&self, tokens: i64) -> Result<()>;

    /// Tokens available right now: the minimum across bandwidths after a
    /// refill. Negative while reservations are outstanding.
    fn available_tokens(&self) -> Result<i64>;

    /// Install a replacement configuration, carrying forward the balances
    /// of bandwidths whose ids match.
    fn replace_configuration(&self, config: LimitsConfig) -> Result<()>;

    /// Consume `tokens`, parking the calling thread until the reservation
    /// matures. An interrupt during the park surfaces as
    /// [`BucketError::WaitInterrupted`]; the reserved tokens stay debited.
    fn consume(&self, tokens: i64, strategy: &dyn BlockingStrategy) -> Result<()> {
        match self.try_consume_and_return_wait_nanos(tokens, u64::MAX)? {
            Some(0) => Ok(()),
            Some(wait) => strategy
                .park(wait)
                .map_err(|WaitInterrupted| BucketError::WaitInterrupted),
            None => Err(BucketError::InvalidArgument(format!(
                "{tokens} tokens exceed the bucket's capacity and can never be consumed"
            ))),
        }
    }

    /// Like [`consume`](TokenBucket::consume), but absorbs interrupts:
    /// the park always runs to completion and any interrupt stays pending
    /// on the strategy for the caller to observe.
    fn consume_uninterruptibly(&self, tokens: i64, strategy: &dyn BlockingStrategy) -> Result<()> {
        match self.try_consume_and_return_wait_nanos(tokens, u64::MAX)? {
            Some(0) => Ok(()),
            Some(wait) => {
                strategy.park_uninterruptibly(wait);
                Ok(())
            }
            None => Err(BucketError::InvalidArgument(format!(
                "{tokens} tokens exceed the bucket's capacity and can never be consumed"
            ))),
        }
    }
}

pub(crate) fn ensure_positive(tokens: i64) -> Result<()> {
    if tokens <= 0 {
        return Err(BucketError::InvalidArgument(format!(
            "token count must be positive, got {tokens}"
        )));
    }
    Ok(())
}
