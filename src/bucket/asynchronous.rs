//! Async consumption on top of the reservation primitive.
//!
//! Instead of parking a thread, async callers reserve their tokens and
//! sleep out the reported wait on the tokio timer. The reservation itself
//! never suspends; only the wait does.

use std::time::Duration;

use async_trait::async_trait;

use crate::bucket::TokenBucket;
use crate::error::{BucketError, Result};

/// Scheduled consumption for async callers. Implemented for every
/// [`TokenBucket`].
#[async_trait]
pub trait AsyncTokenBucket {
    /// Consume `tokens`, sleeping until the reservation matures.
    async fn consume_async(&self, tokens: i64) -> Result<()>;

    /// Consume `tokens` if the required wait fits inside `max_wait_nanos`;
    /// returns whether consumption happened.
    async fn try_consume_async(&self, tokens: i64, max_wait_nanos: u64) -> Result<bool>;
}

#[async_trait]
impl<B: TokenBucket + ?Sized> AsyncTokenBucket for B {
    async fn consume_async(&self, tokens: i64) -> Result<()> {
        match self.try_consume_and_return_wait_nanos(tokens, u64::MAX)? {
            Some(0) => Ok(()),
            Some(wait) => {
                tokio::time::sleep(Duration::from_nanos(wait)).await;
                Ok(())
            }
            None => Err(BucketError::InvalidArgument(format!(
                "{tokens} tokens exceed the bucket's capacity and can never be consumed"
            ))),
        }
    }

    async fn try_consume_async(&self, tokens: i64, max_wait_nanos: u64) -> Result<bool> {
        match self.try_consume_and_return_wait_nanos(tokens, max_wait_nanos)? {
            Some(0) => Ok(true),
            Some(wait) => {
                tokio::time::sleep(Duration::from_nanos(wait)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
