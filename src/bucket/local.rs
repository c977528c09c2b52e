//! In-process buckets.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::bucket::algorithm::{self, Reservation};
use crate::bucket::state::BucketState;
use crate::bucket::{ensure_positive, TokenBucket};
use crate::clock::{MonotonicClock, TimeSource};
use crate::error::Result;
use crate::limits::LimitsConfig;

/// A thread-safe in-process token bucket.
///
/// Configuration and state live together in a single cell; every operation
/// is an atomic read-modify-write inside a short critical section with no
/// suspension points. Blocking consume variants park only after their
/// reservation has been committed, so contention stays bounded by the
/// state transition itself.
pub struct LocalBucket<C = MonotonicClock> {
    clock: C,
    cell: Mutex<Cell>,
}

struct Cell {
    config: Arc<LimitsConfig>,
    state: BucketState,
}

impl LocalBucket<MonotonicClock> {
    /// Build a bucket over the default monotonic clock.
    pub fn new(config: LimitsConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: TimeSource> LocalBucket<C> {
    /// Build a bucket over an injected time source.
    pub fn with_clock(config: LimitsConfig, clock: C) -> Self {
        let state = BucketState::initial(&config, clock.now_nanos());
        Self {
            clock,
            cell: Mutex::new(Cell {
                config: Arc::new(config),
                state,
            }),
        }
    }

    /// A copy of the current state, refilled to the clock's reading.
    pub fn snapshot(&self) -> BucketState {
        let now = self.clock.now_nanos();
        let mut cell = self.cell.lock();
        let Cell { config, state } = &mut *cell;
        algorithm::refill(state, config, now);
        state.clone()
    }

    /// The configuration currently installed.
    pub fn configuration(&self) -> Arc<LimitsConfig> {
        self.cell.lock().config.clone()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut BucketState, &LimitsConfig, u64) -> R) -> R {
        let now = self.clock.now_nanos();
        let mut cell = self.cell.lock();
        let Cell { config, state } = &mut *cell;
        f(state, config, now)
    }
}

impl<C: TimeSource> TokenBucket for LocalBucket<C> {
    fn try_consume(&self, tokens: i64) -> Result<bool> {
        ensure_positive(tokens)?;
        let consumed =
            self.mutate(|state, config, now| algorithm::try_consume(state, config, now, tokens));
        trace!(tokens, consumed, "try_consume");
        Ok(consumed)
    }

    fn try_consume_as_much_as_possible(&self, limit: Option<i64>) -> Result<i64> {
        if let Some(limit) = limit {
            ensure_positive(limit)?;
        }
        let consumed = self.mutate(|state, config, now| {
            algorithm::consume_as_much_as_possible(state, config, now, limit.unwrap_or(i64::MAX))
        });
        trace!(consumed, "consume_as_much_as_possible");
        Ok(consumed)
    }

    fn try_consume_and_return_wait_nanos(
        &self,
        tokens: i64,
        max_wait_nanos: u64,
    ) -> Result<Option<u64>> {
        ensure_positive(tokens)?;
        let reservation = self.mutate(|state, config, now| {
            algorithm::reserve(state, config, now, tokens, max_wait_nanos)
        });
        match reservation {
            Reservation::Wait(wait) => {
                trace!(tokens, wait, "reservation granted");
                Ok(Some(wait))
            }
            Reservation::Rejected => {
                debug!(tokens, max_wait_nanos, "reservation rejected");
                Ok(None)
            }
        }
    }

    fn add_tokens(&self, tokens: i64) -> Result<()> {
        ensure_positive(tokens)?;
        self.mutate(|state, config, now| algorithm::add_tokens(state, config, now, tokens));
        trace!(tokens, "tokens added");
        Ok(())
    }

    fn available_tokens(&self) -> Result<i64> {
        Ok(self.mutate(|state, config, now| {
            algorithm::refill(state, config, now);
            state.available_tokens()
        }))
    }

    fn replace_configuration(&self, config: LimitsConfig) -> Result<()> {
        let now = self.clock.now_nanos();
        let mut cell = self.cell.lock();
        let migrated = cell.state.migrate(&cell.config, &config, now)?;
        debug!(
            bandwidths = config.bandwidths().len(),
            "configuration replaced"
        );
        cell.config = Arc::new(config);
        cell.state = migrated;
        Ok(())
    }
}
