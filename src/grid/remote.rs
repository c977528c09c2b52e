//! Buckets whose state lives in a grid entry.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::debug;

use crate::bucket::{ensure_positive, TokenBucket};
use crate::clock::{MonotonicClock, TimeSource};
use crate::error::{BucketError, Result};
use crate::grid::processor::{CommandOutcome, EntryCommand, EntryProcessor, InvocationResult};
use crate::grid::{GridBackend, GridError};
use crate::limits::LimitsConfig;

/// What to do when a remote bucket's grid entry is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Silently recreate the entry from the handle's configuration.
    #[default]
    Reconstruct,
    /// Surface [`BucketError::BucketNotFound`].
    Throw,
}

type ConfigSupplier = Box<dyn FnOnce() -> LimitsConfig + Send>;

/// Lazily evaluated configuration: the supplier runs at most once, the
/// first time the grid entry is observed absent, and the result is cached
/// for every later reconstruction.
struct LazyConfig {
    supplier: Mutex<Option<ConfigSupplier>>,
    cached: OnceLock<Arc<LimitsConfig>>,
}

impl LazyConfig {
    fn new(supplier: ConfigSupplier) -> Self {
        Self {
            supplier: Mutex::new(Some(supplier)),
            cached: OnceLock::new(),
        }
    }

    fn get(&self) -> Arc<LimitsConfig> {
        self.cached
            .get_or_init(|| {
                let supplier = self
                    .supplier
                    .lock()
                    .take()
                    .expect("config supplier runs at most once");
                Arc::new(supplier())
            })
            .clone()
    }
}

/// Handle to a bucket stored in a grid.
///
/// Holds only the key, the recovery strategy, and a lazy configuration;
/// all bucket state lives in the grid entry. Operations build an
/// [`EntryProcessor`] and ship it through the backend, which applies it
/// atomically.
pub struct RemoteBucket<G, C = MonotonicClock> {
    grid: Arc<G>,
    key: String,
    recovery: RecoveryStrategy,
    config: LazyConfig,
    clock: C,
}

impl<G: GridBackend> RemoteBucket<G, MonotonicClock> {
    /// Build a handle over the default monotonic clock.
    pub fn new(
        grid: Arc<G>,
        key: impl Into<String>,
        recovery: RecoveryStrategy,
        config_supplier: impl FnOnce() -> LimitsConfig + Send + 'static,
    ) -> Self {
        Self::with_clock(grid, key, recovery, config_supplier, MonotonicClock::new())
    }
}

impl<G: GridBackend, C: TimeSource> RemoteBucket<G, C> {
    /// Build a handle over an injected time source.
    pub fn with_clock(
        grid: Arc<G>,
        key: impl Into<String>,
        recovery: RecoveryStrategy,
        config_supplier: impl FnOnce() -> LimitsConfig + Send + 'static,
        clock: C,
    ) -> Self {
        Self {
            grid,
            key: key.into(),
            recovery,
            config: LazyConfig::new(Box::new(config_supplier)),
            clock,
        }
    }

    /// The grid key this handle is bound to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The recovery strategy selected at construction.
    pub fn recovery(&self) -> RecoveryStrategy {
        self.recovery
    }

    fn invoke(&self, command: EntryCommand) -> Result<CommandOutcome> {
        let now = self.clock.now_nanos();
        let processor = EntryProcessor::new(command.clone(), now);
        match self.grid.invoke(&self.key, &processor)? {
            InvocationResult::Outcome(outcome) => Ok(outcome),
            InvocationResult::Missing => match self.recovery {
                RecoveryStrategy::Throw => {
                    debug!(key = %self.key, "grid entry missing");
                    Err(BucketError::BucketNotFound {
                        key: self.key.clone(),
                    })
                }
                RecoveryStrategy::Reconstruct => {
                    debug!(key = %self.key, "grid entry missing, reconstructing");
                    let config = self.config.get();
                    let processor = EntryProcessor::with_config(command, now, (*config).clone());
                    match self.grid.invoke(&self.key, &processor)? {
                        InvocationResult::Outcome(outcome) => Ok(outcome),
                        InvocationResult::Missing => Err(BucketError::BucketNotFound {
                            key: self.key.clone(),
                        }),
                    }
                }
            },
        }
    }
}

fn unexpected(outcome: CommandOutcome) -> BucketError {
    GridError::new(format!("grid returned a mismatched outcome: {outcome:?}")).into()
}

impl<G: GridBackend, C: TimeSource> TokenBucket for RemoteBucket<G, C> {
    fn try_consume(&self, tokens: i64) -> Result<bool> {
        ensure_positive(tokens)?;
        match self.invoke(EntryCommand::TryConsume { tokens })? {
            CommandOutcome::Consumed(consumed) => Ok(consumed),
            outcome => Err(unexpected(outcome)),
        }
    }

    fn try_consume_as_much_as_possible(&self, limit: Option<i64>) -> Result<i64> {
        if let Some(limit) = limit {
            ensure_positive(limit)?;
        }
        let command = EntryCommand::ConsumeAsMuchAsPossible {
            limit: limit.unwrap_or(i64::MAX),
        };
        match self.invoke(command)? {
            CommandOutcome::ConsumedAmount(consumed) => Ok(consumed),
            outcome => Err(unexpected(outcome)),
        }
    }

    fn try_consume_and_return_wait_nanos(
        &self,
        tokens: i64,
        max_wait_nanos: u64,
    ) -> Result<Option<u64>> {
        ensure_positive(tokens)?;
        let command = EntryCommand::Reserve {
            tokens,
            max_wait_nanos,
        };
        match self.invoke(command)? {
            CommandOutcome::Wait(wait) => Ok(wait),
            outcome => Err(unexpected(outcome)),
        }
    }

    fn add_tokens(&self, tokens: i64) -> Result<()> {
        ensure_positive(tokens)?;
        match self.invoke(EntryCommand::AddTokens { tokens })? {
            CommandOutcome::Done => Ok(()),
            outcome => Err(unexpected(outcome)),
        }
    }

    fn available_tokens(&self) -> Result<i64> {
        match self.invoke(EntryCommand::GetAvailableTokens)? {
            CommandOutcome::Available(tokens) => Ok(tokens),
            outcome => Err(unexpected(outcome)),
        }
    }

    fn replace_configuration(&self, config: LimitsConfig) -> Result<()> {
        match self.invoke(EntryCommand::ReplaceConfiguration { config })? {
            CommandOutcome::Done => Ok(()),
            CommandOutcome::Conflict(message) => Err(BucketError::ReconfigureConflict(message)),
            outcome => Err(unexpected(outcome)),
        }
    }
}
