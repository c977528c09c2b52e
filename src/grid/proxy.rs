//! Factory for remote bucket handles over a shared grid.

use std::sync::Arc;

use tracing::debug;

use crate::grid::remote::{RecoveryStrategy, RemoteBucket};
use crate::grid::{GridBackend, GridError};
use crate::limits::LimitsConfig;

/// Yields lazy [`RemoteBucket`] handles bound to keys in one grid cache.
///
/// The manager itself holds nothing but the backend handle and the
/// recovery strategy applied to the proxies it creates; bucket state is
/// created lazily in the grid on first operation.
pub struct ProxyManager<G> {
    grid: Arc<G>,
    recovery: RecoveryStrategy,
}

impl<G: GridBackend> ProxyManager<G> {
    /// Build a manager with the default [`RecoveryStrategy::Reconstruct`].
    pub fn new(grid: Arc<G>) -> Self {
        Self {
            grid,
            recovery: RecoveryStrategy::default(),
        }
    }

    /// Select the recovery strategy handed to proxies.
    pub fn with_recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = recovery;
        self
    }

    /// A handle to the bucket at `key`. The configuration supplier is
    /// evaluated at most once, the first time the entry is observed
    /// absent.
    pub fn proxy(
        &self,
        key: impl Into<String>,
        config_supplier: impl FnOnce() -> LimitsConfig + Send + 'static,
    ) -> RemoteBucket<G> {
        let key = key.into();
        debug!(key = %key, recovery = ?self.recovery, "creating bucket proxy");
        RemoteBucket::new(self.grid.clone(), key, self.recovery, config_supplier)
    }

    /// Destroy the entry at `key`; returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, GridError> {
        self.grid.remove(key)
    }

    /// The backend this manager creates proxies over.
    pub fn grid(&self) -> &Arc<G> {
        &self.grid
    }
}
