//! Snapshotable bucket state.

use serde::{Deserialize, Serialize};

use crate::error::{BucketError, Result};
use crate::limits::LimitsConfig;

/// Counters for one bandwidth: available tokens and the refill mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthState {
    /// Tokens currently available. Goes negative while a reservation is
    /// outstanding.
    pub tokens: i64,
    /// Timestamp of the last refill advance, in wrapping nanoseconds.
    pub last_refill_nanos: u64,
}

/// The mutable counters for every bandwidth of a configuration, in
/// declaration order.
///
/// A small value type, copied on snapshot; the parallel arrays invariant
/// (state size equals configuration size) holds at every observable
/// moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    parts: Vec<BandwidthState>,
}

impl BucketState {
    /// Seed a fresh state from a configuration: each bandwidth starts at
    /// its initial token count with the refill mark at `now_nanos`.
    pub fn initial(config: &LimitsConfig, now_nanos: u64) -> Self {
        let parts = config
            .bandwidths()
            .iter()
            .map(|bandwidth| BandwidthState {
                tokens: bandwidth.initial_tokens(),
                last_refill_nanos: now_nanos,
            })
            .collect();
        Self { parts }
    }

    /// Per-bandwidth counters, in configuration order.
    pub fn parts(&self) -> &[BandwidthState] {
        &self.parts
    }

    pub(crate) fn parts_mut(&mut self) -> &mut [BandwidthState] {
        &mut self.parts
    }

    /// Tokens available across the whole bucket: the minimum over all
    /// bandwidths. Negative while reservations are outstanding.
    pub fn available_tokens(&self) -> i64 {
        self.parts
            .iter()
            .map(|part| part.tokens)
            .min()
            .unwrap_or(0)
    }

    /// Map this state onto a replacement configuration.
    ///
    /// A new bandwidth whose id matches an old one carries its token count
    /// forward, capped at the new capacity; every other bandwidth is seeded
    /// with its initial tokens. Duplicated ids on either side make the
    /// mapping ambiguous and are rejected.
    pub fn migrate(
        &self,
        old_config: &LimitsConfig,
        new_config: &LimitsConfig,
        now_nanos: u64,
    ) -> Result<BucketState> {
        if let Some(id) = duplicated_id(old_config) {
            return Err(BucketError::ReconfigureConflict(format!(
                "current configuration repeats bandwidth id {id:?}"
            )));
        }
        if let Some(id) = duplicated_id(new_config) {
            return Err(BucketError::ReconfigureConflict(format!(
                "replacement configuration repeats bandwidth id {id:?}"
            )));
        }

        let parts = new_config
            .bandwidths()
            .iter()
            .map(|bandwidth| {
                let carried = bandwidth.id().and_then(|id| {
                    old_config
                        .bandwidths()
                        .iter()
                        .position(|old| old.id() == Some(id))
                        .map(|index| self.parts[index])
                });
                match carried {
                    Some(old_part) => BandwidthState {
                        tokens: old_part.tokens.min(bandwidth.capacity()),
                        last_refill_nanos: old_part.last_refill_nanos,
                    },
                    None => BandwidthState {
                        tokens: bandwidth.initial_tokens(),
                        last_refill_nanos: now_nanos,
                    },
                }
            })
            .collect();
        Ok(BucketState { parts })
    }
}

fn duplicated_id(config: &LimitsConfig) -> Option<&str> {
    let mut seen = Vec::new();
    for bandwidth in config.bandwidths() {
        if let Some(id) = bandwidth.id() {
            if seen.contains(&id) {
                return Some(id);
            }
            seen.push(id);
        }
    }
    None
}
