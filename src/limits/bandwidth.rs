//! Bandwidth: one immutable rate rule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BucketError, Result};

/// How tokens become available over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Refill {
    /// Tokens accrue continuously; only whole tokens are observable.
    #[default]
    Smooth,
    /// Tokens arrive in discrete bursts at period boundaries.
    Intervally,
}

/// One rate rule: a capacity plus a refill speed.
///
/// Immutable once constructed; every constructor validates its parameters
/// and rejects out-of-range values with
/// [`BucketError::InvalidArgument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BandwidthWire")]
pub struct Bandwidth {
    capacity: i64,
    refill_period_nanos: u64,
    refill_tokens: i64,
    initial_tokens: i64,
    shape: Refill,
    id: Option<String>,
}

impl Bandwidth {
    /// A bandwidth that refills its whole capacity every `period` and
    /// starts full. The common case.
    pub fn simple(capacity: i64, period: Duration) -> Result<Self> {
        Self::new(capacity, period, capacity)
    }

    /// A smooth bandwidth adding `refill_tokens` per `period`, starting
    /// full.
    pub fn new(capacity: i64, period: Duration, refill_tokens: i64) -> Result<Self> {
        let refill_period_nanos = u64::try_from(period.as_nanos()).map_err(|_| {
            BucketError::InvalidArgument(format!("refill period {period:?} exceeds u64 nanoseconds"))
        })?;
        let bandwidth = Bandwidth {
            capacity,
            refill_period_nanos,
            refill_tokens,
            initial_tokens: capacity,
            shape: Refill::Smooth,
            id: None,
        };
        bandwidth.validate()?;
        Ok(bandwidth)
    }

    /// Override the number of tokens the bucket starts with.
    pub fn with_initial_tokens(mut self, initial_tokens: i64) -> Result<Self> {
        self.initial_tokens = initial_tokens;
        self.validate()?;
        Ok(self)
    }

    /// Attach an identifier used to match this bandwidth across
    /// configuration replacements.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Switch to intervally refill: tokens arrive in bursts at period
    /// boundaries instead of accruing continuously.
    pub fn intervally(mut self) -> Self {
        self.shape = Refill::Intervally;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.capacity <= 0 {
            return Err(BucketError::InvalidArgument(format!(
                "capacity must be positive, got {}",
                self.capacity
            )));
        }
        if self.refill_period_nanos == 0 {
            return Err(BucketError::InvalidArgument(
                "refill period must be positive".to_string(),
            ));
        }
        if self.refill_tokens < 1 || self.refill_tokens > self.capacity {
            return Err(BucketError::InvalidArgument(format!(
                "refill tokens must be in 1..={}, got {}",
                self.capacity, self.refill_tokens
            )));
        }
        if self.initial_tokens < 0 || self.initial_tokens > self.capacity {
            return Err(BucketError::InvalidArgument(format!(
                "initial tokens must be in 0..={}, got {}",
                self.capacity, self.initial_tokens
            )));
        }
        Ok(())
    }

    /// Maximum tokens this bandwidth can hold.
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Length of one refill period in nanoseconds.
    pub fn refill_period_nanos(&self) -> u64 {
        self.refill_period_nanos
    }

    /// Tokens added per refill period.
    pub fn refill_tokens(&self) -> i64 {
        self.refill_tokens
    }

    /// Tokens present when a fresh state is seeded.
    pub fn initial_tokens(&self) -> i64 {
        self.initial_tokens
    }

    /// The refill shape.
    pub fn shape(&self) -> Refill {
        self.shape
    }

    /// The reconfiguration-matching identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Deserialization mirror; re-runs validation so state arriving over the
/// wire obeys the same invariants as locally built values.
#[derive(Deserialize)]
struct BandwidthWire {
    capacity: i64,
    refill_period_nanos: u64,
    refill_tokens: i64,
    initial_tokens: i64,
    shape: Refill,
    id: Option<String>,
}

impl TryFrom<BandwidthWire> for Bandwidth {
    type Error = BucketError;

    fn try_from(wire: BandwidthWire) -> Result<Self> {
        let bandwidth = Bandwidth {
            capacity: wire.capacity,
            refill_period_nanos: wire.refill_period_nanos,
            refill_tokens: wire.refill_tokens,
            initial_tokens: wire.initial_tokens,
            shape: wire.shape,
            id: wire.id,
        };
        bandwidth.validate()?;
        Ok(bandwidth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_starts_full() {
        let bandwidth = Bandwidth::simple(100, Duration::from_secs(60)).unwrap();
        assert_eq!(bandwidth.capacity(), 100);
        assert_eq!(bandwidth.refill_tokens(), 100);
        assert_eq!(bandwidth.initial_tokens(), 100);
        assert_eq!(bandwidth.refill_period_nanos(), 60_000_000_000);
        assert_eq!(bandwidth.shape(), Refill::Smooth);
        assert_eq!(bandwidth.id(), None);
    }

    #[test]
    fn test_rejects_non_positive_capacity() {
        assert!(Bandwidth::simple(0, Duration::from_secs(1)).is_err());
        assert!(Bandwidth::simple(-5, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_rejects_zero_period() {
        assert!(Bandwidth::simple(10, Duration::ZERO).is_err());
    }

    #[test]
    fn test_rejects_refill_beyond_capacity() {
        assert!(Bandwidth::new(10, Duration::from_secs(1), 11).is_err());
        assert!(Bandwidth::new(10, Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn test_initial_tokens_bounds() {
        let bandwidth = Bandwidth::simple(10, Duration::from_secs(1)).unwrap();
        assert!(bandwidth.clone().with_initial_tokens(0).is_ok());
        assert!(bandwidth.clone().with_initial_tokens(10).is_ok());
        assert!(bandwidth.clone().with_initial_tokens(11).is_err());
        assert!(bandwidth.with_initial_tokens(-1).is_err());
    }

    #[test]
    fn test_modifiers() {
        let bandwidth = Bandwidth::new(100, Duration::from_secs(10), 5)
            .unwrap()
            .with_id("per-ten-seconds")
            .intervally();
        assert_eq!(bandwidth.id(), Some("per-ten-seconds"));
        assert_eq!(bandwidth.shape(), Refill::Intervally);
    }

    #[test]
    fn test_wire_round_trip_validates() {
        let bandwidth = Bandwidth::simple(10, Duration::from_secs(1)).unwrap();
        let yaml = serde_yaml::to_string(&bandwidth).unwrap();
        let parsed: Bandwidth = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, bandwidth);

        let bad = yaml.replace("capacity: 10", "capacity: -3");
        assert!(serde_yaml::from_str::<Bandwidth>(&bad).is_err());
    }
}
