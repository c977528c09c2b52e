//! Limit configurations and their file format.
//!
//! A configuration is an ordered, non-empty list of bandwidths; the
//! effective limit at any moment is the most restrictive of the list.
//! Configurations can be built in code or loaded from YAML through a raw
//! serde form that fills in the usual defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BucketError, Result};
use crate::limits::bandwidth::{Bandwidth, Refill};

/// An ordered, non-empty list of bandwidths governing one bucket.
///
/// Installed once and read-only for its lifetime; replacement goes through
/// `TokenBucket::replace_configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LimitsConfigWire")]
pub struct LimitsConfig {
    bandwidths: Vec<Bandwidth>,
}

impl LimitsConfig {
    /// Build a configuration from an ordered bandwidth list. Rejects an
    /// empty list.
    pub fn new(bandwidths: Vec<Bandwidth>) -> Result<Self> {
        if bandwidths.is_empty() {
            return Err(BucketError::InvalidArgument(
                "a configuration requires at least one bandwidth".to_string(),
            ));
        }
        Ok(Self { bandwidths })
    }

    /// Build a single-bandwidth configuration.
    pub fn single(bandwidth: Bandwidth) -> Self {
        Self {
            bandwidths: vec![bandwidth],
        }
    }

    /// The bandwidths, in declaration order.
    pub fn bandwidths(&self) -> &[Bandwidth] {
        &self.bandwidths
    }

    /// The smallest capacity across all bandwidths. No request larger than
    /// this can ever be satisfied.
    pub fn min_capacity(&self) -> i64 {
        self.bandwidths
            .iter()
            .map(Bandwidth::capacity)
            .min()
            .unwrap_or(0)
    }

    /// Load a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: LimitsFile = serde_yaml::from_str(yaml)
            .map_err(|e| BucketError::Config(format!("failed to parse limits: {e}")))?;
        file.build()
    }

    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limits configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

#[derive(Deserialize)]
struct LimitsConfigWire {
    bandwidths: Vec<Bandwidth>,
}

impl TryFrom<LimitsConfigWire> for LimitsConfig {
    type Error = BucketError;

    fn try_from(wire: LimitsConfigWire) -> Result<Self> {
        LimitsConfig::new(wire.bandwidths)
    }
}

/// Time unit for limit declarations in files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Raw file form of a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsFile {
    /// Declared bandwidths, in order of declaration.
    #[serde(default)]
    pub bandwidths: Vec<BandwidthRule>,
}

impl LimitsFile {
    /// Convert the raw rules into a validated configuration.
    pub fn build(&self) -> Result<LimitsConfig> {
        let bandwidths = self
            .bandwidths
            .iter()
            .map(BandwidthRule::build)
            .collect::<Result<Vec<_>>>()?;
        LimitsConfig::new(bandwidths)
    }
}

/// One declared bandwidth as it appears in a file.
///
/// `refill_tokens` and `initial_tokens` default to the capacity, matching
/// [`Bandwidth::simple`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthRule {
    /// Maximum tokens the bandwidth can hold.
    pub capacity: i64,
    /// Tokens added per period; defaults to `capacity`.
    #[serde(default)]
    pub refill_tokens: Option<i64>,
    /// Number of `unit`s making up one refill period.
    pub period: u64,
    /// The time unit for `period`.
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,
    /// Tokens present initially; defaults to `capacity`.
    #[serde(default)]
    pub initial_tokens: Option<i64>,
    /// Refill shape; defaults to smooth.
    #[serde(default)]
    pub shape: Refill,
    /// Optional reconfiguration-matching identifier.
    #[serde(default)]
    pub id: Option<String>,
}

fn default_unit() -> TimeUnit {
    TimeUnit::Second
}

impl BandwidthRule {
    /// Convert the rule into a validated [`Bandwidth`].
    pub fn build(&self) -> Result<Bandwidth> {
        let period = self
            .unit
            .duration()
            .checked_mul(u32::try_from(self.period).map_err(|_| {
                BucketError::InvalidArgument(format!("period {} is out of range", self.period))
            })?)
            .ok_or_else(|| {
                BucketError::InvalidArgument(format!("period {} is out of range", self.period))
            })?;

        let mut bandwidth = Bandwidth::new(
            self.capacity,
            period,
            self.refill_tokens.unwrap_or(self.capacity),
        )?;
        if let Some(initial) = self.initial_tokens {
            bandwidth = bandwidth.with_initial_tokens(initial)?;
        }
        if self.shape == Refill::Intervally {
            bandwidth = bandwidth.intervally();
        }
        if let Some(ref id) = self.id {
            bandwidth = bandwidth.with_id(id.clone());
        }
        Ok(bandwidth)
    }
}
