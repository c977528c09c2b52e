//! Limit declarations: bandwidths and their configurations.

mod bandwidth;
mod config;

pub use bandwidth::{Bandwidth, Refill};
pub use config::{BandwidthRule, LimitsConfig, LimitsFile, TimeUnit};
