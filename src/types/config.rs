use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PtpError;

/// Configuration for the follower servo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Moving-average window for the rate ratio; also the number of accepted
    /// rate samples required before leaving `Uninit` (default: 8)
    pub rate_window: usize,

    /// Moving-average window for both offset filters (default: 16)
    pub offset_window: usize,

    /// Exponential smoothing factor for the rate ratio (default: 0.5)
    pub iir_alpha: f64,

    /// Lower bound (exclusive) of plausible rate ratios (default: 0.998)
    pub rate_ratio_min: f64,

    /// Upper bound (exclusive) of plausible rate ratios (default: 1.002)
    pub rate_ratio_max: f64,

    /// Sequence distance beyond which a Sync forces a full reset (default: 10)
    pub sequence_reset_threshold: u16,

    /// Offset in `MatchFreq` above which the clock is rewritten (default: 100 ms)
    pub match_freq_reset_threshold: u64,

    /// Offset above which the servo falls back to `Uninit` (default: 100 ms)
    pub reset_threshold: u64,

    /// Offset above which corrections are clamped (default: 10 ms)
    pub hard_sync_threshold: u64,

    /// Offset above which raw, unfiltered corrections are applied (default: 5 µs)
    pub coarse_threshold: u64,

    /// Offset above which the coarse filter is used instead of the fine one (default: 100 ns)
    pub fine_threshold: u64,

    /// Nominal timestamp clock period in nanoseconds (default: 40, i.e. 25 MHz)
    pub nominal_tick_ns: f64,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            rate_window: 8,
            offset_window: 16,
            iir_alpha: 0.5,
            rate_ratio_min: 0.998,
            rate_ratio_max: 1.002,
            sequence_reset_threshold: 10,
            match_freq_reset_threshold: 100_000_000,
            reset_threshold: 100_000_000,
            hard_sync_threshold: 10_000_000,
            coarse_threshold: 5_000,
            fine_threshold: 100,
            nominal_tick_ns: 40.0,
        }
    }
}

impl ServoConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> ServoConfigBuilder {
        ServoConfigBuilder::default()
    }

    /// Check that the thresholds and filter parameters are consistent.
    ///
    /// # Errors
    /// Returns [`PtpError::InvalidConfig`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), PtpError> {
        if self.rate_window == 0 || self.offset_window == 0 {
            return Err(PtpError::InvalidConfig(
                "filter windows must hold at least one sample".into(),
            ));
        }
        if !(self.iir_alpha > 0.0 && self.iir_alpha <= 1.0) {
            return Err(PtpError::InvalidConfig(format!(
                "iir_alpha must be in (0, 1], got {}",
                self.iir_alpha
            )));
        }
        if !(self.rate_ratio_min < 1.0 && self.rate_ratio_max > 1.0) {
            return Err(PtpError::InvalidConfig(format!(
                "rate ratio band ({}, {}) must contain 1.0",
                self.rate_ratio_min, self.rate_ratio_max
            )));
        }
        if !(self.reset_threshold > self.hard_sync_threshold
            && self.hard_sync_threshold > self.coarse_threshold
            && self.coarse_threshold > self.fine_threshold)
        {
            return Err(PtpError::InvalidConfig(format!(
                "offset thresholds must be strictly decreasing: reset {} > hard-sync {} > coarse \
                 {} > fine {}",
                self.reset_threshold,
                self.hard_sync_threshold,
                self.coarse_threshold,
                self.fine_threshold
            )));
        }
        if self.nominal_tick_ns < 1.0 || self.nominal_tick_ns >= 256.0 {
            return Err(PtpError::InvalidConfig(format!(
                "nominal_tick_ns must fit the 8-bit increment register, got {}",
                self.nominal_tick_ns
            )));
        }
        Ok(())
    }

    /// Parse from a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the result fails [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self, PtpError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PtpError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Builder for `ServoConfig`
#[derive(Debug, Clone, Default)]
pub struct ServoConfigBuilder {
    config: ServoConfig,
}

impl ServoConfigBuilder {
    /// Set the rate-ratio filter window
    #[must_use]
    pub fn rate_window(mut self, window: usize) -> Self {
        self.config.rate_window = window;
        self
    }

    /// Set the offset filter window
    #[must_use]
    pub fn offset_window(mut self, window: usize) -> Self {
        self.config.offset_window = window;
        self
    }

    /// Set the exponential smoothing factor
    #[must_use]
    pub fn iir_alpha(mut self, alpha: f64) -> Self {
        self.config.iir_alpha = alpha;
        self
    }

    /// Set the accepted rate-ratio band
    #[must_use]
    pub fn rate_ratio_band(mut self, min: f64, max: f64) -> Self {
        self.config.rate_ratio_min = min;
        self.config.rate_ratio_max = max;
        self
    }

    /// Set the sequence mismatch distance that forces a reset
    #[must_use]
    pub fn sequence_reset_threshold(mut self, threshold: u16) -> Self {
        self.config.sequence_reset_threshold = threshold;
        self
    }

    /// Set the per-regime offset thresholds in nanoseconds
    #[must_use]
    pub fn thresholds(mut self, reset: u64, hard_sync: u64, coarse: u64, fine: u64) -> Self {
        self.config.reset_threshold = reset;
        self.config.hard_sync_threshold = hard_sync;
        self.config.coarse_threshold = coarse;
        self.config.fine_threshold = fine;
        self
    }

    /// Set the offset that triggers a hard resync in `MatchFreq`
    #[must_use]
    pub fn match_freq_reset_threshold(mut self, threshold: u64) -> Self {
        self.config.match_freq_reset_threshold = threshold;
        self
    }

    /// Set the nominal timestamp clock period
    #[must_use]
    pub fn nominal_tick_ns(mut self, period: f64) -> Self {
        self.config.nominal_tick_ns = period;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns [`PtpError::InvalidConfig`] if the values are inconsistent.
    pub fn build(self) -> Result<ServoConfig, PtpError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration for the master capture state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Interval between Sync transmissions (default: 125 ms)
    pub sync_period: Duration,

    /// Egress pipeline delay added to the captured nanoseconds (default: 7650 ns)
    pub pipeline_delay_ns: u32,

    /// Register steps that may fail in a row before the cycle is abandoned (default: 5)
    pub max_register_retries: u32,

    /// Time to wait for an issued register read to complete (default: 50 ms)
    pub completion_timeout: Duration,

    /// MAC address of this node
    pub source_mac: [u8; 6],

    /// Source port number (default: 1)
    pub port_number: u16,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_millis(125),
            pipeline_delay_ns: 7650,
            max_register_retries: 5,
            completion_timeout: Duration::from_millis(50),
            source_mac: [0x40, 0x84, 0x32, 0x7D, 0x07, 0xFA],
            port_number: 1,
        }
    }
}

impl MasterConfig {
    /// Parse from a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, PtpError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Retry policy for blocking register writes issued by the servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterClockConfig {
    /// Write attempts before giving up (default: 64)
    pub max_attempts: u32,

    /// Time budget for a single write (default: 10 ms)
    pub timeout: Duration,
}

impl Default for RegisterClockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            timeout: Duration::from_millis(10),
        }
    }
}
