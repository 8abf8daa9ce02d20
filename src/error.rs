use std::time::Duration;

use thiserror::Error;

use crate::protocol::ptp::message::PtpParseError;

/// Errors surfaced by the synchronization engine and its drivers.
///
/// None of these are fatal to the link: callers log them and continue with
/// the next cycle.
#[derive(Debug, Error)]
pub enum PtpError {
    /// A received frame could not be decoded
    #[error("PTP parse error: {0}")]
    Parse(#[from] PtpParseError),

    /// A blocking register write was not accepted in time
    #[error("register 0x{addr:08X} write not accepted after {attempts} attempts ({elapsed:?})")]
    RegisterTimeout {
        /// Register address
        addr: u32,
        /// Number of write attempts made
        attempts: u32,
        /// Time spent retrying
        elapsed: Duration,
    },

    /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be deserialized
    #[error("configuration decode failed: {0}")]
    ConfigDecode(#[from] serde_json::Error),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame channel between ingress and task was closed
    #[error("frame channel closed")]
    ChannelClosed,
}

impl PtpError {
    /// Whether the next cycle can be expected to succeed without intervention.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::RegisterTimeout { .. })
    }
}
