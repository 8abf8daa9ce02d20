//! Precision Time Protocol (PTP, IEEE 1588 / 802.1AS profile) over a
//! two-node 10BASE-T1S segment.
//!
//! One node is the grandmaster: it sends Sync frames at a fixed cadence,
//! reads back each Sync's hardware egress timestamp from the MAC-PHY and
//! reports it in a `Follow_Up`. The other node runs the follower servo,
//! which first matches its timestamp clock's frequency to the master and
//! then steers the phase.
//!
//! ## Exchange
//!
//! ```text
//! Master                              Follower
//!   |--- Sync (seq n) ------------------->|  receipt t2 captured on ingress
//!   |    egress time t1 latched by PHY    |
//!   |--- Follow_Up (seq n, t1) ---------->|  offset = t2 - t1
//!   |                                     |  rate   = Δt1 / Δt2
//! ```
//!
//! There is no delay request/response: path delay on a single short
//! segment is treated as part of the offset.

pub mod clock;
pub mod filter;
pub mod handoff;
#[cfg(feature = "tokio-runtime")]
pub mod handler;
pub mod master;
pub mod message;
pub mod registers;
pub mod servo;
pub mod timestamp;

#[cfg(test)]
mod tests;

// Re-exports for convenient access.
pub use clock::{ClockAdjuster, RegisterClock, TickIncrement};
pub use filter::{ExponentialFilter, MovingAverage};
pub use handoff::{ReceiptSlot, ReceiptSnapshot};
#[cfg(feature = "tokio-runtime")]
pub use handler::{FollowerEvent, FollowerIngress, PtpFollowerTask, PtpMasterTask};
pub use master::{AbortReason, MasterCapture, MasterCaptureState, MasterEvent, Transport};
pub use message::{
    FollowUpMessage, FollowUpTlv, PtpHeader, PtpMessage, PtpMessageType, PtpParseError,
    PtpPortIdentity, SyncMessage,
};
pub use registers::{OaStatus0, RegisterAccess, TimestampSlot};
pub use servo::{
    CycleOutcome, FollowerServo, SequenceTracker, ServoState, ServoStatus, SyncContext,
    SyncOutcome,
};
pub use timestamp::{SignedOffset, WireTimestamp};
