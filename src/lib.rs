//! # t1s-ptp
//!
//! Two-step PTP clock synchronization for a two-node 10BASE-T1S link built
//! on a LAN865x-style MAC-PHY.
//!
//! ## Features
//!
//! - Sync/`Follow_Up` encoding with the 802.1AS follow-up TLV
//! - Grandmaster egress timestamp capture as a non-blocking state machine
//! - Follower servo: frequency matching, then filtered phase steering
//! - Optional tokio drivers for both roles
//!
//! ## Example
//!
//! ```rust,no_run
//! use t1s_ptp::protocol::ptp::{FollowerServo, WireTimestamp};
//! use t1s_ptp::testing::{RecordingClock, follow_up};
//! use t1s_ptp::ServoConfig;
//!
//! # fn example() -> Result<(), t1s_ptp::PtpError> {
//! let mut servo = FollowerServo::new(ServoConfig::default(), RecordingClock::new());
//! servo.start()?;
//!
//! servo.on_sync(7)?;
//! let receipt = WireTimestamp::new(100, 500);
//! let outcome = servo.on_follow_up(&follow_up(7, WireTimestamp::new(100, 0)), receipt)?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Drivers**: `PtpFollowerTask` / `PtpMasterTask` - tokio run loops
//! - **Engines**: `FollowerServo` / `MasterCapture` - synchronous, pollable
//! - **Hardware seams**: `ClockAdjuster`, `RegisterAccess`, `Transport`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod protocol;

// Re-exports
pub use error::PtpError;
pub use protocol::ptp::{FollowerServo, MasterCapture};
pub use types::{MasterConfig, RegisterClockConfig, ServoConfig, ServoConfigBuilder};
