//! Test doubles for the register interface, the clock and the link.

pub mod mock_registers;
pub mod network_sim;
pub mod recording_clock;
pub mod simulated_clock;

pub use mock_registers::MockRegisters;
pub use network_sim::{LinkSimulator, LoopbackTransport};
pub use recording_clock::{ClockCall, RecordingClock};
pub use simulated_clock::SimulatedClock;

use crate::protocol::ptp::message::{FollowUpMessage, PtpMessage, PtpPortIdentity, SyncMessage};
use crate::protocol::ptp::timestamp::WireTimestamp;

/// MAC address used for the simulated grandmaster.
pub const TEST_MASTER_MAC: [u8; 6] = [0x40, 0x84, 0x32, 0x7D, 0x07, 0xFA];

/// Port identity of the simulated grandmaster.
#[must_use]
pub fn test_master_identity() -> PtpPortIdentity {
    PtpPortIdentity::from_mac(TEST_MASTER_MAC, 1)
}

/// Encoded Sync frame from the simulated grandmaster.
#[must_use]
pub fn sync_frame(sequence_id: u16) -> bytes::Bytes {
    PtpMessage::from(SyncMessage::new(test_master_identity(), sequence_id)).encode_frame(TEST_MASTER_MAC)
}

/// `Follow_Up` from the simulated grandmaster.
#[must_use]
pub fn follow_up(sequence_id: u16, origin: WireTimestamp) -> FollowUpMessage {
    FollowUpMessage::new(test_master_identity(), sequence_id, origin)
}

/// Encoded `Follow_Up` frame from the simulated grandmaster.
#[must_use]
pub fn follow_up_frame(sequence_id: u16, origin: WireTimestamp) -> bytes::Bytes {
    PtpMessage::from(follow_up(sequence_id, origin)).encode_frame(TEST_MASTER_MAC)
}
