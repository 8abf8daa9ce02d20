//! Clock double that records every adjustment.

use crate::error::PtpError;
use crate::protocol::ptp::clock::{ClockAdjuster, TickIncrement};
use crate::protocol::ptp::timestamp::{SignedOffset, WireTimestamp};

/// One call made on a [`RecordingClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCall {
    /// `set_time`.
    SetTime(WireTimestamp),
    /// `set_increment`.
    SetIncrement(TickIncrement),
    /// `adjust_offset`.
    AdjustOffset(SignedOffset),
    /// `arm_pps`.
    ArmPps,
    /// `enable_pps`.
    EnablePps,
}

/// [`ClockAdjuster`] that records calls and can be told to fail.
#[derive(Debug, Default, Clone)]
pub struct RecordingClock {
    calls: Vec<ClockCall>,
    fail_next: u32,
}

impl RecordingClock {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with [`PtpError::RegisterTimeout`].
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// All recorded calls.
    #[must_use]
    pub fn calls(&self) -> &[ClockCall] {
        &self.calls
    }

    /// Offsets passed to `adjust_offset`, as signed nanoseconds.
    #[must_use]
    pub fn adjustments(&self) -> Vec<i64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ClockCall::AdjustOffset(offset) => Some(offset.to_nanos()),
                _ => None,
            })
            .collect()
    }

    /// Increments passed to `set_increment`.
    #[must_use]
    pub fn increments(&self) -> Vec<TickIncrement> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ClockCall::SetIncrement(increment) => Some(*increment),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: ClockCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: ClockCall) -> Result<(), PtpError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(PtpError::RegisterTimeout {
                addr: 0,
                attempts: 1,
                elapsed: std::time::Duration::ZERO,
            });
        }
        self.calls.push(call);
        Ok(())
    }
}

impl ClockAdjuster for RecordingClock {
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError> {
        self.record(ClockCall::SetTime(time))
    }

    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError> {
        self.record(ClockCall::SetIncrement(increment))
    }

    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError> {
        self.record(ClockCall::AdjustOffset(offset))
    }

    fn arm_pps(&mut self) -> Result<(), PtpError> {
        self.record(ClockCall::ArmPps)
    }

    fn enable_pps(&mut self) -> Result<(), PtpError> {
        self.record(ClockCall::EnablePps)
    }
}
