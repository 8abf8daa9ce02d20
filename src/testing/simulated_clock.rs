//! Free-running oscillator model for closed-loop servo tests.

use crate::error::PtpError;
use crate::protocol::ptp::clock::{ClockAdjuster, TickIncrement};
use crate::protocol::ptp::timestamp::{SignedOffset, WireTimestamp};

/// Local timer driven by an oscillator that drifts against the master.
///
/// Master time is supplied by the test through [`advance_to`](Self::advance_to).
/// Every tick of the oscillator lasts `nominal_tick_ns * (1 + drift)` master
/// nanoseconds and adds the programmed increment to the local time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    anchor_master: u64,
    anchor_local: u64,
    now_master: u64,
    tick_ns: f64,
    increment_ns: f64,
    pps_enabled: bool,
    adjustments: usize,
}

impl SimulatedClock {
    /// Clock that reads `local_ns` at master time `master_ns`, with the
    /// oscillator off by `drift_ppm` (positive runs slow) against a 40 ns tick.
    #[must_use]
    pub fn new(master_ns: u64, local_ns: u64, drift_ppm: f64) -> Self {
        Self::with_tick(master_ns, local_ns, drift_ppm, 40.0)
    }

    /// As [`new`](Self::new) with an explicit nominal tick period.
    #[must_use]
    pub fn with_tick(master_ns: u64, local_ns: u64, drift_ppm: f64, nominal_tick_ns: f64) -> Self {
        Self {
            anchor_master: master_ns,
            anchor_local: local_ns,
            now_master: master_ns,
            tick_ns: nominal_tick_ns * (1.0 + drift_ppm * 1e-6),
            increment_ns: nominal_tick_ns,
            pps_enabled: false,
            adjustments: 0,
        }
    }

    /// Move master time forward. Earlier times are ignored.
    pub fn advance_to(&mut self, master_ns: u64) {
        self.now_master = self.now_master.max(master_ns);
    }

    /// Local time the timer would show at `master_ns` under the current settings.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        reason = "test intervals are far below 2^52 ns"
    )]
    pub fn local_at(&self, master_ns: u64) -> u64 {
        let elapsed = master_ns.saturating_sub(self.anchor_master) as f64;
        let advanced = (elapsed * self.increment_ns / self.tick_ns).round() as u64;
        self.anchor_local.wrapping_add(advanced)
    }

    /// Local time at the current master time.
    #[must_use]
    pub fn now(&self) -> WireTimestamp {
        WireTimestamp::from_internal(self.local_at(self.now_master))
    }

    /// Local minus master time at the current master time.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn offset_ns(&self) -> i64 {
        self.local_at(self.now_master).wrapping_sub(self.now_master) as i64
    }

    /// Programmed increment in nanoseconds.
    #[must_use]
    pub fn increment_ns(&self) -> f64 {
        self.increment_ns
    }

    /// Whether the PPS output has been started.
    #[must_use]
    pub fn pps_enabled(&self) -> bool {
        self.pps_enabled
    }

    /// Number of phase corrections applied so far.
    #[must_use]
    pub fn adjustments(&self) -> usize {
        self.adjustments
    }

    fn rebase(&mut self) {
        self.anchor_local = self.local_at(self.now_master);
        self.anchor_master = self.now_master;
    }
}

impl ClockAdjuster for SimulatedClock {
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError> {
        self.rebase();
        self.anchor_local = time.to_internal();
        Ok(())
    }

    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError> {
        self.rebase();
        self.increment_ns = increment.period_ns();
        Ok(())
    }

    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError> {
        self.rebase();
        self.anchor_local = self.anchor_local.wrapping_add_signed(offset.to_nanos().wrapping_neg());
        self.adjustments += 1;
        Ok(())
    }

    fn arm_pps(&mut self) -> Result<(), PtpError> {
        self.pps_enabled = false;
        Ok(())
    }

    fn enable_pps(&mut self) -> Result<(), PtpError> {
        self.pps_enabled = true;
        Ok(())
    }
}
