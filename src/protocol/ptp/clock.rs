//! Local clock adjustment.
//!
//! The servo steers the MAC-PHY's timestamp clock through four knobs:
//! absolute time, per-tick increment, a one-shot time adjust, and the PPS
//! output. [`ClockAdjuster`] abstracts them; [`RegisterClock`] maps them onto
//! register writes.

use std::time::Instant;

use super::registers::{
    MAC_TA, MAC_TA_MAX_MAGNITUDE, MAC_TA_SUBTRACT, MAC_TI, MAC_TISUBN, MAC_TN, MAC_TSH, MAC_TSL,
    PPSCTL, PPSCTL_START, PPSCTL_STOP, RegisterAccess, SEVINTEN, SEVINTEN_PPSDONE,
};
use super::timestamp::{SignedOffset, WireTimestamp};
use crate::error::PtpError;
use crate::types::RegisterClockConfig;

/// Per-tick clock increment: whole nanoseconds plus a 24-bit binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickIncrement {
    /// Whole nanoseconds added per tick.
    pub nanoseconds: u8,
    /// Fractional nanoseconds in units of 2^-24.
    pub fraction: u32,
}

impl TickIncrement {
    /// Scale of the fractional part.
    pub const FRACTION_SCALE: f64 = 16_777_216.0;

    /// Quantize a tick period in nanoseconds (expected in `1.0..256.0`).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "period is validated to fit the 8-bit increment register"
    )]
    pub fn from_period(period_ns: f64) -> Self {
        let period_ns = period_ns.clamp(0.0, 255.999_999);
        let nanoseconds = period_ns.trunc() as u8;
        let fraction = ((period_ns - f64::from(nanoseconds)) * Self::FRACTION_SCALE) as u32;
        Self {
            nanoseconds,
            fraction: fraction & 0x00FF_FFFF,
        }
    }

    /// Period this increment represents.
    #[must_use]
    pub fn period_ns(&self) -> f64 {
        f64::from(self.nanoseconds) + f64::from(self.fraction) / Self::FRACTION_SCALE
    }

    /// `MAC_TISUBN` layout: fraction bits 23..8 in the low half-word, bits 7..0 in the top byte.
    #[must_use]
    pub fn subnanoseconds_register(&self) -> u32 {
        ((self.fraction >> 8) & 0xFFFF) | ((self.fraction & 0xFF) << 24)
    }
}

/// Operations the follower servo needs from the local clock.
pub trait ClockAdjuster {
    /// Overwrite the absolute time.
    ///
    /// # Errors
    /// Returns an error if the hardware did not accept the write.
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError>;

    /// Set the per-tick increment (frequency).
    ///
    /// # Errors
    /// Returns an error if the hardware did not accept the write.
    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError>;

    /// Apply a one-shot phase correction. A positive offset means the local clock is ahead.
    ///
    /// # Errors
    /// Returns an error if the hardware did not accept the write.
    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError>;

    /// Stop the PPS output and arm the PPS-done event for the next start.
    ///
    /// # Errors
    /// Returns an error if the hardware did not accept the write.
    fn arm_pps(&mut self) -> Result<(), PtpError>;

    /// Start the PPS output.
    ///
    /// # Errors
    /// Returns an error if the hardware did not accept the write.
    fn enable_pps(&mut self) -> Result<(), PtpError>;
}

impl<C: ClockAdjuster + ?Sized> ClockAdjuster for &mut C {
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError> {
        (**self).set_time(time)
    }

    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError> {
        (**self).set_increment(increment)
    }

    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError> {
        (**self).adjust_offset(offset)
    }

    fn arm_pps(&mut self) -> Result<(), PtpError> {
        (**self).arm_pps()
    }

    fn enable_pps(&mut self) -> Result<(), PtpError> {
        (**self).enable_pps()
    }
}

/// [`ClockAdjuster`] backed by the MAC-PHY timer registers.
///
/// Each write is retried, pumping the driver's service routine between
/// attempts, until it is accepted or the configured attempt/time budget runs out.
#[derive(Debug)]
pub struct RegisterClock<R> {
    regs: R,
    config: RegisterClockConfig,
}

impl<R: RegisterAccess> RegisterClock<R> {
    /// Wrap a register interface.
    #[must_use]
    pub fn new(regs: R, config: RegisterClockConfig) -> Self {
        Self { regs, config }
    }

    /// Borrow the register interface.
    #[must_use]
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Release the register interface.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.regs
    }

    /// Write a register, retrying until accepted.
    ///
    /// # Errors
    /// Returns [`PtpError::RegisterTimeout`] once the attempt or time budget is exhausted.
    pub fn write_register(&mut self, addr: u32, value: u32) -> Result<(), PtpError> {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;
            let accepted = self.regs.write(addr, value);
            self.regs.service();
            if accepted {
                return Ok(());
            }
            if start.elapsed() >= self.config.timeout {
                break;
            }
        }
        let elapsed = start.elapsed();
        tracing::warn!(
            addr = format_args!("0x{addr:08X}"),
            attempts,
            ?elapsed,
            "register write not accepted"
        );
        Err(PtpError::RegisterTimeout {
            addr,
            attempts,
            elapsed,
        })
    }
}

impl<R: RegisterAccess> ClockAdjuster for RegisterClock<R> {
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError> {
        self.write_register(MAC_TSH, u32::from(time.seconds_msb))?;
        self.write_register(MAC_TSL, time.seconds_lsb)?;
        self.write_register(MAC_TN, time.nanoseconds)
    }

    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError> {
        self.write_register(MAC_TISUBN, increment.subnanoseconds_register())?;
        self.write_register(MAC_TI, u32::from(increment.nanoseconds))
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "magnitude is clamped to the 30-bit register field first"
    )]
    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError> {
        let magnitude = offset.magnitude.min(u64::from(MAC_TA_MAX_MAGNITUDE)) as u32;
        let direction = if offset.negative { 0 } else { MAC_TA_SUBTRACT };
        self.write_register(MAC_TA, direction | magnitude)
    }

    fn arm_pps(&mut self) -> Result<(), PtpError> {
        self.write_register(PPSCTL, PPSCTL_STOP)?;
        self.write_register(SEVINTEN, SEVINTEN_PPSDONE)
    }

    fn enable_pps(&mut self) -> Result<(), PtpError> {
        self.write_register(PPSCTL, PPSCTL_START)
    }
}
