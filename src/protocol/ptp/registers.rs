//! Register-level access to the MAC-PHY.
//!
//! Register I/O to the MAC-PHY runs over SPI and completes asynchronously:
//! a read or write is *issued*, the driver's service routine advances it, and
//! the result is *polled* later. Addresses carry the memory map selector in
//! the upper 16 bits (LAN865x layout).

use bitflags::bitflags;

/// Asynchronous register access provided by the MAC-PHY driver.
pub trait RegisterAccess {
    /// Queue a register write. Returns `false` if the driver cannot take it now.
    fn write(&mut self, addr: u32, value: u32) -> bool;

    /// Queue a register read. Returns `false` if the driver cannot take it now.
    ///
    /// The value is delivered later through [`poll_complete`](Self::poll_complete).
    fn read(&mut self, addr: u32) -> bool;

    /// Value of the most recent read, once it has completed.
    ///
    /// Each completed read is returned exactly once.
    fn poll_complete(&mut self) -> Option<u32>;

    /// Advance pending register operations.
    fn service(&mut self);
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for &mut R {
    fn write(&mut self, addr: u32, value: u32) -> bool {
        (**self).write(addr, value)
    }

    fn read(&mut self, addr: u32) -> bool {
        (**self).read(addr)
    }

    fn poll_complete(&mut self) -> Option<u32> {
        (**self).poll_complete()
    }

    fn service(&mut self) {
        (**self).service();
    }
}

/// OPEN Alliance standard status register 0.
pub const OA_STATUS0: u32 = 0x0000_0008;
/// Transmit timestamp capture A, seconds.
pub const OA_TTSCAH: u32 = 0x0000_0010;
/// Transmit timestamp capture A, nanoseconds.
pub const OA_TTSCAL: u32 = 0x0000_0011;
/// Transmit timestamp capture B, seconds.
pub const OA_TTSCBH: u32 = 0x0000_0012;
/// Transmit timestamp capture B, nanoseconds.
pub const OA_TTSCBL: u32 = 0x0000_0013;
/// Transmit timestamp capture C, seconds.
pub const OA_TTSCCH: u32 = 0x0000_0014;
/// Transmit timestamp capture C, nanoseconds.
pub const OA_TTSCCL: u32 = 0x0000_0015;

/// Timer increment sub-nanoseconds.
pub const MAC_TISUBN: u32 = 0x0001_006F;
/// Timer seconds, high 16 bits.
pub const MAC_TSH: u32 = 0x0001_0070;
/// Timer seconds, low 32 bits.
pub const MAC_TSL: u32 = 0x0001_0074;
/// Timer nanoseconds.
pub const MAC_TN: u32 = 0x0001_0075;
/// Timer adjust.
pub const MAC_TA: u32 = 0x0001_0076;
/// Timer increment, whole nanoseconds.
pub const MAC_TI: u32 = 0x0001_0077;

/// Transmit match control.
pub const TXMCTL: u32 = 0x000A_0040;
/// Pulse-per-second control.
pub const PPSCTL: u32 = 0x000A_0239;
/// Synchronization event interrupt enable.
pub const SEVINTEN: u32 = 0x000A_023A;

/// `PPSCTL` value that stops the PPS output.
pub const PPSCTL_STOP: u32 = 0x0000_0002;
/// `PPSCTL` value that starts the PPS output.
pub const PPSCTL_START: u32 = 0x0000_007D;
/// `SEVINTEN` bit enabling the PPS-done event.
pub const SEVINTEN_PPSDONE: u32 = 0x0000_0002;

/// `MAC_TA` direction bit: subtract the magnitude from the clock.
pub const MAC_TA_SUBTRACT: u32 = 1 << 31;
/// Largest magnitude `MAC_TA` can carry.
pub const MAC_TA_MAX_MAGNITUDE: u32 = 0x3FFF_FFFF;

bitflags! {
    /// Bits of `OA_STATUS0` that flag populated transmit timestamp captures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OaStatus0: u32 {
        /// Capture A available.
        const TTSCAA = 1 << 8;
        /// Capture B available.
        const TTSCAB = 1 << 9;
        /// Capture C available.
        const TTSCAC = 1 << 10;
    }
}

bitflags! {
    /// Bits of `TXMCTL`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TxMatchControl: u32 {
        /// A transmitted frame matched the timestamp filter.
        const TXPMDET = 1 << 7;
    }
}

/// One of the three transmit timestamp capture register pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampSlot {
    /// Capture A.
    A,
    /// Capture B.
    B,
    /// Capture C.
    C,
}

impl TimestampSlot {
    /// First populated slot flagged in `status`, checked in A, B, C order.
    #[must_use]
    pub fn from_status(status: OaStatus0) -> Option<Self> {
        if status.contains(OaStatus0::TTSCAA) {
            Some(Self::A)
        } else if status.contains(OaStatus0::TTSCAB) {
            Some(Self::B)
        } else if status.contains(OaStatus0::TTSCAC) {
            Some(Self::C)
        } else {
            None
        }
    }

    /// Register holding the captured seconds.
    #[must_use]
    pub fn seconds_register(self) -> u32 {
        match self {
            Self::A => OA_TTSCAH,
            Self::B => OA_TTSCBH,
            Self::C => OA_TTSCCH,
        }
    }

    /// Register holding the captured nanoseconds.
    #[must_use]
    pub fn nanoseconds_register(self) -> u32 {
        match self {
            Self::A => OA_TTSCAL,
            Self::B => OA_TTSCBL,
            Self::C => OA_TTSCCL,
        }
    }

    /// Status bit that flags this slot (write-one-to-clear).
    #[must_use]
    pub fn status_bit(self) -> OaStatus0 {
        match self {
            Self::A => OaStatus0::TTSCAA,
            Self::B => OaStatus0::TTSCAB,
            Self::C => OaStatus0::TTSCAC,
        }
    }
}
