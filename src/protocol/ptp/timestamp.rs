//! PTP timestamp representation and conversions.
//!
//! IEEE 1588 carries timestamps as 80 bits on the wire (48-bit seconds split
//! into a 16-bit high part and a 32-bit low part, plus 32-bit nanoseconds).
//! The servo works on a monotonic 64-bit nanosecond count instead; all
//! arithmetic on that count wraps modulo 2^64 so differences stay exact.

use std::fmt;

/// IEEE 1588 timestamp in its on-wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WireTimestamp {
    /// Upper 16 bits of the 48-bit seconds field.
    pub seconds_msb: u16,
    /// Lower 32 bits of the 48-bit seconds field.
    pub seconds_lsb: u32,
    /// Nanoseconds within the current second (`0..999_999_999`).
    pub nanoseconds: u32,
}

impl WireTimestamp {
    /// Nanoseconds per second.
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Maximum seconds representable in 48 bits.
    pub const MAX_SECONDS_48BIT: u64 = (1u64 << 48) - 1;

    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 10;

    /// Zero timestamp.
    pub const ZERO: Self = Self {
        seconds_msb: 0,
        seconds_lsb: 0,
        nanoseconds: 0,
    };

    /// Create a timestamp from 48-bit seconds, clamping nanoseconds to the valid range.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "seconds are masked to 48 bits before splitting"
    )]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        let seconds = seconds & Self::MAX_SECONDS_48BIT;
        Self {
            seconds_msb: (seconds >> 32) as u16,
            seconds_lsb: seconds as u32,
            nanoseconds: nanoseconds.min(Self::NANOS_PER_SEC - 1),
        }
    }

    /// Full 48-bit seconds value.
    #[must_use]
    pub fn seconds(&self) -> u64 {
        (u64::from(self.seconds_msb) << 32) | u64::from(self.seconds_lsb)
    }

    /// Whether this slot still holds the "never written" sentinel.
    ///
    /// History slots are considered unset while their low seconds word is zero.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.seconds_lsb == 0
    }

    /// Convert to the internal nanosecond count (`seconds * 1e9 + nanoseconds`).
    #[must_use]
    pub fn to_internal(&self) -> u64 {
        self.seconds()
            .wrapping_mul(u64::from(Self::NANOS_PER_SEC))
            .wrapping_add(u64::from(self.nanoseconds))
    }

    /// Build a timestamp from an internal nanosecond count.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "remainder of a division by 1e9 always fits in u32"
    )]
    pub fn from_internal(nanos: u64) -> Self {
        let per_sec = u64::from(Self::NANOS_PER_SEC);
        Self::new(nanos / per_sec, (nanos % per_sec) as u32)
    }

    /// Shift by a signed number of nanoseconds.
    #[must_use]
    pub fn offset_by(&self, nanos: i64) -> Self {
        Self::from_internal(self.to_internal().wrapping_add_signed(nanos))
    }

    /// Signed difference `self - other` in nanoseconds.
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        reason = "two's complement reinterpretation of the wrapped difference"
    )]
    pub fn diff_nanos(&self, other: &Self) -> i64 {
        self.to_internal().wrapping_sub(other.to_internal()) as i64
    }

    /// Encode as IEEE 1588 wire format: 2-byte + 4-byte seconds (BE), 4-byte nanoseconds (BE).
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&self.seconds_msb.to_be_bytes());
        buf[2..6].copy_from_slice(&self.seconds_lsb.to_be_bytes());
        buf[6..10].copy_from_slice(&self.nanoseconds.to_be_bytes());
        buf
    }

    /// Decode from IEEE 1588 wire format.
    ///
    /// Returns `None` if the slice is too short. Nanoseconds are taken as-is;
    /// range validation is the caller's decision.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            seconds_msb: u16::from_be_bytes([data[0], data[1]]),
            seconds_lsb: u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
            nanoseconds: u32::from_be_bytes([data[6], data[7], data[8], data[9]]),
        })
    }
}

impl fmt::Display for WireTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds(), self.nanoseconds)
    }
}

impl std::ops::Sub for WireTimestamp {
    type Output = i64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.diff_nanos(&rhs)
    }
}

/// Convert a raw header correction field (ns * 2^16) to whole nanoseconds.
///
/// The sub-nanosecond fraction is dropped by a single arithmetic shift.
#[must_use]
pub fn correction_to_nanos(raw: i64) -> i64 {
    raw >> 16
}

/// Convert whole nanoseconds to the scaled correction field representation.
#[must_use]
pub fn nanos_to_correction(nanos: i64) -> i64 {
    nanos << 16
}

/// A signed offset split into direction and magnitude.
///
/// This is the shape the time-adjust hardware takes: one direction bit and an
/// unsigned amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SignedOffset {
    /// `true` when the offset is below zero.
    pub negative: bool,
    /// Absolute value in nanoseconds.
    pub magnitude: u64,
}

impl SignedOffset {
    /// Split a signed nanosecond offset.
    #[must_use]
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            negative: nanos < 0,
            magnitude: nanos.unsigned_abs(),
        }
    }

    /// Reassemble the signed nanosecond offset.
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        reason = "magnitude came from unsigned_abs, so 2^63 maps back onto i64::MIN"
    )]
    pub fn to_nanos(&self) -> i64 {
        let value = self.magnitude as i64;
        if self.negative {
            value.wrapping_neg()
        } else {
            value
        }
    }

    /// Limit the magnitude, keeping the direction.
    #[must_use]
    pub fn clamped(&self, max_magnitude: u64) -> Self {
        Self {
            negative: self.negative,
            magnitude: self.magnitude.min(max_magnitude),
        }
    }
}

impl fmt::Display for SignedOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { "-" } else { "+" };
        write!(f, "{sign}{}ns", self.magnitude)
    }
}
