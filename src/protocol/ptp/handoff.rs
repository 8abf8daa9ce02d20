//! Hand-off of Sync reception timestamps from the ingress path to the task.
//!
//! The ingress path (an interrupt or driver callback) captures the reception
//! time of every Sync; the servo task reads it later when the matching
//! `Follow_Up` arrives. [`ReceiptSlot`] is a single-slot sequence lock: the
//! writer bumps the sequence to an odd value, stores the fields, and bumps it
//! to the next even value; readers retry while the sequence is odd or changed
//! under them, so a torn snapshot is never observed.

use std::hint;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use super::timestamp::WireTimestamp;

/// Reception time of a Sync together with its sequence ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSnapshot {
    /// Sequence ID of the Sync the timestamp belongs to.
    pub sequence_id: u16,
    /// Local capture time.
    pub receipt: WireTimestamp,
}

/// Sequence-locked single-slot mailbox for [`ReceiptSnapshot`]s.
///
/// Exactly one context may call [`publish`](Self::publish); any number may read.
#[derive(Debug, Default)]
pub struct ReceiptSlot {
    sequence: AtomicU32,
    sequence_id: AtomicU32,
    seconds: AtomicU64,
    nanoseconds: AtomicU32,
}

impl ReceiptSlot {
    /// Reads give up after this many torn attempts.
    pub const MAX_READ_ATTEMPTS: u32 = 64;

    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new snapshot, replacing the previous one.
    pub fn publish(&self, sequence_id: u16, receipt: WireTimestamp) {
        let start = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(start.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.sequence_id
            .store(u32::from(sequence_id), Ordering::Relaxed);
        self.seconds.store(receipt.seconds(), Ordering::Relaxed);
        self.nanoseconds
            .store(receipt.nanoseconds, Ordering::Relaxed);

        self.sequence.store(start.wrapping_add(2), Ordering::Release);
    }

    /// Consistent copy of the latest snapshot.
    ///
    /// Returns `None` if nothing was published yet or the writer kept the
    /// slot busy for [`MAX_READ_ATTEMPTS`](Self::MAX_READ_ATTEMPTS) reads.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "sequence_id was stored from a u16"
    )]
    pub fn snapshot(&self) -> Option<ReceiptSnapshot> {
        for _ in 0..Self::MAX_READ_ATTEMPTS {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }

            let sequence_id = self.sequence_id.load(Ordering::Relaxed) as u16;
            let seconds = self.seconds.load(Ordering::Relaxed);
            let nanoseconds = self.nanoseconds.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                if before == 0 {
                    return None;
                }
                return Some(ReceiptSnapshot {
                    sequence_id,
                    receipt: WireTimestamp::new(seconds, nanoseconds),
                });
            }
            hint::spin_loop();
        }
        None
    }

    /// Number of snapshots published so far.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.sequence.load(Ordering::Acquire) / 2
    }
}
