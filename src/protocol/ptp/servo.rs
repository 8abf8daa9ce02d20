//! Follower clock servo.
//!
//! Consumes Sync/`Follow_Up` pairs from the grandmaster and steers the local
//! clock in two stages: first the tick increment is matched to the master's
//! rate, then the phase is pulled in with progressively finer corrections.
//!
//! ```text
//! Uninit ──(rate window full)──► MatchFreq ──► HardSync ──► Coarse ──► Fine
//!    ▲                                            │  ▲         │  ▲      │
//!    └────────────(|offset| > reset)──────────────┘  └─────────┴──┴──────┘
//! ```

use std::fmt;

use super::clock::{ClockAdjuster, TickIncrement};
use super::filter::{ExponentialFilter, MovingAverage};
use super::message::FollowUpMessage;
use super::timestamp::{SignedOffset, WireTimestamp};
use crate::error::PtpError;
use crate::types::ServoConfig;

/// Servo state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServoState {
    /// Collecting rate samples.
    #[default]
    Uninit,
    /// Tick increment written; checking whether the phase is close enough to steer.
    MatchFreq,
    /// Large offsets: clamped or raw corrections.
    HardSync,
    /// Offsets corrected through the coarse moving average.
    Coarse,
    /// Offsets corrected through the fine moving average.
    Fine,
}

impl fmt::Display for ServoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninit => "UNINIT",
            Self::MatchFreq => "MATCHFREQ",
            Self::HardSync => "HARDSYNC",
            Self::Coarse => "COARSE",
            Self::Fine => "FINE",
        };
        f.write_str(name)
    }
}

/// Tracks which sequence ID the next Sync/`Follow_Up` should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceTracker {
    /// Next expected sequence ID, `None` until one has been adopted.
    pub expected: Option<u16>,
    /// A Sync with the expected ID arrived and awaits its `Follow_Up`.
    pub sync_received: bool,
}

impl SequenceTracker {
    /// Forget everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Distance between two sequence IDs on the 16-bit circle.
#[must_use]
pub fn sequence_distance(a: u16, b: u16) -> u16 {
    a.wrapping_sub(b).min(b.wrapping_sub(a))
}

/// Timestamps of the current and previous sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncContext {
    /// Master origin time of the current cycle (correction applied).
    pub origin: WireTimestamp,
    /// Master origin time of the previous cycle.
    pub origin_prev: WireTimestamp,
    /// Local reception time of the current cycle's Sync.
    pub receipt: WireTimestamp,
    /// Local reception time of the previous cycle's Sync.
    pub receipt_prev: WireTimestamp,
}

impl SyncContext {
    fn elapsed(current: WireTimestamp, previous: WireTimestamp) -> Option<u64> {
        if previous.is_unset() {
            return None;
        }
        Some(current.to_internal().wrapping_sub(previous.to_internal()))
    }

    /// Master time elapsed since the previous cycle, if there was one.
    #[must_use]
    pub fn remote_elapsed(&self) -> Option<u64> {
        Self::elapsed(self.origin, self.origin_prev)
    }

    /// Local time elapsed since the previous cycle, if there was one.
    #[must_use]
    pub fn local_elapsed(&self) -> Option<u64> {
        Self::elapsed(self.receipt, self.receipt_prev)
    }

    fn shift(&mut self) {
        self.origin_prev = self.origin;
        self.receipt_prev = self.receipt;
    }
}

/// Result of handling a Sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No sequence ID was known yet; this one was adopted.
    Adopted,
    /// The Sync carried the expected ID.
    Matched,
    /// The ID was off by a small amount; the Sync was dropped and the next one is adopted.
    Mismatch {
        /// ID that was expected.
        expected: u16,
    },
    /// The ID was far off; the servo was reset.
    Reset,
}

/// Result of handling a `Follow_Up`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No matching Sync preceded this `Follow_Up`; its successor ID is now expected.
    OutOfSequence,
    /// The `Follow_Up` did not carry the expected ID; the cycle was dropped.
    SequenceMismatch {
        /// ID that was expected.
        expected: u16,
        /// ID that arrived.
        received: u16,
    },
    /// No usable interval to the previous cycle yet.
    Degenerate,
    /// Still collecting rate samples.
    Accumulating {
        /// Accepted samples so far.
        runs: u32,
    },
    /// Tick increment written from the averaged rate ratio.
    FrequencyMatched {
        /// Increment now in effect.
        increment: TickIncrement,
    },
    /// Offset too large to steer; the clock will be overwritten on the next cycle.
    HardResyncRequested {
        /// Measured offset.
        offset_ns: i64,
    },
    /// The local clock was overwritten with the master's time; history restarts.
    Resynchronized {
        /// Time written to the clock.
        time: WireTimestamp,
    },
    /// Frequency settled; phase steering starts with the next cycle.
    PhaseLockStarted {
        /// Measured offset.
        offset_ns: i64,
    },
    /// Offset beyond the reset threshold; back to `Uninit`.
    Reacquiring {
        /// Measured offset.
        offset_ns: i64,
    },
    /// A phase correction was written to the clock.
    Corrected {
        /// State after this cycle.
        state: ServoState,
        /// Measured offset.
        offset_ns: i64,
        /// Correction that was written.
        applied: SignedOffset,
    },
}

/// Point-in-time view of the servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoStatus {
    /// Current state.
    pub state: ServoState,
    /// Frequency has been matched at least once.
    pub synchronized: bool,
    /// PPS output has been started.
    pub pps_enabled: bool,
    /// Most recent in-band rate ratio.
    pub rate_ratio: f64,
    /// Exponentially smoothed rate ratio.
    pub rate_ratio_iir: f64,
    /// Moving-average rate ratio.
    pub rate_ratio_fir: f64,
    /// Most recent measured offset.
    pub last_offset_ns: Option<i64>,
    /// Next expected sequence ID.
    pub expected_sequence: Option<u16>,
    /// Accepted rate samples since the last reset.
    pub runs: u32,
    /// Rate samples discarded as out of band since the last reset.
    pub rate_outliers: u32,
}

/// Follower servo driving a [`ClockAdjuster`].
#[derive(Debug)]
pub struct FollowerServo<C> {
    config: ServoConfig,
    clock: C,
    tracker: SequenceTracker,
    context: SyncContext,
    state: ServoState,
    runs: u32,
    rate_outliers: u32,
    rate_ratio: f64,
    rate_iir: ExponentialFilter,
    rate_fir: MovingAverage,
    offset_coarse: MovingAverage,
    offset_fine: MovingAverage,
    hard_resync_pending: bool,
    synchronized: bool,
    pps_enabled: bool,
    last_offset: Option<i64>,
}

impl<C: ClockAdjuster> FollowerServo<C> {
    /// Create a servo with neutral filters in `Uninit`.
    ///
    /// Call [`start`](Self::start) before feeding messages.
    pub fn new(config: ServoConfig, clock: C) -> Self {
        Self {
            rate_iir: ExponentialFilter::new(config.iir_alpha, 1.0),
            rate_fir: MovingAverage::new(config.rate_window, 1.0),
            offset_coarse: MovingAverage::new(config.offset_window, 0.0),
            offset_fine: MovingAverage::new(config.offset_window, 0.0),
            config,
            clock,
            tracker: SequenceTracker::default(),
            context: SyncContext::default(),
            state: ServoState::Uninit,
            runs: 0,
            rate_outliers: 0,
            rate_ratio: 1.0,
            hard_resync_pending: false,
            synchronized: false,
            pps_enabled: false,
            last_offset: None,
        }
    }

    /// Clear the timestamp history and arm the PPS output.
    ///
    /// # Errors
    /// Returns an error if the clock rejects the PPS setup.
    pub fn start(&mut self) -> Result<(), PtpError> {
        self.context = SyncContext::default();
        self.clock.arm_pps()
    }

    /// Return to the power-on state and re-arm the PPS output.
    ///
    /// # Errors
    /// Returns an error if the clock rejects the PPS setup.
    pub fn reset(&mut self) -> Result<(), PtpError> {
        tracing::info!(state = %self.state, "PTP servo reset");
        self.tracker.clear();
        self.state = ServoState::Uninit;
        self.runs = 0;
        self.rate_outliers = 0;
        self.rate_ratio = 1.0;
        self.rate_iir.flush(1.0);
        self.rate_fir.flush(1.0);
        self.offset_coarse.flush(0.0);
        self.offset_fine.flush(0.0);
        self.hard_resync_pending = false;
        self.synchronized = false;
        self.pps_enabled = false;
        self.last_offset = None;
        self.start()
    }

    /// Handle a received Sync.
    ///
    /// # Errors
    /// Returns an error only if a forced reset could not re-arm the PPS output.
    pub fn on_sync(&mut self, sequence_id: u16) -> Result<SyncOutcome, PtpError> {
        let Some(expected) = self.tracker.expected else {
            tracing::debug!(sequence_id, "adopting Sync sequence");
            self.tracker.expected = Some(sequence_id);
            self.tracker.sync_received = false;
            return Ok(SyncOutcome::Adopted);
        };

        if expected == sequence_id {
            self.tracker.sync_received = true;
            return Ok(SyncOutcome::Matched);
        }

        let distance = sequence_distance(sequence_id, expected);
        if distance > self.config.sequence_reset_threshold {
            tracing::warn!(
                sequence_id,
                expected,
                distance,
                "Sync sequence far off, resetting servo"
            );
            self.reset()?;
            return Ok(SyncOutcome::Reset);
        }

        tracing::debug!(sequence_id, expected, "unexpected Sync sequence, re-adopting");
        self.tracker.clear();
        Ok(SyncOutcome::Mismatch { expected })
    }

    /// Handle a received `Follow_Up` whose Sync was captured at `receipt`.
    ///
    /// # Errors
    /// Returns an error if a clock write fails; the cycle's effect on the clock
    /// is then lost but the servo state stays consistent.
    pub fn on_follow_up(
        &mut self,
        message: &FollowUpMessage,
        receipt: WireTimestamp,
    ) -> Result<CycleOutcome, PtpError> {
        let received = message.header.sequence_id;
        match self.tracker {
            SequenceTracker {
                expected: Some(expected),
                sync_received: true,
            } if expected == received => {
                self.tracker.expected = Some(received.wrapping_add(1));
                self.tracker.sync_received = false;
            }
            SequenceTracker {
                expected: Some(expected),
                sync_received: true,
            } => {
                tracing::warn!(expected, received, "Follow_Up sequence mismatch");
                self.tracker.clear();
                self.context.receipt = WireTimestamp::ZERO;
                self.context.receipt_prev = WireTimestamp::ZERO;
                return Ok(CycleOutcome::SequenceMismatch { expected, received });
            }
            _ => {
                tracing::debug!(received, "Follow_Up without matching Sync");
                self.tracker.expected = Some(received.wrapping_add(1));
                self.tracker.sync_received = false;
                return Ok(CycleOutcome::OutOfSequence);
            }
        }

        self.context.receipt = receipt;
        self.context.origin = message.corrected_origin();

        let resynchronized = if self.hard_resync_pending {
            let time = self.context.origin;
            tracing::info!(%time, "hard resync: overwriting local clock");
            self.clock.set_time(time)?;
            self.hard_resync_pending = false;
            Some(time)
        } else {
            None
        };

        if self.synchronized && !self.pps_enabled {
            tracing::info!("enabling PPS output");
            self.clock.enable_pps()?;
            self.pps_enabled = true;
        }

        if let Some(time) = resynchronized {
            // Receipt history predates the step.
            self.context = SyncContext::default();
            return Ok(CycleOutcome::Resynchronized { time });
        }

        let remote = self.context.remote_elapsed();
        let local = self.context.local_elapsed();
        let offset_ns = self.context.receipt.diff_nanos(&self.context.origin);
        self.last_offset = Some(offset_ns);
        self.context.shift();

        let (Some(remote), Some(local)) = (remote, local) else {
            return Ok(CycleOutcome::Degenerate);
        };
        if remote == 0 || local == 0 {
            return Ok(CycleOutcome::Degenerate);
        }

        #[allow(
            clippy::cast_precision_loss,
            reason = "sync intervals are far below 2^52 ns"
        )]
        let ratio = remote as f64 / local as f64;
        if ratio > self.config.rate_ratio_min && ratio < self.config.rate_ratio_max {
            self.rate_ratio = ratio;
            self.rate_iir.feed(ratio);
            self.rate_fir.feed(ratio);
            self.runs = self.runs.saturating_add(1);
        } else {
            tracing::debug!(ratio, remote, local, "rate ratio out of band, sample discarded");
            self.rate_outliers = self.rate_outliers.saturating_add(1);
        }

        let outcome = self.steer(offset_ns)?;
        tracing::trace!(
            sequence_id = received,
            offset_ns,
            ratio,
            state = %self.state,
            "sync cycle"
        );
        Ok(outcome)
    }

    fn steer(&mut self, offset_ns: i64) -> Result<CycleOutcome, PtpError> {
        let offset = SignedOffset::from_nanos(offset_ns);
        match self.state {
            ServoState::Uninit => {
                if (self.runs as usize) < self.config.rate_window {
                    return Ok(CycleOutcome::Accumulating { runs: self.runs });
                }
                let increment =
                    TickIncrement::from_period(self.config.nominal_tick_ns * self.rate_fir.value());
                self.clock.set_increment(increment)?;
                tracing::info!(
                    rate_ratio = self.rate_fir.value(),
                    period_ns = increment.period_ns(),
                    "frequency matched"
                );
                self.state = ServoState::MatchFreq;
                self.synchronized = true;
                self.runs = 0;
                Ok(CycleOutcome::FrequencyMatched { increment })
            }
            ServoState::MatchFreq => {
                if offset.magnitude > self.config.match_freq_reset_threshold {
                    tracing::info!(offset_ns, "offset too large to steer, requesting hard resync");
                    self.hard_resync_pending = true;
                    Ok(CycleOutcome::HardResyncRequested { offset_ns })
                } else {
                    self.state = ServoState::HardSync;
                    Ok(CycleOutcome::PhaseLockStarted { offset_ns })
                }
            }
            ServoState::HardSync | ServoState::Coarse | ServoState::Fine => {
                self.steer_phase(offset_ns, offset)
            }
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "filtered offsets stay within the coarse threshold"
    )]
    fn steer_phase(&mut self, offset_ns: i64, offset: SignedOffset) -> Result<CycleOutcome, PtpError> {
        let magnitude = offset.magnitude;

        if magnitude > self.config.reset_threshold {
            tracing::warn!(offset_ns, state = %self.state, "offset beyond reset threshold, reacquiring");
            self.rate_fir.flush(1.0);
            self.offset_coarse.flush(0.0);
            self.offset_fine.flush(0.0);
            self.runs = 0;
            self.state = ServoState::Uninit;
            return Ok(CycleOutcome::Reacquiring { offset_ns });
        }

        let (state, applied) = if magnitude > self.config.hard_sync_threshold {
            (ServoState::HardSync, offset.clamped(self.config.hard_sync_threshold))
        } else if magnitude > self.config.coarse_threshold {
            self.offset_coarse.flush(0.0);
            self.offset_fine.flush(0.0);
            (ServoState::HardSync, offset)
        } else if magnitude > self.config.fine_threshold {
            self.offset_fine.flush(0.0);
            #[allow(clippy::cast_precision_loss, reason = "offset is below the coarse threshold")]
            let filtered = self.offset_coarse.feed(offset_ns as f64);
            (ServoState::Coarse, SignedOffset::from_nanos(filtered.round() as i64))
        } else {
            #[allow(clippy::cast_precision_loss, reason = "offset is below the fine threshold")]
            let filtered = self.offset_fine.feed(offset_ns as f64);
            (ServoState::Fine, SignedOffset::from_nanos(filtered.round() as i64))
        };

        self.clock.adjust_offset(applied)?;
        if state != self.state {
            tracing::debug!(from = %self.state, to = %state, offset_ns, "servo state change");
        }
        self.state = state;
        Ok(CycleOutcome::Corrected {
            state,
            offset_ns,
            applied,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServoState {
        self.state
    }

    /// Sequence tracking state.
    #[must_use]
    pub fn tracker(&self) -> SequenceTracker {
        self.tracker
    }

    /// Timestamp history.
    #[must_use]
    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// Whether a hard resync will be applied on the next cycle.
    #[must_use]
    pub fn hard_resync_pending(&self) -> bool {
        self.hard_resync_pending
    }

    /// Snapshot of the servo's observable state.
    #[must_use]
    pub fn status(&self) -> ServoStatus {
        ServoStatus {
            state: self.state,
            synchronized: self.synchronized,
            pps_enabled: self.pps_enabled,
            rate_ratio: self.rate_ratio,
            rate_ratio_iir: self.rate_iir.value(),
            rate_ratio_fir: self.rate_fir.value(),
            last_offset_ns: self.last_offset,
            expected_sequence: self.tracker.expected,
            runs: self.runs,
            rate_outliers: self.rate_outliers,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// Borrow the clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutably borrow the clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Release the clock.
    #[must_use]
    pub fn into_clock(self) -> C {
        self.clock
    }
}
