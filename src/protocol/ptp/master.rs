//! Grandmaster side: Sync transmission and egress timestamp capture.
//!
//! After each Sync goes out, the MAC-PHY latches its egress time into one of
//! three capture register pairs. Fetching it takes a chain of asynchronous
//! register reads, so [`MasterCapture`] is a cooperative state machine that
//! advances at most one register step per [`poll`](MasterCapture::poll) and
//! never blocks. Once the capture is read and acknowledged it sends the
//! matching `Follow_Up`.

use std::fmt;
use std::time::Instant;

use super::message::{FollowUpMessage, PtpMessage, PtpPortIdentity, SyncMessage};
use super::registers::{
    OA_STATUS0, OaStatus0, RegisterAccess, TXMCTL, TimestampSlot, TxMatchControl,
};
use super::timestamp::WireTimestamp;
use crate::types::MasterConfig;

/// Frame-level link used to send PTP frames.
pub trait Transport {
    /// Whether a frame can be handed over right now.
    fn is_idle(&self) -> bool;

    /// Hand over a complete Ethernet frame. Returns `false` if it was not taken.
    fn send(&mut self, frame: &[u8]) -> bool;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        (**self).send(frame)
    }
}

/// Step the capture machine performs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasterCaptureState {
    /// Waiting for the sync period to elapse, then send a Sync.
    #[default]
    Send,
    /// Issue the `TXMCTL` read.
    AwaitTxStatus,
    /// Wait for `TXMCTL`, then issue the `OA_STATUS0` read.
    AwaitOaStatus,
    /// Wait for `OA_STATUS0`, then issue the capture seconds read.
    AwaitSecReg,
    /// Wait for the seconds, then issue the capture nanoseconds read.
    AwaitNsecReg {
        /// Capture slot being read.
        slot: TimestampSlot,
    },
    /// Wait for the nanoseconds, then acknowledge the capture.
    ClearStatus {
        /// Capture slot being read.
        slot: TimestampSlot,
        /// Captured seconds.
        seconds: u32,
    },
    /// Send the `Follow_Up`.
    SendFollowUp {
        /// Captured seconds.
        seconds: u32,
        /// Captured nanoseconds.
        nanoseconds: u32,
    },
}

impl fmt::Display for MasterCaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "SEND",
            Self::AwaitTxStatus => "AWAIT_TX_STATUS",
            Self::AwaitOaStatus => "AWAIT_OA_STATUS",
            Self::AwaitSecReg => "AWAIT_SEC_REG",
            Self::AwaitNsecReg { .. } => "AWAIT_NSEC_REG",
            Self::ClearStatus { .. } => "CLEAR_STATUS",
            Self::SendFollowUp { .. } => "SEND_FOLLOW_UP",
        };
        f.write_str(name)
    }
}

/// Why a capture cycle was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The transmitted frame did not match the timestamp filter.
    NoTimestampMatch,
    /// No capture slot was flagged.
    NoCaptureSlot,
    /// A step was rejected too many times in a row.
    RetriesExhausted,
    /// An issued read never completed.
    CompletionTimeout,
}

/// What a single [`MasterCapture::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterEvent {
    /// Nothing to do yet.
    Idle,
    /// A Sync was sent.
    SyncSent {
        /// Sequence ID of the Sync.
        sequence_id: u16,
    },
    /// A register step was taken; the machine moved on.
    Advanced(MasterCaptureState),
    /// Waiting for a register read to complete.
    Waiting,
    /// The current step was rejected and will be retried.
    Retrying {
        /// Consecutive rejections so far.
        attempt: u32,
    },
    /// A `Follow_Up` was sent and the cycle completed.
    FollowUpSent {
        /// Sequence ID shared by the Sync and `Follow_Up`.
        sequence_id: u16,
        /// Reported precise origin time.
        origin: WireTimestamp,
    },
    /// The cycle was abandoned; the next poll starts over.
    Aborted(AbortReason),
}

/// Grandmaster Sync/`Follow_Up` sender.
#[derive(Debug)]
pub struct MasterCapture<R> {
    config: MasterConfig,
    regs: R,
    identity: PtpPortIdentity,
    state: MasterCaptureState,
    sequence_id: u16,
    failures: u32,
    completed: Option<u32>,
    waiting_since: Option<Instant>,
    last_sync: Option<Instant>,
}

impl<R: RegisterAccess> MasterCapture<R> {
    /// Create a capture machine in [`MasterCaptureState::Send`].
    pub fn new(config: MasterConfig, regs: R) -> Self {
        Self {
            identity: PtpPortIdentity::from_mac(config.source_mac, config.port_number),
            config,
            regs,
            state: MasterCaptureState::Send,
            sequence_id: 0,
            failures: 0,
            completed: None,
            waiting_since: None,
            last_sync: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MasterCaptureState {
        self.state
    }

    /// Sequence ID the next Sync will carry.
    #[must_use]
    pub fn sequence_id(&self) -> u16 {
        self.sequence_id
    }

    /// Port identity placed in outgoing headers.
    #[must_use]
    pub fn identity(&self) -> PtpPortIdentity {
        self.identity
    }

    /// Borrow the register interface.
    #[must_use]
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Mutably borrow the register interface.
    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Advance by at most one step.
    pub fn poll(&mut self, now: Instant, transport: &mut impl Transport) -> MasterEvent {
        self.regs.service();

        match self.state {
            MasterCaptureState::Send => self.send_sync(now, transport),
            MasterCaptureState::AwaitTxStatus => {
                // Discard a completion left over from an abandoned cycle.
                let _ = self.regs.poll_complete();
                self.completed = None;
                let accepted = self.regs.read(TXMCTL);
                self.step(accepted, now, MasterCaptureState::AwaitOaStatus)
            }
            MasterCaptureState::AwaitOaStatus => {
                let Some(value) = self.completion() else {
                    return self.wait(now);
                };
                if !TxMatchControl::from_bits_truncate(value).contains(TxMatchControl::TXPMDET) {
                    tracing::debug!(txmctl = value, "Sync did not match the timestamp filter");
                    return self.abort(AbortReason::NoTimestampMatch);
                }
                let accepted = self.regs.read(OA_STATUS0);
                self.step(accepted, now, MasterCaptureState::AwaitSecReg)
            }
            MasterCaptureState::AwaitSecReg => {
                let Some(value) = self.completion() else {
                    return self.wait(now);
                };
                let Some(slot) = TimestampSlot::from_status(OaStatus0::from_bits_truncate(value))
                else {
                    tracing::debug!(status = value, "no transmit timestamp captured");
                    return self.abort(AbortReason::NoCaptureSlot);
                };
                let accepted = self.regs.read(slot.seconds_register());
                self.step(accepted, now, MasterCaptureState::AwaitNsecReg { slot })
            }
            MasterCaptureState::AwaitNsecReg { slot } => {
                let Some(seconds) = self.completion() else {
                    return self.wait(now);
                };
                let accepted = self.regs.read(slot.nanoseconds_register());
                self.step(accepted, now, MasterCaptureState::ClearStatus { slot, seconds })
            }
            MasterCaptureState::ClearStatus { slot, seconds } => {
                let Some(nanoseconds) = self.completion() else {
                    return self.wait(now);
                };
                let accepted = self.regs.write(OA_STATUS0, slot.status_bit().bits());
                self.step(
                    accepted,
                    now,
                    MasterCaptureState::SendFollowUp {
                        seconds,
                        nanoseconds,
                    },
                )
            }
            MasterCaptureState::SendFollowUp {
                seconds,
                nanoseconds,
            } => self.send_follow_up(seconds, nanoseconds, transport),
        }
    }

    fn send_sync(&mut self, now: Instant, transport: &mut impl Transport) -> MasterEvent {
        let due = self
            .last_sync
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.sync_period);
        if !due || !transport.is_idle() {
            return MasterEvent::Idle;
        }

        let sync = PtpMessage::from(SyncMessage::new(self.identity, self.sequence_id));
        if !transport.send(&sync.encode_frame(self.config.source_mac)) {
            tracing::debug!(sequence_id = self.sequence_id, "Sync not accepted by transport");
            return MasterEvent::Idle;
        }

        self.last_sync = Some(now);
        self.enter(MasterCaptureState::AwaitTxStatus, now);
        tracing::trace!(sequence_id = self.sequence_id, "Sync sent");
        MasterEvent::SyncSent {
            sequence_id: self.sequence_id,
        }
    }

    fn send_follow_up(
        &mut self,
        seconds: u32,
        nanoseconds: u32,
        transport: &mut impl Transport,
    ) -> MasterEvent {
        let origin = egress_origin(seconds, nanoseconds, self.config.pipeline_delay_ns);
        let follow_up =
            PtpMessage::from(FollowUpMessage::new(self.identity, self.sequence_id, origin));
        if !transport.send(&follow_up.encode_frame(self.config.source_mac)) {
            return self.reject();
        }

        let sequence_id = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        self.failures = 0;
        self.state = MasterCaptureState::Send;
        self.waiting_since = None;
        tracing::trace!(sequence_id, %origin, "Follow_Up sent");
        MasterEvent::FollowUpSent {
            sequence_id,
            origin,
        }
    }

    fn completion(&mut self) -> Option<u32> {
        if self.completed.is_none() {
            self.completed = self.regs.poll_complete();
        }
        self.completed
    }

    fn wait(&mut self, now: Instant) -> MasterEvent {
        let since = *self.waiting_since.get_or_insert(now);
        if now.saturating_duration_since(since) > self.config.completion_timeout {
            tracing::warn!(state = %self.state, "register read did not complete");
            return self.abort(AbortReason::CompletionTimeout);
        }
        MasterEvent::Waiting
    }

    fn step(&mut self, accepted: bool, now: Instant, next: MasterCaptureState) -> MasterEvent {
        if !accepted {
            return self.reject();
        }
        self.completed = None;
        self.enter(next, now);
        MasterEvent::Advanced(next)
    }

    fn enter(&mut self, next: MasterCaptureState, now: Instant) {
        self.failures = 0;
        self.state = next;
        self.waiting_since = Some(now);
    }

    fn reject(&mut self) -> MasterEvent {
        self.failures += 1;
        if self.failures > self.config.max_register_retries {
            tracing::warn!(state = %self.state, failures = self.failures, "step rejected too often");
            return self.abort(AbortReason::RetriesExhausted);
        }
        MasterEvent::Retrying {
            attempt: self.failures,
        }
    }

    fn abort(&mut self, reason: AbortReason) -> MasterEvent {
        tracing::debug!(?reason, sequence_id = self.sequence_id, "capture cycle abandoned");
        self.state = MasterCaptureState::Send;
        self.failures = 0;
        self.completed = None;
        self.waiting_since = None;
        MasterEvent::Aborted(reason)
    }
}

/// Origin time reported in the `Follow_Up`: the captured egress time plus the
/// PHY pipeline delay, carrying into the seconds when nanoseconds overflow.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    reason = "nanoseconds are clamped below one second first"
)]
pub fn egress_origin(seconds: u32, nanoseconds: u32, pipeline_delay_ns: u32) -> WireTimestamp {
    let per_sec = u64::from(WireTimestamp::NANOS_PER_SEC);
    let mut seconds = u64::from(seconds);
    let mut nanoseconds = u64::from(nanoseconds) + u64::from(pipeline_delay_ns);
    if nanoseconds >= per_sec {
        nanoseconds -= per_sec;
        seconds += 1;
    }
    WireTimestamp::new(seconds, nanoseconds.min(per_sec - 1) as u32)
}
