//! Async drivers for the follower servo and the grandmaster capture machine.
//!
//! The follower side is split in two: [`FollowerIngress`] runs in the frame
//! reception context (typically a driver callback with a hardware receive
//! timestamp) and must never block, while [`PtpFollowerTask`] owns the servo
//! and processes frames on a tokio task. The Sync receipt time travels through
//! a [`ReceiptSlot`]; the frames themselves through a bounded channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::clock::ClockAdjuster;
use super::handoff::{ReceiptSlot, ReceiptSnapshot};
use super::master::{MasterCapture, MasterEvent, Transport};
use super::message::{PtpHeader, PtpMessage, PtpMessageType, ptp_payload};
use super::registers::RegisterAccess;
use super::servo::{CycleOutcome, FollowerServo, SyncOutcome};
use super::timestamp::WireTimestamp;
use crate::error::PtpError;

/// Frames buffered between ingress and the follower task by default.
pub const DEFAULT_FRAME_QUEUE: usize = 16;

/// Default interval at which the master task polls its capture machine.
pub const DEFAULT_MASTER_TICK: Duration = Duration::from_millis(1);

/// What the follower task did with one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowerEvent {
    /// A Sync was processed.
    Sync(SyncOutcome),
    /// A `Follow_Up` was processed.
    FollowUp(CycleOutcome),
    /// A `Follow_Up` arrived but no receipt time for its Sync was available.
    MissingReceipt {
        /// Sequence ID of the `Follow_Up`.
        sequence_id: u16,
        /// Snapshot found instead, if any.
        found: Option<ReceiptSnapshot>,
    },
    /// Some other PTP message; ignored.
    Ignored(PtpMessageType),
}

/// Reception-context half of the follower.
#[derive(Debug, Clone)]
pub struct FollowerIngress {
    slot: Arc<ReceiptSlot>,
    frames: mpsc::Sender<Bytes>,
}

impl FollowerIngress {
    /// Hand over a received Ethernet frame and its hardware receive timestamp.
    ///
    /// Sync receipt times are published immediately; the frame is queued for
    /// the task. Returns `false` if the frame is not PTP or the queue is full.
    pub fn on_receive(&self, frame: &[u8], capture_seconds: u32, capture_nanoseconds: u32) -> bool {
        let header = match ptp_payload(frame).and_then(PtpHeader::decode) {
            Ok(header) => header,
            Err(e) => {
                tracing::trace!(error = %e, "ignoring non-PTP frame");
                return false;
            }
        };

        if header.message_type == PtpMessageType::Sync {
            let receipt = WireTimestamp {
                seconds_msb: 0,
                seconds_lsb: capture_seconds,
                nanoseconds: capture_nanoseconds,
            };
            self.slot.publish(header.sequence_id, receipt);
        }

        match self.frames.try_send(Bytes::copy_from_slice(frame)) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(sequence_id = header.sequence_id, error = %e, "PTP frame dropped");
                false
            }
        }
    }

    /// The receipt slot shared with the task.
    #[must_use]
    pub fn slot(&self) -> &Arc<ReceiptSlot> {
        &self.slot
    }
}

/// Task half of the follower: owns the servo.
#[derive(Debug)]
pub struct PtpFollowerTask<C> {
    servo: FollowerServo<C>,
    slot: Arc<ReceiptSlot>,
    frames: mpsc::Receiver<Bytes>,
}

impl<C: ClockAdjuster> PtpFollowerTask<C> {
    /// Create the task and its ingress handle with room for `queue_depth` frames.
    pub fn new(servo: FollowerServo<C>, queue_depth: usize) -> (Self, FollowerIngress) {
        let slot = Arc::new(ReceiptSlot::new());
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let task = Self {
            servo,
            slot: Arc::clone(&slot),
            frames: rx,
        };
        (task, FollowerIngress { slot, frames: tx })
    }

    /// The servo.
    #[must_use]
    pub fn servo(&self) -> &FollowerServo<C> {
        &self.servo
    }

    /// Release the servo.
    #[must_use]
    pub fn into_servo(self) -> FollowerServo<C> {
        self.servo
    }

    /// Process one received Ethernet frame.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be decoded or a clock write fails.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<FollowerEvent, PtpError> {
        match PtpMessage::decode_frame(frame)? {
            PtpMessage::Sync(sync) => Ok(FollowerEvent::Sync(
                self.servo.on_sync(sync.header.sequence_id)?,
            )),
            PtpMessage::FollowUp(follow_up) => {
                let sequence_id = follow_up.header.sequence_id;
                match self.slot.snapshot() {
                    Some(snapshot) if snapshot.sequence_id == sequence_id => {
                        let outcome = self.servo.on_follow_up(&follow_up, snapshot.receipt)?;
                        Ok(FollowerEvent::FollowUp(outcome))
                    }
                    found => {
                        tracing::debug!(sequence_id, ?found, "no receipt time for Follow_Up");
                        Ok(FollowerEvent::MissingReceipt { sequence_id, found })
                    }
                }
            }
            PtpMessage::Other(header) => Ok(FollowerEvent::Ignored(header.message_type)),
        }
    }

    /// Run until `shutdown` flips to `true`, then hand the servo back.
    ///
    /// Per-frame errors are logged and do not stop the loop.
    ///
    /// # Errors
    /// Returns an error if the servo cannot be started or every ingress
    /// handle has been dropped.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<FollowerServo<C>, PtpError> {
        self.servo.start()?;
        tracing::info!("PTP follower: run loop starting");

        loop {
            tokio::select! {
                frame = self.frames.recv() => {
                    let Some(frame) = frame else {
                        tracing::warn!("PTP follower: ingress closed");
                        return Err(PtpError::ChannelClosed);
                    };
                    match self.handle_frame(&frame) {
                        Ok(event) => tracing::trace!(?event, "PTP follower frame"),
                        Err(e) => tracing::warn!(error = %e, "PTP follower: frame not processed"),
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("PTP follower shutting down");
                        break;
                    }
                }
            }
        }
        Ok(self.servo)
    }
}

/// Periodically polls a [`MasterCapture`].
#[derive(Debug)]
pub struct PtpMasterTask<R, T> {
    capture: MasterCapture<R>,
    transport: T,
    tick: Duration,
}

impl<R: RegisterAccess, T: Transport> PtpMasterTask<R, T> {
    /// Create a task that polls every `tick`.
    pub fn new(capture: MasterCapture<R>, transport: T, tick: Duration) -> Self {
        Self {
            capture,
            transport,
            tick,
        }
    }

    /// The capture machine.
    #[must_use]
    pub fn capture(&self) -> &MasterCapture<R> {
        &self.capture
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run until `shutdown` flips to `true`, then hand back the parts.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> (MasterCapture<R>, T) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(identity = ?self.capture.identity(), "PTP master: run loop starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    match self.capture.poll(now, &mut self.transport) {
                        MasterEvent::Aborted(reason) => {
                            tracing::debug!(?reason, "PTP master: capture cycle aborted");
                        }
                        MasterEvent::FollowUpSent { sequence_id, origin } => {
                            tracing::trace!(sequence_id, %origin, "PTP master: cycle complete");
                        }
                        _ => {}
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("PTP master shutting down");
                        break;
                    }
                }
            }
        }
        (self.capture, self.transport)
    }
}
