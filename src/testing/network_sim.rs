//! Link condition simulation for testing

use std::collections::VecDeque;

use bytes::Bytes;
use rand::Rng;

use crate::protocol::ptp::master::Transport;

/// Single-segment link condition simulator
#[derive(Clone, Debug)]
pub struct LinkSimulator {
    /// Frame loss probability (0.0 to 1.0)
    pub loss_rate: f64,
    /// Fixed propagation and PHY delay in nanoseconds
    pub delay_ns: u64,
    /// Maximum timestamping jitter in nanoseconds
    pub jitter_ns: u64,
}

impl LinkSimulator {
    /// Perfect link
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            loss_rate: 0.0,
            delay_ns: 0,
            jitter_ns: 0,
        }
    }

    /// A short 10BASE-T1S segment with hardware timestamping
    #[must_use]
    pub fn short_segment() -> Self {
        Self {
            loss_rate: 0.0,
            delay_ns: 120,
            jitter_ns: 40,
        }
    }

    /// Noisy segment that drops frames (stress test)
    #[must_use]
    pub fn lossy() -> Self {
        Self {
            loss_rate: 0.05,
            delay_ns: 120,
            jitter_ns: 80,
        }
    }

    /// Should this frame be dropped?
    #[must_use]
    pub fn should_drop(&self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.loss_rate.min(1.0))
    }

    /// Delay seen by this frame, jitter included
    #[must_use]
    pub fn sample_delay_ns(&self) -> u64 {
        let jitter = if self.jitter_ns > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ns)
        } else {
            0
        };
        self.delay_ns + jitter
    }
}

impl Default for LinkSimulator {
    fn default() -> Self {
        Self::perfect()
    }
}

/// [`Transport`] that queues sent frames for the test to pick up.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    frames: VecDeque<Bytes>,
    /// Reported by [`Transport::is_idle`]
    pub idle: bool,
    reject_next: u32,
    sent: usize,
}

impl LoopbackTransport {
    /// Idle transport with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            idle: true,
            reject_next: 0,
            sent: 0,
        }
    }

    /// Refuse the next `count` frames
    pub fn reject_next(&mut self, count: u32) {
        self.reject_next = count;
    }

    /// Oldest queued frame
    pub fn pop(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Take every queued frame
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.frames.drain(..).collect()
    }

    /// Frames accepted since creation
    #[must_use]
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn is_idle(&self) -> bool {
        self.idle
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        if self.reject_next > 0 {
            self.reject_next -= 1;
            return false;
        }
        self.frames.push_back(Bytes::copy_from_slice(frame));
        self.sent += 1;
        true
    }
}
