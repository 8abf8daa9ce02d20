//! Common test utilities and fixtures
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, fmt};

use t1s_ptp::PtpError;
use t1s_ptp::protocol::ptp::clock::{ClockAdjuster, TickIncrement};
use t1s_ptp::protocol::ptp::message::{ETHERNET_HEADER_LEN, PtpHeader, PtpMessageType};
use t1s_ptp::protocol::ptp::registers::{
    OA_STATUS0, OA_TTSCAH, OA_TTSCAL, OaStatus0, RegisterAccess, TXMCTL, TxMatchControl,
};
use t1s_ptp::protocol::ptp::{FollowerIngress, SignedOffset, Transport, WireTimestamp};
use t1s_ptp::testing::{LinkSimulator, SimulatedClock};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive("t1s_ptp=debug".parse().unwrap());

        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Master time at the start of every test.
pub const BASE_NS: u64 = 1_000 * NANOS_PER_SEC;

/// Grandmaster time, derived from the (usually paused) tokio clock.
#[derive(Debug, Clone, Copy)]
pub struct Timebase {
    epoch: Instant,
}

impl Timebase {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn master_ns(&self) -> u64 {
        BASE_NS + u64::try_from(self.epoch.elapsed().as_nanos()).unwrap()
    }
}

/// Follower timer shared by the ingress path (which timestamps frames)
/// and the servo (which steers it).
#[derive(Debug, Clone)]
pub struct SharedClock {
    inner: Arc<Mutex<SimulatedClock>>,
    timebase: Timebase,
}

impl SharedClock {
    pub fn new(timebase: Timebase, initial_offset_ns: i64, drift_ppm: f64) -> Self {
        let master = timebase.master_ns();
        let local = master.wrapping_add_signed(initial_offset_ns);
        let clock = SimulatedClock::new(master, local, drift_ppm);
        Self {
            inner: Arc::new(Mutex::new(clock)),
            timebase,
        }
    }

    /// Local time when a frame arrives at master time `master_ns`.
    pub fn capture_at(&self, master_ns: u64) -> WireTimestamp {
        let mut clock = self.inner.lock().unwrap();
        clock.advance_to(master_ns);
        clock.now()
    }

    /// Local minus master time right now.
    pub fn offset_ns(&self) -> i64 {
        self.with(|clock| clock.offset_ns())
    }

    pub fn pps_enabled(&self) -> bool {
        self.with(|clock| clock.pps_enabled())
    }

    pub fn increment_ns(&self) -> f64 {
        self.with(|clock| clock.increment_ns())
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimulatedClock) -> R) -> R {
        let mut clock = self.inner.lock().unwrap();
        clock.advance_to(self.timebase.master_ns());
        f(&mut clock)
    }
}

impl ClockAdjuster for SharedClock {
    fn set_time(&mut self, time: WireTimestamp) -> Result<(), PtpError> {
        self.with(|clock| clock.set_time(time))
    }

    fn set_increment(&mut self, increment: TickIncrement) -> Result<(), PtpError> {
        self.with(|clock| clock.set_increment(increment))
    }

    fn adjust_offset(&mut self, offset: SignedOffset) -> Result<(), PtpError> {
        self.with(|clock| clock.adjust_offset(offset))
    }

    fn arm_pps(&mut self) -> Result<(), PtpError> {
        self.with(|clock| clock.arm_pps())
    }

    fn enable_pps(&mut self) -> Result<(), PtpError> {
        self.with(|clock| clock.enable_pps())
    }
}

/// Latched transmit capture shared by the segment and the master's registers.
pub type CaptureLatch = Arc<Mutex<Option<u64>>>;

/// Master MAC-PHY register file: capture slot A holds the last Sync egress time.
#[derive(Debug)]
pub struct SimulatedMacPhy {
    latch: CaptureLatch,
    completed: Option<u32>,
}

impl SimulatedMacPhy {
    pub fn new(latch: CaptureLatch) -> Self {
        Self {
            latch,
            completed: None,
        }
    }
}

impl RegisterAccess for SimulatedMacPhy {
    fn write(&mut self, addr: u32, value: u32) -> bool {
        if addr == OA_STATUS0 && OaStatus0::from_bits_truncate(value).contains(OaStatus0::TTSCAA) {
            *self.latch.lock().unwrap() = None;
        }
        true
    }

    fn read(&mut self, addr: u32) -> bool {
        let latched = *self.latch.lock().unwrap();
        let value = match (addr, latched) {
            (TXMCTL, Some(_)) => TxMatchControl::TXPMDET.bits(),
            (OA_STATUS0, Some(_)) => OaStatus0::TTSCAA.bits(),
            (OA_TTSCAH, Some(ns)) => u32::try_from(ns / NANOS_PER_SEC).unwrap(),
            (OA_TTSCAL, Some(ns)) => u32::try_from(ns % NANOS_PER_SEC).unwrap(),
            _ => 0,
        };
        self.completed = Some(value);
        true
    }

    fn poll_complete(&mut self) -> Option<u32> {
        self.completed.take()
    }

    fn service(&mut self) {}
}

/// Single 10BASE-T1S segment between the master transport and the follower ingress.
pub struct SimulatedSegment {
    link: LinkSimulator,
    latch: CaptureLatch,
    ingress: FollowerIngress,
    follower_clock: SharedClock,
    timebase: Timebase,
    pipeline_delay_ns: u64,
    pub delivered: usize,
    pub dropped: usize,
}

impl SimulatedSegment {
    pub fn new(
        link: LinkSimulator,
        latch: CaptureLatch,
        ingress: FollowerIngress,
        follower_clock: SharedClock,
        timebase: Timebase,
    ) -> Self {
        Self {
            link,
            latch,
            ingress,
            follower_clock,
            timebase,
            pipeline_delay_ns: 7_650,
            delivered: 0,
            dropped: 0,
        }
    }
}

impl Transport for SimulatedSegment {
    fn is_idle(&self) -> bool {
        true
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        let captured = self.timebase.master_ns();
        let Ok(header) = PtpHeader::decode(&frame[ETHERNET_HEADER_LEN..]) else {
            return false;
        };
        if header.message_type == PtpMessageType::Sync {
            *self.latch.lock().unwrap() = Some(captured);
        }

        if self.link.should_drop() {
            self.dropped += 1;
            return true;
        }
        let arrival = captured + self.pipeline_delay_ns + self.link.sample_delay_ns();
        let receipt = self.follower_clock.capture_at(arrival);
        let seconds = u32::try_from(receipt.seconds()).unwrap();
        if self.ingress.on_receive(frame, seconds, receipt.nanoseconds) {
            self.delivered += 1;
        }
        true
    }
}
