//! Closed-loop tests: master capture state machine feeding the follower servo.
//!
//! The master runs against mock registers that report the Sync egress time,
//! and the follower disciplines a simulated drifting oscillator.

use std::time::{Duration, Instant};

use bytes::Bytes;

use t1s_ptp::protocol::ptp::message::PtpMessage;
use t1s_ptp::protocol::ptp::registers::{
    OA_STATUS0, OA_TTSCAH, OA_TTSCAL, OaStatus0, TXMCTL, TxMatchControl,
};
use t1s_ptp::protocol::ptp::servo::{CycleOutcome, FollowerServo, ServoState};
use t1s_ptp::protocol::ptp::{MasterEvent, WireTimestamp};
use t1s_ptp::testing::{LoopbackTransport, MockRegisters, SimulatedClock};
use t1s_ptp::{MasterCapture, MasterConfig, ServoConfig};

const NANOS_PER_SEC: u64 = 1_000_000_000;
const BASE_NS: u64 = 1_000 * NANOS_PER_SEC;
const PERIOD: Duration = Duration::from_millis(125);

struct Testbed {
    master: MasterCapture<MockRegisters>,
    link: LoopbackTransport,
    servo: FollowerServo<SimulatedClock>,
    epoch: Instant,
    cycle: u32,
}

impl Testbed {
    fn new(initial_offset_ns: i64, drift_ppm: f64) -> Self {
        let regs = MockRegisters::new().with(TXMCTL, TxMatchControl::TXPMDET.bits());
        let clock = SimulatedClock::new(
            BASE_NS,
            BASE_NS.wrapping_add_signed(initial_offset_ns),
            drift_ppm,
        );
        let mut servo = FollowerServo::new(ServoConfig::default(), clock);
        servo.start().unwrap();
        Self {
            master: MasterCapture::new(MasterConfig::default(), regs),
            link: LoopbackTransport::new(),
            servo,
            epoch: Instant::now(),
            cycle: 0,
        }
    }

    /// Run one master cycle; returns the Sync and `Follow_Up` frames and the egress time.
    fn transmit(&mut self) -> (Bytes, Bytes, u64) {
        let egress = BASE_NS + u64::from(self.cycle) * 125_000_000;
        let captured = egress - u64::from(MasterConfig::default().pipeline_delay_ns);
        let regs = self.master.registers_mut();
        regs.set(OA_TTSCAH, u32::try_from(captured / NANOS_PER_SEC).unwrap());
        regs.set(OA_TTSCAL, u32::try_from(captured % NANOS_PER_SEC).unwrap());
        regs.script_reads(OA_STATUS0, [OaStatus0::TTSCAA.bits()]);

        let now = self.epoch + PERIOD * self.cycle;
        let mut finished = false;
        for _ in 0..64 {
            match self.master.poll(now, &mut self.link) {
                MasterEvent::FollowUpSent { .. } => {
                    finished = true;
                    break;
                }
                MasterEvent::Aborted(reason) => panic!("master cycle aborted: {reason:?}"),
                _ => {}
            }
        }
        assert!(finished, "master cycle did not complete");
        self.cycle += 1;

        let mut frames = self.link.drain();
        assert_eq!(frames.len(), 2);
        let follow_up = frames.pop().unwrap();
        let sync = frames.pop().unwrap();
        (sync, follow_up, egress)
    }

    /// One exchange; either frame can be lost on the way.
    fn exchange(&mut self, deliver_sync: bool, deliver_follow_up: bool) -> Option<CycleOutcome> {
        let (sync, follow_up, egress) = self.transmit();
        self.servo.clock_mut().advance_to(egress);

        let mut receipt = WireTimestamp::ZERO;
        if deliver_sync {
            let sync = PtpMessage::decode_frame(&sync).unwrap().into_sync().unwrap();
            receipt = self.servo.clock().now();
            self.servo.on_sync(sync.header.sequence_id).unwrap();
        }
        if !deliver_follow_up {
            return None;
        }
        let follow_up = PtpMessage::decode_frame(&follow_up)
            .unwrap()
            .into_follow_up()
            .unwrap();
        Some(self.servo.on_follow_up(&follow_up, receipt).unwrap())
    }

    fn run(&mut self, cycles: u32) -> Vec<CycleOutcome> {
        (0..cycles).filter_map(|_| self.exchange(true, true)).collect()
    }
}

#[test]
fn test_converges_from_small_offset_and_drift() {
    let mut bed = Testbed::new(3_000_000, 50.0);
    let outcomes = bed.run(40);

    assert_eq!(outcomes[0], CycleOutcome::OutOfSequence);
    assert_eq!(outcomes[1], CycleOutcome::Degenerate);
    assert!(matches!(outcomes[2], CycleOutcome::Accumulating { runs: 1 }));
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::FrequencyMatched { .. }))
    );
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::PhaseLockStarted { .. }))
    );

    let clock = bed.servo.clock();
    assert!((clock.increment_ns() - 40.0 * 1.000_05).abs() < 1e-4);
    assert!(clock.pps_enabled());
    assert!(clock.offset_ns().abs() < 100, "offset {}", clock.offset_ns());

    let status = bed.servo.status();
    assert_eq!(status.state, ServoState::Fine);
    assert!(status.synchronized);
    assert!(status.last_offset_ns.unwrap().abs() < 100);
}

#[test]
fn test_hard_resync_on_large_initial_offset() {
    let mut bed = Testbed::new(-500_000_000, -20.0);
    let outcomes = bed.run(30);

    let requested = outcomes
        .iter()
        .position(|o| matches!(o, CycleOutcome::HardResyncRequested { .. }))
        .expect("hard resync requested");
    assert!(matches!(
        outcomes[requested + 1],
        CycleOutcome::Resynchronized { .. }
    ));
    assert!(!outcomes[requested + 1..]
        .iter()
        .any(|o| matches!(o, CycleOutcome::HardResyncRequested { .. })));

    assert_eq!(bed.servo.state(), ServoState::Fine);
    assert!(bed.servo.clock().offset_ns().abs() < 100);
}

#[test]
fn test_survives_frame_loss() {
    let mut bed = Testbed::new(-2_000_000, 80.0);
    let mut outcomes = Vec::new();
    for k in 0..80u32 {
        // Deterministic loss pattern hitting both message types.
        let deliver_sync = k % 7 != 3;
        let deliver_follow_up = k % 11 != 5;
        outcomes.extend(bed.exchange(deliver_sync, deliver_follow_up));
    }
    outcomes.extend(bed.run(20));

    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::OutOfSequence))
    );
    assert!(
        !outcomes
            .iter()
            .any(|o| matches!(o, CycleOutcome::Reacquiring { .. }))
    );
    assert_eq!(bed.servo.state(), ServoState::Fine);
    assert!(bed.servo.clock().offset_ns().abs() < 100);
}

#[test]
fn test_sequence_gap_forces_reset() {
    let mut bed = Testbed::new(1_000, 10.0);
    bed.run(12);
    assert_ne!(bed.servo.state(), ServoState::Uninit);

    // The master keeps counting while the follower hears nothing.
    for _ in 0..15 {
        bed.exchange(false, false);
    }
    let outcome = bed.exchange(true, true);
    assert_eq!(bed.servo.state(), ServoState::Uninit);
    assert!(!bed.servo.status().synchronized);
    assert_eq!(outcome, Some(CycleOutcome::OutOfSequence));
}
