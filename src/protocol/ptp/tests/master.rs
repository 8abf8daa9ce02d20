use std::time::{Duration, Instant};

use crate::protocol::ptp::master::*;
use crate::protocol::ptp::message::{PtpMessage, PtpMessageType};
use crate::protocol::ptp::registers::*;
use crate::protocol::ptp::timestamp::WireTimestamp;
use crate::testing::{LoopbackTransport, MockRegisters};
use crate::types::MasterConfig;

fn capture_regs(status: OaStatus0, seconds: u32, nanoseconds: u32) -> MockRegisters {
    MockRegisters::new()
        .with(TXMCTL, TxMatchControl::TXPMDET.bits())
        .with(OA_STATUS0, status.bits())
        .with(OA_TTSCAH, seconds)
        .with(OA_TTSCAL, nanoseconds)
        .with(OA_TTSCBH, seconds)
        .with(OA_TTSCBL, nanoseconds)
        .with(OA_TTSCCH, seconds)
        .with(OA_TTSCCL, nanoseconds)
}

/// Poll until a terminal event, returning every event seen.
fn run_cycle(
    master: &mut MasterCapture<MockRegisters>,
    link: &mut LoopbackTransport,
    now: Instant,
) -> Vec<MasterEvent> {
    let mut events = Vec::new();
    for _ in 0..32 {
        let event = master.poll(now, link);
        events.push(event);
        if matches!(
            event,
            MasterEvent::FollowUpSent { .. } | MasterEvent::Aborted(_)
        ) {
            break;
        }
    }
    events
}

#[test]
fn test_full_cycle_with_carry() {
    let regs = capture_regs(OaStatus0::TTSCAB, 100, 999_995_000);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let now = Instant::now();

    let events = run_cycle(&mut master, &mut link, now);
    assert_eq!(events[0], MasterEvent::SyncSent { sequence_id: 0 });
    let expected_origin = WireTimestamp::new(101, 2_650);
    assert_eq!(
        events.last(),
        Some(&MasterEvent::FollowUpSent {
            sequence_id: 0,
            origin: expected_origin,
        })
    );

    // Register traffic: TXMCTL, status, slot B seconds then nanoseconds.
    assert_eq!(
        master.registers().reads(),
        &[TXMCTL, OA_STATUS0, OA_TTSCBH, OA_TTSCBL]
    );
    assert_eq!(
        master.registers().writes(),
        &[(OA_STATUS0, OaStatus0::TTSCAB.bits())]
    );
    assert_eq!(master.registers().get(OA_STATUS0), 0);

    let frames = link.drain();
    assert_eq!(frames.len(), 2);
    let PtpMessage::Sync(sync) = PtpMessage::decode_frame(&frames[0]).unwrap() else {
        panic!("expected Sync");
    };
    let PtpMessage::FollowUp(follow_up) = PtpMessage::decode_frame(&frames[1]).unwrap() else {
        panic!("expected Follow_Up");
    };
    assert_eq!(sync.header.sequence_id, follow_up.header.sequence_id);
    assert_eq!(follow_up.precise_origin_timestamp, expected_origin);
    assert_eq!(follow_up.header.source_port_identity, master.identity());

    assert_eq!(master.sequence_id(), 1);
    assert_eq!(master.state(), MasterCaptureState::Send);
}

#[test]
fn test_egress_origin() {
    assert_eq!(egress_origin(5, 100, 7_650), WireTimestamp::new(5, 7_750));
    assert_eq!(
        egress_origin(100, 999_995_000, 7_650),
        WireTimestamp::new(101, 2_650)
    );
    assert_eq!(
        egress_origin(u32::MAX, 999_999_999, 1),
        WireTimestamp::new(u64::from(u32::MAX) + 1, 0)
    );
}

#[test]
fn test_slot_priority() {
    let status = OaStatus0::TTSCAC | OaStatus0::TTSCAB;
    assert_eq!(TimestampSlot::from_status(status), Some(TimestampSlot::B));
    assert_eq!(
        TimestampSlot::from_status(status | OaStatus0::TTSCAA),
        Some(TimestampSlot::A)
    );
    assert_eq!(TimestampSlot::from_status(OaStatus0::empty()), None);

    let regs = capture_regs(OaStatus0::TTSCAC, 7, 0);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    run_cycle(&mut master, &mut link, Instant::now());
    assert_eq!(master.registers().reads()[2], OA_TTSCCH);
    assert_eq!(master.registers().reads()[3], OA_TTSCCL);
}

#[test]
fn test_no_match_aborts_without_follow_up() {
    let regs = capture_regs(OaStatus0::TTSCAA, 1, 1).with(TXMCTL, 0);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let events = run_cycle(&mut master, &mut link, Instant::now());
    assert_eq!(
        events.last(),
        Some(&MasterEvent::Aborted(AbortReason::NoTimestampMatch))
    );
    assert_eq!(link.sent(), 1);
    assert_eq!(master.sequence_id(), 0);
    assert_eq!(master.state(), MasterCaptureState::Send);
}

#[test]
fn test_no_slot_aborts() {
    let regs = capture_regs(OaStatus0::empty(), 1, 1);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let events = run_cycle(&mut master, &mut link, Instant::now());
    assert_eq!(
        events.last(),
        Some(&MasterEvent::Aborted(AbortReason::NoCaptureSlot))
    );
}

#[test]
fn test_rejected_reads_are_retried() {
    let mut regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    regs.reject_reads(2);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let events = run_cycle(&mut master, &mut link, Instant::now());
    assert!(events.contains(&MasterEvent::Retrying { attempt: 2 }));
    assert!(matches!(
        events.last(),
        Some(MasterEvent::FollowUpSent { .. })
    ));
}

#[test]
fn test_retry_exhaustion_aborts() {
    let config = MasterConfig {
        max_register_retries: 3,
        ..MasterConfig::default()
    };
    let mut regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    regs.reject_reads(u32::MAX);
    let mut master = MasterCapture::new(config, regs);
    let mut link = LoopbackTransport::new();
    let events = run_cycle(&mut master, &mut link, Instant::now());
    assert_eq!(
        &events[1..],
        &[
            MasterEvent::Retrying { attempt: 1 },
            MasterEvent::Retrying { attempt: 2 },
            MasterEvent::Retrying { attempt: 3 },
            MasterEvent::Aborted(AbortReason::RetriesExhausted),
        ]
    );
}

#[test]
fn test_completion_timeout() {
    let mut regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    regs.read_latency = u32::MAX;
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let start = Instant::now();

    assert!(matches!(
        master.poll(start, &mut link),
        MasterEvent::SyncSent { .. }
    ));
    assert_eq!(
        master.poll(start, &mut link),
        MasterEvent::Advanced(MasterCaptureState::AwaitOaStatus)
    );
    assert_eq!(
        master.poll(start + Duration::from_millis(10), &mut link),
        MasterEvent::Waiting
    );
    assert_eq!(
        master.poll(start + Duration::from_millis(60), &mut link),
        MasterEvent::Aborted(AbortReason::CompletionTimeout)
    );
}

#[test]
fn test_sync_cadence_and_idle_gate() {
    let regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let start = Instant::now();

    link.idle = false;
    assert_eq!(master.poll(start, &mut link), MasterEvent::Idle);
    link.idle = true;

    run_cycle(&mut master, &mut link, start);
    // Period not elapsed yet.
    assert_eq!(
        master.poll(start + Duration::from_millis(100), &mut link),
        MasterEvent::Idle
    );
    assert_eq!(
        master.poll(start + Duration::from_millis(125), &mut link),
        MasterEvent::SyncSent { sequence_id: 1 }
    );
}

#[test]
fn test_follow_up_send_retried() {
    let regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    let mut master = MasterCapture::new(MasterConfig::default(), regs);
    let mut link = LoopbackTransport::new();
    let now = Instant::now();

    let mut event = master.poll(now, &mut link);
    while !matches!(master.state(), MasterCaptureState::SendFollowUp { .. }) {
        event = master.poll(now, &mut link);
    }
    assert!(matches!(event, MasterEvent::Advanced(_)));
    link.reject_next(1);
    assert_eq!(
        master.poll(now, &mut link),
        MasterEvent::Retrying { attempt: 1 }
    );
    assert!(matches!(
        master.poll(now, &mut link),
        MasterEvent::FollowUpSent { sequence_id: 0, .. }
    ));
}

#[test]
fn test_consecutive_cycles() {
    let mut regs = capture_regs(OaStatus0::TTSCAA, 3, 3);
    // Clearing the status consumes the capture, so latch one per Sync.
    regs.script_reads(OA_STATUS0, [OaStatus0::TTSCAA.bits(); 3]);
    let config = MasterConfig {
        sync_period: Duration::ZERO,
        ..MasterConfig::default()
    };
    let mut master = MasterCapture::new(config, regs);
    let mut link = LoopbackTransport::new();
    let now = Instant::now();
    for _ in 0..3 {
        run_cycle(&mut master, &mut link, now);
    }
    assert_eq!(master.sequence_id(), 3);

    let types: Vec<_> = link
        .drain()
        .iter()
        .map(|f| PtpMessage::decode_frame(f).unwrap().header().message_type)
        .collect();
    assert_eq!(
        types,
        [
            PtpMessageType::Sync,
            PtpMessageType::FollowUp,
            PtpMessageType::Sync,
            PtpMessageType::FollowUp,
            PtpMessageType::Sync,
            PtpMessageType::FollowUp
        ]
    );
}
