use crate::protocol::ptp::message::*;
use crate::protocol::ptp::timestamp::{WireTimestamp, nanos_to_correction};

fn identity() -> PtpPortIdentity {
    PtpPortIdentity::from_mac([0x40, 0x84, 0x32, 0x7D, 0x07, 0xFA], 1)
}

// ===== PtpMessageType =====

#[test]
fn test_message_type_nibble() {
    assert_eq!(PtpMessageType::from_nibble(0x10).unwrap(), PtpMessageType::Sync);
    assert_eq!(PtpMessageType::from_nibble(0x18).unwrap(), PtpMessageType::FollowUp);
    assert_eq!(
        PtpMessageType::from_nibble(0x0F),
        Err(PtpParseError::UnknownMessageType(0x0F))
    );
    assert!(PtpMessageType::Sync.is_event());
    assert!(!PtpMessageType::FollowUp.is_event());
}

// ===== PtpPortIdentity =====

#[test]
fn test_identity_from_mac_eui64() {
    let id = identity();
    assert_eq!(
        id.clock_identity,
        [0x40, 0x84, 0x32, 0xFF, 0xFE, 0x7D, 0x07, 0xFA]
    );
    assert_eq!(id.port_number, 1);
}

// ===== Sync =====

#[test]
fn test_sync_layout() {
    let bytes = PtpMessage::from(SyncMessage::new(identity(), 0x1234)).encode();
    assert_eq!(bytes.len(), SyncMessage::SIZE);
    assert_eq!(bytes.len(), 44);
    assert_eq!(bytes[0], 0x10); // 802.1AS transport, Sync
    assert_eq!(bytes[1], 0x02);
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 44);
    assert_eq!(&bytes[6..8], &[0x02, 0x08]);
    assert_eq!(&bytes[20..28], &identity().clock_identity);
    assert_eq!(u16::from_be_bytes([bytes[30], bytes[31]]), 0x1234);
    assert_eq!(bytes[32], 0x02);
    assert_eq!(bytes[33] as i8, -3);
    assert!(bytes[34..].iter().all(|b| *b == 0));
}

#[test]
fn test_sync_decode() {
    let bytes = PtpMessage::from(SyncMessage::new(identity(), 9)).encode();
    let PtpMessage::Sync(sync) = PtpMessage::decode(&bytes).unwrap() else {
        panic!("expected Sync");
    };
    assert_eq!(sync.header.sequence_id, 9);
    assert!(sync.header.is_two_step());
    assert_eq!(sync.origin_timestamp, WireTimestamp::ZERO);
}

#[test]
fn test_typed_accessors() {
    let sync = PtpMessage::from(SyncMessage::new(identity(), 3));
    assert_eq!(sync.into_sync().unwrap().header.sequence_id, 3);
    assert_eq!(
        sync.into_follow_up(),
        Err(PtpParseError::UnexpectedMessageType {
            expected: PtpMessageType::FollowUp,
            found: PtpMessageType::Sync,
        })
    );

    let follow_up = PtpMessage::from(FollowUpMessage::new(identity(), 4, WireTimestamp::ZERO));
    assert_eq!(follow_up.into_follow_up().unwrap().header.sequence_id, 4);
    assert!(matches!(
        follow_up.into_sync(),
        Err(PtpParseError::UnexpectedMessageType {
            expected: PtpMessageType::Sync,
            found: PtpMessageType::FollowUp,
        })
    ));
}

// ===== Follow_Up =====

#[test]
fn test_follow_up_layout() {
    let origin = WireTimestamp::new(101, 2_650);
    let bytes = PtpMessage::from(FollowUpMessage::new(identity(), 7, origin)).encode();
    assert_eq!(bytes.len(), FollowUpMessage::SIZE);
    assert_eq!(bytes.len(), 76);
    assert_eq!(bytes[0], 0x18);
    assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 76);
    assert_eq!(&bytes[6..8], &[0x00, 0x08]);
    assert_eq!(bytes[32], 0x02);
    assert_eq!(&bytes[34..44], &origin.encode());
    // TLV header
    assert_eq!(&bytes[44..46], &[0x00, 0x03]);
    assert_eq!(&bytes[46..48], &[0x00, 0x1C]);
    assert_eq!(&bytes[48..51], &[0x00, 0x80, 0xC2]);
    assert_eq!(&bytes[51..54], &[0x00, 0x00, 0x01]);
}

#[test]
fn test_follow_up_decode_with_correction() {
    let mut msg = FollowUpMessage::new(identity(), 3, WireTimestamp::new(50, 1_000));
    msg.header.correction_field = nanos_to_correction(250) + 0x7FFF;
    let decoded = PtpMessage::decode(&PtpMessage::from(msg).encode()).unwrap();
    let PtpMessage::FollowUp(follow_up) = decoded else {
        panic!("expected Follow_Up");
    };
    assert_eq!(follow_up.header.correction_nanos(), 250);
    assert_eq!(follow_up.corrected_origin(), WireTimestamp::new(50, 1_250));
    assert_eq!(follow_up.tlv, FollowUpTlv::default());
}

#[test]
fn test_follow_up_without_tlv() {
    let bytes = PtpMessage::from(FollowUpMessage::new(identity(), 3, WireTimestamp::new(1, 2))).encode();
    let decoded = PtpMessage::decode(&bytes[..44]).unwrap();
    assert!(matches!(decoded, PtpMessage::FollowUp(_)));
}

#[test]
fn test_follow_up_rejects_bad_nanoseconds() {
    let mut bytes = PtpMessage::from(FollowUpMessage::new(identity(), 3, WireTimestamp::ZERO))
        .encode()
        .to_vec();
    bytes[40..44].copy_from_slice(&1_000_000_000u32.to_be_bytes());
    assert_eq!(
        PtpMessage::decode(&bytes),
        Err(PtpParseError::InvalidNanoseconds(1_000_000_000))
    );
}

#[test]
fn test_decode_truncated() {
    assert!(matches!(
        PtpMessage::decode(&[0x10; 20]),
        Err(PtpParseError::TooShort { needed: 34, have: 20 })
    ));
    let bytes = PtpMessage::from(SyncMessage::new(identity(), 1)).encode();
    assert!(matches!(
        PtpMessage::decode(&bytes[..40]),
        Err(PtpParseError::TooShort { .. })
    ));
}

#[test]
fn test_other_message_header_only() {
    let header = PtpHeader::new(PtpMessageType::Announce, identity(), 5);
    let bytes = PtpMessage::Other(header).encode();
    let decoded = PtpMessage::decode(&bytes).unwrap();
    assert_eq!(decoded.header().message_type, PtpMessageType::Announce);
    assert_eq!(decoded.header().sequence_id, 5);
}

// ===== Ethernet framing =====

#[test]
fn test_frame_round_trip() {
    let mac = [0x40, 0x84, 0x32, 0x7D, 0x07, 0xFA];
    let msg = PtpMessage::from(FollowUpMessage::new(identity(), 11, WireTimestamp::new(9, 9)));
    let frame = msg.encode_frame(mac);
    assert_eq!(frame.len(), ETHERNET_HEADER_LEN + FollowUpMessage::SIZE);
    assert_eq!(&frame[0..6], &PTP_MULTICAST_MAC);
    assert_eq!(&frame[6..12], &mac);
    assert_eq!(&frame[12..14], &[0x88, 0xF7]);
    let PtpMessage::FollowUp(decoded) = PtpMessage::decode_frame(&frame).unwrap() else {
        panic!("expected Follow_Up");
    };
    assert_eq!(decoded.header.sequence_id, 11);
    assert_eq!(decoded.header.message_length, 76);
    assert_eq!(decoded.precise_origin_timestamp, WireTimestamp::new(9, 9));
}

#[test]
fn test_frame_wrong_ethertype() {
    let mut frame = PtpMessage::from(SyncMessage::new(identity(), 1))
        .encode_frame([0; 6])
        .to_vec();
    frame[12] = 0x08;
    frame[13] = 0x00;
    assert_eq!(
        PtpMessage::decode_frame(&frame),
        Err(PtpParseError::NotPtpFrame(0x0800))
    );
    assert!(matches!(
        ptp_payload(&frame[..10]),
        Err(PtpParseError::TooShort { needed: 14, have: 10 })
    ));
}
