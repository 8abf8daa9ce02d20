//! PTP message types, parsing, and encoding.
//!
//! Implements the IEEE 1588 header plus the two message bodies this profile
//! exchanges: Sync and `Follow_Up` (with the 802.1AS follow-up information
//! TLV). Frames travel directly over Ethernet with EtherType `0x88F7`.
//! All multi-byte wire fields are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::timestamp::{WireTimestamp, correction_to_nanos};

/// 802.1AS peer-delay multicast destination used for all PTP frames.
pub const PTP_MULTICAST_MAC: [u8; 6] = [0x01, 0x80, 0xC2, 0x00, 0x00, 0x0E];

/// EtherType for PTP over IEEE 802.3.
pub const PTP_ETHERTYPE: u16 = 0x88F7;

/// Ethernet II header length (destination, source, EtherType).
pub const ETHERNET_HEADER_LEN: usize = 14;

/// PTP message type identifiers (IEEE 1588 Section 13.3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PtpMessageType {
    /// Sync message (master → follower); its egress time is t1.
    Sync = 0x00,
    /// Delay request.
    DelayReq = 0x01,
    /// Peer delay request.
    PdelayReq = 0x02,
    /// Peer delay response.
    PdelayResp = 0x03,
    /// Follow-up (master → follower), carries precise t1.
    FollowUp = 0x08,
    /// Delay response.
    DelayResp = 0x09,
    /// Peer delay response follow-up.
    PdelayRespFollowUp = 0x0A,
    /// Announce.
    Announce = 0x0B,
}

impl PtpMessageType {
    /// Parse from the lower 4 bits of a byte.
    pub fn from_nibble(value: u8) -> Result<Self, PtpParseError> {
        match value & 0x0F {
            0x00 => Ok(Self::Sync),
            0x01 => Ok(Self::DelayReq),
            0x02 => Ok(Self::PdelayReq),
            0x03 => Ok(Self::PdelayResp),
            0x08 => Ok(Self::FollowUp),
            0x09 => Ok(Self::DelayResp),
            0x0A => Ok(Self::PdelayRespFollowUp),
            0x0B => Ok(Self::Announce),
            other => Err(PtpParseError::UnknownMessageType(other)),
        }
    }

    /// Whether this message type is an event message (requires timestamping).
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::Sync | Self::DelayReq | Self::PdelayReq | Self::PdelayResp
        )
    }
}

impl std::fmt::Display for PtpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sync => "Sync",
            Self::DelayReq => "Delay_Req",
            Self::PdelayReq => "Pdelay_Req",
            Self::PdelayResp => "Pdelay_Resp",
            Self::FollowUp => "Follow_Up",
            Self::DelayResp => "Delay_Resp",
            Self::PdelayRespFollowUp => "Pdelay_Resp_Follow_Up",
            Self::Announce => "Announce",
        };
        f.write_str(name)
    }
}

/// PTP port identity: 8-byte clock ID + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PtpPortIdentity {
    /// 8-byte clock identity (EUI-64, typically derived from the MAC address).
    pub clock_identity: [u8; 8],
    /// Port number (1-based).
    pub port_number: u16,
}

impl PtpPortIdentity {
    /// Encoded size in bytes.
    pub const SIZE: usize = 10;

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: [u8; 8], port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Derive an EUI-64 clock identity from a MAC address (`ff:fe` inserted in the middle).
    #[must_use]
    pub fn from_mac(mac: [u8; 6], port_number: u16) -> Self {
        Self {
            clock_identity: [mac[0], mac[1], mac[2], 0xFF, 0xFE, mac[3], mac[4], mac[5]],
            port_number,
        }
    }

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.clock_identity);
        buf.put_u16(self.port_number);
    }

    fn take(buf: &mut impl Buf) -> Self {
        let mut clock_identity = [0u8; 8];
        buf.copy_to_slice(&mut clock_identity);
        Self {
            clock_identity,
            port_number: buf.get_u16(),
        }
    }
}

/// Full IEEE 1588 PTP message header (34 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpHeader {
    /// Transport-specific nibble (upper 4 bits of byte 0).
    pub transport_specific: u8,
    /// Message type (lower 4 bits of byte 0).
    pub message_type: PtpMessageType,
    /// PTP version (lower 4 bits of byte 1).
    pub version: u8,
    /// Total message length including header.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Flag bytes, in wire order.
    pub flags: [u8; 2],
    /// Correction field (nanoseconds * 2^16, signed).
    pub correction_field: i64,
    /// Source port identity.
    pub source_port_identity: PtpPortIdentity,
    /// Sequence ID.
    pub sequence_id: u16,
    /// Control field (deprecated in v2, still transmitted).
    pub control_field: u8,
    /// Log2 of the message interval in seconds.
    pub log_message_interval: i8,
}

impl PtpHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 34;

    /// Default PTP version.
    pub const PTP_VERSION_2: u8 = 2;

    /// Transport-specific nibble for 802.1AS (gPTP).
    pub const TRANSPORT_SPECIFIC_8021AS: u8 = 1;

    /// First flag byte: two-step clock.
    pub const FLAG0_TWO_STEP: u8 = 0x02;

    /// Second flag byte: PTP timescale.
    pub const FLAG1_PTP_TIMESCALE: u8 = 0x08;

    /// Log message interval for 125 ms Sync cadence.
    pub const LOG_INTERVAL_125MS: i8 = -3;

    /// Create a header with the values this profile transmits.
    #[must_use]
    pub fn new(message_type: PtpMessageType, source: PtpPortIdentity, sequence_id: u16) -> Self {
        let (flags, control_field) = match message_type {
            PtpMessageType::Sync => ([Self::FLAG0_TWO_STEP, Self::FLAG1_PTP_TIMESCALE], 0x02),
            PtpMessageType::FollowUp => ([0x00, Self::FLAG1_PTP_TIMESCALE], 0x02),
            PtpMessageType::DelayReq => ([0x00, 0x00], 0x01),
            PtpMessageType::DelayResp => ([0x00, 0x00], 0x03),
            _ => ([0x00, 0x00], 0x05),
        };
        Self {
            transport_specific: Self::TRANSPORT_SPECIFIC_8021AS,
            message_type,
            version: Self::PTP_VERSION_2,
            message_length: 0, // filled in on encode
            domain_number: 0,
            flags,
            correction_field: 0,
            source_port_identity: source,
            sequence_id,
            control_field,
            log_message_interval: Self::LOG_INTERVAL_125MS,
        }
    }

    /// Correction field converted to whole nanoseconds.
    #[must_use]
    pub fn correction_nanos(&self) -> i64 {
        correction_to_nanos(self.correction_field)
    }

    /// Whether the two-step flag is set.
    #[must_use]
    pub fn is_two_step(&self) -> bool {
        self.flags[0] & Self::FLAG0_TWO_STEP != 0
    }

    /// Append the header for a message of `body_length` bytes.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "PTP messages are far below 64 KiB"
    )]
    pub fn encode_into(&self, body_length: usize, buf: &mut impl BufMut) {
        buf.put_u8((self.transport_specific << 4) | (self.message_type as u8 & 0x0F));
        buf.put_u8(self.version & 0x0F);
        buf.put_u16((Self::SIZE + body_length) as u16);
        buf.put_u8(self.domain_number);
        buf.put_u8(0);
        buf.put_slice(&self.flags);
        buf.put_i64(self.correction_field);
        buf.put_u32(0);
        self.source_port_identity.put(buf);
        buf.put_u16(self.sequence_id);
        buf.put_u8(self.control_field);
        buf.put_i8(self.log_message_interval);
    }

    /// Decode from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        if data.len() < Self::SIZE {
            return Err(PtpParseError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        let mut buf = &data[..Self::SIZE];
        let tsmt = buf.get_u8();
        let message_type = PtpMessageType::from_nibble(tsmt)?;
        let version = buf.get_u8() & 0x0F;
        let message_length = buf.get_u16();
        let domain_number = buf.get_u8();
        buf.advance(1);
        let flags = [buf.get_u8(), buf.get_u8()];
        let correction_field = buf.get_i64();
        buf.advance(4);
        let source_port_identity = PtpPortIdentity::take(&mut buf);
        Ok(Self {
            transport_specific: tsmt >> 4,
            message_type,
            version,
            message_length,
            domain_number,
            flags,
            correction_field,
            source_port_identity,
            sequence_id: buf.get_u16(),
            control_field: buf.get_u8(),
            log_message_interval: buf.get_i8(),
        })
    }
}

/// 802.1AS follow-up information TLV appended to every `Follow_Up`.
///
/// This profile does not populate the rate and phase change fields; they are
/// transmitted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpTlv {
    /// TLV type (3 = organization extension).
    pub tlv_type: u16,
    /// Length of the value part in bytes.
    pub length_field: u16,
    /// IEEE 802.1 organization identifier.
    pub organization_id: [u8; 3],
    /// Organization sub-type.
    pub organization_sub_type: [u8; 3],
    /// Cumulative scaled rate offset.
    pub cumulative_scaled_rate_offset: u32,
    /// Grandmaster time base indicator.
    pub gm_time_base_indicator: u16,
    /// Last grandmaster phase change (scaled nanoseconds, 96 bits).
    pub last_gm_phase_change: [u8; 12],
    /// Scaled last grandmaster frequency change.
    pub scaled_last_gm_freq_change: u32,
}

impl FollowUpTlv {
    /// Encoded size in bytes (type + length + value).
    pub const SIZE: usize = 32;

    /// Organization extension TLV type.
    pub const TYPE_ORGANIZATION_EXTENSION: u16 = 0x0003;

    /// IEEE 802.1 OUI.
    pub const IEEE_802_1_OUI: [u8; 3] = [0x00, 0x80, 0xC2];

    fn put(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.tlv_type);
        buf.put_u16(self.length_field);
        buf.put_slice(&self.organization_id);
        buf.put_slice(&self.organization_sub_type);
        buf.put_u32(self.cumulative_scaled_rate_offset);
        buf.put_u16(self.gm_time_base_indicator);
        buf.put_slice(&self.last_gm_phase_change);
        buf.put_u32(self.scaled_last_gm_freq_change);
    }

    fn take(buf: &mut impl Buf) -> Self {
        let tlv_type = buf.get_u16();
        let length_field = buf.get_u16();
        let mut organization_id = [0u8; 3];
        buf.copy_to_slice(&mut organization_id);
        let mut organization_sub_type = [0u8; 3];
        buf.copy_to_slice(&mut organization_sub_type);
        let cumulative_scaled_rate_offset = buf.get_u32();
        let gm_time_base_indicator = buf.get_u16();
        let mut last_gm_phase_change = [0u8; 12];
        buf.copy_to_slice(&mut last_gm_phase_change);
        Self {
            tlv_type,
            length_field,
            organization_id,
            organization_sub_type,
            cumulative_scaled_rate_offset,
            gm_time_base_indicator,
            last_gm_phase_change,
            scaled_last_gm_freq_change: buf.get_u32(),
        }
    }
}

impl Default for FollowUpTlv {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "TLV value length is a small constant"
    )]
    fn default() -> Self {
        Self {
            tlv_type: Self::TYPE_ORGANIZATION_EXTENSION,
            length_field: (Self::SIZE - 4) as u16,
            organization_id: Self::IEEE_802_1_OUI,
            organization_sub_type: [0x00, 0x00, 0x01],
            cumulative_scaled_rate_offset: 0,
            gm_time_base_indicator: 0,
            last_gm_phase_change: [0; 12],
            scaled_last_gm_freq_change: 0,
        }
    }
}

/// Sync message: header + origin timestamp.
///
/// In two-step operation the origin timestamp is left at zero; the precise
/// egress time follows in the matching `Follow_Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMessage {
    /// Message header.
    pub header: PtpHeader,
    /// Origin timestamp.
    pub origin_timestamp: WireTimestamp,
}

impl SyncMessage {
    /// Encoded size (44 bytes).
    pub const SIZE: usize = PtpHeader::SIZE + WireTimestamp::WIRE_SIZE;

    /// Two-step Sync with a zero origin timestamp.
    #[must_use]
    pub fn new(source: PtpPortIdentity, sequence_id: u16) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::Sync, source, sequence_id),
            origin_timestamp: WireTimestamp::ZERO,
        }
    }
}

/// `Follow_Up` message: header + precise origin timestamp + TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpMessage {
    /// Message header.
    pub header: PtpHeader,
    /// Precise egress time of the Sync with the same sequence ID.
    pub precise_origin_timestamp: WireTimestamp,
    /// Follow-up information TLV.
    pub tlv: FollowUpTlv,
}

impl FollowUpMessage {
    /// Encoded size (76 bytes).
    pub const SIZE: usize = PtpHeader::SIZE + WireTimestamp::WIRE_SIZE + FollowUpTlv::SIZE;

    /// `Follow_Up` reporting `precise_origin_timestamp` for Sync `sequence_id`.
    #[must_use]
    pub fn new(
        source: PtpPortIdentity,
        sequence_id: u16,
        precise_origin_timestamp: WireTimestamp,
    ) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::FollowUp, source, sequence_id),
            precise_origin_timestamp,
            tlv: FollowUpTlv::default(),
        }
    }

    /// Precise origin timestamp with the header correction applied.
    #[must_use]
    pub fn corrected_origin(&self) -> WireTimestamp {
        self.precise_origin_timestamp
            .offset_by(self.header.correction_nanos())
    }
}

/// A decoded PTP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtpMessage {
    /// Sync.
    Sync(SyncMessage),
    /// `Follow_Up`.
    FollowUp(FollowUpMessage),
    /// Any other message type; only the header is decoded.
    Other(PtpHeader),
}

impl PtpMessage {
    /// The message header.
    #[must_use]
    pub fn header(&self) -> &PtpHeader {
        match self {
            Self::Sync(msg) => &msg.header,
            Self::FollowUp(msg) => &msg.header,
            Self::Other(header) => header,
        }
    }

    /// Parse a PTP message (starting at the PTP header).
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        let header = PtpHeader::decode(data)?;
        let mut body = &data[PtpHeader::SIZE..];

        match header.message_type {
            PtpMessageType::Sync => {
                let origin_timestamp = take_timestamp(&mut body, SyncMessage::SIZE, data.len())?;
                Ok(Self::Sync(SyncMessage {
                    header,
                    origin_timestamp,
                }))
            }
            PtpMessageType::FollowUp => {
                let precise_origin_timestamp =
                    take_timestamp(&mut body, FollowUpMessage::SIZE, data.len())?;
                // Some masters omit the TLV; fall back to the profile default.
                let tlv = if body.remaining() >= FollowUpTlv::SIZE {
                    FollowUpTlv::take(&mut body)
                } else {
                    FollowUpTlv::default()
                };
                Ok(Self::FollowUp(FollowUpMessage {
                    header,
                    precise_origin_timestamp,
                    tlv,
                }))
            }
            _ => Ok(Self::Other(header)),
        }
    }

    /// Encode starting at the PTP header.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FollowUpMessage::SIZE);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode as a complete Ethernet frame from `source_mac` to the PTP multicast address.
    #[must_use]
    pub fn encode_frame(&self, source_mac: [u8; 6]) -> Bytes {
        let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + FollowUpMessage::SIZE);
        buf.put_slice(&PTP_MULTICAST_MAC);
        buf.put_slice(&source_mac);
        buf.put_u16(PTP_ETHERTYPE);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Parse a complete Ethernet frame carrying a PTP message.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, PtpParseError> {
        Self::decode(ptp_payload(frame)?)
    }

    /// The Sync body, or an error naming the type that was decoded instead.
    pub fn into_sync(self) -> Result<SyncMessage, PtpParseError> {
        match self {
            Self::Sync(msg) => Ok(msg),
            other => Err(PtpParseError::UnexpectedMessageType {
                expected: PtpMessageType::Sync,
                found: other.header().message_type,
            }),
        }
    }

    /// The `Follow_Up` body, or an error naming the type that was decoded instead.
    pub fn into_follow_up(self) -> Result<FollowUpMessage, PtpParseError> {
        match self {
            Self::FollowUp(msg) => Ok(msg),
            other => Err(PtpParseError::UnexpectedMessageType {
                expected: PtpMessageType::FollowUp,
                found: other.header().message_type,
            }),
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Self::Sync(msg) => {
                msg.header.encode_into(WireTimestamp::WIRE_SIZE, &mut *buf);
                buf.put_slice(&msg.origin_timestamp.encode());
            }
            Self::FollowUp(msg) => {
                msg.header
                    .encode_into(WireTimestamp::WIRE_SIZE + FollowUpTlv::SIZE, &mut *buf);
                buf.put_slice(&msg.precise_origin_timestamp.encode());
                msg.tlv.put(&mut *buf);
            }
            Self::Other(header) => header.encode_into(0, &mut *buf),
        }
    }
}

impl From<SyncMessage> for PtpMessage {
    fn from(msg: SyncMessage) -> Self {
        Self::Sync(msg)
    }
}

impl From<FollowUpMessage> for PtpMessage {
    fn from(msg: FollowUpMessage) -> Self {
        Self::FollowUp(msg)
    }
}

/// Strip the Ethernet II header, checking the EtherType.
pub fn ptp_payload(frame: &[u8]) -> Result<&[u8], PtpParseError> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return Err(PtpParseError::TooShort {
            needed: ETHERNET_HEADER_LEN,
            have: frame.len(),
        });
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != PTP_ETHERTYPE {
        return Err(PtpParseError::NotPtpFrame(ethertype));
    }
    Ok(&frame[ETHERNET_HEADER_LEN..])
}

fn take_timestamp(
    body: &mut &[u8],
    needed: usize,
    have: usize,
) -> Result<WireTimestamp, PtpParseError> {
    let ts = WireTimestamp::decode(*body).ok_or(PtpParseError::TooShort { needed, have })?;
    if ts.nanoseconds >= WireTimestamp::NANOS_PER_SEC {
        return Err(PtpParseError::InvalidNanoseconds(ts.nanoseconds));
    }
    body.advance(WireTimestamp::WIRE_SIZE);
    Ok(ts)
}

/// Errors from PTP message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PtpParseError {
    /// Packet too short.
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// Unknown message type.
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),
    /// A different message type than the caller asked for.
    #[error("expected {expected:?} message, found {found:?}")]
    UnexpectedMessageType {
        /// Type the caller asked for.
        expected: PtpMessageType,
        /// Type that was decoded.
        found: PtpMessageType,
    },
    /// Ethernet frame does not carry PTP.
    #[error("not a PTP frame: EtherType 0x{0:04X}")]
    NotPtpFrame(u16),
    /// Timestamp nanoseconds out of range.
    #[error("timestamp nanoseconds out of range: {0}")]
    InvalidNanoseconds(u32),
}
