//! X.224 connection request / confirm codec carrying the RDP negotiation sub-packet.
//!
//! Layout of both PDUs:
//!
//! ```text
//! offset  0..4   TPKT header      03 00 <len u16 be>
//! offset  4      X.224 length indicator
//! offset  5      X.224 type       E0 = connection request, D0 = connection confirm
//! offset  6..11  dst ref, src ref, class
//! offset 11      negotiation type 01 = request, 02 = response, 03 = failure
//! offset 12      flags
//! offset 13..15  length u16 le (always 8)
//! offset 15..19  protocol bitmask u32 le
//! ```

use crate::error::DecodeError;
use crate::types::Protocol;

pub const PROTOCOL_RDP: u32 = 0x0000_0000;
pub const PROTOCOL_SSL: u32 = 0x0000_0001;
pub const PROTOCOL_HYBRID: u32 = 0x0000_0002;
pub const PROTOCOL_RDSTLS: u32 = 0x0000_0004;

/// Every protocol bit this codec knows how to request.
pub const KNOWN_PROTOCOLS: u32 = PROTOCOL_SSL | PROTOCOL_HYBRID | PROTOCOL_RDSTLS;

/// Offered by default: SSL and Hybrid, legacy RDP being implied.
pub const DEFAULT_REQUESTED: u32 = PROTOCOL_SSL | PROTOCOL_HYBRID;

pub const REQUEST_LEN: usize = 19;
pub const MIN_RESPONSE_LEN: usize = 19;

const TPKT_VERSION: u8 = 0x03;
const X224_CONNECTION_REQUEST: u8 = 0xE0;
const X224_CONNECTION_CONFIRM: u8 = 0xD0;
const TYPE_RDP_NEG_REQ: u8 = 0x01;
const TYPE_RDP_NEG_RSP: u8 = 0x02;
const NEG_LEN: u16 = 8;

// Length indicator of a bare X.224 CR/CC: type + dst ref + src ref + class.
const X224_FIXED_LI: u8 = 6;

const LI_OFFSET: usize = 4;
const TYPE_OFFSET: usize = 5;
const NEG_TYPE_OFFSET: usize = 11;
const PROTOCOLS_OFFSET: usize = 15;

/// Build the 19-byte connection request offering `requested` protocols.
pub fn encode_request(requested: u32) -> [u8; REQUEST_LEN] {
    let mut pkt = [0u8; REQUEST_LEN];
    pkt[0] = TPKT_VERSION;
    pkt[2..4].copy_from_slice(&(REQUEST_LEN as u16).to_be_bytes());
    pkt[LI_OFFSET] = (REQUEST_LEN - LI_OFFSET - 1) as u8;
    pkt[TYPE_OFFSET] = X224_CONNECTION_REQUEST;
    pkt[NEG_TYPE_OFFSET] = TYPE_RDP_NEG_REQ;
    pkt[13..15].copy_from_slice(&NEG_LEN.to_le_bytes());
    pkt[PROTOCOLS_OFFSET..REQUEST_LEN].copy_from_slice(&requested.to_le_bytes());
    pkt
}

/// Classify a connection confirm.
///
/// A valid confirm always yields a [`Protocol`]; `Unknown` means the outer headers were
/// fine but the negotiation sub-packet was not a response (e.g. a negotiation failure).
pub fn decode_response(buf: &[u8]) -> Result<Protocol, DecodeError> {
    if buf.len() < MIN_RESPONSE_LEN {
        return Err(DecodeError::TooShort { len: buf.len() });
    }
    if buf[0] != TPKT_VERSION || buf[1] != 0x00 {
        return Err(DecodeError::BadTpkt);
    }
    if buf[TYPE_OFFSET] != X224_CONNECTION_CONFIRM {
        return Err(DecodeError::NotConnectionConfirm(buf[TYPE_OFFSET]));
    }
    if buf[LI_OFFSET] <= X224_FIXED_LI {
        return Ok(Protocol::Rdp);
    }
    if buf[NEG_TYPE_OFFSET] != TYPE_RDP_NEG_RSP {
        return Ok(Protocol::Unknown);
    }
    Ok(read_u32_le(buf, PROTOCOLS_OFFSET)
        .map(classify)
        .unwrap_or(Protocol::Unknown))
}

/// Map a selected-protocol bitmask to a label. Hybrid wins over SSL, SSL over RDSTLS.
pub fn classify(selected: u32) -> Protocol {
    if selected & PROTOCOL_HYBRID != 0 {
        Protocol::Nla
    } else if selected & PROTOCOL_SSL != 0 {
        Protocol::Tls
    } else if selected & PROTOCOL_RDSTLS != 0 {
        Protocol::Rdstls
    } else {
        Protocol::Rdp
    }
}

fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
