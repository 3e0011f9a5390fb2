//! MQTT 3.1.1 packet encoding and decoding.
//!
//! Only the packets the session loop exchanges are supported:
//!
//! | Direction | Packets                                             |
//! |-----------|-----------------------------------------------------|
//! | out       | CONNECT, SUBSCRIBE, PUBLISH (QoS 0), PUBACK, PINGREQ, DISCONNECT |
//! | in        | CONNACK, SUBACK, PUBLISH (QoS 0/1), PUBACK, PINGRESP |
//!
//! Encoders write into a fixed-capacity buffer and fail with
//! [`ProtocolError::Overflow`] instead of growing it.

use heapless::Vec;

use crate::app::ports::ConnectOptions;
use crate::error::ProtocolError;

// MQTT control packet types (fixed header, first byte)
pub const CONNECT: u8 = 0x10;
pub const CONNACK: u8 = 0x20;
pub const PUBLISH: u8 = 0x30;
pub const PUBACK: u8 = 0x40;
pub const SUBSCRIBE: u8 = 0x82;
pub const SUBACK: u8 = 0x90;
pub const PINGREQ: u8 = 0xC0;
pub const PINGRESP: u8 = 0xD0;
pub const DISCONNECT: u8 = 0xE0;

const PROTOCOL_NAME: &[u8] = b"MQTT";
/// Protocol level 4 = MQTT 3.1.1
const PROTOCOL_LEVEL: u8 = 4;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// SUBACK return code for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Send and receive buffer capacity per connection.
pub const BUFFER_SIZE: usize = 512;

pub type PacketBuf = Vec<u8, BUFFER_SIZE>;

/// A decoded inbound packet, borrowing from the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    ConnAck { session_present: bool, return_code: u8 },
    SubAck { packet_id: u16, return_code: u8 },
    Publish { topic: &'a str, payload: &'a [u8], qos: u8, packet_id: Option<u16> },
    PubAck { packet_id: u16 },
    PingResp,
    /// Valid frame of a type this client never acts on.
    Other(u8),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn put(buf: &mut PacketBuf, bytes: &[u8]) -> Result<(), ProtocolError> {
    buf.extend_from_slice(bytes).map_err(|_| ProtocolError::Overflow)
}

fn put_byte(buf: &mut PacketBuf, byte: u8) -> Result<(), ProtocolError> {
    buf.push(byte).map_err(|_| ProtocolError::Overflow)
}

fn put_str(buf: &mut PacketBuf, s: &[u8]) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::Overflow)?;
    put(buf, &len.to_be_bytes())?;
    put(buf, s)
}

/// Variable-length "remaining length" field (1–4 bytes, 7 bits each).
fn put_remaining_length(buf: &mut PacketBuf, mut len: usize) -> Result<(), ProtocolError> {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        put_byte(buf, byte)?;
        if len == 0 {
            return Ok(());
        }
    }
}

fn begin(buf: &mut PacketBuf, header: u8, remaining: usize) -> Result<(), ProtocolError> {
    buf.clear();
    put_byte(buf, header)?;
    put_remaining_length(buf, remaining)
}

pub fn encode_connect(buf: &mut PacketBuf, options: &ConnectOptions<'_>) -> Result<(), ProtocolError> {
    let mut flags = 0;
    if options.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + options.client_id.len();
    if let Some(user) = options.username {
        flags |= FLAG_USERNAME;
        remaining += 2 + user.len();
    }
    if let Some(pass) = options.password {
        flags |= FLAG_PASSWORD;
        remaining += 2 + pass.len();
    }

    begin(buf, CONNECT, remaining)?;
    // --- Variable header ---
    put_str(buf, PROTOCOL_NAME)?;
    put_byte(buf, PROTOCOL_LEVEL)?;
    put_byte(buf, flags)?;
    put(buf, &options.keep_alive_secs.to_be_bytes())?;
    // --- Payload ---
    put_str(buf, options.client_id.as_bytes())?;
    if let Some(user) = options.username {
        put_str(buf, user.as_bytes())?;
    }
    if let Some(pass) = options.password {
        put_str(buf, pass.as_bytes())?;
    }
    Ok(())
}

/// SUBSCRIBE for a single filter at QoS 0.
pub fn encode_subscribe(buf: &mut PacketBuf, packet_id: u16, filter: &str) -> Result<(), ProtocolError> {
    begin(buf, SUBSCRIBE, 2 + 2 + filter.len() + 1)?;
    put(buf, &packet_id.to_be_bytes())?;
    put_str(buf, filter.as_bytes())?;
    put_byte(buf, 0)
}

/// PUBLISH at QoS 0, retain off.
pub fn encode_publish(buf: &mut PacketBuf, topic: &str, payload: &[u8]) -> Result<(), ProtocolError> {
    begin(buf, PUBLISH, 2 + topic.len() + payload.len())?;
    put_str(buf, topic.as_bytes())?;
    put(buf, payload)
}

pub fn encode_puback(buf: &mut PacketBuf, packet_id: u16) -> Result<(), ProtocolError> {
    begin(buf, PUBACK, 2)?;
    put(buf, &packet_id.to_be_bytes())
}

pub fn encode_pingreq(buf: &mut PacketBuf) -> Result<(), ProtocolError> {
    begin(buf, PINGREQ, 0)
}

pub fn encode_disconnect(buf: &mut PacketBuf) -> Result<(), ProtocolError> {
    begin(buf, DISCONNECT, 0)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Fixed header of the frame at the start of `buf` as
/// `(header_len, remaining_len)`, or `None` while it is still incomplete.
fn fixed_header(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut remaining = 0usize;
    let mut multiplier = 1usize;
    for i in 0..4 {
        let Some(&byte) = buf.get(1 + i) else {
            return Ok(None);
        };
        remaining += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((2 + i, remaining)));
        }
        multiplier *= 128;
    }
    Err(ProtocolError::Malformed)
}

/// Total length of the frame at the start of `buf` (fixed header included),
/// or `None` while the fixed header itself is still incomplete.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, ProtocolError> {
    Ok(fixed_header(buf)?.map(|(header, remaining)| header + remaining))
}

fn be_u16(bytes: &[u8], at: usize) -> Result<u16, ProtocolError> {
    match bytes.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(ProtocolError::Malformed),
    }
}

/// Decode one complete frame (exactly as long as [`frame_len`] reported).
pub fn decode_frame(frame: &[u8]) -> Result<Packet<'_>, ProtocolError> {
    let (header_len, remaining) = fixed_header(frame)?.ok_or(ProtocolError::Malformed)?;
    if frame.len() != header_len + remaining {
        return Err(ProtocolError::Malformed);
    }
    let header = frame[0];
    let body = &frame[header_len..];

    match header & 0xF0 {
        CONNACK => {
            if body.len() != 2 {
                return Err(ProtocolError::Malformed);
            }
            Ok(Packet::ConnAck {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            })
        }
        SUBACK if body.len() >= 3 => Ok(Packet::SubAck {
            packet_id: be_u16(body, 0)?,
            return_code: body[2],
        }),
        SUBACK => Err(ProtocolError::Malformed),
        PUBLISH => {
            let qos = (header >> 1) & 0x03;
            if qos == 3 {
                return Err(ProtocolError::Malformed);
            }
            let topic_len = usize::from(be_u16(body, 0)?);
            let topic_bytes = body.get(2..2 + topic_len).ok_or(ProtocolError::Malformed)?;
            let topic = core::str::from_utf8(topic_bytes).map_err(|_| ProtocolError::Malformed)?;
            let mut offset = 2 + topic_len;
            let packet_id = if qos > 0 {
                let id = be_u16(body, offset)?;
                offset += 2;
                Some(id)
            } else {
                None
            };
            let payload = body.get(offset..).ok_or(ProtocolError::Malformed)?;
            Ok(Packet::Publish { topic, payload, qos, packet_id })
        }
        PUBACK => Ok(Packet::PubAck {
            packet_id: be_u16(body, 0)?,
        }),
        PINGRESP => Ok(Packet::PingResp),
        other => Ok(Packet::Other(other)),
    }
}
