//! Ping wire protocol
//!
//! Two formats share the command topics:
//!
//! ```text
//! binary: [kind:1][sequence_id:4][timestamp_ms:8][payload:32]   45 bytes, little-endian
//! legacy: "sv.ping"                                             7 bytes, ASCII
//! ```
//!
//! A body is treated as binary when its length is exactly 45 bytes. Only
//! bodies that are not binary are compared against the legacy token.

use core::fmt;
use core::fmt::Write;
use crate::topics::MAX_NODE_NAME_LEN;
use heapless::String;

/// Size of the opaque integrity/pattern block
pub const PAYLOAD_SIZE: usize = 32;

/// Encoded size of a [`PingPacket`]
pub const PING_PACKET_SIZE: usize = 1 + 4 + 8 + PAYLOAD_SIZE;

/// Legacy ping body
pub const LEGACY_PING_TOKEN: &[u8] = b"sv.ping";

const KIND_PING: u8 = 0x01;
const KIND_COMMAND: u8 = 0x02;

/// Packet kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// 0x01
    Ping,
    /// 0x02, reserved for remote commands
    Command,
    /// Any other value
    Unknown(u8),
}

impl From<u8> for PacketKind {
    fn from(byte: u8) -> Self {
        match byte {
            KIND_PING => PacketKind::Ping,
            KIND_COMMAND => PacketKind::Command,
            other => PacketKind::Unknown(other),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> Self {
        match kind {
            PacketKind::Ping => KIND_PING,
            PacketKind::Command => KIND_COMMAND,
            PacketKind::Unknown(other) => other,
        }
    }
}

/// Fixed-layout binary ping packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPacket {
    pub kind: PacketKind,
    pub sequence_id: u32,
    pub timestamp_ms: u64,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl PingPacket {
    /// Build a PING packet
    pub fn ping(sequence_id: u32, timestamp_ms: u64, payload: [u8; PAYLOAD_SIZE]) -> Self {
        Self {
            kind: PacketKind::Ping,
            sequence_id,
            timestamp_ms,
            payload,
        }
    }

    /// Serialize into the 45-byte wire layout
    pub fn encode(&self) -> [u8; PING_PACKET_SIZE] {
        let mut buf = [0u8; PING_PACKET_SIZE];
        buf[0] = self.kind.into();
        buf[1..5].copy_from_slice(&self.sequence_id.to_le_bytes());
        buf[5..13].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[13..].copy_from_slice(&self.payload);
        buf
    }
}

/// The buffer is not a binary packet (its length is not [`PING_PACKET_SIZE`])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotThisFormat {
    pub len: usize,
}

impl fmt::Display for NotThisFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes is not a {}-byte ping packet",
            self.len, PING_PACKET_SIZE
        )
    }
}

/// Encode a PING packet
pub fn encode_ping(
    sequence_id: u32,
    timestamp_ms: u64,
    payload: &[u8; PAYLOAD_SIZE],
) -> [u8; PING_PACKET_SIZE] {
    PingPacket::ping(sequence_id, timestamp_ms, *payload).encode()
}

/// Decode a binary packet. Length equality is the only check; every field is
/// read positionally.
pub fn try_decode_ping(bytes: &[u8]) -> Result<PingPacket, NotThisFormat> {
    let buf: &[u8; PING_PACKET_SIZE] = bytes
        .try_into()
        .map_err(|_| NotThisFormat { len: bytes.len() })?;

    let mut sequence_id = [0u8; 4];
    sequence_id.copy_from_slice(&buf[1..5]);
    let mut timestamp_ms = [0u8; 8];
    timestamp_ms.copy_from_slice(&buf[5..13]);
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload.copy_from_slice(&buf[13..]);

    Ok(PingPacket {
        kind: PacketKind::from(buf[0]),
        sequence_id: u32::from_le_bytes(sequence_id),
        timestamp_ms: u64::from_le_bytes(timestamp_ms),
        payload,
    })
}

/// Check if body is exactly the legacy ping token
pub fn is_legacy_ping(bytes: &[u8]) -> bool {
    bytes == LEGACY_PING_TOKEN
}

/// Capacity of the legacy text reply
const LEGACY_REPLY_SUFFIX: &str = ": received ping packet.";

/// Room for the longest accepted node name plus the fixed suffix
pub const LEGACY_REPLY_CAPACITY: usize = MAX_NODE_NAME_LEN + LEGACY_REPLY_SUFFIX.len();

/// Text reply to a legacy ping: `"<NAME>: received ping packet."`
pub fn legacy_ping_reply(node_name: &str) -> String<LEGACY_REPLY_CAPACITY> {
    let mut reply = String::new();
    let written = write!(reply, "{}{}", node_name, LEGACY_REPLY_SUFFIX);
    debug_assert!(written.is_ok(), "node name longer than {}", MAX_NODE_NAME_LEN);
    reply
}

/// Inbound message body after format detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// 45-byte binary packet, any kind
    Binary(PingPacket),
    /// Legacy text ping
    LegacyPing,
    /// Anything else
    Unrecognized,
}

/// Classify a message body. Binary is tried first; the legacy token is only
/// checked when the body is not a binary packet.
pub fn classify(bytes: &[u8]) -> Inbound {
    match try_decode_ping(bytes) {
        Ok(packet) => Inbound::Binary(packet),
        Err(_) if is_legacy_ping(bytes) => Inbound::LegacyPing,
        Err(_) => Inbound::Unrecognized,
    }
}
