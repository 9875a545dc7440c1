//! Frame codec
//!
//! ```text
//! u16 total_length   (header included, >= 4, <= max_frame_size)
//! u16 packet_id
//! [payload]          (total_length - 4 bytes)
//! ```
//!
//! Both values little-endian. `decode` consumes at most one frame from the
//! front of the accumulator and leaves the rest for the next call.

use bytes::{BufMut, Bytes, BytesMut};

use super::wire::{PacketReader, WireError};

pub const HEADER_LEN: usize = 4;

/// Largest frame accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024;

/// A closed catalog of framed packets.
pub trait Packet: Sized {
    fn id(&self) -> u16;
    fn name(&self) -> &'static str;
    fn read_payload(id: u16, r: &mut PacketReader<'_>) -> Result<Self, WireError>;
    fn write_payload(&self, out: &mut BytesMut);
}

/// Error types for framing. Every variant is fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame length {len} shorter than header")]
    FrameTooShort { len: usize },

    #[error("Frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Malformed payload for packet id={id}: {source}")]
    Malformed {
        id: u16,
        #[source]
        source: WireError,
    },

    #[error("Packet id={id} left {extra} unread payload bytes")]
    TrailingBytes { id: u16, extra: usize },
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Ok(None)` until a whole frame is buffered. The declared length
/// is validated as soon as the header arrives, so `buf` never has to hold
/// more than one oversized frame's worth of bytes before the error surfaces.
pub fn decode<P: Packet>(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<P>, CodecError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if len < HEADER_LEN {
        return Err(CodecError::FrameTooShort { len });
    }
    if len > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }
    if buf.len() < len {
        return Ok(None);
    }

    let frame = buf.split_to(len).freeze();
    let id = u16::from_le_bytes([frame[2], frame[3]]);
    let mut reader = PacketReader::new(&frame[HEADER_LEN..]);
    let packet = P::read_payload(id, &mut reader).map_err(|source| CodecError::Malformed { id, source })?;

    let extra = reader.remaining();
    if extra > 0 {
        return Err(CodecError::TrailingBytes { id, extra });
    }

    Ok(Some(packet))
}

/// Appends one frame to `out`.
///
/// A payload that does not fit the 16-bit length is rejected and `out` is
/// left as it was.
pub fn encode<P: Packet>(packet: &P, out: &mut BytesMut) -> Result<(), CodecError> {
    let start = out.len();
    out.put_u16_le(0);
    out.put_u16_le(packet.id());
    packet.write_payload(out);

    let len = out.len() - start;
    if len > u16::MAX as usize {
        out.truncate(start);
        return Err(CodecError::FrameTooLarge {
            len,
            max: u16::MAX as usize,
        });
    }
    out[start..start + 2].copy_from_slice(&(len as u16).to_le_bytes());
    Ok(())
}

/// Encodes a single packet into its own buffer.
pub fn encode_to_bytes<P: Packet>(packet: &P) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::new();
    encode(packet, &mut out)?;
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::client::{self, ClientPacket};
    use crate::protocol::server::{self, ServerPacket};
    use crate::protocol::types::{ChatItem, Direction, GridType, Point, Spell};

    fn frames() -> BytesMut {
        let mut out = BytesMut::new();
        let packets: Vec<ClientPacket> = vec![
            client::ClientVersion {
                version_hash: vec![0xAB; 16],
            }
            .into(),
            client::Login {
                account_id: "hero".into(),
                password: "secret".into(),
            }
            .into(),
            client::Walk {
                direction: Direction::Right,
            }
            .into(),
            client::Chat {
                message: "hello there".into(),
                linked_items: vec![ChatItem {
                    unique_id: 99,
                    title: "Sword".into(),
                    grid: GridType::Inventory,
                }],
            }
            .into(),
            client::Magic {
                spell: Spell(31),
                direction: Direction::Down,
                target_id: 77,
                location: Point::new(4, 5),
                spell_target_lock: true,
            }
            .into(),
        ];
        for p in &packets {
            encode(p, &mut out).unwrap();
        }
        out
    }

    fn decode_all(buf: &mut BytesMut) -> Vec<ClientPacket> {
        let mut packets = Vec::new();
        while let Some(p) = decode::<ClientPacket>(buf, DEFAULT_MAX_FRAME_SIZE).unwrap() {
            packets.push(p);
        }
        packets
    }

    #[test]
    fn test_frame_header_layout() {
        let bytes = encode_to_bytes(&ClientPacket::from(client::KeepAlive { time: 5 })).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &[12, 0, client::KeepAlive::ID as u8, 0]);
        assert_eq!(&bytes[4..], &5i64.to_le_bytes());
    }

    #[test]
    fn test_decode_multiple_frames_in_one_buffer() {
        let mut buf = frames();
        let packets = decode_all(&mut buf);
        assert_eq!(packets.len(), 5);
        assert!(buf.is_empty());
        assert!(matches!(packets[3], ClientPacket::Chat(ref c) if c.message == "hello there"));
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let whole = frames();
        let expected = decode_all(&mut whole.clone());

        for chunk in [1usize, 2, 3, 5, 7, 64] {
            let mut acc = BytesMut::new();
            let mut got = Vec::new();
            for piece in whole.chunks(chunk) {
                acc.extend_from_slice(piece);
                got.extend(decode_all(&mut acc));
            }
            assert_eq!(got, expected, "chunk size {}", chunk);
            assert!(acc.is_empty());
        }
    }

    #[test]
    fn test_partial_header_waits() {
        let mut buf = BytesMut::from(&[8u8][..]);
        assert!(decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_short_frame_rejected() {
        let mut buf = BytesMut::from(&[3u8, 0, 1, 0][..]);
        assert!(matches!(
            decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(CodecError::FrameTooShort { len: 3 })
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_before_body_arrives() {
        let mut buf = BytesMut::from(&[0x00u8, 0x10][..]);
        assert!(matches!(
            decode::<ClientPacket>(&mut buf, 1024),
            Err(CodecError::FrameTooLarge { len: 4096, max: 1024 })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        // KeepAlive carries exactly 8 bytes; send 9.
        let mut buf = BytesMut::new();
        buf.put_u16_le(13);
        buf.put_u16_le(client::KeepAlive::ID);
        buf.put_i64_le(1);
        buf.put_u8(0xFF);
        assert!(matches!(
            decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(CodecError::TrailingBytes { id: 2, extra: 1 })
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(6);
        buf.put_u16_le(client::Walk::ID);
        buf.put_u8(1);
        buf.put_u8(2);
        // Walk with two payload bytes: the direction reads, then one is left over.
        assert!(decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE).is_err());

        let mut buf = BytesMut::new();
        buf.put_u16_le(4);
        buf.put_u16_le(client::Login::ID);
        assert!(matches!(
            decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE),
            Err(CodecError::Malformed { id: 5, .. })
        ));
    }

    #[test]
    fn test_unknown_id_is_not_fatal() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(6);
        buf.put_u16_le(900);
        buf.put_u16_le(0xBEEF);
        let packet = decode::<ClientPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(packet.id(), 900);
        assert_eq!(packet.name(), "Unknown");
    }

    #[test]
    fn test_server_packet_encodes() {
        let packet = ServerPacket::from(server::UserLocation {
            location: Point::new(1, 2),
            direction: Direction::Up,
        });
        let mut buf = BytesMut::new();
        encode(&packet, &mut buf).unwrap();
        let back = decode::<ServerPacket>(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(back, packet);
    }

    #[test]
    fn test_encode_rejects_payload_over_u16() {
        let packet = ServerPacket::from(server::Chat {
            message: "x".repeat(70_000),
            ..Default::default()
        });
        let mut out = BytesMut::from(&b"keep"[..]);
        assert!(matches!(
            encode(&packet, &mut out),
            Err(CodecError::FrameTooLarge { .. })
        ));
        assert_eq!(&out[..], b"keep");
    }
}
