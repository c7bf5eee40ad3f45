//! WebSocket frame codec (RFC 6455 Section 5.2-5.3), reduced to what the
//! reload channel needs.
//!
//! Inbound frames are single, unfragmented text frames carrying JSON, or a
//! close frame. Outbound frames are unmasked text frames of at most 65535
//! payload bytes.
//!
//! - [`decode_frame`]: Decode one frame from a buffer (handles masking)
//! - [`encode_text`]: Encode a JSON-serializable value as one server text frame
//! - [`read_frame_bytes`]: Pull exactly one frame's bytes off a byte stream

use std::io::Read;

use serde::Serialize;
use serde_json::Value;

use crate::error::WsError;

/// First byte of every outbound frame: FIN=1, RSV=0, opcode=text.
const TEXT_FRAME_HEADER: u8 = 0b1000_0001;

/// Largest payload the 7-bit length field holds directly.
const MAX_SHORT_LEN: usize = 125;

/// Length field value announcing a 16-bit extended length.
const LEN_16: u8 = 126;

/// Length field value announcing a 64-bit extended length (unsupported).
const LEN_64: u8 = 127;

/// WebSocket frame opcodes per RFC 6455 Section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Parse a 4-bit opcode value. Reserved values yield `None`.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        match byte {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN bit. Fragmentation is unsupported, so a non-final frame is
    /// handled exactly like a final one.
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub payload_len: usize,
    /// Masking key as a 32-bit big-endian value, present iff `masked`.
    pub masking_key: Option<u32>,
    /// Payload with any mask already removed.
    pub payload: Vec<u8>,
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A text frame whose payload parsed as JSON.
    Message { frame: Frame, value: Value },
    /// The peer sent a close frame; the connection should end.
    Close,
    /// Any opcode other than text or close.
    Ignored { opcode: u8 },
}

/// Mask byte for payload index `index`, taken from the big-endian key.
///
/// Index 0 uses the most significant byte, index 3 the least significant.
pub fn mask_byte(masking_key: u32, index: usize) -> u8 {
    let j = index % 4;
    let shift = if j == 3 { 0 } else { (3 - j) * 8 };
    ((masking_key >> shift) & 0xFF) as u8
}

/// XOR `source` with the masking key into a new buffer.
///
/// The operation is symmetric: applying it twice returns the original.
pub fn unmask(source: &[u8], masking_key: u32) -> Vec<u8> {
    source
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ mask_byte(masking_key, i))
        .collect()
}

fn take<'a>(buffer: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], WsError> {
    let end = offset + len;
    buffer.get(offset..end).ok_or(WsError::Truncated {
        needed: end,
        available: buffer.len(),
    })
}

/// Decode one frame from the start of `buffer`.
///
/// Close and non-text frames return early without touching anything past
/// the first byte. A 64-bit length is rejected before any extended length
/// bytes are read. The text payload is parsed as JSON and a parse failure
/// is returned as [`WsError::InvalidJson`].
pub fn decode_frame(buffer: &[u8]) -> Result<Decoded, WsError> {
    // Byte 0: FIN(1) RSV(3, ignored) Opcode(4)
    let byte0 = take(buffer, 0, 1)?[0];
    let fin = (byte0 & 0x80) != 0;
    let opcode_bits = byte0 & 0x0F;

    match Opcode::from_u8(opcode_bits) {
        Some(Opcode::Close) => return Ok(Decoded::Close),
        Some(Opcode::Text) => {}
        _ => return Ok(Decoded::Ignored { opcode: opcode_bits }),
    }

    // Byte 1: MASK(1) Payload-Length(7)
    let byte1 = take(buffer, 1, 1)?[0];
    let masked = (byte1 & 0x80) != 0;
    let length_field = byte1 & 0x7F;
    let mut offset = 2;

    let payload_len = match length_field {
        LEN_64 => return Err(WsError::LargePayload),
        LEN_16 => {
            let ext = take(buffer, offset, 2)?;
            offset += 2;
            u16::from_be_bytes([ext[0], ext[1]]) as usize
        }
        short => short as usize,
    };

    let masking_key = if masked {
        let key = take(buffer, offset, 4)?;
        offset += 4;
        Some(u32::from_be_bytes([key[0], key[1], key[2], key[3]]))
    } else {
        None
    };

    let source = take(buffer, offset, payload_len)?;
    let payload = match masking_key {
        Some(key) => unmask(source, key),
        None => source.to_vec(),
    };

    let value = serde_json::from_slice(&payload).map_err(WsError::InvalidJson)?;

    Ok(Decoded::Message {
        frame: Frame {
            fin,
            opcode: Opcode::Text,
            masked,
            payload_len,
            masking_key,
            payload,
        },
        value,
    })
}

/// Encode `value` as JSON inside a single unmasked text frame.
///
/// Payloads below 126 bytes use the 7-bit length, up to 65535 the 16-bit
/// extended length. Anything larger is [`WsError::PayloadTooLarge`].
pub fn encode_text<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, WsError> {
    let json = serde_json::to_vec(value).map_err(WsError::Serialize)?;
    let n = json.len();

    let mut out = Vec::with_capacity(n + 4);
    out.push(TEXT_FRAME_HEADER);
    if n <= MAX_SHORT_LEN {
        out.push(n as u8);
    } else if n <= u16::MAX as usize {
        out.push(LEN_16);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else {
        return Err(WsError::PayloadTooLarge(n));
    }
    out.extend_from_slice(&json);
    Ok(out)
}

/// Read exactly one frame's bytes (header, extended length, mask, payload)
/// from `reader`, ready for [`decode_frame`].
///
/// Consumes the whole frame whatever its opcode so the stream stays aligned
/// on frame boundaries. A 64-bit length is rejected without reading the
/// extended length, for every opcode: a binary or ping frame that would
/// otherwise be ignored still fails with [`WsError::LargePayload`], and the
/// stream is left mid-frame, so callers should drop the connection.
pub fn read_frame_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, WsError> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header)?;

    let masked = (header[1] & 0x80) != 0;
    let mut bytes = header.to_vec();

    let payload_len = match header[1] & 0x7F {
        LEN_64 => return Err(WsError::LargePayload),
        LEN_16 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext)?;
            bytes.extend_from_slice(&ext);
            u16::from_be_bytes(ext) as usize
        }
        short => short as usize,
    };

    let rest = if masked { 4 + payload_len } else { payload_len };
    let start = bytes.len();
    bytes.resize(start + rest, 0);
    reader.read_exact(&mut bytes[start..])?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    const KEY: u32 = 0x37FA_213D;

    #[test]
    fn test_mask_byte_order() {
        assert_eq!(mask_byte(KEY, 0), 0x37);
        assert_eq!(mask_byte(KEY, 1), 0xFA);
        assert_eq!(mask_byte(KEY, 2), 0x21);
        assert_eq!(mask_byte(KEY, 3), 0x3D);
        assert_eq!(mask_byte(KEY, 4), 0x37);
        assert_eq!(mask_byte(KEY, 7), 0x3D);
    }

    #[test]
    fn test_unmask_rfc_example() {
        // RFC 6455 Section 5.7: masked "Hello"
        let masked = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        assert_eq!(unmask(&masked, KEY), b"Hello");
        assert_eq!(unmask(b"Hello", KEY), masked);
    }

    #[test]
    fn test_decode_masked_vector() {
        // "\"Hi\"" masked with 0x37FA213D
        let bytes = [0x81, 0x84, 0x37, 0xfa, 0x21, 0x3d, 0x15, 0xb2, 0x48, 0x1f];
        match decode_frame(&bytes).unwrap() {
            Decoded::Message { frame, value } => {
                assert!(frame.fin);
                assert!(frame.masked);
                assert_eq!(frame.masking_key, Some(KEY));
                assert_eq!(frame.payload_len, 4);
                assert_eq!(frame.payload, b"\"Hi\"");
                assert_eq!(value, json!("Hi"));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unmasked_text() {
        let bytes = [0x81, 0x02, b'4', b'2'];
        match decode_frame(&bytes).unwrap() {
            Decoded::Message { frame, value } => {
                assert!(!frame.masked);
                assert_eq!(frame.masking_key, None);
                assert_eq!(value, json!(42));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_reserved_bits_ignored() {
        // RSV1..3 set: 0xF1 = FIN + RSV + text
        let bytes = [0xF1, 0x04, b'n', b'u', b'l', b'l'];
        assert!(matches!(
            decode_frame(&bytes).unwrap(),
            Decoded::Message { value: Value::Null, .. }
        ));
    }

    #[test]
    fn test_non_final_treated_as_final() {
        let bytes = [0x01, 0x02, b'{', b'}'];
        match decode_frame(&bytes).unwrap() {
            Decoded::Message { frame, value } => {
                assert!(!frame.fin);
                assert_eq!(value, json!({}));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_close_reads_only_first_byte() {
        assert_eq!(decode_frame(&[0x88]).unwrap(), Decoded::Close);
        assert_eq!(decode_frame(&[0x88, 0x82, 0x00]).unwrap(), Decoded::Close);
    }

    #[test]
    fn test_other_opcodes_ignored() {
        for opcode in [0x0u8, 0x2, 0x3, 0x9, 0xA, 0xF] {
            assert_eq!(
                decode_frame(&[0x80 | opcode]).unwrap(),
                Decoded::Ignored { opcode }
            );
        }
    }

    #[test]
    fn test_large_payload_rejected() {
        // Only the first two bytes are present: nothing past the length field may be read.
        let result = decode_frame(&[0x81, 0xFF]);
        assert!(matches!(result, Err(WsError::LargePayload)));
    }

    #[test]
    fn test_invalid_json_propagates() {
        let bytes = [0x81, 0x03, b'{', b'x', b'}'];
        assert!(matches!(decode_frame(&bytes), Err(WsError::InvalidJson(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f];
        match decode_frame(&bytes) {
            Err(WsError::Truncated { needed, available }) => {
                assert_eq!(needed, 11);
                assert_eq!(available, 7);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_short() {
        let bytes = encode_text(&json!({"message": "reload"})).unwrap();
        let body = br#"{"message":"reload"}"#;
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1] as usize, body.len());
        assert_eq!(&bytes[2..], body);
    }

    #[test]
    fn test_encode_boundary_125_and_126() {
        // A JSON string of n chars serializes to n + 2 bytes.
        let at_125 = encode_text(&"a".repeat(123)).unwrap();
        assert_eq!(at_125[1], 125);
        assert_eq!(at_125.len(), 2 + 125);

        let at_126 = encode_text(&"a".repeat(124)).unwrap();
        assert_eq!(at_126[1], 126);
        assert_eq!(&at_126[2..4], &126u16.to_be_bytes());
        assert_eq!(at_126.len(), 4 + 126);
    }

    #[test]
    fn test_encode_too_large() {
        let result = encode_text(&"a".repeat(65_534));
        assert!(matches!(result, Err(WsError::PayloadTooLarge(65_536))));
    }

    #[test]
    fn test_read_frame_bytes_keeps_stream_aligned() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0x82, 0x83, 1, 2, 3, 4, 9, 9, 9]); // masked binary
        stream.extend_from_slice(&[0x81, 0x01, b'7']);
        let mut cursor = Cursor::new(stream);

        let first = read_frame_bytes(&mut cursor).unwrap();
        assert_eq!(first.len(), 9);
        assert_eq!(decode_frame(&first).unwrap(), Decoded::Ignored { opcode: 2 });

        let second = read_frame_bytes(&mut cursor).unwrap();
        assert!(matches!(
            decode_frame(&second).unwrap(),
            Decoded::Message { ref value, .. } if *value == json!(7)
        ));
    }

    #[test]
    fn test_read_frame_bytes_rejects_64bit_length() {
        let mut cursor = Cursor::new(vec![0x81, 0x7F, 0, 0, 0, 0, 0, 0, 1, 0]);
        assert!(matches!(
            read_frame_bytes(&mut cursor),
            Err(WsError::LargePayload)
        ));
        // Nothing past the two header bytes was consumed.
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_read_frame_bytes_rejects_64bit_length_for_ignored_opcode() {
        // Binary frames are normally skipped, but not with a 64-bit length.
        let mut cursor = Cursor::new(vec![0x82, 0x7F, 0, 0, 0, 0, 0, 1, 0, 0]);
        assert!(matches!(
            read_frame_bytes(&mut cursor),
            Err(WsError::LargePayload)
        ));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_read_frame_bytes_eof() {
        let mut cursor = Cursor::new(vec![0x81]);
        assert!(matches!(read_frame_bytes(&mut cursor), Err(WsError::Io(_))));
    }
}
