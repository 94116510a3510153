//! Git packet-line framing.
//!
//! # Packet-line format
//!
//! Each packet line is prefixed with a 4-character lowercase hex length that
//! includes the prefix itself:
//!
//! - `0000` -- flush packet (end of section)
//! - `0004`+ -- data packet (length includes the 4 prefix bytes)
//!
//! An empty data packet (`0004`) is a legal frame and is never the same thing
//! as a flush.

use tracing::trace;

use crate::error::{Error, Result};

/// Largest frame git accepts, prefix included.
pub const MAX_FRAME_LEN: usize = 65520;

/// Largest payload a single data packet may carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - 4;

const FLUSH: &[u8; 4] = b"0000";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single decoded packet line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// A data packet containing arbitrary bytes (possibly empty).
    Data(Vec<u8>),
    /// Flush packet (`0000`).
    Flush,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `payload` as a packet line: 4-hex-digit length prefix + payload.
///
/// Callers include any trailing newline the protocol expects.
pub fn encode_line(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::Framing(format!(
            "payload of {} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit",
            payload.len()
        )));
    }
    let total_len = payload.len() + 4;
    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(format!("{total_len:04x}").as_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// The flush packet.
pub fn flush_line() -> &'static [u8] {
    FLUSH
}

/// Encode a [`PktLine`] back into its wire representation.
pub fn encode_pkt(pkt: &PktLine) -> Result<Vec<u8>> {
    match pkt {
        PktLine::Data(data) => encode_line(data),
        PktLine::Flush => Ok(FLUSH.to_vec()),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a complete sequence of packet lines.
///
/// Any malformed prefix, reserved length (`0001`..`0003`), length above
/// [`MAX_FRAME_LEN`] or truncated frame fails the whole decode.
pub fn decode_pkt_lines(data: &[u8]) -> Result<Vec<PktLine>> {
    let mut packets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + 4 > data.len() {
            return Err(Error::Framing(format!(
                "truncated length prefix at offset {pos}"
            )));
        }

        let len_hex = std::str::from_utf8(&data[pos..pos + 4]).map_err(|_| {
            Error::Framing(format!("non-UTF-8 length prefix at offset {pos}"))
        })?;
        let pkt_len = usize::from_str_radix(len_hex, 16).map_err(|_| {
            Error::Framing(format!("invalid length {len_hex:?} at offset {pos}"))
        })?;

        match pkt_len {
            0 => {
                trace!(offset = pos, "flush packet");
                packets.push(PktLine::Flush);
                pos += 4;
            }
            1..=3 => {
                return Err(Error::Framing(format!(
                    "reserved length {len_hex} at offset {pos}"
                )));
            }
            n if n > MAX_FRAME_LEN => {
                return Err(Error::Framing(format!(
                    "length {n} at offset {pos} exceeds the {MAX_FRAME_LEN} byte frame limit"
                )));
            }
            n => {
                if pos + n > data.len() {
                    return Err(Error::Framing(format!(
                        "packet at offset {pos} declares {n} bytes but only {} remain",
                        data.len() - pos
                    )));
                }
                let payload = data[pos + 4..pos + n].to_vec();
                trace!(offset = pos, payload_len = payload.len(), "data packet");
                packets.push(PktLine::Data(payload));
                pos += n;
            }
        }
    }

    Ok(packets)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_len(frame: &[u8]) -> usize {
        usize::from_str_radix(std::str::from_utf8(&frame[..4]).unwrap(), 16).unwrap()
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line(b"hello\n").unwrap(), b"000ahello\n");
    }

    #[test]
    fn test_encode_service_header() {
        let encoded = encode_line(b"# service=git-upload-pack\n").unwrap();
        assert_eq!(&encoded, b"001e# service=git-upload-pack\n");
    }

    #[test]
    fn test_encode_empty_is_not_flush() {
        let encoded = encode_line(b"").unwrap();
        assert_eq!(&encoded, b"0004");
        assert_ne!(encoded.as_slice(), flush_line());
    }

    #[test]
    fn test_flush_literal() {
        assert_eq!(flush_line(), b"0000");
    }

    #[test]
    fn test_length_prefix_matches_total_len() {
        for len in [0usize, 1, 11, 12, 251, 252, 4091, 4092, 65516] {
            let payload = vec![b'x'; len];
            let frame = encode_line(&payload).unwrap();
            assert_eq!(frame.len(), len + 4, "frame length for payload {len}");
            assert_eq!(prefix_len(&frame), len + 4, "prefix for payload {len}");
            assert!(frame[..4].iter().all(|b| !b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert_eq!(MAX_PAYLOAD_LEN, 65516);
        for len in [65517usize, 65531] {
            let payload = vec![b'x'; len];
            assert!(
                matches!(encode_line(&payload), Err(Error::Framing(_))),
                "payload of {len} bytes must be rejected"
            );
        }
    }

    #[test]
    fn test_largest_frame_prefix() {
        let frame = encode_line(&vec![b'x'; 65516]).unwrap();
        assert_eq!(&frame[..4], b"fff0");
    }

    #[test]
    fn test_decode_oversized_length_rejected() {
        let mut wire = b"fff1".to_vec();
        wire.extend_from_slice(&vec![b'x'; 65517]);
        assert!(matches!(decode_pkt_lines(&wire), Err(Error::Framing(_))));

        let mut wire = b"fff0".to_vec();
        wire.extend_from_slice(&vec![b'x'; 65516]);
        assert_eq!(
            decode_pkt_lines(&wire).unwrap(),
            vec![PktLine::Data(vec![b'x'; 65516])]
        );
    }

    #[test]
    fn test_decode_flush_and_empty_data() {
        let packets = decode_pkt_lines(b"00040000").unwrap();
        assert_eq!(packets, vec![PktLine::Data(Vec::new()), PktLine::Flush]);
    }

    #[test]
    fn test_decode_multiple_packets() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_line(b"# service=git-upload-pack\n").unwrap());
        wire.extend_from_slice(flush_line());
        wire.extend_from_slice(&encode_line(b"agent=git/2.43\n").unwrap());
        wire.extend_from_slice(flush_line());

        let packets = decode_pkt_lines(&wire).unwrap();
        assert_eq!(
            packets,
            vec![
                PktLine::Data(b"# service=git-upload-pack\n".to_vec()),
                PktLine::Flush,
                PktLine::Data(b"agent=git/2.43\n".to_vec()),
                PktLine::Flush,
            ]
        );
    }

    #[test]
    fn test_decode_reserved_length_rejected() {
        assert!(decode_pkt_lines(b"0001").is_err());
        assert!(decode_pkt_lines(b"0003").is_err());
    }

    #[test]
    fn test_decode_truncated_rejected() {
        assert!(decode_pkt_lines(b"000ahel").is_err());
        assert!(decode_pkt_lines(b"00").is_err());
        assert!(decode_pkt_lines(b"zzzz").is_err());
    }

    #[test]
    fn test_encode_pkt_flush() {
        assert_eq!(encode_pkt(&PktLine::Flush).unwrap(), b"0000");
        assert_eq!(
            encode_pkt(&PktLine::Data(b"a".to_vec())).unwrap(),
            b"0005a"
        );
    }
}
