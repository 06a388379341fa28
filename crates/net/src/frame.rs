//! Length-prefixed frame encoding/decoding
//!
//! Wire format: [4-byte big-endian length][UTF-8 JSON payload]
//! Maximum frame size: 1MB (sanity limit)
//!
//! The decoder drains complete frames out of a receive buffer instead of
//! reading a stream directly, so the non-blocking pump stays in charge of
//! all socket I/O.

use crate::error::{Error, Result};

/// Maximum allowed frame size (1MB)
const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Encode a frame as length prefix + payload bytes
pub fn encode(payload: &str) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::Protocol("Empty frame".into()));
    }
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }

    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload.as_bytes());
    Ok(buf)
}

/// Drain one complete frame from the front of `buf`, if one has arrived.
/// Returns `Ok(None)` while the buffer holds only a partial frame.
pub fn decode(buf: &mut Vec<u8>) -> Result<Option<String>> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    // Sanity check
    if len == 0 {
        return Err(Error::Protocol("Empty frame".into()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "Frame too large: {} bytes (max {})",
            len, MAX_FRAME_SIZE
        )));
    }

    let total = 4 + len as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let payload: Vec<u8> = buf.drain(..total).skip(4).collect();
    String::from_utf8(payload)
        .map(Some)
        .map_err(|_| Error::Protocol("Frame is not valid UTF-8".into()))
}
