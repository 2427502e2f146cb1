//! Cursor tokens for resumable list scans
//!
//! A cursor names the last key a scan yielded, relative to the selector's
//! common prefix so that tokens stay short and cannot point outside the
//! selector they came from.
//!
//! ```text
//! token = base64url_nopad( [0x01] [suffix_len: u16 BE] [suffix bytes] )
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use stratakv_core::{KvError, KvResult};

const CURSOR_FORMAT_V1: u8 = 0x01;
const HEADER_LEN: usize = 3;

/// Encode the suffix of a boundary key into a cursor token
pub fn encode_cursor(suffix: &[u8]) -> KvResult<String> {
    let len = u16::try_from(suffix.len())
        .map_err(|_| KvError::type_error("Cursor boundary key too large"))?;
    let mut raw = Vec::with_capacity(HEADER_LEN + suffix.len());
    raw.push(CURSOR_FORMAT_V1);
    raw.extend_from_slice(&len.to_be_bytes());
    raw.extend_from_slice(suffix);
    Ok(BASE64.encode(raw))
}

/// Decode a cursor token into the boundary key suffix
///
/// Any malformed token is a type error.
pub fn decode_cursor(token: &str) -> KvResult<Vec<u8>> {
    let invalid = || KvError::type_error("invalid cursor");
    let raw = BASE64.decode(token).map_err(|_| invalid())?;
    if raw.len() < HEADER_LEN || raw[0] != CURSOR_FORMAT_V1 {
        return Err(invalid());
    }
    let len = u16::from_be_bytes([raw[1], raw[2]]) as usize;
    let suffix = &raw[HEADER_LEN..];
    if suffix.len() != len {
        return Err(invalid());
    }
    Ok(suffix.to_vec())
}
