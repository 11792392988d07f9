use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors produced while decoding fixed-layout wire structs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("insufficient data: need {need} bytes, have {have}")]
    InsufficientData { need: usize, have: usize },

    #[error("payload size mismatch for {what}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("path length {len} exceeds limit {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("path is not valid utf-8")]
    InvalidUtf8,
}

impl From<WireError> for xpn_types::Status {
    fn from(err: WireError) -> Self {
        use xpn_types::{ServerCode, StatusCode};
        let code = match err {
            WireError::UnknownOpcode(_) => ServerCode::UNKNOWN_OPCODE,
            WireError::SizeMismatch { .. } => ServerCode::PAYLOAD_SIZE_MISMATCH,
            WireError::PathTooLong { .. } | WireError::InvalidUtf8 => ServerCode::BAD_PATH,
            WireError::InsufficientData { .. } => StatusCode::INVALID_FORMAT,
        };
        xpn_types::Status::with_message(code, err.to_string())
    }
}

/// A struct with a static on-wire size.
///
/// `encode` must append exactly `WIRE_SIZE` bytes. `decode` consumes exactly
/// `WIRE_SIZE` bytes from the front of `buf`.
pub trait WireStruct: Sized {
    const WIRE_SIZE: usize;
    const NAME: &'static str;

    fn encode(&self, buf: &mut BytesMut);

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_SIZE);
        self.encode(&mut buf);
        debug_assert_eq!(buf.len(), Self::WIRE_SIZE, "{} encoded wrong size", Self::NAME);
        buf.freeze()
    }

    /// Decode a buffer that must contain exactly one struct.
    fn from_exact(data: &[u8]) -> Result<Self, WireError> {
        if data.len() != Self::WIRE_SIZE {
            return Err(WireError::SizeMismatch {
                what: Self::NAME,
                expected: Self::WIRE_SIZE,
                actual: data.len(),
            });
        }
        let mut cur = data;
        Self::decode(&mut cur)
    }
}

/// Fail unless `buf` holds at least `need` bytes.
#[inline]
pub fn ensure(buf: &[u8], need: usize) -> Result<(), WireError> {
    if buf.len() < need {
        Err(WireError::InsufficientData {
            need,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Encode a length-prefixed string into a fixed `cap`-byte region.
pub(crate) fn put_fixed_str(buf: &mut BytesMut, s: &str, cap: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(cap);
    buf.put_u32_le(len as u32);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, cap - len);
}

/// Decode a string written by [`put_fixed_str`].
pub(crate) fn get_fixed_str(buf: &mut &[u8], cap: usize) -> Result<String, WireError> {
    ensure(buf, 4 + cap)?;
    let len = buf.get_u32_le() as usize;
    if len > cap {
        return Err(WireError::PathTooLong { len, max: cap });
    }
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| WireError::InvalidUtf8)?
        .to_owned();
    buf.advance(cap);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_layout() {
        let mut buf = BytesMut::new();
        put_fixed_str(&mut buf, "abc", 8);
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &3u32.to_le_bytes());
        assert_eq!(&buf[4..7], b"abc");
        assert!(buf[7..].iter().all(|b| *b == 0));

        let mut cur: &[u8] = &buf;
        assert_eq!(get_fixed_str(&mut cur, 8).unwrap(), "abc");
        assert!(cur.is_empty());
    }

    #[test]
    fn test_fixed_str_rejects_oversized_length() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&9u32.to_le_bytes());
        raw.extend_from_slice(&[b'a'; 8]);
        let mut cur: &[u8] = &raw;
        assert_eq!(
            get_fixed_str(&mut cur, 8),
            Err(WireError::PathTooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn test_fixed_str_rejects_bad_utf8() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&[0xff, 0xfe, 0, 0]);
        let mut cur: &[u8] = &raw;
        assert_eq!(get_fixed_str(&mut cur, 4), Err(WireError::InvalidUtf8));
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(&[0u8; 4], 4).is_ok());
        assert_eq!(
            ensure(&[0u8; 2], 8),
            Err(WireError::InsufficientData { need: 8, have: 2 })
        );
    }

    #[test]
    fn test_wire_error_to_status() {
        let status: xpn_types::Status = WireError::UnknownOpcode(77).into();
        assert_eq!(status.code(), xpn_types::ServerCode::UNKNOWN_OPCODE);
    }
}
