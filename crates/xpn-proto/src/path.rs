use std::fmt;

use bytes::BytesMut;

use crate::codec::{get_fixed_str, put_fixed_str, WireError};
use crate::PATH_MAX;

/// A path carried in a fixed `PATH_MAX` region on the wire.
///
/// Construction rejects paths that would not fit, so encoding never
/// truncates.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct WirePath(String);

impl WirePath {
    pub const WIRE_SIZE: usize = 4 + PATH_MAX;

    pub fn new(path: impl Into<String>) -> Result<Self, WireError> {
        let path = path.into();
        if path.len() > PATH_MAX {
            return Err(WireError::PathTooLong {
                len: path.len(),
                max: PATH_MAX,
            });
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_fixed_str(buf, &self.0, PATH_MAX);
    }

    pub(crate) fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        get_fixed_str(buf, PATH_MAX).map(Self)
    }
}

impl AsRef<str> for WirePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for WirePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for WirePath {
    type Error = WireError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
