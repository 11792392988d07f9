use std::fmt;

/// Codes accepted on the control channel, one 4-byte LE code per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ControlCode {
    /// Reply with the data port as an `i32`.
    Accept = 123,
    /// Reply with `0`.
    Ping = 333,
    /// Request shutdown, no reply.
    Finish = 666,
    /// Request shutdown, echo the code once every connection has drained.
    FinishAwait = 667,
}

impl ControlCode {
    pub const ACK: i32 = 0;

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            123 => Some(ControlCode::Accept),
            333 => Some(ControlCode::Ping),
            666 => Some(ControlCode::Finish),
            667 => Some(ControlCode::FinishAwait),
            _ => None,
        }
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        (self as i32).to_le_bytes()
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCode::Accept => "ACCEPT",
            ControlCode::Ping => "PING",
            ControlCode::Finish => "FINISH",
            ControlCode::FinishAwait => "FINISH_AWAIT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(ControlCode::from_raw(666), Some(ControlCode::Finish));
        assert_eq!(ControlCode::from_raw(444), None);
        assert_eq!(ControlCode::FinishAwait.to_le_bytes(), 667i32.to_le_bytes());
    }
}
