use std::fmt;

use crate::errno::Errno;
use crate::status_code::{self, status_code_t, StatusCode};

/// A status value carrying a code, an optional message, and the OS error
/// that produced it when one exists.
#[derive(Debug, Clone)]
#[must_use]
pub struct Status {
    code: status_code_t,
    errno: Option<Errno>,
    message: Option<String>,
}

impl Status {
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            errno: None,
            message: None,
        }
    }

    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            errno: None,
            message: Some(msg.into()),
        }
    }

    /// Status for a failed backing-store call.
    pub fn from_errno(errno: Errno, msg: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OS_ERROR,
            errno: Some(errno),
            message: Some(msg.into()),
        }
    }

    pub fn code(&self) -> status_code_t {
        self.code
    }

    pub fn errno(&self) -> Option<Errno> {
        self.errno
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Produce a description like `"OSError(72) errno=2 open /a"`.
    pub fn describe(&self) -> String {
        let mut out = format!("{}({})", status_code::to_string(self.code), self.code);
        if let Some(errno) = self.errno {
            out.push_str(&format!(" errno={}", errno.raw()));
        }
        if let Some(msg) = &self.message {
            out.push(' ');
            out.push_str(msg);
        }
        out
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Self::from_errno(Errno::from_io(&err), err.to_string())
    }
}
