use thiserror::Error;
use xpn_types::{RPCCode, ServerCode, Status};

/// Errors that can occur in the transport layer.
#[derive(Debug, Error)]
pub enum NetError {
    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// An I/O error from the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The envelope announced a payload larger than allowed.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The envelope or payload could not be decoded.
    #[error("wire error: {0}")]
    Wire(#[from] xpn_proto::WireError),

    /// The acceptor has been shut down.
    #[error("transport shutting down")]
    ShuttingDown,
}

impl NetError {
    /// Map an I/O error, folding EOF-like conditions into `ConnectionClosed`.
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => NetError::ConnectionClosed,
            _ => NetError::Io(err),
        }
    }
}

impl From<NetError> for Status {
    fn from(err: NetError) -> Self {
        let code = match &err {
            NetError::ConnectionClosed => RPCCode::CONNECTION_CLOSED,
            NetError::SendFailed(_) => RPCCode::SEND_FAILED,
            NetError::Io(_) => RPCCode::RECV_FAILED,
            NetError::MessageTooLarge { .. } => RPCCode::MESSAGE_TOO_LARGE,
            NetError::Wire(_) => RPCCode::INVALID_MESSAGE,
            NetError::ShuttingDown => ServerCode::SHUTTING_DOWN,
        };
        Status::with_message(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_message_too_large() {
        let err = NetError::MessageTooLarge { size: 1 << 30, max: 12288 };
        assert!(err.to_string().contains("message too large"));
        assert!(err.to_string().contains("12288"));
    }

    #[test]
    fn test_eof_maps_to_connection_closed() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(NetError::from_io(io), NetError::ConnectionClosed));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(NetError::from_io(io), NetError::Io(_)));
    }

    #[test]
    fn test_status_conversion() {
        let status: Status = NetError::ConnectionClosed.into();
        assert_eq!(status.code(), RPCCode::CONNECTION_CLOSED);
        let status: Status = NetError::Wire(xpn_proto::WireError::UnknownOpcode(9)).into();
        assert_eq!(status.code(), RPCCode::INVALID_MESSAGE);
    }
}
