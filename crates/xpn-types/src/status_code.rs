/// Status code type used by every `Status`.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const INVALID_FORMAT: status_code_t = 33;
    pub const OS_ERROR: status_code_t = 72;
    pub const UNKNOWN: status_code_t = 999;
}

/// Transport status codes (2xxx).
pub mod RPCCode {
    use super::status_code_t;

    pub const SEND_FAILED: status_code_t = 2000;
    pub const RECV_FAILED: status_code_t = 2001;
    pub const CONNECTION_CLOSED: status_code_t = 2002;
    pub const INVALID_MESSAGE: status_code_t = 2003;
    pub const MESSAGE_TOO_LARGE: status_code_t = 2004;
}

/// File server status codes (3xxx).
pub mod ServerCode {
    use super::status_code_t;

    pub const UNKNOWN_OPCODE: status_code_t = 3000;
    pub const PAYLOAD_SIZE_MISMATCH: status_code_t = 3001;
    pub const BAD_PATH: status_code_t = 3002;
    pub const SHUTTING_DOWN: status_code_t = 3004;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCodeType {
    Invalid = -1,
    Common = 0,
    RPC = 2,
    Server = 3,
}

/// Determine the category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        2000..=2999 => StatusCodeType::RPC,
        3000..=3999 => StatusCodeType::Server,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::INVALID_FORMAT => "InvalidFormat",
        StatusCode::OS_ERROR => "OSError",
        StatusCode::UNKNOWN => "Unknown",

        RPCCode::SEND_FAILED => "RPC::SendFailed",
        RPCCode::RECV_FAILED => "RPC::RecvFailed",
        RPCCode::CONNECTION_CLOSED => "RPC::ConnectionClosed",
        RPCCode::INVALID_MESSAGE => "RPC::InvalidMessage",
        RPCCode::MESSAGE_TOO_LARGE => "RPC::MessageTooLarge",

        ServerCode::UNKNOWN_OPCODE => "Server::UnknownOpcode",
        ServerCode::PAYLOAD_SIZE_MISMATCH => "Server::PayloadSizeMismatch",
        ServerCode::BAD_PATH => "Server::BadPath",
        ServerCode::SHUTTING_DOWN => "Server::ShuttingDown",

        _ => "Unknown",
    }
}
