use crate::status::Status;

/// The standard result type used by the server, with `Status` as the error.
pub type Result<T> = std::result::Result<T, Status>;
