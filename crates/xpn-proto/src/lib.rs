//! Wire protocol of the file server.
//!
//! Every request is an [`EnvelopeHeader`] followed by exactly `msg_size`
//! payload bytes whose layout is fixed by the opcode. Every reply is a
//! fixed-size struct, optionally followed by raw data for reads. All integers
//! are little-endian.

pub mod attr;
pub mod codec;
pub mod control;
pub mod metadata;
pub mod op;
pub mod path;
pub mod reply;
pub mod request;

pub use attr::{DirEntry, FileAttr, FsStats};
pub use codec::{WireError, WireStruct};
pub use control::ControlCode;
pub use metadata::FileMetadata;
pub use op::OpCode;
pub use path::WirePath;
pub use reply::*;
pub use request::*;

/// Largest path accepted in a request, in bytes.
pub const PATH_MAX: usize = 4096;

/// Largest directory entry name, in bytes.
pub const NAME_MAX: usize = 256;

/// Size of one streaming transfer window for reads and writes.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Upper bound on an envelope payload.
pub const MAX_MESSAGE_SIZE: usize = 3 * PATH_MAX;
