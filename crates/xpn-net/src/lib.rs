//! Transport abstraction for the file server.
//!
//! A [`Comm`] is one client connection. Handlers read and write raw bytes
//! addressed by the client's rank and tag, the same contract every transport
//! backend satisfies. [`StreamComm`] implements it over any byte stream;
//! the TCP backend lives in `xpn-net-tcp`.

pub mod comm;
pub mod envelope;
pub mod error;
pub mod mem;
pub mod stream;

pub use comm::{Acceptor, Comm};
pub use envelope::{read_envelope, read_struct, write_struct, Envelope};
pub use error::NetError;
pub use mem::{MemAcceptor, MemConnector};
pub use stream::StreamComm;
