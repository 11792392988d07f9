//! The XPN file server.
//!
//! A [`Dispatcher`](ops::Dispatcher) decodes one request at a time from a
//! client connection and runs it against a [`Filesystem`](xpn_fs::Filesystem).
//! [`XpnServer`](server::XpnServer) owns the accept loops: data connections
//! plus the control channel used to discover the data port and to stop the
//! server. File-size updates from clients are coalesced per path by
//! [`FileSizeQueue`](md_queue::FileSizeQueue), and an optional pub/sub
//! bridge ([`mq`]) writes published data into files.

pub mod config;
pub mod control;
pub mod md_queue;
pub mod mq;
pub mod ops;
pub mod server;
pub mod session;

pub use config::{ConfigError, FsMode, MqConfig, ServerConfig, ThreadMode};
pub use ops::{Dispatcher, Flow};
pub use server::{ShutdownSignal, XpnServer};
