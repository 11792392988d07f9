use async_trait::async_trait;
use xpn_types::{ClientRank, ClientTag};

use crate::error::NetError;

/// One client connection.
///
/// Every transfer is addressed by the client's rank and the request tag so
/// that transports multiplexing several clients on one channel can route
/// the bytes. Both calls block (asynchronously) until the whole buffer has
/// been transferred or the channel fails.
#[async_trait]
pub trait Comm: Send + Sync + 'static {
    /// Fill `buf` completely with bytes from the client.
    async fn read_data(
        &self,
        buf: &mut [u8],
        rank: ClientRank,
        tag: ClientTag,
    ) -> Result<(), NetError>;

    /// Send all of `data` to the client.
    async fn write_data(&self, data: &[u8], rank: ClientRank, tag: ClientTag)
        -> Result<(), NetError>;

    /// Rank of the client on the other end.
    fn rank(&self) -> ClientRank;

    /// Human-readable peer description for logs.
    fn peer(&self) -> String;

    /// Close the channel. Pending and later transfers fail.
    async fn close(&self);
}

/// Yields connected [`Comm`]s.
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    type Comm: Comm;

    /// Wait for the next client.
    async fn accept(&self) -> Result<Self::Comm, NetError>;

    /// Local endpoint description for logs.
    fn local_addr(&self) -> String;
}
