//! TCP transport for the file server.
//!
//! [`TcpAcceptor`] wraps a Tokio listener and yields one
//! [`StreamComm`](xpn_net::StreamComm) per accepted client. Each accepted
//! client gets the next rank from a per-acceptor counter.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use xpn_net::{Acceptor, NetError, StreamComm};
use xpn_types::ClientRank;

pub type TcpComm = StreamComm<TcpStream>;

// ---------------------------------------------------------------------------
// TcpAcceptor
// ---------------------------------------------------------------------------

pub struct TcpAcceptor {
    listener: TcpListener,
    local: SocketAddr,
    next_rank: AtomicI32,
}

impl TcpAcceptor {
    /// Bind to `addr`. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        tracing::info!(%local, "tcp acceptor bound");
        Ok(Self {
            listener,
            local,
            next_rank: AtomicI32::new(0),
        })
    }

    pub fn local_socket_addr(&self) -> SocketAddr {
        self.local
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Comm = TcpComm;

    async fn accept(&self) -> Result<TcpComm, NetError> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "set_nodelay failed: {}", e);
        }
        let rank = ClientRank(self.next_rank.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%peer, %rank, "tcp connection accepted");
        Ok(StreamComm::new(stream, rank, peer.to_string()))
    }

    fn local_addr(&self) -> String {
        self.local.to_string()
    }
}

impl std::fmt::Debug for TcpAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpAcceptor").field("local", &self.local).finish()
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Connect to a server endpoint.
pub async fn connect(addr: SocketAddr) -> Result<TcpComm, NetError> {
    let stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::ConnectionRefused => NetError::SendFailed(format!("{}: refused", addr)),
        _ => NetError::Io(e),
    })?;
    stream.set_nodelay(true)?;
    Ok(StreamComm::new(stream, ClientRank(0), addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpn_net::Comm;
    use xpn_types::ClientTag;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_accept_and_transfer() {
        let acceptor = TcpAcceptor::bind(loopback()).await.unwrap();
        let addr = acceptor.local_socket_addr();
        assert_ne!(addr.port(), 0);

        let client = tokio::spawn(async move {
            let comm = connect(addr).await.unwrap();
            comm.write_data(b"ping", ClientRank(0), ClientTag(1)).await.unwrap();
            let mut buf = [0u8; 4];
            comm.read_data(&mut buf, ClientRank(0), ClientTag(1)).await.unwrap();
            buf
        });

        let server = acceptor.accept().await.unwrap();
        assert_eq!(server.rank(), ClientRank(0));
        let mut buf = [0u8; 4];
        server.read_data(&mut buf, server.rank(), ClientTag(1)).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.write_data(b"pong", server.rank(), ClientTag(1)).await.unwrap();

        assert_eq!(&client.await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_ranks_increase_per_connection() {
        let acceptor = TcpAcceptor::bind(loopback()).await.unwrap();
        let addr = acceptor.local_socket_addr();
        let _a = connect(addr).await.unwrap();
        let _b = connect(addr).await.unwrap();
        assert_eq!(acceptor.accept().await.unwrap().rank(), ClientRank(0));
        assert_eq!(acceptor.accept().await.unwrap().rank(), ClientRank(1));
    }
}
