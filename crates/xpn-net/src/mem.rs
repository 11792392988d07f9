use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use xpn_types::ClientRank;

use crate::comm::Acceptor;
use crate::error::NetError;
use crate::stream::StreamComm;

type MemComm = StreamComm<DuplexStream>;

/// In-process acceptor paired with a [`MemConnector`].
pub struct MemAcceptor {
    incoming: Mutex<mpsc::UnboundedReceiver<MemComm>>,
    name: String,
}

/// Client side of a [`MemAcceptor`]; each `connect` yields a new client.
#[derive(Clone)]
pub struct MemConnector {
    tx: mpsc::UnboundedSender<MemComm>,
    next_rank: Arc<AtomicI32>,
    buf_size: usize,
}

impl MemAcceptor {
    pub fn new(name: impl Into<String>, buf_size: usize) -> (Self, MemConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                incoming: Mutex::new(rx),
                name: name.into(),
            },
            MemConnector {
                tx,
                next_rank: Arc::new(AtomicI32::new(0)),
                buf_size,
            },
        )
    }
}

impl MemConnector {
    pub fn connect(&self) -> Result<MemComm, NetError> {
        let rank = ClientRank(self.next_rank.fetch_add(1, Ordering::Relaxed));
        let (server, client) = StreamComm::duplex(self.buf_size, rank);
        self.tx.send(server).map_err(|_| NetError::ShuttingDown)?;
        Ok(client)
    }
}

#[async_trait]
impl Acceptor for MemAcceptor {
    type Comm = MemComm;

    async fn accept(&self) -> Result<MemComm, NetError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(NetError::ShuttingDown)
    }

    fn local_addr(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Comm;
    use xpn_types::ClientTag;

    #[tokio::test]
    async fn test_connect_assigns_ranks() {
        let (acceptor, connector) = MemAcceptor::new("mem", 1024);
        let c0 = connector.connect().unwrap();
        let c1 = connector.connect().unwrap();
        let s0 = acceptor.accept().await.unwrap();
        let s1 = acceptor.accept().await.unwrap();
        assert_eq!(s0.rank(), ClientRank(0));
        assert_eq!(s1.rank(), ClientRank(1));

        c1.write_data(b"x", c1.rank(), ClientTag(0)).await.unwrap();
        let mut b = [0u8; 1];
        s1.read_data(&mut b, s1.rank(), ClientTag(0)).await.unwrap();
        assert_eq!(&b, b"x");
        drop(c0);
    }

    #[tokio::test]
    async fn test_accept_after_connector_dropped() {
        let (acceptor, connector) = MemAcceptor::new("mem", 1024);
        drop(connector);
        assert!(matches!(acceptor.accept().await, Err(NetError::ShuttingDown)));
    }
}
