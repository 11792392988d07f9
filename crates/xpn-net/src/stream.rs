use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use xpn_types::{ClientRank, ClientTag};

use crate::comm::Comm;
use crate::error::NetError;

/// A [`Comm`] over any bidirectional byte stream.
///
/// The stream is split into read and write halves, each behind its own async
/// mutex, so a reply can be written while another task waits for input.
/// Rank and tag are not encoded on the stream: one stream carries exactly one
/// client.
pub struct StreamComm<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    rank: ClientRank,
    peer: String,
    closed: AtomicBool,
}

impl<S> StreamComm<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, rank: ClientRank, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            rank,
            peer: peer.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl StreamComm<DuplexStream> {
    /// Two connected in-memory endpoints. The first is the server side.
    pub fn duplex(max_buf_size: usize, rank: ClientRank) -> (Self, Self) {
        let (server, client) = tokio::io::duplex(max_buf_size);
        (
            Self::new(server, rank, format!("mem-client-{}", rank)),
            Self::new(client, rank, "mem-server"),
        )
    }
}

#[async_trait]
impl<S> Comm for StreamComm<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_data(
        &self,
        buf: &mut [u8],
        _rank: ClientRank,
        _tag: ClientTag,
    ) -> Result<(), NetError> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        let mut reader = self.reader.lock().await;
        reader.read_exact(buf).await.map_err(NetError::from_io)?;
        Ok(())
    }

    async fn write_data(
        &self,
        data: &[u8],
        _rank: ClientRank,
        _tag: ClientTag,
    ) -> Result<(), NetError> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await.map_err(NetError::from_io)?;
        writer.flush().await.map_err(NetError::from_io)?;
        Ok(())
    }

    fn rank(&self) -> ClientRank {
        self.rank
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
    }
}

impl<S> std::fmt::Debug for StreamComm<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamComm")
            .field("rank", &self.rank)
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: ClientRank = ClientRank(0);
    const T: ClientTag = ClientTag(0);

    #[tokio::test]
    async fn test_duplex_transfer() {
        let (server, client) = StreamComm::duplex(64, ClientRank(4));
        assert_eq!(server.rank(), ClientRank(4));

        client.write_data(b"hello world", R, T).await.unwrap();
        let mut buf = [0u8; 11];
        server.read_data(&mut buf, R, T).await.unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[tokio::test]
    async fn test_read_exact_spans_small_buffer() {
        // The duplex buffer is smaller than the message, so the read has to
        // wait for several partial writes.
        let (server, client) = StreamComm::duplex(4, R);
        let writer = tokio::spawn(async move {
            client.write_data(&[7u8; 32], R, T).await.unwrap();
            client
        });
        let mut buf = [0u8; 32];
        server.read_data(&mut buf, R, T).await.unwrap();
        assert!(buf.iter().all(|b| *b == 7));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_is_connection_closed() {
        let (server, client) = StreamComm::duplex(64, R);
        client.close().await;
        let mut buf = [0u8; 4];
        let err = server.read_data(&mut buf, R, T).await.unwrap_err();
        assert!(matches!(err, NetError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_closed_comm_rejects_io() {
        let (server, _client) = StreamComm::duplex(64, R);
        server.close().await;
        assert!(server.is_closed());
        assert!(matches!(
            server.write_data(b"x", R, T).await,
            Err(NetError::ConnectionClosed)
        ));
    }
}
