//! Request dispatch and the per-operation handlers.
//!
//! Every handler that answers at all sends exactly one reply struct, on
//! success and on failure alike; read additionally streams data after each
//! reply header. Backing-store failures travel in the reply's status, while
//! transport failures end the handler with a [`NetError`].

mod dir;
mod file;
mod mdata;

use std::sync::Arc;

use xpn_fs::Filesystem;
use xpn_net::{write_struct, Comm, Envelope, NetError};
use xpn_proto::{Request, WireStruct, MAX_BUFFER_SIZE};
use xpn_types::{ClientRank, ClientTag};

use crate::md_queue::FileSizeQueue;
use crate::mq::{file_topic, PubSub};
use crate::session::ConnectionSession;

pub use mdata::persist_file_size;

/// What the connection loop should do after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The client is done with this connection.
    Disconnect,
    /// The client asked the whole server to stop.
    Finalize,
}

/// Reply routing for one request.
pub(crate) struct Reply<'a, C: ?Sized> {
    comm: &'a C,
    rank: ClientRank,
    tag: ClientTag,
}

impl<'a, C: Comm + ?Sized> Reply<'a, C> {
    async fn send<T: WireStruct + Sync>(&self, value: &T) -> Result<(), NetError> {
        write_struct(self.comm, value, self.rank, self.tag).await
    }

    async fn send_raw(&self, data: &[u8]) -> Result<(), NetError> {
        self.comm.write_data(data, self.rank, self.tag).await
    }

    async fn recv_raw(&self, buf: &mut [u8]) -> Result<(), NetError> {
        self.comm.read_data(buf, self.rank, self.tag).await
    }
}

/// Shared, per-server handler state.
pub struct Dispatcher {
    fs: Arc<dyn Filesystem>,
    md_queue: Arc<FileSizeQueue>,
    pubsub: Option<Arc<dyn PubSub>>,
    qos: u8,
    max_buffer_size: usize,
}

impl Dispatcher {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            fs,
            md_queue: Arc::new(FileSizeQueue::new()),
            pubsub: None,
            qos: 0,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }

    /// Subscribe opened files on `pubsub`.
    pub fn with_pubsub(mut self, pubsub: Arc<dyn PubSub>, qos: u8) -> Self {
        self.pubsub = Some(pubsub);
        self.qos = qos;
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size.clamp(1, MAX_BUFFER_SIZE);
        self
    }

    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    pub fn md_queue(&self) -> &Arc<FileSizeQueue> {
        &self.md_queue
    }

    /// Decode and execute one request.
    ///
    /// Malformed requests are logged and dropped without a reply.
    pub async fn dispatch<C: Comm + ?Sized>(
        &self,
        comm: &C,
        session: &mut ConnectionSession,
        env: Envelope,
    ) -> Result<Flow, NetError> {
        let rank = env.rank;
        let tag = env.tag();
        let req = match Request::decode(env.header.op, &env.payload) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(%rank, %tag, op = env.header.op, error = %e, "dropping malformed request");
                return Ok(Flow::Continue);
            }
        };
        tracing::debug!(%rank, %tag, op = %req.op(), "dispatch");

        let reply = Reply { comm, rank, tag };
        match req {
            Request::Open(r) => self.open(&reply, session, r).await?,
            Request::Creat(r) => self.creat(&reply, r).await?,
            Request::Read(r) => self.read(&reply, session, r).await?,
            Request::Write(r) => self.write(&reply, session, r).await?,
            Request::Close(r) => self.close(&reply, session, r).await?,
            Request::Rm(r) => self.rm(&reply, r).await?,
            Request::RmAsync(r) => self.rm_async(r),
            Request::Rename(r) => self.rename(&reply, r).await?,
            Request::GetAttr(r) => self.getattr(&reply, r).await?,
            Request::SetAttr(r) => self.setattr(&reply, r).await?,
            Request::Mkdir(r) => self.mkdir(&reply, r).await?,
            Request::Rmdir(r) => self.rmdir(&reply, r).await?,
            Request::RmdirAsync(r) => self.rmdir_async(r),
            Request::Opendir(r) => self.opendir(&reply, session, r).await?,
            Request::Readdir(r) => self.readdir(&reply, session, r).await?,
            Request::Closedir(r) => self.closedir(&reply, session, r).await?,
            Request::Statvfs(r) => self.statvfs(&reply, r).await?,
            Request::ReadMdata(r) => self.read_mdata(&reply, r).await?,
            Request::WriteMdata(r) => self.write_mdata(&reply, r).await?,
            Request::WriteMdataFileSize(r) => self.write_mdata_file_size(r),
            Request::Finalize => return Ok(Flow::Finalize),
            Request::Disconnect => return Ok(Flow::Disconnect),
            Request::End => tracing::debug!(%rank, %tag, "end marker ignored"),
        }
        Ok(Flow::Continue)
    }

    fn subscribe(&self, path: &str) {
        if let Some(pubsub) = &self.pubsub {
            if let Err(e) = pubsub.subscribe(&file_topic(path), self.qos) {
                tracing::warn!(%path, error = %e, "subscribe failed");
            }
        }
    }

    fn unsubscribe(&self, path: &str) {
        if let Some(pubsub) = &self.pubsub {
            for topic in [file_topic(path), path.to_string()] {
                if let Err(e) = pubsub.unsubscribe(&topic) {
                    tracing::warn!(%topic, error = %e, "unsubscribe failed");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Drive a dispatcher over an in-memory stream.

    use super::*;
    use parking_lot::Mutex;
    use tokio::io::DuplexStream;
    use xpn_fs::MemFilesystem;
    use xpn_net::{read_envelope, read_struct, StreamComm};

    use crate::mq::MqError;

    pub const RANK: ClientRank = ClientRank(3);
    pub const TAG: ClientTag = ClientTag(11);

    pub struct Harness {
        pub fs: Arc<MemFilesystem>,
        pub dispatcher: Dispatcher,
        pub session: ConnectionSession,
        pub server: StreamComm<DuplexStream>,
        pub client: StreamComm<DuplexStream>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_fs(MemFilesystem::new())
        }

        pub fn with_fs(fs: MemFilesystem) -> Self {
            let fs = Arc::new(fs);
            let (server, client) = StreamComm::duplex(4 << 20, RANK);
            Self {
                dispatcher: Dispatcher::new(fs.clone()),
                fs,
                session: ConnectionSession::new(),
                server,
                client,
            }
        }

        /// Send `req` and run it through the dispatcher.
        pub async fn run(&mut self, req: &Request) -> Flow {
            self.run_with_data(req, &[]).await
        }

        /// Send `req` followed by `data` (write payload) and dispatch it.
        pub async fn run_with_data(&mut self, req: &Request, data: &[u8]) -> Flow {
            self.client.write_data(&req.to_frame(TAG), RANK, TAG).await.unwrap();
            if !data.is_empty() {
                self.client.write_data(data, RANK, TAG).await.unwrap();
            }
            let env = read_envelope(&self.server).await.unwrap();
            self.dispatcher
                .dispatch(&self.server, &mut self.session, env)
                .await
                .unwrap()
        }

        pub async fn recv<T: WireStruct>(&self) -> T {
            read_struct(&self.client, RANK, TAG).await.unwrap()
        }

        pub async fn recv_bytes(&self, len: usize) -> Vec<u8> {
            let mut buf = vec![0u8; len];
            self.client.read_data(&mut buf, RANK, TAG).await.unwrap();
            buf
        }

        /// True when the server has written nothing further.
        pub async fn nothing_pending(&self) -> bool {
            let mut byte = [0u8; 1];
            tokio::time::timeout(
                std::time::Duration::from_millis(50),
                self.client.read_data(&mut byte, RANK, TAG),
            )
            .await
            .is_err()
        }
    }

    /// Records every subscription change.
    #[derive(Default)]
    pub struct RecordingPubSub {
        pub events: Mutex<Vec<String>>,
    }

    impl PubSub for RecordingPubSub {
        fn subscribe(&self, topic: &str, qos: u8) -> Result<(), MqError> {
            self.events.lock().push(format!("sub {} q{}", topic, qos));
            Ok(())
        }

        fn unsubscribe(&self, topic: &str) -> Result<(), MqError> {
            self.events.lock().push(format!("unsub {}", topic));
            Ok(())
        }
    }
}
