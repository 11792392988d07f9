use std::sync::Arc;

use bytes::Bytes;
use xpn_fs::flags::{O_CREAT, O_WRONLY};
use xpn_fs::{Filesystem, FsResult};
use xpn_proto::MAX_BUFFER_SIZE;
use xpn_utils::WorkerPool;

use super::{MqError, TopicKey};
use crate::config::MqConfig;

/// An inbound publication waiting for a writer thread.
#[derive(Debug, Clone)]
pub struct MqMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Write one publication to the file its topic names.
///
/// At most `MAX_BUFFER_SIZE` bytes are written, starting at the topic's
/// offset. Returns the number of bytes written.
pub fn apply_message(fs: &dyn Filesystem, msg: &MqMessage) -> FsResult<usize> {
    let key = TopicKey::parse(&msg.topic);
    let len = msg.payload.len();
    let want = match key.length {
        0 => len,
        n => len.min(n as usize),
    }
    .min(MAX_BUFFER_SIZE);

    let fd = fs.open(&key.path, O_WRONLY | O_CREAT, 0o700)?;
    let res = fs.pwrite_full(fd, &msg.payload[..want], key.offset);
    if let Err(errno) = fs.close(fd) {
        tracing::debug!(path = %key.path, %errno, "close after publication failed");
    }
    res.map_err(|partial| partial.errno)
}

/// Hands broker callbacks over to a pool of disk writers.
///
/// `on_message` blocks while the queue is full, which pushes back on the
/// broker's delivery thread instead of buffering without bound.
pub struct MqBridge {
    pool: WorkerPool<MqMessage>,
    qos: u8,
}

impl MqBridge {
    pub fn new(fs: Arc<dyn Filesystem>, config: &MqConfig) -> Result<Self, MqError> {
        let pool = WorkerPool::new(
            "xpn-mq",
            config.workers,
            config.queue_capacity,
            move |msg: MqMessage| match apply_message(fs.as_ref(), &msg) {
                Ok(written) => tracing::trace!(topic = %msg.topic, written, "publication stored"),
                Err(errno) => tracing::warn!(topic = %msg.topic, %errno, "publication dropped"),
            },
        )?;
        tracing::info!(
            workers = pool.workers(),
            capacity = config.queue_capacity,
            "pub/sub bridge started"
        );
        Ok(Self {
            pool,
            qos: config.qos,
        })
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }

    /// Queue a publication received from the broker.
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> Result<(), MqError> {
        self.pool
            .submit(MqMessage {
                topic: topic.to_string(),
                payload: Bytes::copy_from_slice(payload),
            })
            .map_err(|_| MqError::QueueClosed)
    }

    pub fn pending(&self) -> usize {
        self.pool.queue().len()
    }

    /// Stop accepting publications. Writers finish what is queued and exit.
    pub fn close(&self) {
        self.pool.queue().close();
    }

    /// Write out everything queued and stop the writers.
    pub fn shutdown(self) {
        self.pool.shutdown();
        tracing::info!("pub/sub bridge stopped");
    }
}
