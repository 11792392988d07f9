//! Optional pub/sub bridge.
//!
//! With a broker attached, opening or creating a file subscribes `path/#`
//! and closing it unsubscribes. Published messages carry file data; their
//! topic names the destination (see [`TopicKey`]).

mod bridge;
mod local;
mod topic;

pub use bridge::{apply_message, MqBridge, MqMessage};
pub use local::LocalBroker;
pub use topic::TopicKey;

#[derive(Debug, thiserror::Error)]
pub enum MqError {
    #[error("broker error: {0}")]
    Broker(String),
    #[error("message queue closed")]
    QueueClosed,
    #[error("cannot start workers: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Broker client used by the dispatcher.
pub trait PubSub: Send + Sync + 'static {
    fn subscribe(&self, topic: &str, qos: u8) -> Result<(), MqError>;

    fn unsubscribe(&self, topic: &str) -> Result<(), MqError>;
}

/// Topic covering every message published for `path`.
pub fn file_topic(path: &str) -> String {
    format!("{}/#", path)
}
