pub mod bounded_queue;
pub mod worker_pool;

pub use bounded_queue::{BoundedQueue, QueueClosed, TryPushError};
pub use worker_pool::WorkerPool;
