use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bounded_queue::{BoundedQueue, QueueClosed};

/// A fixed set of OS threads draining one shared [`BoundedQueue`].
///
/// Every submitted item is handled by exactly one worker. `shutdown` closes
/// the queue, lets the workers drain what is already queued, and joins them.
pub struct WorkerPool<T: Send + 'static> {
    name: String,
    queue: Arc<BoundedQueue<T>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new<F>(
        name: impl Into<String>,
        workers: usize,
        capacity: usize,
        handler: F,
    ) -> std::io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let queue = Arc::new(BoundedQueue::new(capacity));
        let handler = Arc::new(handler);
        let mut pool = Self {
            name,
            queue,
            handles: Vec::with_capacity(workers),
        };

        for i in 0..workers.max(1) {
            let queue = Arc::clone(&pool.queue);
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", pool.name, i))
                .spawn(move || {
                    while let Some(item) = queue.pop() {
                        handler(item);
                    }
                });
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    // Tear down the workers already started.
                    pool.stop();
                    return Err(e);
                }
            }
        }

        tracing::debug!(pool = %pool.name, workers = pool.handles.len(), capacity, "worker pool started");
        Ok(pool)
    }

    /// Enqueue an item, blocking while the queue is full.
    pub fn submit(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.queue.push(item)
    }

    pub fn queue(&self) -> &Arc<BoundedQueue<T>> {
        &self.queue
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue, drain it and join every worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!(pool = %self.name, "worker thread panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
        }
    }
}
