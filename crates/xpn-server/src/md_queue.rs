//! Per-path coalescing of file-size metadata updates.
//!
//! Many writers appending to the same file each report a new logical size.
//! Proposals for one path are folded into a single pending maximum, and at
//! most one read-modify-write of the stored size runs per path at a time.
//! A writer that finds another update in flight leaves its proposal behind
//! and returns; the active writer picks it up on its recheck.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use xpn_fs::FsResult;

struct Item {
    /// Highest size proposed since the last snapshot, `0` when none.
    in_queue: Mutex<u64>,
    writing: AtomicBool,
}

struct Slot {
    refs: usize,
    item: Arc<Item>,
}

#[derive(Default)]
pub struct FileSizeQueue {
    items: Mutex<HashMap<String, Slot>>,
}

impl FileSizeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose `size` for `path`.
    ///
    /// `persist` performs the read-modify-write for a snapshot of the pending
    /// maximum. It is never called concurrently for the same path, and never
    /// with the map or item lock held. A failed snapshot is dropped and its
    /// error returned to the writer, but proposals raised meanwhile are
    /// still persisted before the writer gives up the path.
    pub fn update<F>(&self, path: &str, size: u64, persist: F) -> FsResult<()>
    where
        F: FnMut(u64) -> FsResult<()>,
    {
        let item = self.acquire(path);
        let res = Self::drive(&item, size, persist);
        self.release(path);
        res
    }

    /// Paths with an update in progress.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.items.lock().contains_key(path)
    }

    fn acquire(&self, path: &str) -> Arc<Item> {
        let mut items = self.items.lock();
        let slot = items.entry(path.to_string()).or_insert_with(|| Slot {
            refs: 0,
            item: Arc::new(Item {
                in_queue: Mutex::new(0),
                writing: AtomicBool::new(false),
            }),
        });
        slot.refs += 1;
        Arc::clone(&slot.item)
    }

    fn release(&self, path: &str) {
        let mut items = self.items.lock();
        if let Some(slot) = items.get_mut(path) {
            slot.refs -= 1;
            if slot.refs == 0 {
                items.remove(path);
            }
        }
    }

    fn drive<F>(item: &Item, size: u64, mut persist: F) -> FsResult<()>
    where
        F: FnMut(u64) -> FsResult<()>,
    {
        {
            let mut pending = item.in_queue.lock();
            if size > *pending {
                *pending = size;
            }
        }

        let mut failed = None;
        loop {
            if item
                .writing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return failed.map_or(Ok(()), Err);
            }

            let target = std::mem::take(&mut *item.in_queue.lock());
            let res = if target > 0 { persist(target) } else { Ok(()) };

            // `writing` is cleared under the item lock so a proposal raised
            // after this point wins the flag itself.
            let again = {
                let pending = item.in_queue.lock();
                item.writing.store(false, Ordering::Release);
                *pending != 0
            };

            if let Err(errno) = res {
                tracing::warn!(size = target, %errno, retry = again, "file size update failed");
                failed.get_or_insert(errno);
            }
            if !again {
                return failed.map_or(Ok(()), Err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use xpn_types::Errno;

    /// Stored size plus instrumentation around each read-modify-write.
    #[derive(Default)]
    struct SizeStore {
        size: Mutex<u64>,
        writes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SizeStore {
        fn with_size(size: u64) -> Self {
            Self {
                size: Mutex::new(size),
                ..Default::default()
            }
        }

        fn persist(&self, target: u64, hold: impl FnOnce()) -> FsResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            hold();
            self.writes.fetch_add(1, Ordering::SeqCst);
            {
                let mut size = self.size.lock();
                if target > *size {
                    *size = target;
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_single_update_persists_and_cleans_up() {
        let queue = FileSizeQueue::new();
        let store = SizeStore::with_size(10);
        queue.update("/f", 42, |s| store.persist(s, || {})).unwrap();
        assert_eq!(*store.size.lock(), 42);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overlapping_proposals_are_coalesced() {
        const N: usize = 16;
        let queue = Arc::new(FileSizeQueue::new());
        let store = Arc::new(SizeStore::with_size(5));
        let returned = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(AtomicBool::new(true));
        let start = Arc::new(Barrier::new(N));

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let queue = Arc::clone(&queue);
                let store = Arc::clone(&store);
                let returned = Arc::clone(&returned);
                let first = Arc::clone(&first);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    let size = 100 + (i as u64 * 37) % 101;
                    queue
                        .update("/shared", size, |s| {
                            store.persist(s, || {
                                // Hold the first write until every other
                                // proposal has been handed over.
                                if first.swap(false, Ordering::SeqCst) {
                                    while returned.load(Ordering::SeqCst) < N - 1 {
                                        thread::sleep(Duration::from_millis(1));
                                    }
                                }
                            })
                        })
                        .unwrap();
                    returned.fetch_add(1, Ordering::SeqCst);
                    size
                })
            })
            .collect();

        let max = handles.into_iter().map(|h| h.join().unwrap()).max().unwrap();
        assert_eq!(*store.size.lock(), max.max(5));
        let writes = store.writes.load(Ordering::SeqCst);
        assert!(writes < N, "{writes} writes for {N} proposals");
        assert!(writes <= 2);
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_updates_never_overlap_per_path() {
        let queue = Arc::new(FileSizeQueue::new());
        let stores: Arc<Vec<SizeStore>> = Arc::new((0..3).map(|_| SizeStore::with_size(0)).collect());

        let handles: Vec<_> = (0..12)
            .map(|t| {
                let queue = Arc::clone(&queue);
                let stores = Arc::clone(&stores);
                thread::spawn(move || {
                    for round in 0..200u64 {
                        let idx = (t + round as usize) % 3;
                        let path = format!("/file{idx}");
                        let size = round * 13 + t as u64;
                        queue
                            .update(&path, size, |s| stores[idx].persist(s, thread::yield_now))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for store in stores.iter() {
            assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
        }
        let expected_max = 199 * 13 + 11;
        let max = stores.iter().map(|s| *s.size.lock()).max().unwrap();
        assert_eq!(max, expected_max);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_smaller_proposal_never_regresses() {
        let queue = FileSizeQueue::new();
        let store = SizeStore::with_size(0);
        queue.update("/f", 900, |s| store.persist(s, || {})).unwrap();
        queue.update("/f", 300, |s| store.persist(s, || {})).unwrap();
        assert_eq!(*store.size.lock(), 900);
    }

    #[test]
    fn test_proposal_survives_failed_write() {
        let queue = Arc::new(FileSizeQueue::new());
        let store = Arc::new(SizeStore::with_size(0));
        let entered = Arc::new(Barrier::new(2));
        let handed_over = Arc::new(AtomicBool::new(false));

        let writer = {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let entered = Arc::clone(&entered);
            let handed_over = Arc::clone(&handed_over);
            thread::spawn(move || {
                let mut calls = 0;
                queue.update("/f", 100, |s| {
                    calls += 1;
                    if calls == 1 {
                        entered.wait();
                        while !handed_over.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(1));
                        }
                        return Err(Errno::EIO);
                    }
                    store.persist(s, || {})
                })
            })
        };

        entered.wait();
        // The first write is in flight, so this proposal is left behind.
        queue
            .update("/f", 500, |_| panic!("second caller must not write"))
            .unwrap();
        handed_over.store(true, Ordering::SeqCst);

        assert_eq!(writer.join().unwrap(), Err(Errno::EIO));
        assert_eq!(*store.size.lock(), 500);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_persistent_error_terminates() {
        let queue = FileSizeQueue::new();
        let mut calls = 0;
        let res = queue.update("/f", 9, |_| {
            calls += 1;
            Err(Errno::EIO)
        });
        assert_eq!(res, Err(Errno::EIO));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_error_releases_writer_flag() {
        let queue = FileSizeQueue::new();
        let err = queue.update("/f", 7, |_| Err(Errno::EIO)).unwrap_err();
        assert_eq!(err, Errno::EIO);
        assert!(queue.is_empty());

        let store = SizeStore::with_size(0);
        queue.update("/f", 8, |s| store.persist(s, || {})).unwrap();
        assert_eq!(*store.size.lock(), 8);
    }
}
