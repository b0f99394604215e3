//! Pending queue shared by the watcher, the backlog scanner, and the
//! uploader.
//!
//! An unbounded FIFO of absolute paths. `push` never blocks and never fails;
//! `pop` suspends until an item arrives. No deduplication is performed: the
//! same path may be queued more than once and each occurrence is processed
//! independently, which is safe because delivery is idempotent from the
//! relay's perspective.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

/// Unbounded FIFO of file paths awaiting upload.
#[derive(Debug)]
pub struct PendingQueue {
    tx: mpsc::UnboundedSender<PathBuf>,
    rx: Mutex<mpsc::UnboundedReceiver<PathBuf>>,
    depth: AtomicUsize,
}

impl PendingQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Enqueue a path at the back of the queue.
    pub fn push(&self, path: PathBuf) {
        // The queue owns its receiver half, so the channel cannot close
        // while `self` is alive.
        if self.tx.send(path).is_ok() {
            self.depth.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Dequeue the oldest path, suspending while the queue is empty.
    pub async fn pop(&self) -> PathBuf {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(path) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                path
            }
            // Unreachable: the sender half lives in `self`.
            None => std::future::pending().await,
        }
    }

    /// Best-effort queue depth, for observability only.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = PendingQueue::new();
        queue.push(PathBuf::from("/cache/a.ts"));
        queue.push(PathBuf::from("/cache/b.ts"));
        queue.push(PathBuf::from("/cache/c.m3u8"));

        assert_eq!(queue.pop().await, PathBuf::from("/cache/a.ts"));
        assert_eq!(queue.pop().await, PathBuf::from("/cache/b.ts"));
        assert_eq!(queue.pop().await, PathBuf::from("/cache/c.m3u8"));
    }

    #[tokio::test]
    async fn duplicates_are_kept() {
        let queue = PendingQueue::new();
        queue.push(PathBuf::from("/cache/a.ts"));
        queue.push(PathBuf::from("/cache/a.ts"));

        assert_eq!(queue.depth(), 2);
        assert_eq!(queue.pop().await, PathBuf::from("/cache/a.ts"));
        assert_eq!(queue.pop().await, PathBuf::from("/cache/a.ts"));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn pop_wakes_on_later_push() {
        let queue = Arc::new(PendingQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        // Give the consumer time to park on the empty queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(PathBuf::from("/cache/late.ts"));

        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should wake")
            .unwrap();
        assert_eq!(popped, PathBuf::from("/cache/late.ts"));
    }
}
