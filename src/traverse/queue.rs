//! Page queue with backpressure support
//!
//! This module provides the buffer between segment scanners and consumer
//! workers. When the queue is bounded and full, `put` suspends the calling
//! producer until a consumer makes room. An unbounded queue never suspends
//! producers and trades that for unbounded memory growth.
//!
//! End of stream is explicit: once every [`PageQueueSender`] (and the
//! [`PageQueue`] itself) has been dropped and the buffer is drained, `get`
//! returns [`Dequeued::EndOfStream`] to every consumer.

use crate::store::Page;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// Queue capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    /// At most this many pages are buffered (producers wait when full)
    Bounded(usize),

    /// No limit; producers never wait and memory use is unbounded
    Unbounded,
}

impl fmt::Display for QueueCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueCapacity::Bounded(n) => write!(f, "{}", n),
            QueueCapacity::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Every receiver has been dropped; the page could not be delivered
#[derive(Error, Debug)]
#[error("Page queue closed: no consumers remain")]
pub struct QueueClosed(pub Page);

/// Result of waiting for a page
#[derive(Debug)]
pub enum Dequeued {
    /// A page is ready for processing
    Page(Page),

    /// All producers are finished and the queue is drained
    EndOfStream,

    /// Nothing arrived within the wait timeout
    TimedOut,
}

/// Statistics for the page queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total pages enqueued
    pub enqueued: AtomicU64,

    /// Total pages dequeued
    pub dequeued: AtomicU64,

    /// Pages whose processing attempt has finished (success or failure)
    pub acknowledged: AtomicU64,

    /// Number of times a producer found the queue full
    pub backpressure_events: AtomicU64,

    /// Largest depth observed
    pub high_water: AtomicU64,
}

impl QueueStats {
    /// Pages currently buffered
    pub fn depth(&self) -> u64 {
        self.enqueued
            .load(Ordering::Acquire)
            .saturating_sub(self.dequeued.load(Ordering::Acquire))
    }

    /// Get queue throughput (dequeued pages)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Get acknowledged page count
    pub fn acknowledged_count(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    /// Get backpressure event count
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }

    /// Get the high-water mark
    pub fn high_water_mark(&self) -> u64 {
        self.high_water.load(Ordering::Relaxed)
    }
}

enum Tx {
    Bounded(mpsc::Sender<Page>),
    Unbounded(mpsc::UnboundedSender<Page>),
}

impl Clone for Tx {
    fn clone(&self) -> Self {
        match self {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        }
    }
}

enum Rx {
    Bounded(mpsc::Receiver<Page>),
    Unbounded(mpsc::UnboundedReceiver<Page>),
}

impl Rx {
    async fn recv(&mut self) -> Option<Page> {
        match self {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Multi-producer, multi-consumer page queue
pub struct PageQueue {
    /// Writer handle owned by the queue itself
    sender: Tx,

    /// Shared reader
    receiver: Arc<Mutex<Rx>>,

    /// Queue capacity
    capacity: QueueCapacity,

    /// Number of consumers currently processing a page
    active_consumers: Arc<AtomicUsize>,

    /// Queue statistics
    stats: Arc<QueueStats>,
}

impl PageQueue {
    /// Create a new page queue
    ///
    /// A bounded capacity of zero is raised to one.
    pub fn new(capacity: QueueCapacity) -> Self {
        let (sender, receiver) = match capacity {
            QueueCapacity::Bounded(n) => {
                let (tx, rx) = mpsc::channel(n.max(1));
                (Tx::Bounded(tx), Rx::Bounded(rx))
            }
            QueueCapacity::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Tx::Unbounded(tx), Rx::Unbounded(rx))
            }
        };

        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
            active_consumers: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a sender for this queue (one per producer)
    pub fn sender(&self) -> PageQueueSender {
        PageQueueSender {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get a receiver for this queue (one per consumer)
    pub fn receiver(&self) -> PageQueueReceiver {
        PageQueueReceiver {
            receiver: Arc::clone(&self.receiver),
            active_consumers: Arc::clone(&self.active_consumers),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Get the active consumer counter
    pub fn active_consumers(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_consumers)
    }

    /// Get queue capacity
    pub fn capacity(&self) -> QueueCapacity {
        self.capacity
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.stats.depth() as usize
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for putting pages on the queue
#[derive(Clone)]
pub struct PageQueueSender {
    sender: Tx,
    stats: Arc<QueueStats>,
}

impl PageQueueSender {
    /// Put a page on the queue, suspending while a bounded queue is full
    pub async fn put(&self, page: Page) -> Result<(), QueueClosed> {
        match &self.sender {
            Tx::Bounded(tx) => match tx.try_send(page) {
                Ok(()) => {}
                Err(TrySendError::Full(page)) => {
                    self.stats.backpressure_events.fetch_add(1, Ordering::Relaxed);
                    tx.send(page).await.map_err(|e| QueueClosed(e.0))?;
                }
                Err(TrySendError::Closed(page)) => return Err(QueueClosed(page)),
            },
            Tx::Unbounded(tx) => tx.send(page).map_err(|e| QueueClosed(e.0))?,
        }

        self.record_enqueue();
        Ok(())
    }

    /// Pages currently buffered
    pub fn depth(&self) -> u64 {
        self.stats.depth()
    }

    fn record_enqueue(&self) {
        let enqueued = self.stats.enqueued.fetch_add(1, Ordering::AcqRel) + 1;
        let depth = enqueued.saturating_sub(self.stats.dequeued.load(Ordering::Acquire));
        self.stats.high_water.fetch_max(depth, Ordering::Relaxed);
    }
}

/// Handle for taking pages off the queue
#[derive(Clone)]
pub struct PageQueueReceiver {
    receiver: Arc<Mutex<Rx>>,
    active_consumers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

impl PageQueueReceiver {
    /// Wait up to `timeout` for the next page
    ///
    /// Cancel-safe: dropping the future never loses a page.
    pub async fn get(&self, timeout: Duration) -> Dequeued {
        let recv = async { self.receiver.lock().await.recv().await };

        match tokio::time::timeout(timeout, recv).await {
            Ok(Some(page)) => {
                self.stats.dequeued.fetch_add(1, Ordering::AcqRel);
                Dequeued::Page(page)
            }
            Ok(None) => Dequeued::EndOfStream,
            Err(_) => Dequeued::TimedOut,
        }
    }

    /// Mark this consumer as processing a page
    pub fn begin_work(&self) {
        self.active_consumers.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark the current page as consumed
    pub fn end_work(&self) {
        self.active_consumers.fetch_sub(1, Ordering::SeqCst);
        self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    /// Pages currently buffered
    pub fn depth(&self) -> u64 {
        self.stats.depth()
    }
}

/// RAII guard covering one processing attempt
///
/// Dropping the guard acknowledges the page, whether the attempt succeeded,
/// failed or panicked.
pub struct ConsumeGuard<'a> {
    receiver: &'a PageQueueReceiver,
}

impl<'a> ConsumeGuard<'a> {
    /// Create a new consume guard (marks consumer as active)
    pub fn new(receiver: &'a PageQueueReceiver) -> Self {
        receiver.begin_work();
        Self { receiver }
    }
}

impl<'a> Drop for ConsumeGuard<'a> {
    fn drop(&mut self) {
        self.receiver.end_work();
    }
}
