//! Consumer worker logic
//!
//! Each consumer:
//! - Waits (bounded by the idle timeout) for the next page on the queue
//! - Invokes the page processor exactly once per dequeued page
//! - Isolates processor failures and panics from the rest of the pool
//! - Acknowledges every page it takes, whatever the outcome
//! - Stops at end of stream, on cancellation, or on idle timeout when the
//!   idle policy says so

use crate::config::{ConsumerConfig, FailurePolicy, IdlePolicy};
use crate::error::{PageOutcome, ProcessingError, Result, TraverseError};
use crate::store::Page;
use crate::traverse::processor::PageProcessor;
use crate::traverse::queue::{ConsumeGuard, Dequeued, PageQueueReceiver};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Statistics shared by all consumers of a traversal
#[derive(Debug, Default)]
pub struct ConsumerStats {
    /// Pages the processor accepted
    pub pages_processed: AtomicU64,

    /// Items on accepted pages
    pub items_processed: AtomicU64,

    /// Pages the processor failed on
    pub pages_failed: AtomicU64,

    /// Items on failed pages (dropped, never retried)
    pub items_dropped: AtomicU64,

    /// Consumers that stopped because of the idle timeout
    pub idle_exits: AtomicU64,
}

impl ConsumerStats {
    fn record_processed(&self, items: usize) {
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.items_processed.fetch_add(items as u64, Ordering::Relaxed);
    }

    fn record_failed(&self, items: usize) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
        self.items_dropped.fetch_add(items as u64, Ordering::Relaxed);
    }

    fn record_idle_exit(&self) {
        self.idle_exits.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a consumer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Producers finished and the queue was drained
    EndOfStream,

    /// Idle timeout elapsed under [`IdlePolicy::Exit`]
    IdleTimeout,
}

/// What a consumer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSummary {
    /// Consumer id
    pub consumer: usize,

    /// Pages processed successfully
    pub pages: u64,

    /// Pages dropped after a processing failure
    pub failures: u64,

    /// Reason the loop ended
    pub exit: ConsumerExit,
}

/// A consumer draining the page queue
pub struct ConsumerWorker {
    /// Consumer id
    id: usize,

    /// Queue reader
    receiver: PageQueueReceiver,

    /// Caller-supplied processor
    processor: Arc<dyn PageProcessor>,

    /// Timeouts and policies
    config: ConsumerConfig,

    /// Traversal-wide cancellation
    cancel: CancellationToken,

    /// Traversal-wide consumer statistics
    stats: Arc<ConsumerStats>,
}

impl ConsumerWorker {
    /// Create a consumer
    pub fn new(
        id: usize,
        receiver: PageQueueReceiver,
        processor: Arc<dyn PageProcessor>,
        config: ConsumerConfig,
        cancel: CancellationToken,
        stats: Arc<ConsumerStats>,
    ) -> Self {
        Self {
            id,
            receiver,
            processor,
            config,
            cancel,
            stats,
        }
    }

    /// Consumer id
    pub fn id(&self) -> usize {
        self.id
    }

    /// Main consumer loop
    pub async fn run(self) -> Result<ConsumerSummary> {
        let consumer = self.id;
        let mut pages = 0u64;
        let mut failures = 0u64;

        debug!(consumer, "Consumer starting");

        let exit = loop {
            // Next page, unless the traversal is cancelled first
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(consumer, "Consumer cancelled");
                    return Err(TraverseError::Cancelled);
                }
                next = self.receiver.get(self.config.idle_timeout) => next,
            };

            let page = match next {
                Dequeued::Page(page) => page,
                // All producers done and the queue is drained
                Dequeued::EndOfStream => break ConsumerExit::EndOfStream,
                // Nothing arrived within the idle timeout
                Dequeued::TimedOut => match self.config.idle_policy {
                    IdlePolicy::Exit => {
                        self.stats.record_idle_exit();
                        warn!(
                            consumer,
                            timeout_secs = self.config.idle_timeout.as_secs_f64(),
                            queue_depth = self.receiver.depth(),
                            "Consumer timeout, exiting"
                        );
                        break ConsumerExit::IdleTimeout;
                    }
                    IdlePolicy::Drain => {
                        debug!(consumer, "Consumer idle, waiting for producers");
                        continue;
                    }
                },
            };

            match self.dispatch(&page).await {
                PageOutcome::Processed { items } => {
                    pages += 1;
                    self.stats.record_processed(items);
                    trace!(consumer, segment = page.segment, sequence = page.sequence, items, "Page processed");
                }
                PageOutcome::Failed(error) => {
                    failures += 1;
                    self.stats.record_failed(error.items);
                    warn!(
                        consumer,
                        segment = error.segment,
                        sequence = error.sequence,
                        items = error.items,
                        error = %error.reason,
                        "Page processing failed, page dropped"
                    );

                    // Stop every producer and consumer
                    if self.config.failure_policy == FailurePolicy::Abort {
                        self.cancel.cancel();
                        return Err(TraverseError::Processing(error));
                    }
                }
            }
        };

        info!(consumer, pages, failures, exit = ?exit, "Consumer finished");

        Ok(ConsumerSummary {
            consumer,
            pages,
            failures,
            exit,
        })
    }

    /// Run the processor on one page, catching errors and panics
    async fn dispatch(&self, page: &Page) -> PageOutcome {
        // Acknowledged on drop, whatever happens below
        let _guard = ConsumeGuard::new(&self.receiver);

        let result = AssertUnwindSafe(self.processor.process(page))
            .catch_unwind()
            .await;

        // Errors and panics both become a dropped page
        let reason = match result {
            Ok(Ok(())) => return PageOutcome::Processed { items: page.len() },
            Ok(Err(e)) => format!("{:#}", e),
            Err(panic) => format!("processor panicked: {}", panic_message(panic.as_ref())),
        };

        PageOutcome::Failed(ProcessingError {
            consumer: self.id,
            segment: page.segment,
            sequence: page.sequence,
            items: page.len(),
            reason,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
