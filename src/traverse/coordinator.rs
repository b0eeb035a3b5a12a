//! Traversal coordinator - wires producers, queue and consumers together
//!
//! One producer task per segment and one consumer task per worker run on the
//! tokio runtime inside a single `JoinSet`. The coordinator gives away all of
//! its queue handles once the tasks are spawned, so the stream ends by itself
//! when the last producer finishes. The first fatal error cancels every
//! sibling task.

use crate::config::TraversalConfig;
use crate::error::{Result, TraverseError};
use crate::store::TableStore;
use crate::traverse::consumer::{ConsumerStats, ConsumerSummary, ConsumerWorker};
use crate::traverse::processor::PageProcessor;
use crate::traverse::producer::{ProducerStats, SegmentScanner, SegmentSummary};
use crate::traverse::queue::{PageQueue, QueueStats};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a traversal
#[derive(Debug, Clone)]
pub struct TraversalReport {
    /// Unique id of this run
    pub run_id: Uuid,

    /// Wall-clock start
    pub started_at: DateTime<Utc>,

    /// Total run time
    pub duration: Duration,

    /// Number of segments scanned
    pub segments: usize,

    /// Pages put on the queue
    pub pages_produced: u64,

    /// Items put on the queue
    pub items_produced: u64,

    /// Pages the processor accepted
    pub pages_processed: u64,

    /// Pages dropped after a processing failure
    pub pages_failed: u64,

    /// Items on dropped pages
    pub items_dropped: u64,

    /// Pages enqueued but never dequeued
    pub pages_unprocessed: u64,

    /// False if the traversal was cancelled or left pages unprocessed
    pub completed: bool,
}

impl TraversalReport {
    /// Items processed per second over the whole run
    pub fn items_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.items_produced.saturating_sub(self.items_dropped) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Point-in-time view of a running traversal
#[derive(Debug, Clone)]
pub struct TraversalProgress {
    /// Pages put on the queue
    pub pages_produced: u64,

    /// Items put on the queue
    pub items_produced: u64,

    /// Pages processed successfully
    pub pages_processed: u64,

    /// Items processed successfully
    pub items_processed: u64,

    /// Pages dropped
    pub pages_failed: u64,

    /// Segments fully scanned
    pub segments_completed: u64,

    /// Total segments
    pub segments: usize,

    /// Pages waiting in the queue
    pub queue_depth: u64,

    /// Consumers currently running the processor
    pub active_consumers: usize,

    /// Total consumers
    pub total_consumers: usize,

    /// Time since the traversal started
    pub elapsed: Duration,
}

impl TraversalProgress {
    /// Items processed per second
    pub fn items_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.items_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Pages processed per second
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.pages_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Read-only handle for observing a traversal from another task
#[derive(Clone)]
pub struct TraversalProbe {
    producer_stats: Arc<ProducerStats>,
    consumer_stats: Arc<ConsumerStats>,
    queue_stats: Arc<QueueStats>,
    active_consumers: Arc<AtomicUsize>,
    started: Arc<OnceLock<Instant>>,
    segments: usize,
    workers: usize,
}

impl TraversalProbe {
    /// Take a snapshot of the counters
    pub fn snapshot(&self) -> TraversalProgress {
        TraversalProgress {
            pages_produced: self.producer_stats.pages_produced.load(Ordering::Relaxed),
            items_produced: self.producer_stats.items_produced.load(Ordering::Relaxed),
            pages_processed: self.consumer_stats.pages_processed.load(Ordering::Relaxed),
            items_processed: self.consumer_stats.items_processed.load(Ordering::Relaxed),
            pages_failed: self.consumer_stats.pages_failed.load(Ordering::Relaxed),
            segments_completed: self.producer_stats.segments_completed.load(Ordering::Relaxed),
            segments: self.segments,
            queue_depth: self.queue_stats.depth(),
            active_consumers: self.active_consumers.load(Ordering::Relaxed),
            total_consumers: self.workers,
            elapsed: self.started.get().map(Instant::elapsed).unwrap_or_default(),
        }
    }
}

/// What a finished task did
enum TaskSummary {
    Producer(SegmentSummary),
    Consumer(ConsumerSummary),
}

/// Parallel table traversal coordinator
pub struct TraversalCoordinator {
    config: Arc<TraversalConfig>,
    store: Arc<dyn TableStore>,
    processor: Arc<dyn PageProcessor>,
    queue: PageQueue,
    cancel: CancellationToken,
    producer_stats: Arc<ProducerStats>,
    consumer_stats: Arc<ConsumerStats>,
    started: Arc<OnceLock<Instant>>,
}

impl TraversalCoordinator {
    /// Create a coordinator
    ///
    /// The configuration is validated here, before any store request.
    pub fn new(
        store: Arc<dyn TableStore>,
        config: TraversalConfig,
        processor: Arc<dyn PageProcessor>,
    ) -> Result<Self> {
        config.validate()?;
        let queue = PageQueue::new(config.queue_capacity);

        Ok(Self {
            config: Arc::new(config),
            store,
            processor,
            queue,
            cancel: CancellationToken::new(),
            producer_stats: Arc::new(ProducerStats::default()),
            consumer_stats: Arc::new(ConsumerStats::default()),
            started: Arc::new(OnceLock::new()),
        })
    }

    /// Token that cancels the traversal (for signal handlers)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle for progress reporting
    pub fn progress_probe(&self) -> TraversalProbe {
        TraversalProbe {
            producer_stats: Arc::clone(&self.producer_stats),
            consumer_stats: Arc::clone(&self.consumer_stats),
            queue_stats: self.queue.stats(),
            active_consumers: self.queue.active_consumers(),
            started: Arc::clone(&self.started),
            segments: self.config.producer.segments,
            workers: self.config.consumer.workers,
        }
    }

    /// Run the traversal to completion
    ///
    /// Returns the report when every producer finished (or the traversal was
    /// cancelled from outside), or the first fatal error otherwise.
    pub async fn run(self) -> Result<TraversalReport> {
        let Self {
            config,
            store,
            processor,
            queue,
            cancel,
            producer_stats,
            consumer_stats,
            started,
        } = self;

        // Probes report elapsed time from here
        let start_time = *started.get_or_init(Instant::now);
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let segments = config.producer.segments;
        let workers = config.consumer.workers;

        info!(
            %run_id,
            table = config.producer.table.as_deref().unwrap_or_default(),
            mode = %config.producer.mode,
            segments,
            workers,
            queue = %queue.capacity(),
            "Starting traversal"
        );

        // Build every producer first so a bad config fails before any request
        let scanners = (0..segments)
            .map(|segment| {
                SegmentScanner::new(
                    segment,
                    &config.producer,
                    Arc::clone(&store),
                    queue.sender(),
                    cancel.clone(),
                    Arc::clone(&producer_stats),
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tasks = JoinSet::new();

        // Consumers first so pages are taken as soon as they arrive
        for consumer in 0..workers {
            let worker = ConsumerWorker::new(
                consumer,
                queue.receiver(),
                Arc::clone(&processor),
                config.consumer.clone(),
                cancel.clone(),
                Arc::clone(&consumer_stats),
            );
            tasks.spawn(async move { worker.run().await.map(TaskSummary::Consumer) });
        }

        // One producer per segment
        for scanner in scanners {
            tasks.spawn(async move { scanner.run().await.map(TaskSummary::Producer) });
        }

        let queue_stats = queue.stats();
        // Producers and consumers now hold the only queue handles
        drop(queue);

        let mut first_error: Option<TraverseError> = None;

        // Wait for every task; the first fatal error cancels the rest
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| TraverseError::TaskFailed {
                    task: "traversal task".to_string(),
                    reason: e.to_string(),
                })
                .and_then(|result| result);

            match outcome {
                Ok(TaskSummary::Producer(summary)) => {
                    debug!(segment = summary.segment, pages = summary.pages, "Producer done");
                }
                Ok(TaskSummary::Consumer(summary)) => {
                    debug!(
                        consumer = summary.consumer,
                        pages = summary.pages,
                        failures = summary.failures,
                        "Consumer done"
                    );
                }
                // Siblings stopped by the token
                Err(e) if e.is_cancellation() => {}
                Err(e) => {
                    if first_error.is_none() {
                        error!(error = %e, "Traversal task failed, cancelling remaining tasks");
                        cancel.cancel();
                        first_error = Some(e);
                    } else {
                        debug!(error = %e, "Further task failure");
                    }
                }
            }
        }

        // Pages still buffered were never handed to a consumer
        let pages_unprocessed = queue_stats.depth();
        if pages_unprocessed > 0 {
            warn!(pages = pages_unprocessed, "Pages left in the queue were never processed");
        }

        let report = TraversalReport {
            run_id,
            started_at,
            duration: start_time.elapsed(),
            segments,
            pages_produced: producer_stats.pages_produced.load(Ordering::Relaxed),
            items_produced: producer_stats.items_produced.load(Ordering::Relaxed),
            pages_processed: consumer_stats.pages_processed.load(Ordering::Relaxed),
            pages_failed: consumer_stats.pages_failed.load(Ordering::Relaxed),
            items_dropped: consumer_stats.items_dropped.load(Ordering::Relaxed),
            pages_unprocessed,
            completed: traversal_completed(
                first_error.is_some(),
                cancel.is_cancelled(),
                pages_unprocessed,
            ),
        };

        info!(
            %run_id,
            pages = report.pages_produced,
            items = report.items_produced,
            failed = report.pages_failed,
            unprocessed = report.pages_unprocessed,
            completed = report.completed,
            duration_secs = report.duration.as_secs_f64(),
            "Traverse complete"
        );

        // Fatal errors win over the report
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// A traversal is complete only if nothing failed, nothing cancelled it and
/// every enqueued page was dequeued
fn traversal_completed(failed: bool, cancelled: bool, pages_unprocessed: u64) -> bool {
    !failed && !cancelled && pages_unprocessed == 0
}
