//! Segment scanner (producer) logic
//!
//! Each scanner:
//! - Owns one segment of the table and that segment's cursor
//! - Requests pages from the store, chaining cursors until none is returned
//! - Puts every page on the queue, waiting while the queue is full
//! - Stops at the first store error (no retries) or on cancellation

use crate::config::{ProducerConfig, ScanMode};
use crate::error::{ConfigError, Result, StoreResult, TraverseError};
use crate::store::{Cursor, Page, QueryRequest, ScanRequest, TableStore};
use crate::traverse::queue::PageQueueSender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Statistics shared by all producers of a traversal
#[derive(Debug, Default)]
pub struct ProducerStats {
    /// Pages put on the queue
    pub pages_produced: AtomicU64,

    /// Items put on the queue
    pub items_produced: AtomicU64,

    /// Segments fully drained
    pub segments_completed: AtomicU64,
}

impl ProducerStats {
    fn record_page(&self, items: usize) {
        self.pages_produced.fetch_add(1, Ordering::Relaxed);
        self.items_produced.fetch_add(items as u64, Ordering::Relaxed);
    }

    fn record_segment(&self) {
        self.segments_completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a producer did for its segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    /// Segment id
    pub segment: usize,

    /// Pages fetched and enqueued
    pub pages: u64,

    /// Items fetched and enqueued
    pub items: u64,
}

/// Request template for one segment; only the cursor changes between pages
#[derive(Debug, Clone)]
enum PageRequest {
    Scan(ScanRequest),
    Query(QueryRequest),
}

impl PageRequest {
    fn from_config(
        config: &ProducerConfig,
        segment: usize,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let table = config.table_name()?;

        let request = match &config.mode {
            ScanMode::Scan { index_name } => PageRequest::Scan(
                ScanRequest::new(table, segment, config.segments)?
                    .index(index_name.clone())
                    .limit(config.batch_size),
            ),
            ScanMode::PartitionKey { key_name, key_value } => PageRequest::Query(
                QueryRequest::partition_key(table, key_name, key_value)?.limit(config.batch_size),
            ),
            ScanMode::Index {
                index_name,
                key_name,
                key_value,
            } => PageRequest::Query(
                QueryRequest::index(table, index_name, key_name, key_value)?
                    .limit(config.batch_size),
            ),
        };

        Ok(request)
    }

    async fn send(&self, store: &dyn TableStore, cursor: Option<Cursor>) -> StoreResult<Page> {
        match self {
            PageRequest::Scan(template) => store.scan_segment(template.clone().cursor(cursor)).await,
            PageRequest::Query(template) => store.query(template.clone().cursor(cursor)).await,
        }
    }
}

/// Producer for one table segment
pub struct SegmentScanner {
    /// Segment id
    segment: usize,

    /// Request template
    request: PageRequest,

    /// Shared store handle
    store: Arc<dyn TableStore>,

    /// Queue writer
    sender: PageQueueSender,

    /// Traversal-wide cancellation
    cancel: CancellationToken,

    /// Traversal-wide producer statistics
    stats: Arc<ProducerStats>,
}

impl SegmentScanner {
    /// Create a scanner for `segment`
    ///
    /// Fails with a `ConfigError` if the configuration cannot produce a valid
    /// request; no store call is made in that case.
    pub fn new(
        segment: usize,
        config: &ProducerConfig,
        store: Arc<dyn TableStore>,
        sender: PageQueueSender,
        cancel: CancellationToken,
        stats: Arc<ProducerStats>,
    ) -> std::result::Result<Self, ConfigError> {
        let request = PageRequest::from_config(config, segment)?;

        Ok(Self {
            segment,
            request,
            store,
            sender,
            cancel,
            stats,
        })
    }

    /// Segment id
    pub fn segment(&self) -> usize {
        self.segment
    }

    /// Page through the segment until the store returns no cursor
    pub async fn run(self) -> Result<SegmentSummary> {
        let segment = self.segment;
        let mut cursor: Option<Cursor> = None;
        let mut iteration: u64 = 0;
        let mut total: u64 = 0;

        debug!(segment, "Producer starting");

        loop {
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(segment, iteration, "Producer cancelled before request");
                    return Err(TraverseError::Cancelled);
                }
                result = self.request.send(self.store.as_ref(), cursor.take()) => {
                    result.map_err(|source| {
                        warn!(segment, iteration, error = %source, "Store request failed");
                        TraverseError::Store { segment, source }
                    })?
                }
            };

            iteration += 1;
            total += page.count as u64;
            let items = page.items.len();
            let next_cursor = page.next_cursor.clone();
            let page = page.with_origin(segment, iteration);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(segment, iteration, "Producer cancelled while enqueueing");
                    return Err(TraverseError::Cancelled);
                }
                result = self.sender.put(page) => {
                    result.map_err(|_| TraverseError::ConsumersGone { segment })?;
                }
            }

            self.stats.record_page(items);

            info!(
                segment,
                items,
                iteration,
                total,
                queue_depth = self.sender.depth(),
                "Producer fetched page"
            );

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        self.stats.record_segment();
        info!(segment, pages = iteration, items = total, "Producer fetched segment");

        Ok(SegmentSummary {
            segment,
            pages: iteration,
            items: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::Item;
    use crate::traverse::queue::{Dequeued, PageQueue, QueueCapacity};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Store returning a fixed cursor chain for every segment
    struct ChainStore {
        cursors: Vec<Option<&'static str>>,
        seen: Mutex<Vec<(usize, Option<Cursor>)>>,
        fail_at: Option<usize>,
    }

    impl ChainStore {
        fn new(cursors: Vec<Option<&'static str>>) -> Self {
            Self {
                cursors,
                seen: Mutex::new(Vec::new()),
                fail_at: None,
            }
        }
    }

    #[async_trait]
    impl TableStore for ChainStore {
        async fn scan_segment(&self, request: ScanRequest) -> StoreResult<Page> {
            let call = {
                let mut seen = self.seen.lock();
                seen.push((request.segment, request.cursor.clone()));
                seen.len() - 1
            };

            if self.fail_at == Some(call) {
                return Err(StoreError::Throttled {
                    table: request.table,
                    reason: "slow down".into(),
                });
            }

            let mut item = Item::new();
            item.insert("call".into(), json!(call));
            Ok(Page::new(
                vec![item],
                self.cursors[call].map(Cursor::new),
            ))
        }

        async fn query(&self, request: QueryRequest) -> StoreResult<Page> {
            self.scan_segment(ScanRequest::new(&request.table, 0, 1).unwrap().cursor(request.cursor))
                .await
        }
    }

    fn scanner(
        store: Arc<dyn TableStore>,
        config: &ProducerConfig,
        queue: &PageQueue,
        cancel: CancellationToken,
    ) -> SegmentScanner {
        SegmentScanner::new(
            0,
            config,
            store,
            queue.sender(),
            cancel,
            Arc::new(ProducerStats::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cursor_chain_enqueues_pages_in_order() {
        let store = Arc::new(ChainStore::new(vec![Some("c1"), Some("c2"), None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(10));
        let receiver = queue.receiver();
        let config = ProducerConfig::scan("orders", 1);

        let summary = scanner(store.clone(), &config, &queue, CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.pages, 3);
        assert_eq!(summary.items, 3);

        // First request carries no cursor, then each returned cursor in turn
        let seen: Vec<_> = store.seen.lock().iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(seen, vec![None, Some(Cursor::new("c1")), Some(Cursor::new("c2"))]);

        drop(queue);
        for expected in 1..=3u64 {
            match receiver.get(Duration::from_secs(1)).await {
                Dequeued::Page(page) => {
                    assert_eq!(page.sequence, expected);
                    assert_eq!(page.items[0]["call"], json!(expected - 1));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    /// Counts info-level events that carry an `iteration` field
    struct PageEvents(Arc<AtomicU64>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for PageEvents {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let meta = event.metadata();
            if *meta.level() == tracing::Level::INFO && meta.fields().field("iteration").is_some() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_each_page_logs_at_info() {
        use tracing_subscriber::layer::SubscriberExt;

        let events = Arc::new(AtomicU64::new(0));
        let subscriber = tracing_subscriber::registry().with(PageEvents(events.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = Arc::new(ChainStore::new(vec![Some("c1"), Some("c2"), None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(10));
        let config = ProducerConfig::scan("orders", 1);

        let summary = scanner(store, &config, &queue, CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.pages, 3);
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_store_error_is_fatal() {
        let mut store = ChainStore::new(vec![Some("c1"), Some("c2"), None]);
        store.fail_at = Some(1);
        let store = Arc::new(store);
        let queue = PageQueue::new(QueueCapacity::Bounded(10));
        let _receiver = queue.receiver();
        let config = ProducerConfig::scan("orders", 1);

        let err = scanner(store.clone(), &config, &queue, CancellationToken::new())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TraverseError::Store {
                segment: 0,
                source: StoreError::Throttled { .. }
            }
        ));
        // Not retried
        assert_eq!(store.seen.lock().len(), 2);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_rejected_before_request() {
        let store = Arc::new(ChainStore::new(vec![None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(1));
        let mut config = ProducerConfig::scan("orders", 1);
        config.table = None;

        let result = SegmentScanner::new(
            0,
            &config,
            store.clone(),
            queue.sender(),
            CancellationToken::new(),
            Arc::new(ProducerStats::default()),
        );

        assert!(matches!(result, Err(ConfigError::MissingSource)));
        assert!(store.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_producer_stops() {
        let store = Arc::new(ChainStore::new(vec![Some("c1"), None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scanner(store.clone(), &ProducerConfig::scan("orders", 1), &queue, cancel)
            .run()
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(store.seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unblocks_full_queue() {
        let store = Arc::new(ChainStore::new(vec![Some("c1"), Some("c2"), None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(1));
        let _receiver = queue.receiver();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scanner(store, &ProducerConfig::scan("orders", 1), &queue, cancel.clone()).run(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_consumers_gone() {
        let store = Arc::new(ChainStore::new(vec![None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(1));
        let scanner = scanner(store, &ProducerConfig::scan("orders", 1), &queue, CancellationToken::new());
        drop(queue);

        let err = scanner.run().await.unwrap_err();
        assert!(matches!(err, TraverseError::ConsumersGone { segment: 0 }));
    }

    #[tokio::test]
    async fn test_partition_key_query_pages() {
        let store = Arc::new(ChainStore::new(vec![Some("c1"), None]));
        let queue = PageQueue::new(QueueCapacity::Bounded(4));
        let _receiver = queue.receiver();
        let config = ProducerConfig::partition_key("orders", "id", json!("a"));

        let summary = scanner(store, &config, &queue, CancellationToken::new())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.pages, 2);
    }
}
