//! Parallel segmented traversal engine
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────┐ ┌──────────────┐       ┌──────────────┐
//!        │  Segment 0   │ │  Segment 1   │  ...  │ Segment N-1  │
//!        │ SegmentScan  │ │ SegmentScan  │       │ SegmentScan  │
//!        └──────┬───────┘ └──────┬───────┘       └──────┬───────┘
//!               │  pages         │                      │
//!               └────────────────┼──────────────────────┘
//!                                ▼
//!                   ┌─────────────────────────┐
//!                   │        PageQueue        │
//!                   │  bounded, backpressure  │
//!                   │  closes when producers  │
//!                   │  are all done           │
//!                   └────────────┬────────────┘
//!               ┌────────────────┼──────────────────────┐
//!               ▼                ▼                      ▼
//!        ┌──────────────┐ ┌──────────────┐       ┌──────────────┐
//!        │  Consumer 0  │ │  Consumer 1  │  ...  │ Consumer M-1 │
//!        │  processor   │ │  processor   │       │  processor   │
//!        └──────────────┘ └──────────────┘       └──────────────┘
//! ```

pub mod consumer;
pub mod coordinator;
pub mod counter;
pub mod processor;
pub mod producer;
pub mod queue;

pub use consumer::{ConsumerExit, ConsumerStats, ConsumerSummary, ConsumerWorker};
pub use coordinator::{TraversalCoordinator, TraversalProbe, TraversalProgress, TraversalReport};
pub use counter::SharedCounter;
pub use processor::{processor_fn, Cardinality, FnProcessor, PageProcessor};
pub use producer::{ProducerStats, SegmentScanner, SegmentSummary};
pub use queue::{
    ConsumeGuard, Dequeued, PageQueue, PageQueueReceiver, PageQueueSender, QueueCapacity,
    QueueClosed, QueueStats,
};
