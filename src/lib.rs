//! table-traverse - Parallel Segmented Table Traversal
//!
//! Reads every item of a large key-value table by splitting it into segments
//! scanned concurrently, and hands each page of results to a pool of workers
//! running a caller-supplied function.
//!
//! # Features
//!
//! - **Segmented Scans**: One producer per segment, each paging through its
//!   slice of the table with continuation cursors.
//!
//! - **Bounded Queue**: Producers block when consumers fall behind, so memory
//!   stays flat however large the table is.
//!
//! - **Failure Isolation**: A processor error or panic drops one page and is
//!   logged; the rest of the traversal carries on.
//!
//! - **Clean Shutdown**: The queue closes when the last producer finishes;
//!   the first fatal error or a Ctrl-C cancels every task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use table_traverse::config::{ConsumerConfig, ProducerConfig, TraversalConfig};
//! use table_traverse::store::{MemoryStore, TableSchema};
//! use table_traverse::traverse::{Cardinality, QueueCapacity, SharedCounter, TraversalCoordinator};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = MemoryStore::new();
//! store.create_table(TableSchema::new("orders", "id"));
//! store.generate("orders", 10_000)?;
//!
//! let config = TraversalConfig::new(
//!     ProducerConfig::scan("orders", 8),
//!     ConsumerConfig::new(16, Duration::from_secs(3)),
//!     QueueCapacity::Bounded(64),
//! )?;
//!
//! let counter = SharedCounter::new();
//! let processor = Arc::new(Cardinality::new(counter.clone()));
//! let report = TraversalCoordinator::new(Arc::new(store), config, processor)?
//!     .run()
//!     .await?;
//!
//! assert_eq!(counter.get(), 10_000);
//! assert!(report.completed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod store;
pub mod traverse;

pub use config::{CliArgs, TraversalConfig};
pub use error::{ConfigError, ProcessingError, Result, StoreError, TraverseError};
pub use traverse::{TraversalCoordinator, TraversalReport};
