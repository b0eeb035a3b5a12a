//! Error types for table-traverse
//!
//! This module defines the error hierarchy that covers:
//! - Configuration errors (raised before any store request)
//! - Store request errors (fatal for the issuing producer)
//! - Processing errors (isolated inside the consumer loop)
//! - Task and cancellation errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the segment or consumer involved
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a traversal
#[derive(Error, Debug)]
pub enum TraverseError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A store request failed for a producer
    #[error("Store error on segment {segment}: {source}")]
    Store {
        segment: usize,
        #[source]
        source: StoreError,
    },

    /// A page failed processing under the abort policy
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Every consumer exited while a producer still had pages to deliver
    #[error("Segment {segment} could not enqueue: all consumers have exited")]
    ConsumersGone { segment: usize },

    /// The traversal was cancelled (external signal or sibling failure)
    #[error("Traversal cancelled")]
    Cancelled,

    /// A spawned task panicked or was aborted
    #[error("Task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },

    /// I/O errors (loading input files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraverseError {
    /// Returns true if this error is the fallout of a cancellation rather
    /// than the root cause of a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TraverseError::Cancelled)
    }
}

/// Store request errors
///
/// The traversal engine treats every variant as opaque and fatal; nothing
/// is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Request rate exceeded the provisioned throughput
    #[error("Request throttled on table '{table}': {reason}")]
    Throttled { table: String, reason: String },

    /// Table does not exist
    #[error("Table not found: '{table}'")]
    TableNotFound { table: String },

    /// Secondary index does not exist on the table
    #[error("Index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },

    /// Continuation token could not be decoded
    #[error("Invalid cursor '{cursor}'")]
    InvalidCursor { cursor: String },

    /// Request rejected by the store
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Store unreachable or failed internally
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if a caller could reasonably retry this request
    ///
    /// Informational only: producers never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Throttled { .. } | StoreError::Unavailable(_)
        )
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No source table given
    #[error("Missing source table")]
    MissingSource,

    /// Table name does not follow the naming rules
    #[error("Invalid table name '{name}': {reason}")]
    InvalidTableName { name: String, reason: String },

    /// Partition-key query without key name or value
    #[error("Partition key query requires a key name and a value")]
    MissingPartitionKey,

    /// Index query without index name, key name or value
    #[error("Index query requires an index name, a key name and a value")]
    MissingIndexKey,

    /// Invalid segment (producer) count
    #[error("Invalid segment count {count}: must be between 1 and {max}")]
    InvalidSegmentCount { count: usize, max: usize },

    /// Key queries cannot be segmented
    #[error("Query mode runs a single producer, but {count} segments were requested")]
    SegmentedQuery { count: usize },

    /// Invalid worker (consumer) count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: u32, min: u32, max: u32 },

    /// Invalid queue capacity
    #[error("Invalid queue capacity {size}: must be at least {min}")]
    InvalidQueueCapacity { size: usize, min: usize },

    /// Idle timeout of zero
    #[error("Idle timeout must be greater than zero")]
    InvalidTimeout,

    /// Input source for the CLI
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },
}

/// A caller-supplied processor failed on a page
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Consumer {consumer} failed on page {sequence} of segment {segment} ({items} items): {reason}")]
pub struct ProcessingError {
    /// Consumer that dequeued the page
    pub consumer: usize,

    /// Segment the page was scanned from
    pub segment: usize,

    /// Iteration number of the page within its segment
    pub sequence: u64,

    /// Number of items dropped with the page
    pub items: usize,

    /// Rendered processor error (or panic message)
    pub reason: String,
}

/// Result type alias for TraverseError
pub type Result<T> = std::result::Result<T, TraverseError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Represents the outcome of dispatching a single page
#[derive(Debug)]
pub enum PageOutcome {
    /// The processor accepted the page
    Processed { items: usize },

    /// The processor failed; the page is dropped
    Failed(ProcessingError),
}

impl PageOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Processed { .. })
    }
}
