//! Configuration types for table-traverse
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Producer and consumer configuration with validation
//! - Scan modes (segmented scan, partition-key query, index query)

use crate::error::ConfigError;
use crate::store::{validate_table_name, TableSchema};
use crate::traverse::queue::QueueCapacity;
use clap::{Parser, ValueEnum};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable segment (producer) count
const MAX_SEGMENTS: usize = 1024;

/// Maximum reasonable worker (consumer) count
const MAX_WORKERS: usize = 512;

/// Page size limits
const MIN_BATCH_SIZE: u32 = 1;
const MAX_BATCH_SIZE: u32 = 10_000;

/// Minimum bounded queue capacity
const MIN_QUEUE_CAPACITY: usize = 1;

/// Parallel table traversal over an in-memory table store
#[derive(Parser, Debug, Clone)]
#[command(
    name = "table-traverse",
    version,
    about = "Parallel segmented traversal of a partitioned table",
    long_about = "Loads a table into an in-memory segmentable store and traverses it with\n\
                  N segment scanners feeding M consumer workers through a bounded queue.\n\n\
                  The consumers count every item (cardinality) and a summary is printed.",
    after_help = "EXAMPLES:\n    \
        table-traverse --generate 100000 -s 8 -w 16\n    \
        table-traverse --input items.jsonl --table orders --partition-key order_id\n    \
        table-traverse --generate 5000 --index by_group --key group --value g3 -s 1\n    \
        table-traverse --generate 5000 --index by_group -s 4\n    \
        table-traverse --generate 5000 --unbounded --idle-policy exit --timeout 1"
)]
pub struct CliArgs {
    /// JSON-lines file to load (one item per line)
    #[arg(short, long, value_name = "FILE", conflicts_with = "generate")]
    pub input: Option<PathBuf>,

    /// Generate this many synthetic items instead of loading a file
    #[arg(short, long, value_name = "COUNT")]
    pub generate: Option<usize>,

    /// Table name
    #[arg(short, long, default_value = "traverse_demo", value_name = "NAME")]
    pub table: String,

    /// Partition key attribute of the loaded items
    #[arg(long, default_value = "id", value_name = "ATTR")]
    pub partition_key: String,

    /// Number of segments (one scanning producer per segment)
    #[arg(short = 's', long, default_value_t = default_segments(), value_name = "NUM")]
    pub segments: usize,

    /// Number of consumer workers
    #[arg(short = 'w', long, default_value_t = default_workers(), value_name = "NUM")]
    pub workers: usize,

    /// Items per page request
    #[arg(short = 'b', long, default_value = "100", value_name = "NUM")]
    pub batch_size: u32,

    /// Maximum pages buffered between producers and consumers
    #[arg(long, default_value = "64", value_name = "NUM")]
    pub queue_capacity: usize,

    /// Do not bound the queue (memory grows with producer lead)
    #[arg(long)]
    pub unbounded: bool,

    /// Consumer idle timeout in seconds
    #[arg(long, default_value = "3", value_name = "SECS")]
    pub timeout: u64,

    /// What a consumer does when the idle timeout elapses
    #[arg(long, value_enum, default_value_t = IdlePolicy::Drain)]
    pub idle_policy: IdlePolicy,

    /// What happens when processing a page fails
    #[arg(long = "on-error", value_enum, default_value_t = FailurePolicy::Continue)]
    pub on_error: FailurePolicy,

    /// Secondary index to scan or query
    #[arg(long, value_name = "NAME")]
    pub index: Option<String>,

    /// Attribute the --index is keyed on when no --key is given
    #[arg(long, default_value = "group", value_name = "ATTR")]
    pub index_key: String,

    /// Key attribute for a query (partition key, or index key with --index)
    #[arg(long, value_name = "ATTR", requires = "value")]
    pub key: Option<String>,

    /// Key value for a query (parsed as JSON, falling back to a string)
    #[arg(long, value_name = "VALUE", requires = "key")]
    pub value: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug-level engine logs)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Key layout of the table the CLI loads
    ///
    /// With `--index` the index is keyed on `--key` for index queries and on
    /// `--index-key` for index scans.
    pub fn table_schema(&self) -> TableSchema {
        let schema = TableSchema::new(&self.table, &self.partition_key);
        match &self.index {
            Some(index) => {
                let key = self.key.as_ref().unwrap_or(&self.index_key);
                schema.with_index(index, key)
            }
            None => schema,
        }
    }

    /// Parse the --value argument
    pub fn key_value(&self) -> Option<Value> {
        self.value.as_ref().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        })
    }
}

fn default_segments() -> usize {
    num_cpus::get()
}

fn default_workers() -> usize {
    // Processing may do I/O, so default to 2x CPU cores
    num_cpus::get() * 2
}

/// How a producer requests pages
#[derive(Debug, Clone, PartialEq)]
pub enum ScanMode {
    /// Segmented scan of the table, or of a secondary index
    Scan { index_name: Option<String> },

    /// Partition-key point query (single producer)
    PartitionKey { key_name: String, key_value: Value },

    /// Secondary-index query (single producer)
    Index {
        index_name: String,
        key_name: String,
        key_value: Value,
    },
}

impl ScanMode {
    /// Whether this mode issues queries rather than segmented scans
    pub fn is_query(&self) -> bool {
        !matches!(self, ScanMode::Scan { .. })
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Scan { index_name: None } => f.write_str("scan"),
            ScanMode::Scan {
                index_name: Some(index),
            } => write!(f, "scan of index {}", index),
            ScanMode::PartitionKey { key_name, key_value } => {
                write!(f, "query {} = {}", key_name, key_value)
            }
            ScanMode::Index {
                index_name,
                key_name,
                key_value,
            } => write!(f, "query {} on index {} = {}", key_name, index_name, key_value),
        }
    }
}

/// Producer-side configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// Source table (required)
    pub table: Option<String>,

    /// Number of segments, one producer each
    pub segments: usize,

    /// Items per page request (store default when None)
    pub batch_size: Option<u32>,

    /// Request shape
    pub mode: ScanMode,
}

impl ProducerConfig {
    /// Segmented scan of `table` with one producer per segment
    pub fn scan(table: impl Into<String>, segments: usize) -> Self {
        Self {
            table: Some(table.into()),
            segments,
            batch_size: None,
            mode: ScanMode::Scan { index_name: None },
        }
    }

    /// Partition-key point query
    pub fn partition_key(
        table: impl Into<String>,
        key_name: impl Into<String>,
        key_value: Value,
    ) -> Self {
        Self {
            table: Some(table.into()),
            segments: 1,
            batch_size: None,
            mode: ScanMode::PartitionKey {
                key_name: key_name.into(),
                key_value,
            },
        }
    }

    /// Secondary-index query
    pub fn index(
        table: impl Into<String>,
        index_name: impl Into<String>,
        key_name: impl Into<String>,
        key_value: Value,
    ) -> Self {
        Self {
            table: Some(table.into()),
            segments: 1,
            batch_size: None,
            mode: ScanMode::Index {
                index_name: index_name.into(),
                key_name: key_name.into(),
                key_value,
            },
        }
    }

    /// Set the page size
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Scan a secondary index instead of the base table
    pub fn scan_index(mut self, index_name: impl Into<String>) -> Self {
        self.mode = ScanMode::Scan {
            index_name: Some(index_name.into()),
        };
        self
    }

    /// Validated source table name
    pub fn table_name(&self) -> Result<&str, ConfigError> {
        match self.table.as_deref() {
            Some(name) if !name.is_empty() => {
                validate_table_name(name)?;
                Ok(name)
            }
            _ => Err(ConfigError::MissingSource),
        }
    }

    /// Check the configuration before any request is sent
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_name()?;

        if self.segments == 0 || self.segments > MAX_SEGMENTS {
            return Err(ConfigError::InvalidSegmentCount {
                count: self.segments,
                max: MAX_SEGMENTS,
            });
        }

        if let Some(size) = self.batch_size {
            if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
                return Err(ConfigError::InvalidBatchSize {
                    size,
                    min: MIN_BATCH_SIZE,
                    max: MAX_BATCH_SIZE,
                });
            }
        }

        match &self.mode {
            ScanMode::Scan { index_name } => {
                if index_name.as_deref() == Some("") {
                    return Err(ConfigError::MissingIndexKey);
                }
            }
            ScanMode::PartitionKey { key_name, key_value } => {
                if key_name.is_empty() || key_value.is_null() {
                    return Err(ConfigError::MissingPartitionKey);
                }
            }
            ScanMode::Index {
                index_name,
                key_name,
                key_value,
            } => {
                if index_name.is_empty() || key_name.is_empty() || key_value.is_null() {
                    return Err(ConfigError::MissingIndexKey);
                }
            }
        }

        if self.mode.is_query() && self.segments != 1 {
            return Err(ConfigError::SegmentedQuery {
                count: self.segments,
            });
        }

        Ok(())
    }
}

/// What a consumer does when its idle timeout elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IdlePolicy {
    /// Keep waiting until end of stream; every enqueued page is processed
    #[default]
    Drain,

    /// Terminate the worker (producers fail if no consumer remains)
    Exit,
}

/// What happens when the processor fails on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Log, count and drop the page; keep consuming
    #[default]
    Continue,

    /// Cancel the whole traversal and report the failure
    Abort,
}

/// Consumer-side configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Number of consumer workers
    pub workers: usize,

    /// Maximum wait for the next page before the idle policy applies
    pub idle_timeout: Duration,

    /// Behaviour on idle timeout
    pub idle_policy: IdlePolicy,

    /// Behaviour on processing failure
    pub failure_policy: FailurePolicy,
}

impl ConsumerConfig {
    /// Create a consumer configuration with default policies
    pub fn new(workers: usize, idle_timeout: Duration) -> Self {
        Self {
            workers,
            idle_timeout,
            idle_policy: IdlePolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Set the idle policy
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.idle_policy = policy;
        self
    }

    /// Set the failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.workers,
                max: MAX_WORKERS,
            });
        }

        if self.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }
}

/// Validated traversal configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalConfig {
    /// Producer group
    pub producer: ProducerConfig,

    /// Consumer group
    pub consumer: ConsumerConfig,

    /// Queue capacity between the groups
    pub queue_capacity: QueueCapacity,
}

impl TraversalConfig {
    /// Create and validate a configuration
    pub fn new(
        producer: ProducerConfig,
        consumer: ConsumerConfig,
        queue_capacity: QueueCapacity,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            producer,
            consumer,
            queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every group
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.producer.validate()?;
        self.consumer.validate()?;

        if let QueueCapacity::Bounded(size) = self.queue_capacity {
            if size < MIN_QUEUE_CAPACITY {
                return Err(ConfigError::InvalidQueueCapacity {
                    size,
                    min: MIN_QUEUE_CAPACITY,
                });
            }
        }

        Ok(())
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mode = match (&args.key, args.key_value(), &args.index) {
            (Some(key), Some(value), Some(index)) => ScanMode::Index {
                index_name: index.clone(),
                key_name: key.clone(),
                key_value: value,
            },
            (Some(key), Some(value), None) => ScanMode::PartitionKey {
                key_name: key.clone(),
                key_value: value,
            },
            (None, None, index) => ScanMode::Scan {
                index_name: index.clone(),
            },
            (_, _, Some(_)) => return Err(ConfigError::MissingIndexKey),
            (_, _, None) => return Err(ConfigError::MissingPartitionKey),
        };

        let producer = ProducerConfig {
            table: Some(args.table.clone()),
            segments: args.segments,
            batch_size: Some(args.batch_size),
            mode,
        };

        let consumer = ConsumerConfig::new(args.workers, Duration::from_secs(args.timeout))
            .idle_policy(args.idle_policy)
            .failure_policy(args.on_error);

        let queue_capacity = if args.unbounded {
            QueueCapacity::Unbounded
        } else {
            QueueCapacity::Bounded(args.queue_capacity)
        };

        Self::new(producer, consumer, queue_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["table-traverse", "--generate", "10"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_table_schema_index_key() {
        let schema = args(&["--index", "by_group"]).table_schema();
        assert_eq!(schema.indexes.get("by_group"), Some(&"group".to_string()));

        let schema = args(&["--index", "by_seq", "--index-key", "seq"]).table_schema();
        assert_eq!(schema.indexes.get("by_seq"), Some(&"seq".to_string()));

        let schema = args(&["--index", "by_owner", "--key", "owner", "--value", "ann"]).table_schema();
        assert_eq!(schema.indexes.get("by_owner"), Some(&"owner".to_string()));

        assert!(args(&[]).table_schema().indexes.is_empty());
    }

    #[test]
    fn test_producer_requires_source() {
        let mut producer = ProducerConfig::scan("orders", 4);
        producer.table = None;
        assert_eq!(producer.validate(), Err(ConfigError::MissingSource));

        producer.table = Some(String::new());
        assert_eq!(producer.validate(), Err(ConfigError::MissingSource));
    }

    #[test]
    fn test_producer_limits() {
        assert!(ProducerConfig::scan("orders", 4).validate().is_ok());
        assert!(matches!(
            ProducerConfig::scan("orders", 0).validate(),
            Err(ConfigError::InvalidSegmentCount { .. })
        ));
        assert!(matches!(
            ProducerConfig::scan("orders", 2).batch_size(0).validate(),
            Err(ConfigError::InvalidBatchSize { .. })
        ));
        assert!(matches!(
            ProducerConfig::scan("or", 2).validate(),
            Err(ConfigError::InvalidTableName { .. })
        ));
    }

    #[test]
    fn test_query_modes() {
        assert_eq!(
            ProducerConfig::partition_key("orders", "", json!("a")).validate(),
            Err(ConfigError::MissingPartitionKey)
        );
        assert_eq!(
            ProducerConfig::index("orders", "", "status", json!("open")).validate(),
            Err(ConfigError::MissingIndexKey)
        );

        let mut query = ProducerConfig::partition_key("orders", "id", json!("a"));
        assert!(query.validate().is_ok());
        query.segments = 3;
        assert_eq!(
            query.validate(),
            Err(ConfigError::SegmentedQuery { count: 3 })
        );
    }

    #[test]
    fn test_consumer_limits() {
        assert!(ConsumerConfig::new(4, Duration::from_secs(3)).validate().is_ok());
        assert!(matches!(
            ConsumerConfig::new(0, Duration::from_secs(3)).validate(),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
        assert_eq!(
            ConsumerConfig::new(1, Duration::ZERO).validate(),
            Err(ConfigError::InvalidTimeout)
        );
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let err = TraversalConfig::new(
            ProducerConfig::scan("orders", 2),
            ConsumerConfig::new(2, Duration::from_secs(1)),
            QueueCapacity::Bounded(0),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQueueCapacity { .. }));
    }

    #[test]
    fn test_from_args_scan() {
        let config = TraversalConfig::from_args(&args(&["-s", "4", "-w", "8", "--unbounded"])).unwrap();
        assert_eq!(config.producer.segments, 4);
        assert_eq!(config.consumer.workers, 8);
        assert_eq!(config.queue_capacity, QueueCapacity::Unbounded);
        assert_eq!(config.producer.mode, ScanMode::Scan { index_name: None });
        assert_eq!(config.consumer.idle_policy, IdlePolicy::Drain);
    }

    #[test]
    fn test_from_args_index_query() {
        let config = TraversalConfig::from_args(&args(&[
            "-s", "1", "--index", "by_group", "--key", "group", "--value", "g3",
        ]))
        .unwrap();
        assert_eq!(
            config.producer.mode,
            ScanMode::Index {
                index_name: "by_group".into(),
                key_name: "group".into(),
                key_value: json!("g3"),
            }
        );
    }

    #[test]
    fn test_key_value_parsing() {
        assert_eq!(args(&["--key", "n", "--value", "42"]).key_value(), Some(json!(42)));
        assert_eq!(
            args(&["--key", "n", "--value", "abc"]).key_value(),
            Some(json!("abc"))
        );
    }
}
