//! Table store access
//!
//! This module defines the seam between the traversal engine and the
//! remote table service. The engine only needs two operations:
//!
//! - `scan_segment`: page through one disjoint segment of a table (or index)
//! - `query`: page through the items matching a key (table or index)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  dyn TableStore                      │
//! │  - Shared by all producers (Arc, concurrent reads)  │
//! │  - Cursor-chained pagination                        │
//! │  - Failures are opaque StoreErrors, never retried   │
//! └─────────────────────────────────────────────────────┘
//!            │                             │
//!            ▼                             ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │     MemoryStore      │      │  remote service      │
//! │  (tests, demos)      │      │  adapter (caller)    │
//! └──────────────────────┘      └──────────────────────┘
//! ```

pub mod memory;
pub mod types;

pub use memory::{MemoryStore, StoreStats, TableSchema};
pub use types::{Cursor, Item, Page, QueryRequest, ScanRequest};

use crate::error::{ConfigError, Result, StoreResult, TraverseError};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Table name length limits
const MIN_TABLE_NAME_LEN: usize = 3;
const MAX_TABLE_NAME_LEN: usize = 255;

/// Regex for valid table and index names
static TABLE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("Invalid table name regex"));

/// A partitioned table service offering segmented scans and keyed queries
///
/// Implementations must be safe for concurrent use from many producer tasks.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetch one page of a table segment
    async fn scan_segment(&self, request: ScanRequest) -> StoreResult<Page>;

    /// Fetch one page of the items matching a key
    async fn query(&self, request: QueryRequest) -> StoreResult<Page>;
}

/// Check a table or index name against the service naming rules
pub fn validate_table_name(name: &str) -> std::result::Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::MissingSource);
    }

    if name.len() < MIN_TABLE_NAME_LEN || name.len() > MAX_TABLE_NAME_LEN {
        return Err(ConfigError::InvalidTableName {
            name: name.to_string(),
            reason: format!(
                "length must be between {} and {}",
                MIN_TABLE_NAME_LEN, MAX_TABLE_NAME_LEN
            ),
        });
    }

    if !TABLE_NAME_REGEX.is_match(name) {
        return Err(ConfigError::InvalidTableName {
            name: name.to_string(),
            reason: "only letters, digits, '_', '-' and '.' are allowed".into(),
        });
    }

    Ok(())
}

/// Fetch the first page of a partition-key point query
pub async fn query_by_partition_key(
    store: &dyn TableStore,
    table: &str,
    key_name: &str,
    key_value: &Value,
) -> Result<Page> {
    let request = QueryRequest::partition_key(table, key_name, key_value)?;
    store
        .query(request)
        .await
        .map_err(|source| TraverseError::Store { segment: 0, source })
}

/// Fetch the first page of a secondary-index query
pub async fn query_by_index(
    store: &dyn TableStore,
    table: &str,
    index_name: &str,
    key_name: &str,
    key_value: &Value,
) -> Result<Page> {
    let request = QueryRequest::index(table, index_name, key_name, key_value)?;
    store
        .query(request)
        .await
        .map_err(|source| TraverseError::Store { segment: 0, source })
}
