//! Request and response types shared by every store implementation

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single record returned by the store
pub type Item = serde_json::Map<String, Value>;

/// Opaque continuation token marking where the next page resumes
///
/// Only the store that issued a cursor knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap a store-specific token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for the store that issued it
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One batch of items returned by a single scan or query call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Items in store order
    pub items: Vec<Item>,

    /// Number of items the store reports for this page
    pub count: usize,

    /// Cursor for the next page (None = source drained)
    pub next_cursor: Option<Cursor>,

    /// Segment that produced this page (set by the producer)
    #[serde(default)]
    pub segment: usize,

    /// 1-based iteration number within the segment (set by the producer)
    #[serde(default)]
    pub sequence: u64,
}

impl Page {
    /// Create a page from store results
    pub fn new(items: Vec<Item>, next_cursor: Option<Cursor>) -> Self {
        let count = items.len();
        Self {
            items,
            count,
            next_cursor,
            segment: 0,
            sequence: 0,
        }
    }

    /// Tag the page with its producer provenance
    pub fn with_origin(mut self, segment: usize, sequence: u64) -> Self {
        self.segment = segment;
        self.sequence = sequence;
        self
    }

    /// Whether the store signalled more pages after this one
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Number of items carried
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page carries no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A segmented scan request
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Table to scan
    pub table: String,

    /// Scan a secondary index instead of the base table
    pub index_name: Option<String>,

    /// Segment id in `[0, total_segments)`
    pub segment: usize,

    /// Number of disjoint segments the table is split into
    pub total_segments: usize,

    /// Maximum items per page
    pub limit: Option<u32>,

    /// Resume point (None on the first request)
    pub cursor: Option<Cursor>,
}

impl ScanRequest {
    /// Build the first request for a segment
    pub fn new(
        table: &str,
        segment: usize,
        total_segments: usize,
    ) -> Result<Self, ConfigError> {
        if table.is_empty() {
            return Err(ConfigError::MissingSource);
        }

        Ok(Self {
            table: table.to_string(),
            index_name: None,
            segment,
            total_segments,
            limit: None,
            cursor: None,
        })
    }

    /// Scan a secondary index
    pub fn index(mut self, index_name: Option<String>) -> Self {
        self.index_name = index_name;
        self
    }

    /// Set the page size
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Resume from a cursor
    pub fn cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// A key-equality query, against the table or a secondary index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Table to query
    pub table: String,

    /// Query a secondary index instead of the base table
    pub index_name: Option<String>,

    /// Key attribute name
    pub key_name: String,

    /// Key attribute value
    pub key_value: Value,

    /// Maximum items per page
    pub limit: Option<u32>,

    /// Resume point (None on the first request)
    pub cursor: Option<Cursor>,
}

impl QueryRequest {
    /// Partition-key point query
    pub fn partition_key(
        table: &str,
        key_name: &str,
        key_value: &Value,
    ) -> Result<Self, ConfigError> {
        if table.is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if key_name.is_empty() || key_value.is_null() {
            return Err(ConfigError::MissingPartitionKey);
        }

        Ok(Self {
            table: table.to_string(),
            index_name: None,
            key_name: key_name.to_string(),
            key_value: key_value.clone(),
            limit: None,
            cursor: None,
        })
    }

    /// Secondary-index query
    pub fn index(
        table: &str,
        index_name: &str,
        key_name: &str,
        key_value: &Value,
    ) -> Result<Self, ConfigError> {
        if table.is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if index_name.is_empty() || key_name.is_empty() || key_value.is_null() {
            return Err(ConfigError::MissingIndexKey);
        }

        Ok(Self {
            table: table.to_string(),
            index_name: Some(index_name.to_string()),
            key_name: key_name.to_string(),
            key_value: key_value.clone(),
            limit: None,
            cursor: None,
        })
    }

    /// Set the page size
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Resume from a cursor
    pub fn cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }
}
