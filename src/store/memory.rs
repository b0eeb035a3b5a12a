//! In-memory table store
//!
//! A process-local implementation of [`TableStore`] with the same paging
//! semantics as the remote service:
//!
//! - Items are assigned to scan segments by hashing their partition key,
//!   so segments are disjoint and together cover the whole table
//! - Pages hold at most `limit` items and carry a cursor while more remain
//! - Secondary indexes are sparse: only items carrying the index key appear
//!
//! Used by the test suite, the benchmarks and the demo CLI.

use crate::error::{ConfigError, Result, StoreError, StoreResult, TraverseError};
use crate::store::types::{Cursor, Item, Page, QueryRequest, ScanRequest};
use crate::store::TableStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Page size used when a request carries no limit
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Key layout of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name
    pub name: String,

    /// Partition key attribute
    pub partition_key: String,

    /// Secondary indexes: index name -> key attribute
    pub indexes: HashMap<String, String>,
}

impl TableSchema {
    /// Create a schema with no secondary indexes
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            indexes: HashMap::new(),
        }
    }

    /// Add a secondary index keyed on `key`
    pub fn with_index(mut self, index: impl Into<String>, key: impl Into<String>) -> Self {
        self.indexes.insert(index.into(), key.into());
        self
    }
}

struct MemoryTable {
    schema: TableSchema,
    items: Vec<Item>,
}

/// Request counters
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Scan requests served
    pub scans: AtomicU64,

    /// Query requests served
    pub queries: AtomicU64,
}

impl StoreStats {
    /// Total requests of any kind
    pub fn request_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed) + self.queries.load(Ordering::Relaxed)
    }
}

/// Concurrency-safe in-memory table store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    stats: Arc<StoreStats>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table
    pub fn create_table(&self, schema: TableSchema) {
        debug!(table = %schema.name, partition_key = %schema.partition_key, "Creating table");
        self.tables.write().insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                items: Vec::new(),
            },
        );
    }

    /// Insert an item; it must be an object carrying the partition key
    pub fn put_item(&self, table: &str, item: Value) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let entry = tables.get_mut(table).ok_or_else(|| StoreError::TableNotFound {
            table: table.to_string(),
        })?;

        let Value::Object(item) = item else {
            return Err(StoreError::Validation("item must be a JSON object".into()));
        };

        if !item.contains_key(&entry.schema.partition_key) {
            return Err(StoreError::Validation(format!(
                "item is missing partition key '{}'",
                entry.schema.partition_key
            )));
        }

        entry.items.push(item);
        Ok(())
    }

    /// Number of items in a table
    pub fn item_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(|t| t.items.len())
    }

    /// Request counters
    pub fn stats(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    /// Load one JSON object per line into a table
    ///
    /// Blank lines are skipped. Returns the number of items loaded.
    pub fn load_json_lines(&self, table: &str, path: &Path) -> Result<usize> {
        let reader = BufReader::new(File::open(path)?);
        let mut loaded = 0;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(&line).map_err(|e| {
                TraverseError::Config(ConfigError::InvalidInput {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {}", line_no + 1, e),
                })
            })?;

            self.put_item(table, value).map_err(|e| {
                TraverseError::Config(ConfigError::InvalidInput {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {}", line_no + 1, e),
                })
            })?;
            loaded += 1;
        }

        debug!(table, loaded, "Loaded JSON lines");
        Ok(loaded)
    }

    /// Fill a table with `count` synthetic items
    ///
    /// Items carry the partition key (`item-00000042`), a sequence number and
    /// a `group` attribute cycling through ten values.
    pub fn generate(&self, table: &str, count: usize) -> StoreResult<()> {
        let partition_key = self
            .tables
            .read()
            .get(table)
            .map(|t| t.schema.partition_key.clone())
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;

        for i in 0..count {
            let mut item = json!({
                "seq": i,
                "group": format!("g{}", i % 10),
            });
            item[partition_key.as_str()] = json!(format!("item-{:08}", i));
            self.put_item(table, item)?;
        }

        Ok(())
    }
}

/// Segment an item belongs to, from its partition key value
fn segment_of(key: &Value, total_segments: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.to_string().hash(&mut hasher);
    (hasher.finish() % total_segments as u64) as usize
}

fn decode_cursor(cursor: Option<&Cursor>) -> StoreResult<usize> {
    match cursor {
        None => Ok(0),
        Some(c) => c.as_str().parse().map_err(|_| StoreError::InvalidCursor {
            cursor: c.to_string(),
        }),
    }
}

/// Collect one page of items matching `keep`, starting at offset `start`
fn collect_page<F>(items: &[Item], start: usize, limit: u32, keep: F) -> Page
where
    F: Fn(&Item) -> bool,
{
    let limit = limit.max(1) as usize;
    let mut page_items = Vec::with_capacity(limit.min(items.len()));
    let mut pos = start;

    while pos < items.len() && page_items.len() < limit {
        if keep(&items[pos]) {
            page_items.push(items[pos].clone());
        }
        pos += 1;
    }

    let more = items[pos.min(items.len())..].iter().any(&keep);
    let next_cursor = more.then(|| Cursor::new(pos.to_string()));

    Page::new(page_items, next_cursor)
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn scan_segment(&self, request: ScanRequest) -> StoreResult<Page> {
        self.stats.scans.fetch_add(1, Ordering::Relaxed);

        if request.total_segments == 0 || request.segment >= request.total_segments {
            return Err(StoreError::Validation(format!(
                "segment {} out of range for {} segments",
                request.segment, request.total_segments
            )));
        }

        let tables = self.tables.read();
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: request.table.clone(),
            })?;

        let index_key = match &request.index_name {
            Some(index) => Some(table.schema.indexes.get(index).ok_or_else(|| {
                StoreError::IndexNotFound {
                    table: request.table.clone(),
                    index: index.clone(),
                }
            })?),
            None => None,
        };

        let start = decode_cursor(request.cursor.as_ref())?;
        let partition_key = &table.schema.partition_key;
        let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(collect_page(&table.items, start, limit, |item| {
            let in_index = index_key.map_or(true, |key| item.contains_key(key));
            in_index
                && item
                    .get(partition_key)
                    .is_some_and(|pk| segment_of(pk, request.total_segments) == request.segment)
        }))
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<Page> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let tables = self.tables.read();
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: request.table.clone(),
            })?;

        let expected_key = match &request.index_name {
            Some(index) => table.schema.indexes.get(index).ok_or_else(|| {
                StoreError::IndexNotFound {
                    table: request.table.clone(),
                    index: index.clone(),
                }
            })?,
            None => &table.schema.partition_key,
        };

        if &request.key_name != expected_key {
            return Err(StoreError::Validation(format!(
                "key condition must use '{}', got '{}'",
                expected_key, request.key_name
            )));
        }

        let start = decode_cursor(request.cursor.as_ref())?;
        let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(collect_page(&table.items, start, limit, |item| {
            item.get(&request.key_name) == Some(&request.key_value)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    fn orders_store(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table(TableSchema::new("orders", "id").with_index("by_group", "group"));
        store.generate("orders", count).unwrap();
        store
    }

    async fn scan_all(store: &MemoryStore, segment: usize, total: usize, limit: u32) -> Vec<Item> {
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let request = ScanRequest::new("orders", segment, total)
                .unwrap()
                .limit(Some(limit))
                .cursor(cursor);
            let page = store.scan_segment(request).await.unwrap();
            assert!(page.count <= limit as usize);
            items.extend(page.items);
            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        items
    }

    #[tokio::test]
    async fn test_segments_are_disjoint_and_complete() {
        let store = orders_store(250);
        let mut seen = HashSet::new();

        for segment in 0..4 {
            for item in scan_all(&store, segment, 4, 17).await {
                assert!(seen.insert(item["id"].as_str().unwrap().to_string()));
            }
        }

        assert_eq!(seen.len(), 250);
    }

    #[tokio::test]
    async fn test_scan_pagination_cursor() {
        let store = orders_store(10);
        let first = store
            .scan_segment(ScanRequest::new("orders", 0, 1).unwrap().limit(Some(4)))
            .await
            .unwrap();
        assert_eq!(first.count, 4);
        assert!(first.has_more());

        let last = store
            .scan_segment(
                ScanRequest::new("orders", 0, 1)
                    .unwrap()
                    .limit(Some(6))
                    .cursor(first.next_cursor),
            )
            .await
            .unwrap();
        assert_eq!(last.count, 6);
        assert!(!last.has_more());
        assert_eq!(store.stats().scans.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_scan_errors() {
        let store = orders_store(1);

        let err = store
            .scan_segment(ScanRequest::new("missing", 0, 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound { .. }));

        let err = store
            .scan_segment(ScanRequest::new("orders", 2, 2).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store
            .scan_segment(
                ScanRequest::new("orders", 0, 1)
                    .unwrap()
                    .cursor(Some(Cursor::new("not-a-cursor"))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCursor { .. }));

        let err = store
            .scan_segment(
                ScanRequest::new("orders", 0, 1)
                    .unwrap()
                    .index(Some("nope".into())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_index_scan_is_sparse() {
        let store = orders_store(5);
        store.put_item("orders", json!({"id": "no-group"})).unwrap();

        let page = store
            .scan_segment(
                ScanRequest::new("orders", 0, 1)
                    .unwrap()
                    .index(Some("by_group".into())),
            )
            .await
            .unwrap();
        assert_eq!(page.count, 5);
    }

    #[tokio::test]
    async fn test_query_by_index_pages() {
        let store = orders_store(100);
        let request = QueryRequest::index("orders", "by_group", "group", &json!("g3"))
            .unwrap()
            .limit(Some(4));

        let first = store.query(request.clone()).await.unwrap();
        assert_eq!(first.count, 4);
        assert!(first.has_more());

        let rest = store
            .query(request.limit(Some(100)).cursor(first.next_cursor))
            .await
            .unwrap();
        assert_eq!(rest.count, 6);
        assert!(!rest.has_more());
    }

    #[tokio::test]
    async fn test_query_rejects_wrong_key() {
        let store = orders_store(3);
        let request = QueryRequest::partition_key("orders", "group", &json!("g1")).unwrap();
        let err = store.query(request).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_put_item_validation() {
        let store = MemoryStore::new();
        store.create_table(TableSchema::new("orders", "id"));

        assert!(store.put_item("orders", json!({"id": 1})).is_ok());
        assert!(store.put_item("orders", json!({"other": 1})).is_err());
        assert!(store.put_item("orders", json!([1, 2])).is_err());
        assert!(store.put_item("missing", json!({"id": 1})).is_err());
        assert_eq!(store.item_count("orders"), Some(1));
    }

    #[test]
    fn test_load_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"id": "a", "n": 1}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "b", "n": 2}}"#).unwrap();
        drop(file);

        let store = MemoryStore::new();
        store.create_table(TableSchema::new("orders", "id"));
        assert_eq!(store.load_json_lines("orders", &path).unwrap(), 2);

        let bad = dir.path().join("bad.jsonl");
        std::fs::write(&bad, "{\"id\": \"a\"}\nnot json\n").unwrap();
        let err = store.load_json_lines("orders", &bad).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
