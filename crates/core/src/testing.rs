//! In-memory store adapters for tests.
//!
//! These back the engine's unit and integration tests without sqlite or a
//! network. Call counters keep counting even when failure injection is on,
//! so tests can assert on traffic as well as on state.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::errors::{Error, Result};
use crate::models::{FeedRecord, ImageStatus, SyncStatus};
use crate::store::{
    apply_patch, local, remote, ConnectivityProbe, DocumentStore, Filter, ObjectStore, StoreMode,
    WriteOutcome,
};
use crate::sync::{SyncConfig, SyncEngine};

/// In-memory document store. Collections are insertion-ordered vectors, so
/// tests that care about FIFO behavior get deterministic iteration.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    find_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    failing: AtomicBool,
    rejecting: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent operation fail with a database error. Calls are
    /// still counted.
    pub fn fail_everything(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent operation fail with a permanent remote
    /// rejection (HTTP 400). Calls are still counted.
    pub fn reject_everything(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
        self.rejecting.store(false, Ordering::SeqCst);
    }

    /// `find` and `find_one` share this counter.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Seed a document directly, bypassing the call counters.
    pub async fn seed(&self, collection: &str, document: Value) {
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Snapshot of a collection's documents in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check_failing(&self) -> Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Error::remote(400, "injected rejection"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::database("injected store failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|document| filter.matches(document)))
            .cloned())
    }

    async fn insert(&self, collection: &str, document: &Value) -> Result<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut collections = self.collections.lock().await;
        let documents = collections.entry(collection.to_string()).or_default();
        if let Some(id) = document.get("id") {
            if documents.iter().any(|existing| existing.get("id") == Some(id)) {
                return Err(Error::database(format!(
                    "duplicate id {} in {}",
                    id, collection
                )));
            }
        }
        documents.push(document.clone());
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<WriteOutcome> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut collections = self.collections.lock().await;
        let mut outcome = WriteOutcome::default();
        if let Some(documents) = collections.get_mut(collection) {
            for document in documents.iter_mut() {
                if filter.matches(document) {
                    outcome.matched += 1;
                    if apply_patch(document, patch) {
                        outcome.modified += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut collections = self.collections.lock().await;
        let mut outcome = WriteOutcome::default();
        if let Some(documents) = collections.get_mut(collection) {
            let before = documents.len();
            documents.retain(|document| !filter.matches(document));
            let removed = (before - documents.len()) as u64;
            outcome.matched = removed;
            outcome.modified = removed;
        }
        Ok(outcome)
    }
}

/// One recorded object upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPut {
    pub namespace: String,
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory object store recording every upload.
#[derive(Default)]
pub struct MemoryObjectStore {
    puts: Mutex<Vec<RecordedPut>>,
    fail_next: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `put` only; subsequent uploads succeed again.
    pub async fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub async fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::remote_transport("injected object store failure"));
        }
        let url = format!("https://objects.invalid/{}/{}", namespace, key);
        self.puts.lock().await.push(RecordedPut {
            namespace: namespace.to_string(),
            key: key.to_string(),
            bytes,
            content_type: content_type.to_string(),
        });
        Ok(url)
    }
}

/// Probe with a fixed answer.
pub struct StaticProbe {
    reachable: bool,
}

impl StaticProbe {
    pub fn up() -> Arc<Self> {
        Arc::new(Self { reachable: true })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self { reachable: false })
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable
    }
}

/// The adapter set behind a test engine, kept around for seeding and
/// assertions.
pub struct TestStores {
    pub local: Arc<MemoryStore>,
    pub remote: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
}

impl TestStores {
    pub async fn seed_local_feed(&self, feed: &FeedRecord) {
        let document = serde_json::to_value(feed).unwrap();
        self.local.seed(local::FEEDS, document).await;
    }

    pub async fn seed_remote_feed(&self, feed: &FeedRecord) {
        let document = serde_json::to_value(feed).unwrap();
        self.remote.seed(remote::FEEDS, document).await;
    }

    pub async fn seed_local_document(&self, collection: &str, document: Value) {
        self.local.seed(collection, document).await;
    }

    pub async fn seed_remote_document(&self, collection: &str, document: Value) {
        self.remote.seed(collection, document).await;
    }

    pub async fn local_collection(&self, collection: &str) -> Vec<Value> {
        self.local.documents(collection).await
    }

    pub async fn remote_collection(&self, collection: &str) -> Vec<Value> {
        self.remote.documents(collection).await
    }
}

/// Engine configuration with delays shrunk to keep tests fast. Attempt
/// budgets match production so retry accounting is exercised for real.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        interval_jitter: Duration::ZERO,
        initial_retry_delay: Duration::from_millis(2),
        max_attempts: 3,
        images_dir: PathBuf::from("unused"),
        ..SyncConfig::default()
    }
}

pub fn engine_with(
    mode: StoreMode,
    probe: Arc<dyn ConnectivityProbe>,
) -> (Arc<SyncEngine>, TestStores) {
    engine_with_config(mode, probe, test_config())
}

pub fn engine_with_config(
    mode: StoreMode,
    probe: Arc<dyn ConnectivityProbe>,
    config: SyncConfig,
) -> (Arc<SyncEngine>, TestStores) {
    let stores = TestStores {
        local: MemoryStore::new(),
        remote: MemoryStore::new(),
        objects: MemoryObjectStore::new(),
    };
    let local: Arc<dyn DocumentStore> = stores.local.clone();
    let remote: Arc<dyn DocumentStore> = stores.remote.clone();
    let objects: Arc<dyn ObjectStore> = stores.objects.clone();
    let engine = Arc::new(SyncEngine::new(local, remote, objects, probe, mode, config));
    (engine, stores)
}

/// A minimal well-formed feed record for tests, pending on both statuses.
pub fn sample_feed(id: &str) -> FeedRecord {
    let captured = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    FeedRecord {
        id: id.to_string(),
        device_label: "BG-1".to_string(),
        org_id: "org-1".to_string(),
        department: "kitchen".to_string(),
        feed_type: "prep-waste".to_string(),
        net_weight: Decimal::new(125, 2),
        total_weight: Decimal::new(975, 2),
        timestamp: captured,
        feed_started_at: captured,
        image_filename: None,
        image_status: ImageStatus::Pending,
        sync_status: SyncStatus::Pending,
        image_url: None,
        last_updated: captured,
        raw_weights: None,
    }
}
