//! Durable change queue: deferred remote mutations with conflict resolution.

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::errors::Result;
use crate::models::{QueueEntry, QueueStatus, QueuedOperation};
use crate::store::{local, local_counterpart, Filter, StoreMode};

use super::engine::SyncEngine;

/// Resolution note written when a stale intent is discarded.
const USED_REMOTE_VERSION: &str = "used remote version";

/// True when the queued payload is a stale intent: both sides carry a
/// `lastUpdated` and the queued one is strictly older than the remote
/// document's. Timestamps are compared as instants when both parse as
/// RFC 3339, falling back to lexical ordering otherwise.
fn queued_is_stale(queued_payload: &Value, remote_document: &Value) -> bool {
    let (Some(queued_ts), Some(remote_ts)) = (
        queued_payload.get("lastUpdated").and_then(Value::as_str),
        remote_document.get("lastUpdated").and_then(Value::as_str),
    ) else {
        return false;
    };

    let queued_parsed = chrono::DateTime::parse_from_rfc3339(queued_ts);
    let remote_parsed = chrono::DateTime::parse_from_rfc3339(remote_ts);
    match (queued_parsed, remote_parsed) {
        (Ok(queued), Ok(remote)) => queued < remote,
        _ => queued_ts < remote_ts,
    }
}

enum Processed {
    Completed,
    Resolved,
}

impl SyncEngine {
    /// Append a deferred mutation. Best-effort: enqueue is itself the
    /// fallback path for a failed direct remote write, so a failure here is
    /// logged and swallowed rather than surfaced to the collaborator.
    pub async fn enqueue(&self, collection: &str, document_id: &str, operation: QueuedOperation) {
        let entry = QueueEntry::new(collection, document_id, operation);
        let document = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(err) => {
                warn!("Could not serialize queue entry for {}: {}", document_id, err);
                return;
            }
        };
        match self.local.insert(local::SYNC_QUEUE, &document).await {
            Ok(()) => debug!(
                "Enqueued {} for {}/{} as {}",
                entry.operation.kind(),
                collection,
                document_id,
                entry.entry_id
            ),
            Err(err) => warn!(
                "Could not enqueue {} for {}/{}: {}",
                entry.operation.kind(),
                collection,
                document_id,
                err
            ),
        }
    }

    /// Process one batch of pending entries, oldest first. Returns the
    /// number of entries that reached a terminal state this pass.
    pub async fn run_queue_once(&self) -> usize {
        if self.mode != StoreMode::LocalPrimary {
            debug!("Store mode is remote-primary, nothing to reconcile");
            return 0;
        }

        let mut entries = match self.pending_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Could not read the sync queue: {}", err);
                return 0;
            }
        };
        entries.truncate(self.config.sync_batch_size);
        if entries.is_empty() {
            return 0;
        }
        debug!("Processing {} queued changes", entries.len());

        let mut terminal = 0usize;
        for entry in entries {
            match self.process_entry(&entry).await {
                Ok(Processed::Completed) => {
                    terminal += 1;
                    self.mark_entry(&entry, QueueStatus::Completed, None).await;
                }
                Ok(Processed::Resolved) => {
                    terminal += 1;
                    self.mark_entry(&entry, QueueStatus::Resolved, Some(USED_REMOTE_VERSION))
                        .await;
                }
                Err(err) => {
                    // No immediate retry within this batch; the entry stays
                    // pending with its attempt accounting updated.
                    warn!(
                        "Queue entry {} ({} {}/{}) failed attempt {}: {}",
                        entry.entry_id,
                        entry.operation.kind(),
                        entry.collection,
                        entry.document_id,
                        entry.attempts + 1,
                        err
                    );
                    self.record_failed_attempt(&entry, &err.to_string()).await;
                }
            }
        }
        terminal
    }

    /// Entries past their attempt ceiling. They stay stored and inspectable
    /// but are excluded from batch selection; nothing alerts on them.
    pub async fn stalled_entries(&self) -> Result<Vec<QueueEntry>> {
        let documents = self
            .local
            .find(local::SYNC_QUEUE, &Filter::all().eq("status", "pending"))
            .await?;
        let mut stalled = Vec::new();
        for document in documents {
            if let Ok(entry) = serde_json::from_value::<QueueEntry>(document) {
                if entry.attempts >= self.config.max_attempts {
                    stalled.push(entry);
                }
            }
        }
        Ok(stalled)
    }

    async fn pending_entries(&self) -> Result<Vec<QueueEntry>> {
        let documents = self
            .local
            .find(
                local::SYNC_QUEUE,
                &Filter::all()
                    .eq("status", "pending")
                    .lt("attempts", self.config.max_attempts),
            )
            .await?;
        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value::<QueueEntry>(document) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("Skipping malformed queue entry: {}", err),
            }
        }
        // FIFO: oldest enqueued first.
        entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(entries)
    }

    async fn process_entry(&self, entry: &QueueEntry) -> Result<Processed> {
        let remote_document = self
            .remote
            .find_one(&entry.collection, &Filter::by_id(&entry.document_id))
            .await?;

        if let (Some(payload), Some(document)) =
            (entry.operation.payload(), remote_document.as_ref())
        {
            if queued_is_stale(payload, document) {
                info!(
                    "Queued {} for {}/{} is older than the remote copy, using remote version",
                    entry.operation.kind(),
                    entry.collection,
                    entry.document_id
                );
                self.adopt_remote_version(entry, document).await?;
                return Ok(Processed::Resolved);
            }
        }

        match &entry.operation {
            QueuedOperation::Insert { document } => {
                self.remote.insert(&entry.collection, document).await?;
            }
            QueuedOperation::Update { patch } => {
                // A missing remote document is "nothing to do", not an error;
                // the outcome distinction exists exactly for this.
                self.remote
                    .update(&entry.collection, &Filter::by_id(&entry.document_id), patch)
                    .await?;
            }
            QueuedOperation::Delete => {
                self.remote
                    .delete(&entry.collection, &Filter::by_id(&entry.document_id))
                    .await?;
            }
        }
        Ok(Processed::Completed)
    }

    /// Replace the local copy with the remote document's current state. A
    /// patch merge is not enough here: fields the remote document no longer
    /// carries must disappear locally too, so the old copy is deleted first.
    async fn adopt_remote_version(&self, entry: &QueueEntry, remote_document: &Value) -> Result<()> {
        let Some(collection) = local_counterpart(&entry.collection) else {
            warn!(
                "No local counterpart for collection {}, skipping local overwrite",
                entry.collection
            );
            return Ok(());
        };
        self.local
            .delete(collection, &Filter::by_id(&entry.document_id))
            .await?;
        self.local.insert(collection, remote_document).await?;
        Ok(())
    }

    async fn mark_entry(&self, entry: &QueueEntry, status: QueueStatus, resolution: Option<&str>) {
        let mut patch = json!({
            "status": status,
            "lastAttempt": Utc::now(),
        });
        if let Some(note) = resolution {
            patch["resolution"] = json!(note);
        }
        if let Err(err) = self
            .local
            .update(
                local::SYNC_QUEUE,
                &Filter::all().eq("entryId", entry.entry_id.as_str()),
                &patch,
            )
            .await
        {
            warn!("Could not mark queue entry {}: {}", entry.entry_id, err);
        }
    }

    async fn record_failed_attempt(&self, entry: &QueueEntry, message: &str) {
        if let Err(err) = self
            .local
            .update(
                local::SYNC_QUEUE,
                &Filter::all().eq("entryId", entry.entry_id.as_str()),
                &json!({
                    "attempts": entry.attempts + 1,
                    "lastAttempt": Utc::now(),
                    "lastError": message,
                }),
            )
            .await
        {
            warn!(
                "Could not record failed attempt for queue entry {}: {}",
                entry.entry_id, err
            );
        }
    }
}
