//! Durable change-queue entries: deferred mutations against the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The deferred mutation itself. Insert and update carry their typed
/// payloads; there are no untyped pass-through blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueuedOperation {
    Insert { document: Value },
    Update { patch: Value },
    Delete,
}

impl QueuedOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }

    /// The payload carried by the operation, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Insert { document } => Some(document),
            Self::Update { patch } => Some(patch),
            Self::Delete => None,
        }
    }
}

/// Queue entry lifecycle. Entries are never deleted: they either complete,
/// resolve against a newer remote copy, or stall once their attempt budget
/// is spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Completed,
    Resolved,
}

/// A durable intent record. Identity is (collection, document id, operation
/// kind, enqueue timestamp); re-enqueuing the same logical change creates a
/// new entry rather than mutating an old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub entry_id: String,
    pub collection: String,
    pub document_id: String,
    pub operation: QueuedOperation,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl QueueEntry {
    pub fn new(collection: &str, document_id: &str, operation: QueuedOperation) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            operation,
            enqueued_at: Utc::now(),
            status: QueueStatus::Pending,
            attempts: 0,
            last_attempt: None,
            last_error: None,
            resolution: None,
        }
    }
}
