//! Store adapter contracts shared by the local and remote backends.

mod filter;

pub use filter::{Condition, Filter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// Collection names used on the station-local store.
pub mod local {
    pub const FEEDS: &str = "local_feeds";
    pub const USERS: &str = "local_users";
    pub const ORGS: &str = "local_orgs";
    pub const FEED_TYPES: &str = "local_feed_types";
    pub const STATIONS: &str = "stations";
    pub const STATION_LABELS: &str = "station_labels";
    pub const SYNC_QUEUE: &str = "sync_queue";
}

/// Collection names on the central replica.
pub mod remote {
    pub const FEEDS: &str = "global_feeds";
    pub const USERS: &str = "global_users";
    pub const ORGS: &str = "global_orgs";
    pub const FEED_TYPES: &str = "global_feed_types";
    pub const STATIONS: &str = "global_stations";
    pub const STATION_LABELS: &str = "global_station_labels";
}

/// Whether the process runs against a station-local primary store or talks
/// directly to the central replica. Bootstrap and the change queue only make
/// sense in [`StoreMode::LocalPrimary`]; there is nothing to reconcile when
/// the remote store is already the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    LocalPrimary,
    RemotePrimary,
}

/// Outcome of a write that targets existing documents.
///
/// `matched` and `modified` are reported separately so callers can tell
/// "nothing to do" apart from "write silently failed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Document store contract implemented by both the local sqlite adapter and
/// the remote replica client. Documents are JSON objects carrying an `id`
/// field; patches are flat JSON objects merged field-by-field into matching
/// documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Insert a document. Returning `Ok` means the write was acknowledged;
    /// an unacknowledged write must surface as an error.
    async fn insert(&self, collection: &str, document: &Value) -> Result<()>;

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<WriteOutcome>;

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome>;
}

/// Reachability probe for the remote store.
///
/// A cost-saving gate only, never a correctness dependency: `false` makes a
/// sync cycle skip itself; a stale `true` just means the cycle's own
/// operations fail and defer.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Attempt a short-lived, bounded connection to the remote store.
    /// Returns false on any error, including timeout. Never errors.
    async fn is_reachable(&self) -> bool;
}

/// Object storage contract for image offload.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `namespace/key` and return the public URL.
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;
}

/// Map a remote collection to the station-local collection mirroring it.
/// Used by the change-queue conflict branch to overwrite the local copy.
pub fn local_counterpart(remote_collection: &str) -> Option<&'static str> {
    match remote_collection {
        remote::FEEDS => Some(local::FEEDS),
        remote::USERS => Some(local::USERS),
        remote::ORGS => Some(local::ORGS),
        remote::FEED_TYPES => Some(local::FEED_TYPES),
        remote::STATIONS => Some(local::STATIONS),
        remote::STATION_LABELS => Some(local::STATION_LABELS),
        _ => None,
    }
}

/// Merge a flat patch object into a document, replacing overlapping fields.
/// Returns true when the document actually changed.
pub fn apply_patch(document: &mut Value, patch: &Value) -> bool {
    let Some(patch_map) = patch.as_object() else {
        return false;
    };
    let Some(doc_map) = document.as_object_mut() else {
        return false;
    };
    let mut changed = false;
    for (key, value) in patch_map {
        if doc_map.get(key) != Some(value) {
            doc_map.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_patch_reports_change() {
        let mut doc = json!({"id": "a", "syncStatus": "pending"});
        let changed = apply_patch(&mut doc, &json!({"syncStatus": "synced"}));
        assert!(changed);
        assert_eq!(doc["syncStatus"], "synced");
        assert_eq!(doc["id"], "a");
    }

    #[test]
    fn apply_patch_is_idempotent() {
        let mut doc = json!({"id": "a", "syncStatus": "synced"});
        let changed = apply_patch(&mut doc, &json!({"syncStatus": "synced"}));
        assert!(!changed);
    }
}
