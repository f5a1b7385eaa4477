//! Periodic feed sync job: drive pending feed records through the push engine.

use log::{debug, error, info, warn};

use crate::models::FeedRecord;
use crate::store::{local, Filter};

use super::engine::SyncEngine;

impl SyncEngine {
    /// One feed sync pass. Returns the number of records pushed successfully.
    ///
    /// Failures are contained per record: a bad document or an exhausted
    /// push never aborts the batch, it just stays pending for the next pass.
    pub async fn run_feed_sync_once(&self) -> usize {
        if !self.probe.is_reachable().await {
            info!("Remote store unreachable, skipping feed sync cycle");
            return 0;
        }

        // Absent syncStatus counts as pending.
        let pending = match self
            .local
            .find(local::FEEDS, &Filter::all().ne("syncStatus", "synced"))
            .await
        {
            Ok(documents) => documents,
            Err(err) => {
                error!("Feed sync could not scan the local store: {}", err);
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }
        debug!("Found {} feeds pending sync", pending.len());

        let mut pushed = 0usize;
        for document in pending {
            let Some(id) = document.get("id").and_then(|v| v.as_str()).map(String::from)
            else {
                warn!("Skipping feed document without an id field");
                continue;
            };

            if !self.claim_record(&id).await {
                debug!("Feed {} is being worked by another job, skipping", id);
                continue;
            }

            let record = match serde_json::from_value::<FeedRecord>(document) {
                Ok(record) => record,
                Err(err) => {
                    warn!("Skipping malformed feed document {}: {}", id, err);
                    self.release_record(&id).await;
                    continue;
                }
            };

            if self.push_feed(&record).await {
                pushed += 1;
            } else {
                warn!("Feed {} failed to sync, will retry next cycle", id);
            }
            self.release_record(&id).await;
        }
        pushed
    }
}
