//! Record push engine: idempotent single-feed push with bounded backoff.

use chrono::Utc;
use log::{debug, error, warn};
use serde_json::json;

use crate::errors::{Error, Result, RetryClass};
use crate::models::{FeedRecord, SyncStatus};
use crate::store::{local, remote, Filter};

use super::engine::SyncEngine;
use super::scheduler::retry_delay;

impl SyncEngine {
    /// Push one feed record to the central replica.
    ///
    /// Retries are exhausted within this call (bounded exponential backoff)
    /// rather than deferred indefinitely, so a brief network blip does not
    /// cost a whole cycle interval. Returns false once the attempt budget is
    /// spent; the record's local status is left untouched for the next cycle.
    pub async fn push_feed(&self, record: &FeedRecord) -> bool {
        let mut attempt = 0u32;
        loop {
            match self.try_push_feed(record).await {
                Ok(()) => return true,
                Err(err) => {
                    if err.retry_class() == RetryClass::Permanent {
                        // A malformed payload stays malformed; retrying only
                        // burns the budget a transient failure could use.
                        error!(
                            "Push of feed {} failed permanently, not retrying: {}",
                            record.id, err
                        );
                        return false;
                    }
                    if attempt < self.config.max_retries {
                        let delay = retry_delay(self.config.initial_retry_delay, attempt);
                        warn!(
                            "Push of feed {} failed, retrying in {}ms (attempt {}/{}): {}",
                            record.id,
                            delay.as_millis(),
                            attempt + 1,
                            self.config.max_retries,
                            err
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        error!(
                            "Push of feed {} failed after {} retries: {}",
                            record.id, self.config.max_retries, err
                        );
                        return false;
                    }
                }
            }
        }
    }

    async fn try_push_feed(&self, record: &FeedRecord) -> Result<()> {
        // Existence check on the composite key, not the id alone: after a
        // partial failure a re-pushed payload can collide on id while being
        // a different capture.
        let existing = self
            .remote
            .find_one(
                remote::FEEDS,
                &Filter::all()
                    .eq("id", record.id.as_str())
                    .eq("deviceLabel", record.device_label.as_str())
                    .eq("timestamp", serde_json::to_value(record.timestamp)?),
            )
            .await?;

        if existing.is_none() {
            let document = serde_json::to_value(record)?;
            // Insert returning Ok is the write acknowledgment; anything else
            // already surfaced as Err.
            self.remote.insert(remote::FEEDS, &document).await?;
            debug!("Synced feed {} to the central replica", record.id);
        } else {
            debug!("Feed {} already exists remotely, skipping insert", record.id);
        }

        // The local status update must itself be confirmed. When it is not,
        // the whole attempt counts as failed even though the remote write
        // landed: the next cycle re-runs the existence check and converges.
        let outcome = self
            .local
            .update(
                local::FEEDS,
                &Filter::by_id(&record.id),
                &json!({
                    "syncStatus": SyncStatus::Synced,
                    "lastUpdated": Utc::now(),
                }),
            )
            .await?;
        if outcome.modified != 1 {
            return Err(Error::database(format!(
                "local status update for feed {} modified {} documents",
                record.id, outcome.modified
            )));
        }
        Ok(())
    }
}
