//! Object offload job: upload locally buffered images to object storage.

use chrono::Utc;
use log::{debug, error, warn};
use serde_json::json;

use crate::errors::{Error, Result};
use crate::models::{ImageStatus, SyncStatus};
use crate::store::{local, Filter};

use super::engine::SyncEngine;

impl SyncEngine {
    /// One offload pass. Returns the number of images uploaded.
    ///
    /// A referenced file that is not on disk yet is skipped silently and the
    /// record stays pending: the capture collaborator may still be writing
    /// it. There is no backoff here beyond the next scheduled pass.
    pub async fn run_offload_once(&self) -> usize {
        let pending = match self
            .local
            .find(
                local::FEEDS,
                &Filter::all()
                    .eq("imageStatus", "pending")
                    .exists("imageFilename"),
            )
            .await
        {
            Ok(documents) => documents,
            Err(err) => {
                error!("Image offload could not scan the local store: {}", err);
                return 0;
            }
        };

        if pending.is_empty() {
            return 0;
        }
        debug!("Found {} feeds with pending images", pending.len());

        let mut uploaded = 0usize;
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
            match self.offload_image(&id, &document).await {
                Ok(true) => uploaded += 1,
                Ok(false) => {}
                Err(err) => warn!(
                    "Image offload for feed {} failed, will retry next cycle: {}",
                    id, err
                ),
            }
            self.release_record(&id).await;
        }
        uploaded
    }

    /// Upload one feed's image. `Ok(false)` means skipped (file not on disk).
    async fn offload_image(&self, id: &str, document: &serde_json::Value) -> Result<bool> {
        let device_label = document
            .get("deviceLabel")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let Some(filename) = document
            .get("imageFilename")
            .and_then(|v| v.as_str())
            .map(String::from)
        else {
            return Ok(false);
        };

        let path = self.config.images_dir.join(&filename);
        if tokio::fs::metadata(&path).await.is_err() {
            debug!("Image file not found yet for feed {}: {}", id, path.display());
            return Ok(false);
        }

        let bytes = tokio::fs::read(&path).await?;
        let url = self
            .objects
            .put(&device_label, &filename, bytes, "image/jpeg")
            .await?;

        // Image completion also marks the whole record synced; the data path
        // may have done so already, which makes this a no-op on that field.
        let outcome = self
            .local
            .update(
                local::FEEDS,
                &Filter::by_id(id),
                &json!({
                    "imageStatus": ImageStatus::Synced,
                    "syncStatus": SyncStatus::Synced,
                    "imageUrl": url,
                    "lastUpdated": Utc::now(),
                }),
            )
            .await?;
        if outcome.modified != 1 {
            return Err(Error::database(format!(
                "image status update for feed {} modified {} documents",
                id, outcome.modified
            )));
        }
        debug!("Uploaded image for feed {}", id);
        Ok(true)
    }
}
