//! Feed records: one waste-tracking event per document.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of raw weight samples retained per feed.
pub const RAW_WEIGHT_WINDOW: usize = 300;

/// Data sync lifecycle of a feed record.
///
/// `Pending` is the explicit initial variant; documents written by the
/// capture collaborator may omit the field entirely, which deserializes to
/// `Pending` as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

/// Image offload lifecycle, independent of [`SyncStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    #[default]
    Pending,
    Synced,
}

/// One raw scale sample captured during a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWeightSample {
    pub voltage: Decimal,
    pub value: Decimal,
}

/// One waste-tracking event.
///
/// Weights are decimals serialized as strings so no precision is lost in
/// transit. `sync_status` and `image_status` evolve independently: a record
/// may be data-synced before its image is, or the other way around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub id: String,
    pub device_label: String,
    pub org_id: String,
    pub department: String,
    pub feed_type: String,
    pub net_weight: Decimal,
    pub total_weight: Decimal,
    pub timestamp: DateTime<Utc>,
    pub feed_started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
    #[serde(default)]
    pub image_status: ImageStatus,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// Timestamp-keyed audit series of scale samples, capped to the most
    /// recent [`RAW_WEIGHT_WINDOW`] entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_weights: Option<BTreeMap<String, RawWeightSample>>,
}

impl FeedRecord {
    /// Append a raw scale sample, trimming the series to the bounded window.
    pub fn record_raw_sample(&mut self, sampled_at: DateTime<Utc>, sample: RawWeightSample) {
        let series = self.raw_weights.get_or_insert_with(BTreeMap::new);
        series.insert(sampled_at.to_rfc3339(), sample);
        while series.len() > RAW_WEIGHT_WINDOW {
            // BTreeMap keys are RFC 3339 strings, so the first key is the oldest.
            let oldest = series.keys().next().cloned();
            match oldest {
                Some(key) => series.remove(&key),
                None => break,
            };
        }
    }
}
