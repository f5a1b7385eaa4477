//! Scheduler constants/helpers for the periodic sync jobs.

use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

/// Feed sync cadence in seconds.
pub const FEED_SYNC_INTERVAL_SECS: u64 = 5 * 60;

/// Change-queue processing cadence in seconds (shorter than feed sync).
pub const QUEUE_PROCESS_INTERVAL_SECS: u64 = 60;

/// Image offload cadence in seconds.
pub const OFFLOAD_INTERVAL_SECS: u64 = 5 * 60;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const INTERVAL_JITTER_SECS: u64 = 5;

/// Retries per push within a single feed sync cycle.
pub const MAX_RETRIES: u32 = 3;

/// Base delay before the first push retry.
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Attempt ceiling per change-queue entry across all cycles.
pub const MAX_ATTEMPTS: i32 = 5;

/// Queue entries processed per batch.
pub const SYNC_BATCH_SIZE: usize = 50;

/// Runtime configuration for the sync engine. Defaults match the constants
/// above; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub feed_sync_interval: Duration,
    pub queue_interval: Duration,
    pub offload_interval: Duration,
    pub interval_jitter: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_attempts: i32,
    pub sync_batch_size: usize,
    /// Directory holding locally buffered images awaiting offload.
    pub images_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_sync_interval: Duration::from_secs(FEED_SYNC_INTERVAL_SECS),
            queue_interval: Duration::from_secs(QUEUE_PROCESS_INTERVAL_SECS),
            offload_interval: Duration::from_secs(OFFLOAD_INTERVAL_SECS),
            interval_jitter: Duration::from_secs(INTERVAL_JITTER_SECS),
            max_retries: MAX_RETRIES,
            initial_retry_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_attempts: MAX_ATTEMPTS,
            sync_batch_size: SYNC_BATCH_SIZE,
            images_dir: PathBuf::from("images"),
        }
    }
}

/// Exponential backoff delay for a push attempt: `initial * 2^attempt`,
/// exponent capped so the shift cannot overflow.
pub fn retry_delay(initial: Duration, attempt: u32) -> Duration {
    const MAX_EXPONENT: u32 = 8;
    initial.saturating_mul(1u32 << attempt.min(MAX_EXPONENT))
}

/// Interval plus wall-clock-derived jitter, so overlapping jobs drift apart.
pub fn jittered(interval: Duration, jitter_bound: Duration) -> Duration {
    let bound_ms = jitter_bound.as_millis() as u64;
    let jitter_ms = if bound_ms > 0 {
        Utc::now().timestamp_millis().unsigned_abs() % bound_ms
    } else {
        0
    };
    interval + Duration::from_millis(jitter_ms)
}
