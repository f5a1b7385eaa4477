//! The synchronization engine and its periodic jobs.
//!
//! Everything here runs against the [`crate::store`] adapter traits, so the
//! engine itself is storage- and transport-agnostic. The binary wires in the
//! sqlite and HTTP adapters; tests wire in in-memory ones.

mod bootstrap;
mod change_queue;
mod engine;
mod feed_job;
mod offload;
mod push;
mod scheduler;

pub use engine::SyncEngine;
pub use scheduler::{
    jittered, retry_delay, SyncConfig, FEED_SYNC_INTERVAL_SECS, INITIAL_RETRY_DELAY_MS,
    INTERVAL_JITTER_SECS, MAX_ATTEMPTS, MAX_RETRIES, OFFLOAD_INTERVAL_SECS,
    QUEUE_PROCESS_INTERVAL_SECS, SYNC_BATCH_SIZE,
};
