//! The sync engine value: adapters, config, background loops.

use log::info;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::store::{ConnectivityProbe, DocumentStore, ObjectStore, StoreMode};

use super::scheduler::{jittered, SyncConfig};

/// Reconciles the station-local store with the central replica.
///
/// Constructed once at process start and shared (via `Arc`) with every
/// scheduled job; there is no hidden global connection state. The engine is
/// the sole component permitted to copy documents between the two stores.
pub struct SyncEngine {
    pub(super) local: Arc<dyn DocumentStore>,
    pub(super) remote: Arc<dyn DocumentStore>,
    pub(super) objects: Arc<dyn ObjectStore>,
    pub(super) probe: Arc<dyn ConnectivityProbe>,
    pub(super) mode: StoreMode,
    pub(super) config: SyncConfig,
    /// Feed record ids currently being worked by some job. The feed sync and
    /// offload jobs both mutate feed status fields; a record claimed by one
    /// is skipped (not blocked on) by the other and picked up next cycle.
    in_flight: Mutex<HashSet<String>>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn DocumentStore>,
        remote: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        probe: Arc<dyn ConnectivityProbe>,
        mode: StoreMode,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            objects,
            probe,
            mode,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Claim a feed record for the duration of one sync attempt. Returns
    /// false when another job already holds it.
    pub(super) async fn claim_record(&self, id: &str) -> bool {
        self.in_flight.lock().await.insert(id.to_string())
    }

    pub(super) async fn release_record(&self, id: &str) {
        self.in_flight.lock().await.remove(id);
    }

    /// Spawn the three independent periodic jobs. They share no in-memory
    /// state beyond the engine itself and never block each other's schedule.
    /// There is no cancellation surface; callers drop the handles and let
    /// process termination end the loops.
    pub fn spawn_jobs(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting sync jobs: feed={}s queue={}s offload={}s",
            self.config.feed_sync_interval.as_secs(),
            self.config.queue_interval.as_secs(),
            self.config.offload_interval.as_secs()
        );

        let feed_engine = Arc::clone(self);
        let feed_job = tokio::spawn(async move {
            loop {
                feed_engine.run_feed_sync_once().await;
                let delay = jittered(
                    feed_engine.config.feed_sync_interval,
                    feed_engine.config.interval_jitter,
                );
                tokio::time::sleep(delay).await;
            }
        });

        let queue_engine = Arc::clone(self);
        let queue_job = tokio::spawn(async move {
            loop {
                queue_engine.run_queue_once().await;
                let delay = jittered(
                    queue_engine.config.queue_interval,
                    queue_engine.config.interval_jitter,
                );
                tokio::time::sleep(delay).await;
            }
        });

        let offload_engine = Arc::clone(self);
        let offload_job = tokio::spawn(async move {
            loop {
                offload_engine.run_offload_once().await;
                let delay = jittered(
                    offload_engine.config.offload_interval,
                    offload_engine.config.interval_jitter,
                );
                tokio::time::sleep(delay).await;
            }
        });

        vec![feed_job, queue_job, offload_job]
    }

    /// One pass of every job, in order. Used by CLI/manual runs; the process
    /// simply exits afterwards.
    pub async fn run_all_once(&self) {
        self.run_feed_sync_once().await;
        self.run_queue_once().await;
        self.run_offload_once().await;
    }
}
