//! Station daemon: wires the sqlite and HTTP adapters into the sync engine
//! and keeps the periodic jobs running.

use anyhow::Context;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use wastehub_core::store::{ConnectivityProbe, DocumentStore, ObjectStore};
use wastehub_core::{StoreMode, SyncConfig, SyncEngine};
use wastehub_remote::{HttpConnectivityProbe, HttpObjectStore, RemoteStoreClient};
use wastehub_storage_sqlite::SqliteDocumentStore;

const DEFAULT_REPLICA_URL: &str = "http://localhost:8080";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn replica_url() -> String {
    env_or("WASTEHUB_REPLICA_URL", DEFAULT_REPLICA_URL)
        .trim_end_matches('/')
        .to_string()
}

fn data_dir() -> PathBuf {
    PathBuf::from(env_or("WASTEHUB_DATA_DIR", "data"))
}

fn store_mode() -> StoreMode {
    match env_or("WASTEHUB_STORE_MODE", "local_primary").as_str() {
        "remote_primary" => StoreMode::RemotePrimary,
        other => {
            if other != "local_primary" {
                warn!("Unknown store mode '{}', using local_primary", other);
            }
            StoreMode::LocalPrimary
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let run_once = std::env::args().any(|arg| arg == "--once");
    let replica = replica_url();
    let data = data_dir();
    let images = std::env::var("WASTEHUB_IMAGES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data.join("images"));
    let mode = store_mode();

    std::fs::create_dir_all(&data)
        .with_context(|| format!("could not create data directory {}", data.display()))?;
    std::fs::create_dir_all(&images)
        .with_context(|| format!("could not create images directory {}", images.display()))?;

    info!(
        "Starting station sync (replica={}, data={}, mode={:?})",
        replica,
        data.display(),
        mode
    );

    let local: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::open(data.join("station.db")).context("could not open local store")?,
    );
    let remote: Arc<dyn DocumentStore> =
        Arc::new(RemoteStoreClient::new(&replica).context("could not build replica client")?);
    let objects: Arc<dyn ObjectStore> =
        Arc::new(HttpObjectStore::new(&replica).context("could not build object store client")?);
    let probe: Arc<dyn ConnectivityProbe> =
        Arc::new(HttpConnectivityProbe::new(&replica).context("could not build probe")?);

    let config = SyncConfig {
        images_dir: images,
        ..SyncConfig::default()
    };
    let engine = Arc::new(SyncEngine::new(local, remote, objects, probe, mode, config));

    engine
        .run_bootstrap()
        .await
        .context("bootstrap migration failed")?;

    if run_once {
        engine.run_all_once().await;
        info!("Single sync pass complete");
        return Ok(());
    }

    let jobs = engine.spawn_jobs();
    tokio::signal::ctrl_c()
        .await
        .context("could not listen for shutdown signal")?;
    info!("Shutting down");
    for job in jobs {
        job.abort();
    }
    Ok(())
}
