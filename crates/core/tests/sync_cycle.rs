//! End-to-end sync cycle against in-memory adapters.

use serde_json::json;

use wastehub_core::models::QueuedOperation;
use wastehub_core::store::{local, remote};
use wastehub_core::testing::{engine_with, engine_with_config, sample_feed, test_config, StaticProbe};
use wastehub_core::StoreMode;

#[tokio::test]
async fn pending_feed_converges_in_one_cycle() {
    let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
    stores.seed_local_feed(&sample_feed("f1")).await;

    engine.run_all_once().await;

    let remote_feeds = stores.remote_collection(remote::FEEDS).await;
    assert_eq!(remote_feeds.len(), 1);
    assert_eq!(remote_feeds[0]["id"], "f1");
    assert_eq!(remote_feeds[0]["deviceLabel"], "BG-1");

    let local_feeds = stores.local_collection(local::FEEDS).await;
    assert_eq!(local_feeds[0]["syncStatus"], "synced");
}

#[tokio::test]
async fn repeated_cycles_write_nothing_new() {
    let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
    stores.seed_local_feed(&sample_feed("f1")).await;

    engine.run_all_once().await;
    let inserts = stores.remote.insert_calls();

    engine.run_all_once().await;
    engine.run_all_once().await;

    assert_eq!(stores.remote.insert_calls(), inserts);
    let remote_feeds = stores.remote_collection(remote::FEEDS).await;
    assert_eq!(remote_feeds.len(), 1);
}

#[tokio::test]
async fn offline_station_recovers_when_connectivity_returns() {
    let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::down());
    stores.seed_local_feed(&sample_feed("f1")).await;
    engine
        .enqueue(remote::ORGS, "o1", QueuedOperation::Delete)
        .await;
    stores.remote.fail_everything();

    engine.run_all_once().await;
    assert!(stores.remote_collection(remote::FEEDS).await.is_empty());

    // Connectivity returns; a fresh engine over the same stores simulates a
    // restart with the probe flipping while all durable state carries over.
    stores.remote.recover();
    let recovered = reattach(&stores);

    recovered.run_all_once().await;

    let remote_feeds = stores.remote_collection(remote::FEEDS).await;
    assert_eq!(remote_feeds.len(), 1);
    let queue = stores.local_collection(local::SYNC_QUEUE).await;
    assert_eq!(queue[0]["status"], "completed");
}

#[tokio::test]
async fn data_and_image_paths_converge_independently() {
    let images = tempfile::tempdir().unwrap();
    std::fs::write(images.path().join("shot.jpg"), b"jpeg").unwrap();
    let mut config = test_config();
    config.images_dir = images.path().to_path_buf();
    let (engine, stores) = engine_with_config(StoreMode::LocalPrimary, StaticProbe::up(), config);

    let mut feed = sample_feed("f1");
    feed.image_filename = Some("shot.jpg".to_string());
    stores.seed_local_feed(&feed).await;

    engine.run_all_once().await;

    let local_feeds = stores.local_collection(local::FEEDS).await;
    assert_eq!(local_feeds[0]["syncStatus"], "synced");
    assert_eq!(local_feeds[0]["imageStatus"], "synced");
    assert_eq!(
        local_feeds[0]["imageUrl"],
        json!("https://objects.invalid/BG-1/shot.jpg")
    );
}

/// Build a second engine sharing the same adapter set, as a restart would.
fn reattach(
    stores: &wastehub_core::testing::TestStores,
) -> std::sync::Arc<wastehub_core::SyncEngine> {
    use std::sync::Arc;
    use wastehub_core::{ConnectivityProbe, DocumentStore, ObjectStore, SyncEngine};

    let local: Arc<dyn DocumentStore> = stores.local.clone();
    let remote: Arc<dyn DocumentStore> = stores.remote.clone();
    let objects: Arc<dyn ObjectStore> = stores.objects.clone();
    let probe: Arc<dyn ConnectivityProbe> = StaticProbe::up();
    Arc::new(SyncEngine::new(
        local,
        remote,
        objects,
        probe,
        StoreMode::LocalPrimary,
        test_config(),
    ))
}
