//! Bootstrap migration: seed a freshly provisioned station from the replica.

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::models::{FeedType, Organization, Station, StationLabel, User};
use crate::store::{local, remote, Filter, StoreMode};

use super::engine::SyncEngine;

impl SyncEngine {
    /// Run the one-time provisioning migration. Local-primary mode only; a
    /// deployment talking directly to the replica has nothing to mirror.
    ///
    /// Steps run in a fixed order and each failure is contained: a step that
    /// cannot reach the replica logs and moves on, leaving whatever local
    /// state exists untouched. The single escalating condition is a station
    /// with no resolvable device label, since none of the remaining steps
    /// can proceed meaningfully without one.
    pub async fn run_bootstrap(&self) -> Result<()> {
        if self.mode != StoreMode::LocalPrimary {
            info!("Store mode is remote-primary, skipping bootstrap migration");
            return Ok(());
        }
        info!("Starting bootstrap migration");

        if let Err(err) = self.migrate_identity().await {
            warn!("Identity migration failed: {}", err);
        }

        let label = self.resolve_station_label().await?;
        info!(
            "Resolved device label {} with {} feed organizations",
            label.device_label,
            label.feed_org_ids.len()
        );

        if let Err(err) = self.migrate_settings(&label).await {
            warn!("Settings migration failed, keeping local settings: {}", err);
        }
        if let Err(err) = self.migrate_users(&label).await {
            warn!("User migration failed, preserving local users: {}", err);
        }
        if let Err(err) = self.migrate_organizations(&label).await {
            warn!("Organization migration failed: {}", err);
        }
        if let Err(err) = self.migrate_feed_types(&label).await {
            warn!("Feed type migration failed, preserving local catalog: {}", err);
        }

        info!("Bootstrap migration complete");
        Ok(())
    }

    /// Step 1: pull station identity records, only on first provisioning.
    /// Existing local station records always win; an operator's in-progress
    /// state is never overwritten.
    async fn migrate_identity(&self) -> Result<()> {
        let existing = self.local.find(local::STATIONS, &Filter::all()).await?;
        if !existing.is_empty() {
            info!(
                "Found {} existing station records, skipping identity migration",
                existing.len()
            );
            return Ok(());
        }

        let stations = self
            .remote
            .find(
                remote::STATIONS,
                &Filter::all().eq("stationKind", "tracking"),
            )
            .await?;
        info!("Fetched {} tracking stations from the replica", stations.len());
        for document in &stations {
            if let Err(err) = self.local.insert(local::STATIONS, document).await {
                warn!("Could not store station record: {}", err);
            }
        }
        Ok(())
    }

    /// The device label gates every later step. Local first; when the local
    /// store has none, attempt to pull the label referenced by a local
    /// station record from the replica.
    async fn resolve_station_label(&self) -> Result<StationLabel> {
        if let Some(document) = self
            .local
            .find_one(local::STATION_LABELS, &Filter::all())
            .await?
        {
            return Ok(serde_json::from_value(document)?);
        }

        let station = self
            .local
            .find_one(local::STATIONS, &Filter::all())
            .await?
            .map(serde_json::from_value::<Station>)
            .transpose()?;
        let label_id = station.and_then(|s| s.device_label_id).ok_or_else(|| {
            Error::NotProvisioned("no device label resolvable for this station".to_string())
        })?;

        let document = self
            .remote
            .find_one(remote::STATION_LABELS, &Filter::by_id(&label_id))
            .await
            .unwrap_or(None)
            .ok_or_else(|| {
                Error::NotProvisioned(format!("device label {} not found", label_id))
            })?;
        self.local.insert(local::STATION_LABELS, &document).await?;
        Ok(serde_json::from_value(document)?)
    }

    /// Step 2: merge remote settings into the local label document. Local
    /// values win for overlapping keys; remote supplies whatever is missing.
    async fn migrate_settings(&self, label: &StationLabel) -> Result<()> {
        let remote_label = self
            .remote
            .find_one(
                remote::STATION_LABELS,
                &Filter::all().eq("deviceLabel", label.device_label.as_str()),
            )
            .await?;
        let Some(remote_label) = remote_label else {
            debug!("No remote settings for label {}", label.device_label);
            return Ok(());
        };
        let remote_label: StationLabel = serde_json::from_value(remote_label)?;

        let mut merged = label.clone();
        if !merged.merge_remote_settings(&remote_label.settings) {
            debug!("Local settings already cover all remote keys");
            return Ok(());
        }

        let outcome = self
            .local
            .update(
                local::STATION_LABELS,
                &Filter::by_id(&label.id),
                &json!({"settings": merged.settings}),
            )
            .await?;
        info!(
            "Merged remote settings into label {} ({} modified)",
            label.device_label, outcome.modified
        );
        Ok(())
    }

    /// Step 3: replace the local user set, but only when the replica
    /// actually returned matching users. A failed or empty remote response
    /// never truncates a working station to zero operators.
    async fn migrate_users(&self, label: &StationLabel) -> Result<()> {
        if label.feed_org_ids.is_empty() {
            info!("Device label has no feed organizations, skipping user migration");
            return Ok(());
        }
        let org_values: Vec<Value> =
            label.feed_org_ids.iter().map(|id| json!(id)).collect();
        let matching = self
            .remote
            .find(
                remote::USERS,
                &Filter::all().is_in("feedOrgIds", org_values),
            )
            .await?;
        if matching.is_empty() {
            info!("No matching users on the replica, preserving local user set");
            return Ok(());
        }

        let mut updated = 0usize;
        let mut inserted = 0usize;
        for document in &matching {
            let user: User = match serde_json::from_value(document.clone()) {
                Ok(user) => user,
                Err(err) => {
                    warn!("Skipping malformed remote user: {}", err);
                    continue;
                }
            };
            let outcome = self
                .local
                .update(local::USERS, &Filter::by_id(&user.id), document)
                .await?;
            if outcome.matched == 0 {
                self.local.insert(local::USERS, document).await?;
                inserted += 1;
            } else {
                updated += 1;
            }
        }
        info!("User migration complete: {} updated, {} inserted", updated, inserted);
        Ok(())
    }

    /// Step 4: recursive closure fetch over the organization graph rooted at
    /// the label's feed organizations. Visited-id de-duplication guarantees
    /// termination on cyclic or repeated references. The local store is
    /// never left with zero organizations: when the replica is unreachable
    /// or the closure is empty, a single default local-only organization is
    /// synthesized instead.
    async fn migrate_organizations(&self, label: &StationLabel) -> Result<()> {
        if label.feed_org_ids.is_empty() {
            info!("Device label has no feed organizations, ensuring a default one");
            return self.ensure_default_org().await;
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = label.feed_org_ids.clone();
        let mut fetched: Vec<Value> = Vec::new();
        let mut remote_ok = true;

        while let Some(org_id) = queue.pop() {
            if !visited.insert(org_id.clone()) {
                continue;
            }
            match self
                .remote
                .find_one(remote::ORGS, &Filter::by_id(&org_id))
                .await
            {
                Ok(Some(document)) => {
                    if let Ok(org) = serde_json::from_value::<Organization>(document.clone()) {
                        queue.extend(org.children);
                    }
                    fetched.push(document);
                }
                Ok(None) => debug!("Organization {} not found on the replica", org_id),
                Err(err) => {
                    warn!("Could not fetch organization {}: {}", org_id, err);
                    remote_ok = false;
                    break;
                }
            }
        }

        if !remote_ok || fetched.is_empty() {
            return self.ensure_default_org().await;
        }

        info!("Importing {} organizations", fetched.len());
        for document in &fetched {
            let Some(id) = document.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let outcome = self
                .local
                .update(local::ORGS, &Filter::by_id(id), document)
                .await?;
            if outcome.matched == 0 {
                self.local.insert(local::ORGS, document).await?;
            }
        }
        Ok(())
    }

    async fn ensure_default_org(&self) -> Result<()> {
        let existing = self.local.find(local::ORGS, &Filter::all()).await?;
        if !existing.is_empty() {
            info!("Preserving {} existing local organizations", existing.len());
            return Ok(());
        }
        let default_org = serde_json::to_value(Organization::local_default())?;
        self.local.insert(local::ORGS, &default_org).await?;
        info!("Created default local organization");
        Ok(())
    }

    /// Step 5: replace the feed type catalog only when the replica returned
    /// at least one matching definition for this device label; otherwise the
    /// existing local catalog stays untouched.
    async fn migrate_feed_types(&self, label: &StationLabel) -> Result<()> {
        let matching = self
            .remote
            .find(
                remote::FEED_TYPES,
                &Filter::all().eq("deviceLabel", label.device_label.as_str()),
            )
            .await?;
        if matching.is_empty() {
            info!("No matching feed types on the replica, preserving local catalog");
            return Ok(());
        }

        self.local
            .delete(local::FEED_TYPES, &Filter::all())
            .await?;
        let mut imported = 0usize;
        for document in &matching {
            if serde_json::from_value::<FeedType>(document.clone()).is_err() {
                warn!("Skipping malformed remote feed type");
                continue;
            }
            self.local.insert(local::FEED_TYPES, document).await?;
            imported += 1;
        }
        info!("Imported {} feed types", imported);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine_with, StaticProbe};

    fn label_doc(feed_org_ids: &[&str]) -> Value {
        json!({
            "id": "label-1",
            "deviceLabel": "BG-1",
            "feedOrgIds": feed_org_ids,
            "settings": {"tare": 12}
        })
    }

    fn org(id: &str, name: &str, children: &[&str]) -> Value {
        json!({"id": id, "name": name, "children": children})
    }

    fn user(id: &str, orgs: &[&str]) -> Value {
        json!({"id": id, "name": id, "pin": "0000", "feedOrgIds": orgs})
    }

    #[tokio::test]
    async fn remote_primary_mode_skips_everything() {
        let (engine, stores) = engine_with(StoreMode::RemotePrimary, StaticProbe::up());
        engine.run_bootstrap().await.unwrap();
        assert_eq!(stores.remote.find_calls(), 0);
        assert_eq!(stores.local.insert_calls(), 0);
    }

    #[tokio::test]
    async fn unresolvable_device_label_escalates() {
        let (engine, _stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        let err = engine.run_bootstrap().await.unwrap_err();
        assert!(matches!(err, Error::NotProvisioned(_)));
    }

    #[tokio::test]
    async fn identity_migration_skips_provisioned_stations() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores
            .seed_local_document(
                local::STATIONS,
                json!({"id": "s1", "serialNumber": "SN-1", "stationKind": "tracking"}),
            )
            .await;
        stores.seed_local_document(local::STATION_LABELS, label_doc(&[])).await;
        stores
            .seed_remote_document(
                remote::STATIONS,
                json!({"id": "s2", "serialNumber": "SN-2", "stationKind": "tracking"}),
            )
            .await;

        engine.run_bootstrap().await.unwrap();

        let stations = stores.local_collection(local::STATIONS).await;
        assert_eq!(stations.len(), 1, "existing local identity preserved");
        assert_eq!(stations[0]["id"], "s1");
    }

    #[tokio::test]
    async fn settings_merge_prefers_local_values() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&[])).await;
        stores
            .seed_remote_document(
                remote::STATION_LABELS,
                json!({
                    "id": "label-1",
                    "deviceLabel": "BG-1",
                    "feedOrgIds": [],
                    "settings": {"tare": 99, "locale": "en-US"}
                }),
            )
            .await;

        engine.run_bootstrap().await.unwrap();

        let labels = stores.local_collection(local::STATION_LABELS).await;
        assert_eq!(labels[0]["settings"]["tare"], 12, "local value wins");
        assert_eq!(labels[0]["settings"]["locale"], "en-US", "remote fills gap");
    }

    #[tokio::test]
    async fn empty_remote_user_set_never_truncates_local_users() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.seed_local_document(local::USERS, user("existing", &["o1"])).await;
        stores.seed_remote_document(remote::ORGS, org("o1", "Org 1", &[])).await;

        engine.run_bootstrap().await.unwrap();

        let users = stores.local_collection(local::USERS).await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], "existing");
    }

    #[tokio::test]
    async fn matching_remote_users_are_upserted() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.seed_local_document(local::USERS, user("u1", &["o1"])).await;
        stores.seed_remote_document(remote::USERS, user("u1", &["o1", "o2"])).await;
        stores.seed_remote_document(remote::USERS, user("u2", &["o1"])).await;
        stores.seed_remote_document(remote::USERS, user("elsewhere", &["o9"])).await;
        stores.seed_remote_document(remote::ORGS, org("o1", "Org 1", &[])).await;

        engine.run_bootstrap().await.unwrap();

        let users = stores.local_collection(local::USERS).await;
        assert_eq!(users.len(), 2, "only users for this station's orgs");
        let ids: Vec<_> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
        assert!(ids.contains(&"u1") && ids.contains(&"u2"));
        let u1 = users.iter().find(|u| u["id"] == "u1").unwrap();
        assert_eq!(u1["feedOrgIds"].as_array().unwrap().len(), 2, "u1 updated in place");
    }

    #[tokio::test]
    async fn organization_closure_terminates_on_cycles() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        // o1 -> o2 -> o1 cycle, plus a repeated reference to o3.
        stores.seed_remote_document(remote::ORGS, org("o1", "Root", &["o2", "o3"])).await;
        stores.seed_remote_document(remote::ORGS, org("o2", "Child", &["o1", "o3"])).await;
        stores.seed_remote_document(remote::ORGS, org("o3", "Leaf", &[])).await;

        engine.run_bootstrap().await.unwrap();

        let orgs = stores.local_collection(local::ORGS).await;
        assert_eq!(orgs.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_replica_falls_back_to_default_org() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.remote.fail_everything();

        engine.run_bootstrap().await.unwrap();

        let orgs = stores.local_collection(local::ORGS).await;
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0]["id"], crate::models::DEFAULT_ORG_ID);
    }

    #[tokio::test]
    async fn default_org_fallback_preserves_existing_orgs() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.seed_local_document(local::ORGS, org("kept", "Kept", &[])).await;
        stores.remote.fail_everything();

        engine.run_bootstrap().await.unwrap();

        let orgs = stores.local_collection(local::ORGS).await;
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0]["id"], "kept");
    }

    #[tokio::test]
    async fn feed_types_replaced_only_when_matches_found() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.seed_remote_document(remote::ORGS, org("o1", "Org 1", &[])).await;
        stores
            .seed_local_document(
                local::FEED_TYPES,
                json!({"id": "stale", "typeName": "old", "displayName": "Old", "orgId": "o1"}),
            )
            .await;
        stores
            .seed_remote_document(
                remote::FEED_TYPES,
                json!({
                    "id": "ft1", "typeName": "prep", "displayName": "Prep Waste",
                    "orgId": "o1", "deviceLabel": "BG-1"
                }),
            )
            .await;
        stores
            .seed_remote_document(
                remote::FEED_TYPES,
                json!({
                    "id": "other", "typeName": "x", "displayName": "X",
                    "orgId": "o9", "deviceLabel": "BG-9"
                }),
            )
            .await;

        engine.run_bootstrap().await.unwrap();

        let catalog = stores.local_collection(local::FEED_TYPES).await;
        assert_eq!(catalog.len(), 1, "stale catalog replaced wholesale");
        assert_eq!(catalog[0]["id"], "ft1");
    }

    #[tokio::test]
    async fn empty_remote_catalog_preserves_local_feed_types() {
        let (engine, stores) = engine_with(StoreMode::LocalPrimary, StaticProbe::up());
        stores.seed_local_document(local::STATION_LABELS, label_doc(&["o1"])).await;
        stores.seed_remote_document(remote::ORGS, org("o1", "Org 1", &[])).await;
        stores
            .seed_local_document(
                local::FEED_TYPES,
                json!({"id": "kept", "typeName": "t", "displayName": "T", "orgId": "o1"}),
            )
            .await;

        engine.run_bootstrap().await.unwrap();

        let catalog = stores.local_collection(local::FEED_TYPES).await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0]["id"], "kept");
    }
}
