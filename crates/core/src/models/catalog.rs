//! Provisioning and catalog documents pulled during bootstrap.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stable id for the synthesized fallback organization, so repeated
/// bootstrap runs without connectivity do not accumulate duplicates.
pub const DEFAULT_ORG_ID: &str = "org-local-default";

/// Station provisioning identity. Presence of any station record locally
/// means the device has already been provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub serial_number: String,
    pub station_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_label_id: Option<String>,
}

/// Per-device label and settings document. The seed of truth for which
/// organizations a station feeds into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationLabel {
    pub id: String,
    pub device_label: String,
    #[serde(default)]
    pub feed_org_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_calibration: Option<Value>,
    /// Free-form per-device settings. On resync, local values win for
    /// overlapping keys and remote supplies whatever is missing locally.
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl StationLabel {
    /// Local-preferred merge: keep every local value, adopt remote values
    /// only for keys the local map lacks. Returns true when anything was
    /// adopted.
    pub fn merge_remote_settings(&mut self, remote: &BTreeMap<String, Value>) -> bool {
        let mut adopted = false;
        for (key, value) in remote {
            if !self.settings.contains_key(key) {
                self.settings.insert(key.clone(), value.clone());
                adopted = true;
            }
        }
        adopted
    }
}

/// Organization node. `children` holds child organization ids; the graph may
/// contain repeated or cyclic references, which bootstrap de-duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<String>,
}

impl Organization {
    /// The synthesized fallback organization used when the remote hierarchy
    /// is unreachable or empty.
    pub fn local_default() -> Self {
        Self {
            id: DEFAULT_ORG_ID.to_string(),
            name: "Local Organization".to_string(),
            children: Vec::new(),
        }
    }
}

/// Kiosk operator. PIN lookup itself is out of scope; the engine only moves
/// these documents around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub pin: String,
    #[serde(default)]
    pub feed_org_ids: Vec<String>,
}

/// Feed type catalog entry (what kind of waste is being weighed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedType {
    pub id: String,
    pub type_name: String,
    pub display_name: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_merge_prefers_local_values() {
        let mut label = StationLabel {
            id: "l1".to_string(),
            device_label: "BG-1".to_string(),
            feed_org_ids: vec!["o1".to_string()],
            scale_calibration: None,
            settings: BTreeMap::from([("tare".to_string(), json!(12))]),
        };
        let remote = BTreeMap::from([
            ("tare".to_string(), json!(99)),
            ("locale".to_string(), json!("en-US")),
        ]);

        let adopted = label.merge_remote_settings(&remote);

        assert!(adopted);
        assert_eq!(label.settings["tare"], json!(12));
        assert_eq!(label.settings["locale"], json!("en-US"));
    }

    #[test]
    fn settings_merge_is_a_noop_without_new_keys() {
        let mut label = StationLabel {
            id: "l1".to_string(),
            device_label: "BG-1".to_string(),
            feed_org_ids: Vec::new(),
            scale_calibration: None,
            settings: BTreeMap::from([("tare".to_string(), json!(12))]),
        };
        let remote = BTreeMap::from([("tare".to_string(), json!(99))]);
        assert!(!label.merge_remote_settings(&remote));
    }
}
