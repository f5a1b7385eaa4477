//! Query filters understood by every document store backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Exists { field: String },
    /// Numeric strictly-less-than. Non-numeric or absent fields never match.
    Lt { field: String, value: Value },
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values,
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>) -> Self {
        self.conditions.push(Condition::Exists {
            field: field.into(),
        });
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Filter on a document id.
    pub fn by_id(id: &str) -> Self {
        Self::all().eq("id", id)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a JSON document.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq { field, value } => field_of(document, field) == Some(value),
            Condition::Ne { field, value } => {
                // Matches documents where the field is absent, mirroring the
                // "absent counts as not-equal" query the feed job relies on.
                field_of(document, field) != Some(value)
            }
            Condition::In { field, values } => field_of(document, field)
                .map(|actual| match actual {
                    // An array field matches when any of its elements is
                    // listed (membership intersection, as used for the
                    // user-to-organization query).
                    Value::Array(elements) => elements.iter().any(|e| values.contains(e)),
                    scalar => values.contains(scalar),
                })
                .unwrap_or(false),
            Condition::Exists { field } => field_of(document, field)
                .map(|actual| !actual.is_null())
                .unwrap_or(false),
            Condition::Lt { field, value } => {
                let actual = field_of(document, field).and_then(Value::as_f64);
                let bound = value.as_f64();
                matches!((actual, bound), (Some(a), Some(b)) if a < b)
            }
        })
    }
}

fn field_of<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    document.as_object().and_then(|map| map.get(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_matches_exact_value() {
        let filter = Filter::all().eq("deviceLabel", "BG-1");
        assert!(filter.matches(&json!({"deviceLabel": "BG-1"})));
        assert!(!filter.matches(&json!({"deviceLabel": "BG-2"})));
    }

    #[test]
    fn ne_matches_absent_field() {
        let filter = Filter::all().ne("syncStatus", "synced");
        assert!(filter.matches(&json!({"id": "f1"})));
        assert!(filter.matches(&json!({"id": "f1", "syncStatus": "pending"})));
        assert!(!filter.matches(&json!({"id": "f1", "syncStatus": "synced"})));
    }

    #[test]
    fn exists_rejects_null_and_absent() {
        let filter = Filter::all().exists("imageFilename");
        assert!(filter.matches(&json!({"imageFilename": "a.jpg"})));
        assert!(!filter.matches(&json!({"imageFilename": null})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn in_matches_any_listed_value() {
        let filter = Filter::all().is_in("orgId", vec![json!("o1"), json!("o2")]);
        assert!(filter.matches(&json!({"orgId": "o2"})));
        assert!(!filter.matches(&json!({"orgId": "o3"})));
    }

    #[test]
    fn in_intersects_array_fields() {
        let filter = Filter::all().is_in("feedOrgIds", vec![json!("o1"), json!("o2")]);
        assert!(filter.matches(&json!({"feedOrgIds": ["o9", "o2"]})));
        assert!(!filter.matches(&json!({"feedOrgIds": ["o8", "o9"]})));
    }

    #[test]
    fn lt_requires_numeric_field_below_bound() {
        let filter = Filter::all().lt("attempts", 5);
        assert!(filter.matches(&json!({"attempts": 4})));
        assert!(!filter.matches(&json!({"attempts": 5})));
        assert!(!filter.matches(&json!({"attempts": "4"})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::all().matches(&json!({"anything": 1})));
    }

    #[test]
    fn filter_round_trips_through_json() {
        let filter = Filter::all().eq("id", "f1").exists("rawWeights");
        let encoded = serde_json::to_string(&filter).unwrap();
        let decoded: Filter = serde_json::from_str(&encoded).unwrap();
        assert_eq!(filter, decoded);
    }
}
