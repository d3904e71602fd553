use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::{
    generate_id, timestamp_now, CrossRefs, Id, Measurements, SelectionArea, SelectionItem,
    SelectionVersion,
};

/// Request body for submitting a new version of a lot's material selection.
///
/// Names are optional at this level so a missing name is reported as a
/// validation error with its position instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitVersionRequest {
    pub project_id: Option<Id>,
    pub quote_id: Option<Id>,
    #[serde(default)]
    pub ceiling_height: Option<Value>,
    #[serde(default)]
    pub bedroom_count: Option<Value>,
    #[serde(default)]
    pub bathroom_count: Option<Value>,
    pub notes: Option<String>,
    pub mark_current: Option<bool>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub areas: Vec<AreaInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaInput {
    pub name: Option<String>,
    pub instance_index: Option<i32>,
    pub category: Option<String>,
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<ItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemInput {
    pub name: Option<String>,
    pub category: Option<String>,
    pub is_applicable: Option<bool>,
    pub notes: Option<String>,
}

/// A JSON null list is read as an empty one
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Empty strings and JSON nulls collapse to `None`; anything else passes
/// through unconverted.
pub fn normalize_scalar(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(other) => Some(other),
    }
}

/// Normalized, not yet coerced measurement values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMeasurements {
    pub ceiling_height: Option<Value>,
    pub bedroom_count: Option<Value>,
    pub bathroom_count: Option<Value>,
}

impl RawMeasurements {
    pub fn fields(&self) -> [(&'static str, Option<&Value>); 3] {
        [
            ("ceiling_height", self.ceiling_height.as_ref()),
            ("bedroom_count", self.bedroom_count.as_ref()),
            ("bathroom_count", self.bathroom_count.as_ref()),
        ]
    }
}

/// A validated version assembled before any transaction is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDraft {
    pub cross_refs: CrossRefs,
    pub measurements: Measurements,
    pub notes: Option<String>,
    pub mark_current: bool,
    pub areas: Vec<AreaDraft>,
}

impl Default for VersionDraft {
    fn default() -> Self {
        Self {
            cross_refs: CrossRefs::default(),
            measurements: Measurements::default(),
            notes: None,
            mark_current: true,
            areas: Vec::new(),
        }
    }
}

impl VersionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area(mut self, area: AreaDraft) -> Self {
        self.areas.push(area);
        self
    }

    pub fn mark_current(mut self, mark_current: bool) -> Self {
        self.mark_current = mark_current;
        self
    }

    /// Materialize the draft as a version row tree with fresh ids.
    pub fn into_version(
        self,
        selection_id: Id,
        sequence_number: i32,
        created_by: String,
    ) -> SelectionVersion {
        let version_id = generate_id();
        let areas = self
            .areas
            .into_iter()
            .map(|area| area.into_area(&version_id))
            .collect();

        SelectionVersion {
            id: version_id,
            selection_id,
            sequence_number,
            is_current: self.mark_current,
            measurements: self.measurements,
            notes: self.notes,
            created_by,
            created_at: timestamp_now(),
            areas,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDraft {
    pub name: String,
    pub instance_index: i32,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<ItemDraft>,
}

impl AreaDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_index: 1,
            category: None,
            notes: None,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: ItemDraft) -> Self {
        self.items.push(item);
        self
    }

    fn into_area(self, version_id: &Id) -> SelectionArea {
        let area_id = generate_id();
        let items = self
            .items
            .into_iter()
            .map(|item| SelectionItem {
                id: generate_id(),
                area_id: area_id.clone(),
                name: item.name,
                category: item.category,
                is_applicable: item.is_applicable,
                notes: item.notes,
            })
            .collect();

        SelectionArea {
            id: area_id,
            version_id: version_id.clone(),
            name: self.name,
            instance_index: self.instance_index,
            category: self.category,
            notes: self.notes,
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub category: Option<String>,
    pub is_applicable: bool,
    pub notes: Option<String>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            is_applicable: false,
            notes: None,
        }
    }

    pub fn applicable(mut self, is_applicable: bool) -> Self {
        self.is_applicable = is_applicable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_scalar() {
        assert_eq!(normalize_scalar(None), None);
        assert_eq!(normalize_scalar(Some(Value::Null)), None);
        assert_eq!(normalize_scalar(Some(json!(""))), None);
        assert_eq!(normalize_scalar(Some(json!("0"))), Some(json!("0")));
        assert_eq!(normalize_scalar(Some(json!(8.5))), Some(json!(8.5)));
        assert_eq!(normalize_scalar(Some(json!(false))), Some(json!(false)));
    }

    #[test]
    fn test_into_version_links_tree() {
        let draft = VersionDraft::new()
            .with_area(AreaDraft::new("Kitchen").with_item(ItemDraft::new("Sink").applicable(true)))
            .with_area(AreaDraft::new("Bath"));

        let version = draft.into_version("sel-1".to_string(), 3, "user-1".to_string());

        assert_eq!(version.sequence_number, 3);
        assert!(version.is_current);
        assert_eq!(version.areas.len(), 2);
        let kitchen = &version.areas[0];
        assert_eq!(kitchen.version_id, version.id);
        assert_eq!(kitchen.instance_index, 1);
        assert_eq!(kitchen.items[0].area_id, kitchen.id);
        assert!(kitchen.items[0].is_applicable);
    }

    #[test]
    fn test_request_defaults() {
        let request: SubmitVersionRequest =
            serde_json::from_value(json!({ "areas": [{ "name": "Kitchen" }] })).unwrap();

        assert!(request.mark_current.is_none());
        assert!(request.ceiling_height.is_none());
        assert_eq!(request.areas.len(), 1);
        assert!(request.areas[0].items.is_empty());
    }

    #[test]
    fn test_null_lists_read_as_empty() {
        let request: SubmitVersionRequest = serde_json::from_value(json!({ "areas": null })).unwrap();
        assert!(request.areas.is_empty());

        let request: SubmitVersionRequest =
            serde_json::from_value(json!({ "areas": [{ "name": "Kitchen", "items": null }] }))
                .unwrap();
        assert_eq!(request.areas.len(), 1);
        assert!(request.areas[0].items.is_empty());
    }

    #[test]
    fn test_into_version_timestamp_is_microsecond_precise() {
        use chrono::Timelike;

        let version = VersionDraft::new().into_version("sel-1".to_string(), 1, "user-1".to_string());
        assert_eq!(version.created_at.nanosecond() % 1_000, 0);
    }
}
