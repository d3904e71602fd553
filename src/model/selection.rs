use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_id, timestamp_now, Id, ProjectSummary, QuoteSummary};

/// The per-lot anchor owning the version history of a material selection.
/// At most one exists per lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSelection {
    pub id: Id,
    pub lot_id: Id,
    pub project_id: Option<Id>,
    pub quote_id: Option<Id>,
    /// None until a version has been submitted with `mark_current`
    pub current_version_id: Option<Id>,
    /// Captured once at creation and never overwritten
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialSelection {
    pub fn new(lot_id: Id, refs: &CrossRefs, created_by: String) -> Self {
        let now = timestamp_now();
        Self {
            id: generate_id(),
            lot_id,
            project_id: refs.project_id.clone(),
            quote_id: refs.quote_id.clone(),
            current_version_id: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply only the cross-references that were explicitly supplied.
    pub fn apply_cross_refs(&mut self, refs: &CrossRefs) {
        if let Some(project_id) = &refs.project_id {
            self.project_id = Some(project_id.clone());
        }
        if let Some(quote_id) = &refs.quote_id {
            self.quote_id = Some(quote_id.clone());
        }
        self.updated_at = timestamp_now();
    }
}

/// Optional references from a selection to records elsewhere in the ERP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossRefs {
    pub project_id: Option<Id>,
    pub quote_id: Option<Id>,
}

impl CrossRefs {
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none() && self.quote_id.is_none()
    }
}

/// Nullable numeric measurements recorded on a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub ceiling_height: Option<f64>,
    pub bedroom_count: Option<f64>,
    pub bathroom_count: Option<f64>,
}

/// One immutable, sequence-numbered snapshot of a material selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionVersion {
    pub id: Id,
    pub selection_id: Id,
    pub sequence_number: i32,
    pub is_current: bool,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub areas: Vec<SelectionArea>,
}

impl SelectionVersion {
    /// Areas by name then instance index, items within each area by name.
    /// Names compare bytewise, the order of `COLLATE "C"`.
    pub fn sort_tree(&mut self) {
        self.areas.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.instance_index.cmp(&b.instance_index))
        });
        for area in &mut self.areas {
            area.items.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id.clone(),
            sequence_number: self.sequence_number,
            is_current: self.is_current,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionArea {
    pub id: Id,
    pub version_id: Id,
    pub name: String,
    /// Disambiguates repeated areas of the same name, starting at 1
    pub instance_index: i32,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<SelectionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionItem {
    pub id: Id,
    pub area_id: Id,
    pub name: String,
    pub category: Option<String>,
    pub is_applicable: bool,
    pub notes: Option<String>,
}

/// History entry; never carries the area/item tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: Id,
    pub sequence_number: i32,
    pub is_current: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Default read of a lot's material selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionView {
    pub selection: MaterialSelection,
    pub current_version: Option<SelectionVersion>,
    pub project: Option<ProjectSummary>,
    pub quote: Option<QuoteSummary>,
    /// Descending by sequence number
    pub history: Vec<VersionSummary>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedVersion {
    pub selection: MaterialSelection,
    pub version: SelectionVersion,
    pub created_selection: bool,
}
