use serde::{Deserialize, Serialize};

use crate::model::Id;

/// A physical lot/unit owned by the wider ERP. Read-only from this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Id,
    pub name: String,
    pub project_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub id: Id,
    pub quote_number: String,
    pub project_id: Option<Id>,
}
