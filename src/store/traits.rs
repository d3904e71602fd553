use crate::error::SelectionResult;
use crate::model::{
    CrossRefs, Id, Lot, MaterialSelection, ProjectSummary, QuoteSummary, SelectionVersion,
    UserContext, VersionSummary,
};

/// Read access to the ERP records a selection refers to
#[async_trait::async_trait]
pub trait LotStore: Send + Sync {
    async fn get_lot(&self, id: &Id) -> SelectionResult<Option<Lot>>;
    async fn get_project_summary(&self, id: &Id) -> SelectionResult<Option<ProjectSummary>>;
    async fn get_quote_summary(&self, id: &Id) -> SelectionResult<Option<QuoteSummary>>;
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a bearer token to the identity of an unexpired session
    async fn resolve_session(&self, token: &str) -> SelectionResult<Option<UserContext>>;
}

/// Write primitives available inside one atomic transaction.
///
/// Dropping a transaction without calling `commit` discards every write made
/// through it.
#[async_trait::async_trait]
pub trait SelectionTransaction: Send {
    /// Fetch the selection for a lot and hold it locked for the rest of the transaction
    async fn lock_selection_for_lot(&mut self, lot_id: &Id)
        -> SelectionResult<Option<MaterialSelection>>;
    /// Insert a new selection unless one already exists for its lot. Returns the
    /// stored row, which is the pre-existing one when another writer won.
    async fn insert_selection(
        &mut self,
        selection: &MaterialSelection,
    ) -> SelectionResult<MaterialSelection>;
    /// Overwrite only the cross-references present in `refs`
    async fn update_cross_refs(
        &mut self,
        selection_id: &Id,
        refs: &CrossRefs,
    ) -> SelectionResult<MaterialSelection>;
    /// Highest sequence number among the selection's versions, 0 when none exist
    async fn max_sequence_number(&mut self, selection_id: &Id) -> SelectionResult<i32>;
    /// Set `is_current = false` on every version of the selection
    async fn clear_current_versions(&mut self, selection_id: &Id) -> SelectionResult<u64>;
    /// Insert a version together with its areas and items
    async fn insert_version(&mut self, version: &SelectionVersion) -> SelectionResult<()>;
    async fn set_current_version(
        &mut self,
        selection_id: &Id,
        version_id: &Id,
    ) -> SelectionResult<MaterialSelection>;
    async fn commit(self) -> SelectionResult<()>;
}

#[async_trait::async_trait]
pub trait SelectionStore: Send + Sync {
    type Transaction: SelectionTransaction + 'static;

    async fn begin(&self) -> SelectionResult<Self::Transaction>;
    async fn get_selection_for_lot(&self, lot_id: &Id)
        -> SelectionResult<Option<MaterialSelection>>;
    /// All versions of a selection, descending by sequence number
    async fn list_version_summaries(&self, selection_id: &Id)
        -> SelectionResult<Vec<VersionSummary>>;
    /// One version with its areas (by name, instance index) and items (by name)
    async fn get_version(&self, version_id: &Id) -> SelectionResult<Option<SelectionVersion>>;
}

pub trait Store: LotStore + SessionStore + SelectionStore + Send + Sync {}
