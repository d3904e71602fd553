use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{SelectionError, SelectionResult};
use crate::model::{
    session_token_digest, timestamp_now, CrossRefs, Id, Lot, MaterialSelection, ProjectSummary,
    QuoteSummary, SelectionVersion, UserContext, VersionSummary,
};
use crate::store::traits::{LotStore, SelectionStore, SelectionTransaction, SessionStore, Store};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    lots: HashMap<Id, Lot>,
    projects: HashMap<Id, ProjectSummary>,
    quotes: HashMap<Id, QuoteSummary>,
    selections: HashMap<Id, MaterialSelection>,
    versions: HashMap<Id, SelectionVersion>,
}

impl MemoryState {
    fn selection_for_lot(&self, lot_id: &Id) -> Option<&MaterialSelection> {
        self.selections.values().find(|s| &s.lot_id == lot_id)
    }

    fn selection_mut(&mut self, selection_id: &Id) -> SelectionResult<&mut MaterialSelection> {
        self.selections
            .get_mut(selection_id)
            .ok_or_else(|| SelectionError::not_found("material selection", selection_id))
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user: UserContext,
    expires_at: DateTime<Utc>,
}

/// In-memory store with the same constraints as the PostgreSQL schema.
///
/// Transactions hold the state lock until they are committed or dropped, so
/// they are fully serialized. Reads wait for any open transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_lot(&self, lot: Lot) {
        self.state.lock().await.lots.insert(lot.id.clone(), lot);
    }

    pub async fn insert_project(&self, project: ProjectSummary) {
        self.state
            .lock()
            .await
            .projects
            .insert(project.id.clone(), project);
    }

    pub async fn insert_quote(&self, quote: QuoteSummary) {
        self.state.lock().await.quotes.insert(quote.id.clone(), quote);
    }

    pub fn insert_session(&self, token: &str, user: UserContext, expires_at: DateTime<Utc>) {
        self.sessions
            .write()
            .insert(session_token_digest(token), SessionEntry { user, expires_at });
    }

    pub async fn selection_count(&self) -> usize {
        self.state.lock().await.selections.len()
    }

    pub async fn version_count(&self, selection_id: &Id) -> usize {
        self.state
            .lock()
            .await
            .versions
            .values()
            .filter(|v| &v.selection_id == selection_id)
            .count()
    }
}

#[async_trait::async_trait]
impl LotStore for MemoryStore {
    async fn get_lot(&self, id: &Id) -> SelectionResult<Option<Lot>> {
        Ok(self.state.lock().await.lots.get(id).cloned())
    }

    async fn get_project_summary(&self, id: &Id) -> SelectionResult<Option<ProjectSummary>> {
        Ok(self.state.lock().await.projects.get(id).cloned())
    }

    async fn get_quote_summary(&self, id: &Id) -> SelectionResult<Option<QuoteSummary>> {
        Ok(self.state.lock().await.quotes.get(id).cloned())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn resolve_session(&self, token: &str) -> SelectionResult<Option<UserContext>> {
        let sessions = self.sessions.read();
        Ok(sessions
            .get(&session_token_digest(token))
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.user.clone()))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait::async_trait]
impl SelectionTransaction for MemoryTransaction {
    async fn lock_selection_for_lot(
        &mut self,
        lot_id: &Id,
    ) -> SelectionResult<Option<MaterialSelection>> {
        Ok(self.working.selection_for_lot(lot_id).cloned())
    }

    async fn insert_selection(
        &mut self,
        selection: &MaterialSelection,
    ) -> SelectionResult<MaterialSelection> {
        if !self.working.lots.contains_key(&selection.lot_id) {
            return Err(SelectionError::not_found("lot", &selection.lot_id));
        }
        if let Some(existing) = self.working.selection_for_lot(&selection.lot_id) {
            return Ok(existing.clone());
        }
        self.working
            .selections
            .insert(selection.id.clone(), selection.clone());
        Ok(selection.clone())
    }

    async fn update_cross_refs(
        &mut self,
        selection_id: &Id,
        refs: &CrossRefs,
    ) -> SelectionResult<MaterialSelection> {
        let selection = self.working.selection_mut(selection_id)?;
        selection.apply_cross_refs(refs);
        Ok(selection.clone())
    }

    async fn max_sequence_number(&mut self, selection_id: &Id) -> SelectionResult<i32> {
        Ok(self
            .working
            .versions
            .values()
            .filter(|v| &v.selection_id == selection_id)
            .map(|v| v.sequence_number)
            .max()
            .unwrap_or(0))
    }

    async fn clear_current_versions(&mut self, selection_id: &Id) -> SelectionResult<u64> {
        let mut cleared = 0;
        for version in self.working.versions.values_mut() {
            if &version.selection_id == selection_id && version.is_current {
                version.is_current = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn insert_version(&mut self, version: &SelectionVersion) -> SelectionResult<()> {
        if !self.working.selections.contains_key(&version.selection_id) {
            return Err(SelectionError::not_found(
                "material selection",
                &version.selection_id,
            ));
        }
        if version.sequence_number < 1 {
            return Err(SelectionError::validation(
                "sequence_number",
                "sequence numbers start at 1",
            ));
        }

        let siblings = || {
            self.working
                .versions
                .values()
                .filter(|v| v.selection_id == version.selection_id)
        };
        if siblings().any(|v| v.sequence_number == version.sequence_number) {
            return Err(SelectionError::Conflict(format!(
                "sequence number {} already exists for material selection '{}'",
                version.sequence_number, version.selection_id
            )));
        }
        if version.is_current && siblings().any(|v| v.is_current) {
            return Err(SelectionError::Conflict(format!(
                "material selection '{}' already has a current version",
                version.selection_id
            )));
        }

        self.working
            .versions
            .insert(version.id.clone(), version.clone());
        Ok(())
    }

    async fn set_current_version(
        &mut self,
        selection_id: &Id,
        version_id: &Id,
    ) -> SelectionResult<MaterialSelection> {
        if !self.working.versions.contains_key(version_id) {
            return Err(SelectionError::not_found("version", version_id));
        }
        let selection = self.working.selection_mut(selection_id)?;
        selection.current_version_id = Some(version_id.clone());
        selection.updated_at = timestamp_now();
        Ok(selection.clone())
    }

    async fn commit(self) -> SelectionResult<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SelectionStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> SelectionResult<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }

    async fn get_selection_for_lot(
        &self,
        lot_id: &Id,
    ) -> SelectionResult<Option<MaterialSelection>> {
        Ok(self.state.lock().await.selection_for_lot(lot_id).cloned())
    }

    async fn list_version_summaries(
        &self,
        selection_id: &Id,
    ) -> SelectionResult<Vec<VersionSummary>> {
        let state = self.state.lock().await;
        let mut summaries: Vec<VersionSummary> = state
            .versions
            .values()
            .filter(|v| &v.selection_id == selection_id)
            .map(SelectionVersion::summary)
            .collect();
        summaries.sort_by(|a, b| b.sequence_number.cmp(&a.sequence_number));
        Ok(summaries)
    }

    async fn get_version(&self, version_id: &Id) -> SelectionResult<Option<SelectionVersion>> {
        let state = self.state.lock().await;
        Ok(state.versions.get(version_id).cloned().map(|mut version| {
            version.sort_tree();
            version
        }))
    }
}

impl Store for MemoryStore {}
