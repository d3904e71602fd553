use crate::error::{SelectionError, SelectionResult};
use crate::logic::validate::DraftValidator;
use crate::model::{
    CrossRefs, Id, MaterialSelection, SelectionVersion, SelectionView, SubmitVersionRequest,
    SubmittedVersion, UserContext, VersionDraft, VersionSummary,
};
use crate::store::traits::{SelectionStore, SelectionTransaction, Store};

/// Versioned material selections: one selection per lot, append-only
/// versions numbered 1, 2, ... per selection, at most one of them current.
pub struct SelectionVersioning;

impl SelectionVersioning {
    /// Validate a raw request and persist it as the lot's next version
    pub async fn submit_version<S: Store>(
        store: &S,
        user: &UserContext,
        lot_id: &Id,
        request: SubmitVersionRequest,
    ) -> SelectionResult<SubmittedVersion> {
        let draft = DraftValidator::build_draft(request)?;
        Self::submit_draft(store, user, lot_id, draft).await
    }

    /// Persist an already validated draft.
    ///
    /// Referenced records are checked before the transaction opens. Everything
    /// after that runs in one transaction: a failure leaves the selection,
    /// its current pointer and the sequence numbering untouched.
    pub async fn submit_draft<S: Store>(
        store: &S,
        user: &UserContext,
        lot_id: &Id,
        draft: VersionDraft,
    ) -> SelectionResult<SubmittedVersion> {
        Self::check_references(store, lot_id, &draft.cross_refs).await?;

        let result = Self::persist_draft(store, user, lot_id, draft).await;
        if let Err(SelectionError::Conflict(message)) = &result {
            log::warn!("Version submission for lot {} conflicted: {}", lot_id, message);
        }
        let submitted = result?;

        log::info!(
            "Lot {} material selection {} saved version #{} (current: {}, areas: {}, by {})",
            lot_id,
            submitted.selection.id,
            submitted.version.sequence_number,
            submitted.version.is_current,
            submitted.version.areas.len(),
            user.user_id
        );

        Ok(submitted)
    }

    async fn check_references<S: Store>(
        store: &S,
        lot_id: &Id,
        refs: &CrossRefs,
    ) -> SelectionResult<()> {
        Self::require_lot(store, lot_id).await?;

        if let Some(project_id) = &refs.project_id {
            if store.get_project_summary(project_id).await?.is_none() {
                return Err(SelectionError::not_found("project", project_id));
            }
        }
        if let Some(quote_id) = &refs.quote_id {
            if store.get_quote_summary(quote_id).await?.is_none() {
                return Err(SelectionError::not_found("quote", quote_id));
            }
        }

        Ok(())
    }

    async fn persist_draft<S: Store>(
        store: &S,
        user: &UserContext,
        lot_id: &Id,
        draft: VersionDraft,
    ) -> SelectionResult<SubmittedVersion> {
        let mut tx = store.begin().await?;

        let (selection, created_selection) = match tx.lock_selection_for_lot(lot_id).await? {
            Some(existing) => (
                Self::apply_cross_refs(&mut tx, existing, &draft.cross_refs).await?,
                false,
            ),
            None => {
                let candidate =
                    MaterialSelection::new(lot_id.clone(), &draft.cross_refs, user.user_id.clone());
                let stored = tx.insert_selection(&candidate).await?;
                if stored.id == candidate.id {
                    (stored, true)
                } else {
                    // Another submission created it first; treat ours as an update
                    (
                        Self::apply_cross_refs(&mut tx, stored, &draft.cross_refs).await?,
                        false,
                    )
                }
            }
        };

        let sequence_number = tx.max_sequence_number(&selection.id).await? + 1;
        let mark_current = draft.mark_current;

        if mark_current {
            tx.clear_current_versions(&selection.id).await?;
        }

        let mut version =
            draft.into_version(selection.id.clone(), sequence_number, user.user_id.clone());
        tx.insert_version(&version).await?;

        let selection = if mark_current {
            tx.set_current_version(&selection.id, &version.id).await?
        } else {
            selection
        };

        tx.commit().await?;

        version.sort_tree();
        Ok(SubmittedVersion {
            selection,
            version,
            created_selection,
        })
    }

    async fn apply_cross_refs<T: SelectionTransaction>(
        tx: &mut T,
        selection: MaterialSelection,
        refs: &CrossRefs,
    ) -> SelectionResult<MaterialSelection> {
        if refs.is_empty() {
            return Ok(selection);
        }
        tx.update_cross_refs(&selection.id, refs).await
    }

    /// The lot's selection with its current version hydrated, or `None` when
    /// nothing has been submitted for the lot yet.
    pub async fn current_view<S: Store>(
        store: &S,
        lot_id: &Id,
    ) -> SelectionResult<Option<SelectionView>> {
        Self::require_lot(store, lot_id).await?;

        let Some(selection) = store.get_selection_for_lot(lot_id).await? else {
            log::debug!("Lot {} has no material selection yet", lot_id);
            return Ok(None);
        };

        let current_version = match &selection.current_version_id {
            Some(version_id) => Some(store.get_version(version_id).await?.ok_or_else(|| {
                SelectionError::Store(anyhow::anyhow!(
                    "material selection '{}' points at missing version '{}'",
                    selection.id,
                    version_id
                ))
            })?),
            None => None,
        };

        let project = match &selection.project_id {
            Some(id) => store.get_project_summary(id).await?,
            None => None,
        };
        let quote = match &selection.quote_id {
            Some(id) => store.get_quote_summary(id).await?,
            None => None,
        };

        let history = store.list_version_summaries(&selection.id).await?;

        Ok(Some(SelectionView {
            selection,
            current_version,
            project,
            quote,
            history,
        }))
    }

    /// Any single version with its full area/item tree
    pub async fn version_detail<S: Store>(
        store: &S,
        version_id: &Id,
    ) -> SelectionResult<SelectionVersion> {
        store
            .get_version(version_id)
            .await?
            .ok_or_else(|| SelectionError::not_found("version", version_id))
    }

    /// Version history of a lot, newest first. Empty when nothing was submitted.
    pub async fn list_versions<S: Store>(
        store: &S,
        lot_id: &Id,
    ) -> SelectionResult<Vec<VersionSummary>> {
        Self::require_lot(store, lot_id).await?;

        match store.get_selection_for_lot(lot_id).await? {
            Some(selection) => store.list_version_summaries(&selection.id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn require_lot<S: Store>(store: &S, lot_id: &Id) -> SelectionResult<()> {
        match store.get_lot(lot_id).await? {
            Some(_) => Ok(()),
            None => Err(SelectionError::not_found("lot", lot_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lot, ProjectSummary, QuoteSummary, Role};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::collections::HashSet;

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for lot_id in ["L1", "L2"] {
            store
                .insert_lot(Lot {
                    id: lot_id.to_string(),
                    name: format!("Unit {}", lot_id),
                    project_id: Some("P1".to_string()),
                })
                .await;
        }
        store
            .insert_project(ProjectSummary {
                id: "P1".to_string(),
                name: "Harbour Flats".to_string(),
            })
            .await;
        store
            .insert_project(ProjectSummary {
                id: "P2".to_string(),
                name: "Hillside Homes".to_string(),
            })
            .await;
        store
            .insert_quote(QuoteSummary {
                id: "Q1".to_string(),
                quote_number: "Q-2026-001".to_string(),
                project_id: Some("P1".to_string()),
            })
            .await;
        store
    }

    fn staff() -> UserContext {
        UserContext::new("staff-1", Role::Staff)
    }

    fn request(body: serde_json::Value) -> SubmitVersionRequest {
        serde_json::from_value(body).unwrap()
    }

    fn lot(id: &str) -> Id {
        id.to_string()
    }

    #[tokio::test]
    async fn test_two_version_scenario() {
        let store = seeded_store().await;

        let first = SelectionVersioning::submit_version(
            &store,
            &staff(),
            &lot("L1"),
            request(json!({
                "mark_current": true,
                "areas": [{ "name": "Kitchen", "items": [{ "name": "Sink", "is_applicable": true }] }]
            })),
        )
        .await
        .unwrap();

        assert!(first.created_selection);
        assert_eq!(first.version.sequence_number, 1);
        assert!(first.version.is_current);
        assert_eq!(
            first.selection.current_version_id.as_ref(),
            Some(&first.version.id)
        );

        let view = SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .unwrap();
        let current = view.current_version.unwrap();
        assert_eq!(current.areas[0].name, "Kitchen");
        assert_eq!(current.areas[0].items[0].name, "Sink");
        assert!(current.areas[0].items[0].is_applicable);

        let second = SelectionVersioning::submit_version(
            &store,
            &staff(),
            &lot("L1"),
            request(json!({
                "mark_current": true,
                "areas": [{ "name": "Bath", "items": [{ "name": "Vanity" }] }]
            })),
        )
        .await
        .unwrap();

        assert!(!second.created_selection);
        assert_eq!(second.version.sequence_number, 2);
        assert_eq!(second.selection.id, first.selection.id);

        let old = SelectionVersioning::version_detail(&store, &first.version.id)
            .await
            .unwrap();
        assert!(!old.is_current);
        assert_eq!(old.areas[0].name, "Kitchen");

        let view = SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.current_version.unwrap().id, second.version.id);
        assert_eq!(view.history.len(), 2);
        assert_eq!(view.history[0].sequence_number, 2);
        assert!(view.history[0].is_current);
        assert!(!view.history[1].is_current);
    }

    #[tokio::test]
    async fn test_sequence_numbers_are_gapless() {
        let store = seeded_store().await;

        for _ in 0..5 {
            SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), VersionDraft::new())
                .await
                .unwrap();
        }

        let history = SelectionVersioning::list_versions(&store, &lot("L1"))
            .await
            .unwrap();
        let numbers: Vec<i32> = history.iter().map(|v| v.sequence_number).collect();
        assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
        assert_eq!(history.iter().filter(|v| v.is_current).count(), 1);
        assert!(history[0].is_current);
    }

    #[tokio::test]
    async fn test_sequence_numbers_scoped_per_selection() {
        let store = seeded_store().await;

        SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), VersionDraft::new())
            .await
            .unwrap();
        SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), VersionDraft::new())
            .await
            .unwrap();
        let other =
            SelectionVersioning::submit_draft(&store, &staff(), &lot("L2"), VersionDraft::new())
                .await
                .unwrap();

        assert_eq!(other.version.sequence_number, 1);
        assert_eq!(store.selection_count().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_item_writes_nothing() {
        let store = seeded_store().await;
        let first =
            SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), VersionDraft::new())
                .await
                .unwrap();

        let err = SelectionVersioning::submit_version(
            &store,
            &staff(),
            &lot("L1"),
            request(json!({
                "project_id": "P2",
                "areas": [
                    { "name": "Kitchen" },
                    { "name": "Bath" },
                    { "name": "Laundry", "items": [{ "name": "Tub" }, { "notes": "no name" }] }
                ]
            })),
        )
        .await
        .unwrap_err();

        match err {
            SelectionError::Validation { path, .. } => assert_eq!(path, "areas[2].items[1].name"),
            other => panic!("expected validation error, got {:?}", other),
        }

        assert_eq!(store.version_count(&first.selection.id).await, 1);
        let selection = store
            .get_selection_for_lot(&lot("L1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(selection, first.selection);
    }

    #[tokio::test]
    async fn test_invalid_first_submission_creates_no_selection() {
        let store = seeded_store().await;

        let err = SelectionVersioning::submit_version(
            &store,
            &staff(),
            &lot("L1"),
            request(json!({ "areas": [{ "name": "" }] })),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SelectionError::Validation { .. }));
        assert_eq!(store.selection_count().await, 0);
        assert!(SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_references_fail_before_writing() {
        let store = seeded_store().await;

        let err = SelectionVersioning::submit_draft(
            &store,
            &staff(),
            &lot("missing"),
            VersionDraft::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "lot 'missing' not found");

        let mut draft = VersionDraft::new();
        draft.cross_refs.quote_id = Some("Q404".to_string());
        let err = SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), draft)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::NotFound(_)));

        let mut draft = VersionDraft::new();
        draft.cross_refs.project_id = Some("P404".to_string());
        let err = SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), draft)
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::NotFound(_)));

        assert_eq!(store.selection_count().await, 0);
    }

    #[tokio::test]
    async fn test_resubmission_keeps_creator_and_updates_supplied_refs() {
        let store = seeded_store().await;

        let mut draft = VersionDraft::new();
        draft.cross_refs.project_id = Some("P1".to_string());
        let first = SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), draft)
            .await
            .unwrap();
        assert_eq!(first.selection.created_by, "staff-1");

        let manager = UserContext::new("manager-7", Role::Manager);
        let mut draft = VersionDraft::new();
        draft.cross_refs.quote_id = Some("Q1".to_string());
        let second = SelectionVersioning::submit_draft(&store, &manager, &lot("L1"), draft)
            .await
            .unwrap();

        assert_eq!(store.selection_count().await, 1);
        assert_eq!(second.selection.id, first.selection.id);
        assert_eq!(second.selection.created_by, "staff-1");
        assert_eq!(second.selection.project_id.as_deref(), Some("P1"));
        assert_eq!(second.selection.quote_id.as_deref(), Some("Q1"));
        assert_eq!(second.version.created_by, "manager-7");

        let view = SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.project.unwrap().name, "Harbour Flats");
        assert_eq!(view.quote.unwrap().quote_number, "Q-2026-001");
    }

    #[tokio::test]
    async fn test_first_version_not_marked_current() {
        let store = seeded_store().await;

        let submitted = SelectionVersioning::submit_draft(
            &store,
            &staff(),
            &lot("L1"),
            VersionDraft::new().mark_current(false),
        )
        .await
        .unwrap();

        assert!(!submitted.version.is_current);
        assert_eq!(submitted.selection.current_version_id, None);

        let view = SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .unwrap();
        assert!(view.current_version.is_none());
        assert_eq!(view.history.len(), 1);
        assert!(!view.history[0].is_current);
    }

    #[tokio::test]
    async fn test_non_current_submission_keeps_existing_current() {
        let store = seeded_store().await;

        let first =
            SelectionVersioning::submit_draft(&store, &staff(), &lot("L1"), VersionDraft::new())
                .await
                .unwrap();
        let draft = SelectionVersioning::submit_draft(
            &store,
            &staff(),
            &lot("L1"),
            VersionDraft::new().mark_current(false),
        )
        .await
        .unwrap();

        assert_eq!(draft.version.sequence_number, 2);
        assert_eq!(
            draft.selection.current_version_id.as_ref(),
            Some(&first.version.id)
        );

        let history = SelectionVersioning::list_versions(&store, &lot("L1"))
            .await
            .unwrap();
        assert!(!history[0].is_current);
        assert!(history[1].is_current);
    }

    #[tokio::test]
    async fn test_submitted_tree_round_trips() {
        let store = seeded_store().await;

        let submitted = SelectionVersioning::submit_version(
            &store,
            &staff(),
            &lot("L1"),
            request(json!({
                "ceiling_height": "108",
                "bedroom_count": 3,
                "bathroom_count": "",
                "notes": "client prefers matte finishes",
                "areas": [
                    { "name": "Kitchen", "category": "wet", "items": [
                        { "name": "Sink", "is_applicable": true },
                        { "name": "Dishwasher", "category": "appliance" }
                    ]},
                    { "name": "Bedroom", "instance_index": 2, "items": [{ "name": "Wardrobe", "is_applicable": true }] },
                    { "name": "Bedroom", "items": [{ "name": "Desk" }] }
                ]
            })),
        )
        .await
        .unwrap();

        let view = SelectionVersioning::current_view(&store, &lot("L1"))
            .await
            .unwrap()
            .unwrap();
        let current = view.current_version.unwrap();

        assert_eq!(current, submitted.version);
        assert_eq!(current.measurements.ceiling_height, Some(108.0));
        assert_eq!(current.measurements.bedroom_count, Some(3.0));
        assert_eq!(current.measurements.bathroom_count, None);
        assert_eq!(current.notes.as_deref(), Some("client prefers matte finishes"));

        let areas: Vec<(&str, i32)> = current
            .areas
            .iter()
            .map(|a| (a.name.as_str(), a.instance_index))
            .collect();
        assert_eq!(areas, vec![("Bedroom", 1), ("Bedroom", 2), ("Kitchen", 1)]);

        let kitchen_items: Vec<(&str, bool)> = current.areas[2]
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.is_applicable))
            .collect();
        assert_eq!(kitchen_items, vec![("Dishwasher", false), ("Sink", true)]);
    }

    #[tokio::test]
    async fn test_reads_for_unknown_keys() {
        let store = seeded_store().await;

        assert!(SelectionVersioning::current_view(&store, &lot("L2"))
            .await
            .unwrap()
            .is_none());
        assert!(SelectionVersioning::list_versions(&store, &lot("L2"))
            .await
            .unwrap()
            .is_empty());

        let err = SelectionVersioning::current_view(&store, &lot("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::NotFound(_)));

        let err = SelectionVersioning::version_detail(&store, &"v-404".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "version 'v-404' not found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_serialize() {
        let store = seeded_store().await;

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let user = UserContext::new(format!("user-{}", i), Role::Staff);
                    SelectionVersioning::submit_draft(&store, &user, &lot("L1"), VersionDraft::new())
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = SelectionVersioning::list_versions(&store, &lot("L1"))
            .await
            .unwrap();
        let numbers: HashSet<i32> = history.iter().map(|v| v.sequence_number).collect();
        assert_eq!(numbers, (1..=10).collect::<HashSet<i32>>());
        assert_eq!(history.iter().filter(|v| v.is_current).count(), 1);
        assert_eq!(store.selection_count().await, 1);
    }
}
