use anyhow::{anyhow, Context};
use itertools::Itertools;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Postgres, Row, Transaction,
};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{SelectionError, SelectionResult};
use crate::model::{
    session_token_digest, CrossRefs, Id, Lot, MaterialSelection, Measurements, ProjectSummary,
    QuoteSummary, Role, SelectionArea, SelectionItem, SelectionVersion, UserContext,
    VersionSummary,
};
use crate::store::traits::{LotStore, SelectionStore, SelectionTransaction, SessionStore, Store};

const SELECTION_COLUMNS: &str =
    "id, lot_id, project_id, quote_id, current_version_id, created_by, created_at, updated_at";

const VERSION_COLUMNS: &str = "id, selection_id, sequence_number, is_current, ceiling_height, \
     bedroom_count, bathroom_count, notes, created_by, created_at";

/// unique_violation, serialization_failure, deadlock_detected
const CONFLICT_CODES: [&str; 3] = ["23505", "40001", "40P01"];

/// Map a sqlx failure onto the selection error taxonomy.
pub fn classify(err: sqlx::Error, action: &str) -> SelectionError {
    let code = match &err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    };

    if let Some(code) = code.as_deref() {
        if CONFLICT_CODES.contains(&code) {
            return SelectionError::Conflict(format!("{}: {}", action, err));
        }
    }

    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SelectionError::Unavailable(format!("{}: {}", action, err))
        }
        other => SelectionError::Store(anyhow::Error::new(other).context(action.to_string())),
    }
}

trait SqlxResultExt<T> {
    fn classify(self, action: &str) -> SelectionResult<T>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn classify(self, action: &str) -> SelectionResult<T> {
        self.map_err(|e| classify(e, action))
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(20))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.unwrap_or(10)))
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn selection_from_row(row: &PgRow) -> MaterialSelection {
    MaterialSelection {
        id: row.get("id"),
        lot_id: row.get("lot_id"),
        project_id: row.get("project_id"),
        quote_id: row.get("quote_id"),
        current_version_id: row.get("current_version_id"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn version_from_row(row: &PgRow) -> SelectionVersion {
    SelectionVersion {
        id: row.get("id"),
        selection_id: row.get("selection_id"),
        sequence_number: row.get("sequence_number"),
        is_current: row.get("is_current"),
        measurements: Measurements {
            ceiling_height: row.get("ceiling_height"),
            bedroom_count: row.get("bedroom_count"),
            bathroom_count: row.get("bathroom_count"),
        },
        notes: row.get("notes"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        areas: Vec::new(),
    }
}

#[async_trait::async_trait]
impl LotStore for PostgresStore {
    async fn get_lot(&self, id: &Id) -> SelectionResult<Option<Lot>> {
        let row = sqlx::query("SELECT id, name, project_id FROM lots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .classify("Failed to fetch lot")?;

        Ok(row.map(|row| Lot {
            id: row.get("id"),
            name: row.get("name"),
            project_id: row.get("project_id"),
        }))
    }

    async fn get_project_summary(&self, id: &Id) -> SelectionResult<Option<ProjectSummary>> {
        let row = sqlx::query("SELECT id, name FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .classify("Failed to fetch project")?;

        Ok(row.map(|row| ProjectSummary {
            id: row.get("id"),
            name: row.get("name"),
        }))
    }

    async fn get_quote_summary(&self, id: &Id) -> SelectionResult<Option<QuoteSummary>> {
        let row = sqlx::query("SELECT id, quote_number, project_id FROM quotes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .classify("Failed to fetch quote")?;

        Ok(row.map(|row| QuoteSummary {
            id: row.get("id"),
            quote_number: row.get("quote_number"),
            project_id: row.get("project_id"),
        }))
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresStore {
    async fn resolve_session(&self, token: &str) -> SelectionResult<Option<UserContext>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, user_name, role
            FROM sessions
            WHERE token_hash = $1 AND expires_at > NOW()
            "#,
        )
        .bind(session_token_digest(token))
        .fetch_optional(&self.pool)
        .await
        .classify("Failed to resolve session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role_str: String = row.get("role");
        let Some(role) = Role::parse(&role_str) else {
            log::warn!("Session has unknown role '{}', rejecting", role_str);
            return Ok(None);
        };

        Ok(Some(UserContext::with_details(
            row.get("user_id"),
            row.get("user_name"),
            role,
        )))
    }
}

pub struct PgSelectionTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl SelectionTransaction for PgSelectionTransaction {
    async fn lock_selection_for_lot(
        &mut self,
        lot_id: &Id,
    ) -> SelectionResult<Option<MaterialSelection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM material_selections WHERE lot_id = $1 FOR UPDATE",
            SELECTION_COLUMNS
        ))
        .bind(lot_id)
        .fetch_optional(&mut *self.tx)
        .await
        .classify("Failed to lock material selection")?;

        Ok(row.as_ref().map(selection_from_row))
    }

    async fn insert_selection(
        &mut self,
        selection: &MaterialSelection,
    ) -> SelectionResult<MaterialSelection> {
        // A concurrent first submission for the same lot blocks here until the
        // other transaction finishes, then falls through to the re-select.
        sqlx::query(
            r#"
            INSERT INTO material_selections
                (id, lot_id, project_id, quote_id, current_version_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NULL, $5, $6, $7)
            ON CONFLICT (lot_id) DO NOTHING
            "#,
        )
        .bind(&selection.id)
        .bind(&selection.lot_id)
        .bind(&selection.project_id)
        .bind(&selection.quote_id)
        .bind(&selection.created_by)
        .bind(selection.created_at)
        .bind(selection.updated_at)
        .execute(&mut *self.tx)
        .await
        .classify("Failed to create material selection")?;

        self.lock_selection_for_lot(&selection.lot_id)
            .await?
            .ok_or_else(|| {
                SelectionError::Conflict(format!(
                    "material selection for lot '{}' vanished during creation",
                    selection.lot_id
                ))
            })
    }

    async fn update_cross_refs(
        &mut self,
        selection_id: &Id,
        refs: &CrossRefs,
    ) -> SelectionResult<MaterialSelection> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE material_selections
            SET project_id = COALESCE($2, project_id),
                quote_id = COALESCE($3, quote_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECTION_COLUMNS
        ))
        .bind(selection_id)
        .bind(&refs.project_id)
        .bind(&refs.quote_id)
        .fetch_one(&mut *self.tx)
        .await
        .classify("Failed to update material selection references")?;

        Ok(selection_from_row(&row))
    }

    async fn max_sequence_number(&mut self, selection_id: &Id) -> SelectionResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM material_selection_versions WHERE selection_id = $1",
        )
        .bind(selection_id)
        .fetch_one(&mut *self.tx)
        .await
        .classify("Failed to read latest sequence number")
    }

    async fn clear_current_versions(&mut self, selection_id: &Id) -> SelectionResult<u64> {
        let result = sqlx::query(
            "UPDATE material_selection_versions SET is_current = FALSE WHERE selection_id = $1 AND is_current",
        )
        .bind(selection_id)
        .execute(&mut *self.tx)
        .await
        .classify("Failed to clear current version flag")?;

        Ok(result.rows_affected())
    }

    async fn insert_version(&mut self, version: &SelectionVersion) -> SelectionResult<()> {
        sqlx::query(&format!(
            "INSERT INTO material_selection_versions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            VERSION_COLUMNS
        ))
        .bind(&version.id)
        .bind(&version.selection_id)
        .bind(version.sequence_number)
        .bind(version.is_current)
        .bind(version.measurements.ceiling_height)
        .bind(version.measurements.bedroom_count)
        .bind(version.measurements.bathroom_count)
        .bind(&version.notes)
        .bind(&version.created_by)
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .classify("Failed to insert material selection version")?;

        for (area_position, area) in version.areas.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO material_selection_areas
                    (id, version_id, name, instance_index, category, notes, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&area.id)
            .bind(&area.version_id)
            .bind(&area.name)
            .bind(area.instance_index)
            .bind(&area.category)
            .bind(&area.notes)
            .bind(area_position as i32)
            .execute(&mut *self.tx)
            .await
            .classify("Failed to insert material selection area")?;

            for (item_position, item) in area.items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO material_selection_items
                        (id, area_id, name, category, is_applicable, notes, position)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(&item.id)
                .bind(&item.area_id)
                .bind(&item.name)
                .bind(&item.category)
                .bind(item.is_applicable)
                .bind(&item.notes)
                .bind(item_position as i32)
                .execute(&mut *self.tx)
                .await
                .classify("Failed to insert material selection item")?;
            }
        }

        Ok(())
    }

    async fn set_current_version(
        &mut self,
        selection_id: &Id,
        version_id: &Id,
    ) -> SelectionResult<MaterialSelection> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE material_selections
            SET current_version_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECTION_COLUMNS
        ))
        .bind(selection_id)
        .bind(version_id)
        .fetch_one(&mut *self.tx)
        .await
        .classify("Failed to set current version")?;

        Ok(selection_from_row(&row))
    }

    async fn commit(self) -> SelectionResult<()> {
        self.tx
            .commit()
            .await
            .classify("Failed to commit material selection transaction")
    }
}

#[async_trait::async_trait]
impl SelectionStore for PostgresStore {
    type Transaction = PgSelectionTransaction;

    async fn begin(&self) -> SelectionResult<PgSelectionTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .classify("Failed to begin transaction")?;
        Ok(PgSelectionTransaction { tx })
    }

    async fn get_selection_for_lot(
        &self,
        lot_id: &Id,
    ) -> SelectionResult<Option<MaterialSelection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM material_selections WHERE lot_id = $1",
            SELECTION_COLUMNS
        ))
        .bind(lot_id)
        .fetch_optional(&self.pool)
        .await
        .classify("Failed to fetch material selection")?;

        Ok(row.as_ref().map(selection_from_row))
    }

    async fn list_version_summaries(
        &self,
        selection_id: &Id,
    ) -> SelectionResult<Vec<VersionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence_number, is_current, created_by, created_at
            FROM material_selection_versions
            WHERE selection_id = $1
            ORDER BY sequence_number DESC
            "#,
        )
        .bind(selection_id)
        .fetch_all(&self.pool)
        .await
        .classify("Failed to list material selection versions")?;

        Ok(rows
            .into_iter()
            .map(|row| VersionSummary {
                id: row.get("id"),
                sequence_number: row.get("sequence_number"),
                is_current: row.get("is_current"),
                created_by: row.get("created_by"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn get_version(&self, version_id: &Id) -> SelectionResult<Option<SelectionVersion>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM material_selection_versions WHERE id = $1",
            VERSION_COLUMNS
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .classify("Failed to fetch material selection version")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut version = version_from_row(&row);

        let area_rows = sqlx::query(
            r#"
            SELECT id, version_id, name, instance_index, category, notes
            FROM material_selection_areas
            WHERE version_id = $1
            ORDER BY name COLLATE "C", instance_index, position
            "#,
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .classify("Failed to fetch material selection areas")?;

        let area_ids: Vec<Id> = area_rows.iter().map(|row| row.get("id")).collect();

        let item_rows = if area_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query(
                r#"
                SELECT id, area_id, name, category, is_applicable, notes
                FROM material_selection_items
                WHERE area_id = ANY($1)
                ORDER BY name COLLATE "C", position
                "#,
            )
            .bind(&area_ids)
            .fetch_all(&self.pool)
            .await
            .classify("Failed to fetch material selection items")?
        };

        let mut items_by_area = item_rows
            .into_iter()
            .map(|row| SelectionItem {
                id: row.get("id"),
                area_id: row.get("area_id"),
                name: row.get("name"),
                category: row.get("category"),
                is_applicable: row.get("is_applicable"),
                notes: row.get("notes"),
            })
            .into_group_map_by(|item| item.area_id.clone());

        version.areas = area_rows
            .into_iter()
            .map(|row| {
                let id: Id = row.get("id");
                let items = items_by_area.remove(&id).unwrap_or_default();
                SelectionArea {
                    id,
                    version_id: row.get("version_id"),
                    name: row.get("name"),
                    instance_index: row.get("instance_index"),
                    category: row.get("category"),
                    notes: row.get("notes"),
                    items,
                }
            })
            .collect();

        if !items_by_area.is_empty() {
            return Err(SelectionError::Store(anyhow!(
                "version '{}' has items attached to unknown areas",
                version_id
            )));
        }

        Ok(Some(version))
    }
}

impl Store for PostgresStore {}
