use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use crate::model::{session_token_digest, Role};
use crate::store::PostgresStore;

/// Bearer token of the demo session created by `load_seed_data`
pub const DEMO_SESSION_TOKEN: &str = "demo-staff-token";

/// Load a demo project, quote, lots and session. Safe to run repeatedly.
pub async fn load_seed_data(store: &PostgresStore) -> Result<()> {
    let pool = store.pool();

    sqlx::query("INSERT INTO projects (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind("project-harbour")
        .bind("Harbour Flats")
        .execute(pool)
        .await
        .context("Failed to seed project")?;

    sqlx::query(
        "INSERT INTO quotes (id, quote_number, project_id) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
    )
    .bind("quote-harbour-001")
    .bind("Q-2026-001")
    .bind("project-harbour")
    .execute(pool)
    .await
    .context("Failed to seed quote")?;

    for (id, name) in [("lot-101", "Unit 101"), ("lot-102", "Unit 102")] {
        sqlx::query(
            "INSERT INTO lots (id, name, project_id) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .bind("project-harbour")
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed lot {}", id))?;
    }

    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, user_id, user_name, role, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (token_hash) DO UPDATE SET expires_at = EXCLUDED.expires_at
        "#,
    )
    .bind(session_token_digest(DEMO_SESSION_TOKEN))
    .bind("demo-staff")
    .bind("Demo Staff")
    .bind(Role::Staff.as_str())
    .bind(Utc::now() + Duration::days(30))
    .execute(pool)
    .await
    .context("Failed to seed demo session")?;

    log::info!(
        "Seed data loaded: lots lot-101, lot-102; demo bearer token '{}'",
        DEMO_SESSION_TOKEN
    );
    Ok(())
}
