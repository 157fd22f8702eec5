use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the cache schema. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per (project, analysis kind); payload is the serialized artifact.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_cache (
            project_id TEXT NOT NULL,
            analysis_type TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            computed_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            PRIMARY KEY (project_id, analysis_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only: rows are never updated or deleted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dismissed_plot_holes (
            project_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            dismissed_at INTEGER NOT NULL,
            PRIMARY KEY (project_id, fingerprint)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analysis_cache_expires_at ON analysis_cache(expires_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
