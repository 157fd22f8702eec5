//! SQLite-backed [`AnalysisCache`].
//!
//! One row per `(project_id, analysis_type)` in `analysis_cache`, written
//! with `INSERT … ON CONFLICT DO UPDATE` so each `put` replaces its key
//! atomically. Dismissals go to `dismissed_plot_holes` with
//! `INSERT OR IGNORE` and are never removed. Timestamps are stored as
//! milliseconds since the epoch.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use plotline_core::cache::{self, AnalysisCache, CacheEntryInfo};
use plotline_core::models::{AnalysisCacheEntry, AnalysisKind, AnalysisPayload, CacheBundle};
use plotline_core::{Error, Result};

pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete rows whose `expires_at` has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let done = sqlx::query("DELETE FROM analysis_cache WHERE expires_at < ?")
            .bind(cache::now_millis().timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(Error::storage)?;
        Ok(done.rows_affected())
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::storage(format!("timestamp out of range: {}", ms)))
}

fn entry_from_row(row: &SqliteRow) -> Result<AnalysisCacheEntry> {
    let kind: String = row.try_get("analysis_type").map_err(Error::storage)?;
    let payload_json: String = row.try_get("payload_json").map_err(Error::storage)?;
    let payload: AnalysisPayload = serde_json::from_str(&payload_json)?;
    if payload.kind().as_str() != kind {
        return Err(Error::storage(format!(
            "row for {} holds a {} payload",
            kind,
            payload.kind()
        )));
    }
    Ok(AnalysisCacheEntry {
        project_id: row.try_get("project_id").map_err(Error::storage)?,
        payload,
        content_hash: row.try_get("content_hash").map_err(Error::storage)?,
        computed_at: from_millis(row.try_get("computed_at").map_err(Error::storage)?)?,
        expires_at: from_millis(row.try_get("expires_at").map_err(Error::storage)?)?,
    })
}

const UPSERT: &str = r#"
    INSERT INTO analysis_cache (project_id, analysis_type, payload_json, content_hash,
                                computed_at, expires_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(project_id, analysis_type) DO UPDATE SET
        payload_json = excluded.payload_json,
        content_hash = excluded.content_hash,
        computed_at = excluded.computed_at,
        expires_at = excluded.expires_at
"#;

const SELECT_ENTRY: &str = "SELECT project_id, analysis_type, payload_json, content_hash, computed_at, expires_at FROM analysis_cache";

#[async_trait]
impl AnalysisCache for SqliteCache {
    async fn peek(&self, project_id: &str, kind: AnalysisKind) -> Result<Option<AnalysisCacheEntry>> {
        let row = sqlx::query(&format!(
            "{} WHERE project_id = ? AND analysis_type = ?",
            SELECT_ENTRY
        ))
        .bind(project_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::storage)?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn put(
        &self,
        project_id: &str,
        payload: AnalysisPayload,
        content_hash: &str,
        ttl: Duration,
    ) -> Result<AnalysisCacheEntry> {
        let entry = cache::new_entry(project_id, payload, content_hash, ttl, cache::now_millis());
        sqlx::query(UPSERT)
            .bind(&entry.project_id)
            .bind(entry.kind().as_str())
            .bind(serde_json::to_string(&entry.payload)?)
            .bind(&entry.content_hash)
            .bind(entry.computed_at.timestamp_millis())
            .bind(entry.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(Error::storage)?;
        Ok(entry)
    }

    async fn invalidate(&self, project_id: &str, kind: Option<AnalysisKind>) -> Result<usize> {
        let done = match kind {
            Some(kind) => {
                sqlx::query("DELETE FROM analysis_cache WHERE project_id = ? AND analysis_type = ?")
                    .bind(project_id)
                    .bind(kind.as_str())
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM analysis_cache WHERE project_id = ?")
                    .bind(project_id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(Error::storage)?;
        Ok(done.rows_affected() as usize)
    }

    async fn export_all(&self, project_id: &str) -> Result<CacheBundle> {
        let rows = sqlx::query(&format!("{} WHERE project_id = ?", SELECT_ENTRY))
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::storage)?;
        let mut entries = rows.iter().map(entry_from_row).collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.kind());
        let dismissed_fingerprints = self.dismissed(project_id).await?.into_iter().collect();
        Ok(CacheBundle {
            project_id: project_id.to_string(),
            exported_at: cache::now_millis(),
            entries,
            dismissed_fingerprints,
        })
    }

    async fn import_all(&self, project_id: &str, bundle: CacheBundle) -> Result<usize> {
        cache::check_bundle(project_id, &bundle)?;
        let mut tx = self.pool.begin().await.map_err(Error::storage)?;

        for entry in &bundle.entries {
            sqlx::query(UPSERT)
                .bind(project_id)
                .bind(entry.kind().as_str())
                .bind(serde_json::to_string(&entry.payload)?)
                .bind(&entry.content_hash)
                .bind(entry.computed_at.timestamp_millis())
                .bind(entry.expires_at.timestamp_millis())
                .execute(&mut *tx)
                .await
                .map_err(Error::storage)?;
        }

        let now = cache::now_millis().timestamp_millis();
        for fingerprint in &bundle.dismissed_fingerprints {
            sqlx::query(
                "INSERT OR IGNORE INTO dismissed_plot_holes (project_id, fingerprint, dismissed_at) VALUES (?, ?, ?)",
            )
            .bind(project_id)
            .bind(fingerprint)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::storage)?;
        }

        tx.commit().await.map_err(Error::storage)?;
        Ok(bundle.entries.len())
    }

    async fn dismiss(&self, project_id: &str, fingerprint: &str) -> Result<bool> {
        let done = sqlx::query(
            "INSERT OR IGNORE INTO dismissed_plot_holes (project_id, fingerprint, dismissed_at) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(fingerprint)
        .bind(cache::now_millis().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(Error::storage)?;
        Ok(done.rows_affected() > 0)
    }

    async fn dismissed(&self, project_id: &str) -> Result<BTreeSet<String>> {
        let fingerprints: Vec<String> = sqlx::query_scalar(
            "SELECT fingerprint FROM dismissed_plot_holes WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::storage)?;
        Ok(fingerprints.into_iter().collect())
    }

    async fn entries(&self, project_id: Option<&str>) -> Result<Vec<CacheEntryInfo>> {
        let rows = match project_id {
            Some(p) => {
                sqlx::query(&format!(
                    "{} WHERE project_id = ? ORDER BY project_id, analysis_type",
                    SELECT_ENTRY
                ))
                .bind(p)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("{} ORDER BY project_id, analysis_type", SELECT_ENTRY))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(Error::storage)?;
        let mut infos = Vec::with_capacity(rows.len());
        for row in &rows {
            infos.push(CacheEntryInfo::of(&entry_from_row(row)?)?);
        }
        infos.sort_by(|a, b| a.project_id.cmp(&b.project_id).then(a.kind.cmp(&b.kind)));
        Ok(infos)
    }
}
