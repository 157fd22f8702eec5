//! Analysis cache abstraction.
//!
//! The [`AnalysisCache`] trait stores one typed artifact per
//! `(project, kind)` key together with the content hash it was computed
//! from and an expiry time. Reads are freshness-checked against the
//! caller's current hash, so a changed manuscript never sees a stale payload.
//!
//! # Semantics
//!
//! | Operation      | Behavior                                                   |
//! |----------------|------------------------------------------------------------|
//! | `get`          | miss when absent, expired, or hash differs                 |
//! | `put`          | last-write-wins, atomic per key                            |
//! | `invalidate`   | one kind, or every kind when `kind` is `None`              |
//! | `export_all`   | every entry plus dismissed fingerprints, as one bundle     |
//! | `import_all`   | overwrite matching keys, leave others untouched            |
//! | `dismiss`      | append-only, keyed by fingerprint                          |
//!
//! Request deduplication is not the cache's job. Callers that need
//! at-most-one computation per key serialize above this layer.
//!
//! Implementations must be `Send + Sync`. The in-memory backend lives in
//! [`memory`]; the SQLite backend lives in the `plotline` app crate.

pub mod memory;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::Serialize;

use crate::error::{Error, Result, Stage};
use crate::models::{AnalysisCacheEntry, AnalysisKind, AnalysisPayload, CacheBundle};

pub use memory::InMemoryCache;

/// Default time-to-live for cached artifacts (one week).
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Metadata about a stored entry, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    pub project_id: String,
    pub kind: AnalysisKind,
    pub content_hash: String,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Size of the serialized payload.
    pub payload_bytes: usize,
}

impl CacheEntryInfo {
    pub fn of(entry: &AnalysisCacheEntry) -> Result<Self> {
        Ok(Self {
            project_id: entry.project_id.clone(),
            kind: entry.kind(),
            content_hash: entry.content_hash.clone(),
            computed_at: entry.computed_at,
            expires_at: entry.expires_at,
            payload_bytes: serde_json::to_vec(&entry.payload)?.len(),
        })
    }
}

/// Current time at millisecond precision, so stored timestamps survive a
/// round trip through any backend unchanged.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Build the entry `put` stores.
pub fn new_entry(
    project_id: &str,
    payload: AnalysisPayload,
    content_hash: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> AnalysisCacheEntry {
    let expires_at = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    AnalysisCacheEntry {
        project_id: project_id.to_string(),
        payload,
        content_hash: content_hash.to_string(),
        computed_at: now,
        expires_at,
    }
}

/// Whether `entry` may be served to a caller holding `current_hash` at `now`.
pub fn is_fresh(entry: &AnalysisCacheEntry, current_hash: &str, now: DateTime<Utc>) -> bool {
    !entry.is_expired_at(now) && entry.content_hash == current_hash
}

/// Reject bundles exported from a different project or carrying entries
/// that belong elsewhere.
pub fn check_bundle(project_id: &str, bundle: &CacheBundle) -> Result<()> {
    if bundle.project_id != project_id {
        return Err(Error::invalid(
            Stage::Cache,
            format!(
                "bundle was exported from project '{}', not '{}'",
                bundle.project_id, project_id
            ),
        ));
    }
    if let Some(stray) = bundle.entries.iter().find(|e| e.project_id != project_id) {
        return Err(Error::invalid(
            Stage::Cache,
            format!("bundle entry for {} belongs to project '{}'", stray.kind(), stray.project_id),
        ));
    }
    Ok(())
}

/// Abstract storage backend for analysis artifacts.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// The stored entry for a key regardless of freshness.
    async fn peek(&self, project_id: &str, kind: AnalysisKind) -> Result<Option<AnalysisCacheEntry>>;

    /// Store a freshly computed artifact, replacing any previous entry.
    async fn put(
        &self,
        project_id: &str,
        payload: AnalysisPayload,
        content_hash: &str,
        ttl: Duration,
    ) -> Result<AnalysisCacheEntry>;

    /// Remove one kind, or all kinds when `kind` is `None`. Returns the
    /// number of entries removed.
    async fn invalidate(&self, project_id: &str, kind: Option<AnalysisKind>) -> Result<usize>;

    /// Every entry and dismissal for a project, entries in kind order.
    async fn export_all(&self, project_id: &str) -> Result<CacheBundle>;

    /// Restore a bundle. Returns the number of entries written.
    async fn import_all(&self, project_id: &str, bundle: CacheBundle) -> Result<usize>;

    /// Record a dismissed plot-hole fingerprint. Returns `false` if it was
    /// already recorded.
    async fn dismiss(&self, project_id: &str, fingerprint: &str) -> Result<bool>;

    /// All dismissed fingerprints for a project.
    async fn dismissed(&self, project_id: &str) -> Result<BTreeSet<String>>;

    /// Entry metadata for one project, or for every project.
    async fn entries(&self, project_id: Option<&str>) -> Result<Vec<CacheEntryInfo>>;

    /// The cached payload if it is fresh at `now` for `current_hash`.
    async fn get_at(
        &self,
        project_id: &str,
        kind: AnalysisKind,
        current_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AnalysisPayload>> {
        let entry = self.peek(project_id, kind).await?;
        Ok(entry
            .filter(|e| is_fresh(e, current_hash, now))
            .map(|e| e.payload))
    }

    /// The cached payload if it is fresh now for `current_hash`.
    async fn get(
        &self,
        project_id: &str,
        kind: AnalysisKind,
        current_hash: &str,
    ) -> Result<Option<AnalysisPayload>> {
        self.get_at(project_id, kind, current_hash, Utc::now()).await
    }
}
