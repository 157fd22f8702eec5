//! In-memory [`AnalysisCache`] for tests and embedding.
//!
//! Entries and dismissals live in `HashMap`s behind `std::sync::RwLock`.
//! Every mutation happens under a single write lock, which makes each `put`
//! atomic per key and each `import_all` atomic per bundle.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{check_bundle, new_entry, now_millis, AnalysisCache, CacheEntryInfo};
use crate::error::{Error, Result};
use crate::models::{AnalysisCacheEntry, AnalysisKind, AnalysisPayload, CacheBundle};

type EntryMap = HashMap<(String, AnalysisKind), AnalysisCacheEntry>;
type DismissMap = HashMap<String, BTreeSet<String>>;

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<EntryMap>,
    dismissed: RwLock<DismissMap>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> Result<RwLockReadGuard<'_, EntryMap>> {
        self.entries.read().map_err(|_| Error::storage("cache lock poisoned"))
    }

    fn write_entries(&self) -> Result<RwLockWriteGuard<'_, EntryMap>> {
        self.entries.write().map_err(|_| Error::storage("cache lock poisoned"))
    }

    fn read_dismissed(&self) -> Result<RwLockReadGuard<'_, DismissMap>> {
        self.dismissed.read().map_err(|_| Error::storage("dismissal lock poisoned"))
    }

    fn write_dismissed(&self) -> Result<RwLockWriteGuard<'_, DismissMap>> {
        self.dismissed.write().map_err(|_| Error::storage("dismissal lock poisoned"))
    }
}

#[async_trait]
impl AnalysisCache for InMemoryCache {
    async fn peek(&self, project_id: &str, kind: AnalysisKind) -> Result<Option<AnalysisCacheEntry>> {
        let entries = self.read_entries()?;
        Ok(entries.get(&(project_id.to_string(), kind)).cloned())
    }

    async fn put(
        &self,
        project_id: &str,
        payload: AnalysisPayload,
        content_hash: &str,
        ttl: Duration,
    ) -> Result<AnalysisCacheEntry> {
        let entry = new_entry(project_id, payload, content_hash, ttl, now_millis());
        let mut entries = self.write_entries()?;
        entries.insert((project_id.to_string(), entry.kind()), entry.clone());
        Ok(entry)
    }

    async fn invalidate(&self, project_id: &str, kind: Option<AnalysisKind>) -> Result<usize> {
        let mut entries = self.write_entries()?;
        let before = entries.len();
        entries.retain(|(p, k), _| !(p == project_id && kind.map_or(true, |want| *k == want)));
        Ok(before - entries.len())
    }

    async fn export_all(&self, project_id: &str) -> Result<CacheBundle> {
        let mut entries: Vec<AnalysisCacheEntry> = self
            .read_entries()?
            .iter()
            .filter(|((p, _), _)| p == project_id)
            .map(|(_, e)| e.clone())
            .collect();
        entries.sort_by_key(|e| e.kind());
        let dismissed_fingerprints = self
            .read_dismissed()?
            .get(project_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(CacheBundle {
            project_id: project_id.to_string(),
            exported_at: now_millis(),
            entries,
            dismissed_fingerprints,
        })
    }

    async fn import_all(&self, project_id: &str, bundle: CacheBundle) -> Result<usize> {
        check_bundle(project_id, &bundle)?;
        let count = bundle.entries.len();
        {
            let mut entries = self.write_entries()?;
            for entry in bundle.entries {
                entries.insert((project_id.to_string(), entry.kind()), entry);
            }
        }
        let mut dismissed = self.write_dismissed()?;
        dismissed
            .entry(project_id.to_string())
            .or_default()
            .extend(bundle.dismissed_fingerprints);
        Ok(count)
    }

    async fn dismiss(&self, project_id: &str, fingerprint: &str) -> Result<bool> {
        let mut dismissed = self.write_dismissed()?;
        Ok(dismissed
            .entry(project_id.to_string())
            .or_default()
            .insert(fingerprint.to_string()))
    }

    async fn dismissed(&self, project_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .read_dismissed()?
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn entries(&self, project_id: Option<&str>) -> Result<Vec<CacheEntryInfo>> {
        let entries = self.read_entries()?;
        let mut infos = entries
            .values()
            .filter(|e| project_id.map_or(true, |p| e.project_id == p))
            .map(CacheEntryInfo::of)
            .collect::<Result<Vec<_>>>()?;
        infos.sort_by(|a, b| a.project_id.cmp(&b.project_id).then(a.kind.cmp(&b.kind)));
        Ok(infos)
    }
}
