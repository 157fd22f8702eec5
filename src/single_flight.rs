//! Per-key serialization of expensive computations.
//!
//! The cache itself is last-write-wins. The server holds one of these so two
//! requests for the same project and analysis kind do not compute the same
//! artifact twice: the second waits, then finds the first one's cache entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use plotline_core::models::AnalysisKind;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Key = (String, AnalysisKind);

#[derive(Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `(project_id, kind)`.
    pub async fn acquire(&self, project_id: &str, kind: AnalysisKind) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Drop locks nobody holds or waits on.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry((project_id.to_string(), kind))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
