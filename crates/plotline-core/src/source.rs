//! Read-only access to manuscripts.
//!
//! A [`ChapterSource`] returns a [`ProjectSnapshot`] for a project: ordered
//! chapters, the cast and the declared point of view. The core never writes
//! back to a source.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::ProjectSnapshot;

/// Summary of a project a source can serve.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub title: Option<String>,
    pub chapter_count: usize,
    pub character_count: usize,
}

#[async_trait]
pub trait ChapterSource: Send + Sync {
    /// Chapters sorted by `order_index`, plus characters and project metadata.
    async fn snapshot(&self, project_id: &str) -> Result<ProjectSnapshot>;

    async fn list_projects(&self) -> Result<Vec<ProjectInfo>>;
}

/// Snapshots held in memory. Used by tests and by embedders that already
/// hold the manuscript.
#[derive(Default)]
pub struct InMemorySource {
    projects: RwLock<BTreeMap<String, ProjectSnapshot>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, snapshot: ProjectSnapshot) -> Self {
        // A fresh source has no other lock holders.
        if let Ok(mut projects) = self.projects.write() {
            projects.insert(snapshot.project_id.clone(), snapshot);
        }
        self
    }

    /// Insert or replace a project.
    pub fn upsert(&self, snapshot: ProjectSnapshot) -> Result<()> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| Error::source_failure("source lock poisoned"))?;
        projects.insert(snapshot.project_id.clone(), snapshot);
        Ok(())
    }
}

#[async_trait]
impl ChapterSource for InMemorySource {
    async fn snapshot(&self, project_id: &str) -> Result<ProjectSnapshot> {
        let projects = self
            .projects
            .read()
            .map_err(|_| Error::source_failure("source lock poisoned"))?;
        let mut snapshot = projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::source_failure(format!("unknown project: {}", project_id)))?;
        snapshot.chapters.sort_by_key(|c| c.order_index);
        Ok(snapshot)
    }

    async fn list_projects(&self) -> Result<Vec<ProjectInfo>> {
        let projects = self
            .projects
            .read()
            .map_err(|_| Error::source_failure("source lock poisoned"))?;
        Ok(projects
            .values()
            .map(|s| ProjectInfo {
                project_id: s.project_id.clone(),
                title: s.title.clone(),
                chapter_count: s.chapters.len(),
                character_count: s.characters.len(),
            })
            .collect())
    }
}
