//! Filesystem manuscripts.
//!
//! A project is a directory with a `project.toml` next to its chapter files:
//!
//! ```toml
//! title = "The Lantern Keeper"
//! pov = "third-limited"
//!
//! [[characters]]
//! id = "mara"
//! name = "Mara Quill"
//! role = "protagonist"
//! traits = ["brave", "stubborn"]
//! aliases = ["Mara"]
//!
//! # Optional. Without it, chapter files are discovered with the project's
//! # include/exclude globs and ordered by the number their file name starts
//! # with ("01-harbour.md", "2 storm.txt").
//! [[chapters]]
//! file = "chapters/01-harbour.md"
//! order = 1
//! characters = ["mara"]
//! pov_character = "mara"
//! ```
//!
//! The source only reads. A leading `# Heading` line becomes the chapter
//! title and is not part of the analysed text.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use plotline_core::models::{Chapter, Character, CharacterRole, PovMode, ProjectSnapshot};
use plotline_core::source::{ChapterSource, ProjectInfo};
use plotline_core::text;

use crate::config::{Config, ProjectConfig};

pub const PROJECT_FILE: &str = "project.toml";

#[derive(Debug, Deserialize, Default)]
struct ProjectFile {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    pov: Option<String>,
    #[serde(default)]
    characters: Vec<CharacterEntry>,
    #[serde(default)]
    chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Deserialize)]
struct CharacterEntry {
    id: String,
    name: String,
    #[serde(default = "default_role")]
    role: CharacterRole,
    #[serde(default)]
    traits: BTreeSet<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    occupation: Option<String>,
    #[serde(default)]
    age_range: Option<String>,
}

fn default_role() -> CharacterRole {
    CharacterRole::Supporting
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    file: PathBuf,
    order: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    pov_character: Option<String>,
}

/// Reads the projects listed under `[projects.*]` in the config.
pub struct FsManuscriptSource {
    projects: BTreeMap<String, ProjectConfig>,
}

impl FsManuscriptSource {
    pub fn new(config: &Config) -> Self {
        Self {
            projects: config.projects.clone(),
        }
    }

    fn project(&self, project_id: &str) -> Result<&ProjectConfig> {
        self.projects
            .get(project_id)
            .with_context(|| format!("unknown project: {}", project_id))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn read_project_file(root: &Path) -> Result<ProjectFile> {
    let path = root.join(PROJECT_FILE);
    if !path.exists() {
        return Ok(ProjectFile::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Number a file name starts with, if any.
fn leading_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_string_lossy();
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Chapter files under `root`, in reading order.
fn discover(root: &Path, project: &ProjectConfig) -> Result<Vec<PathBuf>> {
    let include = build_globset(&project.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), PROJECT_FILE.to_string()];
    excludes.extend(project.exclude_globs.iter().cloned());
    let exclude = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(project.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }
        files.push(relative.to_path_buf());
    }
    // Numbered files first by number, the rest by path.
    files.sort_by(|a, b| {
        let key = |p: &PathBuf| (leading_number(p).unwrap_or(u32::MAX), p.clone());
        key(a).cmp(&key(b))
    });
    Ok(files)
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    Ok(DateTime::<Utc>::from(modified))
}

/// Split a leading `# Heading` from the body.
fn split_heading(content: &str) -> (Option<String>, String) {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix("# ") {
        let (heading, body) = rest.split_once('\n').unwrap_or((rest, ""));
        return (Some(heading.trim().to_string()), body.trim().to_string());
    }
    (None, content.trim().to_string())
}

struct ChapterFile<'a> {
    relative: &'a Path,
    order: u32,
    id: Option<String>,
    title: Option<String>,
    characters: Vec<String>,
    pov_character: Option<String>,
}

fn load_chapter(project_id: &str, root: &Path, file: ChapterFile<'_>) -> Result<Chapter> {
    let path = root.join(file.relative);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read chapter {}", path.display()))?;
    let (heading, body) = split_heading(&content);
    let id = file.id.unwrap_or_else(|| {
        file.relative
            .with_extension("")
            .to_string_lossy()
            .replace('\\', "/")
    });
    Ok(Chapter {
        id,
        project_id: project_id.to_string(),
        order_index: file.order,
        title: file.title.or(heading),
        word_count: text::word_count(&body) as u32,
        text: body,
        last_modified_at: modified_at(&path)?,
        character_ids: file.characters,
        pov_character_id: file.pov_character,
    })
}

/// Read one project from disk.
pub fn load_project(project_id: &str, project: &ProjectConfig) -> Result<ProjectSnapshot> {
    let root = &project.root;
    if !root.is_dir() {
        bail!("Project root does not exist: {}", root.display());
    }
    let manifest = read_project_file(root)?;

    let pov_mode = manifest
        .pov
        .as_deref()
        .map(|p| p.parse::<PovMode>().map_err(anyhow::Error::msg))
        .transpose()?;

    let characters = manifest
        .characters
        .into_iter()
        .map(|c| Character {
            id: c.id,
            project_id: project_id.to_string(),
            name: c.name,
            role: c.role,
            traits: c.traits,
            aliases: c.aliases,
            occupation: c.occupation,
            age_range: c.age_range,
        })
        .collect();

    let mut chapters = Vec::new();
    if manifest.chapters.is_empty() {
        for (i, relative) in discover(root, project)?.iter().enumerate() {
            chapters.push(load_chapter(
                project_id,
                root,
                ChapterFile {
                    relative,
                    order: i as u32 + 1,
                    id: None,
                    title: None,
                    characters: Vec::new(),
                    pov_character: None,
                },
            )?);
        }
    } else {
        for entry in manifest.chapters {
            chapters.push(load_chapter(
                project_id,
                root,
                ChapterFile {
                    relative: &entry.file,
                    order: entry.order,
                    id: entry.id,
                    title: entry.title,
                    characters: entry.characters,
                    pov_character: entry.pov_character,
                },
            )?);
        }
    }
    chapters.sort_by_key(|c| c.order_index);

    tracing::debug!(project = project_id, chapters = chapters.len(), "manuscript loaded");
    Ok(ProjectSnapshot {
        project_id: project_id.to_string(),
        title: manifest.title,
        pov_mode,
        chapters,
        characters,
    })
}

#[async_trait]
impl ChapterSource for FsManuscriptSource {
    async fn snapshot(&self, project_id: &str) -> plotline_core::Result<ProjectSnapshot> {
        self.project(project_id)
            .and_then(|p| load_project(project_id, p))
            .map_err(|e| plotline_core::Error::source_failure(format!("{:#}", e)))
    }

    async fn list_projects(&self) -> plotline_core::Result<Vec<ProjectInfo>> {
        let mut infos = Vec::with_capacity(self.projects.len());
        for (id, project) in &self.projects {
            let snapshot = load_project(id, project)
                .map_err(|e| plotline_core::Error::source_failure(format!("{:#}", e)))?;
            infos.push(ProjectInfo {
                project_id: id.clone(),
                title: snapshot.title,
                chapter_count: snapshot.chapters.len(),
                character_count: snapshot.characters.len(),
            });
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_at(root: &Path) -> ProjectConfig {
        ProjectConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".into(), "**/*.txt".into()],
            exclude_globs: vec!["notes/**".into()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn test_discovered_chapters_follow_leading_numbers() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("10-end.md"), "# The End\n\nIt ended.").unwrap();
        fs::write(root.join("2-middle.md"), "Middle part.").unwrap();
        fs::write(root.join("1-start.txt"), "It began.").unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes/ideas.md"), "Not a chapter.").unwrap();

        let snap = load_project("novel", &project_at(root)).unwrap();
        let ids: Vec<&str> = snap.chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1-start", "2-middle", "10-end"]);
        let orders: Vec<u32> = snap.chapters.iter().map(|c| c.order_index).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(snap.chapters[2].title.as_deref(), Some("The End"));
        assert_eq!(snap.chapters[2].text, "It ended.");
        assert_eq!(snap.chapters[2].word_count, 2);
    }

    #[test]
    fn test_manifest_declares_cast_and_chapters() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(
            root.join(PROJECT_FILE),
            r#"
title = "Lanterns"
pov = "third-limited"

[[characters]]
id = "mara"
name = "Mara"
role = "protagonist"
traits = ["brave"]

[[chapters]]
file = "b.md"
order = 2

[[chapters]]
file = "a.md"
order = 1
characters = ["mara"]
pov_character = "mara"
"#,
        )
        .unwrap();
        fs::write(root.join("a.md"), "Mara lit the lantern.").unwrap();
        fs::write(root.join("b.md"), "The wind blew.").unwrap();

        let snap = load_project("lanterns", &project_at(root)).unwrap();
        assert_eq!(snap.title.as_deref(), Some("Lanterns"));
        assert_eq!(snap.pov_mode, Some(PovMode::ThirdLimited));
        assert_eq!(snap.characters[0].role, CharacterRole::Protagonist);
        assert_eq!(snap.chapters[0].id, "a");
        assert_eq!(snap.chapters[0].pov_character_id.as_deref(), Some("mara"));
        assert_eq!(snap.chapters[1].id, "b");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_project("x", &project_at(&tmp.path().join("missing"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_unknown_project_is_source_error() {
        let source = FsManuscriptSource::new(&Config::minimal("x.sqlite"));
        let err = source.snapshot("nope").await.unwrap_err();
        assert_eq!(err.code(), "source_error");
    }
}
