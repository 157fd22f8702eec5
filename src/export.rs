//! Export and import of a project's cached analyses.
//!
//! A bundle is the JSON form of [`CacheBundle`]: every cache entry for the
//! project plus its dismissed plot-hole fingerprints. Importing a bundle
//! restores the entries (replacing same-kind entries) and adds the
//! dismissals, so a collaborator can pick up the analysis without
//! recomputing it.

use anyhow::{Context, Result};
use std::path::Path;

use plotline_core::models::CacheBundle;

use crate::app::App;

/// Export a project's bundle.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(app: &App, project: &str, output: Option<&Path>) -> Result<()> {
    let bundle = app.service.export_project_analysis(project).await?;
    let json = serde_json::to_string_pretty(&bundle)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)?;
            eprintln!(
                "Exported {} entries, {} dismissals to {}",
                bundle.entries.len(),
                bundle.dismissed_fingerprints.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }
    Ok(())
}

pub fn read_bundle(path: &Path) -> Result<CacheBundle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundle: {}", path.display()))
}

/// Import a bundle file. It must have been exported from `project`.
pub async fn run_import(app: &App, project: &str, input: &Path) -> Result<()> {
    let bundle = read_bundle(input)?;
    let dismissed = bundle.dismissed_fingerprints.len();
    let count = app.service.import_project_analysis(project, bundle).await?;
    println!(
        "Imported {} entries and {} dismissals into {}.",
        count, dismissed, project
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_bundle_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundle.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = read_bundle(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("bundle.json"));
    }

    #[test]
    fn test_read_bundle_parses_empty_bundle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bundle.json");
        std::fs::write(
            &path,
            r#"{"project_id": "novel", "exported_at": "2026-01-01T00:00:00Z", "entries": []}"#,
        )
        .unwrap();
        let bundle = read_bundle(&path).unwrap();
        assert_eq!(bundle.project_id, "novel");
        assert!(bundle.dismissed_fingerprints.is_empty());
    }
}
