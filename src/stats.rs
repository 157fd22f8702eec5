//! Cache inspection: `cache get`, `cache invalidate`, `cache stats` and
//! `cache purge`.

use anyhow::Result;
use std::collections::BTreeMap;

use plotline_core::cache::AnalysisCache;
use plotline_core::models::AnalysisKind;

use crate::app::App;
use crate::report;

/// Print a cached artifact if it is still fresh for the manuscript.
pub async fn run_cache_get(app: &App, project: &str, kind: AnalysisKind, json: bool) -> Result<()> {
    match app.service.get_cached_analysis(project, kind).await? {
        Some(payload) => report::emit(true, &payload, |_| {}),
        None => {
            if json {
                println!("null");
            } else {
                println!("No fresh {} cached for {}.", kind, project);
            }
            Ok(())
        }
    }
}

pub async fn run_cache_invalidate(app: &App, project: &str, kind: Option<AnalysisKind>) -> Result<()> {
    let removed = app.cache.invalidate(project, kind).await?;
    match kind {
        Some(k) => println!("Removed {} {} entr{} for {}.", removed, k, plural(removed), project),
        None => println!("Removed {} entr{} for {}.", removed, plural(removed), project),
    }
    Ok(())
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

pub async fn run_cache_purge(app: &App) -> Result<()> {
    let removed = app.cache.purge_expired().await?;
    println!("Purged {} expired entr{}.", removed, plural(removed as usize));
    Ok(())
}

/// Summarize what is cached, optionally for one project.
pub async fn run_cache_stats(app: &App, project: Option<&str>, json: bool) -> Result<()> {
    let entries = app.cache.entries(project).await?;
    if json {
        return report::emit(true, &entries, |_| {});
    }

    let db_size = std::fs::metadata(&app.config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let now = chrono::Utc::now();
    let expired = entries.iter().filter(|e| e.expires_at <= now).count();
    let mut per_kind: BTreeMap<AnalysisKind, usize> = BTreeMap::new();
    for e in &entries {
        *per_kind.entry(e.kind).or_default() += 1;
    }

    println!("Plotline — Cache Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", app.config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Entries:     {} ({} expired)", entries.len(), expired);
    for (kind, count) in &per_kind {
        println!("    {:<18} {}", kind.as_str(), count);
    }
    println!();
    report::cache_entries(&entries);
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1), "y");
        assert_eq!(plural(0), "ies");
    }
}
