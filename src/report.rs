//! Terminal output for analysis artifacts.
//!
//! Every command prints either a human-readable summary or, with `--json`,
//! the artifact itself as pretty JSON on stdout.

use anyhow::Result;
use serde::Serialize;

use plotline_core::cache::CacheEntryInfo;
use plotline_core::detector::DetectionReport;
use plotline_core::models::{CharacterGraph, PlotStructure, PlotSuggestion, StoryArc};
use plotline_core::source::ProjectInfo;

/// Print `value` as JSON or through `human`.
pub fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

/// A fixed-width bar for a 0–100 value.
fn bar(value: f64) -> String {
    let filled = (value.clamp(0.0, 100.0) / 5.0).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(20 - filled))
}

pub fn projects(projects: &Vec<ProjectInfo>) {
    if projects.is_empty() {
        println!("No projects configured.");
        return;
    }
    println!("{:<20} {:>8} {:>10}  TITLE", "PROJECT", "CHAPTERS", "CHARACTERS");
    for p in projects {
        println!(
            "{:<20} {:>8} {:>10}  {}",
            p.project_id,
            p.chapter_count,
            p.character_count,
            p.title.as_deref().unwrap_or("-")
        );
    }
}

pub fn arc(arc: &StoryArc) {
    println!("Story arc: {}", arc.project_id);
    println!(
        "  Structure:  {} (confidence {:.2})",
        arc.structure_type, arc.confidence
    );
    println!();
    println!("  CH  TENSION                     PACE   WORDS  VALENCE");
    for (t, p) in arc.tension.iter().zip(&arc.pacing) {
        println!(
            "  {:>2}  {} {:>5.1}  {:>5.1}  {:>6}  {:?}",
            t.chapter_order_index,
            bar(t.tension_level),
            t.tension_level,
            p.pace_score,
            p.word_count,
            t.emotional_valence
        );
    }
}

pub fn graph(graph: &CharacterGraph) {
    println!("Character graph: {}", graph.project_id);
    println!();
    println!("  Characters ({}):", graph.nodes.len());
    for node in &graph.nodes {
        println!(
            "    {:<16} centrality {:.2}  in {} chapter(s)",
            node.character_id,
            node.centrality,
            node.appearances.len()
        );
    }
    println!();
    println!("  Relationships ({}):", graph.edges.len());
    for edge in &graph.edges {
        println!(
            "    {} -- {}  {} ({:.2})  {}..{}",
            edge.from_character_id,
            edge.to_character_id,
            edge.relationship_type.as_str(),
            edge.strength,
            edge.first_seen_chapter,
            edge.last_seen_chapter
        );
    }
}

pub fn holes(report: &DetectionReport) {
    let open = report.holes.iter().filter(|h| !h.dismissed).count();
    println!(
        "Plot holes: {} open, {} dismissed",
        open,
        report.holes.len() - open
    );
    for failure in &report.failed_passes {
        println!("  ! {} pass failed: {}", failure.pass.as_str(), failure.reason);
    }
    if report.assist_degraded {
        println!("  ! assisted review unavailable, showing heuristic results");
    } else if report.assisted > 0 {
        println!("  {} hole(s) reviewed by the provider", report.assisted);
    }
    println!();
    for hole in &report.holes {
        let mark = if hole.dismissed { " (dismissed)" } else { "" };
        println!(
            "  [{}] {}{}",
            hole.severity.as_str(),
            hole.hole_type.as_str(),
            mark
        );
        println!("      {}", hole.description);
        println!("      chapters: {}", hole.affected_chapter_ids.join(", "));
        if !hole.affected_character_ids.is_empty() {
            println!("      characters: {}", hole.affected_character_ids.join(", "));
        }
        if !hole.suggested_fix.is_empty() {
            println!("      fix: {}", hole.suggested_fix);
        }
        println!("      fingerprint: {}", hole.fingerprint);
        println!();
    }
}

pub fn suggestions(suggestions: &Vec<PlotSuggestion>) {
    if suggestions.is_empty() {
        println!("No suggestions.");
        return;
    }
    for s in suggestions {
        println!("  [{:?}] {:?}: {}", s.impact, s.suggestion_type, s.description);
        if !s.related_chapter_ids.is_empty() {
            println!("      chapters: {}", s.related_chapter_ids.join(", "));
        }
        if !s.related_character_ids.is_empty() {
            println!("      characters: {}", s.related_character_ids.join(", "));
        }
    }
}

pub fn structure(plot: &PlotStructure) {
    println!("{} ({}, {} chapters)", plot.premise, plot.genre, plot.target_length);
    println!("Structure: {}", plot.structure_type);
    for (i, act) in plot.acts.iter().enumerate() {
        println!();
        println!(
            "Act {}: {} (chapters {}-{})",
            i + 1,
            act.title,
            act.chapter_start,
            act.chapter_end
        );
        println!("  {}", act.summary);
        for point in &act.plot_points {
            println!(
                "  - ch{:<3} [{:>3}] {}",
                point.chapter_hint, point.tension_hint, point.description
            );
        }
    }
}

pub fn cache_entries(entries: &Vec<CacheEntryInfo>) {
    if entries.is_empty() {
        println!("Cache is empty.");
        return;
    }
    println!(
        "{:<16} {:<18} {:>9}  {:<20}  EXPIRES",
        "PROJECT", "KIND", "BYTES", "COMPUTED"
    );
    for e in entries {
        println!(
            "{:<16} {:<18} {:>9}  {:<20}  {}",
            e.project_id,
            e.kind.as_str(),
            e.payload_bytes,
            e.computed_at.format("%Y-%m-%d %H:%M:%S"),
            e.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
