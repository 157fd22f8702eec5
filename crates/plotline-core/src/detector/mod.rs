//! Plot hole detection.
//!
//! Cross-references chapters, characters, the story arc and the character
//! graph to surface consistency problems. Four deterministic passes run in
//! isolation; an optional assisted pass asks a [`TextGenerator`] to confirm or
//! downgrade what the heuristics found.
//!
//! | Pass | Module | Hole type |
//! |------|--------|-----------|
//! | Timeline | [`timeline`] | `timeline-inconsistency` |
//! | Character consistency | [`consistency`] | `character-inconsistency` |
//! | Unresolved setup | [`setup`] | `unresolved-setup` |
//! | POV | [`pov`] | `pov-error` |
//!
//! # Guarantees
//!
//! - Derived inputs must match the chapters: an arc or graph computed from a
//!   different snapshot is rejected with [`Error::StaleInput`](crate::error::Error::StaleInput).
//! - A failing pass is logged and listed in
//!   [`DetectionReport::failed_passes`]; the other passes still run. If every
//!   enabled pass fails, detection returns the first error instead of an empty
//!   list.
//! - Holes are merged by fingerprint (keeping the most severe) and dismissal
//!   is re-applied by fingerprint, so a dismissed hole stays dismissed across
//!   recomputation.

pub mod assist;
mod consistency;
mod pov;
mod setup;
mod timeline;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, Stage};
use crate::hash;
use crate::models::{
    Chapter, Character, CharacterGraph, PlotHole, PlotHoleType, PovMode, Severity,
    StoryArc,
};
use crate::provider::TextGenerator;
use crate::validate;

pub use assist::{AssistOutcome, AssistSettings};

/// Everything the detector reads.
#[derive(Debug, Clone, Copy)]
pub struct DetectInput<'a> {
    pub chapters: &'a [Chapter],
    pub characters: &'a [Character],
    pub arc: &'a StoryArc,
    pub graph: &'a CharacterGraph,
    pub pov_mode: Option<PovMode>,
}

fn default_true() -> bool {
    true
}

/// Pass toggles and previously dismissed fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectOptions {
    #[serde(default = "default_true")]
    pub timeline: bool,
    #[serde(default = "default_true")]
    pub character_consistency: bool,
    #[serde(default = "default_true")]
    pub unresolved_setups: bool,
    #[serde(default = "default_true")]
    pub pov: bool,
    #[serde(skip)]
    pub dismissed: BTreeSet<String>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            timeline: true,
            character_consistency: true,
            unresolved_setups: true,
            pov: true,
            dismissed: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pass {
    Timeline,
    CharacterConsistency,
    UnresolvedSetup,
    Pov,
}

impl Pass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pass::Timeline => "timeline",
            Pass::CharacterConsistency => "character-consistency",
            Pass::UnresolvedSetup => "unresolved-setup",
            Pass::Pov => "pov",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassFailure {
    pub pass: Pass,
    pub reason: String,
}

/// Result of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub holes: Vec<PlotHole>,
    #[serde(default)]
    pub failed_passes: Vec<PassFailure>,
    /// Holes whose severity was reviewed by the assisted pass.
    #[serde(default)]
    pub assisted: usize,
    /// The assisted pass was requested but fell back to heuristics.
    #[serde(default)]
    pub assist_degraded: bool,
}

/// A hole before identity and ordering are assigned.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Finding {
    pub hole_type: PlotHoleType,
    pub severity: Severity,
    pub description: String,
    pub chapter_ids: Vec<String>,
    pub character_ids: Vec<String>,
    pub suggested_fix: String,
}

pub(crate) struct PassContext<'a> {
    pub chapters: &'a [Chapter],
    pub characters: &'a [Character],
    pub graph: &'a CharacterGraph,
    pub pov_mode: Option<PovMode>,
}

impl PassContext<'_> {
    pub fn index_of(&self, chapter_id: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.id == chapter_id)
    }
}

/// A name occurrence in a token list: `tokens[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NameMatch {
    pub start: usize,
    pub end: usize,
    /// The last token was `Name's`.
    pub possessive: bool,
}

/// Whole-token occurrences of a (possibly multi-word) name.
pub(crate) fn name_matches(tokens: &[&str], name: &str) -> Vec<NameMatch> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.is_empty() || tokens.len() < parts.len() {
        return Vec::new();
    }
    let last = parts.len() - 1;
    (0..=tokens.len() - parts.len())
        .filter_map(|start| {
            let mut possessive = false;
            for (k, part) in parts.iter().enumerate() {
                let token = tokens[start + k];
                if token == *part {
                    continue;
                }
                let base = token
                    .strip_suffix("'s")
                    .or_else(|| token.strip_suffix("’s"));
                if k == last && base == Some(*part) {
                    possessive = true;
                    continue;
                }
                return None;
            }
            Some(NameMatch {
                start,
                end: start + parts.len(),
                possessive,
            })
        })
        .collect()
}

type PassFn = fn(&PassContext<'_>) -> Result<Vec<Finding>>;

/// Run the heuristic passes.
pub fn detect(input: DetectInput<'_>, options: &DetectOptions) -> Result<DetectionReport> {
    validate::chapters(input.chapters, Stage::Detect)?;
    validate::cast(input.chapters, input.characters, Stage::Detect)?;
    validate::artifacts(
        input.chapters,
        input.characters,
        input.arc,
        input.graph,
        Stage::Detect,
    )?;

    let ctx = PassContext {
        chapters: input.chapters,
        characters: input.characters,
        graph: input.graph,
        pov_mode: input.pov_mode,
    };
    let passes: [(Pass, bool, PassFn); 4] = [
        (Pass::Timeline, options.timeline, timeline::run),
        (Pass::CharacterConsistency, options.character_consistency, consistency::run),
        (Pass::UnresolvedSetup, options.unresolved_setups, setup::run),
        (Pass::Pov, options.pov, pov::run),
    ];

    let mut findings = Vec::new();
    let mut failed_passes = Vec::new();
    let mut first_error = None;
    let mut enabled = 0usize;
    for (pass, on, run) in passes {
        if !on {
            continue;
        }
        enabled += 1;
        match run(&ctx) {
            Ok(found) => {
                tracing::debug!(pass = pass.as_str(), found = found.len(), "detector pass finished");
                findings.extend(found);
            }
            Err(e) => {
                tracing::warn!(pass = pass.as_str(), error = %e, "detector pass failed");
                failed_passes.push(PassFailure {
                    pass,
                    reason: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        if failed_passes.len() == enabled {
            return Err(e);
        }
    }

    let holes = finalize(&input.arc.project_id, findings, input.chapters, &options.dismissed);
    Ok(DetectionReport {
        holes,
        failed_passes,
        assisted: 0,
        assist_degraded: false,
    })
}

/// Run the heuristic passes, then let `generator` review the candidates.
///
/// Provider failures never fail detection; they leave the heuristic result in
/// place and set [`DetectionReport::assist_degraded`]. Cancellation does fail
/// it.
pub async fn detect_assisted(
    input: DetectInput<'_>,
    options: &DetectOptions,
    generator: &dyn TextGenerator,
    settings: &AssistSettings,
    cancel: &CancellationToken,
) -> Result<DetectionReport> {
    let mut report = detect(input, options)?;
    let outcome = assist::review(&mut report.holes, input.chapters, generator, settings, cancel).await?;
    report.assisted = outcome.reviewed;
    report.assist_degraded = outcome.degraded;
    sort_holes(&mut report.holes, input.chapters);
    Ok(report)
}

fn finalize(
    project_id: &str,
    findings: Vec<Finding>,
    chapters: &[Chapter],
    dismissed: &BTreeSet<String>,
) -> Vec<PlotHole> {
    let order: HashMap<&str, u32> = chapters
        .iter()
        .map(|c| (c.id.as_str(), c.order_index))
        .collect();

    let mut merged: BTreeMap<String, Finding> = BTreeMap::new();
    for mut finding in findings {
        if finding.chapter_ids.is_empty() {
            continue;
        }
        finding
            .chapter_ids
            .sort_by_key(|id| order.get(id.as_str()).copied().unwrap_or(u32::MAX));
        finding.chapter_ids.dedup();
        finding.character_ids.sort();
        finding.character_ids.dedup();

        let fingerprint = hash::plot_hole_fingerprint(
            finding.hole_type,
            &finding.chapter_ids,
            &finding.character_ids,
        );
        match merged.get(&fingerprint) {
            Some(existing) if existing.severity <= finding.severity => {}
            _ => {
                merged.insert(fingerprint, finding);
            }
        }
    }

    let now = Utc::now();
    let mut holes: Vec<PlotHole> = merged
        .into_iter()
        .map(|(fingerprint, f)| PlotHole {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            hole_type: f.hole_type,
            severity: f.severity,
            description: f.description,
            affected_chapter_ids: f.chapter_ids,
            affected_character_ids: f.character_ids,
            suggested_fix: f.suggested_fix,
            detected_at: now,
            dismissed: dismissed.contains(&fingerprint),
            fingerprint,
        })
        .collect();
    sort_holes(&mut holes, chapters);
    holes
}

/// Severity first, then first affected chapter, type and fingerprint.
pub fn sort_holes(holes: &mut [PlotHole], chapters: &[Chapter]) {
    let order: HashMap<&str, u32> = chapters
        .iter()
        .map(|c| (c.id.as_str(), c.order_index))
        .collect();
    let first = |h: &PlotHole| {
        h.affected_chapter_ids
            .iter()
            .filter_map(|id| order.get(id.as_str()).copied())
            .min()
            .unwrap_or(u32::MAX)
    };
    holes.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| first(a).cmp(&first(b)))
            .then_with(|| a.hole_type.cmp(&b.hole_type))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
}

/// Re-apply dismissal state by fingerprint.
pub fn apply_dismissed(holes: &mut [PlotHole], dismissed: &BTreeSet<String>) {
    for hole in holes {
        hole.dismissed = dismissed.contains(&hole.fingerprint);
    }
}
