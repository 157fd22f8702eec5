//! Structure & pacing analysis.
//!
//! Turns an ordered run of chapters into a [`StoryArc`]: one tension point and
//! one pacing point per chapter, plus the structure template the tension curve
//! most resembles.
//!
//! # Pipeline
//!
//! ```text
//! chapters ──► validate ──► tension::point  ─┐
//!                      └──► pacing::points ──┼──► structure::classify ──► StoryArc
//!                                            │
//!                                chapters_hash ┘
//! ```
//!
//! Analysis is a pure function of its input: running it twice on the same
//! chapters yields an identical arc. Chapters whose text is not prose
//! (binary, control-heavy, or empty) score 50/50 instead of failing the run.

pub mod pacing;
pub mod structure;
pub mod tension;

use serde::{Deserialize, Serialize};

use crate::error::{Result, Stage};
use crate::hash;
use crate::models::{Chapter, StoryArc};
use crate::validate;

/// Tunable analyzer constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Trailing window for the rolling average word count.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    /// Below this confidence the structure is reported as `unknown`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_rolling_window() -> usize {
    5
}

fn default_min_confidence() -> f64 {
    0.35
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            rolling_window: default_rolling_window(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Analyze with default constants.
pub fn analyze(chapters: &[Chapter]) -> Result<StoryArc> {
    analyze_with(chapters, &AnalyzerConfig::default())
}

/// Analyze an ordered, contiguous chapter run.
pub fn analyze_with(chapters: &[Chapter], config: &AnalyzerConfig) -> Result<StoryArc> {
    validate::chapters(chapters, Stage::Analyze)?;

    let tension: Vec<_> = chapters
        .iter()
        .map(|c| tension::point(c.order_index, &c.text))
        .collect();
    let pacing = pacing::points(chapters, config.rolling_window);

    let levels: Vec<f64> = tension.iter().map(|t| t.tension_level).collect();
    let classification = structure::classify(&levels, config.min_confidence);

    tracing::debug!(
        chapters = chapters.len(),
        structure = %classification.structure,
        confidence = classification.confidence,
        "story arc analyzed"
    );

    Ok(StoryArc {
        project_id: chapters[0].project_id.clone(),
        tension,
        pacing,
        structure_type: classification.structure,
        confidence: classification.confidence,
        content_hash: hash::chapters_hash(chapters),
    })
}
