//! AI-assisted review of heuristic candidates.
//!
//! Only `major` and `minor` holes are sent, at most `max_assisted` of them,
//! each with nothing but its affected chapters (truncated). Verdicts are
//! applied all-or-nothing: if any call fails, times out or returns an invalid
//! verdict, every hole keeps its heuristic severity and the report is marked
//! degraded.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, Stage};
use crate::models::{Chapter, PlotHole, Severity};
use crate::provider::{self, ProviderRequest, TextGenerator};

/// Limits for the assisted pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistSettings {
    /// Maximum holes reviewed per detection run.
    #[serde(default = "default_max_assisted")]
    pub max_assisted: usize,
    /// Characters of each affected chapter sent as context.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    /// Per-call time budget.
    #[serde(default = "default_timeout", with = "provider::serde_secs")]
    pub timeout: Duration,
}

fn default_max_assisted() -> usize {
    5
}

fn default_context_chars() -> usize {
    4000
}

fn default_timeout() -> Duration {
    provider::DEFAULT_TIMEOUT
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            max_assisted: default_max_assisted(),
            context_chars: default_context_chars(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VerdictKind {
    Corroborate,
    Downgrade,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Verdict {
    verdict: VerdictKind,
    reason: String,
}

const SCHEMA: &str = r#"{"verdict": "corroborate" | "downgrade", "reason": string}"#;

fn request_for(hole: &PlotHole, chapters: &[Chapter], context_chars: usize) -> ProviderRequest {
    let context = chapters
        .iter()
        .filter(|c| hole.affected_chapter_ids.contains(&c.id))
        .map(|c| {
            format!(
                "## Chapter {}{}\n{}",
                c.order_index,
                c.title.as_deref().map(|t| format!(": {}", t)).unwrap_or_default(),
                provider::truncate_chars(&c.text, context_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    ProviderRequest {
        instruction: format!(
            "A consistency checker flagged a possible {} ({} severity): {}\n\
             Read the excerpts. Answer \"corroborate\" if they support the problem, \
             or \"downgrade\" if the problem is weaker than stated or explained by the text.",
            hole.hole_type.as_str(),
            hole.severity.as_str(),
            hole.description
        ),
        schema: SCHEMA.to_string(),
        context,
    }
}

/// Outcome of the assisted pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssistOutcome {
    /// Holes whose verdict was applied.
    pub reviewed: usize,
    /// The pass fell back to heuristic-only results.
    pub degraded: bool,
}

/// Review candidate holes in place.
///
/// Returns `Err` only for cancellation.
pub async fn review(
    holes: &mut [PlotHole],
    chapters: &[Chapter],
    generator: &dyn TextGenerator,
    settings: &AssistSettings,
    cancel: &CancellationToken,
) -> Result<AssistOutcome> {
    let candidates: Vec<usize> = holes
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.dismissed && matches!(h.severity, Severity::Major | Severity::Minor))
        .map(|(i, _)| i)
        .take(settings.max_assisted)
        .collect();
    if candidates.is_empty() {
        return Ok(AssistOutcome::default());
    }
    if !generator.is_enabled() {
        tracing::warn!("assisted review requested but no provider is enabled");
        return Ok(AssistOutcome {
            reviewed: 0,
            degraded: true,
        });
    }

    let mut verdicts = Vec::with_capacity(candidates.len());
    for &i in &candidates {
        let request = request_for(&holes[i], chapters, settings.context_chars);
        let value = match provider::call_bounded(
            generator,
            &request,
            settings.timeout,
            cancel,
            Stage::Detect,
        )
        .await
        {
            Ok(v) => v,
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(provider = generator.name(), error = %e, "assisted review failed, keeping heuristic results");
                return Ok(AssistOutcome {
                    reviewed: 0,
                    degraded: true,
                });
            }
        };
        match serde_json::from_value::<Verdict>(value) {
            Ok(v) if !v.reason.trim().is_empty() => verdicts.push((i, v)),
            Ok(_) | Err(_) => {
                tracing::warn!(provider = generator.name(), "assisted review returned an invalid verdict");
                return Ok(AssistOutcome {
                    reviewed: 0,
                    degraded: true,
                });
            }
        }
    }

    for (i, v) in &verdicts {
        let hole = &mut holes[*i];
        match v.verdict {
            VerdictKind::Corroborate => {
                if hole.severity == Severity::Minor {
                    hole.severity = Severity::Major;
                }
                hole.description = format!("{} Reviewer agrees: {}", hole.description, v.reason.trim());
            }
            VerdictKind::Downgrade => {
                hole.severity = hole.severity.downgraded();
                hole.description = format!("{} Reviewer doubts: {}", hole.description, v.reason.trim());
            }
        }
    }
    Ok(AssistOutcome {
        reviewed: verdicts.len(),
        degraded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::PlotHoleType;
    use crate::testing::{chapters, fixed_time, ScriptedGenerator};
    use serde_json::json;

    fn hole(severity: Severity, chapter: &str) -> PlotHole {
        PlotHole {
            id: format!("h-{}", chapter),
            project_id: "p1".into(),
            hole_type: PlotHoleType::UnresolvedSetup,
            severity,
            description: "Open thread.".into(),
            affected_chapter_ids: vec![chapter.into()],
            affected_character_ids: vec![],
            suggested_fix: String::new(),
            detected_at: fixed_time(),
            dismissed: false,
            fingerprint: chapter.into(),
        }
    }

    #[tokio::test]
    async fn test_verdicts_apply() {
        let chs = chapters(&["One.", "Two."]);
        let mut holes = vec![hole(Severity::Minor, "ch1"), hole(Severity::Major, "ch2")];
        let generator = ScriptedGenerator::new(vec![
            Ok(json!({"verdict": "corroborate", "reason": "clear"})),
            Ok(json!({"verdict": "downgrade", "reason": "explained later"})),
        ]);
        let out = review(&mut holes, &chs, &generator, &AssistSettings::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, AssistOutcome { reviewed: 2, degraded: false });
        assert_eq!(holes[0].severity, Severity::Major);
        assert_eq!(holes[1].severity, Severity::Minor);
    }

    #[tokio::test]
    async fn test_context_is_bounded_to_affected_chapters() {
        let chs = chapters(&["First chapter text.", "Second chapter text that is long."]);
        let mut holes = vec![hole(Severity::Major, "ch2")];
        let generator = ScriptedGenerator::new(vec![Ok(json!({"verdict": "corroborate", "reason": "ok"}))]);
        let settings = AssistSettings {
            context_chars: 6,
            ..AssistSettings::default()
        };
        review(&mut holes, &chs, &generator, &settings, &CancellationToken::new())
            .await
            .unwrap();
        let sent = &generator.requests()[0].context;
        assert!(sent.contains("Second"));
        assert!(!sent.contains("First"));
        assert!(!sent.contains("chapter text"));
    }

    #[tokio::test]
    async fn test_failure_keeps_heuristic_result() {
        let chs = chapters(&["One.", "Two."]);
        let mut holes = vec![hole(Severity::Minor, "ch1"), hole(Severity::Major, "ch2")];
        let generator = ScriptedGenerator::new(vec![
            Ok(json!({"verdict": "corroborate", "reason": "clear"})),
            Err(ProviderError::RateLimited),
        ]);
        let out = review(&mut holes, &chs, &generator, &AssistSettings::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.degraded);
        assert_eq!(holes[0].severity, Severity::Minor);
        assert_eq!(holes[1].severity, Severity::Major);
    }

    #[tokio::test]
    async fn test_invalid_verdict_degrades() {
        let chs = chapters(&["One."]);
        let mut holes = vec![hole(Severity::Major, "ch1")];
        let generator = ScriptedGenerator::new(vec![Ok(json!({"verdict": "maybe", "reason": "?"}))]);
        let out = review(&mut holes, &chs, &generator, &AssistSettings::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.degraded);
        assert_eq!(holes[0].severity, Severity::Major);
    }

    #[tokio::test]
    async fn test_only_major_and_minor_are_sent() {
        let chs = chapters(&["One.", "Two."]);
        let mut holes = vec![hole(Severity::Critical, "ch1"), hole(Severity::Info, "ch2")];
        let generator = ScriptedGenerator::new(vec![]);
        let out = review(&mut holes, &chs, &generator, &AssistSettings::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, AssistOutcome::default());
        assert_eq!(generator.calls(), 0);
    }
}
