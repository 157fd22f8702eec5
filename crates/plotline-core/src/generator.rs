//! Plot generation.
//!
//! Builds a [`PlotStructure`] for a premise by asking a [`TextGenerator`] to
//! write one act at a time.
//!
//! ```text
//! request ──▶ validate ──▶ pick structure ──▶ act spans
//!                                               │
//!                  ┌────────────────────────────┘
//!                  ▼
//!      for each act: call (≤ 1 provider retry, ≤ 1 schema retry)
//!                  │
//!                  ▼
//!      enforce rising/falling tension shape ──▶ PlotStructure
//! ```
//!
//! Nothing is returned unless every act succeeds. Provider failures are not
//! papered over with heuristic text.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::analyzer::structure::{self, ActShape, StructureTemplate};
use crate::error::{Error, ProviderError, Result, Stage};
use crate::models::{Act, PlotPoint, PlotStructure, StructureType};
use crate::provider::{self, ProviderRequest, TextGenerator};

/// Largest structure the generator will plan.
pub const MAX_TARGET_LENGTH: u32 = 500;

/// Characters of previous act summaries carried into the next request.
const CONTINUITY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub premise: String,
    pub genre: String,
    pub target_length: u32,
    /// Chosen from the genre when absent.
    #[serde(default)]
    pub structure_type: Option<StructureType>,
    #[serde(default)]
    pub themes: Vec<String>,
    /// Attach the result to an existing project.
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Budget for each provider call.
    #[serde(default = "default_timeout", with = "provider::serde_secs")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    provider::DEFAULT_TIMEOUT
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

/// Genre keywords and the structure they favour. Checked in order; the
/// first keyword contained in the normalized genre wins.
const GENRE_AFFINITY: &[(&str, StructureType)] = &[
    ("mystery", StructureType::Freytag),
    ("crime", StructureType::Freytag),
    ("detective", StructureType::Freytag),
    ("noir", StructureType::Freytag),
    ("thriller", StructureType::SaveTheCat),
    ("suspense", StructureType::SaveTheCat),
    ("comedy", StructureType::SaveTheCat),
    ("fantasy", StructureType::HerosJourney),
    ("adventure", StructureType::HerosJourney),
    ("science fiction", StructureType::HerosJourney),
    ("sci-fi", StructureType::HerosJourney),
    ("epic", StructureType::HerosJourney),
    ("myth", StructureType::HerosJourney),
    ("romance", StructureType::HeroinesJourney),
    ("literary", StructureType::HeroinesJourney),
    ("women's fiction", StructureType::HeroinesJourney),
    ("coming of age", StructureType::HeroinesJourney),
    ("drama", StructureType::FiveAct),
    ("tragedy", StructureType::FiveAct),
    ("historical", StructureType::FiveAct),
    ("horror", StructureType::ThreeAct),
    ("western", StructureType::ThreeAct),
];

/// Structure favoured by `genre`; three-act when nothing matches.
pub fn structure_for_genre(genre: &str) -> StructureType {
    let normalized = genre
        .trim()
        .to_lowercase()
        .replace('’', "'")
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    GENRE_AFFINITY
        .iter()
        .find(|(key, _)| normalized.contains(&key.replace('-', " ")))
        .map(|(_, s)| *s)
        .unwrap_or(StructureType::ThreeAct)
}

/// Inclusive 1-based chapter ranges for each act of `template`.
///
/// Spans are `floor(ratio · length)`, zero spans are bumped to one, and the
/// middle act absorbs the remainder so the spans always sum to
/// `target_length`.
pub fn act_spans(template: &StructureTemplate, target_length: u32) -> Result<Vec<(u32, u32)>> {
    let acts = template.act_count() as u32;
    if target_length < acts {
        return Err(Error::invalid(
            Stage::Generate,
            format!(
                "target length {} is shorter than the {} acts of {}",
                target_length,
                acts,
                template.structure
            ),
        ));
    }
    let mut spans: Vec<u32> = template
        .acts
        .iter()
        .map(|a| ((a.ratio * target_length as f64).floor() as u32).max(1))
        .collect();
    let middle = spans.len() / 2;
    let total: u32 = spans.iter().sum();
    if total <= target_length {
        spans[middle] += target_length - total;
    } else {
        let mut excess = total - target_length;
        while excess > 0 {
            // Take from the middle first, then from the widest act.
            let idx = if spans[middle] > 1 {
                middle
            } else {
                match spans.iter().enumerate().filter(|(_, s)| **s > 1).max_by_key(|(_, s)| **s) {
                    Some((i, _)) => i,
                    None => break,
                }
            };
            spans[idx] -= 1;
            excess -= 1;
        }
    }

    let mut start = 1;
    Ok(spans
        .into_iter()
        .map(|len| {
            let range = (start, start + len - 1);
            start += len;
            range
        })
        .collect())
}

fn validate_request(request: &GenerateRequest) -> Result<StructureType> {
    if request.premise.trim().is_empty() {
        return Err(Error::invalid(Stage::Generate, "premise is empty"));
    }
    if request.target_length == 0 {
        return Err(Error::invalid(Stage::Generate, "target length must be at least 1"));
    }
    if request.target_length > MAX_TARGET_LENGTH {
        return Err(Error::invalid(
            Stage::Generate,
            format!("target length must be at most {}", MAX_TARGET_LENGTH),
        ));
    }
    match request.structure_type {
        Some(StructureType::Unknown) => Err(Error::invalid(
            Stage::Generate,
            "structure type 'unknown' cannot be generated",
        )),
        Some(s) => Ok(s),
        None => Ok(structure_for_genre(&request.genre)),
    }
}

const ACT_SCHEMA: &str = r#"{"title": string (optional), "summary": string, "plot_points": [{"description": string, "chapter_hint": integer, "tension_hint": integer 0-100}]}"#;

struct ActPlan<'a> {
    number: usize,
    total: usize,
    name: &'a str,
    start: u32,
    end: u32,
    shape: ActShape,
}

fn shape_label(shape: ActShape) -> &'static str {
    match shape {
        ActShape::Rising => "rising",
        ActShape::Falling => "falling",
        ActShape::Peak => "peaking",
    }
}

fn act_request(
    request: &GenerateRequest,
    structure: StructureType,
    plan: &ActPlan<'_>,
    previous: &str,
    strict: bool,
) -> ProviderRequest {
    let themes = if request.themes.is_empty() {
        String::new()
    } else {
        format!(" Themes: {}.", request.themes.join(", "))
    };
    let mut instruction = format!(
        "Outline act {} of {} (\"{}\") of a {} story using the {} structure. \
         Premise: {}.{} The act covers chapters {} to {}. Tension in this act should be {}. \
         Give a short summary and two to five plot points.",
        plan.number,
        plan.total,
        plan.name,
        request.genre.trim(),
        structure,
        request.premise.trim(),
        themes,
        plan.start,
        plan.end,
        shape_label(plan.shape),
    );
    if strict {
        instruction.push_str(&format!(
            " Respond with JSON only, exactly matching the schema. Every chapter_hint must be \
             between {} and {}; every tension_hint between 0 and 100; summary and descriptions \
             must not be empty.",
            plan.start, plan.end
        ));
    }
    ProviderRequest {
        instruction,
        schema: ACT_SCHEMA.to_string(),
        context: provider::truncate_chars(previous, CONTINUITY_CHARS).to_string(),
    }
}

#[derive(Deserialize)]
struct ActResponse {
    #[serde(default)]
    title: Option<String>,
    summary: String,
    plot_points: Vec<PointResponse>,
}

#[derive(Deserialize)]
struct PointResponse {
    description: String,
    chapter_hint: i64,
    tension_hint: i64,
}

/// Validate one act response. `Err` carries the schema violation.
fn parse_act(value: serde_json::Value, plan: &ActPlan<'_>) -> std::result::Result<Act, String> {
    let response: ActResponse = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if response.summary.trim().is_empty() {
        return Err("summary is empty".into());
    }
    if response.plot_points.is_empty() {
        return Err("no plot points".into());
    }
    let mut points = Vec::with_capacity(response.plot_points.len());
    for p in response.plot_points {
        if p.description.trim().is_empty() {
            return Err("plot point description is empty".into());
        }
        if p.chapter_hint < plan.start as i64 || p.chapter_hint > plan.end as i64 {
            return Err(format!(
                "chapter_hint {} outside chapters {}-{}",
                p.chapter_hint, plan.start, plan.end
            ));
        }
        if !(0..=100).contains(&p.tension_hint) {
            return Err(format!("tension_hint {} outside 0-100", p.tension_hint));
        }
        points.push(PlotPoint {
            description: p.description.trim().to_string(),
            chapter_hint: p.chapter_hint as u32,
            tension_hint: p.tension_hint as u32,
        });
    }
    let title = response
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| plan.name.to_string());
    Ok(Act {
        title,
        summary: response.summary.trim().to_string(),
        chapter_start: plan.start,
        chapter_end: plan.end,
        plot_points: enforce_shape(points, plan.shape),
    })
}

fn rising(tension: &[u32]) -> bool {
    tension.windows(2).all(|w| w[0] <= w[1])
}

fn falling(tension: &[u32]) -> bool {
    tension.windows(2).all(|w| w[0] >= w[1])
}

/// Tension rises to its first maximum and falls after it.
fn peaked(tension: &[u32]) -> bool {
    let Some(max) = tension.iter().max() else {
        return true;
    };
    let top = tension.iter().position(|t| t == max).unwrap_or(0);
    rising(&tension[..=top]) && falling(&tension[top..])
}

/// Order points by chapter, and when tension contradicts the act's shape,
/// re-order them by tension and re-assign chapter hints ascending.
///
/// Peak acts are rebuilt by dealing the points, lowest first, alternately to
/// the rising and falling side so the highest lands between them.
pub fn enforce_shape(mut points: Vec<PlotPoint>, shape: ActShape) -> Vec<PlotPoint> {
    points.sort_by_key(|p| p.chapter_hint);
    let tension: Vec<u32> = points.iter().map(|p| p.tension_hint).collect();
    let ok = match shape {
        ActShape::Rising => rising(&tension),
        ActShape::Falling => falling(&tension),
        ActShape::Peak => peaked(&tension),
    };
    if ok {
        return points;
    }
    let hints: Vec<u32> = points.iter().map(|p| p.chapter_hint).collect();
    match shape {
        ActShape::Rising => points.sort_by_key(|p| p.tension_hint),
        ActShape::Falling => points.sort_by(|a, b| b.tension_hint.cmp(&a.tension_hint)),
        ActShape::Peak => {
            points.sort_by_key(|p| p.tension_hint);
            let mut up = Vec::with_capacity(points.len());
            let mut down = Vec::with_capacity(points.len() / 2);
            for (i, point) in points.into_iter().enumerate() {
                if i % 2 == 0 {
                    up.push(point);
                } else {
                    down.push(point);
                }
            }
            // The highest point must close the rising side.
            if up.len() == down.len() {
                if let Some(top) = down.pop() {
                    up.push(top);
                }
            }
            down.reverse();
            up.extend(down);
            points = up;
        }
    }
    for (point, hint) in points.iter_mut().zip(hints) {
        point.chapter_hint = hint;
    }
    points
}

async fn generate_act(
    request: &GenerateRequest,
    structure: StructureType,
    plan: &ActPlan<'_>,
    previous: &str,
    generator: &dyn TextGenerator,
    settings: &GeneratorSettings,
    cancel: &CancellationToken,
) -> Result<Act> {
    let mut strict = false;
    let mut provider_retried = false;
    loop {
        let prompt = act_request(request, structure, plan, previous, strict);
        match provider::call_bounded(generator, &prompt, settings.timeout, cancel, Stage::Generate).await {
            Ok(value) => match parse_act(value, plan) {
                Ok(act) => return Ok(act),
                Err(reason) if !strict => {
                    tracing::warn!(act = plan.number, %reason, "act failed validation, retrying with stricter instruction");
                    strict = true;
                }
                Err(reason) => {
                    return Err(Error::Generation {
                        reason: format!("act {}: {}", plan.number, reason),
                    })
                }
            },
            Err(e @ Error::Provider(ProviderError::Disabled)) => return Err(e),
            Err(Error::Provider(e)) if !provider_retried => {
                tracing::warn!(act = plan.number, provider = generator.name(), error = %e, "provider call failed, retrying once");
                provider_retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Generate a plot structure. Returns nothing partial: any failure,
/// including cancellation, is an error.
pub async fn generate(
    request: &GenerateRequest,
    generator: &dyn TextGenerator,
    settings: &GeneratorSettings,
    cancel: &CancellationToken,
) -> Result<PlotStructure> {
    let structure = validate_request(request)?;
    let template = structure::template(structure)
        .ok_or_else(|| Error::invalid(Stage::Generate, format!("no template for {}", structure)))?;
    let spans = act_spans(template, request.target_length)?;
    if !generator.is_enabled() {
        return Err(Error::Provider(ProviderError::Disabled));
    }
    let length = request.target_length as f64;

    tracing::debug!(
        structure = %structure,
        acts = spans.len(),
        provider = generator.name(),
        "generating plot structure"
    );

    let mut acts: Vec<Act> = Vec::with_capacity(spans.len());
    let mut previous = String::new();
    for (i, (act, &(start, end))) in template.acts.iter().zip(&spans).enumerate() {
        let plan = ActPlan {
            number: i + 1,
            total: spans.len(),
            name: act.name,
            start,
            end,
            shape: template.shape_between((start - 1) as f64 / length, end as f64 / length),
        };
        let act = generate_act(request, structure, &plan, &previous, generator, settings, cancel).await?;
        previous.push_str(&format!("Act {} ({}): {}\n", plan.number, act.title, act.summary));
        acts.push(act);
    }

    tracing::info!(structure = %structure, acts = acts.len(), chapters = request.target_length, "plot structure generated");
    Ok(PlotStructure {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: request.project_id.clone(),
        premise: request.premise.trim().to_string(),
        genre: request.genre.trim().to_string(),
        target_length: request.target_length,
        structure_type: structure,
        acts,
        created_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::testing::{act_response, PlotWriter, ScriptedGenerator};
    use serde_json::json;

    fn request(genre: &str, length: u32) -> GenerateRequest {
        GenerateRequest {
            premise: "a detective solves a locked-room murder".into(),
            genre: genre.into(),
            target_length: length,
            structure_type: None,
            themes: vec![],
            project_id: None,
        }
    }

    fn spans_of(structure: StructureType, length: u32) -> Vec<(u32, u32)> {
        act_spans(structure::template(structure).unwrap(), length).unwrap()
    }

    #[test]
    fn test_genre_affinity() {
        assert_eq!(structure_for_genre("Mystery"), StructureType::Freytag);
        assert_eq!(structure_for_genre("cozy mystery"), StructureType::Freytag);
        assert_eq!(structure_for_genre("Science-Fiction"), StructureType::HerosJourney);
        assert_eq!(structure_for_genre("Women’s Fiction"), StructureType::HeroinesJourney);
        assert_eq!(structure_for_genre("thriller"), StructureType::SaveTheCat);
        assert_eq!(structure_for_genre("tragedy"), StructureType::FiveAct);
        assert_eq!(structure_for_genre("cookbook"), StructureType::ThreeAct);
    }

    #[test]
    fn test_act_spans_sum_to_target() {
        assert_eq!(
            spans_of(StructureType::Freytag, 30),
            vec![(1, 4), (5, 13), (14, 17), (18, 26), (27, 30)]
        );
        assert_eq!(spans_of(StructureType::ThreeAct, 10), vec![(1, 2), (3, 8), (9, 10)]);
        for structure in StructureType::KNOWN {
            let t = structure::template(structure).unwrap();
            for length in t.act_count() as u32..=60 {
                let spans = act_spans(t, length).unwrap();
                let total: u32 = spans.iter().map(|(s, e)| e + 1 - s).sum();
                assert_eq!(total, length, "{} at {}", structure, length);
                assert!(spans.iter().all(|(s, e)| s <= e));
                assert_eq!(spans.last().unwrap().1, length);
            }
        }
    }

    #[test]
    fn test_act_spans_at_minimum_length() {
        assert_eq!(spans_of(StructureType::Freytag, 5), vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let provider = ScriptedGenerator::new(vec![]);
        let cases = vec![
            GenerateRequest {
                premise: "  ".into(),
                ..request("mystery", 30)
            },
            request("mystery", 0),
            request("mystery", 4),
            GenerateRequest {
                structure_type: Some(StructureType::Unknown),
                ..request("mystery", 30)
            },
        ];
        for case in cases {
            let err = generate(&case, &provider, &GeneratorSettings::default(), &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_input", "{:?}", case);
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_mystery_scenario() {
        let structure = generate(
            &request("mystery", 30),
            &PlotWriter,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(structure.structure_type, StructureType::Freytag);
        assert_eq!(structure.acts.len(), 5);
        let total: u32 = structure.acts.iter().map(|a| a.span()).sum();
        assert_eq!(total, 30);
        assert_eq!(structure.acts[0].title, "Exposition");
    }

    #[tokio::test]
    async fn test_schema_failure_retried_once() {
        let spans = spans_of(StructureType::ThreeAct, 3);
        let provider = ScriptedGenerator::new(vec![
            Ok(json!({"summary": "x"})),
            Ok(act_response(spans[0], &[10, 20])),
            Ok(act_response(spans[1], &[30, 40])),
            Ok(act_response(spans[2], &[90, 20])),
        ]);
        let structure = generate(
            &request("horror", 3),
            &provider,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(provider.calls(), 4);
        assert!(provider.requests()[1].instruction.contains("JSON only"));
        assert_eq!(structure.acts.len(), 3);
    }

    #[tokio::test]
    async fn test_second_schema_failure_is_generation_error() {
        let provider = ScriptedGenerator::new(vec![
            Ok(json!({"summary": "x"})),
            Ok(json!({"summary": "", "plot_points": []})),
        ]);
        let err = generate(
            &request("horror", 3),
            &provider,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "generation_error");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_span_hint_is_schema_failure() {
        let provider = ScriptedGenerator::new(vec![
            Ok(act_response((50, 60), &[10])),
            Ok(act_response((50, 60), &[10])),
        ]);
        let err = generate(
            &request("horror", 3),
            &provider,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_after_one_retry() {
        let provider = ScriptedGenerator::new(vec![
            Err(ProviderError::RateLimited),
            Err(ProviderError::RateLimited),
        ]);
        let err = generate(
            &request("horror", 3),
            &provider,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::RateLimited)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_provider_is_not_retried() {
        let provider = ScriptedGenerator::new(vec![Err(ProviderError::Disabled), Ok(act_response((1, 1), &[10]))]);
        let err = generate(
            &request("horror", 3),
            &provider,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Disabled)));
        assert_eq!(provider.calls(), 1);

        let err = generate(
            &request("horror", 3),
            &crate::provider::DisabledGenerator,
            &GeneratorSettings::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Disabled)));
    }

    #[tokio::test]
    async fn test_cancelled_generation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = generate(&request("horror", 3), &PlotWriter, &GeneratorSettings::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { stage: Stage::Generate }));
    }

    #[test]
    fn test_rising_act_reordered_by_tension() {
        let points = vec![
            PlotPoint { description: "a".into(), chapter_hint: 2, tension_hint: 80 },
            PlotPoint { description: "b".into(), chapter_hint: 3, tension_hint: 30 },
            PlotPoint { description: "c".into(), chapter_hint: 4, tension_hint: 50 },
        ];
        let fixed = enforce_shape(points, ActShape::Rising);
        let order: Vec<(&str, u32, u32)> = fixed
            .iter()
            .map(|p| (p.description.as_str(), p.chapter_hint, p.tension_hint))
            .collect();
        assert_eq!(order, vec![("b", 2, 30), ("c", 3, 50), ("a", 4, 80)]);
    }

    #[test]
    fn test_well_formed_peak_act_is_left_alone() {
        let points = vec![
            PlotPoint { description: "a".into(), chapter_hint: 1, tension_hint: 20 },
            PlotPoint { description: "b".into(), chapter_hint: 2, tension_hint: 90 },
            PlotPoint { description: "c".into(), chapter_hint: 3, tension_hint: 40 },
        ];
        let fixed = enforce_shape(points.clone(), ActShape::Peak);
        assert_eq!(fixed, points);
    }

    #[test]
    fn test_peak_act_out_of_order_is_rebuilt() {
        let points = vec![
            PlotPoint { description: "a".into(), chapter_hint: 5, tension_hint: 95 },
            PlotPoint { description: "b".into(), chapter_hint: 6, tension_hint: 10 },
            PlotPoint { description: "c".into(), chapter_hint: 7, tension_hint: 60 },
            PlotPoint { description: "d".into(), chapter_hint: 8, tension_hint: 30 },
        ];
        let fixed = enforce_shape(points, ActShape::Peak);
        let order: Vec<(&str, u32, u32)> = fixed
            .iter()
            .map(|p| (p.description.as_str(), p.chapter_hint, p.tension_hint))
            .collect();
        assert_eq!(order, vec![("b", 5, 10), ("c", 6, 60), ("a", 7, 95), ("d", 8, 30)]);
    }

    #[test]
    fn test_peaked_shape_check() {
        assert!(peaked(&[10, 50, 90, 40]));
        assert!(peaked(&[90, 40, 10]));
        assert!(peaked(&[]));
        assert!(!peaked(&[10, 90, 20, 60]));
    }
}
