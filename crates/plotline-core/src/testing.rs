//! Builders and fakes for tests.
//!
//! Compiled for this crate's unit tests and, behind the `testing` feature,
//! for integration tests here and in the `plotline` app crate. Nothing here
//! touches the network.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::ProviderError;
use crate::models::{Chapter, Character, CharacterRole, PovMode, ProjectSnapshot};
use crate::provider::{ProviderRequest, TextGenerator};

/// Project id used by the builders.
pub const PROJECT: &str = "p1";

/// Fixed timestamp so builder output is reproducible.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A chapter with id `ch{order}` in project [`PROJECT`].
pub fn chapter(order: u32, text: &str) -> Chapter {
    Chapter {
        id: format!("ch{}", order),
        project_id: PROJECT.to_string(),
        order_index: order,
        title: None,
        text: text.to_string(),
        word_count: crate::text::word_count(text) as u32,
        last_modified_at: fixed_time(),
        character_ids: Vec::new(),
        pov_character_id: None,
    }
}

/// Chapters numbered from 1 in the given order.
pub fn chapters(texts: &[&str]) -> Vec<Chapter> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| chapter(i as u32 + 1, t))
        .collect()
}

/// A supporting character with no traits.
pub fn character(id: &str, name: &str) -> Character {
    Character {
        id: id.to_string(),
        project_id: PROJECT.to_string(),
        name: name.to_string(),
        role: CharacterRole::Supporting,
        traits: BTreeSet::new(),
        aliases: Vec::new(),
        occupation: None,
        age_range: None,
    }
}

pub fn with_role(mut character: Character, role: CharacterRole) -> Character {
    character.role = role;
    character
}

pub fn with_traits(mut character: Character, traits: &[&str]) -> Character {
    character.traits = traits.iter().map(|t| t.to_string()).collect();
    character
}

pub fn snapshot(chapters: Vec<Chapter>, characters: Vec<Character>) -> ProjectSnapshot {
    ProjectSnapshot {
        project_id: PROJECT.to_string(),
        title: None,
        pov_mode: None,
        chapters,
        characters,
    }
}

pub fn snapshot_with_pov(
    chapters: Vec<Chapter>,
    characters: Vec<Character>,
    pov: PovMode,
) -> ProjectSnapshot {
    ProjectSnapshot {
        pov_mode: Some(pov),
        ..snapshot(chapters, characters)
    }
}

/// A [`TextGenerator`] that replays a fixed script of responses.
///
/// Each call pops the next scripted result. Once the script is exhausted,
/// calls fail with [`ProviderError::Malformed`]. Every request is recorded
/// for later inspection.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<serde_json::Value, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<serde_json::Value, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Malformed("script exhausted".into())))
    }
}

/// A [`TextGenerator`] that answers every call with the result of `f`.
pub struct FnGenerator<F>(pub F);

#[async_trait]
impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&ProviderRequest) -> Result<serde_json::Value, ProviderError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        (self.0)(request)
    }
}

/// A valid act response for `span` with one plot point per tension value.
pub fn act_response((start, end): (u32, u32), tensions: &[u32]) -> serde_json::Value {
    let points: Vec<serde_json::Value> = tensions
        .iter()
        .enumerate()
        .map(|(i, t)| {
            serde_json::json!({
                "description": format!("Beat {}", i + 1),
                "chapter_hint": (start + i as u32).min(end),
                "tension_hint": t,
            })
        })
        .collect();
    serde_json::json!({
        "summary": format!("Chapters {} to {}.", start, end),
        "plot_points": points,
    })
}

/// A [`TextGenerator`] that writes a valid act for whatever span the
/// generator asks for.
pub struct PlotWriter;

fn requested_span(instruction: &str) -> Option<(u32, u32)> {
    let rest = instruction.split("covers chapters ").nth(1)?;
    let mut parts = rest.split_whitespace();
    let start = parts.next()?.parse().ok()?;
    parts.next()?;
    let end = parts.next()?.trim_end_matches('.').parse().ok()?;
    Some((start, end))
}

#[async_trait]
impl TextGenerator for PlotWriter {
    fn name(&self) -> &str {
        "plot-writer"
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<serde_json::Value, ProviderError> {
        let span = requested_span(&request.instruction)
            .ok_or_else(|| ProviderError::Malformed("no chapter span in instruction".into()))?;
        Ok(act_response(span, &[20, 50, 80]))
    }
}
