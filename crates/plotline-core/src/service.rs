//! The query API the CLI and HTTP server are built on.
//!
//! [`Plotline`] ties a [`ChapterSource`], an [`AnalysisCache`] and a
//! [`TextGenerator`] together. Every operation is cache-first: it reads the
//! snapshot, derives the content hash, serves a fresh cached artifact if one
//! exists and otherwise computes, stores and returns a new one. Nothing is
//! written unless the computation fully succeeded.
//!
//! ```text
//!             ┌───────────────┐
//!  snapshot ◀─┤ ChapterSource │
//!     │       └───────────────┘
//!     ▼
//!  content hash ──▶ cache.get ──hit──▶ artifact
//!                      │
//!                     miss
//!                      ▼
//!                  compute ──▶ cache.put ──▶ artifact
//! ```
//!
//! Failures come back as [`StageError`]s naming the failing stage and
//! whether an older cached artifact is still available.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::analyzer::{self, AnalyzerConfig};
use crate::cache::{self, AnalysisCache};
use crate::detector::{self, AssistSettings, DetectInput, DetectOptions, DetectionReport};
use crate::error::{Error, Stage, StageError};
use crate::generator::{self, GenerateRequest, GeneratorSettings};
use crate::graph;
use crate::hash;
use crate::models::{
    AnalysisKind, AnalysisPayload, CacheBundle, CharacterGraph, PlotStructure, PlotSuggestion,
    ProjectSnapshot, StoryArc,
};
use crate::provider::TextGenerator;
use crate::source::{ChapterSource, ProjectInfo};
use crate::suggest::{self, SuggestInput};

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Tunables for the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(with = "crate::provider::serde_secs")]
    pub cache_ttl: Duration,
    pub analyzer: AnalyzerConfig,
    /// Pass toggles used when a caller does not supply its own.
    pub detect: DetectOptions,
    /// Run the assisted pass by default.
    pub ai_assist: bool,
    pub assist: AssistSettings,
    pub generator: GeneratorSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl: cache::DEFAULT_TTL,
            analyzer: AnalyzerConfig::default(),
            detect: DetectOptions::default(),
            ai_assist: false,
            assist: AssistSettings::default(),
            generator: GeneratorSettings::default(),
        }
    }
}

pub struct Plotline {
    source: Arc<dyn ChapterSource>,
    cache: Arc<dyn AnalysisCache>,
    generator: Arc<dyn TextGenerator>,
    settings: ServiceSettings,
}

/// Cache key hash for a plot-hole run: the snapshot plus everything that
/// changes which holes are found.
fn detect_hash(snapshot: &ProjectSnapshot, options: &DetectOptions, assist: bool) -> String {
    let content = hash::snapshot_hash(&snapshot.chapters, &snapshot.characters);
    hash::sha256_hex(&format!(
        "{}|pov={:?}|t={}|c={}|s={}|p={}|assist={}",
        content,
        snapshot.pov_mode,
        options.timeline,
        options.character_consistency,
        options.unresolved_setups,
        options.pov,
        assist
    ))
}

fn generated_hash(request: &GenerateRequest) -> Result<String, Error> {
    Ok(hash::sha256_hex(&serde_json::to_string(request)?))
}

impl Plotline {
    pub fn new(
        source: Arc<dyn ChapterSource>,
        cache: Arc<dyn AnalysisCache>,
        generator: Arc<dyn TextGenerator>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            source,
            cache,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<dyn AnalysisCache> {
        &self.cache
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Whether any entry (fresh or not) exists for the key.
    async fn has_fallback(&self, project_id: &str, kind: AnalysisKind) -> bool {
        matches!(self.cache.peek(project_id, kind).await, Ok(Some(_)))
    }

    async fn fail(&self, project_id: &str, kind: AnalysisKind, stage: Stage, err: Error) -> StageError {
        tracing::warn!(project = project_id, kind = %kind, stage = %stage, error = %err, "analysis failed");
        StageError::new(stage, err).with_fallback(self.has_fallback(project_id, kind).await)
    }

    async fn snapshot(&self, project_id: &str, kind: AnalysisKind) -> StageResult<ProjectSnapshot> {
        match self.source.snapshot(project_id).await {
            Ok(s) => Ok(s),
            Err(e) => Err(self.fail(project_id, kind, Stage::Source, e).await),
        }
    }

    async fn cached(
        &self,
        project_id: &str,
        kind: AnalysisKind,
        hash: &str,
    ) -> StageResult<Option<AnalysisPayload>> {
        match self.cache.get(project_id, kind, hash).await {
            Ok(hit) => Ok(hit),
            Err(e) => Err(self.fail(project_id, kind, Stage::Cache, e).await),
        }
    }

    async fn store(
        &self,
        project_id: &str,
        payload: AnalysisPayload,
        hash: &str,
    ) -> StageResult<()> {
        let kind = payload.kind();
        match self.cache.put(project_id, payload, hash, self.settings.cache_ttl).await {
            Ok(entry) => {
                tracing::info!(project = project_id, kind = %kind, expires_at = %entry.expires_at, "cached analysis");
                Ok(())
            }
            Err(e) => Err(self.fail(project_id, kind, Stage::Cache, e).await),
        }
    }

    pub async fn list_projects(&self) -> StageResult<Vec<ProjectInfo>> {
        self.source
            .list_projects()
            .await
            .map_err(|e| StageError::new(Stage::Source, e))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Analysis
    // ═══════════════════════════════════════════════════════════════════

    async fn arc_for(&self, snapshot: &ProjectSnapshot) -> StageResult<StoryArc> {
        let project_id = snapshot.project_id.as_str();
        let kind = AnalysisKind::StoryArc;
        let hash = hash::chapters_hash(&snapshot.chapters);
        if let Some(AnalysisPayload::StoryArc(arc)) = self.cached(project_id, kind, &hash).await? {
            tracing::debug!(project = project_id, "story arc served from cache");
            return Ok(arc);
        }
        let arc = match analyzer::analyze_with(&snapshot.chapters, &self.settings.analyzer) {
            Ok(arc) => arc,
            Err(e) => return Err(self.fail(project_id, kind, Stage::Analyze, e).await),
        };
        self.store(project_id, AnalysisPayload::StoryArc(arc.clone()), &hash)
            .await?;
        tracing::info!(
            project = project_id,
            structure = %arc.structure_type,
            confidence = arc.confidence,
            chapters = arc.tension.len(),
            "story arc computed"
        );
        Ok(arc)
    }

    async fn graph_for(&self, snapshot: &ProjectSnapshot) -> StageResult<CharacterGraph> {
        let project_id = snapshot.project_id.as_str();
        let kind = AnalysisKind::CharacterGraph;
        let hash = hash::snapshot_hash(&snapshot.chapters, &snapshot.characters);
        if let Some(AnalysisPayload::CharacterGraph(graph)) =
            self.cached(project_id, kind, &hash).await?
        {
            tracing::debug!(project = project_id, "character graph served from cache");
            return Ok(graph);
        }
        let graph = match graph::build(&snapshot.chapters, &snapshot.characters) {
            Ok(g) => g,
            Err(e) => return Err(self.fail(project_id, kind, Stage::Graph, e).await),
        };
        self.store(project_id, AnalysisPayload::CharacterGraph(graph.clone()), &hash)
            .await?;
        tracing::info!(
            project = project_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "character graph computed"
        );
        Ok(graph)
    }

    async fn holes_for(
        &self,
        snapshot: &ProjectSnapshot,
        options: &DetectOptions,
        assist: bool,
        cancel: &CancellationToken,
    ) -> StageResult<DetectionReport> {
        let project_id = snapshot.project_id.as_str();
        let kind = AnalysisKind::PlotHoles;
        let dismissed = match self.cache.dismissed(project_id).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(project_id, kind, Stage::Cache, e).await),
        };
        let hash = detect_hash(snapshot, options, assist);
        if let Some(AnalysisPayload::PlotHoles(mut holes)) = self.cached(project_id, kind, &hash).await? {
            detector::apply_dismissed(&mut holes, &dismissed);
            tracing::debug!(project = project_id, holes = holes.len(), "plot holes served from cache");
            return Ok(DetectionReport {
                holes,
                failed_passes: Vec::new(),
                assisted: 0,
                assist_degraded: false,
            });
        }

        let arc = self.arc_for(snapshot).await?;
        let graph = self.graph_for(snapshot).await?;
        let input = DetectInput {
            chapters: &snapshot.chapters,
            characters: &snapshot.characters,
            arc: &arc,
            graph: &graph,
            pov_mode: snapshot.pov_mode,
        };
        let options = DetectOptions {
            dismissed,
            ..options.clone()
        };
        let outcome = if assist {
            detector::detect_assisted(
                input,
                &options,
                self.generator.as_ref(),
                &self.settings.assist,
                cancel,
            )
            .await
        } else {
            detector::detect(input, &options)
        };
        let report = match outcome {
            Ok(r) => r,
            Err(e) => return Err(self.fail(project_id, kind, Stage::Detect, e).await),
        };

        if report.failed_passes.is_empty() && !report.assist_degraded {
            self.store(project_id, AnalysisPayload::PlotHoles(report.holes.clone()), &hash)
                .await?;
        } else {
            tracing::warn!(
                project = project_id,
                failed_passes = report.failed_passes.len(),
                assist_degraded = report.assist_degraded,
                "partial detection result not cached"
            );
        }
        tracing::info!(project = project_id, holes = report.holes.len(), "plot holes detected");
        Ok(report)
    }

    /// Tension/pacing curve and structure for a project.
    pub async fn analyze_project(&self, project_id: &str) -> StageResult<StoryArc> {
        let snapshot = self.snapshot(project_id, AnalysisKind::StoryArc).await?;
        self.arc_for(&snapshot).await
    }

    pub async fn get_character_graph(&self, project_id: &str) -> StageResult<CharacterGraph> {
        let snapshot = self.snapshot(project_id, AnalysisKind::CharacterGraph).await?;
        self.graph_for(&snapshot).await
    }

    /// Detect plot holes. `options` defaults to the configured pass toggles
    /// and `assist` to the configured `ai_assist`.
    pub async fn detect_plot_holes(
        &self,
        project_id: &str,
        options: Option<DetectOptions>,
        assist: Option<bool>,
        cancel: &CancellationToken,
    ) -> StageResult<DetectionReport> {
        let snapshot = self.snapshot(project_id, AnalysisKind::PlotHoles).await?;
        let options = options.unwrap_or_else(|| self.settings.detect.clone());
        let assist = assist.unwrap_or(self.settings.ai_assist);
        self.holes_for(&snapshot, &options, assist, cancel).await
    }

    /// Rule-based suggestions built on the arc, graph and heuristic holes.
    pub async fn suggest_plot(&self, project_id: &str) -> StageResult<Vec<PlotSuggestion>> {
        let kind = AnalysisKind::PlotSuggestions;
        let snapshot = self.snapshot(project_id, kind).await?;
        let hash = hash::snapshot_hash(&snapshot.chapters, &snapshot.characters);
        if let Some(AnalysisPayload::PlotSuggestions(s)) = self.cached(project_id, kind, &hash).await? {
            return Ok(s);
        }

        let arc = self.arc_for(&snapshot).await?;
        let graph = self.graph_for(&snapshot).await?;
        let report = self
            .holes_for(&snapshot, &self.settings.detect, false, &CancellationToken::new())
            .await?;
        let suggestions = match suggest::suggest(SuggestInput {
            chapters: &snapshot.chapters,
            characters: &snapshot.characters,
            arc: &arc,
            graph: &graph,
            holes: &report.holes,
        }) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(project_id, kind, Stage::Suggest, e).await),
        };
        if report.failed_passes.is_empty() {
            self.store(project_id, AnalysisPayload::PlotSuggestions(suggestions.clone()), &hash)
                .await?;
        }
        tracing::info!(project = project_id, suggestions = suggestions.len(), "suggestions computed");
        Ok(suggestions)
    }

    /// Generate a plot structure. Cached under `request.project_id` when set.
    pub async fn generate_plot(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> StageResult<PlotStructure> {
        let structure = match generator::generate(
            request,
            self.generator.as_ref(),
            &self.settings.generator,
            cancel,
        )
        .await
        {
            Ok(s) => s,
            Err(e) => {
                let fallback = match &request.project_id {
                    Some(p) => self.has_fallback(p, AnalysisKind::PlotStructure).await,
                    None => false,
                };
                tracing::warn!(error = %e, "plot generation failed");
                return Err(StageError::new(Stage::Generate, e).with_fallback(fallback));
            }
        };
        if let Some(project_id) = &request.project_id {
            let hash = generated_hash(request).map_err(|e| StageError::new(Stage::Cache, e))?;
            self.store(project_id, AnalysisPayload::PlotStructure(structure.clone()), &hash)
                .await?;
        }
        Ok(structure)
    }

    /// A cached artifact if it is still fresh for the current manuscript.
    ///
    /// Plot structures do not depend on the manuscript, so only their expiry
    /// is checked.
    pub async fn get_cached_analysis(
        &self,
        project_id: &str,
        kind: AnalysisKind,
    ) -> StageResult<Option<AnalysisPayload>> {
        if kind == AnalysisKind::PlotStructure {
            return match self.cache.peek(project_id, kind).await {
                Ok(entry) => Ok(entry
                    .filter(|e| !e.is_expired_at(chrono::Utc::now()))
                    .map(|e| e.payload)),
                Err(e) => Err(StageError::new(Stage::Cache, e)),
            };
        }
        let snapshot = self.snapshot(project_id, kind).await?;
        let hash = match kind {
            AnalysisKind::StoryArc => hash::chapters_hash(&snapshot.chapters),
            AnalysisKind::PlotHoles => {
                detect_hash(&snapshot, &self.settings.detect, self.settings.ai_assist)
            }
            _ => hash::snapshot_hash(&snapshot.chapters, &snapshot.characters),
        };
        let mut hit = self.cached(project_id, kind, &hash).await?;
        if let Some(AnalysisPayload::PlotHoles(holes)) = hit.as_mut() {
            let dismissed = self
                .cache
                .dismissed(project_id)
                .await
                .map_err(|e| StageError::new(Stage::Cache, e))?;
            detector::apply_dismissed(holes, &dismissed);
        }
        Ok(hit)
    }

    /// Record a dismissal. Cached holes and suggestions are dropped so the
    /// next run reflects it.
    pub async fn dismiss_plot_hole(&self, project_id: &str, fingerprint: &str) -> StageResult<bool> {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(StageError::new(
                Stage::Cache,
                Error::invalid(Stage::Cache, "fingerprint is empty"),
            ));
        }
        let stage_err = |e| StageError::new(Stage::Cache, e);
        let added = self.cache.dismiss(project_id, fingerprint).await.map_err(stage_err)?;
        for kind in [AnalysisKind::PlotHoles, AnalysisKind::PlotSuggestions] {
            self.cache
                .invalidate(project_id, Some(kind))
                .await
                .map_err(stage_err)?;
        }
        tracing::info!(project = project_id, fingerprint, added, "plot hole dismissed");
        Ok(added)
    }

    pub async fn export_project_analysis(&self, project_id: &str) -> StageResult<CacheBundle> {
        self.cache
            .export_all(project_id)
            .await
            .map_err(|e| StageError::new(Stage::Cache, e))
    }

    pub async fn import_project_analysis(
        &self,
        project_id: &str,
        bundle: CacheBundle,
    ) -> StageResult<usize> {
        let count = self
            .cache
            .import_all(project_id, bundle)
            .await
            .map_err(|e| StageError::new(Stage::Cache, e))?;
        tracing::info!(project = project_id, entries = count, "analysis bundle imported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::models::Severity;
    use crate::provider::DisabledGenerator;
    use crate::source::InMemorySource;
    use crate::testing::{chapters, character, snapshot, PlotWriter};

    fn service_for(texts: &[&str]) -> (Plotline, Arc<InMemoryCache>) {
        let source = InMemorySource::new().with_project(snapshot(
            chapters(texts),
            vec![character("mara", "Mara"), character("tom", "Tom")],
        ));
        let cache = Arc::new(InMemoryCache::new());
        let service = Plotline::new(
            Arc::new(source),
            cache.clone(),
            Arc::new(DisabledGenerator),
            ServiceSettings::default(),
        );
        (service, cache)
    }

    const EYES: [&str; 3] = [
        "Mara has brown eyes. She met Tom at the market.",
        "Tom and Mara walked home.",
        "Mara has blue eyes. Tom smiled at her.",
    ];

    #[tokio::test]
    async fn test_analyze_is_cached() {
        let (service, cache) = service_for(&EYES);
        let first = service.analyze_project("p1").await.unwrap();
        assert!(cache.peek("p1", AnalysisKind::StoryArc).await.unwrap().is_some());
        let second = service.analyze_project("p1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_project_reports_source_stage() {
        let (service, _) = service_for(&EYES);
        let err = service.analyze_project("missing").await.unwrap_err();
        assert_eq!(err.stage, Stage::Source);
        assert!(!err.cached_fallback);
    }

    #[tokio::test]
    async fn test_detect_caches_and_dismissal_sticks() {
        let (service, cache) = service_for(&EYES);
        let cancel = CancellationToken::new();
        let report = service.detect_plot_holes("p1", None, None, &cancel).await.unwrap();
        let eyes = report
            .holes
            .iter()
            .find(|h| h.severity == Severity::Critical)
            .expect("eye colour contradiction");
        let fingerprint = eyes.fingerprint.clone();

        assert!(service.dismiss_plot_hole("p1", &fingerprint).await.unwrap());
        assert!(cache.peek("p1", AnalysisKind::PlotHoles).await.unwrap().is_none());

        let again = service.detect_plot_holes("p1", None, None, &cancel).await.unwrap();
        let hole = again.holes.iter().find(|h| h.fingerprint == fingerprint).unwrap();
        assert!(hole.dismissed);
    }

    #[tokio::test]
    async fn test_assist_with_disabled_provider_degrades_and_is_not_cached() {
        let (service, cache) = service_for(&[
            "Mara promised to return the silver compass.",
            "Snow fell.",
            "Tom slept.",
        ]);
        let report = service
            .detect_plot_holes("p1", None, Some(true), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.assist_degraded);
        assert!(!report.holes.is_empty());
        assert!(cache.peek("p1", AnalysisKind::PlotHoles).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_is_cached_under_project() {
        let source = InMemorySource::new();
        let cache = Arc::new(InMemoryCache::new());
        let service = Plotline::new(
            Arc::new(source),
            cache.clone(),
            Arc::new(PlotWriter),
            ServiceSettings::default(),
        );
        let request = GenerateRequest {
            premise: "a heist goes wrong".into(),
            genre: "thriller".into(),
            target_length: 12,
            structure_type: None,
            themes: vec!["trust".into()],
            project_id: Some("draft".into()),
        };
        let structure = service
            .generate_plot(&request, &CancellationToken::new())
            .await
            .unwrap();
        let cached = service
            .get_cached_analysis("draft", AnalysisKind::PlotStructure)
            .await
            .unwrap();
        assert_eq!(cached, Some(AnalysisPayload::PlotStructure(structure)));
    }

    #[tokio::test]
    async fn test_cancelled_generation_writes_nothing() {
        let cache = Arc::new(InMemoryCache::new());
        let service = Plotline::new(
            Arc::new(InMemorySource::new()),
            cache.clone(),
            Arc::new(PlotWriter),
            ServiceSettings::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = GenerateRequest {
            premise: "a heist goes wrong".into(),
            genre: "thriller".into(),
            target_length: 12,
            structure_type: None,
            themes: vec![],
            project_id: Some("draft".into()),
        };
        let err = service.generate_plot(&request, &cancel).await.unwrap_err();
        assert_eq!(err.stage, Stage::Generate);
        assert!(cache.entries(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reports_cached_fallback() {
        let (service, cache) = service_for(&EYES);
        service.analyze_project("p1").await.unwrap();
        // Same cache, but a source that no longer knows the project.
        let other = Plotline::new(
            Arc::new(InMemorySource::new()),
            cache.clone(),
            Arc::new(DisabledGenerator),
            ServiceSettings::default(),
        );
        let err = other.analyze_project("p1").await.unwrap_err();
        assert_eq!(err.stage, Stage::Source);
        assert!(err.cached_fallback);
    }
}
