//! Core data models used throughout Plotline.
//!
//! Chapters and characters are read-only views supplied by a
//! [`ChapterSource`](crate::source::ChapterSource). Everything else is a
//! derived artifact owned by the core and persisted through an
//! [`AnalysisCache`](crate::cache::AnalysisCache).
//!
//! Enum values serialize in kebab-case (`"three-act"`,
//! `"timeline-inconsistency"`) so payloads read the same in JSON, SQLite and
//! CLI output.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// Source views
// ═══════════════════════════════════════════════════════════════════════

/// A chapter as seen by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub project_id: String,
    /// Position in the manuscript. Contiguous and strictly increasing per project.
    pub order_index: u32,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    pub word_count: u32,
    pub last_modified_at: DateTime<Utc>,
    /// Characters the author explicitly lists as appearing in this chapter.
    #[serde(default)]
    pub character_ids: Vec<String>,
    /// Viewpoint character for third-limited narration.
    #[serde(default)]
    pub pov_character_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharacterRole {
    Protagonist,
    Antagonist,
    Supporting,
    Minor,
}

/// A character as seen by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub role: CharacterRole,
    #[serde(default)]
    pub traits: BTreeSet<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub age_range: Option<String>,
}

impl Character {
    /// All names the character may be referred to by in prose.
    ///
    /// Includes the full name, any aliases, and the first token of a
    /// multi-word name (`"Ada Lovelace"` → `"Ada"`).
    pub fn mention_names(&self) -> Vec<String> {
        let mut names = vec![self.name.trim().to_string()];
        let mut tokens = self.name.split_whitespace();
        if let (Some(first), Some(_)) = (tokens.next(), tokens.next()) {
            names.push(first.to_string());
        }
        for alias in &self.aliases {
            let alias = alias.trim();
            if !alias.is_empty() {
                names.push(alias.to_string());
            }
        }
        names.retain(|n| !n.is_empty());
        names.sort();
        names.dedup();
        names
    }
}

/// Declared narrative point of view for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PovMode {
    FirstPerson,
    SecondPerson,
    ThirdLimited,
    ThirdOmniscient,
}

impl FromStr for PovMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "first" | "first-person" => Ok(PovMode::FirstPerson),
            "second" | "second-person" => Ok(PovMode::SecondPerson),
            "third-limited" | "limited" => Ok(PovMode::ThirdLimited),
            "third" | "third-omniscient" | "omniscient" => Ok(PovMode::ThirdOmniscient),
            other => Err(format!("unknown POV mode: {}", other)),
        }
    }
}

/// Everything a source returns for one project at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub project_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pov_mode: Option<PovMode>,
    pub chapters: Vec<Chapter>,
    pub characters: Vec<Character>,
}

// ═══════════════════════════════════════════════════════════════════════
// Story arc
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmotionalValence {
    Positive,
    Negative,
    Mixed,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionPoint {
    pub chapter_order_index: u32,
    /// 0–100.
    pub tension_level: f64,
    pub emotional_valence: EmotionalValence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacingPoint {
    pub chapter_order_index: u32,
    /// 0–100, higher is faster.
    pub pace_score: f64,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureType {
    ThreeAct,
    FiveAct,
    #[serde(rename = "heros-journey")]
    HerosJourney,
    #[serde(rename = "heroines-journey")]
    HeroinesJourney,
    SaveTheCat,
    Freytag,
    Unknown,
}

impl StructureType {
    pub const KNOWN: [StructureType; 6] = [
        StructureType::ThreeAct,
        StructureType::FiveAct,
        StructureType::HerosJourney,
        StructureType::HeroinesJourney,
        StructureType::SaveTheCat,
        StructureType::Freytag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::ThreeAct => "three-act",
            StructureType::FiveAct => "five-act",
            StructureType::HerosJourney => "heros-journey",
            StructureType::HeroinesJourney => "heroines-journey",
            StructureType::SaveTheCat => "save-the-cat",
            StructureType::Freytag => "freytag",
            StructureType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['\'', '’'], "").replace(['_', ' '], "-");
        match normalized.as_str() {
            "three-act" | "3-act" => Ok(StructureType::ThreeAct),
            "five-act" | "5-act" => Ok(StructureType::FiveAct),
            "heros-journey" | "hero-journey" => Ok(StructureType::HerosJourney),
            "heroines-journey" | "heroine-journey" => Ok(StructureType::HeroinesJourney),
            "save-the-cat" => Ok(StructureType::SaveTheCat),
            "freytag" | "freytag-pyramid" => Ok(StructureType::Freytag),
            "unknown" => Ok(StructureType::Unknown),
            other => Err(format!("unknown structure type: {}", other)),
        }
    }
}

/// Per-chapter tension and pacing curve plus the detected structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryArc {
    pub project_id: String,
    pub tension: Vec<TensionPoint>,
    pub pacing: Vec<PacingPoint>,
    pub structure_type: StructureType,
    /// 0–1.
    pub confidence: f64,
    /// [`chapters_hash`](crate::hash::chapters_hash) of the analyzed chapters.
    pub content_hash: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Character graph
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    Ally,
    Rival,
    Romantic,
    Family,
    Mentor,
    Enemy,
    Neutral,
}

impl RelationshipType {
    /// Tie-break order: earlier entries win ties.
    pub const PRIORITY: [RelationshipType; 7] = [
        RelationshipType::Romantic,
        RelationshipType::Family,
        RelationshipType::Mentor,
        RelationshipType::Rival,
        RelationshipType::Enemy,
        RelationshipType::Ally,
        RelationshipType::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Ally => "ally",
            RelationshipType::Rival => "rival",
            RelationshipType::Romantic => "romantic",
            RelationshipType::Family => "family",
            RelationshipType::Mentor => "mentor",
            RelationshipType::Enemy => "enemy",
            RelationshipType::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterNode {
    pub character_id: String,
    /// Sum of incident edge strengths.
    pub centrality: f64,
    /// Chapter ids in which the character is mentioned, in manuscript order.
    pub appearances: Vec<String>,
}

/// An undirected relationship; `from_character_id < to_character_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from_character_id: String,
    pub to_character_id: String,
    pub relationship_type: RelationshipType,
    /// 0–1.
    pub strength: f64,
    pub evidence_chapter_ids: Vec<String>,
    pub first_seen_chapter: String,
    pub last_seen_chapter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterGraph {
    pub project_id: String,
    pub nodes: Vec<CharacterNode>,
    pub edges: Vec<RelationshipEdge>,
    /// [`snapshot_hash`](crate::hash::snapshot_hash) of the inputs.
    pub content_hash: String,
}

impl CharacterGraph {
    pub fn node(&self, character_id: &str) -> Option<&CharacterNode> {
        self.nodes.iter().find(|n| n.character_id == character_id)
    }

    /// Edges touching `character_id`.
    pub fn edges_of<'a>(
        &'a self,
        character_id: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipEdge> + 'a {
        self.edges.iter().filter(move |e| {
            e.from_character_id == character_id || e.to_character_id == character_id
        })
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&RelationshipEdge> {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        self.edges
            .iter()
            .find(|e| e.from_character_id == from && e.to_character_id == to)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Plot holes and suggestions
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlotHoleType {
    TimelineInconsistency,
    CharacterInconsistency,
    UnresolvedSetup,
    Contradiction,
    MissingMotivation,
    PovError,
}

impl PlotHoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotHoleType::TimelineInconsistency => "timeline-inconsistency",
            PlotHoleType::CharacterInconsistency => "character-inconsistency",
            PlotHoleType::UnresolvedSetup => "unresolved-setup",
            PlotHoleType::Contradiction => "contradiction",
            PlotHoleType::MissingMotivation => "missing-motivation",
            PlotHoleType::PovError => "pov-error",
        }
    }
}

/// Declared most-severe first so that `Ord` sorts critical holes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
            Severity::Info => "info",
        }
    }

    /// One step less severe; `info` stays `info`.
    pub fn downgraded(self) -> Self {
        match self {
            Severity::Critical => Severity::Major,
            Severity::Major => Severity::Minor,
            Severity::Minor | Severity::Info => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotHole {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub hole_type: PlotHoleType,
    pub severity: Severity,
    pub description: String,
    /// Never empty.
    pub affected_chapter_ids: Vec<String>,
    pub affected_character_ids: Vec<String>,
    pub suggested_fix: String,
    pub detected_at: DateTime<Utc>,
    pub dismissed: bool,
    /// See [`plot_hole_fingerprint`](crate::hash::plot_hole_fingerprint).
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionType {
    Twist,
    Subplot,
    Resolution,
    Foreshadowing,
    CharacterArc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSuggestion {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub impact: Impact,
    pub description: String,
    pub related_character_ids: Vec<String>,
    pub related_chapter_ids: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Generated structure
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub description: String,
    /// 1-based chapter within the whole structure.
    pub chapter_hint: u32,
    /// 0–100.
    pub tension_hint: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
    pub title: String,
    pub summary: String,
    /// First chapter of the act (1-based, inclusive).
    pub chapter_start: u32,
    /// Last chapter of the act (inclusive).
    pub chapter_end: u32,
    pub plot_points: Vec<PlotPoint>,
}

impl Act {
    pub fn span(&self) -> u32 {
        self.chapter_end + 1 - self.chapter_start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotStructure {
    pub id: String,
    pub project_id: Option<String>,
    pub premise: String,
    pub genre: String,
    pub target_length: u32,
    pub structure_type: StructureType,
    pub acts: Vec<Act>,
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════════════════

/// The closed set of cached artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisKind {
    StoryArc,
    CharacterGraph,
    PlotHoles,
    PlotSuggestions,
    PlotStructure,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::StoryArc,
        AnalysisKind::CharacterGraph,
        AnalysisKind::PlotHoles,
        AnalysisKind::PlotSuggestions,
        AnalysisKind::PlotStructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::StoryArc => "story-arc",
            AnalysisKind::CharacterGraph => "character-graph",
            AnalysisKind::PlotHoles => "plot-holes",
            AnalysisKind::PlotSuggestions => "plot-suggestions",
            AnalysisKind::PlotStructure => "plot-structure",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown analysis kind: {}. Use story-arc, character-graph, plot-holes, plot-suggestions, or plot-structure.",
                    s
                )
            })
    }
}

/// A typed cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum AnalysisPayload {
    StoryArc(StoryArc),
    CharacterGraph(CharacterGraph),
    PlotHoles(Vec<PlotHole>),
    PlotSuggestions(Vec<PlotSuggestion>),
    PlotStructure(PlotStructure),
}

impl AnalysisPayload {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisPayload::StoryArc(_) => AnalysisKind::StoryArc,
            AnalysisPayload::CharacterGraph(_) => AnalysisKind::CharacterGraph,
            AnalysisPayload::PlotHoles(_) => AnalysisKind::PlotHoles,
            AnalysisPayload::PlotSuggestions(_) => AnalysisKind::PlotSuggestions,
            AnalysisPayload::PlotStructure(_) => AnalysisKind::PlotStructure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCacheEntry {
    pub project_id: String,
    pub payload: AnalysisPayload,
    pub content_hash: String,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AnalysisCacheEntry {
    pub fn kind(&self) -> AnalysisKind {
        self.payload.kind()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Everything cached for one project, for backup and migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheBundle {
    pub project_id: String,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<AnalysisCacheEntry>,
    #[serde(default)]
    pub dismissed_fingerprints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_type_serializes_kebab_case() {
        let json = serde_json::to_string(&StructureType::HerosJourney).unwrap();
        assert_eq!(json, "\"heros-journey\"");
        let json = serde_json::to_string(&StructureType::SaveTheCat).unwrap();
        assert_eq!(json, "\"save-the-cat\"");
    }

    #[test]
    fn test_structure_type_parses_loose_spellings() {
        assert_eq!("Hero's Journey".parse(), Ok(StructureType::HerosJourney));
        assert_eq!("three_act".parse(), Ok(StructureType::ThreeAct));
        assert!("sonnet".parse::<StructureType>().is_err());
    }

    #[test]
    fn test_severity_orders_critical_first() {
        let mut v = vec![Severity::Info, Severity::Critical, Severity::Minor, Severity::Major];
        v.sort();
        assert_eq!(
            v,
            vec![Severity::Critical, Severity::Major, Severity::Minor, Severity::Info]
        );
        assert_eq!(Severity::Info.downgraded(), Severity::Info);
    }

    #[test]
    fn test_payload_tagged_by_kind() {
        let payload = AnalysisPayload::PlotSuggestions(vec![]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "plot-suggestions");
        assert_eq!(payload.kind(), AnalysisKind::PlotSuggestions);
    }

    #[test]
    fn test_mention_names_include_first_name_and_aliases() {
        let c = Character {
            id: "c1".into(),
            project_id: "p".into(),
            name: "Ada Lovelace".into(),
            role: CharacterRole::Protagonist,
            traits: BTreeSet::new(),
            aliases: vec!["the Countess".into(), " ".into()],
            occupation: None,
            age_range: None,
        };
        assert_eq!(c.mention_names(), vec!["Ada", "Ada Lovelace", "the Countess"]);
    }

    #[test]
    fn test_analysis_kind_round_trips_through_str() {
        for kind in AnalysisKind::ALL {
            assert_eq!(kind.as_str().parse::<AnalysisKind>(), Ok(kind));
        }
    }
}
