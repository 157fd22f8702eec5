//! Plot suggestions.
//!
//! Deterministic rules over an arc, a character graph and a set of detected
//! holes. The same input always yields the same suggestions, ids included.
//!
//! | Rule | Type | Impact |
//! |------|------|--------|
//! | middle third is flat (tension std-dev < 8 over ≥ 3 chapters) | twist | high |
//! | open unresolved setup | resolution | medium |
//! | final chapter tension > 70 | resolution | medium |
//! | protagonist/antagonist isolated or below median centrality | character-arc | high |
//! | supporting character with exactly one relationship | subplot | low |
//! | tension jumps > 30 into the final third | foreshadowing | medium |

use std::cmp::Reverse;

use crate::error::Result;
use crate::hash;
use crate::models::{
    Chapter, Character, CharacterGraph, CharacterRole, Impact, PlotHole, PlotHoleType,
    PlotSuggestion, StoryArc, SuggestionType,
};
use crate::text;
use crate::validate;

const FLAT_STD_DEV: f64 = 8.0;
const FLAT_MIN_CHAPTERS: usize = 3;
const UNRESOLVED_ENDING: f64 = 70.0;
const SHARP_JUMP: f64 = 30.0;

#[derive(Debug, Clone, Copy)]
pub struct SuggestInput<'a> {
    pub chapters: &'a [Chapter],
    pub characters: &'a [Character],
    pub arc: &'a StoryArc,
    pub graph: &'a CharacterGraph,
    pub holes: &'a [PlotHole],
}

struct Rules<'a> {
    input: SuggestInput<'a>,
    out: Vec<PlotSuggestion>,
}

impl<'a> Rules<'a> {
    fn push(
        &mut self,
        suggestion_type: SuggestionType,
        impact: Impact,
        description: String,
        character_ids: Vec<String>,
        chapter_ids: Vec<String>,
    ) {
        let seed = format!(
            "{:?}|{}|{}|{}",
            suggestion_type,
            description,
            character_ids.join(","),
            chapter_ids.join(",")
        );
        self.out.push(PlotSuggestion {
            id: hash::sha256_hex(&seed)[..16].to_string(),
            project_id: self.input.arc.project_id.clone(),
            suggestion_type,
            impact,
            description,
            related_character_ids: character_ids,
            related_chapter_ids: chapter_ids,
        });
    }

    fn chapter_id(&self, idx: usize) -> String {
        self.input.chapters[idx].id.clone()
    }

    fn name_of(&self, id: &str) -> String {
        self.input
            .characters
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn flat_middle(&mut self, tension: &[f64]) {
        let n = tension.len();
        let (lo, hi) = (n / 3, 2 * n / 3);
        if hi - lo < FLAT_MIN_CHAPTERS {
            return;
        }
        let sd = text::std_dev(&tension[lo..hi]);
        if sd < FLAT_STD_DEV {
            let ids = (lo..hi).map(|i| self.chapter_id(i)).collect();
            self.push(
                SuggestionType::Twist,
                Impact::High,
                format!(
                    "Tension barely moves through chapters {}-{} (spread {:.1}). A reversal or revelation here would sharpen the middle.",
                    self.input.chapters[lo].order_index,
                    self.input.chapters[hi - 1].order_index,
                    sd
                ),
                Vec::new(),
                ids,
            );
        }
    }

    fn open_setups(&mut self) {
        let holes = self.input.holes;
        for hole in holes
            .iter()
            .filter(|h| !h.dismissed && h.hole_type == PlotHoleType::UnresolvedSetup)
        {
            self.push(
                SuggestionType::Resolution,
                Impact::Medium,
                format!("Pay off this thread: {}", hole.description),
                hole.affected_character_ids.clone(),
                hole.affected_chapter_ids.clone(),
            );
        }
    }

    fn unresolved_ending(&mut self, tension: &[f64]) {
        let Some(&last) = tension.last() else {
            return;
        };
        if tension.len() > 1 && last > UNRESOLVED_ENDING {
            let idx = tension.len() - 1;
            self.push(
                SuggestionType::Resolution,
                Impact::Medium,
                format!(
                    "The story ends at tension {:.0}. Consider a closing chapter that lets the conflict settle.",
                    last
                ),
                Vec::new(),
                vec![self.chapter_id(idx)],
            );
        }
    }

    fn leads(&mut self) {
        let graph = self.input.graph;
        let mut centralities: Vec<f64> = graph.nodes.iter().map(|n| n.centrality).collect();
        centralities.sort_by(|a, b| a.total_cmp(b));
        let median = if centralities.is_empty() {
            0.0
        } else {
            centralities[centralities.len() / 2]
        };
        let characters = self.input.characters;
        for c in characters
            .iter()
            .filter(|c| matches!(c.role, CharacterRole::Protagonist | CharacterRole::Antagonist))
        {
            let edges = graph.edges_of(&c.id).count();
            let centrality = graph.node(&c.id).map(|n| n.centrality).unwrap_or(0.0);
            let description = if edges == 0 {
                format!(
                    "{} has no relationships with the rest of the cast. Give them scenes that put them against or alongside others.",
                    c.name
                )
            } else if centrality < median {
                format!(
                    "{} is less connected than most of the cast (centrality {:.2}, median {:.2}). Strengthen their ties to the central conflict.",
                    c.name, centrality, median
                )
            } else {
                continue;
            };
            let appearances = graph
                .node(&c.id)
                .map(|n| n.appearances.clone())
                .unwrap_or_default();
            self.push(
                SuggestionType::CharacterArc,
                Impact::High,
                description,
                vec![c.id.clone()],
                appearances,
            );
        }
    }

    fn thin_supporting(&mut self) {
        let graph = self.input.graph;
        let characters = self.input.characters;
        for c in characters.iter().filter(|c| c.role == CharacterRole::Supporting) {
            let edges: Vec<_> = graph.edges_of(&c.id).collect();
            if let [edge] = edges.as_slice() {
                let other = if edge.from_character_id == c.id {
                    &edge.to_character_id
                } else {
                    &edge.from_character_id
                };
                let description = format!(
                    "{} only relates to {}. A subplot linking them to another character would round them out.",
                    c.name,
                    self.name_of(other)
                );
                self.push(
                    SuggestionType::Subplot,
                    Impact::Low,
                    description,
                    vec![c.id.clone(), other.clone()],
                    edge.evidence_chapter_ids.clone(),
                );
            }
        }
    }

    fn sharp_jumps(&mut self, tension: &[f64]) {
        let n = tension.len();
        let start = (2 * n / 3).max(1);
        for i in start..n {
            let jump = tension[i] - tension[i - 1];
            if jump > SHARP_JUMP {
                let earlier = i / 3;
                self.push(
                    SuggestionType::Foreshadowing,
                    Impact::Medium,
                    format!(
                        "Tension jumps by {:.0} in chapter {}. Plant a hint of it as early as chapter {}.",
                        jump,
                        self.input.chapters[i].order_index,
                        self.input.chapters[earlier].order_index
                    ),
                    Vec::new(),
                    vec![self.chapter_id(earlier), self.chapter_id(i)],
                );
            }
        }
    }
}

/// Suggestions for one project, highest impact first.
pub fn suggest(input: SuggestInput<'_>) -> Result<Vec<PlotSuggestion>> {
    validate::chapters(input.chapters, crate::error::Stage::Suggest)?;
    validate::artifacts(
        input.chapters,
        input.characters,
        input.arc,
        input.graph,
        crate::error::Stage::Suggest,
    )?;

    let tension: Vec<f64> = input.arc.tension.iter().map(|p| p.tension_level).collect();
    let mut rules = Rules {
        input,
        out: Vec::new(),
    };
    rules.flat_middle(&tension);
    rules.open_setups();
    rules.unresolved_ending(&tension);
    rules.leads();
    rules.thin_supporting();
    rules.sharp_jumps(&tension);

    let mut out = rules.out;
    out.sort_by_key(|s| Reverse(s.impact));
    tracing::debug!(count = out.len(), "suggestions computed");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer;
    use crate::graph;
    use crate::models::{Severity, TensionPoint};
    use crate::testing::{chapters, character, fixed_time, with_role};

    struct Case {
        chapters: Vec<Chapter>,
        characters: Vec<Character>,
        arc: StoryArc,
        graph: CharacterGraph,
    }

    impl Case {
        fn new(texts: &[&str], characters: Vec<Character>) -> Self {
            let chapters = chapters(texts);
            let arc = analyzer::analyze(&chapters).unwrap();
            let graph = graph::build(&chapters, &characters).unwrap();
            Self {
                chapters,
                characters,
                arc,
                graph,
            }
        }

        fn with_tension(mut self, levels: &[f64]) -> Self {
            self.arc.tension = levels
                .iter()
                .enumerate()
                .map(|(i, &t)| TensionPoint {
                    tension_level: t,
                    chapter_order_index: i as u32 + 1,
                    ..self.arc.tension[i].clone()
                })
                .collect();
            self
        }

        fn run(&self, holes: &[PlotHole]) -> Vec<PlotSuggestion> {
            suggest(SuggestInput {
                chapters: &self.chapters,
                characters: &self.characters,
                arc: &self.arc,
                graph: &self.graph,
                holes,
            })
            .unwrap()
        }
    }

    fn of_type(s: &[PlotSuggestion], t: SuggestionType) -> Vec<&PlotSuggestion> {
        s.iter().filter(|x| x.suggestion_type == t).collect()
    }

    const SIX: [&str; 6] = ["One.", "Two.", "Three.", "Four.", "Five.", "Six."];

    #[test]
    fn test_flat_middle_suggests_twist() {
        let case = Case::new(&SIX, vec![]).with_tension(&[10.0, 40.0, 42.0, 41.0, 60.0, 50.0]);
        // middle third of six chapters is two chapters: too short
        assert!(of_type(&case.run(&[]), SuggestionType::Twist).is_empty());

        let nine = ["a.", "b.", "c.", "d.", "e.", "f.", "g.", "h.", "i."];
        let case = Case::new(&nine, vec![])
            .with_tension(&[10.0, 20.0, 30.0, 45.0, 47.0, 44.0, 60.0, 65.0, 50.0]);
        let twists = case.run(&[]);
        let twists = of_type(&twists, SuggestionType::Twist);
        assert_eq!(twists.len(), 1);
        assert_eq!(twists[0].impact, Impact::High);
        assert_eq!(twists[0].related_chapter_ids, vec!["ch4", "ch5", "ch6"]);
    }

    #[test]
    fn test_open_setup_becomes_resolution() {
        let case = Case::new(&SIX, vec![]);
        let hole = |dismissed| PlotHole {
            id: "h".into(),
            project_id: "p1".into(),
            hole_type: PlotHoleType::UnresolvedSetup,
            severity: Severity::Major,
            description: "A promise is never kept.".into(),
            affected_chapter_ids: vec!["ch2".into()],
            affected_character_ids: vec![],
            suggested_fix: String::new(),
            detected_at: fixed_time(),
            dismissed,
            fingerprint: "fp".into(),
        };
        let open = case.run(&[hole(false)]);
        let resolutions = of_type(&open, SuggestionType::Resolution);
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].related_chapter_ids, vec!["ch2"]);
        let dismissed = case.run(&[hole(true)]);
        assert!(of_type(&dismissed, SuggestionType::Resolution).is_empty());
    }

    #[test]
    fn test_high_final_tension() {
        let case = Case::new(&SIX, vec![]).with_tension(&[10.0, 20.0, 30.0, 40.0, 60.0, 85.0]);
        let s = case.run(&[]);
        let r = of_type(&s, SuggestionType::Resolution);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].related_chapter_ids, vec!["ch6"]);
    }

    #[test]
    fn test_isolated_protagonist() {
        let case = Case::new(
            &["Ana sat alone.", "Ben met Cal.", "Ben and Cal argued."],
            vec![
                with_role(character("ana", "Ana"), CharacterRole::Protagonist),
                character("ben", "Ben"),
                character("cal", "Cal"),
            ],
        );
        let s = case.run(&[]);
        let arcs = of_type(&s, SuggestionType::CharacterArc);
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].related_character_ids, vec!["ana"]);
        assert_eq!(arcs[0].related_chapter_ids, vec!["ch1"]);
        assert_eq!(s[0].impact, Impact::High);

        let subplots = of_type(&s, SuggestionType::Subplot);
        assert_eq!(subplots.len(), 2);
        assert!(subplots.iter().all(|x| x.impact == Impact::Low));
    }

    #[test]
    fn test_late_jump_suggests_foreshadowing() {
        let case = Case::new(&SIX, vec![]).with_tension(&[20.0, 25.0, 30.0, 30.0, 70.0, 60.0]);
        let s = case.run(&[]);
        let f = of_type(&s, SuggestionType::Foreshadowing);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].related_chapter_ids, vec!["ch2", "ch5"]);
    }

    #[test]
    fn test_deterministic() {
        let case = Case::new(
            &["Ana met Ben.", "Ana and Ben fought.", "Ben wept."],
            vec![
                with_role(character("ana", "Ana"), CharacterRole::Protagonist),
                with_role(character("ben", "Ben"), CharacterRole::Antagonist),
            ],
        )
        .with_tension(&[10.0, 20.0, 90.0]);
        assert_eq!(case.run(&[]), case.run(&[]));
    }

    #[test]
    fn test_stale_graph_rejected() {
        let mut case = Case::new(&SIX, vec![]);
        case.graph.content_hash = "old".into();
        let err = suggest(SuggestInput {
            chapters: &case.chapters,
            characters: &case.characters,
            arc: &case.arc,
            graph: &case.graph,
            holes: &[],
        })
        .unwrap_err();
        assert_eq!(err.code(), "stale_input");
    }
}
