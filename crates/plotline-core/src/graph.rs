//! Character graph construction.
//!
//! Builds an undirected, weighted relationship graph from chapter text. Every
//! rebuild derives edge strength from the full evidence set, so building twice
//! from the same input gives identical strengths.
//!
//! Per chapter and co-occurring pair:
//!
//! | Quantity | Rule |
//! |----------|------|
//! | interactions `i` | sentences naming both + dialogue paragraphs naming both + direct addresses |
//! | chapter strength `s` | `0.25 + 0.75 · i / (i + 2)` |
//! | chapter weight `w` | `1 + i` |
//! | edge strength | `Σ w·s / Σ w` over evidence chapters |
//!
//! A direct address is a paragraph whose quoted speech names one character
//! while its narration names the other.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, Stage};
use crate::hash;
use crate::lexicon;
use crate::models::{
    Chapter, Character, CharacterGraph, CharacterNode, RelationshipEdge, RelationshipType,
};
use crate::text;
use crate::validate;

const CUES: [(RelationshipType, &[&str]); 6] = [
    (RelationshipType::Romantic, lexicon::ROMANTIC),
    (RelationshipType::Family, lexicon::FAMILY),
    (RelationshipType::Mentor, lexicon::MENTOR),
    (RelationshipType::Rival, lexicon::RIVAL),
    (RelationshipType::Enemy, lexicon::ENEMY),
    (RelationshipType::Ally, lexicon::ALLY),
];

/// Evidence from one chapter for one pair.
#[derive(Debug, Clone)]
struct ChapterEvidence {
    chapter_id: String,
    strength: f64,
    weight: f64,
}

#[derive(Debug, Default)]
struct PairEvidence {
    chapters: Vec<ChapterEvidence>,
    cues: HashMap<RelationshipType, usize>,
}

/// Strength contributed by one chapter with `interactions` interaction cues.
pub fn chapter_strength(interactions: usize) -> f64 {
    let i = interactions as f64;
    0.25 + 0.75 * i / (i + 2.0)
}

/// Most frequent cue type; ties go to the earlier entry in
/// [`RelationshipType::PRIORITY`].
pub fn dominant_type(counts: &HashMap<RelationshipType, usize>) -> RelationshipType {
    let mut best = RelationshipType::Neutral;
    let mut best_count = 0usize;
    for ty in RelationshipType::PRIORITY {
        let count = counts.get(&ty).copied().unwrap_or(0);
        if count > best_count {
            best = ty;
            best_count = count;
        }
    }
    best
}

fn count_cues(passages: &[&str], into: &mut HashMap<RelationshipType, usize>) {
    for passage in passages {
        let words = text::words(passage);
        for (ty, lexicon) in CUES {
            let n = text::count_matches(&words, lexicon);
            if n > 0 {
                *into.entry(ty).or_default() += n;
            }
        }
    }
}

/// Build the relationship graph for a project.
pub fn build(chapters: &[Chapter], characters: &[Character]) -> Result<CharacterGraph> {
    validate::chapters(chapters, Stage::Graph)?;
    validate::cast(chapters, characters, Stage::Graph)?;

    let mut cast: Vec<(&str, Vec<String>)> = characters
        .iter()
        .map(|c| (c.id.as_str(), c.mention_names()))
        .collect();
    cast.sort_by(|a, b| a.0.cmp(b.0));

    let mut appearances: BTreeMap<&str, Vec<String>> =
        cast.iter().map(|(id, _)| (*id, Vec::new())).collect();
    let mut pairs: BTreeMap<(&str, &str), PairEvidence> = BTreeMap::new();

    for chapter in chapters {
        let body = chapter.text.as_str();
        let readable = text::is_probably_text(body);
        let present: Vec<&(&str, Vec<String>)> = cast
            .iter()
            .filter(|(id, names)| {
                chapter.character_ids.iter().any(|c| c == id)
                    || (readable && text::mentions_any(body, names))
            })
            .collect();
        for (id, _) in &present {
            if let Some(list) = appearances.get_mut(id) {
                list.push(chapter.id.clone());
            }
        }
        if present.len() < 2 {
            continue;
        }

        let sentences = if readable { text::sentences(body) } else { Vec::new() };
        let paragraphs = if readable { text::paragraphs(body) } else { Vec::new() };

        for (i, (a_id, a_names)) in present.iter().enumerate() {
            for (b_id, b_names) in present.iter().skip(i + 1) {
                let linking: Vec<&str> = sentences
                    .iter()
                    .copied()
                    .filter(|s| text::mentions_any(s, a_names) && text::mentions_any(s, b_names))
                    .collect();
                let shared: Vec<&str> = paragraphs
                    .iter()
                    .copied()
                    .filter(|p| text::mentions_any(p, a_names) && text::mentions_any(p, b_names))
                    .collect();
                let dialogue_blocks = shared
                    .iter()
                    .filter(|p| !text::dialogue(p).trim().is_empty())
                    .count();
                let addresses = shared
                    .iter()
                    .filter(|p| {
                        let spoken = text::dialogue(p);
                        let narrated = text::narration(p);
                        (text::mentions_any(&spoken, a_names) && text::mentions_any(&narrated, b_names))
                            || (text::mentions_any(&spoken, b_names)
                                && text::mentions_any(&narrated, a_names))
                    })
                    .count();
                let interactions = linking.len() + dialogue_blocks + addresses;

                let entry = pairs.entry((*a_id, *b_id)).or_default();
                entry.chapters.push(ChapterEvidence {
                    chapter_id: chapter.id.clone(),
                    strength: chapter_strength(interactions),
                    weight: 1.0 + interactions as f64,
                });
                if linking.is_empty() {
                    count_cues(&shared, &mut entry.cues);
                } else {
                    count_cues(&linking, &mut entry.cues);
                }
            }
        }
    }

    let edges: Vec<RelationshipEdge> = pairs
        .into_iter()
        .filter_map(|((from, to), evidence)| {
            let first = evidence.chapters.first()?.chapter_id.clone();
            let last = evidence.chapters.last()?.chapter_id.clone();
            let total_weight: f64 = evidence.chapters.iter().map(|e| e.weight).sum();
            let weighted: f64 = evidence
                .chapters
                .iter()
                .map(|e| e.weight * e.strength)
                .sum();
            Some(RelationshipEdge {
                from_character_id: from.to_string(),
                to_character_id: to.to_string(),
                relationship_type: dominant_type(&evidence.cues),
                strength: text::round_to(weighted / total_weight, 4),
                evidence_chapter_ids: evidence.chapters.into_iter().map(|e| e.chapter_id).collect(),
                first_seen_chapter: first,
                last_seen_chapter: last,
            })
        })
        .collect();

    let nodes: Vec<CharacterNode> = appearances
        .into_iter()
        .map(|(id, appearances)| {
            let centrality: f64 = edges
                .iter()
                .filter(|e| e.from_character_id == id || e.to_character_id == id)
                .map(|e| e.strength)
                .sum();
            CharacterNode {
                character_id: id.to_string(),
                centrality: text::round_to(centrality, 4),
                appearances,
            }
        })
        .collect();

    tracing::debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        "character graph built"
    );

    Ok(CharacterGraph {
        project_id: chapters[0].project_id.clone(),
        nodes,
        edges,
        content_hash: hash::snapshot_hash(chapters, characters),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{chapter, chapters, character};

    #[test]
    fn test_meet_fight_reconcile_yields_one_non_neutral_edge() {
        let input = chapters(&["A meets B.", "A and B fight.", "A and B reconcile."]);
        let cast = vec![character("a", "A"), character("b", "B")];
        let graph = build(&input, &cast).unwrap();
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.from_character_id, "a");
        assert_eq!(edge.to_character_id, "b");
        assert!(edge.strength > 0.0);
        assert!(matches!(
            edge.relationship_type,
            RelationshipType::Rival | RelationshipType::Ally
        ));
        assert_eq!(edge.first_seen_chapter, "ch1");
        assert_eq!(edge.last_seen_chapter, "ch3");
        assert_eq!(edge.evidence_chapter_ids, vec!["ch1", "ch2", "ch3"]);
    }

    #[test]
    fn test_rebuild_is_identical() {
        let input = chapters(&[
            "Mara taught Theo the old songs. \"Listen, Theo,\" Mara said.",
            "Theo and Mara argued about the map.",
            "Theo sat alone.",
        ]);
        let cast = vec![character("mara", "Mara"), character("theo", "Theo")];
        let a = build(&input, &cast).unwrap();
        let b = build(&input, &cast).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_edges_are_canonical_and_unique() {
        let input = chapters(&["Zed helps Amy. Amy helps Zed.", "Amy and Zed together."]);
        let cast = vec![character("zed", "Zed"), character("amy", "Amy")];
        let graph = build(&input, &cast).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from_character_id, "amy");
        assert_eq!(graph.edges[0].to_character_id, "zed");
    }

    #[test]
    fn test_strength_is_bounded_average() {
        let busy = "Ann and Bo ran. Ann and Bo hid. Ann and Bo laughed. Ann and Bo slept.";
        let input = chapters(&[busy, busy, busy, busy, busy, busy]);
        let cast = vec![character("ann", "Ann"), character("bo", "Bo")];
        let graph = build(&input, &cast).unwrap();
        let s = graph.edges[0].strength;
        assert!(s > 0.25 && s < 1.0, "strength {}", s);
        let single = build(&input[..1], &cast).unwrap();
        assert_eq!(single.edges[0].strength, s);
    }

    #[test]
    fn test_tie_prefers_priority_order() {
        let mut counts = HashMap::new();
        counts.insert(RelationshipType::Ally, 2);
        counts.insert(RelationshipType::Family, 2);
        assert_eq!(dominant_type(&counts), RelationshipType::Family);
        assert_eq!(dominant_type(&HashMap::new()), RelationshipType::Neutral);
    }

    #[test]
    fn test_centrality_sums_incident_strengths() {
        let input = chapters(&["Hub met Spoke. Hub met Rim.", "Hub kissed Spoke."]);
        let cast = vec![
            character("hub", "Hub"),
            character("spoke", "Spoke"),
            character("rim", "Rim"),
        ];
        let graph = build(&input, &cast).unwrap();
        let hub = graph.node("hub").unwrap();
        let expected: f64 = graph.edges_of("hub").map(|e| e.strength).sum();
        assert!((hub.centrality - text::round_to(expected, 4)).abs() < 1e-9);
        assert!(hub.centrality > graph.node("rim").unwrap().centrality);
        assert_eq!(
            graph.edge_between("spoke", "hub").unwrap().relationship_type,
            RelationshipType::Romantic
        );
    }

    #[test]
    fn test_unknown_cast_reference_is_invalid() {
        let mut ch = chapter(1, "Nobody here.");
        ch.character_ids = vec!["ghost".into()];
        let err = build(&[ch], &[character("a", "A")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { stage: Stage::Graph, .. }));
    }

    #[test]
    fn test_appearances_track_mentions_and_aliases() {
        let mut ada = character("ada", "Ada Lovelace");
        ada.aliases = vec!["the Countess".into()];
        let input = chapters(&["Ada wrote.", "Nothing.", "the Countess returned."]);
        let graph = build(&input, &[ada]).unwrap();
        assert_eq!(graph.node("ada").unwrap().appearances, vec!["ch1", "ch3"]);
        assert!(graph.edges.is_empty());
    }
}
