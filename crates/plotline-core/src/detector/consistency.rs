//! Character-consistency pass.
//!
//! Looks for physical attributes and traits that change between chapters with
//! no stated reason. Only the chapters in each character's evidence trail
//! (graph node `appearances`) are scanned.

use std::collections::BTreeMap;

use super::{name_matches, Finding, PassContext};
use crate::error::{Error, Result, Stage};
use crate::lexicon;
use crate::models::{Character, PlotHoleType, Severity};
use crate::text;

/// Tokens scanned after a name for attribute assertions.
const WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Attribute {
    Eyes,
    Hair,
    Skin,
    Beard,
    Handedness,
}

impl Attribute {
    fn label(&self) -> &'static str {
        match self {
            Attribute::Eyes => "eye colour",
            Attribute::Hair => "hair colour",
            Attribute::Skin => "skin",
            Attribute::Beard => "facial hair",
            Attribute::Handedness => "handedness",
        }
    }
}

const EYE_COLOURS: &[&str] = &["brown", "blue", "green", "grey", "gray", "hazel", "black", "amber", "violet"];
const HAIR_COLOURS: &[&str] = &[
    "blond", "blonde", "brown", "black", "red", "auburn", "gray", "grey", "white", "silver", "dark",
    "golden", "ginger", "brunette",
];
const SKIN_TONES: &[&str] = &["pale", "dark", "tan", "tanned", "olive", "brown", "freckled", "fair"];

const COPULAS: &[&str] = &["was", "is", "seemed", "looked", "felt", "remained", "stayed"];
const INTENSIFIERS: &[&str] = &["very", "so", "truly", "always", "really", "quite", "too", "ever", "particularly"];
const NEGATIONS: &[&str] = &["not", "never"];
const CONTRACTED_NEGATIONS: &[&str] = &["wasn't", "isn't", "wasn’t", "isn’t"];

fn canonical(value: &str) -> String {
    match value {
        "gray" => "grey".into(),
        "blonde" => "blond".into(),
        "tanned" => "tan".into(),
        other => other.into(),
    }
}

/// Attribute assertions in the window after a name.
fn attributes(window: &[String]) -> Vec<(Attribute, String)> {
    let mut found = Vec::new();
    for (i, w) in window.iter().enumerate() {
        let next = window.get(i + 1).map(String::as_str);
        let prev = i.checked_sub(1).map(|j| window[j].as_str());
        let after_copula = window.get(i + 2).map(String::as_str);

        if let Some(colour) = w.strip_suffix("-eyed") {
            if EYE_COLOURS.contains(&colour) {
                found.push((Attribute::Eyes, canonical(colour)));
            }
        }
        if let Some(colour) = w.strip_suffix("-haired") {
            if HAIR_COLOURS.contains(&colour) {
                found.push((Attribute::Hair, canonical(colour)));
            }
        }
        match w.as_str() {
            "eyes" => {
                if let Some(p) = prev.filter(|p| EYE_COLOURS.contains(p)) {
                    found.push((Attribute::Eyes, canonical(p)));
                } else if matches!(next, Some("were" | "are")) {
                    if let Some(c) = after_copula.filter(|c| EYE_COLOURS.contains(c)) {
                        found.push((Attribute::Eyes, canonical(c)));
                    }
                }
            }
            "hair" => {
                if let Some(p) = prev.filter(|p| HAIR_COLOURS.contains(p)) {
                    found.push((Attribute::Hair, canonical(p)));
                } else if matches!(next, Some("was" | "is")) {
                    if let Some(c) = after_copula.filter(|c| HAIR_COLOURS.contains(c)) {
                        found.push((Attribute::Hair, canonical(c)));
                    }
                }
            }
            "skin" => {
                if let Some(p) = prev.filter(|p| SKIN_TONES.contains(p)) {
                    found.push((Attribute::Skin, canonical(p)));
                }
            }
            "beard" | "bearded" => found.push((Attribute::Beard, "bearded".into())),
            "clean-shaven" | "beardless" => found.push((Attribute::Beard, "clean-shaven".into())),
            "left-handed" => found.push((Attribute::Handedness, "left".into())),
            "right-handed" => found.push((Attribute::Handedness, "right".into())),
            _ => {}
        }
    }
    found
}

/// Trait statements right after a name: `(trait, negated)`.
fn trait_statements(window: &[String]) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    let Some(first) = window.first() else {
        return out;
    };
    let (negated, mut i) = if CONTRACTED_NEGATIONS.contains(&first.as_str()) {
        (true, 1)
    } else if COPULAS.contains(&first.as_str()) {
        if window.get(1).map(|w| w == "no").unwrap_or(false)
            && window.get(2).map(|w| w == "longer").unwrap_or(false)
        {
            // "no longer" is a stated change.
            return out;
        }
        match window.get(1) {
            Some(w) if NEGATIONS.contains(&w.as_str()) => (true, 2),
            _ => (false, 1),
        }
    } else {
        return out;
    };
    while window.get(i).map(|w| INTENSIFIERS.contains(&w.as_str())).unwrap_or(false) {
        i += 1;
    }
    if let Some(word) = window.get(i) {
        out.push((word.clone(), negated));
    }
    out
}

fn other_names(ctx: &PassContext<'_>, character: &Character) -> Vec<String> {
    ctx.characters
        .iter()
        .filter(|c| c.id != character.id)
        .flat_map(|c| c.mention_names())
        .collect()
}

/// Tokens that hand the description over to someone or something else.
const OWNER_SHIFTS: &[&str] = &[
    "her", "his", "their", "its", "him", "them", "my", "your", "our", "the", "a", "an",
];

fn is_possessive(token: &str) -> bool {
    token.ends_with("'s") || token.ends_with("’s")
}

/// Lowercased tokens after a mention that still describe the named
/// character. Stops at another character's name, at any possessive and at
/// determiners or pronouns that introduce a different owner.
fn window_after(tokens: &[&str], end: usize, others: &[String]) -> Vec<String> {
    tokens[end.min(tokens.len())..]
        .iter()
        .take(WINDOW)
        .take_while(|t| {
            let lower = t.to_lowercase();
            if is_possessive(&lower) || OWNER_SHIFTS.contains(&lower.as_str()) {
                return false;
            }
            let capitalized = t.chars().next().map(char::is_uppercase).unwrap_or(false);
            !(capitalized && others.iter().any(|o| o.split_whitespace().next() == Some(*t)))
        })
        .map(|t| t.to_lowercase())
        .collect()
}

fn trait_vocabulary(character: &Character) -> Vec<String> {
    let mut vocab: Vec<String> = character.traits.iter().map(|t| t.to_lowercase()).collect();
    for (a, b) in lexicon::ANTONYMS {
        vocab.push(a.to_string());
        vocab.push(b.to_string());
    }
    vocab.sort();
    vocab.dedup();
    vocab
}

pub(crate) fn run(ctx: &PassContext<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let change: Vec<bool> = ctx
        .chapters
        .iter()
        .map(|c| lexicon::contains_phrase(&c.text.to_lowercase(), lexicon::CHANGE))
        .collect();
    let changed_between = |from: usize, to: usize| change[from + 1..=to].iter().any(|c| *c);

    for character in ctx.characters {
        let node = ctx.graph.node(&character.id).ok_or_else(|| {
            Error::invalid(
                Stage::Detect,
                format!("character {} missing from the character graph", character.id),
            )
        })?;
        let names = character.mention_names();
        let others = other_names(ctx, character);
        let declared: Vec<String> = character.traits.iter().map(|t| t.to_lowercase()).collect();
        let vocab = trait_vocabulary(character);

        let mut baseline: BTreeMap<Attribute, (String, usize)> = BTreeMap::new();
        let mut reported: Vec<Attribute> = Vec::new();
        let mut asserted: BTreeMap<String, usize> = BTreeMap::new();

        for chapter_id in &node.appearances {
            let Some(idx) = ctx.index_of(chapter_id) else {
                continue;
            };
            let chapter = &ctx.chapters[idx];
            if !text::is_probably_text(&chapter.text) {
                continue;
            }
            for sentence in text::sentences(&chapter.text) {
                let tokens: Vec<&str> = text::raw_words(sentence).collect();
                for name in &names {
                    for m in name_matches(&tokens, name) {
                        let window = window_after(&tokens, m.end, &others);

                        for (attr, value) in attributes(&window) {
                            match baseline.get(&attr).cloned() {
                                None => {
                                    baseline.insert(attr, (value, idx));
                                }
                                Some((prev, prev_idx)) if prev != value && prev_idx < idx => {
                                    if changed_between(prev_idx, idx) {
                                        baseline.insert(attr, (value, idx));
                                    } else if !reported.contains(&attr) {
                                        reported.push(attr);
                                        findings.push(Finding {
                                            hole_type: PlotHoleType::CharacterInconsistency,
                                            severity: Severity::Critical,
                                            description: format!(
                                                "{}'s {} is {} in chapter {} but {} in chapter {}",
                                                character.name,
                                                attr.label(),
                                                prev,
                                                ctx.chapters[prev_idx].order_index,
                                                value,
                                                chapter.order_index
                                            ),
                                            chapter_ids: vec![
                                                ctx.chapters[prev_idx].id.clone(),
                                                chapter.id.clone(),
                                            ],
                                            character_ids: vec![character.id.clone()],
                                            suggested_fix: format!(
                                                "Make {}'s {} consistent or show the change on the page.",
                                                character.name,
                                                attr.label()
                                            ),
                                        });
                                    }
                                }
                                Some(_) => {}
                            }
                        }

                        if m.possessive {
                            continue;
                        }
                        for (word, negated) in trait_statements(&window) {
                            if !vocab.contains(&word) {
                                continue;
                            }
                            if !negated {
                                asserted.entry(word.clone()).or_insert(idx);
                                let contradicts = declared
                                    .iter()
                                    .find(|d| lexicon::antonyms_of(d).contains(&word.as_str()));
                                if let (Some(d), false) = (contradicts, change[idx]) {
                                    findings.push(Finding {
                                        hole_type: PlotHoleType::CharacterInconsistency,
                                        severity: Severity::Minor,
                                        description: format!(
                                            "{} is described as {} despite being {}",
                                            character.name, word, d
                                        ),
                                        chapter_ids: vec![chapter.id.clone()],
                                        character_ids: vec![character.id.clone()],
                                        suggested_fix: "Motivate the shift or adjust the description."
                                            .into(),
                                    });
                                }
                                continue;
                            }
                            if change[idx] {
                                continue;
                            }
                            if let Some(&first) = asserted.get(&word).filter(|f| **f < idx) {
                                findings.push(Finding {
                                    hole_type: PlotHoleType::CharacterInconsistency,
                                    severity: Severity::Critical,
                                    description: format!(
                                        "{} is {} in chapter {} but not {} in chapter {}",
                                        character.name,
                                        word,
                                        ctx.chapters[first].order_index,
                                        word,
                                        chapter.order_index
                                    ),
                                    chapter_ids: vec![ctx.chapters[first].id.clone(), chapter.id.clone()],
                                    character_ids: vec![character.id.clone()],
                                    suggested_fix: "Show what changed, or remove the contradiction.".into(),
                                });
                            } else if declared.contains(&word) {
                                findings.push(Finding {
                                    hole_type: PlotHoleType::CharacterInconsistency,
                                    severity: Severity::Major,
                                    description: format!(
                                        "{} is declared {} but the text says otherwise",
                                        character.name, word
                                    ),
                                    chapter_ids: vec![chapter.id.clone()],
                                    character_ids: vec![character.id.clone()],
                                    suggested_fix: format!(
                                        "Update {}'s traits or give the change a cause.",
                                        character.name
                                    ),
                                });
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::Fixture;
    use crate::testing::{chapters, character, with_traits};

    fn run_on(texts: &[&str], cast: Vec<Character>) -> Vec<Finding> {
        run(&Fixture::new(chapters(texts), cast).context()).unwrap()
    }

    #[test]
    fn test_eye_colour_change_is_critical() {
        let f = run_on(
            &["Mara has brown eyes.", "The road was long.", "Mara has blue eyes."],
            vec![character("mara", "Mara")],
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].hole_type, PlotHoleType::CharacterInconsistency);
        assert_eq!(f[0].severity, Severity::Critical);
        assert_eq!(f[0].chapter_ids, vec!["ch1", "ch3"]);
    }

    #[test]
    fn test_stated_change_is_not_flagged() {
        let f = run_on(
            &["Mara had black hair.", "Mara dyed it at the salon.", "Mara's red hair shone."],
            vec![character("mara", "Mara")],
        );
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_window_stops_at_other_name() {
        let f = run_on(
            &["Mara met Theo, who has blue eyes.", "Mara has brown eyes."],
            vec![character("mara", "Mara"), character("theo", "Theo")],
        );
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_someone_elses_eyes_are_not_attributed() {
        let f = run_on(
            &["Mara has brown eyes.", "The road was long.", "Mara looked into her mother's blue eyes."],
            vec![character("mara", "Mara")],
        );
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_window_stops_at_possessive_and_determiner() {
        let t: Vec<&str> = text::raw_words("Mara admired Jo's green eyes.").collect();
        assert_eq!(window_after(&t, 1, &[]), vec!["admired"]);
        let t: Vec<&str> = text::raw_words("Mara saw the blue-eyed stranger.").collect();
        assert_eq!(window_after(&t, 1, &[]), vec!["saw"]);
        let t: Vec<&str> = text::raw_words("Mara, with green eyes, waited.").collect();
        assert_eq!(attributes(&window_after(&t, 1, &[])), vec![(Attribute::Eyes, "green".to_string())]);
    }

    #[test]
    fn test_negating_asserted_trait_is_critical() {
        let f = run_on(
            &["Theo was brave.", "Theo was not brave at all."],
            vec![character("theo", "Theo")],
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Critical);
    }

    #[test]
    fn test_negating_declared_trait_is_major() {
        let f = run_on(
            &["Theo was never loyal."],
            vec![with_traits(character("theo", "Theo"), &["loyal"])],
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Major);
    }

    #[test]
    fn test_no_longer_is_a_change() {
        let f = run_on(
            &["Theo was no longer loyal."],
            vec![with_traits(character("theo", "Theo"), &["loyal"])],
        );
        assert!(f.is_empty());
    }

    #[test]
    fn test_antonym_of_declared_trait_is_minor() {
        let f = run_on(
            &["Theo was so cowardly."],
            vec![with_traits(character("theo", "Theo"), &["brave"])],
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Minor);
    }

    #[test]
    fn test_missing_graph_node_fails_pass() {
        let mut fixture = Fixture::new(chapters(&["Theo."]), vec![character("theo", "Theo")]);
        fixture.graph.nodes.clear();
        assert!(run(&fixture.context()).is_err());
    }
}
