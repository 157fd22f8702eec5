//! Timeline pass: stated ages against manuscript order, and characters who
//! act after their death.

use std::collections::BTreeMap;

use super::{Finding, PassContext};
use crate::error::Result;
use crate::lexicon;
use crate::models::{PlotHoleType, Severity};
use crate::text;

/// Age jump (years) that needs a stated time skip.
const UNEXPLAINED_JUMP_YEARS: f64 = 5.0;

/// Words after a number that mean it is not an age.
const NON_AGE_UNITS: &[&str] = &[
    "minutes", "minute", "hours", "hour", "days", "day", "weeks", "week", "months", "month",
    "feet", "foot", "miles", "mile", "meters", "inches", "pounds", "dollars", "times", "percent",
    "o'clock", "of", "steps", "blocks", "yards",
];

/// Words after `<n> years` that make the number a difference, not an age.
const COMPARATIVES: &[&str] = &["older", "younger", "ago", "before", "after", "earlier", "later"];

const AGE_VERBS: &[&str] = &["was", "is", "turned", "turns"];

const DEATH_AFTER: &[&[&str]] = &[
    &["died"],
    &["dies"],
    &["was", "killed"],
    &["was", "murdered"],
    &["was", "dead"],
    &["is", "dead"],
    &["lay", "dead"],
    &["passed", "away"],
];

const ACTION_VERBS: &[&str] = &[
    "said", "says", "asked", "replied", "shouted", "whispered", "laughed", "smiled", "nodded",
    "walked", "ran", "entered", "arrived", "took", "grabbed", "looked", "opened", "stood",
    "answered", "waved",
];

#[derive(Debug, Clone, Copy)]
struct AgeObservation {
    chapter: usize,
    age: u32,
}

/// Elapsed time stated in one chapter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TimeCue {
    /// Explicit years (`three years later`, `six months later`).
    pub years: f64,
    /// A jump without an amount (`years later`, `decades later`).
    pub unspecified: bool,
}

pub(crate) fn time_cue(body: &str) -> TimeCue {
    let words = text::words(body);
    let mut cue = TimeCue::default();
    for (i, w) in words.iter().enumerate() {
        if w != "later" && w != "after" && w != "passed" {
            continue;
        }
        let Some(unit) = i.checked_sub(1).map(|j| words[j].as_str()) else {
            continue;
        };
        let scale = match unit {
            "year" | "years" => 1.0,
            "month" | "months" => 1.0 / 12.0,
            "decade" | "decades" => 10.0,
            _ => continue,
        };
        let amount = i
            .checked_sub(2)
            .and_then(|j| text::parse_number(&words[j]));
        match amount {
            Some(n) => cue.years += n as f64 * scale,
            None => cue.unspecified = true,
        }
    }
    cue
}

/// The age stated right around a name occurrence, if any.
fn age_at(tokens: &[&str], start: usize, end: usize) -> Option<u32> {
    let lower = |i: usize| tokens.get(i).map(|t| t.to_lowercase());

    // "34-year-old Ada", "thirty-four-year-old Ada"
    if let Some(prev) = start.checked_sub(1).and_then(lower) {
        if let Some(num) = prev.strip_suffix("-year-old") {
            return text::parse_number(num);
        }
    }

    let next = lower(end)?;
    // "Ada, aged 34" / "Ada, age 34"
    if next == "aged" || next == "age" {
        return lower(end + 1).and_then(|n| text::parse_number(&n));
    }
    // "Ada was 34", "Ada turned thirty-four"
    if AGE_VERBS.contains(&next.as_str()) {
        let candidate = lower(end + 1)?;
        if candidate == "a" || candidate == "an" {
            return None;
        }
        let age = text::parse_number(&candidate)?;
        if let Some(unit) = lower(end + 2) {
            if NON_AGE_UNITS.contains(&unit.as_str()) {
                return None;
            }
            // "Ada was 2 years older than her brother"
            if matches!(unit.as_str(), "years" | "year" | "months" | "month")
                && lower(end + 3).is_some_and(|w| COMPARATIVES.contains(&w.as_str()))
            {
                return None;
            }
        }
        return Some(age);
    }
    None
}

fn follows(tokens: &[&str], at: usize, phrase: &[&str]) -> bool {
    phrase
        .iter()
        .enumerate()
        .all(|(k, p)| tokens.get(at + k).map(|t| t.eq_ignore_ascii_case(p)).unwrap_or(false))
}

pub(crate) fn run(ctx: &PassContext<'_>) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    let cues: Vec<TimeCue> = ctx.chapters.iter().map(|c| time_cue(&c.text)).collect();
    let flashback: Vec<bool> = ctx
        .chapters
        .iter()
        .map(|c| lexicon::contains_phrase(&c.text.to_lowercase(), lexicon::FLASHBACK))
        .collect();

    for character in ctx.characters {
        let names = character.mention_names();
        let mut ages: BTreeMap<usize, AgeObservation> = BTreeMap::new();
        let mut death: Option<usize> = None;
        let mut acts_after_death: Option<usize> = None;

        for (idx, chapter) in ctx.chapters.iter().enumerate() {
            if !text::is_probably_text(&chapter.text) || !text::mentions_any(&chapter.text, &names) {
                continue;
            }
            for sentence in text::sentences(&chapter.text) {
                let tokens: Vec<&str> = text::raw_words(sentence).collect();
                for name in &names {
                    for m in super::name_matches(&tokens, name) {
                        if !ages.contains_key(&idx) {
                            if let Some(age) = age_at(&tokens, m.start, m.end) {
                                ages.insert(idx, AgeObservation { chapter: idx, age });
                            }
                        }
                        if m.possessive {
                            continue;
                        }
                        match death {
                            None => {
                                if DEATH_AFTER.iter().any(|p| follows(&tokens, m.end, p)) {
                                    death = Some(idx);
                                }
                            }
                            Some(d) if idx > d && acts_after_death.is_none() && !flashback[idx] => {
                                let acts = tokens
                                    .get(m.end)
                                    .map(|t| ACTION_VERBS.contains(&t.to_lowercase().as_str()))
                                    .unwrap_or(false);
                                if acts {
                                    acts_after_death = Some(idx);
                                }
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        let mut baseline: Option<AgeObservation> = None;
        for obs in ages.values().copied() {
            let Some(prev) = baseline else {
                baseline = Some(obs);
                continue;
            };
            let window = &cues[prev.chapter + 1..=obs.chapter];
            let elapsed: f64 = window.iter().map(|c| c.years).sum();
            let skipped = window.iter().any(|c| c.unspecified);
            let (from, to) = (
                ctx.chapters[prev.chapter].id.clone(),
                ctx.chapters[obs.chapter].id.clone(),
            );

            if obs.age < prev.age {
                if flashback[obs.chapter] {
                    continue;
                }
                findings.push(Finding {
                    hole_type: PlotHoleType::TimelineInconsistency,
                    severity: Severity::Critical,
                    description: format!(
                        "{} is {} in chapter {} but {} in later chapter {}",
                        character.name,
                        prev.age,
                        ctx.chapters[prev.chapter].order_index,
                        obs.age,
                        ctx.chapters[obs.chapter].order_index
                    ),
                    chapter_ids: vec![from, to],
                    character_ids: vec![character.id.clone()],
                    suggested_fix: "Correct one of the stated ages, or mark the later scene as a flashback."
                        .into(),
                });
            } else if elapsed > 0.0 {
                let expected = prev.age as f64 + elapsed;
                if (obs.age as f64 - expected).abs() > 1.0 {
                    findings.push(Finding {
                        hole_type: PlotHoleType::TimelineInconsistency,
                        severity: Severity::Major,
                        description: format!(
                            "{} ages from {} to {} although about {:.0} years pass",
                            character.name, prev.age, obs.age, elapsed
                        ),
                        chapter_ids: vec![from, to],
                        character_ids: vec![character.id.clone()],
                        suggested_fix: "Align the stated ages with the time that passes between these chapters."
                            .into(),
                    });
                }
            } else if (obs.age - prev.age) as f64 > UNEXPLAINED_JUMP_YEARS && !skipped {
                findings.push(Finding {
                    hole_type: PlotHoleType::TimelineInconsistency,
                    severity: Severity::Minor,
                    description: format!(
                        "{} ages from {} to {} with no stated passage of time",
                        character.name, prev.age, obs.age
                    ),
                    chapter_ids: vec![from, to],
                    character_ids: vec![character.id.clone()],
                    suggested_fix: "Add a time marker (e.g. \"years later\") between these chapters.".into(),
                });
            }
            baseline = Some(obs);
        }

        if let (Some(d), Some(a)) = (death, acts_after_death) {
            findings.push(Finding {
                hole_type: PlotHoleType::TimelineInconsistency,
                severity: Severity::Major,
                description: format!(
                    "{} dies in chapter {} but acts in chapter {}",
                    character.name, ctx.chapters[d].order_index, ctx.chapters[a].order_index
                ),
                chapter_ids: vec![ctx.chapters[d].id.clone(), ctx.chapters[a].id.clone()],
                character_ids: vec![character.id.clone()],
                suggested_fix: "Frame the later appearance as memory, or revise the death.".into(),
            });
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::Fixture;
    use crate::testing::{chapters, character};

    fn findings(texts: &[&str]) -> Vec<Finding> {
        let fixture = Fixture::new(chapters(texts), vec![character("ada", "Ada")]);
        run(&fixture.context()).unwrap()
    }

    #[test]
    fn test_time_cue_parsing() {
        assert_eq!(time_cue("Three years later, the war ended.").years, 3.0);
        assert_eq!(time_cue("Six months later").years, 0.5);
        assert!(time_cue("Years later, she returned.").unspecified);
        assert_eq!(time_cue("Nothing happened."), TimeCue::default());
    }

    #[test]
    fn test_age_patterns() {
        let t: Vec<&str> = text::raw_words("The 34-year-old Ada smiled.").collect();
        assert_eq!(age_at(&t, 2, 3), Some(34));
        let t: Vec<&str> = text::raw_words("Ada was thirty-four.").collect();
        assert_eq!(age_at(&t, 0, 1), Some(34));
        let t: Vec<&str> = text::raw_words("Ada was ten minutes late.").collect();
        assert_eq!(age_at(&t, 0, 1), None);
        let t: Vec<&str> = text::raw_words("Ada was a doctor.").collect();
        assert_eq!(age_at(&t, 0, 1), None);
    }

    #[test]
    fn test_age_difference_is_not_an_age() {
        let t: Vec<&str> = text::raw_words("Ada was 2 years older than her brother.").collect();
        assert_eq!(age_at(&t, 0, 1), None);
        let t: Vec<&str> = text::raw_words("Ada was three years younger.").collect();
        assert_eq!(age_at(&t, 0, 1), None);
        let t: Vec<&str> = text::raw_words("Ada was 40 steps from the door.").collect();
        assert_eq!(age_at(&t, 0, 1), None);
        let t: Vec<&str> = text::raw_words("Ada was 30 years old.").collect();
        assert_eq!(age_at(&t, 0, 1), Some(30));
    }

    #[test]
    fn test_relative_age_does_not_contradict_stated_age() {
        let f = findings(&["Ada was 40 that winter.", "The snow melted.", "Ada was 2 years older than her brother."]);
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_age_decrease_is_critical() {
        let f = findings(&["Ada was 34.", "Rain fell.", "Ada was 30 years old now."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Critical);
        assert_eq!(f[0].chapter_ids, vec!["ch1", "ch3"]);
    }

    #[test]
    fn test_flashback_excuses_younger_age() {
        let f = findings(&["Ada was 34.", "She remembered when Ada was 12."]);
        assert!(f.is_empty());
    }

    #[test]
    fn test_explicit_elapsed_mismatch_is_major() {
        let f = findings(&["Ada was 20.", "Two years later, Ada was 40."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Major);
    }

    #[test]
    fn test_consistent_elapsed_time_is_clean() {
        assert!(findings(&["Ada was 20.", "Two years later, Ada was 22."]).is_empty());
    }

    #[test]
    fn test_unexplained_jump_is_minor() {
        let f = findings(&["Ada was 20.", "Ada was 31."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Minor);
        assert!(findings(&["Ada was 20.", "Years later, Ada was 31."]).is_empty());
    }

    #[test]
    fn test_dead_character_acting_is_major() {
        let f = findings(&["Ada died in the fire.", "Morning came.", "Ada said hello."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Major);
        assert_eq!(f[0].chapter_ids, vec!["ch1", "ch3"]);
    }
}
