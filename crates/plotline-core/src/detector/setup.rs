//! Unresolved-setup pass.
//!
//! A setup is a sentence carrying a promise, prophecy or open question. It is
//! resolved when a later chapter picks up at least `min(2, keys)` of its key
//! content words.

use std::collections::HashSet;

use super::{Finding, PassContext};
use crate::error::Result;
use crate::lexicon;
use crate::models::{PlotHoleType, Severity};
use crate::provider::truncate_chars;
use crate::text;

/// Key terms kept per setup sentence.
const MAX_KEYS: usize = 4;

fn key_terms(sentence: &str, excluded: &HashSet<String>) -> Vec<String> {
    text::content_words(sentence)
        .into_iter()
        .filter(|w| !excluded.contains(w))
        .filter(|w| {
            !lexicon::SETUP_STRONG
                .iter()
                .chain(lexicon::SETUP_WEAK)
                .any(|m| text::matches_stem(w, m))
        })
        .take(MAX_KEYS)
        .collect()
}

fn resolved_in(words: &[String], keys: &[String]) -> bool {
    let needed = keys.len().min(2);
    let hits = keys
        .iter()
        .filter(|k| words.iter().any(|w| text::matches_stem(w, k)))
        .count();
    hits >= needed
}

pub(crate) fn run(ctx: &PassContext<'_>) -> Result<Vec<Finding>> {
    let excluded: HashSet<String> = ctx
        .characters
        .iter()
        .flat_map(|c| c.mention_names())
        .flat_map(|n| {
            n.split_whitespace()
                .map(|t| t.to_lowercase())
                .collect::<Vec<_>>()
        })
        .collect();

    let chapter_words: Vec<Vec<String>> = ctx
        .chapters
        .iter()
        .map(|c| {
            if text::is_probably_text(&c.text) {
                text::words(&c.text)
            } else {
                Vec::new()
            }
        })
        .collect();
    let last = ctx.chapters.len().saturating_sub(1);

    let mut findings = Vec::new();
    for (idx, chapter) in ctx.chapters.iter().enumerate() {
        if chapter_words[idx].is_empty() {
            continue;
        }
        for sentence in text::sentences(&chapter.text) {
            let lower = sentence.to_lowercase();
            let strong = lexicon::contains_phrase(&lower, lexicon::SETUP_STRONG);
            let weak = !strong && lexicon::contains_phrase(&lower, lexicon::SETUP_WEAK);
            if !strong && !weak {
                continue;
            }
            let keys = key_terms(sentence, &excluded);
            if keys.is_empty() {
                continue;
            }
            if chapter_words[idx + 1..]
                .iter()
                .any(|words| resolved_in(words, &keys))
            {
                continue;
            }

            let severity = if idx == last {
                Severity::Info
            } else if strong {
                Severity::Major
            } else {
                Severity::Minor
            };
            let character_ids: Vec<String> = ctx
                .characters
                .iter()
                .filter(|c| text::mentions_any(sentence, &c.mention_names()))
                .map(|c| c.id.clone())
                .collect();
            let description = if idx == last {
                format!(
                    "Chapter {} ends on an open thread: \"{}\"",
                    chapter.order_index,
                    truncate_chars(sentence, 120)
                )
            } else {
                format!(
                    "Setup in chapter {} is never paid off: \"{}\" (key terms: {})",
                    chapter.order_index,
                    truncate_chars(sentence, 120),
                    keys.join(", ")
                )
            };
            findings.push(Finding {
                hole_type: PlotHoleType::UnresolvedSetup,
                severity,
                description,
                chapter_ids: vec![chapter.id.clone()],
                character_ids,
                suggested_fix: "Resolve this thread in a later chapter, or cut the setup.".into(),
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

    fn run_on(texts: &[&str]) -> Vec<Finding> {
        let fixture = Fixture::new(chapters(texts), vec![character("lena", "Lena")]);
        run(&fixture.context()).unwrap()
    }

    #[test]
    fn test_unpaid_promise_is_major() {
        let f = run_on(&[
            "Lena promised to return the silver key to her brother.",
            "The harvest came.",
            "Winter was cold.",
        ]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Major);
        assert_eq!(f[0].character_ids, vec!["lena"]);
    }

    #[test]
    fn test_resolution_in_later_chapter() {
        let f = run_on(&[
            "Lena promised to return the silver key to her brother.",
            "At last her brother held the silver key again.",
            "Winter was cold.",
        ]);
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_weak_marker_is_minor() {
        let f = run_on(&["A mysterious letter arrived at the lighthouse.", "Fish were caught."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Minor);
    }

    #[test]
    fn test_final_chapter_setup_is_info() {
        let f = run_on(&["Morning.", "Lena vowed to find the hidden library."]);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Info);
    }

    #[test]
    fn test_key_terms_exclude_names_and_markers() {
        let excluded: HashSet<String> = ["lena".to_string()].into_iter().collect();
        let keys = key_terms("Lena promised to return the silver key.", &excluded);
        assert_eq!(keys, vec!["return", "silver"]);
    }
}
