//! Point-of-view pass.
//!
//! Compares the pronoun profile of each chapter's narration (text outside
//! quotation marks) with the project's declared POV mode, and flags interior
//! access to non-viewpoint characters in third-limited projects.

use super::{name_matches, Finding, PassContext};
use crate::error::Result;
use crate::lexicon;
use crate::models::{PlotHoleType, PovMode, Severity};
use crate::text;

const FIRST: &[&str] = &["i", "me", "my", "mine", "myself", "we", "us", "our", "ours", "ourselves"];
const SECOND: &[&str] = &["you", "your", "yours", "yourself", "yourselves"];
const THIRD: &[&str] = &[
    "he", "she", "him", "her", "his", "hers", "himself", "herself", "they", "them", "their",
];

/// Narration pronouns needed before a chapter is judged.
const MIN_PRONOUNS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Profile {
    pub first: usize,
    pub second: usize,
    pub third: usize,
}

impl Profile {
    pub fn of(narration: &str) -> Self {
        let mut p = Profile::default();
        for w in text::words(narration) {
            if FIRST.contains(&w.as_str()) {
                p.first += 1;
            } else if SECOND.contains(&w.as_str()) {
                p.second += 1;
            } else if THIRD.contains(&w.as_str()) {
                p.third += 1;
            }
        }
        p
    }

    fn total(&self) -> usize {
        self.first + self.second + self.third
    }

    fn share(&self, n: usize) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            n as f64 / self.total() as f64
        }
    }
}

fn mode_label(mode: PovMode) -> &'static str {
    match mode {
        PovMode::FirstPerson => "first person",
        PovMode::SecondPerson => "second person",
        PovMode::ThirdLimited => "third person limited",
        PovMode::ThirdOmniscient => "third person omniscient",
    }
}

/// Severity of a voice mismatch, if any.
fn voice_mismatch(mode: PovMode, p: &Profile) -> Option<(Severity, &'static str)> {
    match mode {
        PovMode::FirstPerson => {
            if p.first == 0 {
                Some((Severity::Major, "narrated entirely without first-person pronouns"))
            } else if p.share(p.first) < 0.1 {
                Some((Severity::Minor, "drifts away from first-person narration"))
            } else {
                None
            }
        }
        PovMode::SecondPerson => {
            if p.second == 0 {
                Some((Severity::Major, "narrated without second-person address"))
            } else if p.share(p.second) < 0.1 {
                Some((Severity::Minor, "drifts away from second-person narration"))
            } else {
                None
            }
        }
        PovMode::ThirdLimited | PovMode::ThirdOmniscient => {
            if p.share(p.first) > 0.5 {
                Some((Severity::Major, "narrated in the first person"))
            } else if p.first >= 3 && p.share(p.first) > 0.15 {
                Some((Severity::Minor, "slips into first-person narration"))
            } else {
                None
            }
        }
    }
}

pub(crate) fn run(ctx: &PassContext<'_>) -> Result<Vec<Finding>> {
    let Some(mode) = ctx.pov_mode else {
        return Ok(Vec::new());
    };
    let mut findings = Vec::new();

    for chapter in ctx.chapters {
        if !text::is_probably_text(&chapter.text) {
            continue;
        }
        let narration = text::narration(&chapter.text);
        let profile = Profile::of(&narration);

        if profile.total() >= MIN_PRONOUNS {
            if let Some((severity, what)) = voice_mismatch(mode, &profile) {
                findings.push(Finding {
                    hole_type: PlotHoleType::PovError,
                    severity,
                    description: format!(
                        "Chapter {} is {} in a {} project",
                        chapter.order_index,
                        what,
                        mode_label(mode)
                    ),
                    chapter_ids: vec![chapter.id.clone()],
                    character_ids: Vec::new(),
                    suggested_fix: format!("Rewrite the narration in {}.", mode_label(mode)),
                });
            }
        }

        if mode != PovMode::SecondPerson && (1..=3).contains(&profile.second) && profile.share(profile.second) < 0.1 {
            findings.push(Finding {
                hole_type: PlotHoleType::PovError,
                severity: Severity::Info,
                description: format!(
                    "Chapter {} addresses the reader directly in narration",
                    chapter.order_index
                ),
                chapter_ids: vec![chapter.id.clone()],
                character_ids: Vec::new(),
                suggested_fix: "Check whether the direct address is intentional.".into(),
            });
        }

        if mode == PovMode::ThirdLimited {
            let Some(pov_id) = chapter.pov_character_id.as_deref() else {
                continue;
            };
            for other in ctx.characters.iter().filter(|c| c.id != pov_id) {
                let names = other.mention_names();
                let hopped = text::sentences(&narration).into_iter().any(|sentence| {
                    let tokens: Vec<&str> = text::raw_words(sentence).collect();
                    names.iter().any(|name| {
                        name_matches(&tokens, name).iter().any(|m| {
                            !m.possessive
                                && tokens
                                    .get(m.end)
                                    .map(|t| {
                                        lexicon::INTERIOR.contains(&t.to_lowercase().as_str())
                                    })
                                    .unwrap_or(false)
                        })
                    })
                });
                if hopped {
                    findings.push(Finding {
                        hole_type: PlotHoleType::PovError,
                        severity: Severity::Minor,
                        description: format!(
                            "Chapter {} reports {}'s thoughts outside the viewpoint character",
                            chapter.order_index, other.name
                        ),
                        chapter_ids: vec![chapter.id.clone()],
                        character_ids: vec![pov_id.to_string(), other.id.clone()],
                        suggested_fix: "Show the reaction through the viewpoint character instead."
                            .into(),
                    });
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
    use crate::models::Chapter;
    use crate::testing::{chapters, character};

    fn run_with(mode: Option<PovMode>, chapters: Vec<Chapter>) -> Vec<Finding> {
        let mut fixture = Fixture::new(chapters, vec![character("ana", "Ana"), character("ben", "Ben")]);
        fixture.pov_mode = mode;
        run(&fixture.context()).unwrap()
    }

    #[test]
    fn test_skipped_without_declared_pov() {
        let f = run_with(None, chapters(&["I went. I saw. I came. I left. My hat. My coat."]));
        assert!(f.is_empty());
    }

    #[test]
    fn test_first_person_chapter_in_third_person_project() {
        let f = run_with(
            Some(PovMode::ThirdOmniscient),
            chapters(&[
                "She walked in. He followed her. They sat.",
                "I walked in. I saw my brother. I sat by my window and I waited.",
            ]),
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Major);
        assert_eq!(f[0].chapter_ids, vec!["ch2"]);
    }

    #[test]
    fn test_dialogue_does_not_count_as_narration() {
        let f = run_with(
            Some(PovMode::ThirdLimited),
            chapters(&["\"I think I will go, I must,\" she said. He nodded. She left. They waited for her."]),
        );
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn test_head_hopping_is_minor() {
        let mut chs = chapters(&["Ana watched the door. Ben wondered if she knew."]);
        chs[0].pov_character_id = Some("ana".into());
        let f = run_with(Some(PovMode::ThirdLimited), chs);
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Minor);
        assert_eq!(f[0].character_ids, vec!["ana", "ben"]);
    }

    #[test]
    fn test_sporadic_reader_address_is_info() {
        let f = run_with(
            Some(PovMode::ThirdOmniscient),
            chapters(&[
                "She ran. He ran. She hid. He hid. They waited. She listened. He slept. She woke. He left. She stayed. You know how it goes.",
            ]),
        );
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Info);
    }
}
