//! Input validation shared by the analysis stages.

use std::collections::HashSet;

use crate::error::{Error, Result, Stage};
use crate::hash;
use crate::models::{AnalysisKind, Chapter, Character, CharacterGraph, StoryArc};

/// Check that `chapters` is a non-empty, single-project, strictly increasing
/// and contiguous run of order indices with unique ids.
pub fn chapters(chapters: &[Chapter], stage: Stage) -> Result<()> {
    let first = chapters
        .first()
        .ok_or_else(|| Error::invalid(stage, "no chapters supplied"))?;

    let mut ids = HashSet::new();
    for (i, chapter) in chapters.iter().enumerate() {
        if chapter.project_id != first.project_id {
            return Err(Error::invalid(
                stage,
                format!(
                    "chapter {} belongs to project {}, expected {}",
                    chapter.id, chapter.project_id, first.project_id
                ),
            ));
        }
        if !ids.insert(chapter.id.as_str()) {
            return Err(Error::invalid(
                stage,
                format!("duplicate chapter id {}", chapter.id),
            ));
        }
        if i == 0 {
            continue;
        }
        let prev = chapters[i - 1].order_index;
        let cur = chapter.order_index;
        if cur == prev {
            return Err(Error::invalid(
                stage,
                format!("duplicate order index {}", cur),
            ));
        }
        if cur < prev {
            return Err(Error::invalid(
                stage,
                format!("chapters out of order: {} follows {}", cur, prev),
            ));
        }
        if cur != prev + 1 {
            return Err(Error::invalid(
                stage,
                format!("order index gap between {} and {}", prev, cur),
            ));
        }
    }
    Ok(())
}

/// Check that character ids are unique and every chapter's cast list
/// references a known character.
pub fn cast(chapters: &[Chapter], characters: &[Character], stage: Stage) -> Result<()> {
    let mut known = HashSet::new();
    for character in characters {
        if !known.insert(character.id.as_str()) {
            return Err(Error::invalid(
                stage,
                format!("duplicate character id {}", character.id),
            ));
        }
    }
    for chapter in chapters {
        let referenced = chapter
            .character_ids
            .iter()
            .chain(chapter.pov_character_id.iter());
        for id in referenced {
            if !known.contains(id.as_str()) {
                return Err(Error::invalid(
                    stage,
                    format!("chapter {} references unknown character {}", chapter.id, id),
                ));
            }
        }
    }
    Ok(())
}

/// Check that `arc` and `graph` were derived from exactly these chapters
/// and characters.
pub fn artifacts(
    chapters: &[Chapter],
    characters: &[Character],
    arc: &StoryArc,
    graph: &CharacterGraph,
    stage: Stage,
) -> Result<()> {
    let chapters_hash = hash::chapters_hash(chapters);
    if arc.content_hash != chapters_hash {
        return Err(Error::StaleInput {
            stage,
            artifact: AnalysisKind::StoryArc,
            expected: chapters_hash,
            found: arc.content_hash.clone(),
        });
    }
    let snapshot_hash = hash::snapshot_hash(chapters, characters);
    if graph.content_hash != snapshot_hash {
        return Err(Error::StaleInput {
            stage,
            artifact: AnalysisKind::CharacterGraph,
            expected: snapshot_hash,
            found: graph.content_hash.clone(),
        });
    }
    Ok(())
}
