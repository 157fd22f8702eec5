//! Content hashes and plot-hole fingerprints.
//!
//! All hashes are lowercase hex SHA-256. Fields are length-prefixed before
//! hashing so that `("ab", "c")` and `("a", "bc")` never collide.
//!
//! | Function | Covers | Used for |
//! |----------|--------|----------|
//! | [`chapters_hash`] | chapter ids, order, word count, text, last-modified | `story-arc` |
//! | [`snapshot_hash`] | chapters + characters | every other analysis kind |
//! | [`plot_hole_fingerprint`] | hole type, sorted chapter ids, sorted character ids | dismissal |

use sha2::{Digest, Sha256};

use crate::models::{Chapter, Character, PlotHoleType};

fn feed(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// SHA-256 of a single string, as hex.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn feed_chapters(hasher: &mut Sha256, chapters: &[Chapter]) {
    feed(hasher, "chapters");
    for chapter in chapters {
        feed(hasher, &chapter.id);
        feed(hasher, &chapter.order_index.to_string());
        feed(hasher, &chapter.word_count.to_string());
        feed(hasher, &sha256_hex(&chapter.text));
        feed(hasher, &chapter.last_modified_at.timestamp_millis().to_string());
        for id in &chapter.character_ids {
            feed(hasher, id);
        }
        feed(hasher, chapter.pov_character_id.as_deref().unwrap_or(""));
    }
}

/// Hash of the chapter set an arc was computed from.
pub fn chapters_hash(chapters: &[Chapter]) -> String {
    let mut hasher = Sha256::new();
    feed_chapters(&mut hasher, chapters);
    format!("{:x}", hasher.finalize())
}

/// Hash of the full chapter + character snapshot.
pub fn snapshot_hash(chapters: &[Chapter], characters: &[Character]) -> String {
    let mut hasher = Sha256::new();
    feed_chapters(&mut hasher, chapters);
    feed(&mut hasher, "characters");
    for character in characters {
        feed(&mut hasher, &character.id);
        feed(&mut hasher, &character.name);
        feed(&mut hasher, &format!("{:?}", character.role));
        for t in &character.traits {
            feed(&mut hasher, t);
        }
        feed(&mut hasher, "|");
        for alias in &character.aliases {
            feed(&mut hasher, alias);
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Stable identity of a plot hole across recomputation.
///
/// Independent of input order and duplicates in the id lists.
pub fn plot_hole_fingerprint(
    hole_type: PlotHoleType,
    chapter_ids: &[String],
    character_ids: &[String],
) -> String {
    let mut chapters: Vec<&str> = chapter_ids.iter().map(String::as_str).collect();
    chapters.sort_unstable();
    chapters.dedup();
    let mut characters: Vec<&str> = character_ids.iter().map(String::as_str).collect();
    characters.sort_unstable();
    characters.dedup();

    let mut hasher = Sha256::new();
    feed(&mut hasher, hole_type.as_str());
    feed(&mut hasher, "chapters");
    for id in chapters {
        feed(&mut hasher, id);
    }
    feed(&mut hasher, "characters");
    for id in characters {
        feed(&mut hasher, id);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chapter, character};

    #[test]
    fn test_fingerprint_ignores_order_and_duplicates() {
        let a = plot_hole_fingerprint(
            PlotHoleType::Contradiction,
            &["c2".into(), "c1".into()],
            &["x".into()],
        );
        let b = plot_hole_fingerprint(
            PlotHoleType::Contradiction,
            &["c1".into(), "c2".into(), "c1".into()],
            &["x".into()],
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_type() {
        let ids = vec!["c1".to_string()];
        assert_ne!(
            plot_hole_fingerprint(PlotHoleType::PovError, &ids, &[]),
            plot_hole_fingerprint(PlotHoleType::UnresolvedSetup, &ids, &[])
        );
    }

    #[test]
    fn test_chapters_hash_changes_with_text() {
        let a = vec![chapter(1, "The door was locked.")];
        let mut b = a.clone();
        b[0].text.push_str(" It opened.");
        assert_ne!(chapters_hash(&a), chapters_hash(&b));
        assert_eq!(chapters_hash(&a), chapters_hash(&a.clone()));
    }

    #[test]
    fn test_snapshot_hash_covers_characters() {
        let chapters = vec![chapter(1, "Ada waited.")];
        let one = vec![character("ada", "Ada")];
        let mut two = one.clone();
        two[0].traits.insert("patient".into());
        assert_ne!(snapshot_hash(&chapters, &one), snapshot_hash(&chapters, &two));
        assert_ne!(chapters_hash(&chapters), snapshot_hash(&chapters, &one));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let mut a = chapter(1, "x");
        a.id = "ab".into();
        a.project_id = "p".into();
        let mut b = a.clone();
        b.id = "a".into();
        b.character_ids = vec!["b".into()];
        assert_ne!(chapters_hash(&[a]), chapters_hash(&[b]));
    }
}
