//! Per-chapter pacing.
//!
//! Faster pacing means shorter sentences, shorter paragraphs, and a word
//! count below the trailing rolling average.

use crate::models::{Chapter, PacingPoint};
use crate::text;

const W_LENGTH: f64 = 0.40;
const W_SENTENCE: f64 = 0.35;
const W_PARAGRAPH: f64 = 0.25;

/// Pace reported for chapters with no usable signal.
pub const NEUTRAL_PACE: f64 = 50.0;

fn has_signal(body: &str) -> bool {
    text::is_probably_text(body) && text::word_count(body) > 0
}

/// Pace score for one chapter given the rolling average word count.
pub fn score(body: &str, word_count: u32, rolling_average: f64) -> f64 {
    if !has_signal(body) {
        return NEUTRAL_PACE;
    }
    let length = if rolling_average > 0.0 {
        (1.5 - word_count as f64 / rolling_average).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let sentence_lengths: Vec<f64> = text::sentences(body)
        .iter()
        .map(|s| text::word_count(s) as f64)
        .collect();
    let (mean_sentence, _) = text::mean_and_cv(&sentence_lengths);
    let sentence = ((25.0 - mean_sentence) / 20.0).clamp(0.0, 1.0);

    let paragraph_lengths: Vec<f64> = text::paragraphs(body)
        .iter()
        .map(|p| text::word_count(p) as f64)
        .collect();
    let (mean_paragraph, _) = text::mean_and_cv(&paragraph_lengths);
    let paragraph = ((120.0 - mean_paragraph) / 100.0).clamp(0.0, 1.0);

    let raw = W_LENGTH * length + W_SENTENCE * sentence + W_PARAGRAPH * paragraph;
    text::round_to((raw * 100.0).clamp(0.0, 100.0), 1)
}

/// Pacing points for an ordered chapter run.
///
/// The rolling average for chapter *i* covers the last `window` chapters with
/// signal, up to and including *i*.
pub fn points(chapters: &[Chapter], window: usize) -> Vec<PacingPoint> {
    let window = window.max(1);
    let mut recent: Vec<f64> = Vec::with_capacity(window);
    chapters
        .iter()
        .map(|chapter| {
            let body = chapter.text.as_str();
            let pace = if has_signal(body) {
                if recent.len() == window {
                    recent.remove(0);
                }
                recent.push(chapter.word_count as f64);
                let avg = recent.iter().sum::<f64>() / recent.len() as f64;
                score(body, chapter.word_count, avg)
            } else {
                NEUTRAL_PACE
            };
            PacingPoint {
                chapter_order_index: chapter.order_index,
                pace_score: pace,
                word_count: chapter.word_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::chapters;

    #[test]
    fn test_short_sentences_are_faster() {
        let fast = score("He ran. She hid. It broke. They left.", 8, 8.0);
        let slow = score(
            "The long afternoon stretched out before them like a slow river winding through the valley, carrying with it the memories of every summer they had spent together in that small and sleepy town.",
            36,
            36.0,
        );
        assert!(fast > slow, "fast {} slow {}", fast, slow);
    }

    #[test]
    fn test_above_average_length_slows_pace() {
        let body = "He ran. She hid.";
        assert!(score(body, 100, 200.0) > score(body, 400, 200.0));
    }

    #[test]
    fn test_zero_signal_is_neutral() {
        assert_eq!(score("\0\0\0", 0, 10.0), NEUTRAL_PACE);
        let pts = points(&chapters(&["", "Words here."]), 5);
        assert_eq!(pts[0].pace_score, NEUTRAL_PACE);
        assert_ne!(pts[1].pace_score, NEUTRAL_PACE);
    }

    #[test]
    fn test_points_follow_order() {
        let pts = points(&chapters(&["One two.", "Three four five.", "Six."]), 2);
        let orders: Vec<u32> = pts.iter().map(|p| p.chapter_order_index).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(pts.iter().all(|p| (0.0..=100.0).contains(&p.pace_score)));
    }
}
