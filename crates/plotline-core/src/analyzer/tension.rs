//! Per-chapter tension and emotional valence.

use crate::lexicon;
use crate::models::{EmotionalValence, TensionPoint};
use crate::text;

/// Lexicon density at which intensity saturates.
const INTENSITY_SATURATION: f64 = 0.05;
/// Scene breaks at which the break signal saturates.
const BREAK_SATURATION: f64 = 3.0;

const W_INTENSITY: f64 = 0.45;
const W_DIALOGUE: f64 = 0.20;
const W_VARIANCE: f64 = 0.20;
const W_BREAKS: f64 = 0.15;

/// Tension reported for chapters with no usable signal.
pub const NEUTRAL_TENSION: f64 = 50.0;

/// Raw signals behind one chapter's tension score.
#[derive(Debug, Clone, PartialEq)]
pub struct TensionSignals {
    pub intensity: f64,
    pub dialogue: f64,
    pub variance: f64,
    pub scene_breaks: f64,
}

impl TensionSignals {
    pub fn score(&self) -> f64 {
        let raw = W_INTENSITY * self.intensity
            + W_DIALOGUE * self.dialogue
            + W_VARIANCE * self.variance
            + W_BREAKS * self.scene_breaks;
        text::round_to((raw * 100.0).clamp(0.0, 100.0), 1)
    }
}

/// Extract tension signals, or `None` when the text carries no signal.
pub fn signals(body: &str) -> Option<TensionSignals> {
    if !text::is_probably_text(body) {
        return None;
    }
    let words = text::words(body);
    if words.is_empty() {
        return None;
    }
    let wc = words.len() as f64;

    let action = text::count_matches(&words, lexicon::ACTION) as f64;
    let exclamations = body.matches('!').count() as f64;
    let intensity = (((action + exclamations) / wc) / INTENSITY_SATURATION).min(1.0);

    let lengths: Vec<f64> = text::sentences(body)
        .iter()
        .map(|s| text::word_count(s) as f64)
        .filter(|n| *n > 0.0)
        .collect();
    let (_, cv) = text::mean_and_cv(&lengths);

    Some(TensionSignals {
        intensity,
        dialogue: text::dialogue_ratio(body),
        variance: cv.min(1.0),
        scene_breaks: (text::scene_breaks(body) as f64 / BREAK_SATURATION).min(1.0),
    })
}

pub fn valence(body: &str) -> EmotionalValence {
    if !text::is_probably_text(body) {
        return EmotionalValence::Neutral;
    }
    let words = text::words(body);
    let pos = text::count_matches(&words, lexicon::POSITIVE) as f64;
    let neg = text::count_matches(&words, lexicon::NEGATIVE) as f64;
    if pos + neg == 0.0 {
        return EmotionalValence::Neutral;
    }
    let share = pos / (pos + neg);
    if share >= 0.65 {
        EmotionalValence::Positive
    } else if share <= 0.35 {
        EmotionalValence::Negative
    } else {
        EmotionalValence::Mixed
    }
}

pub fn point(order_index: u32, body: &str) -> TensionPoint {
    match signals(body) {
        Some(s) => TensionPoint {
            chapter_order_index: order_index,
            tension_level: s.score(),
            emotional_valence: valence(body),
        },
        None => TensionPoint {
            chapter_order_index: order_index,
            tension_level: NEUTRAL_TENSION,
            emotional_valence: EmotionalValence::Neutral,
        },
    }
}
