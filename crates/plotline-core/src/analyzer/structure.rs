//! Canonical structure templates and curve-shape classification.
//!
//! Each template is a normalized tension curve over manuscript position
//! (`x` in `0..=1`, tension in `0..=1`) plus the act layout the generator uses
//! to divide a target length.
//!
//! ```text
//!   three-act        freytag          save-the-cat
//!         /\            /\              /\    /\
//!     ___/  \        __/  \__        __/  \  /  \
//!    /       \      /        \      /      \/
//! ```
//!
//! Classification compares the chapter curve (min-max normalized) against
//! each template sampled at the same chapter positions:
//!
//! ```text
//! distance = 0.6 · RMS(curve − template)
//!          + 0.3 · |argmax(curve) − argmax(template)|
//!          + 0.1 · |maxima(curve) − maxima(template)| / max(maxima)
//! ```

use crate::models::StructureType;
use crate::text;

/// Expected tension movement within one act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActShape {
    Rising,
    Falling,
    Peak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActTemplate {
    pub name: &'static str,
    /// Share of the manuscript this act covers.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureTemplate {
    pub structure: StructureType,
    /// Control points `(position, tension)`, strictly increasing in position,
    /// spanning `0.0..=1.0`.
    pub curve: &'static [(f64, f64)],
    pub acts: &'static [ActTemplate],
}

macro_rules! acts {
    ($(($name:expr, $ratio:expr)),* $(,)?) => {
        &[$(ActTemplate { name: $name, ratio: $ratio }),*]
    };
}

/// All templates in declaration order (the final tie-breaker).
pub static TEMPLATES: [StructureTemplate; 6] = [
    StructureTemplate {
        structure: StructureType::ThreeAct,
        curve: &[(0.0, 0.2), (0.25, 0.45), (0.5, 0.55), (0.75, 0.7), (0.9, 1.0), (1.0, 0.3)],
        acts: acts![("Setup", 0.25), ("Confrontation", 0.5), ("Resolution", 0.25)],
    },
    StructureTemplate {
        structure: StructureType::FiveAct,
        curve: &[(0.0, 0.2), (0.2, 0.4), (0.4, 0.65), (0.6, 1.0), (0.8, 0.55), (1.0, 0.25)],
        acts: acts![
            ("Exposition", 0.2),
            ("Rising Action", 0.2),
            ("Climax", 0.2),
            ("Falling Action", 0.2),
            ("Resolution", 0.2),
        ],
    },
    StructureTemplate {
        structure: StructureType::HerosJourney,
        curve: &[
            (0.0, 0.15),
            (0.15, 0.35),
            (0.25, 0.3),
            (0.5, 0.75),
            (0.6, 0.5),
            (0.8, 0.95),
            (0.9, 0.6),
            (1.0, 0.4),
        ],
        acts: acts![
            ("The Ordinary World", 0.2),
            ("Trials and Allies", 0.3),
            ("The Ordeal", 0.25),
            ("The Road Back", 0.25),
        ],
    },
    StructureTemplate {
        structure: StructureType::HeroinesJourney,
        curve: &[
            (0.0, 0.3),
            (0.2, 0.5),
            (0.4, 0.35),
            (0.6, 0.6),
            (0.75, 0.25),
            (0.9, 0.8),
            (1.0, 0.55),
        ],
        acts: acts![
            ("Separation", 0.2),
            ("Descent", 0.3),
            ("Reckoning", 0.25),
            ("Reunion", 0.25),
        ],
    },
    StructureTemplate {
        structure: StructureType::SaveTheCat,
        curve: &[
            (0.0, 0.2),
            (0.1, 0.4),
            (0.25, 0.5),
            (0.5, 0.75),
            (0.75, 0.15),
            (0.9, 1.0),
            (1.0, 0.4),
        ],
        acts: acts![
            ("Opening and Catalyst", 0.2),
            ("Fun and Games", 0.3),
            ("Bad Guys Close In", 0.25),
            ("Finale", 0.25),
        ],
    },
    StructureTemplate {
        structure: StructureType::Freytag,
        curve: &[
            (0.0, 0.1),
            (0.15, 0.25),
            (0.45, 0.8),
            (0.5, 1.0),
            (0.55, 0.8),
            (0.85, 0.25),
            (1.0, 0.1),
        ],
        acts: acts![
            ("Exposition", 0.15),
            ("Rising Action", 0.3),
            ("Climax", 0.1),
            ("Falling Action", 0.3),
            ("Denouement", 0.15),
        ],
    },
];

/// Template for a known structure type.
pub fn template(structure: StructureType) -> Option<&'static StructureTemplate> {
    TEMPLATES.iter().find(|t| t.structure == structure)
}

impl StructureTemplate {
    /// Linear interpolation of the template curve at `x`.
    pub fn sample(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        let mut prev = self.curve[0];
        for &(px, py) in self.curve.iter().skip(1) {
            if x <= px {
                let span = px - prev.0;
                if span <= f64::EPSILON {
                    return py;
                }
                return prev.1 + (py - prev.1) * (x - prev.0) / span;
            }
            prev = (px, py);
        }
        prev.1
    }

    /// Tension shape the template implies between two positions.
    pub fn shape_between(&self, start: f64, end: f64) -> ActShape {
        let a = self.sample(start);
        let b = self.sample(end);
        let interior = self
            .curve
            .iter()
            .filter(|(x, _)| *x > start && *x < end)
            .map(|(_, y)| *y)
            .fold(f64::MIN, f64::max);
        if interior > a.max(b) + 0.05 {
            ActShape::Peak
        } else if b >= a {
            ActShape::Rising
        } else {
            ActShape::Falling
        }
    }

    pub fn act_count(&self) -> usize {
        self.acts.len()
    }
}

/// Outcome of comparing a curve against every template.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub structure: StructureType,
    pub confidence: f64,
    /// `(structure, distance)` per template, in declaration order.
    pub distances: Vec<(StructureType, f64)>,
}

const TIE_EPSILON: f64 = 1e-9;

fn positions(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![0.0; n];
    }
    (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || max - min <= f64::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] + f64::EPSILON {
            best = i;
        }
    }
    best
}

/// Interior points strictly above both neighbours.
fn local_maxima(values: &[f64]) -> usize {
    values
        .windows(3)
        .filter(|w| w[1] > w[0] + f64::EPSILON && w[1] > w[2] + f64::EPSILON)
        .count()
}

fn distance(curve: &[f64], xs: &[f64], template: &StructureTemplate) -> f64 {
    let sampled = normalize(&xs.iter().map(|x| template.sample(*x)).collect::<Vec<_>>());
    let n = curve.len() as f64;
    let rms = (curve
        .iter()
        .zip(&sampled)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let peak = (xs[argmax(curve)] - xs[argmax(&sampled)]).abs();
    let (ma, mb) = (local_maxima(curve) as f64, local_maxima(&sampled) as f64);
    let maxima = (ma - mb).abs() / ma.max(mb).max(1.0);
    0.6 * rms + 0.3 * peak + 0.1 * maxima
}

/// Classify a tension curve (raw 0–100 levels, in chapter order).
///
/// Fewer than two points, or a perfectly flat curve, cannot indicate a shape
/// and classify as [`StructureType::Unknown`] with confidence 0.
pub fn classify(tension: &[f64], min_confidence: f64) -> Classification {
    let flat = tension
        .iter()
        .all(|v| (v - tension[0]).abs() <= f64::EPSILON);
    if tension.len() < 2 || flat {
        return Classification {
            structure: StructureType::Unknown,
            confidence: 0.0,
            distances: Vec::new(),
        };
    }
    let curve = normalize(tension);
    let xs = positions(curve.len());
    let distances: Vec<(StructureType, f64)> = TEMPLATES
        .iter()
        .map(|t| (t.structure, distance(&curve, &xs, t)))
        .collect();

    let best = distances
        .iter()
        .map(|(_, d)| *d)
        .fold(f64::INFINITY, f64::min);
    // Among near-equal winners prefer fewer acts, then declaration order.
    let winner = TEMPLATES
        .iter()
        .zip(&distances)
        .enumerate()
        .filter(|(_, (_, (_, d)))| *d - best <= TIE_EPSILON)
        .min_by_key(|(i, (t, _))| (t.act_count(), *i))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let d_win = distances[winner].1;
    let d_runner = distances
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .map(|(_, (_, d))| *d)
        .fold(f64::INFINITY, f64::min);

    let confidence = if d_runner.is_finite() && d_runner > 0.0 {
        text::round_to((1.0 - d_win / d_runner).clamp(0.0, 1.0), 4)
    } else {
        0.0
    };
    let structure = if confidence < min_confidence {
        StructureType::Unknown
    } else {
        distances[winner].0
    };
    Classification {
        structure,
        confidence,
        distances,
    }
}
