//! Word lists used by the scoring heuristics.
//!
//! Entries are stems; matching goes through [`crate::text::matches_stem`], so
//! `fight` also matches `fights` and `fighting`. Irregular forms are listed
//! explicitly.

/// Action and conflict vocabulary (tension intensity).
pub const ACTION: &[&str] = &[
    "fight", "fought", "attack", "run", "ran", "scream", "shout", "kill", "blood", "gun", "chase",
    "explode", "explosion", "crash", "strike", "struck", "punch", "stab", "fire", "burn", "flee",
    "fled", "fear", "panic", "danger", "threat", "war", "battle", "storm", "smash", "sword",
    "shot", "shoot", "die", "dead", "death", "rage", "argue", "betray", "escape", "trap", "hunt",
    "grab", "slam", "scramble", "bleed", "wound", "terror", "collapse",
];

pub const POSITIVE: &[&str] = &[
    "love", "joy", "happy", "laugh", "smile", "hope", "warm", "kind", "gentle", "peace",
    "delight", "glad", "safe", "trust", "beautiful", "calm", "relief", "grateful", "hug", "kiss",
    "celebrate", "friend", "comfort", "cheer", "bright",
];

pub const NEGATIVE: &[&str] = &[
    "fear", "hate", "anger", "angry", "sad", "grief", "cry", "cried", "tear", "pain", "hurt",
    "death", "dead", "die", "lost", "lonely", "dark", "afraid", "dread", "despair", "blood",
    "scream", "guilt", "shame", "betray", "cold", "wound", "fight", "fought",
];

// Relationship cues (character graph).

pub const ROMANTIC: &[&str] = &[
    "love", "kiss", "kissed", "embrace", "darling", "sweetheart", "romance", "married", "marry",
    "wedding", "lover", "beloved", "flirt", "date",
];

pub const FAMILY: &[&str] = &[
    "mother", "father", "sister", "brother", "son", "daughter", "aunt", "uncle", "cousin",
    "grandmother", "grandfather", "mom", "dad", "sibling", "family", "niece", "nephew",
];

pub const MENTOR: &[&str] = &[
    "teach", "taught", "mentor", "lesson", "train", "student", "apprentice", "master", "guide",
    "advise", "tutor", "learn",
];

pub const RIVAL: &[&str] = &[
    "fight", "fought", "compete", "rival", "argue", "quarrel", "clash", "outdo", "jealous",
    "challenge", "race", "spar",
];

pub const ENEMY: &[&str] = &[
    "hate", "kill", "attack", "betray", "enemy", "destroy", "threaten", "murder", "stab",
    "poison", "revenge", "curse",
];

pub const ALLY: &[&str] = &[
    "reconcile", "help", "friend", "together", "trust", "ally", "support", "rescue", "protect",
    "thank", "forgive", "agree", "join",
];

// Detector cues.

/// Phrases that mark a scene as remembered or out of sequence.
pub const FLASHBACK: &[&str] = &[
    "flashback", "remember", "remembered", "recalled", "memory", "memories", "years earlier",
    "years before", "years ago", "as a child", "back then", "once upon", "long ago", "dreamed",
    "dreamt", "ghost", "spirit",
];

/// Phrases that explain a physical or character change.
pub const CHANGE: &[&str] = &[
    "dyed", "dye", "changed", "cut her hair", "cut his hair", "shaved", "grew", "grown",
    "contacts", "contact lenses", "no longer", "became", "had become", "turned", "transformed",
    "learned to", "wig", "disguise", "now",
];

/// Strong setup markers: explicit promises and predictions.
pub const SETUP_STRONG: &[&str] = &[
    "promised", "vowed", "swore", "prophecy", "foretold", "destined", "oath",
];

/// Weak setup markers: open questions and hints.
pub const SETUP_WEAK: &[&str] = &[
    "secret", "mysterious", "someday", "one day", "little did", "strange", "hidden", "locked",
];

/// Verbs of interior experience (head-hopping evidence).
pub const INTERIOR: &[&str] = &[
    "thought", "felt", "wondered", "realized", "knew", "hoped", "feared", "worried", "wished",
    "believed", "suspected",
];

/// Pairs of trait words treated as opposites.
pub const ANTONYMS: &[(&str, &str)] = &[
    ("brave", "cowardly"),
    ("brave", "afraid"),
    ("kind", "cruel"),
    ("honest", "dishonest"),
    ("honest", "lying"),
    ("loyal", "disloyal"),
    ("loyal", "treacherous"),
    ("calm", "anxious"),
    ("calm", "panicked"),
    ("generous", "selfish"),
    ("generous", "stingy"),
    ("shy", "outgoing"),
    ("shy", "bold"),
    ("patient", "impatient"),
    ("cheerful", "gloomy"),
    ("clever", "foolish"),
    ("humble", "arrogant"),
    ("gentle", "violent"),
    ("optimistic", "pessimistic"),
    ("trusting", "suspicious"),
];

/// The opposites of `trait_word` in [`ANTONYMS`].
pub fn antonyms_of(trait_word: &str) -> Vec<&'static str> {
    ANTONYMS
        .iter()
        .filter_map(|&(a, b)| {
            if a == trait_word {
                Some(b)
            } else if b == trait_word {
                Some(a)
            } else {
                None
            }
        })
        .collect()
}

/// Whether `lower` (already lowercased) contains any phrase in `phrases` as
/// whole words.
pub fn contains_phrase(lower: &str, phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|p| crate::text::contains_name(lower, p))
}
