//! Text signal extraction shared by the analyzer, graph builder and detector.
//!
//! Everything here is a pure function of its input string. Paragraphs are
//! split on blank lines (`\n\n`), sentences on terminal punctuation followed by
//! whitespace, and words are lowercased alphabetic runs (apostrophes kept, so
//! `don't` and `Ada's` stay whole).

use std::collections::HashSet;

/// Ratio of control/replacement characters above which text is treated as
/// corrupt rather than prose.
const MAX_NOISE_RATIO: f64 = 0.1;

/// Returns `false` for text that looks like binary or badly decoded data.
pub fn is_probably_text(text: &str) -> bool {
    if text.contains('\0') {
        return false;
    }
    let mut total = 0usize;
    let mut noise = 0usize;
    for c in text.chars() {
        total += 1;
        if c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
            noise += 1;
        }
    }
    total == 0 || (noise as f64 / total as f64) <= MAX_NOISE_RATIO
}

/// Split text into non-empty, trimmed paragraphs.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split text into non-empty, trimmed sentences.
///
/// A sentence ends at `.`, `!`, `?` or `…` (optionally followed by closing
/// quotes or brackets) when the next character is whitespace or the end of the
/// text. Paragraph breaks always end a sentence.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for para in paragraphs(text) {
        let mut start = 0usize;
        let mut chars = para.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !matches!(c, '.' | '!' | '?' | '…') {
                continue;
            }
            let mut end = i + c.len_utf8();
            while let Some(&(j, next)) = chars.peek() {
                if matches!(next, '"' | '\'' | '”' | '’' | ')' | ']' | '.' | '!' | '?') {
                    end = j + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let at_boundary = match chars.peek() {
                None => true,
                Some(&(_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                let s = para[start..end].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = end;
            }
        }
        let tail = para[start..].trim();
        if !tail.is_empty() {
            out.push(tail);
        }
    }
    out
}

/// Lowercased word tokens.
pub fn words(text: &str) -> Vec<String> {
    raw_words(text).map(|w| w.to_lowercase()).collect()
}

/// Word tokens with original casing, as slices of `text`.
pub fn raw_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '’' || c == '-'))
        .filter(|w| !w.is_empty())
}

pub fn word_count(text: &str) -> usize {
    raw_words(text).count()
}

/// Text outside quotation marks (narration), with quoted spans removed.
pub fn narration(text: &str) -> String {
    let (outside, _) = split_quoted(text);
    outside
}

/// Quoted spans (dialogue), concatenated with spaces.
pub fn dialogue(text: &str) -> String {
    let (_, inside) = split_quoted(text);
    inside
}

fn split_quoted(text: &str) -> (String, String) {
    let mut outside = String::with_capacity(text.len());
    let mut inside = String::new();
    let mut in_quote = false;
    for c in text.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                if !in_quote {
                    inside.push(' ');
                }
                outside.push(' ');
            }
            '“' => {
                in_quote = true;
                outside.push(' ');
            }
            '”' => {
                in_quote = false;
                inside.push(' ');
                outside.push(' ');
            }
            '\n' if in_quote => {
                // Unclosed quotes end at paragraph breaks.
                in_quote = false;
                outside.push('\n');
            }
            _ if in_quote => inside.push(c),
            _ => outside.push(c),
        }
    }
    (outside, inside)
}

/// Fraction of non-whitespace characters that sit inside quotation marks.
pub fn dialogue_ratio(text: &str) -> f64 {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return 0.0;
    }
    let quoted = dialogue(text).chars().filter(|c| !c.is_whitespace()).count();
    (quoted as f64 / total as f64).clamp(0.0, 1.0)
}

/// Number of explicit scene-break lines (`***`, `* * *`, `---`, `#`, `~~~`).
pub fn scene_breaks(text: &str) -> usize {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| {
            let compact: String = l.chars().filter(|c| !c.is_whitespace()).collect();
            !compact.is_empty()
                && compact.chars().count() <= 9
                && (compact.chars().all(|c| c == '*')
                    || compact.chars().all(|c| c == '#')
                    || (compact.len() >= 3 && compact.chars().all(|c| c == '-'))
                    || (compact.len() >= 3 && compact.chars().all(|c| c == '~')))
        })
        .count()
}

/// Whether `name` occurs in `text` as a whole word (case-sensitive).
///
/// Multi-word names must match as a contiguous phrase.
pub fn contains_name(text: &str, name: &str) -> bool {
    find_name(text, name).is_some()
}

/// Byte offset of the first whole-word occurrence of `name` in `text`.
pub fn find_name(text: &str, name: &str) -> Option<usize> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let mut search_from = 0usize;
    while let Some(rel) = text[search_from..].find(name) {
        let start = search_from + rel;
        let end = start + name.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = text[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if before_ok && after_ok {
            return Some(start);
        }
        search_from = start + name.chars().next().map(char::len_utf8).unwrap_or(1);
    }
    None
}

/// Whether any of `names` occurs in `text`.
pub fn mentions_any(text: &str, names: &[String]) -> bool {
    names.iter().any(|n| contains_name(text, n))
}

/// Mean and coefficient of variation of a sample.
pub fn mean_and_cv(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= f64::EPSILON {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt() / mean)
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Whether `word` is `stem` or `stem` plus a common inflection.
pub fn matches_stem(word: &str, stem: &str) -> bool {
    if word == stem {
        return true;
    }
    match word.strip_prefix(stem) {
        Some(rest) => matches!(rest, "s" | "es" | "ed" | "d" | "ing" | "er" | "ers" | "ly"),
        None => false,
    }
}

/// Number of words in `words` matching any stem in `lexicon`.
pub fn count_matches(words: &[String], lexicon: &[&str]) -> usize {
    words
        .iter()
        .filter(|w| lexicon.iter().any(|stem| matches_stem(w, stem)))
        .count()
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "than", "that", "this", "these", "those",
    "to", "of", "in", "on", "at", "by", "for", "with", "from", "into", "onto", "over", "under",
    "as", "is", "was", "were", "be", "been", "being", "are", "am", "has", "had", "have", "do",
    "did", "does", "not", "no", "so", "too", "very", "just", "would", "could", "should", "will",
    "can", "may", "might", "must", "shall", "he", "she", "it", "they", "them", "his", "her",
    "hers", "its", "their", "theirs", "him", "i", "me", "my", "mine", "we", "us", "our", "you",
    "your", "who", "whom", "which", "what", "when", "where", "why", "how", "all", "any", "some",
    "one", "day", "there", "here", "about", "after", "before", "again", "ever", "never", "once",
    "still", "only", "own", "same", "such", "up", "down", "out", "off", "said", "says", "like",
];

/// Distinctive content words of a sentence: lowercased, non-stopword,
/// at least four letters, de-duplicated, in order of appearance.
pub fn content_words(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    words(text)
        .into_iter()
        .map(|w| w.trim_end_matches("'s").trim_end_matches("’s").to_string())
        .filter(|w| w.chars().count() >= 4 && !stop.contains(w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Parse a number written as digits or English words (`"34"`,
/// `"thirty-four"`, `"twelve"`). Returns `None` above 199.
pub fn parse_number(token: &str) -> Option<u32> {
    let token = token.trim().to_lowercase();
    if let Ok(n) = token.parse::<u32>() {
        return (n <= 199).then_some(n);
    }
    let units = |w: &str| -> Option<u32> {
        Some(match w {
            "zero" => 0,
            "one" | "a" | "an" => 1,
            "two" => 2,
            "three" => 3,
            "four" => 4,
            "five" => 5,
            "six" => 6,
            "seven" => 7,
            "eight" => 8,
            "nine" => 9,
            "ten" => 10,
            "eleven" => 11,
            "twelve" => 12,
            "thirteen" => 13,
            "fourteen" => 14,
            "fifteen" => 15,
            "sixteen" => 16,
            "seventeen" => 17,
            "eighteen" => 18,
            "nineteen" => 19,
            _ => return None,
        })
    };
    let tens = |w: &str| -> Option<u32> {
        Some(match w {
            "twenty" => 20,
            "thirty" => 30,
            "forty" => 40,
            "fifty" => 50,
            "sixty" => 60,
            "seventy" => 70,
            "eighty" => 80,
            "ninety" => 90,
            _ => return None,
        })
    };
    if let Some(n) = units(&token) {
        return Some(n);
    }
    if let Some(n) = tens(&token) {
        return Some(n);
    }
    let (t, u) = token.split_once('-')?;
    Some(tens(t)? + units(u).filter(|n| (1..=9).contains(n))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_split_on_terminal_punctuation() {
        let s = sentences("Ada ran. Bob fell! Did it hurt? \"Yes.\" She laughed");
        assert_eq!(s, vec!["Ada ran.", "Bob fell!", "Did it hurt?", "\"Yes.\"", "She laughed"]);
    }

    #[test]
    fn test_sentences_do_not_split_inside_decimals() {
        let s = sentences("It cost 3.50 dollars. Cheap.");
        assert_eq!(s, vec!["It cost 3.50 dollars.", "Cheap."]);
    }

    #[test]
    fn test_sentences_respect_paragraphs() {
        let s = sentences("First line without stop\n\nSecond.");
        assert_eq!(s, vec!["First line without stop", "Second."]);
    }

    #[test]
    fn test_words_keep_apostrophes() {
        assert_eq!(words("Don't stop, Ada's dog!"), vec!["don't", "stop", "ada's", "dog"]);
    }

    #[test]
    fn test_dialogue_and_narration_split() {
        let text = "Ada said, \"Run now.\" Then she left.";
        assert!(dialogue(text).contains("Run now."));
        assert!(!narration(text).contains("Run"));
        assert!(narration(text).contains("Then she left."));
        let ratio = dialogue_ratio(text);
        assert!(ratio > 0.1 && ratio < 0.5, "ratio was {}", ratio);
    }

    #[test]
    fn test_curly_quotes() {
        assert_eq!(dialogue("He said “go” twice.").trim(), "go");
    }

    #[test]
    fn test_scene_breaks() {
        let text = "One.\n\n***\n\nTwo.\n\n* * *\n\nThree.\n---\n#\nnot a break ---";
        assert_eq!(scene_breaks(text), 4);
    }

    #[test]
    fn test_contains_name_whole_word() {
        assert!(contains_name("Then Ada left.", "Ada"));
        assert!(!contains_name("The Adams family.", "Ada"));
        assert!(contains_name("A meets B.", "A"));
        assert!(!contains_name("Ahead lay B.", "A"));
        assert!(contains_name("Ask Ada Lovelace.", "Ada Lovelace"));
        assert_eq!(find_name("Bob and Bob", "Bob"), Some(0));
    }

    #[test]
    fn test_binary_text_detected() {
        assert!(is_probably_text("Plain prose.\nMore."));
        assert!(is_probably_text(""));
        assert!(!is_probably_text("abc\0def"));
        let noisy: String = std::iter::repeat('\u{1}').take(20).chain("ok".chars()).collect();
        assert!(!is_probably_text(&noisy));
    }

    #[test]
    fn test_matches_stem() {
        assert!(matches_stem("fights", "fight"));
        assert!(matches_stem("fighting", "fight"));
        assert!(!matches_stem("fighters-guild", "fight"));
        assert!(!matches_stem("lovecraft", "love"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("34"), Some(34));
        assert_eq!(parse_number("thirty-four"), Some(34));
        assert_eq!(parse_number("Twelve"), Some(12));
        assert_eq!(parse_number("sixty"), Some(60));
        assert_eq!(parse_number("eleventy"), None);
        assert_eq!(parse_number("199"), Some(199));
        assert_eq!(parse_number("1850"), None);
    }

    #[test]
    fn test_content_words_skip_stopwords() {
        let words = content_words("She promised to return the silver key to her brother.");
        assert_eq!(words, vec!["promised", "return", "silver", "brother"]);
    }

    #[test]
    fn test_mean_and_cv() {
        let (mean, cv) = mean_and_cv(&[2.0, 2.0, 2.0]);
        assert_eq!(mean, 2.0);
        assert_eq!(cv, 0.0);
        let (_, cv) = mean_and_cv(&[1.0, 3.0]);
        assert!((cv - 0.5).abs() < 1e-9);
    }
}
