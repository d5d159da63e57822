//! Text normalization shared by the matcher, scorer and phrase store.
//! Transcripts and configured phrases are compared in lowercase, trimmed form.

use std::sync::OnceLock;

use regex::Regex;

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    // Apostrophes stay inside words ("what's"), everything else separates.
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}']+").expect("word pattern is valid"))
}

/// Lowercase and trim. Interior whitespace is left as-is so length ratios
/// reflect what the recognizer produced.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Normalize a configured wake phrase. Interior whitespace is collapsed so
/// that "hey   autobot" and "hey autobot" are the same phrase.
/// Returns None for phrases with no content.
pub fn normalize_phrase(phrase: &str) -> Option<String> {
    let collapsed = phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Split text into words, dropping punctuation.
pub fn words(text: &str) -> Vec<&str> {
    word_pattern().find_iter(text).map(|m| m.as_str()).collect()
}
