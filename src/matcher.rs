//! Phrase matching over normalized transcript text.
//!
//! A phrase is considered present when it appears literally, when its words
//! appear as a contiguous run of the transcript's words (or glued together as
//! one word), or when a common mishearing of it does. Mishearings come from a
//! fixed substitution table, so the same phrase always expands to the same
//! variants. Variants match by plain containment like the phrase itself, so
//! "the autobot" carries the "he autobot" mishearing of "hey autobot".

use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::words;

/// How a phrase was found in the text, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Literal,
    WordSequence,
    Variant,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Literal => write!(f, "literal"),
            MatchKind::WordSequence => write!(f, "word_sequence"),
            MatchKind::Variant => write!(f, "variant"),
        }
    }
}

/// Leading interjections and how recognizers tend to mishear them.
const INTERJECTION_SWAPS: &[(&str, &[&str])] = &[
    ("hey", &["hay", "he", "a"]),
    ("ok", &["okay", "o k"]),
    ("okay", &["ok", "o k"]),
];

/// Product-name tokens and phonetically similar renderings.
const PRODUCT_SWAPS: &[(&str, &[&str])] = &[(
    "autobot",
    &["auto bot", "auto-bot", "otto bot", "ottobot", "autobots", "auto bots"],
)];

/// Substring, word-boundary and mishearing-variant matcher.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    interjections: HashMap<String, Vec<String>>,
    products: HashMap<String, Vec<String>>,
}

impl Default for PhraseMatcher {
    fn default() -> Self {
        let table = |entries: &[(&str, &[&str])]| {
            entries
                .iter()
                .map(|(k, alts)| (k.to_string(), alts.iter().map(|a| a.to_string()).collect()))
                .collect::<HashMap<String, Vec<String>>>()
        };
        Self {
            interjections: table(INTERJECTION_SWAPS),
            products: table(PRODUCT_SWAPS),
        }
    }
}

impl PhraseMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register mishearings for an additional product-name token.
    pub fn with_product_variants<I, S>(mut self, token: &str, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products.insert(
            token.to_lowercase(),
            alternatives.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Whether `phrase` is present in `text`. Both must already be normalized.
    pub fn matches(&self, text: &str, phrase: &str) -> bool {
        self.match_kind(text, phrase).is_some()
    }

    /// Like [`matches`](Self::matches), reporting which rule succeeded first.
    pub fn match_kind(&self, text: &str, phrase: &str) -> Option<MatchKind> {
        if phrase.is_empty() {
            return None;
        }
        if text.contains(phrase) {
            return Some(MatchKind::Literal);
        }

        let text_words = words(text);
        let phrase_words = words(phrase);
        if contains_word_run(&text_words, &phrase_words) || contains_glued(&text_words, &phrase_words)
        {
            return Some(MatchKind::WordSequence);
        }

        let found = self.variants(phrase).iter().any(|variant| {
            if text.contains(variant.as_str()) {
                return true;
            }
            let variant_words = words(variant);
            contains_word_run(&text_words, &variant_words)
                || contains_glued(&text_words, &variant_words)
        });
        found.then_some(MatchKind::Variant)
    }

    /// Deterministic mishearing variants of `phrase`, excluding the phrase
    /// itself. The first word is swapped if it is a known interjection, the
    /// last if it is a known product name, and both combinations are emitted.
    pub fn variants(&self, phrase: &str) -> Vec<String> {
        let tokens: Vec<&str> = phrase.split(' ').filter(|t| !t.is_empty()).collect();
        let Some((&last, rest)) = tokens.split_last() else {
            return Vec::new();
        };

        let mut heads: Vec<String> = Vec::new();
        let body: &[&str];
        match rest.split_first() {
            Some((&first, middle)) => {
                heads.push(first.to_string());
                if let Some(alts) = self.interjections.get(first) {
                    heads.extend(alts.iter().cloned());
                }
                body = middle;
            }
            None => {
                heads.push(String::new());
                body = &[];
            }
        }

        let mut tails = vec![last.to_string()];
        if let Some(alts) = self.products.get(last) {
            tails.extend(alts.iter().cloned());
        }

        let mut out: Vec<String> = Vec::new();
        for head in &heads {
            for tail in &tails {
                let candidate = std::iter::once(head.as_str())
                    .chain(body.iter().copied())
                    .chain(std::iter::once(tail.as_str()))
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if candidate != phrase && !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

fn contains_word_run(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Catches recognizer output like "heyautobot" for "hey autobot".
fn contains_glued(haystack: &[&str], needle: &[&str]) -> bool {
    if needle.len() < 2 {
        return false;
    }
    let glued: String = needle.concat();
    haystack.iter().any(|w| *w == glued)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_substring() {
        let m = PhraseMatcher::new();
        assert_eq!(m.match_kind("hey autobot", "hey autobot"), Some(MatchKind::Literal));
        assert_eq!(
            m.match_kind("well hey autobot turn on the lights", "hey autobot"),
            Some(MatchKind::Literal)
        );
    }

    #[test]
    fn test_word_sequence_across_punctuation() {
        let m = PhraseMatcher::new();
        assert_eq!(m.match_kind("hey, autobot!", "hey autobot"), Some(MatchKind::WordSequence));
        assert_eq!(m.match_kind("hey   autobot", "hey autobot"), Some(MatchKind::WordSequence));
    }

    #[test]
    fn test_glued_words() {
        let m = PhraseMatcher::new();
        assert_eq!(m.match_kind("heyautobot", "hey autobot"), Some(MatchKind::WordSequence));
    }

    #[test]
    fn test_mishearing_variants() {
        let m = PhraseMatcher::new();
        assert_eq!(m.match_kind("hay autobot", "hey autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("okay otto bot", "ok autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("o k autobot", "ok autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("auto bot please", "autobot"), Some(MatchKind::Variant));
    }

    #[test]
    fn test_variants_match_by_containment() {
        let m = PhraseMatcher::new();
        assert_eq!(m.match_kind("the autobot", "hey autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("hayautobot", "hey autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("okayautobot", "ok autobot"), Some(MatchKind::Variant));
        assert_eq!(m.match_kind("hay, otto bot", "hey autobot"), Some(MatchKind::Variant));
        assert!(!m.matches("the robot", "hey autobot"));
    }

    #[test]
    fn test_no_match() {
        let m = PhraseMatcher::new();
        assert!(!m.matches("good morning", "hey autobot"));
        assert!(!m.matches("hey there", "hey autobot"));
        assert!(!m.matches("anything", ""));
    }

    #[test]
    fn test_variants_are_deterministic() {
        let m = PhraseMatcher::new();
        let first = m.variants("hey autobot");
        assert_eq!(first, m.variants("hey autobot"));
        assert!(first.contains(&"hay autobot".to_string()));
        assert!(first.contains(&"a otto bot".to_string()));
        assert!(!first.contains(&"hey autobot".to_string()));
        // 4 heads x 7 tails, minus the phrase itself
        assert_eq!(first.len(), 27);
    }

    #[test]
    fn test_variants_of_single_token() {
        let m = PhraseMatcher::new();
        let v = m.variants("autobot");
        assert_eq!(v.first().map(String::as_str), Some("auto bot"));
        assert!(m.variants("jarvis").is_empty());
    }

    #[test]
    fn test_custom_product_variants() {
        let m = PhraseMatcher::new().with_product_variants("jarvis", ["jar vis", "service"]);
        assert!(m.matches("hey jar vis", "hey jarvis"));
    }
}
