//! Confidence scoring for a matched phrase.
//!
//! The recognizer's confidence is adjusted by where the phrase sits in the
//! utterance, how much of the utterance it covers, and whether the utterance
//! reads like the phrase being talked about rather than addressed.

/// Rewards utterances that open with the phrase.
pub const LEADING_BOOST: f64 = 1.2;
/// Below this phrase/text length ratio the phrase is a small fragment.
pub const FRAGMENT_RATIO: f64 = 0.3;
pub const FRAGMENT_PENALTY: f64 = 0.7;
/// Above this ratio the phrase is essentially the whole utterance.
pub const WHOLE_UTTERANCE_RATIO: f64 = 0.8;
pub const WHOLE_UTTERANCE_BOOST: f64 = 1.1;
/// Applied once, however many markers are present.
pub const NOISE_PENALTY: f64 = 0.5;

/// Phrases suggesting the wake word was mentioned, not spoken to.
pub const NOISE_MARKERS: &[&str] = &[
    "said",
    "mentioned",
    "talking about",
    "the word",
    "called",
    "named",
    "saying",
];

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score `phrase` in `text` (both normalized) starting from the
    /// recognizer's `base_confidence`. Result is capped at 1.0.
    pub fn score(&self, text: &str, phrase: &str, base_confidence: f64) -> f64 {
        let mut value = base_confidence;

        if text.starts_with(phrase) {
            value *= LEADING_BOOST;
        }

        let ratio = char_len(phrase) as f64 / char_len(text).max(1) as f64;
        if ratio < FRAGMENT_RATIO {
            value *= FRAGMENT_PENALTY;
        } else if ratio > WHOLE_UTTERANCE_RATIO {
            value *= WHOLE_UTTERANCE_BOOST;
        }

        if has_noise_marker(text) {
            value *= NOISE_PENALTY;
        }

        value.min(1.0)
    }
}

pub fn has_noise_marker(text: &str) -> bool {
    NOISE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
