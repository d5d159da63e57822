//! Per-phrase confidence thresholds learned from detection feedback.
//! Every stored value stays within [`MIN_THRESHOLD`, `MAX_THRESHOLD`].

use std::collections::HashMap;

pub const MIN_THRESHOLD: f64 = 0.5;
pub const MAX_THRESHOLD: f64 = 0.95;
/// Applied on a false positive.
pub const RAISE_FACTOR: f64 = 1.1;
/// Applied on a true positive while the false-positive rate is acceptable.
pub const LOWER_FACTOR: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct AdaptiveThresholds {
    values: HashMap<String, f64>,
    base: f64,
    adaptive: bool,
}

impl AdaptiveThresholds {
    pub fn new(base: f64, adaptive: bool) -> Self {
        Self {
            values: HashMap::new(),
            base,
            adaptive,
        }
    }

    fn clamp(value: f64) -> f64 {
        value.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }

    /// Create an entry at the base threshold. Existing entries are kept.
    pub fn insert(&mut self, phrase: &str) {
        let base = Self::clamp(self.base);
        self.values.entry(phrase.to_string()).or_insert(base);
    }

    pub fn remove(&mut self, phrase: &str) {
        self.values.remove(phrase);
    }

    /// Keep entries for exactly `phrases`, creating missing ones.
    pub fn sync_phrases(&mut self, phrases: &[String]) {
        self.values.retain(|p, _| phrases.contains(p));
        for phrase in phrases {
            self.insert(phrase);
        }
    }

    pub fn set_base(&mut self, base: f64) {
        self.base = base;
    }

    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
    }

    /// Threshold a detection of `phrase` must reach. Frozen at the (clamped)
    /// base threshold while adaptation is off; missing entries use it too.
    pub fn get(&self, phrase: &str) -> f64 {
        let base = Self::clamp(self.base);
        if !self.adaptive {
            return base;
        }
        self.values.get(phrase).copied().unwrap_or(base)
    }

    /// Raise the threshold after a false positive. Returns the new value, or
    /// None when adaptation is off or the phrase has no entry.
    pub fn on_false_positive(&mut self, phrase: &str) -> Option<f64> {
        if !self.adaptive || !self.contains(phrase) {
            return None;
        }
        let current = self.get(phrase);
        let next = (current * RAISE_FACTOR).min(MAX_THRESHOLD);
        let next = Self::clamp(next);
        self.values.insert(phrase.to_string(), next);
        Some(next)
    }

    /// Lower the threshold after a true positive, but only while the
    /// process-wide false-positive rate is under `max_false_positive_rate`.
    pub fn on_true_positive(
        &mut self,
        phrase: &str,
        false_positive_rate: f64,
        max_false_positive_rate: f64,
    ) -> Option<f64> {
        if !self.adaptive
            || !self.contains(phrase)
            || false_positive_rate >= max_false_positive_rate
        {
            return None;
        }
        let current = self.get(phrase);
        let next = Self::clamp((current * LOWER_FACTOR).max(MIN_THRESHOLD));
        self.values.insert(phrase.to_string(), next);
        Some(next)
    }

    /// Reset every entry to the base threshold.
    pub fn reset(&mut self) {
        let base = Self::clamp(self.base);
        for value in self.values.values_mut() {
            *value = base;
        }
    }

    pub fn contains(&self, phrase: &str) -> bool {
        self.values.contains_key(phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_defaults_to_base() {
        let t = AdaptiveThresholds::new(0.7, true);
        assert_eq!(t.get("hey autobot"), 0.7);
    }

    #[test]
    fn test_false_positives_saturate_at_max() {
        let mut t = AdaptiveThresholds::new(0.7, true);
        t.insert("hey autobot");
        let mut last = t.get("hey autobot");
        for _ in 0..20 {
            let next = t.on_false_positive("hey autobot").unwrap();
            assert!(next >= last);
            assert!(next <= MAX_THRESHOLD);
            last = next;
        }
        assert_eq!(t.get("hey autobot"), MAX_THRESHOLD);
    }

    #[test]
    fn test_true_positives_saturate_at_min() {
        let mut t = AdaptiveThresholds::new(0.7, true);
        t.insert("hey autobot");
        for _ in 0..50 {
            let next = t.on_true_positive("hey autobot", 0.0, 0.1).unwrap();
            assert!(next >= MIN_THRESHOLD);
        }
        assert_eq!(t.get("hey autobot"), MIN_THRESHOLD);
    }

    #[test]
    fn test_true_positive_blocked_by_false_positive_rate() {
        let mut t = AdaptiveThresholds::new(0.7, true);
        t.insert("hey autobot");
        assert_eq!(t.on_true_positive("hey autobot", 0.5, 0.1), None);
        assert_eq!(t.get("hey autobot"), 0.7);
    }

    #[test]
    fn test_frozen_when_not_adaptive() {
        let mut t = AdaptiveThresholds::new(0.7, false);
        t.insert("hey autobot");
        assert_eq!(t.on_false_positive("hey autobot"), None);
        assert_eq!(t.on_true_positive("hey autobot", 0.0, 0.1), None);
        assert_eq!(t.get("hey autobot"), 0.7);
    }

    #[test]
    fn test_sync_phrases_adds_and_drops() {
        let mut t = AdaptiveThresholds::new(0.7, true);
        t.insert("old phrase");
        t.sync_phrases(&["hey autobot".to_string()]);
        assert!(t.contains("hey autobot"));
        assert!(!t.contains("old phrase"));
    }

    #[test]
    fn test_low_base_is_clamped_into_bounds() {
        let mut t = AdaptiveThresholds::new(0.2, true);
        t.insert("autobot");
        assert_eq!(t.get("autobot"), MIN_THRESHOLD);
        assert_eq!(t.get("not stored"), MIN_THRESHOLD);
    }

    #[test]
    fn test_out_of_range_base_clamped_for_every_lookup() {
        let t = AdaptiveThresholds::new(0.99, true);
        assert_eq!(t.get("missing"), MAX_THRESHOLD);
        let frozen = AdaptiveThresholds::new(0.1, false);
        assert_eq!(frozen.get("missing"), MIN_THRESHOLD);
    }

    #[test]
    fn test_feedback_never_creates_entries() {
        let mut t = AdaptiveThresholds::new(0.7, true);
        assert_eq!(t.on_false_positive("gone"), None);
        assert_eq!(t.on_true_positive("gone", 0.0, 0.1), None);
        assert!(!t.contains("gone"));
    }
}
