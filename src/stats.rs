//! Running detection counters and the bounded history used by feedback calls.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::DetectionEvent;

/// Capacity of [`RecentDetections`].
pub const RECENT_DETECTIONS_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total_detections: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub total_listening_seconds: f64,
    pub running_average_confidence: f64,
    pub last_detection_timestamp: Option<DateTime<Utc>>,
}

impl DetectionStats {
    /// Count a detection and fold its confidence into the running mean.
    pub fn record_detection(&mut self, event: &DetectionEvent) {
        self.total_detections += 1;
        let n = self.total_detections as f64;
        self.running_average_confidence += (event.confidence - self.running_average_confidence) / n;
        self.last_detection_timestamp = Some(event.timestamp);
    }

    pub fn add_listening_time(&mut self, seconds: f64) {
        self.total_listening_seconds += seconds;
    }

    /// False positives per detection, 0.0 before any detection.
    pub fn false_positive_rate(&self) -> f64 {
        self.false_positives as f64 / self.total_detections.max(1) as f64
    }

    /// True positives as a percentage of detections.
    pub fn accuracy(&self) -> f64 {
        self.true_positives as f64 / self.total_detections.max(1) as f64 * 100.0
    }
}

/// Snapshot returned by `get_stats`, with derived rates filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_detections: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub total_listening_seconds: f64,
    pub running_average_confidence: f64,
    pub last_detection_timestamp: Option<DateTime<Utc>>,
    pub accuracy: f64,
    pub false_positive_rate: f64,
    pub recent_detections: usize,
}

impl StatsReport {
    pub fn new(stats: &DetectionStats, recent_detections: usize) -> Self {
        Self {
            total_detections: stats.total_detections,
            true_positives: stats.true_positives,
            false_positives: stats.false_positives,
            total_listening_seconds: stats.total_listening_seconds,
            running_average_confidence: stats.running_average_confidence,
            last_detection_timestamp: stats.last_detection_timestamp,
            accuracy: stats.accuracy(),
            false_positive_rate: stats.false_positive_rate(),
            recent_detections,
        }
    }
}

/// Fixed-capacity history of detections; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct RecentDetections {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
}

impl Default for RecentDetections {
    fn default() -> Self {
        Self::new(RECENT_DETECTIONS_CAPACITY)
    }
}

impl RecentDetections {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: DetectionEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn last(&self) -> Option<&DetectionEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event(phrase: &str, confidence: f64) -> DetectionEvent {
        DetectionEvent::new(phrase, confidence, Map::new())
    }

    #[test]
    fn test_running_average() {
        let mut stats = DetectionStats::default();
        stats.record_detection(&event("a", 0.8));
        stats.record_detection(&event("a", 1.0));
        assert_eq!(stats.total_detections, 2);
        assert!((stats.running_average_confidence - 0.9).abs() < 1e-9);
        assert!(stats.last_detection_timestamp.is_some());
    }

    #[test]
    fn test_rates_before_any_detection() {
        let stats = DetectionStats::default();
        assert_eq!(stats.accuracy(), 0.0);
        assert_eq!(stats.false_positive_rate(), 0.0);
    }

    #[test]
    fn test_accuracy_half() {
        let mut stats = DetectionStats::default();
        stats.record_detection(&event("a", 0.9));
        stats.record_detection(&event("a", 0.9));
        stats.true_positives = 1;
        stats.false_positives = 1;
        let report = StatsReport::new(&stats, 2);
        assert_eq!(report.accuracy, 50.0);
        assert_eq!(report.false_positive_rate, 0.5);
    }

    #[test]
    fn test_recent_detections_evicts_oldest() {
        let mut recent = RecentDetections::new(3);
        for i in 0..5 {
            recent.push(event(&format!("p{i}"), 0.9));
        }
        assert_eq!(recent.len(), 3);
        let phrases: Vec<_> = recent.iter().map(|e| e.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["p2", "p3", "p4"]);
        assert_eq!(recent.last().map(|e| e.phrase.as_str()), Some("p4"));
    }

    #[test]
    fn test_default_capacity() {
        let mut recent = RecentDetections::default();
        for _ in 0..150 {
            recent.push(event("a", 0.9));
        }
        assert_eq!(recent.len(), RECENT_DETECTIONS_CAPACITY);
    }
}
