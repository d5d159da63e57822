//! The wake-word engine: phrase store, detection pipeline, feedback learning
//! and the background listening loop behind one handle.
//!
//! Every mutating entry point takes the same core lock, so detection checks,
//! feedback, config updates and enable/disable are serialized. The listening
//! loop only touches that lock briefly per iteration and never across an
//! await. Callbacks run after the lock is released, so a subscriber may call
//! back into the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackId, CallbackRegistry};
use crate::config::{ConfigPatch, WakeWordConfig};
use crate::cpu::{CpuSampler, NullCpuSampler};
use crate::error::ConfigError;
use crate::event::DetectionEvent;
use crate::matcher::PhraseMatcher;
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry};
use crate::normalize::{normalize_phrase, normalize_text};
use crate::scheduler::{ChunkSource, DutyCycleScheduler, ListeningHost, ListeningStatus};
use crate::scorer::ConfidenceScorer;
use crate::state_machine::{DetectionState, StateMachine};
use crate::stats::{DetectionStats, RecentDetections, StatsReport};
use crate::thresholds::AdaptiveThresholds;

struct Core {
    config: WakeWordConfig,
    thresholds: AdaptiveThresholds,
    stats: DetectionStats,
    recent: RecentDetections,
}

struct Shared {
    core: Mutex<Core>,
    state_machine: StateMachine,
    callbacks: CallbackRegistry,
    metrics: Arc<MetricsRegistry>,
    matcher: PhraseMatcher,
    scorer: ConfidenceScorer,
}

impl ListeningHost for Shared {
    fn cadence(&self) -> (u64, f64) {
        let core = self.core.lock();
        (core.config.chunk_duration_ms, core.config.max_cpu_percent)
    }

    fn add_listening_time(&self, seconds: f64) {
        self.core.lock().stats.add_listening_time(seconds);
    }
}

/// Shared by reference (typically `Arc<WakeWordEngine>`) between the
/// recognizer feeding transcripts, the API layer and the listening loop.
pub struct WakeWordEngine {
    shared: Arc<Shared>,
    scheduler: DutyCycleScheduler,
}

impl WakeWordEngine {
    pub fn new(config: WakeWordConfig) -> Result<Self, ConfigError> {
        Self::with_components(config, PhraseMatcher::default(), Box::new(NullCpuSampler))
    }

    pub fn with_cpu_sampler(
        config: WakeWordConfig,
        sampler: Box<dyn CpuSampler>,
    ) -> Result<Self, ConfigError> {
        Self::with_components(config, PhraseMatcher::default(), sampler)
    }

    pub fn with_components(
        config: WakeWordConfig,
        matcher: PhraseMatcher,
        sampler: Box<dyn CpuSampler>,
    ) -> Result<Self, ConfigError> {
        let config = config.validated()?;

        let mut thresholds =
            AdaptiveThresholds::new(config.base_confidence_threshold, config.adaptive_enabled);
        thresholds.sync_phrases(&config.wake_phrases);

        let state_machine = StateMachine::new();
        if config.enabled {
            state_machine.enable();
        }

        let metrics = Arc::new(MetricsRegistry::new());
        info!(
            phrases = ?config.wake_phrases,
            threshold = config.base_confidence_threshold,
            cooldown_s = config.cooldown_seconds,
            "wake word engine created"
        );

        let shared = Arc::new(Shared {
            core: Mutex::new(Core {
                config,
                thresholds,
                stats: DetectionStats::default(),
                recent: RecentDetections::default(),
            }),
            state_machine,
            callbacks: CallbackRegistry::new(),
            metrics: Arc::clone(&metrics),
            matcher,
            scorer: ConfidenceScorer::new(),
        });

        Ok(Self {
            shared,
            scheduler: DutyCycleScheduler::new(sampler, metrics),
        })
    }

    // --- Detection ---

    /// Check one transcript for a configured wake phrase. Returns None when
    /// detection is disabled, cooling down, or no phrase scores at or above
    /// its threshold. On success the engine is already in cooldown and all
    /// callbacks have been notified.
    pub fn check_text_for_wake_word(&self, text: &str, confidence: f64) -> Option<DetectionEvent> {
        let span = self.shared.metrics.span(metric_names::CHECK_TEXT);
        let event = self.detect(text, confidence, Instant::now());
        span.finish();

        if let Some(ref event) = event {
            self.shared.callbacks.dispatch(event);
        }
        event
    }

    fn detect(&self, text: &str, confidence: f64, now: Instant) -> Option<DetectionEvent> {
        let shared = &*self.shared;
        let mut core = shared.core.lock();

        if !core.config.enabled {
            return None;
        }
        if !shared.state_machine.accepts_detection_at(now) {
            debug!(state = %shared.state_machine.current_at(now), "detection_suppressed");
            return None;
        }

        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return None;
        }
        let base_confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        let mut detected: Option<DetectionEvent> = None;
        for phrase in &core.config.wake_phrases {
            let Some(kind) = shared.matcher.match_kind(&normalized, phrase) else {
                continue;
            };
            let score = shared.scorer.score(&normalized, phrase, base_confidence);
            let threshold = core.thresholds.get(phrase);
            if score < threshold {
                debug!(phrase = %phrase, score, threshold, "below_threshold");
                continue;
            }

            let mut metadata = Map::new();
            metadata.insert("original_text".into(), json!(text));
            metadata.insert("base_confidence".into(), json!(base_confidence));
            metadata.insert("threshold".into(), json!(threshold));
            metadata.insert("matched_via".into(), json!(kind.to_string()));
            detected = Some(DetectionEvent::new(phrase.clone(), score, metadata));
            break;
        }

        let event = detected?;
        let cooldown =
            Duration::try_from_secs_f64(core.config.cooldown_seconds).unwrap_or(Duration::MAX);
        if !shared.state_machine.record_detection_at(now, cooldown) {
            return None;
        }
        core.stats.record_detection(&event);
        core.recent.push(event.clone());
        info!(
            phrase = %event.phrase,
            confidence = event.confidence,
            "wake_word_detected"
        );
        Some(event)
    }

    // --- Phrases ---

    /// Returns false if the phrase is empty or already configured.
    pub fn add_wake_phrase(&self, phrase: &str) -> bool {
        let Some(phrase) = normalize_phrase(phrase) else {
            return false;
        };
        let mut core = self.shared.core.lock();
        if core.config.wake_phrases.contains(&phrase) {
            return false;
        }
        core.thresholds.remove(&phrase);
        core.thresholds.insert(&phrase);
        info!(phrase = %phrase, "wake_phrase_added");
        core.config.wake_phrases.push(phrase);
        true
    }

    /// Returns false if the phrase was not configured.
    pub fn remove_wake_phrase(&self, phrase: &str) -> bool {
        let Some(phrase) = normalize_phrase(phrase) else {
            return false;
        };
        let mut core = self.shared.core.lock();
        let Some(idx) = core.config.wake_phrases.iter().position(|p| *p == phrase) else {
            return false;
        };
        core.config.wake_phrases.remove(idx);
        core.thresholds.remove(&phrase);
        info!(phrase = %phrase, "wake_phrase_removed");
        true
    }

    pub fn list_wake_phrases(&self) -> Vec<String> {
        self.shared.core.lock().config.wake_phrases.clone()
    }

    // --- Configuration ---

    pub fn get_config(&self) -> WakeWordConfig {
        self.shared.core.lock().config.clone()
    }

    /// Merge recognized keys into the configuration. Unknown keys are ignored;
    /// a recognized key with a bad value rejects the whole update.
    pub fn update_config(&self, updates: &Map<String, Value>) -> Result<(), ConfigError> {
        let patch = ConfigPatch::from_map(updates)?;
        self.apply_config_patch(&patch)
    }

    pub fn apply_config_patch(&self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut core = self.shared.core.lock();
        let next = core.config.merged(patch)?;

        core.thresholds.set_base(next.base_confidence_threshold);
        core.thresholds.set_adaptive(next.adaptive_enabled);
        if next.wake_phrases != core.config.wake_phrases {
            core.thresholds.sync_phrases(&next.wake_phrases);
        }
        match patch.enabled {
            // An explicit enable also recovers from the error state, without
            // cutting short a cooldown that is already running.
            Some(true)
                if !core.config.enabled
                    || self.shared.state_machine.current() == DetectionState::Error =>
            {
                self.shared.state_machine.enable();
            }
            Some(false) if core.config.enabled => self.shared.state_machine.disable(),
            _ => {}
        }
        core.config = next;
        info!(config = ?core.config, "config_updated");
        Ok(())
    }

    // --- Feedback ---

    /// Confirm the most recent detection. Lowers its phrase threshold while
    /// the false-positive rate is under budget. No-op without detections.
    pub fn report_true_positive(&self) {
        let mut core = self.shared.core.lock();
        let Some(phrase) = core.recent.last().map(|e| e.phrase.clone()) else {
            debug!("true positive reported with no detections");
            return;
        };
        core.stats.true_positives += 1;
        if !core.config.wake_phrases.contains(&phrase) {
            debug!(phrase = %phrase, "feedback for removed phrase, threshold untouched");
            return;
        }
        let rate = core.stats.false_positive_rate();
        let max_rate = core.config.max_false_positive_rate;
        if let Some(threshold) = core.thresholds.on_true_positive(&phrase, rate, max_rate) {
            info!(phrase = %phrase, threshold, "threshold_lowered");
        }
    }

    /// Reject the most recent detection and raise its phrase threshold.
    /// No-op without detections.
    pub fn report_false_positive(&self) {
        let mut core = self.shared.core.lock();
        let Some(phrase) = core.recent.last().map(|e| e.phrase.clone()) else {
            debug!("false positive reported with no detections");
            return;
        };
        core.stats.false_positives += 1;
        if !core.config.wake_phrases.contains(&phrase) {
            debug!(phrase = %phrase, "feedback for removed phrase, threshold untouched");
            return;
        }
        if let Some(threshold) = core.thresholds.on_false_positive(&phrase) {
            info!(phrase = %phrase, threshold, "threshold_raised");
        }
    }

    pub fn get_threshold(&self, phrase: &str) -> f64 {
        let core = self.shared.core.lock();
        let phrase = normalize_phrase(phrase).unwrap_or_default();
        core.thresholds.get(&phrase)
    }

    /// Current threshold per configured phrase, in configuration order.
    pub fn thresholds(&self) -> Vec<(String, f64)> {
        let core = self.shared.core.lock();
        core.config
            .wake_phrases
            .iter()
            .map(|p| (p.clone(), core.thresholds.get(p)))
            .collect()
    }

    pub fn reset_thresholds(&self) {
        self.shared.core.lock().thresholds.reset();
        info!("thresholds_reset");
    }

    // --- Stats ---

    pub fn get_stats(&self) -> StatsReport {
        let core = self.shared.core.lock();
        StatsReport::new(&core.stats, core.recent.len())
    }

    pub fn reset_stats(&self) {
        let mut core = self.shared.core.lock();
        core.stats = DetectionStats::default();
        core.recent.clear();
        info!("stats_reset");
    }

    pub fn latency_summary(&self) -> std::collections::HashMap<String, MetricSummary> {
        self.shared.metrics.summary()
    }

    // --- Lifecycle ---

    pub fn enable(&self) {
        let mut core = self.shared.core.lock();
        core.config.enabled = true;
        self.shared.state_machine.enable();
    }

    pub fn disable(&self) {
        let mut core = self.shared.core.lock();
        core.config.enabled = false;
        self.shared.state_machine.disable();
    }

    /// Effective state, with any finished cooldown already expired.
    pub fn current_state(&self) -> DetectionState {
        self.shared.state_machine.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DetectionState> {
        self.shared.state_machine.subscribe()
    }

    /// Enter the reserved error state on behalf of a failing collaborator.
    /// `enable()` recovers.
    pub fn mark_error(&self) {
        let _core = self.shared.core.lock();
        warn!("engine marked as failed by host");
        self.shared.state_machine.fail();
    }

    // --- Callbacks ---

    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&DetectionEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.shared.callbacks.register(Arc::new(callback))
    }

    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        self.shared.callbacks.unregister(id)
    }

    // --- Background listening ---

    /// Start the duty-cycle loop on the current Tokio runtime. Returns false
    /// if it is already running.
    pub fn start_listening(&self, chunk_source: Option<Box<dyn ChunkSource>>) -> bool {
        self.scheduler.start(Arc::clone(&self.shared), chunk_source)
    }

    /// Stop the loop and wait for its last iteration to finish.
    pub async fn stop_listening(&self) {
        self.scheduler.stop().await;
    }

    pub fn get_listening_status(&self) -> ListeningStatus {
        self.scheduler.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> WakeWordEngine {
        let config = WakeWordConfig {
            wake_phrases: vec!["hey autobot".into()],
            cooldown_seconds: 0.0,
            ..WakeWordConfig::default()
        };
        WakeWordEngine::new(config).unwrap()
    }

    #[test]
    fn test_starts_listening_when_enabled() {
        assert_eq!(engine().current_state(), DetectionState::Listening);
        let disabled = WakeWordEngine::new(WakeWordConfig {
            enabled: false,
            ..WakeWordConfig::default()
        })
        .unwrap();
        assert_eq!(disabled.current_state(), DetectionState::Idle);
        assert!(disabled.check_text_for_wake_word("hey autobot", 0.9).is_none());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let result = WakeWordEngine::new(WakeWordConfig {
            base_confidence_threshold: 2.0,
            ..WakeWordConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_event_metadata() {
        let e = engine();
        let event = e.check_text_for_wake_word("  Hey, Autobot  ", 0.9).unwrap();
        assert_eq!(event.phrase, "hey autobot");
        assert_eq!(event.metadata["original_text"], json!("  Hey, Autobot  "));
        assert_eq!(event.metadata["matched_via"], json!("word_sequence"));
        assert_eq!(event.metadata["threshold"], json!(0.7));
    }

    #[test]
    fn test_empty_and_nan_input() {
        let e = engine();
        assert!(e.check_text_for_wake_word("   ", 0.9).is_none());
        assert!(e.check_text_for_wake_word("hey autobot", f64::NAN).is_none());
    }

    #[test]
    fn test_add_remove_phrases() {
        let e = engine();
        assert!(e.add_wake_phrase("OK  Autobot"));
        assert!(!e.add_wake_phrase("ok autobot"));
        assert!(!e.add_wake_phrase("   "));
        assert_eq!(e.list_wake_phrases(), vec!["hey autobot", "ok autobot"]);
        assert_eq!(e.get_threshold("ok autobot"), 0.7);

        assert!(e.remove_wake_phrase("ok autobot"));
        assert!(!e.remove_wake_phrase("ok autobot"));
        assert_eq!(e.list_wake_phrases(), vec!["hey autobot"]);
    }

    #[test]
    fn test_feedback_without_detection_is_noop() {
        let e = engine();
        e.report_true_positive();
        e.report_false_positive();
        let stats = e.get_stats();
        assert_eq!(stats.true_positives, 0);
        assert_eq!(stats.false_positives, 0);
    }

    #[test]
    fn test_update_config_toggles_state() {
        let e = engine();
        let updates = json!({"enabled": false}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert_eq!(e.current_state(), DetectionState::Idle);
        assert!(!e.get_config().enabled);

        let updates = json!({"enabled": true}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert_eq!(e.current_state(), DetectionState::Listening);
    }

    #[test]
    fn test_bad_update_leaves_config_untouched() {
        let e = engine();
        let before = e.get_config();
        let updates = json!({"cooldown_seconds": 5.0, "max_cpu_percent": -1.0})
            .as_object()
            .cloned()
            .unwrap();
        assert!(e.update_config(&updates).is_err());
        assert_eq!(e.get_config(), before);
    }

    #[test]
    fn test_error_state_blocks_until_enabled() {
        let e = engine();
        e.mark_error();
        assert_eq!(e.current_state(), DetectionState::Error);
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_none());
        e.enable();
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
    }

    #[test]
    fn test_enable_patch_recovers_from_error() {
        let e = engine();
        e.mark_error();
        let updates = json!({"enabled": true}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert_eq!(e.current_state(), DetectionState::Listening);
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
    }

    #[test]
    fn test_enable_patch_keeps_running_cooldown() {
        let e = engine();
        let updates = json!({"cooldown_seconds": 60.0}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
        let updates = json!({"enabled": true}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert_eq!(e.current_state(), DetectionState::Cooldown);
    }

    #[test]
    fn test_oversized_cooldown_holds_until_reenabled() {
        let e = engine();
        let updates = json!({"cooldown_seconds": 1e20}).as_object().cloned().unwrap();
        e.update_config(&updates).unwrap();
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_none());
        assert_eq!(e.current_state(), DetectionState::Cooldown);
        e.enable();
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
    }

    #[test]
    fn test_feedback_for_removed_phrase_leaves_thresholds() {
        let e = engine();
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
        e.report_false_positive();
        assert!((e.get_threshold("hey autobot") - 0.77).abs() < 1e-9);

        assert!(e.remove_wake_phrase("hey autobot"));
        e.report_false_positive();
        e.report_true_positive();
        let stats = e.get_stats();
        assert_eq!(stats.false_positives, 2);
        assert_eq!(stats.true_positives, 1);
        assert!(e.thresholds().is_empty());

        assert!(e.add_wake_phrase("hey autobot"));
        assert_eq!(e.get_threshold("hey autobot"), 0.7);
    }

    #[test]
    fn test_callback_may_reenter_engine() {
        let e = Arc::new(engine());
        let weak = Arc::downgrade(&e);
        e.register_callback(move |_event| {
            let engine = weak.upgrade().ok_or("engine dropped")?;
            assert_eq!(engine.get_stats().total_detections, 1);
            Ok(())
        });
        assert!(e.check_text_for_wake_word("hey autobot", 0.9).is_some());
    }

    #[test]
    fn test_check_latency_recorded() {
        let e = engine();
        e.check_text_for_wake_word("nothing here", 0.9);
        assert_eq!(e.latency_summary()[metric_names::CHECK_TEXT].count, 1);
    }
}
