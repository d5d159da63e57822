//! Detection lifecycle: Idle → Listening → Detected → Cooldown → Listening.
//! Cooldown expiry is checked lazily against a deadline whenever the state is
//! read, so a late or missing timer never leaves the detector stuck.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// All states of the detection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    /// Detection disabled or never started.
    Idle,
    Listening,
    /// Transient; immediately followed by Cooldown.
    Detected,
    Cooldown,
    /// Reserved for host integrations; never entered by the engine itself.
    Error,
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionState::Idle => write!(f, "IDLE"),
            DetectionState::Listening => write!(f, "LISTENING"),
            DetectionState::Detected => write!(f, "DETECTED"),
            DetectionState::Cooldown => write!(f, "COOLDOWN"),
            DetectionState::Error => write!(f, "ERROR"),
        }
    }
}

struct Inner {
    state: DetectionState,
    cooldown_until: Option<Instant>,
}

/// Thread-safe state machine with watch channel for reactive subscribers.
pub struct StateMachine {
    inner: RwLock<Inner>,
    state_tx: watch::Sender<DetectionState>,
    state_rx: watch::Receiver<DetectionState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(DetectionState::Idle);
        Self {
            inner: RwLock::new(Inner {
                state: DetectionState::Idle,
                cooldown_until: None,
            }),
            state_tx,
            state_rx,
        }
    }

    fn set(&self, inner: &mut Inner, next: DetectionState) {
        let prev = inner.state;
        inner.state = next;
        if next != DetectionState::Cooldown {
            inner.cooldown_until = None;
        }
        let _ = self.state_tx.send(next);
        if prev != next {
            info!(from = %prev, to = %next, "state_transition");
        }
    }

    /// Effective state at `now`, expiring a finished cooldown first.
    pub fn current_at(&self, now: Instant) -> DetectionState {
        {
            let inner = self.inner.read();
            if !Self::cooldown_expired(&inner, now) {
                return inner.state;
            }
        }
        let mut inner = self.inner.write();
        if Self::cooldown_expired(&inner, now) {
            debug!("cooldown_expired");
            self.set(&mut inner, DetectionState::Listening);
        }
        inner.state
    }

    pub fn current(&self) -> DetectionState {
        self.current_at(Instant::now())
    }

    fn cooldown_expired(inner: &Inner, now: Instant) -> bool {
        inner.state == DetectionState::Cooldown
            && inner.cooldown_until.is_some_and(|deadline| now >= deadline)
    }

    /// Whether a detection attempt at `now` may proceed to matching.
    pub fn accepts_detection_at(&self, now: Instant) -> bool {
        self.current_at(now) == DetectionState::Listening
    }

    /// Any state → Listening.
    pub fn enable(&self) {
        let mut inner = self.inner.write();
        self.set(&mut inner, DetectionState::Listening);
    }

    /// Any state → Idle.
    pub fn disable(&self) {
        let mut inner = self.inner.write();
        self.set(&mut inner, DetectionState::Idle);
    }

    /// Listening → Detected → Cooldown as one step. Returns false (and changes
    /// nothing) unless the machine is listening at `now`.
    pub fn record_detection_at(&self, now: Instant, cooldown: Duration) -> bool {
        let mut inner = self.inner.write();
        if Self::cooldown_expired(&inner, now) {
            self.set(&mut inner, DetectionState::Listening);
        }
        if inner.state != DetectionState::Listening {
            return false;
        }
        self.set(&mut inner, DetectionState::Detected);
        // A deadline past the end of `Instant` cools down until re-enabled.
        inner.cooldown_until = now.checked_add(cooldown);
        inner.state = DetectionState::Cooldown;
        let _ = self.state_tx.send(DetectionState::Cooldown);
        info!(
            from = %DetectionState::Detected,
            to = %DetectionState::Cooldown,
            cooldown_ms = cooldown.as_millis() as u64,
            "state_transition"
        );
        true
    }

    /// Put the machine in the reserved error state. Only hosts call this.
    pub fn fail(&self) {
        let mut inner = self.inner.write();
        self.set(&mut inner, DetectionState::Error);
    }

    /// Remaining cooldown at `now`, if cooling down.
    pub fn cooldown_remaining_at(&self, now: Instant) -> Option<Duration> {
        let inner = self.inner.read();
        match (inner.state, inner.cooldown_until) {
            (DetectionState::Cooldown, Some(deadline)) if deadline > now => Some(deadline - now),
            (DetectionState::Cooldown, None) => Some(Duration::MAX),
            _ => None,
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), DetectionState::Idle);
        assert!(!sm.accepts_detection_at(Instant::now()));
    }

    #[test]
    fn test_enable_disable() {
        let sm = StateMachine::new();
        sm.enable();
        assert_eq!(sm.current(), DetectionState::Listening);
        sm.disable();
        assert_eq!(sm.current(), DetectionState::Idle);
    }

    #[test]
    fn test_detection_enters_cooldown_then_expires() {
        let sm = StateMachine::new();
        sm.enable();
        let t0 = Instant::now();
        assert!(sm.record_detection_at(t0, Duration::from_millis(100)));
        assert_eq!(sm.current_at(t0), DetectionState::Cooldown);
        assert!(!sm.accepts_detection_at(t0 + Duration::from_millis(50)));
        assert!(!sm.record_detection_at(t0 + Duration::from_millis(50), Duration::from_millis(100)));
        assert_eq!(
            sm.current_at(t0 + Duration::from_millis(100)),
            DetectionState::Listening
        );
    }

    #[test]
    fn test_detection_rejected_when_idle() {
        let sm = StateMachine::new();
        assert!(!sm.record_detection_at(Instant::now(), Duration::from_secs(1)));
        assert_eq!(sm.current(), DetectionState::Idle);
    }

    #[test]
    fn test_zero_cooldown_allows_immediate_redetection() {
        let sm = StateMachine::new();
        sm.enable();
        let t0 = Instant::now();
        assert!(sm.record_detection_at(t0, Duration::ZERO));
        assert!(sm.record_detection_at(t0, Duration::ZERO));
    }

    #[test]
    fn test_disable_clears_cooldown() {
        let sm = StateMachine::new();
        sm.enable();
        let t0 = Instant::now();
        sm.record_detection_at(t0, Duration::from_secs(60));
        sm.disable();
        assert_eq!(sm.cooldown_remaining_at(t0), None);
        sm.enable();
        assert!(sm.accepts_detection_at(t0));
    }

    #[test]
    fn test_unrepresentable_cooldown_lasts_until_enabled() {
        let sm = StateMachine::new();
        sm.enable();
        let t0 = Instant::now();
        assert!(sm.record_detection_at(t0, Duration::MAX));
        assert_eq!(sm.current_at(t0 + Duration::from_secs(86_400)), DetectionState::Cooldown);
        assert_eq!(sm.cooldown_remaining_at(t0), Some(Duration::MAX));
        sm.enable();
        assert!(sm.accepts_detection_at(t0));
    }

    #[test]
    fn test_subscribers_see_cooldown() {
        let sm = StateMachine::new();
        let rx = sm.subscribe();
        sm.enable();
        sm.record_detection_at(Instant::now(), Duration::from_secs(1));
        assert_eq!(*rx.borrow(), DetectionState::Cooldown);
    }
}
