//! Wake-word detection over streamed transcripts.
//!
//! Transcribed text and the recognizer's confidence go in through
//! [`WakeWordEngine::check_text_for_wake_word`]; detections come out as
//! [`DetectionEvent`]s, returned to the caller and fanned out to registered
//! callbacks. Per-phrase thresholds adapt to true/false-positive feedback, and
//! an optional background loop polls a chunk source within a CPU budget.

pub mod callbacks;
pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod event;
pub mod matcher;
pub mod metrics;
pub mod normalize;
pub mod scheduler;
pub mod scorer;
pub mod state_machine;
pub mod stats;
pub mod thresholds;

pub use callbacks::CallbackId;
pub use config::{ConfigPatch, WakeWordConfig};
pub use cpu::{CpuSampler, FixedCpuSampler, NullCpuSampler};
#[cfg(feature = "process-cpu")]
pub use cpu::ProcessCpuSampler;
pub use engine::WakeWordEngine;
pub use error::ConfigError;
pub use event::DetectionEvent;
pub use matcher::{MatchKind, PhraseMatcher};
pub use scheduler::{throttle_sleep_ms, Chunk, ChunkSource, ListeningStatus};
pub use scorer::ConfidenceScorer;
pub use state_machine::DetectionState;
pub use stats::{DetectionStats, StatsReport};

/// Install a `tracing` subscriber for binaries and examples. Honors
/// `RUST_LOG`, defaulting to debug output for this crate.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wakeword_engine=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
