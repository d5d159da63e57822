//! Duty-cycle scheduler: a single background task that polls an optional
//! chunk source at the configured cadence and backs off when the process
//! uses more CPU than its budget.
//!
//! The task only drives cadence. Whatever the chunk source yields is the
//! source's business (typically it hands audio to a recognizer that calls
//! back into the engine); the scheduler never runs the matcher itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cpu::CpuSampler;
use crate::metrics::{metric_names, MetricsRegistry};

/// Longest throttle pause, reached at twice the CPU budget.
pub const MAX_THROTTLE_SLEEP_MS: f64 = 500.0;
/// Below this fraction of the budget no throttling happens.
pub const LOW_WATERMARK: f64 = 0.5;
/// At this multiple of the budget the throttle pause is maxed out.
pub const HIGH_WATERMARK: f64 = 2.0;

/// What a chunk source hands back per iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Audio(Vec<u8>),
    Text(String),
}

impl Chunk {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Audio(bytes) => bytes.len(),
            Chunk::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Polled once per duty cycle. Errors are logged and the loop carries on.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, String>;
}

impl<F> ChunkSource for F
where
    F: FnMut() -> Result<Option<Chunk>, String> + Send,
{
    fn next_chunk(&mut self) -> Result<Option<Chunk>, String> {
        self()
    }
}

/// What the loop needs from its owner each iteration.
pub trait ListeningHost: Send + Sync + 'static {
    /// `(chunk_duration_ms, max_cpu_percent)` from the current config.
    fn cadence(&self) -> (u64, f64);
    fn add_listening_time(&self, seconds: f64);
}

/// Published by the scheduler, read-only to everyone else.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListeningStatus {
    pub active: bool,
    pub duty_cycle_ms: f64,
    pub throttle_sleep_ms: f64,
    pub chunks_processed: u64,
    pub throttle_events: u64,
    pub last_cpu_percent: f64,
}

/// Linear watermark throttle. No pause at or below half the budget, the full
/// [`MAX_THROTTLE_SLEEP_MS`] at or above twice the budget, linear in between.
pub fn throttle_sleep_ms(cpu_percent: f64, max_cpu_percent: f64) -> f64 {
    let low = max_cpu_percent * LOW_WATERMARK;
    let high = max_cpu_percent * HIGH_WATERMARK;
    if cpu_percent <= low {
        0.0
    } else if cpu_percent >= high {
        MAX_THROTTLE_SLEEP_MS
    } else {
        (cpu_percent - low) / (high - low) * MAX_THROTTLE_SLEEP_MS
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DutyCycleScheduler {
    status: Arc<RwLock<ListeningStatus>>,
    sampler: Arc<Mutex<Box<dyn CpuSampler>>>,
    metrics: Arc<MetricsRegistry>,
    running: Mutex<Option<Running>>,
}

impl DutyCycleScheduler {
    pub fn new(sampler: Box<dyn CpuSampler>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            status: Arc::new(RwLock::new(ListeningStatus::default())),
            sampler: Arc::new(Mutex::new(sampler)),
            metrics,
            running: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ListeningStatus {
        self.status.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn the loop on the current Tokio runtime. Returns false if it is
    /// already running or no runtime is available.
    pub fn start<H: ListeningHost>(
        &self,
        host: Arc<H>,
        chunk_source: Option<Box<dyn ChunkSource>>,
    ) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("duty cycle scheduler already running");
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "no tokio runtime, cannot start listening");
                return false;
            }
        };

        {
            let mut status = self.status.write();
            *status = ListeningStatus {
                active: true,
                ..ListeningStatus::default()
            };
        }

        let token = CancellationToken::new();
        let handle = runtime.spawn(run_duty_cycle(
            host,
            chunk_source,
            Arc::clone(&self.sampler),
            Arc::clone(&self.status),
            Arc::clone(&self.metrics),
            token.clone(),
        ));
        *running = Some(Running { token, handle });
        info!("listening_started");
        true
    }

    /// Cancel the loop and wait for it to finish. No chunk-source call
    /// happens after this returns.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { token, handle }) = running {
            token.cancel();
            if let Err(e) = handle.await {
                error!(error = %e, "duty cycle task ended abnormally");
            }
            info!("listening_stopped");
        }
        self.status.write().active = false;
    }
}

impl Drop for DutyCycleScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

async fn run_duty_cycle<H: ListeningHost>(
    host: Arc<H>,
    mut chunk_source: Option<Box<dyn ChunkSource>>,
    sampler: Arc<Mutex<Box<dyn CpuSampler>>>,
    status: Arc<RwLock<ListeningStatus>>,
    metrics: Arc<MetricsRegistry>,
    token: CancellationToken,
) {
    info!(has_source = chunk_source.is_some(), "duty cycle loop started");

    while !token.is_cancelled() {
        let iteration_start = Instant::now();
        let span = metrics.span(metric_names::DUTY_CYCLE_ITERATION);
        let (chunk_ms, max_cpu) = host.cadence();

        if let Some(source) = chunk_source.as_mut() {
            match catch_unwind(AssertUnwindSafe(|| source.next_chunk())) {
                Ok(Ok(Some(chunk))) => debug!(bytes = chunk.len(), "chunk_received"),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(error = %e, "chunk source failed"),
                Err(_) => warn!("chunk source panicked"),
            }
        }

        host.add_listening_time(chunk_ms as f64 / 1000.0);

        let cpu = sampler.lock().sample().unwrap_or(0.0);
        let sleep_ms = throttle_sleep_ms(cpu, max_cpu);
        let wait = if sleep_ms > 0.0 {
            Duration::from_secs_f64(sleep_ms / 1000.0)
        } else {
            Duration::from_millis(chunk_ms).saturating_sub(iteration_start.elapsed())
        };

        {
            let mut s = status.write();
            s.chunks_processed += 1;
            if sleep_ms > 0.0 {
                s.throttle_events += 1;
            }
            s.duty_cycle_ms = chunk_ms as f64 + sleep_ms;
            s.throttle_sleep_ms = sleep_ms;
            s.last_cpu_percent = cpu;
        }
        if sleep_ms > 0.0 {
            debug!(cpu_percent = cpu, max_cpu_percent = max_cpu, sleep_ms, "throttled");
        }
        span.finish();

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    status.write().active = false;
    info!("duty cycle loop exited");
}
