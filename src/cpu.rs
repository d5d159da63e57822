//! CPU usage sampling for the duty-cycle throttle.
//! Sampling is optional: a sampler that cannot measure reports `None`, which
//! the scheduler treats as an idle process.

/// Source of the current process CPU usage, in percent of one core.
pub trait CpuSampler: Send {
    fn sample(&mut self) -> Option<f64>;
}

/// Used when no sampler is available. Never throttles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCpuSampler;

impl CpuSampler for NullCpuSampler {
    fn sample(&mut self) -> Option<f64> {
        None
    }
}

/// Replays a fixed reading. Useful for hosts that measure CPU elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct FixedCpuSampler(pub f64);

impl CpuSampler for FixedCpuSampler {
    fn sample(&mut self) -> Option<f64> {
        Some(self.0)
    }
}

impl<F> CpuSampler for F
where
    F: FnMut() -> Option<f64> + Send,
{
    fn sample(&mut self) -> Option<f64> {
        self()
    }
}

#[cfg(feature = "process-cpu")]
pub use process::ProcessCpuSampler;

#[cfg(feature = "process-cpu")]
mod process {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    use super::CpuSampler;

    /// Reads this process's CPU usage through sysinfo. The first reading
    /// after construction is 0.0; usage is measured between refreshes.
    pub struct ProcessCpuSampler {
        sys: System,
        pid: Option<Pid>,
    }

    impl ProcessCpuSampler {
        pub fn new() -> Self {
            let pid = match sysinfo::get_current_pid() {
                Ok(pid) => Some(pid),
                Err(e) => {
                    tracing::warn!(error = e, "current pid unavailable, cpu sampling disabled");
                    None
                }
            };
            Self {
                sys: System::new(),
                pid,
            }
        }
    }

    impl Default for ProcessCpuSampler {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CpuSampler for ProcessCpuSampler {
        fn sample(&mut self) -> Option<f64> {
            let pid = self.pid?;
            self.sys
                .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            self.sys.process(pid).map(|p| p.cpu_usage() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sampler_reports_nothing() {
        assert_eq!(NullCpuSampler.sample(), None);
    }

    #[test]
    fn test_closure_sampler() {
        let mut readings = vec![30.0, 7.5].into_iter();
        let mut sampler = move || readings.next();
        assert_eq!(CpuSampler::sample(&mut sampler), Some(30.0));
        assert_eq!(CpuSampler::sample(&mut sampler), Some(7.5));
        assert_eq!(CpuSampler::sample(&mut sampler), None);
    }
}
