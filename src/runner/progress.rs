//! Background progress monitor for benchmark runs.
//!
//! Periodically logs how many cases have been executed, failed and skipped,
//! so long runs with many workers can be followed without reading every
//! checker line.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Snapshot of run progress counters at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Cases currently materializing or running.
    pub in_flight: usize,
    pub elapsed: Duration,
}

/// Shared atomic counters, cloned into workers and the collector.
#[derive(Debug, Clone)]
pub struct ProgressCounters {
    pub executed: Arc<AtomicUsize>,
    pub failed: Arc<AtomicUsize>,
    pub skipped: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            executed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            skipped: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that logs run progress every `interval`.
///
/// Call [`ProgressMonitor::stop`] to cancel; dropping the monitor also stops
/// it at the next tick.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start logging. `total_cases` is the number of scheduled cases and is
    /// used for the completion percentage.
    pub fn start(counters: ProgressCounters, total_cases: usize, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let done = snap.executed + snap.failed;
                let pct = if total_cases > 0 {
                    (done as f64 / total_cases as f64 * 100.0).min(100.0)
                } else {
                    100.0
                };

                tracing::info!(
                    executed = snap.executed,
                    failed = snap.failed,
                    skipped = snap.skipped,
                    in_flight = snap.in_flight,
                    total_cases,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    "Run progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let snap = ProgressCounters::new().snapshot(Instant::now());
        assert_eq!(snap.executed, 0);
        assert_eq!(snap.failed, 0);
        assert_eq!(snap.skipped, 0);
        assert_eq!(snap.in_flight, 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let counters = ProgressCounters::new();
        let clone = counters.clone();
        counters.executed.fetch_add(2, Ordering::Relaxed);
        counters.failed.fetch_add(1, Ordering::Relaxed);
        let snap = clone.snapshot(Instant::now());
        assert_eq!(snap.executed, 2);
        assert_eq!(snap.failed, 1);
    }

    #[tokio::test]
    async fn test_monitor_start_stop() {
        let counters = ProgressCounters::new();
        counters.executed.fetch_add(3, Ordering::Relaxed);

        let monitor = ProgressMonitor::start(counters, 10, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(120)).await;
        monitor.stop().await;
    }
}
