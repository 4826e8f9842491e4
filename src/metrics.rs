//! Metrics module - control loop timing statistics

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TIMING METRICS - Thread-safe loop timing
// ============================================================================

#[derive(Clone)]
pub struct TimingMetrics {
    ingest_hist: Arc<Mutex<Histogram<u64>>>,
    cycle_hist: Arc<Mutex<Histogram<u64>>>,
    // Jitter tracking (variance in cycle time)
    last_cycle_time_ns: Arc<AtomicU64>,
    jitter_hist: Arc<Mutex<Histogram<u64>>>,
}

impl TimingMetrics {
    pub fn new() -> Self {
        Self {
            ingest_hist: Arc::new(Mutex::new(new_histogram())),
            cycle_hist: Arc::new(Mutex::new(new_histogram())),
            last_cycle_time_ns: Arc::new(AtomicU64::new(0)),
            jitter_hist: Arc::new(Mutex::new(new_histogram())),
        }
    }

    /// Record the time spent inside one `ingest_sample` call
    pub fn record_ingest(&self, duration: Duration) {
        self.ingest_hist.lock().record(duration.as_nanos() as u64).ok();
    }

    /// Record a full loop iteration and the jitter against the previous one
    pub fn record_cycle(&self, duration: Duration) {
        let cycle_ns = duration.as_nanos() as u64;
        self.cycle_hist.lock().record(cycle_ns).ok();

        let last = self.last_cycle_time_ns.swap(cycle_ns, Ordering::Relaxed);
        if last > 0 {
            self.jitter_hist.lock().record(cycle_ns.abs_diff(last)).ok();
        }
    }

    pub fn report(&self) -> MetricsReport {
        let ingest = self.ingest_hist.lock();
        let cycle = self.cycle_hist.lock();
        let jitter = self.jitter_hist.lock();

        MetricsReport {
            ingest_p50: Duration::from_nanos(ingest.value_at_quantile(0.5)),
            ingest_p99: Duration::from_nanos(ingest.value_at_quantile(0.99)),
            cycle_p50: Duration::from_nanos(cycle.value_at_quantile(0.5)),
            cycle_p99: Duration::from_nanos(cycle.value_at_quantile(0.99)),
            jitter_p50: Duration::from_nanos(jitter.value_at_quantile(0.5)),
            jitter_p99: Duration::from_nanos(jitter.value_at_quantile(0.99)),
            samples: cycle.len(),
        }
    }
}

impl Default for TimingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn new_histogram() -> Histogram<u64> {
    // Three significant figures is always a valid precision.
    Histogram::new(3).expect("histogram with 3 significant figures")
}

// ============================================================================
// METRICS REPORT - Summary statistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub ingest_p50: Duration,
    pub ingest_p99: Duration,
    pub cycle_p50: Duration,
    pub cycle_p99: Duration,
    pub jitter_p50: Duration,
    pub jitter_p99: Duration,
    pub samples: u64,
}
