use log::trace;

use super::window::{Sample, SampleWindow, WINDOW_CAPACITY};
use crate::config::PidConfig;
use crate::error::Result;

/// Microsecond-weighted quantities are divided by this to get per-second units.
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Anti-windup bound on the integral accumulator (both signs).
pub const INTEGRAL_LIMIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Values exposed to the driver after each ingest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidSnapshot {
    pub mean_error: f64,
    pub integral: f64,
    pub derivative: f64,
    pub correction: f64,
    pub live_samples: usize,
    pub elapsed_sum: u64,
}

/// PID controller whose averaging window spans at most `window_budget_us`
/// of real time and at most `N` samples.
pub struct WindowedPid<const N: usize = WINDOW_CAPACITY> {
    // Gains
    gains: PidGains,
    window_budget_us: u64,

    // State
    window: SampleWindow<N>,
    mean_error: f64,
    integral: f64,
    derivative: f64,
    correction: f64,
    skipped_samples: u64,
}

impl<const N: usize> WindowedPid<N> {
    /// Largest accepted `elapsed_us`; a full window of these still fits the u64 sum.
    pub const MAX_SAMPLE_ELAPSED_US: u64 = u64::MAX / N as u64;

    /// Largest accepted `|elapsed_us * error|`; any run of N of these keeps the
    /// weighted sum, and every partial sum left by eviction, finite.
    pub const MAX_WEIGHTED_ERROR: f64 = f64::MAX / (2.0 * N as f64);

    pub fn new(gains: PidGains, window_budget_us: u64) -> Self {
        Self {
            gains,
            window_budget_us,
            window: SampleWindow::new(),
            mean_error: 0.0,
            integral: 0.0,
            derivative: 0.0,
            correction: 0.0,
            skipped_samples: 0,
        }
    }

    pub fn from_config(config: &PidConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.gains(), config.window_budget_us))
    }

    /// Feeds one error observation taken `elapsed_us` after the previous one
    /// and returns the new correction.
    ///
    /// Samples that are zero-length, non-finite, or large enough to overflow
    /// the running sums are dropped and the previous correction is returned
    /// unchanged.
    pub fn ingest_sample(&mut self, error: f64, elapsed_us: u64) -> f64 {
        let sample = Sample::new(error, elapsed_us);
        if !self.accepts(&sample) {
            self.skipped_samples += 1;
            trace!(
                "skipping degenerate sample (error: {}, elapsed: {}us)",
                error,
                elapsed_us
            );
            return self.correction;
        }

        // Capacity eviction happens inside insert when the window is full.
        self.window.insert(sample);

        // Time-budget eviction, always keeping at least one sample.
        while self.window.elapsed_sum() > self.window_budget_us && self.window.len() > 1 {
            self.window.evict_oldest();
        }

        // Every live sample has elapsed_us > 0, so the sum is non-zero here.
        let elapsed_sum = self.window.elapsed_sum() as f64;
        let weighted_sum = self.window.weighted_sum();

        // Proportional term. A lone survivor is the sample just inserted, so its
        // mean is the raw error without the multiply/divide round trip.
        self.mean_error = if self.window.len() == 1 {
            error
        } else {
            weighted_sum / elapsed_sum
        };
        self.window.set_newest_mean(self.mean_error);

        // Integral term with anti-windup
        self.integral += weighted_sum / MICROS_PER_SECOND;
        self.integral = self.integral.clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);

        // Derivative term across the window span
        self.derivative = match (self.window.newest(), self.window.oldest()) {
            (Some(newest), Some(oldest)) if self.window.len() > 1 => {
                (newest.mean_at_insertion - oldest.mean_at_insertion) / (elapsed_sum / MICROS_PER_SECOND)
            }
            _ => 0.0,
        };

        self.correction = self.gains.kp * self.mean_error
            + self.gains.ki * self.integral
            + self.gains.kd * self.derivative;

        self.correction
    }

    fn accepts(&self, sample: &Sample) -> bool {
        sample.elapsed_us > 0
            && sample.elapsed_us <= Self::MAX_SAMPLE_ELAPSED_US
            && sample.weighted_error.is_finite()
            && sample.weighted_error.abs() <= Self::MAX_WEIGHTED_ERROR
            && (self.window.weighted_sum() + sample.weighted_error).is_finite()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.mean_error = 0.0;
        self.integral = 0.0;
        self.derivative = 0.0;
        self.correction = 0.0;
        self.skipped_samples = 0;
    }

    pub fn snapshot(&self) -> PidSnapshot {
        PidSnapshot {
            mean_error: self.mean_error,
            integral: self.integral,
            derivative: self.derivative,
            correction: self.correction,
            live_samples: self.window.len(),
            elapsed_sum: self.window.elapsed_sum(),
        }
    }

    pub fn mean_error(&self) -> f64 {
        self.mean_error
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn correction(&self) -> f64 {
        self.correction
    }

    pub fn live_samples(&self) -> usize {
        self.window.len()
    }

    pub fn elapsed_sum(&self) -> u64 {
        self.window.elapsed_sum()
    }

    /// Number of samples dropped by the ingest guard.
    pub fn skipped_samples(&self) -> u64 {
        self.skipped_samples
    }

    pub fn window(&self) -> &SampleWindow<N> {
        &self.window
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn window_budget_us(&self) -> u64 {
        self.window_budget_us
    }
}
