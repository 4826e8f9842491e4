//! Driver module - the sensor -> PID -> wheels control loop
//!
//! One iteration reads the gyro, measures the time since the previous read,
//! feeds the negated pitch rate into the windowed PID, maps the correction to
//! a wheel command and emits a trace record. The loop runs on its own thread
//! and stops after `max_iterations` or when `LoopStats::shutdown` is set.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Sender, TrySendError};
use log::{debug, info, warn};

use crate::actuator::{clamp_duty, Drive, WheelCommand};
use crate::config::{Config, LoopConfig};
use crate::controller::{PidSnapshot, WindowedPid};
use crate::error::{Error, Result};
use crate::metrics::TimingMetrics;
use crate::sensor::RateSensor;
use crate::trace::TraceRecord;

const STATUS_LOG_INTERVAL: u64 = 500;

// ============================================================================
// LOOP STATS - Shared counters and shutdown flag
// ============================================================================

pub struct LoopStats {
    pub iterations: AtomicU64,
    pub skipped_samples: AtomicU64,
    pub trace_dropped: AtomicU64,
    pub shutdown: AtomicBool,
}

impl LoopStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            iterations: AtomicU64::new(0),
            skipped_samples: AtomicU64::new(0),
            trace_dropped: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoopSummary {
    pub iterations: u64,
    pub skipped_samples: u64,
    pub trace_dropped: u64,
    pub final_snapshot: PidSnapshot,
    pub last_command: WheelCommand,
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

pub struct ControlLoop<S, D> {
    pid: WindowedPid,
    sensor: S,
    drive: D,
    config: LoopConfig,
    metrics: TimingMetrics,
    start: Instant,
    last_read: Instant,
    last_command: WheelCommand,
}

impl<S: RateSensor, D: Drive> ControlLoop<S, D> {
    pub fn new(pid: WindowedPid, sensor: S, drive: D, config: LoopConfig, metrics: TimingMetrics) -> Self {
        let now = Instant::now();
        Self {
            pid,
            sensor,
            drive,
            config,
            metrics,
            start: now,
            last_read: now,
            last_command: WheelCommand::stop(),
        }
    }

    /// Sets the instant the first sample's elapsed time is measured from.
    pub fn starting_at(mut self, start: Instant) -> Self {
        self.start = start;
        self.last_read = start;
        self
    }

    /// Runs one sensor -> PID -> wheels step and returns its trace record.
    pub fn run_iteration(&mut self) -> TraceRecord {
        let reading = self.sensor.read_rates();
        let elapsed_us = micros(reading.timestamp.saturating_duration_since(self.last_read));
        self.last_read = reading.timestamp;

        let ingest_start = Instant::now();
        let correction = self.pid.ingest_sample(-reading.y, elapsed_us);
        self.metrics.record_ingest(ingest_start.elapsed());

        if self.config.drive_enabled {
            let command = WheelCommand::from_correction(correction);
            self.drive.set_wheels(command);
            self.last_command = WheelCommand {
                left: clamp_duty(command.left),
                right: clamp_duty(command.right),
            };
        }

        let time_us = micros(reading.timestamp.saturating_duration_since(self.start));
        TraceRecord::new(time_us, elapsed_us, &self.pid.snapshot(), self.last_command.left)
    }

    /// Loops until the iteration limit or shutdown, then stops the wheels.
    pub fn run(mut self, stats: &LoopStats, trace_tx: Option<Sender<TraceRecord>>) -> Result<LoopSummary> {
        info!(
            "Control loop started (budget: {}us, max iterations: {})",
            self.pid.window_budget_us(),
            self.config.max_iterations
        );

        let interval = Duration::from_micros(self.config.loop_interval_us);
        let mut iterations = 0u64;
        let mut trace_dropped = 0u64;
        let mut outcome = Ok(());

        loop {
            if stats.shutdown.load(Ordering::Relaxed) {
                info!("Control loop shutting down");
                break;
            }
            if self.config.max_iterations > 0 && iterations >= self.config.max_iterations {
                break;
            }

            let cycle_start = Instant::now();
            let record = self.run_iteration();
            iterations += 1;

            if let Some(tx) = &trace_tx {
                match tx.try_send(record) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        trace_dropped += 1;
                        if trace_dropped == 1 {
                            warn!("Trace channel full, dropping records");
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        outcome = Err(Error::ChannelClosed("trace"));
                        break;
                    }
                }
            }

            stats.iterations.store(iterations, Ordering::Relaxed);
            stats.skipped_samples.store(self.pid.skipped_samples(), Ordering::Relaxed);
            stats.trace_dropped.store(trace_dropped, Ordering::Relaxed);

            if iterations % STATUS_LOG_INTERVAL == 0 {
                debug!(
                    "iteration {}: mean {:.3} I {:.3} D {:.3} slots {} wheels {}",
                    iterations, record.mean_error, record.integral, record.derivative,
                    record.live_samples, self.last_command
                );
            }

            let elapsed = cycle_start.elapsed();
            self.metrics.record_cycle(elapsed);
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        self.drive.stop();
        self.last_command = WheelCommand::stop();
        info!("Control loop stopped after {} iterations", iterations);

        outcome.map(|()| LoopSummary {
            iterations,
            skipped_samples: self.pid.skipped_samples(),
            trace_dropped,
            final_snapshot: self.pid.snapshot(),
            last_command: self.last_command,
        })
    }

    pub fn pid(&self) -> &WindowedPid {
        &self.pid
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }
}

/// Builds the controller from `config` and runs the loop on its own thread.
pub fn spawn_control_loop<S, D>(
    config: &Config,
    sensor: S,
    drive: D,
    trace_tx: Option<Sender<TraceRecord>>,
    metrics: TimingMetrics,
) -> Result<(thread::JoinHandle<Result<LoopSummary>>, Arc<LoopStats>)>
where
    S: RateSensor + Send + 'static,
    D: Drive + Send + 'static,
{
    let pid = WindowedPid::from_config(&config.pid)?;
    let control = ControlLoop::new(pid, sensor, drive, config.control_loop.clone(), metrics);

    let stats = LoopStats::new();
    let stats_clone = stats.clone();

    let handle = thread::Builder::new()
        .name("control-loop".to_string())
        .spawn(move || control.run(&stats_clone, trace_tx))?;

    Ok((handle, stats))
}

/// Sets `stats.shutdown` on Ctrl-C so the loop stops the wheels and drops its
/// trace sender. Can only be installed once per process.
pub fn install_shutdown_handler(stats: &Arc<LoopStats>) -> Result<()> {
    let stats = stats.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        stats.shutdown.store(true, Ordering::Relaxed);
    })?;
    Ok(())
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
