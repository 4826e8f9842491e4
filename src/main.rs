use std::env;

use log::{error, info, warn};

use windowed_pid::config::{Config, DEFAULT_CONFIG_PATH};
use windowed_pid::driver::{install_shutdown_handler, spawn_control_loop};
use windowed_pid::error::{Error, Result};
use windowed_pid::metrics::TimingMetrics;
use windowed_pid::sensor::GyroSimulator;
use windowed_pid::trace::{spawn_trace_writer, trace_channel};

/// Config path from the first positional argument, or the default.
fn parse_config_path() -> String {
    env::args()
        .nth(1)
        .filter(|arg| !arg.starts_with('-'))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("===========================================");
    println!("Starting Windowed PID Balance Controller");
    println!("===========================================\n");

    let config = Config::load(parse_config_path())?;
    info!(
        "Gains kP={} kI={} kD={}, window budget {}us",
        config.pid.kp, config.pid.ki, config.pid.kd, config.pid.window_budget_us
    );

    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = sensor.connect_drive();
    let metrics = TimingMetrics::new();

    let (trace_tx, trace_handle) = if config.trace.enabled {
        let (tx, rx) = trace_channel(config.trace.channel_capacity);
        (Some(tx), Some(spawn_trace_writer(&config.trace.path, rx)?))
    } else {
        (None, None)
    };

    let (loop_handle, stats) = spawn_control_loop(&config, sensor, drive, trace_tx, metrics.clone())?;
    if let Err(e) = install_shutdown_handler(&stats) {
        warn!("{}; Ctrl-C will not stop the wheels cleanly", e);
    }

    let loop_result = loop_handle
        .join()
        .unwrap_or_else(|_| Err(Error::ThreadPanicked("control-loop")));

    // The writer exits once the loop drops its sender.
    let trace_lines = match trace_handle {
        Some(handle) => match handle.join() {
            Ok(Ok(lines)) => Some(lines),
            Ok(Err(e)) => {
                error!("Trace writer failed: {}", e);
                return Err(e);
            }
            Err(_) => return Err(Error::ThreadPanicked("trace-writer")),
        },
        None => None,
    };

    let summary = loop_result?;
    let snapshot = summary.final_snapshot;

    println!("===========================================");
    println!("FINAL CONTROLLER STATE");
    println!("===========================================");
    println!("Iterations: {}", summary.iterations);
    println!("Skipped samples: {}", summary.skipped_samples);
    println!("Mean error: {:.4}", snapshot.mean_error);
    println!("Integral: {:.4}", snapshot.integral);
    println!("Derivative: {:.4}", snapshot.derivative);
    println!("Correction: {:.4}", snapshot.correction);
    println!("Window: {} slots spanning {}us", snapshot.live_samples, snapshot.elapsed_sum);
    if let Some(lines) = trace_lines {
        println!("Trace: {} lines to {} ({} dropped)", lines, config.trace.path, summary.trace_dropped);
    }

    let report = metrics.report();
    println!("\n=== Timing Metrics ===");
    println!("Ingest P50: {:?}, P99: {:?}", report.ingest_p50, report.ingest_p99);
    println!("Cycle P50: {:?}, P99: {:?}", report.cycle_p50, report.cycle_p99);
    println!("Jitter P50: {:?}, P99: {:?}", report.jitter_p50, report.jitter_p99);

    Ok(())
}
