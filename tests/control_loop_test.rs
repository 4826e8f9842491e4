//! Control loop, actuator and trace plumbing tests

use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use parking_lot::Mutex;
use windowed_pid::actuator::{clamp_duty, duty_fraction, Drive};
use windowed_pid::config::{Config, LoopConfig, PidConfig, SensorConfig};
use windowed_pid::controller::PidSnapshot;
use windowed_pid::sensor::{GyroReading, RateSensor};
use windowed_pid::trace::{spawn_trace_writer, trace_channel, write_records, TraceRecord};
use windowed_pid::{
    spawn_control_loop, ControlLoop, Error, GyroSimulator, PidGains, SimulatedDrive, TimingMetrics,
    WheelCommand, WindowedPid,
};

/// Reports a constant rate with timestamps exactly `step` apart.
struct SteppedSensor {
    start: Instant,
    step: Duration,
    rate: f64,
    sequence: u32,
}

impl RateSensor for SteppedSensor {
    fn read_rates(&mut self) -> GyroReading {
        self.sequence += 1;
        GyroReading {
            timestamp: self.start + self.step * self.sequence,
            x: 0.0,
            y: self.rate,
            z: 0.0,
            sequence_id: self.sequence as u64,
        }
    }
}

/// Drive whose command history stays readable after the loop thread takes it.
#[derive(Clone, Default)]
struct SharedDrive {
    commands: Arc<Mutex<Vec<WheelCommand>>>,
}

impl Drive for SharedDrive {
    fn set_wheels(&mut self, command: WheelCommand) {
        self.commands.lock().push(command);
    }
}

fn quiet_sensor_config(base_rate: f64) -> SensorConfig {
    SensorConfig {
        seed: 5,
        noise_amplitude: 0.0,
        base_rate,
        command_response: 0.05,
    }
}

// ============================================================================
// ACTUATOR TESTS
// ============================================================================

#[test]
fn test_duty_is_clamped_to_full_scale() {
    assert_eq!(clamp_duty(150), 100);
    assert_eq!(clamp_duty(-250), -100);
    assert_eq!(clamp_duty(42), 42);
    assert_relative_eq!(duty_fraction(50), 0.5);
    assert_relative_eq!(duty_fraction(-300), -1.0);
}

#[test]
fn test_wheel_command_truncates_toward_zero() {
    assert_eq!(WheelCommand::from_correction(12.9), WheelCommand { left: 12, right: 12 });
    assert_eq!(WheelCommand::from_correction(-12.9), WheelCommand { left: -12, right: -12 });
    assert_eq!(WheelCommand::from_correction(f64::NAN), WheelCommand::stop());
    assert_eq!(WheelCommand::from_correction(3.0).to_string(), "L:3 R:3");
}

#[test]
fn test_simulated_drive_records_clamped_commands() {
    let mut drive = SimulatedDrive::new();

    drive.set_wheels(WheelCommand { left: 250, right: -7 });
    assert_eq!(drive.last_command(), WheelCommand { left: 100, right: -7 });

    drive.stop();
    assert_eq!(drive.last_command(), WheelCommand::stop());
    assert_eq!(drive.commands_applied(), 2);
}

// ============================================================================
// SENSOR TESTS
// ============================================================================

#[test]
fn test_gyro_sequence_increments() {
    let mut gyro = GyroSimulator::new(42);

    for expected_id in 1..=10 {
        let reading = gyro.read_rates();
        assert_eq!(reading.sequence_id, expected_id, "Sequence should increment");
        assert!(reading.y.is_finite());
    }
    assert_eq!(gyro.get_sequence(), 10);
}

#[test]
fn test_gyro_noise_stays_within_amplitude() {
    let mut gyro = GyroSimulator::new(42);
    gyro.noise_amplitude = 3.0;

    for _ in 0..1000 {
        let reading = gyro.read_rates();
        assert!(reading.y.abs() < 3.0);
        assert!(reading.x.abs() < 3.0);
    }
}

#[test]
fn test_connected_drive_feeds_back_into_rate() {
    let mut gyro = GyroSimulator::from_config(&quiet_sensor_config(4.0));
    let mut drive = gyro.connect_drive();

    assert_relative_eq!(gyro.read_rates().y, 4.0);

    drive.set_wheels(WheelCommand::from_correction(20.0));
    assert_relative_eq!(gyro.read_rates().y, 3.0);

    drive.stop();
    assert_relative_eq!(gyro.read_rates().y, 4.0);
}

// ============================================================================
// TRACE TESTS
// ============================================================================

#[test]
fn test_trace_record_formats_seven_fields() {
    let record = TraceRecord {
        time_us: 1500,
        mean_error: 2.0,
        integral: 0.5,
        derivative: -1.25,
        elapsed_us: 1000,
        live_samples: 5,
        wheel_power: -3,
    };

    assert_eq!(record.to_string(), "1500 2 0.5 -1.25 1000 5 -3");
}

#[test]
fn test_trace_record_from_snapshot() {
    let snapshot = PidSnapshot {
        mean_error: 1.0,
        integral: 2.0,
        derivative: 3.0,
        correction: 4.0,
        live_samples: 7,
        elapsed_sum: 4900,
    };

    let record = TraceRecord::new(10, 700, &snapshot, 4);
    assert_eq!(record.to_string(), "10 1 2 3 700 7 4");
}

#[test]
fn test_write_records_drains_until_senders_drop() {
    let (tx, rx) = trace_channel(8);
    let snapshot = WindowedPid::<4>::new(PidGains::new(1.0, 0.0, 0.0), 100).snapshot();
    for i in 0..5 {
        tx.send(TraceRecord::new(i, 1, &snapshot, 0)).unwrap();
    }
    drop(tx);

    let mut out = Vec::new();
    let lines = write_records(&mut out, &rx).unwrap();

    assert_eq!(lines, 5);
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 5);
}

#[test]
fn test_trace_writer_thread_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.txt");
    let (tx, rx) = trace_channel(4);
    let handle = spawn_trace_writer(&path, rx).unwrap();

    let mut pid: WindowedPid = WindowedPid::new(PidGains::new(1.0, 0.1, 0.01), 5000);
    for i in 1..=20u64 {
        pid.ingest_sample(1.0, 1000);
        tx.send(TraceRecord::new(i * 1000, 1000, &pid.snapshot(), 0)).unwrap();
    }
    drop(tx);

    assert_eq!(handle.join().unwrap().unwrap(), 20);

    let file = std::fs::File::open(&path).unwrap();
    let lines: Vec<String> = std::io::BufReader::new(file).lines().map(|l| l.unwrap()).collect();
    assert_eq!(lines.len(), 20);
    for line in &lines {
        assert_eq!(line.split_whitespace().count(), 7);
    }
    assert!(lines[19].starts_with("20000 1 "));
}

// ============================================================================
// CONTROL LOOP TESTS
// ============================================================================

#[test]
fn test_iteration_feeds_negated_rate_and_elapsed_time() {
    let start = Instant::now();
    let sensor = SteppedSensor {
        start,
        step: Duration::from_micros(1000),
        rate: -2.0,
        sequence: 0,
    };
    let pid: WindowedPid = WindowedPid::new(PidGains::new(10.0, 0.0, 0.0), 5000);
    let config = LoopConfig {
        max_iterations: 0,
        loop_interval_us: 0,
        drive_enabled: true,
    };
    let mut control = ControlLoop::new(pid, sensor, SimulatedDrive::new(), config, TimingMetrics::new())
        .starting_at(start);

    let mut record = control.run_iteration();
    for _ in 0..4 {
        record = control.run_iteration();
    }

    assert_eq!(record.elapsed_us, 1000);
    assert_eq!(record.time_us, 5000);
    assert_eq!(record.live_samples, 5);
    assert_eq!(record.mean_error, 2.0);
    assert_eq!(record.wheel_power, 20);
    assert_eq!(control.drive().last_command(), WheelCommand { left: 20, right: 20 });
    assert_eq!(control.pid().elapsed_sum(), 5000);
}

#[test]
fn test_disabled_drive_reports_zero_power() {
    let start = Instant::now();
    let sensor = SteppedSensor {
        start,
        step: Duration::from_micros(500),
        rate: 10.0,
        sequence: 0,
    };
    let pid: WindowedPid = WindowedPid::new(PidGains::new(1.0, 0.0, 0.0), 5000);
    let mut control = ControlLoop::new(pid, sensor, SimulatedDrive::new(), LoopConfig::default(), TimingMetrics::new())
        .starting_at(start);

    let record = control.run_iteration();

    assert_eq!(record.mean_error, -10.0);
    assert_eq!(record.wheel_power, 0);
    assert_eq!(control.drive().commands_applied(), 0);
}

#[test]
fn test_spawned_loop_runs_to_iteration_limit() {
    let mut config = Config::default();
    config.pid.kp = 1.0;
    config.control_loop.max_iterations = 50;
    config.control_loop.drive_enabled = true;
    config.sensor = quiet_sensor_config(4.0);

    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = sensor.connect_drive();
    let metrics = TimingMetrics::new();
    let (tx, rx) = trace_channel(128);

    let (handle, stats) = spawn_control_loop(&config, sensor, drive, Some(tx), metrics.clone()).unwrap();
    let summary = handle.join().unwrap().unwrap();

    assert_eq!(summary.iterations, 50);
    assert_eq!(stats.iterations.load(Ordering::Relaxed), 50);
    assert_eq!(summary.last_command, WheelCommand::stop(), "Wheels stop when the loop ends");
    assert_eq!(summary.trace_dropped, 0);
    assert_eq!(rx.try_iter().count(), 50);
    assert_eq!(metrics.report().samples, 50);
    assert!(summary.final_snapshot.live_samples >= 1);
    assert!(summary.final_snapshot.integral.abs() <= windowed_pid::controller::INTEGRAL_LIMIT);
}

#[test]
fn test_shutdown_flag_stops_unbounded_loop() {
    let mut config = Config::default();
    config.control_loop.max_iterations = 0;
    config.control_loop.loop_interval_us = 200;

    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = sensor.connect_drive();
    let (handle, stats) = spawn_control_loop(&config, sensor, drive, None, TimingMetrics::new()).unwrap();

    thread::sleep(Duration::from_millis(20));
    stats.shutdown.store(true, Ordering::Relaxed);

    let summary = handle.join().unwrap().unwrap();
    assert!(summary.iterations > 0);
}

#[test]
fn test_shutdown_from_another_thread_stops_wheels_and_flushes_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.txt");

    let mut config = Config::default();
    config.pid = PidConfig {
        kp: 1.0,
        ki: 0.0,
        kd: 0.0,
        window_budget_us: 5000,
    };
    config.control_loop.max_iterations = 0;
    config.control_loop.loop_interval_us = 200;
    config.control_loop.drive_enabled = true;
    config.sensor = quiet_sensor_config(4.0);

    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = SharedDrive::default();
    let (tx, rx) = trace_channel(1 << 16);
    let writer = spawn_trace_writer(&path, rx).unwrap();

    let (handle, stats) = spawn_control_loop(&config, sensor, drive.clone(), Some(tx), TimingMetrics::new()).unwrap();

    let signaller = {
        let stats = stats.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stats.shutdown.store(true, Ordering::Relaxed);
        })
    };
    signaller.join().unwrap();

    let summary = handle.join().unwrap().unwrap();
    let written = writer.join().unwrap().unwrap();

    let commands = drive.commands.lock();
    assert!(summary.iterations > 0);
    assert_eq!(commands.len() as u64, summary.iterations + 1, "One command per iteration plus the stop");
    assert_eq!(commands.last(), Some(&WheelCommand::stop()));
    assert!(commands.contains(&WheelCommand { left: -4, right: -4 }));

    assert_eq!(written, summary.iterations - summary.trace_dropped);
    let file = std::fs::File::open(&path).unwrap();
    let lines: Vec<String> = std::io::BufReader::new(file).lines().map(|l| l.unwrap()).collect();
    assert_eq!(lines.len() as u64, written, "Every sent record reaches the file");
    assert!(lines.iter().all(|line| line.split_whitespace().count() == 7));
}

#[test]
fn test_loop_fails_when_trace_writer_is_gone() {
    let config = Config::default();
    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = sensor.connect_drive();
    let (tx, rx) = trace_channel(4);
    drop(rx);

    let (handle, _stats) = spawn_control_loop(&config, sensor, drive, Some(tx), TimingMetrics::new()).unwrap();
    let result = handle.join().unwrap();

    assert!(matches!(result, Err(Error::ChannelClosed("trace"))));
}

#[test]
fn test_spawn_rejects_invalid_pid_config() {
    let mut config = Config::default();
    config.pid.window_budget_us = 0;
    let sensor = GyroSimulator::from_config(&config.sensor);
    let drive = sensor.connect_drive();

    let result = spawn_control_loop(&config, sensor, drive, None, TimingMetrics::new());
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
