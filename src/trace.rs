//! Trace module - per-iteration controller snapshots written to a flat text file
//!
//! Each line holds seven whitespace-separated fields:
//!
//! ```text
//! time_us mean_error integral derivative elapsed_us live_samples wheel_power
//! ```
//!
//! The control loop hands records to a writer thread over a bounded channel so
//! that file I/O never runs on the loop itself.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use log::info;

use crate::controller::PidSnapshot;
use crate::error::Result;

// ============================================================================
// TRACE RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRecord {
    /// Microseconds since the loop started
    pub time_us: u64,
    pub mean_error: f64,
    pub integral: f64,
    pub derivative: f64,
    /// Elapsed time fed with this iteration's sample
    pub elapsed_us: u64,
    pub live_samples: usize,
    /// Duty percent sent to the left wheel
    pub wheel_power: i32,
}

impl TraceRecord {
    pub fn new(time_us: u64, elapsed_us: u64, snapshot: &PidSnapshot, wheel_power: i32) -> Self {
        Self {
            time_us,
            mean_error: snapshot.mean_error,
            integral: snapshot.integral,
            derivative: snapshot.derivative,
            elapsed_us,
            live_samples: snapshot.live_samples,
            wheel_power,
        }
    }
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.time_us,
            self.mean_error,
            self.integral,
            self.derivative,
            self.elapsed_us,
            self.live_samples,
            self.wheel_power
        )
    }
}

// ============================================================================
// TRACE CHANNEL + WRITER
// ============================================================================

pub fn trace_channel(capacity: usize) -> (Sender<TraceRecord>, Receiver<TraceRecord>) {
    bounded(capacity)
}

/// Writes every record received until all senders are dropped.
/// Returns the number of lines written.
pub fn write_records<W: Write>(writer: &mut W, rx: &Receiver<TraceRecord>) -> Result<u64> {
    let mut lines = 0u64;
    for record in rx.iter() {
        writeln!(writer, "{}", record)?;
        lines += 1;
    }
    writer.flush()?;
    Ok(lines)
}

pub fn spawn_trace_writer(
    path: impl Into<PathBuf>,
    rx: Receiver<TraceRecord>,
) -> Result<thread::JoinHandle<Result<u64>>> {
    let path = path.into();
    let file = File::create(&path)?;

    let handle = thread::Builder::new()
        .name("trace-writer".to_string())
        .spawn(move || {
            let mut writer = BufWriter::new(file);
            let lines = write_records(&mut writer, &rx)?;
            info!("Trace writer finished: {} lines to {}", lines, path.display());
            Ok(lines)
        })?;

    Ok(handle)
}
