pub mod actuator;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod sensor;
pub mod trace;

pub use actuator::{Drive, SimulatedDrive, WheelCommand};
pub use config::Config;
pub use controller::{PidGains, PidSnapshot, Sample, SampleWindow, WindowedPid};
pub use driver::{install_shutdown_handler, spawn_control_loop, ControlLoop, LoopStats, LoopSummary};
pub use error::{Error, Result};
pub use metrics::TimingMetrics;
pub use sensor::{GyroReading, GyroSimulator, RateSensor};
pub use trace::TraceRecord;
