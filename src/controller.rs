//! Controller module - time-windowed PID engine and its sample window

pub mod pid;
pub mod window;

pub use pid::{PidGains, PidSnapshot, WindowedPid, INTEGRAL_LIMIT, MICROS_PER_SECOND};
pub use window::{Sample, SampleWindow, WINDOW_CAPACITY};
