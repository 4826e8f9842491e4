//! Sensor module - angular-rate sources feeding the control loop

use std::time::Instant;

pub mod gyro;

pub use gyro::GyroSimulator;

// ============================================================================
// GYRO READING
// ============================================================================

/// One three-axis angular-rate read, in deg/s.
#[derive(Debug, Clone, Copy)]
pub struct GyroReading {
    pub timestamp: Instant,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sequence_id: u64,
}

// ============================================================================
// RATE SENSOR - Source of gyro reads
// ============================================================================

pub trait RateSensor {
    fn read_rates(&mut self) -> GyroReading;
}
