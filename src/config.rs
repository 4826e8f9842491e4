//! Configuration loading for the controller, loop, simulated sensor and trace

use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::controller::PidGains;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/windowed_pid.toml";

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pid: PidConfig,
    pub control_loop: LoopConfig,
    pub sensor: SensorConfig,
    pub trace: TraceConfig,
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = Self::from_toml(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pid.validate()?;
        self.sensor.validate()?;
        if self.trace.enabled && self.trace.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "trace.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// PID CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Longest span of real time the window may cover, in microseconds
    pub window_budget_us: u64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            window_budget_us: 5000,
        }
    }
}

impl PidConfig {
    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp, self.ki, self.kd)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, gain) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !gain.is_finite() {
                return Err(Error::InvalidConfig(format!("pid.{} must be finite, got {}", name, gain)));
            }
        }
        if self.window_budget_us == 0 {
            return Err(Error::InvalidConfig(
                "pid.window_budget_us must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CONTROL LOOP CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Stop after this many iterations; 0 runs until shutdown
    pub max_iterations: u64,
    /// Minimum period of one iteration; 0 is free-running
    pub loop_interval_us: u64,
    /// Apply the correction to the wheels
    pub drive_enabled: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            loop_interval_us: 0,
            drive_enabled: false,
        }
    }
}

// ============================================================================
// SIMULATED SENSOR CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub seed: u64,
    /// Peak gyro noise in deg/s
    pub noise_amplitude: f64,
    /// Rate the simulated body settles to with the wheels idle, in deg/s
    pub base_rate: f64,
    /// deg/s of rate removed per percent of wheel duty
    pub command_response: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            noise_amplitude: 2.0,
            base_rate: 0.0,
            command_response: 0.05,
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.noise_amplitude.is_finite() && self.noise_amplitude >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "sensor.noise_amplitude must be a non-negative number, got {}",
                self.noise_amplitude
            )));
        }
        if !self.base_rate.is_finite() || !self.command_response.is_finite() {
            return Err(Error::InvalidConfig(
                "sensor.base_rate and sensor.command_response must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TRACE CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    pub path: String,
    /// Records buffered between the loop and the writer thread
    pub channel_capacity: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "trace.txt".to_string(),
            channel_capacity: 1024,
        }
    }
}
