use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GyroReading, RateSensor};
use crate::actuator::SimulatedDrive;
use crate::config::SensorConfig;

/// Simulated gyro on a two-wheeled body.
///
/// The controlled (y) rate drifts toward `base_rate`, is pushed back by the
/// wheel duty last applied through the connected drive, and carries uniform
/// noise of `noise_amplitude`.
pub struct GyroSimulator {
    rng: StdRng,
    sequence_counter: u64,
    wheel_command: Arc<AtomicI32>,
    pub base_rate: f64,
    pub noise_amplitude: f64,
    pub command_response: f64,
}

impl GyroSimulator {
    pub fn new(seed: u64) -> Self {
        Self::from_config(&SensorConfig {
            seed,
            ..SensorConfig::default()
        })
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            sequence_counter: 0,
            wheel_command: Arc::new(AtomicI32::new(0)),
            base_rate: config.base_rate,
            noise_amplitude: config.noise_amplitude,
            command_response: config.command_response,
        }
    }

    /// Returns a drive whose commands feed back into this simulator's rate.
    pub fn connect_drive(&self) -> SimulatedDrive {
        SimulatedDrive::with_feedback(self.wheel_command.clone())
    }

    pub fn get_sequence(&self) -> u64 {
        self.sequence_counter
    }

    pub fn inject_disturbance(&mut self, rate_delta: f64) {
        self.base_rate += rate_delta;
    }

    fn noise(&mut self) -> f64 {
        if self.noise_amplitude > 0.0 {
            self.rng.gen_range(-self.noise_amplitude..self.noise_amplitude)
        } else {
            0.0
        }
    }
}

impl RateSensor for GyroSimulator {
    fn read_rates(&mut self) -> GyroReading {
        self.sequence_counter += 1;
        let command = self.wheel_command.load(Ordering::Relaxed) as f64;

        let y = self.base_rate - self.command_response * command + self.noise();
        let x = self.noise();
        let z = self.noise();

        GyroReading {
            timestamp: Instant::now(),
            x,
            y,
            z,
            sequence_id: self.sequence_counter,
        }
    }
}
