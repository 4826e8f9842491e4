//! Actuator module - wheel drive commands derived from the PID correction

pub mod drive;

pub use drive::SimulatedDrive;

/// Duty cycle limit in percent, both directions.
pub const MAX_DUTY_PERCENT: i32 = 100;

// ============================================================================
// DUTY MAPPING
// ============================================================================

pub fn clamp_duty(percent: i32) -> i32 {
    percent.clamp(-MAX_DUTY_PERCENT, MAX_DUTY_PERCENT)
}

/// Maps a percent command to the `[-1.0, 1.0]` duty fraction a motor driver takes.
pub fn duty_fraction(percent: i32) -> f64 {
    clamp_duty(percent) as f64 / MAX_DUTY_PERCENT as f64
}

// ============================================================================
// WHEEL COMMAND
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelCommand {
    pub left: i32,
    pub right: i32,
}

impl WheelCommand {
    /// Both wheels get the correction truncated toward zero, in percent.
    pub fn from_correction(correction: f64) -> Self {
        // `as` saturates and maps NaN to 0.
        let power = correction as i32;
        Self {
            left: power,
            right: power,
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for WheelCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L:{} R:{}", self.left, self.right)
    }
}

// ============================================================================
// DRIVE - Sink for wheel commands
// ============================================================================

pub trait Drive {
    /// Sets both wheel motors, in percent duty. Out-of-range values are clamped.
    fn set_wheels(&mut self, command: WheelCommand);

    fn stop(&mut self) {
        self.set_wheels(WheelCommand::stop());
    }
}
