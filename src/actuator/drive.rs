use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::debug;

use super::{clamp_duty, Drive, WheelCommand};

/// In-memory drive that remembers what it was told and optionally feeds the
/// applied duty back into a simulated sensor.
#[derive(Debug, Default)]
pub struct SimulatedDrive {
    last_command: WheelCommand,
    commands_applied: u64,
    feedback: Option<Arc<AtomicI32>>,
}

impl SimulatedDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_feedback(feedback: Arc<AtomicI32>) -> Self {
        Self {
            feedback: Some(feedback),
            ..Self::default()
        }
    }

    pub fn last_command(&self) -> WheelCommand {
        self.last_command
    }

    pub fn commands_applied(&self) -> u64 {
        self.commands_applied
    }
}

impl Drive for SimulatedDrive {
    fn set_wheels(&mut self, command: WheelCommand) {
        let applied = WheelCommand {
            left: clamp_duty(command.left),
            right: clamp_duty(command.right),
        };

        if applied != command {
            debug!("Wheel command {} clamped to {}", command, applied);
        }

        if let Some(feedback) = &self.feedback {
            feedback.store(applied.left, Ordering::Relaxed);
        }
        self.last_command = applied;
        self.commands_applied += 1;
    }
}
