use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed or requested status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Unknown,
    ScheduledToStart,
    Starting,
    Running,
    Restarting,
    ScheduledToStop,
    Stopping,
    Stopped,
    Error,
}

impl InstanceStatus {
    /// Statuses that count against an image's instance quota
    pub fn is_starting_or_started(self) -> bool {
        matches!(
            self,
            InstanceStatus::ScheduledToStart
                | InstanceStatus::Starting
                | InstanceStatus::Running
                | InstanceStatus::Restarting
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Stopped | InstanceStatus::Error)
    }

    fn rank(self) -> u8 {
        match self {
            InstanceStatus::Unknown => 0,
            InstanceStatus::ScheduledToStart => 1,
            InstanceStatus::Starting => 2,
            InstanceStatus::Running | InstanceStatus::Restarting => 3,
            InstanceStatus::ScheduledToStop => 4,
            InstanceStatus::Stopping => 5,
            InstanceStatus::Stopped | InstanceStatus::Error => 6,
        }
    }

    /// Whether moving from `self` to `next` follows the lifecycle forward.
    /// Terminal statuses never move; `Restarting` overlays `Running` both ways;
    /// `Error` is reachable from every live status.
    pub fn can_advance_to(self, next: InstanceStatus) -> bool {
        if self.is_terminal() || next == InstanceStatus::Unknown || self == next {
            return false;
        }
        if next == InstanceStatus::Error {
            return true;
        }
        match (self, next) {
            (InstanceStatus::Running, InstanceStatus::Restarting)
            | (InstanceStatus::Restarting, InstanceStatus::Running) => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// Map a provider status string onto our lifecycle
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_uppercase().as_str() {
            "PROVISIONING" => InstanceStatus::ScheduledToStart,
            "STARTING" => InstanceStatus::Starting,
            "RUNNING" => InstanceStatus::Running,
            "RESTARTING" | "UPDATING" => InstanceStatus::Restarting,
            "STOPPING" | "DELETING" => InstanceStatus::Stopping,
            "STOPPED" => InstanceStatus::Stopped,
            "ERROR" | "CRASHED" => InstanceStatus::Error,
            _ => InstanceStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Unknown => "Unknown",
            InstanceStatus::ScheduledToStart => "Scheduled to start",
            InstanceStatus::Starting => "Starting",
            InstanceStatus::Running => "Running",
            InstanceStatus::Restarting => "Restarting",
            InstanceStatus::ScheduledToStop => "Scheduled to stop",
            InstanceStatus::Stopping => "Stopping",
            InstanceStatus::Stopped => "Stopped",
            InstanceStatus::Error => "Error",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
