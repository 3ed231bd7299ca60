//! Exit codes reserved by compiled pods, and how to read a finished pod's exit code.

use std::fmt::{Display, Formatter};

/// The engine is unreachable, or the network, a volume or the sandbox could not be created.
/// Nothing of the pod's own has run yet.
pub const PROVISION_FAILED: i32 = 122;

/// The monitor lost track of the running containers.
pub const MONITOR_ABORTED: i32 = 123;

/// A container could not be pulled, created or started. Matches the code docker itself uses
/// when `docker run` fails before the container process exists.
pub const LAUNCH_FAILED: i32 = 125;

/// The pod was interrupted with SIGINT.
pub const INTERRUPTED: i32 = 130;

/// The pod was terminated with SIGTERM.
pub const TERMINATED: i32 = 143;

/// What a finished pod's exit code says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// A container exited with this code.
    Failed(i32),
    ProvisionFailed,
    LaunchFailed,
    MonitorAborted,
    Interrupted,
}

impl Outcome {
    /// A container can itself exit with one of the reserved codes, in which case this
    /// classification is wrong. The reserved codes are rarely used by workloads.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => Outcome::Succeeded,
            PROVISION_FAILED => Outcome::ProvisionFailed,
            MONITOR_ABORTED => Outcome::MonitorAborted,
            LAUNCH_FAILED => Outcome::LaunchFailed,
            INTERRUPTED | TERMINATED => Outcome::Interrupted,
            other => Outcome::Failed(other),
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Succeeded
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "pod succeeded"),
            Outcome::Failed(code) => write!(f, "pod failed, a container exited with code {}", code),
            Outcome::ProvisionFailed => write!(f, "pod resources could not be provisioned"),
            Outcome::LaunchFailed => write!(f, "a container could not be launched"),
            Outcome::MonitorAborted => write!(f, "pod monitor aborted"),
            Outcome::Interrupted => write!(f, "pod was interrupted"),
        }
    }
}
