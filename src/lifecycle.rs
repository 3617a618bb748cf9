//! Service lifecycle vocabulary shared by the runtime and the OS bindings.
use std::{fmt, time::Duration};

use strum_macros::{AsRefStr, EnumIter, EnumString};

/// Current state of a service as understood by the service control manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl LifecycleState {
    /// The `SERVICE_*` state code.
    pub fn raw(self) -> u32 {
        match self {
            LifecycleState::Stopped => 1,
            LifecycleState::StartPending => 2,
            LifecycleState::StopPending => 3,
            LifecycleState::Running => 4,
            LifecycleState::ContinuePending => 5,
            LifecycleState::PausePending => 6,
            LifecycleState::Paused => 7,
        }
    }

    /// Stable states carry no progress, so their checkpoint is always zero.
    pub fn is_stable(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Stopped)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Status record delivered to the service control manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// State being reported.
    pub state: LifecycleState,
    /// Win32 exit code.
    pub exit_code: u32,
    /// Whether the service currently accepts stop requests.
    pub accepts_stop: bool,
    /// Estimated time the pending operation still needs.
    pub wait_hint: Duration,
    /// Progress counter for pending operations.
    pub checkpoint: u32,
}

/// Control request delivered by the service control manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Interrogate,
    Pause,
    Continue,
    Shutdown,
    /// Any other `SERVICE_CONTROL_*` code.
    Other(u32),
}

/// Answer a control handler gives back to the service control manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResult {
    /// `NO_ERROR`.
    NoError,
    /// `ERROR_CALL_NOT_IMPLEMENTED`.
    NotImplemented,
    /// Any other Win32 error code.
    Other(u32),
}

/// Tracks the reported state and the checkpoint counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTracker {
    state: LifecycleState,
    checkpoint: u32,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self {
            state: LifecycleState::Stopped,
            checkpoint: 0,
        }
    }
}

impl StatusTracker {
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn checkpoint(&self) -> u32 {
        self.checkpoint
    }

    /// Computes the record for reporting `state` without committing it.
    pub fn next(&self, state: LifecycleState, exit_code: u32, wait_hint: Duration) -> ServiceStatus {
        let checkpoint = if state.is_stable() {
            0
        } else {
            self.checkpoint.wrapping_add(1)
        };

        ServiceStatus {
            state,
            exit_code,
            accepts_stop: state != LifecycleState::StartPending,
            wait_hint,
            checkpoint,
        }
    }

    /// Records a status that was delivered.
    pub fn commit(&mut self, status: &ServiceStatus) {
        self.state = status.state;
        self.checkpoint = status.checkpoint;
    }
}
