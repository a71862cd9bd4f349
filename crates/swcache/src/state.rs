//! Worker lifecycle states

use std::fmt;

/// Lifecycle of one worker generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built but not yet installed
    Parsed,
    /// Precaching the static list
    Installing,
    /// Precache complete, waiting to be activated
    Installed,
    /// Pruning stale buckets
    Activating,
    /// Handling fetches
    Activated,
    /// Install failed or a newer generation took over
    Redundant,
}

impl WorkerState {
    /// Whether fetch events may be handled in this state
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    /// Whether the worker can never run again
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}
