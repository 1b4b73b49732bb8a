//! Data structures for tracking run state.
//!
//! This module defines the run handle (`RunId`), the lifecycle status of a
//! run (`RunStatus`), and the caller-owned record (`RunState`) that holds a
//! run's output sink and runtime information.

use std::fmt;
use std::time::Instant;

use crate::events::RunEvent;
use crate::output::LogBuffer;

/// Handle identifying one run for the lifetime of the host process.
///
/// Handles are allocated from a monotonic counter and never reused, even
/// after the run reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The current lifecycle status of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Process is running.
    Running,
    /// Process has exited on its own.
    Exited { code: Option<i32> },
    /// Process was cancelled by the user and has terminated.
    Cancelled { code: Option<i32> },
    /// Process failed to start or the run loop hit an error.
    Failed { error: String },
}

impl RunStatus {
    /// True once no further events can arrive for this run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// True if the run counts as successful (exited with code zero).
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited { code: Some(0) })
    }
}

/// Caller-owned record of a single run.
///
/// The supervisor never touches this; the caller applies events to it as
/// they drain from the notification channel.
#[derive(Debug, Clone)]
pub struct RunState {
    /// The argument vector this run was started with.
    pub argv: Vec<String>,
    /// Short label for display (usually the scan target).
    pub label: String,
    pub status: RunStatus,
    pub started_at: Instant,
    /// Output sink for this run.
    pub logs: LogBuffer,
}

impl RunState {
    pub fn new(argv: Vec<String>, label: String, max_lines: usize) -> Self {
        Self {
            argv,
            label,
            status: RunStatus::Running,
            started_at: Instant::now(),
            logs: LogBuffer::new(max_lines),
        }
    }

    /// Applies one of this run's events, appending output to the sink and
    /// recording the terminal status.
    pub fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Output { line, .. } => {
                self.logs.push(line.clone());
            }
            RunEvent::Exited { code, cancelled, .. } => {
                self.status = if *cancelled {
                    RunStatus::Cancelled { code: *code }
                } else {
                    RunStatus::Exited { code: *code }
                };
            }
            RunEvent::Failed { error, .. } => {
                self.status = RunStatus::Failed {
                    error: error.clone(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_tracks_lifecycle() {
        let mut state = RunState::new(vec!["sqlmap".into()], "run".into(), 16);
        assert_eq!(state.status, RunStatus::Running);
        state.apply(&RunEvent::Output {
            id: RunId(0),
            line: "probing".into(),
        });
        assert_eq!(state.logs.len(), 1);
        state.apply(&RunEvent::Exited {
            id: RunId(0),
            code: Some(0),
            cancelled: false,
        });
        assert!(state.status.is_terminal());
        assert!(state.status.is_success());
    }

    #[test]
    fn cancelled_exit_is_not_a_failure() {
        let mut state = RunState::new(vec!["sqlmap".into()], "run".into(), 16);
        state.apply(&RunEvent::Exited {
            id: RunId(3),
            code: None,
            cancelled: true,
        });
        assert_eq!(state.status, RunStatus::Cancelled { code: None });
        assert!(!state.status.is_success());
        assert!(!matches!(state.status, RunStatus::Failed { .. }));
    }
}
