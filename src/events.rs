//! Event definitions for run notifications.
//!
//! The supervisor reports everything about a run through these events,
//! tagged with the run's handle. For one handle, `Output` events arrive in
//! production order and exactly one terminal event (`Exited` or `Failed`)
//! follows them. Events for different handles interleave freely.

use crate::process::RunId;

/// A notification from the supervisor about one run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A line of combined stdout/stderr output.
    Output { id: RunId, line: String },
    /// The process exited. `code` is `None` when it was killed by a signal.
    /// `cancelled` marks a user-initiated cancellation; it is not a failure.
    Exited {
        id: RunId,
        code: Option<i32>,
        cancelled: bool,
    },
    /// The process could not be started or the run loop hit an I/O error.
    Failed { id: RunId, error: String },
}

impl RunEvent {
    /// The handle this event belongs to.
    pub fn id(&self) -> RunId {
        match self {
            RunEvent::Output { id, .. }
            | RunEvent::Exited { id, .. }
            | RunEvent::Failed { id, .. } => *id,
        }
    }

    /// True for `Exited` and `Failed`; no further events follow these.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEvent::Output { .. })
    }
}
