//! Worker lifecycle states.
//!
//! The driver and each worker agree on progress through a single
//! [`Status`] word per worker, always read and written under that
//! worker's status mutex.
//!
//! ```text
//!                resume                yield
//!   NotStarted ─────────► Running ◄──────────── Waiting
//!                            │    ────────────►
//!                            │ lock(&l)            ▲
//!                            ▼                     │ resume
//!                     WaitingExternal ─────────────┘
//!                            │  (acquired: back to Running)
//!                            │
//!         body returns       ▼
//!   Running ────────────► Finished        (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one worker, as published through its status word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The OS thread exists but the user body has not been entered.
    NotStarted,
    /// The worker owns the step; the driver is suspended on this worker.
    Running,
    /// The worker yielded back; the driver is free to act.
    Waiting,
    /// The worker is blocked inside an external lock acquisition. The driver
    /// may keep going and must not expect a yield until the wait completes.
    WaitingExternal,
    /// The user body returned. Terminal: the status is never reassigned.
    Finished,
}

impl Status {
    /// True once the user body has returned.
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, Status::Finished)
    }

    /// True while the driver may still release this worker.
    #[inline]
    pub fn is_live(self) -> bool {
        !self.is_finished()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NotStarted => "not-started",
            Status::Running => "running",
            Status::Waiting => "waiting",
            Status::WaitingExternal => "waiting-external",
            Status::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn finished_is_terminal_predicate() {
        assert!(Status::Finished.is_finished());
        assert!(!Status::Finished.is_live());
        for live in [
            Status::NotStarted,
            Status::Running,
            Status::Waiting,
            Status::WaitingExternal,
        ] {
            assert!(live.is_live(), "{live} should be live");
        }
    }

    #[test]
    fn display_names_are_stable() {
        assert_eq!(Status::WaitingExternal.to_string(), "waiting-external");
        assert_eq!(Status::NotStarted.to_string(), "not-started");
    }
}
