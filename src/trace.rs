//! Driver-side execution traces.
//!
//! Every release, observation and join the driver performs is appended to a
//! [`TraceLog`]. Because the harness serializes worker progress, the log is
//! a complete record of one interleaving: two runs with the same driver
//! schedule produce identical logs. Tests compare snapshots or
//! [`TraceLog::hash`] values across runs, or persist them as goldens via
//! serde.

use crate::status::Status;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// One driver action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEvent {
    /// The driver released the worker (`proceed`).
    Released { worker: usize },
    /// The driver saw the worker leave `Running` (`wait`); `status` is the
    /// value observed under the worker's status lock.
    Observed { worker: usize, status: Status },
    /// The driver joined the worker's OS thread.
    Joined { worker: usize },
}

/// Append-only event log owned by the scheduler.
#[derive(Debug, Default)]
pub struct TraceLog {
    events: Mutex<Vec<TraceEvent>>,
}

impl TraceLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: TraceEvent) {
        self.events.lock().expect("trace mutex poisoned").push(event);
    }

    /// Copy of the events recorded so far.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("trace mutex poisoned").clone()
    }

    /// Consume the log, yielding its events.
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
            .into_inner()
            .expect("trace mutex poisoned")
    }

    /// Order-sensitive hash of the whole log.
    pub fn hash(&self) -> u64 {
        let events = self.events.lock().expect("trace mutex poisoned");
        let mut hasher = DefaultHasher::new();
        events.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let log = TraceLog::new();
        log.record(TraceEvent::Released { worker: 1 });
        log.record(TraceEvent::Observed {
            worker: 1,
            status: Status::Waiting,
        });
        log.record(TraceEvent::Joined { worker: 1 });

        assert_eq!(
            log.snapshot(),
            [
                TraceEvent::Released { worker: 1 },
                TraceEvent::Observed {
                    worker: 1,
                    status: Status::Waiting
                },
                TraceEvent::Joined { worker: 1 },
            ]
        );
    }

    #[test]
    fn hash_is_order_sensitive() {
        let a = TraceLog::new();
        a.record(TraceEvent::Released { worker: 0 });
        a.record(TraceEvent::Released { worker: 1 });

        let b = TraceLog::new();
        b.record(TraceEvent::Released { worker: 1 });
        b.record(TraceEvent::Released { worker: 0 });

        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.hash());
    }
}
