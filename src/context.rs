//! Per-worker rendezvous state machine.
//!
//! # Protocol
//!
//! Each worker shares one [`WorkerContext`] with the driver: a status word
//! guarded by a mutex, plus a condition variable carrying both handshake
//! directions.
//!
//! ```text
//!    driver                                worker
//!      │                                     │
//!      │ resume(): Waiting→Running, notify   │
//!      ├────────────────────────────────────►│  (unblocks wait_for_resume)
//!      │                                     │ runs user code…
//!      │ wait_for_yield(): block while       │
//!      │ status == Running                   │ yield_now():
//!      │◄────────────────────────────────────┤   Running→Waiting, notify,
//!      │ …driver is free to act              │   block while status == Waiting
//! ```
//!
//! Every transition follows {lock `mu`, mutate, unlock, notify}; every wait
//! is a predicated loop, so spurious wakeups are benign.
//!
//! # The external-wait escape hatch
//!
//! [`WorkerContext::lock`] publishes `WaitingExternal` and notifies *before*
//! performing a blocking acquisition on a user-supplied lock. The driver's
//! wait-for-yield predicate is `status == Running`, not
//! `status != Waiting`, so the transition releases a driver that is parked
//! waiting for a yield that cannot come. The asymmetry against the worker's
//! wait-for-resume predicate (`status == Waiting`) is load-bearing:
//! `WaitingExternal` satisfies the driver's predicate but never the
//! worker's.
//!
//! # Invariants
//!
//! - For one worker, at most one of {driver thread, worker thread} makes
//!   forward progress at any instant; the other is blocked on `cv` or on an
//!   external primitive. `WaitingExternal` is the sole exception: both may
//!   run, the worker being blocked on the external lock rather than `cv`.
//! - `Finished` is terminal.
//! - `mu` is the innermost lock. It is never held across user code or an
//!   external acquisition.

use crate::lockable::{Lockable, SharedLockable};
use crate::status::Status;
use crate::sync::{Condvar, Mutex};

const POISONED: &str = "worker status mutex poisoned";

/// Shared rendezvous state for one worker.
///
/// The worker-side primitives (`yield_now`, `lock`, `lock_shared`) are
/// callable only from inside the user body; the remaining operations belong
/// to the companion [`Worker`](crate::Worker) and the
/// [`Scheduler`](crate::Scheduler).
pub struct WorkerContext {
    /// Guards `status`.
    mu: Mutex<Status>,
    /// Paired with `mu` for both handshake directions.
    cv: Condvar,
}

impl WorkerContext {
    /// New context in `NotStarted`.
    pub fn new() -> Self {
        Self {
            mu: Mutex::new(Status::NotStarted),
            cv: Condvar::new(),
        }
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> Status {
        *self.mu.lock().expect(POISONED)
    }

    /// Yield control back to the driver, then block until released again.
    ///
    /// Atomically publishes `Running → Waiting` and wakes the driver, then
    /// parks until the driver's next [`resume`](Self::resume).
    pub fn yield_now(&self) {
        self.release_to_driver();
        self.wait_for_resume();
    }

    /// Acquire `lockable` under a `WaitingExternal` envelope.
    ///
    /// Publishes `Running → WaitingExternal` (the notify here is mandatory:
    /// the driver may be parked in `wait_for_yield` and no true yield is
    /// coming), performs the blocking acquisition, publishes `Running`, and
    /// returns the guard. The critical section runs as `Running`; release
    /// the lock by dropping the guard, which is not wrapped.
    pub fn lock<'l, L: Lockable>(&self, lockable: &'l L) -> L::Guard<'l> {
        self.enter_external_wait();
        let guard = lockable.lock();
        self.leave_external_wait();
        guard
    }

    /// Shared-acquisition variant of [`lock`](Self::lock).
    pub fn lock_shared<'l, L: SharedLockable>(&self, lockable: &'l L) -> L::SharedGuard<'l> {
        self.enter_external_wait();
        let guard = lockable.lock_shared();
        self.leave_external_wait();
        guard
    }

    // ------------------------------------------------------------------
    // Worker-thread internals (invoked by the companion `Worker`)
    // ------------------------------------------------------------------

    /// Block until the driver's first release moves the status out of
    /// `NotStarted`.
    pub(crate) fn await_start(&self) {
        let mut status = self.mu.lock().expect(POISONED);
        while *status == Status::NotStarted {
            status = self.cv.wait(status).expect(POISONED);
        }
    }

    /// Publish `Finished` and wake the driver. Terminal.
    pub(crate) fn finish(&self) {
        {
            let mut status = self.mu.lock().expect(POISONED);
            debug_assert!(
                !matches!(*status, Status::NotStarted | Status::Finished),
                "finish from {}",
                *status
            );
            *status = Status::Finished;
        }
        self.cv.notify_one();
    }

    // ------------------------------------------------------------------
    // Driver-side internals (invoked by `Worker`/`Scheduler`)
    // ------------------------------------------------------------------

    /// Release the worker to run until its next yield.
    ///
    /// `(NotStarted | Waiting) → Running`, waking the worker. No-op on
    /// `Finished` (idempotent termination handshake), on `WaitingExternal`
    /// (the worker is parked on the external lock, not on `cv`; its own
    /// back-transition publishes `Running`), and on `Running`.
    pub(crate) fn resume(&self) {
        {
            let mut status = self.mu.lock().expect(POISONED);
            match *status {
                Status::NotStarted | Status::Waiting => *status = Status::Running,
                Status::Finished | Status::Running => return,
                Status::WaitingExternal => {
                    #[cfg(debug_assertions)]
                    eprintln!("lockstep: ignoring resume of a worker in waiting-external");
                    return;
                }
            }
        }
        self.cv.notify_one();
    }

    /// Block while the worker is `Running`; returns the status observed
    /// under the lock once it changes.
    ///
    /// On return the worker is in `Waiting`, `WaitingExternal`, `Finished`,
    /// or still `NotStarted` if it was never released.
    pub(crate) fn wait_for_yield(&self) -> Status {
        let mut status = self.mu.lock().expect(POISONED);
        while *status == Status::Running {
            status = self.cv.wait(status).expect(POISONED);
        }
        *status
    }

    // ------------------------------------------------------------------
    // Transition helpers
    // ------------------------------------------------------------------

    fn release_to_driver(&self) {
        {
            let mut status = self.mu.lock().expect(POISONED);
            debug_assert_eq!(*status, Status::Running, "yield outside a running step");
            *status = Status::Waiting;
        }
        self.cv.notify_one();
    }

    fn wait_for_resume(&self) {
        let mut status = self.mu.lock().expect(POISONED);
        while *status == Status::Waiting {
            status = self.cv.wait(status).expect(POISONED);
        }
    }

    fn enter_external_wait(&self) {
        {
            let mut status = self.mu.lock().expect(POISONED);
            debug_assert_eq!(
                *status,
                Status::Running,
                "external acquisition outside a running step"
            );
            *status = Status::WaitingExternal;
        }
        self.cv.notify_one();
    }

    fn leave_external_wait(&self) {
        {
            let mut status = self.mu.lock().expect(POISONED);
            debug_assert_eq!(*status, Status::WaitingExternal, "unbalanced external wait");
            *status = Status::Running;
        }
        self.cv.notify_one();
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Loom tests
// ============================================================================
