//! Fixed-arity driver-side multiplexer.
//!
//! # Architecture
//!
//! ```text
//!   driver thread                      Scheduler<N>
//!        │                      ┌──────────────────────────────┐
//!        │ switch_context_to    │  contexts: [Arc<Context>; N] │
//!        ├─────────────────────►│  workers:  [Worker; N]       │
//!        │ proceed / wait       │  trace:    TraceLog          │
//!        │ wait_until_*         └──────┬───────────┬───────────┘
//!        │ join_on / join_all          │           │
//!        │                        worker 0  …  worker N-1
//!        │                        (each parked on its own
//!        │                         condvar or external lock)
//! ```
//!
//! The arity is part of the type: a `Scheduler<3>` owns exactly three
//! workers for its whole life. Index-list operations take `&[usize]`,
//! apply in argument order, and bounds-check loudly; misuse is a
//! programming error, not a recoverable condition.
//!
//! # Ordering guarantees
//!
//! - `switch_context_to(&[i, j])` serializes: worker `i` runs to its next
//!   yield, then worker `j`.
//! - `proceed(&[i, j])` then `wait(&[i, j])` lets `i` and `j` run
//!   concurrently until both have yielded.
//! - Every release strictly happens-before the released worker's next
//!   instruction; every yield strictly happens-before the driver's return
//!   from the matching `wait`.
//!
//! # Polling
//!
//! The `wait_until_*` helpers poll with a short sleep instead of waiting on
//! the workers' condvars: `WaitingExternal` is entered on the way into an
//! external blocking call the harness does not own, so there is no safe
//! point to signal from. Granularity and an optional bound come from
//! [`PollCfg`].

use crate::context::WorkerContext;
use crate::lockable::TryLockable;
use crate::status::Status;
use crate::sync::Arc;
use crate::trace::{TraceEvent, TraceLog};
use crate::worker::{Worker, WorkerBody};
use std::any::Any;
use std::panic;
use std::thread;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// Polling behavior for the `wait_until_*` helpers.
#[derive(Clone, Copy, Debug)]
pub struct PollCfg {
    /// Sleep between status probes.
    pub interval: Duration,

    /// Upper bound on probes per waiting operation before the wait panics.
    ///
    /// `None` leaves the wait unbounded. A bound turns a test that would
    /// hang (a worker that never reaches the awaited state) into a loud
    /// failure, at the price of a deadline the workload must meet.
    pub max_polls: Option<u64>,
}

impl PollCfg {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.interval > Duration::ZERO, "poll interval must be > 0");
        if let Some(max) = self.max_polls {
            assert!(max > 0, "max_polls must be > 0 when set");
        }
    }
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
            max_polls: None,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Driver-side multiplexer over `N` workers.
///
/// Construction spawns all `N` worker threads; each parks inside its
/// context's start handshake until first released. Tear down with
/// [`join_on`](Self::join_on) / [`join_all`](Self::join_all). A scheduler
/// dropped without joining leaks its still-parked worker threads until
/// process exit; the contexts themselves are reference-counted and cannot
/// dangle.
pub struct Scheduler<const N: usize> {
    contexts: [Arc<WorkerContext>; N],
    workers: [Worker; N],
    poll: PollCfg,
    trace: TraceLog,
}

impl<const N: usize> Scheduler<N> {
    /// Build a scheduler from one body per worker, with default polling.
    pub fn new(bodies: [WorkerBody; N]) -> Self {
        Self::with_poll_cfg(bodies, PollCfg::default())
    }

    /// Build a scheduler with explicit polling configuration.
    pub fn with_poll_cfg(bodies: [WorkerBody; N], poll: PollCfg) -> Self {
        poll.validate();

        let contexts: [Arc<WorkerContext>; N] =
            std::array::from_fn(|_| Arc::new(WorkerContext::new()));

        let mut workers = Vec::with_capacity(N);
        for (index, body) in bodies.into_iter().enumerate() {
            workers.push(Worker::spawn(index, Arc::clone(&contexts[index]), body));
        }
        let workers: [Worker; N] = workers
            .try_into()
            .unwrap_or_else(|_| unreachable!("worker count equals arity"));

        Self {
            contexts,
            workers,
            poll,
            trace: TraceLog::new(),
        }
    }

    /// Serial dispatch: for each index in the given order, release that
    /// worker and block until it yields back (or finishes).
    ///
    /// The schedule may be longer than `N` and may revisit indices; each
    /// entry is one full rendezvous.
    pub fn switch_context_to(&self, indices: &[usize]) {
        self.check_bounds(indices);
        for &i in indices {
            self.proceed(&[i]);
            self.wait(&[i]);
        }
    }

    /// [`switch_context_to`](Self::switch_context_to) across all `N`
    /// workers in index order.
    pub fn switch_context_all(&self) {
        for i in 0..N {
            self.proceed(&[i]);
            self.wait(&[i]);
        }
    }

    /// Release each listed worker without suspending the driver.
    pub fn proceed(&self, indices: &[usize]) {
        self.check_indices(indices);
        for &i in indices {
            self.trace.record(TraceEvent::Released { worker: i });
            self.workers[i].tick();
        }
    }

    /// Block until each listed worker has left `Running`, in argument
    /// order. Completion order across workers is the workers' own.
    pub fn wait(&self, indices: &[usize]) {
        self.check_indices(indices);
        for &i in indices {
            let status = self.workers[i].wait_for_yield();
            self.trace.record(TraceEvent::Observed { worker: i, status });
        }
    }

    /// Poll until every listed worker is exactly `target`.
    ///
    /// The list may repeat indices and be longer than `N`.
    pub fn wait_until_status(&self, target: Status, indices: &[usize]) {
        self.check_bounds(indices);
        let mut polls = 0u64;
        while !indices.iter().all(|&i| self.status(i) == target) {
            self.sleep_one_poll(&mut polls, "wait_until_status");
        }
    }

    /// Poll until some listed worker is exactly `target`; returns the first
    /// matching index observed.
    ///
    /// The list may repeat indices and be longer than `N`.
    pub fn wait_until_one_status(&self, target: Status, indices: &[usize]) -> usize {
        self.check_bounds(indices);
        assert!(
            !indices.is_empty(),
            "wait_until_one_status needs at least one index"
        );
        let mut polls = 0u64;
        loop {
            for &i in indices {
                if self.status(i) == target {
                    return i;
                }
            }
            self.sleep_one_poll(&mut polls, "wait_until_one_status");
        }
    }

    /// Poll until `lockable` is observably held by someone else, i.e. until
    /// `try_lock` fails.
    ///
    /// Eventually consistent: each successful probe briefly holds the lock,
    /// so a contender can slip in between probes. Drivers that need a
    /// deterministic hand-off release one contender at a time, confirming
    /// each acquisition with this call before releasing the next.
    pub fn wait_until_locked<L: TryLockable>(&self, lockable: &L) {
        let mut polls = 0u64;
        while let Some(guard) = lockable.try_lock() {
            drop(guard);
            self.sleep_one_poll(&mut polls, "wait_until_locked");
        }
    }

    /// Snapshot of worker `i`'s status.
    pub fn status(&self, i: usize) -> Status {
        assert!(i < N, "worker index {i} out of range for arity {N}");
        self.contexts[i].status()
    }

    /// Copy of the driver trace recorded so far.
    pub fn trace_snapshot(&self) -> Vec<TraceEvent> {
        self.trace.snapshot()
    }

    /// Order-sensitive hash of the driver trace recorded so far.
    pub fn trace_hash(&self) -> u64 {
        self.trace.hash()
    }

    /// Join the listed workers' OS threads.
    ///
    /// Every listed worker is joined even when one of them panicked; the
    /// first captured payload is re-raised once the whole list is joined.
    ///
    /// # Panics
    ///
    /// Re-raises the first worker-body panic among the listed workers, and
    /// panics if a listed worker was already joined.
    pub fn join_on(&mut self, indices: &[usize]) {
        self.check_indices(indices);
        let mut first_panic = None;
        for &i in indices {
            self.trace.record(TraceEvent::Joined { worker: i });
            Self::capture_first(&mut first_panic, self.workers[i].join_captured());
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Join every not-yet-joined worker and return the accumulated trace.
    ///
    /// Consuming `self` makes a second join-all unrepresentable; workers
    /// already joined through [`join_on`](Self::join_on) are skipped. All
    /// remaining workers are joined even when some panicked; the first
    /// captured payload is re-raised once every thread is joined.
    pub fn join_all(mut self) -> Vec<TraceEvent> {
        let mut first_panic = None;
        for i in 0..N {
            if !self.workers[i].is_joined() {
                self.trace.record(TraceEvent::Joined { worker: i });
                Self::capture_first(&mut first_panic, self.workers[i].join_captured());
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        self.trace.into_events()
    }

    /// Keep only the first captured panic payload; later ones are dropped.
    fn capture_first(
        first: &mut Option<Box<dyn Any + Send + 'static>>,
        payload: Option<Box<dyn Any + Send + 'static>>,
    ) {
        if first.is_none() {
            *first = payload;
        }
    }

    /// Bounds plus the one-operation-per-worker cap used by `proceed`,
    /// `wait` and `join_on`.
    fn check_indices(&self, indices: &[usize]) {
        assert!(
            indices.len() <= N,
            "too many worker indices: {} for arity {N}",
            indices.len()
        );
        self.check_bounds(indices);
    }

    fn check_bounds(&self, indices: &[usize]) {
        for &i in indices {
            assert!(i < N, "worker index {i} out of range for arity {N}");
        }
    }

    fn sleep_one_poll(&self, polls: &mut u64, what: &str) {
        *polls += 1;
        if let Some(max) = self.poll.max_polls {
            assert!(
                *polls <= max,
                "{what} still unsatisfied after {max} polls at {:?}",
                self.poll.interval
            );
        }
        thread::sleep(self.poll.interval);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::worker::body;
    use std::sync::Mutex;

    fn noop_bodies<const N: usize>() -> [WorkerBody; N] {
        std::array::from_fn(|_| body(|_ctx| {}))
    }

    #[test]
    fn switch_context_leaves_workers_waiting_or_finished() {
        let sch = Scheduler::new([
            body(|ctx| {
                ctx.yield_now();
            }),
            body(|_ctx| {}),
        ]);

        sch.switch_context_to(&[0, 1]);
        assert_eq!(sch.status(0), Status::Waiting);
        assert_eq!(sch.status(1), Status::Finished);

        sch.switch_context_to(&[0]);
        assert_eq!(sch.status(0), Status::Finished);
        sch.join_all();
    }

    #[test]
    fn switch_context_all_runs_in_index_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bodies: [WorkerBody; 4] = std::array::from_fn(|i| {
            let log = Arc::clone(&log);
            body(move |_ctx| {
                log.lock().unwrap().push(i);
            })
        });

        let sch = Scheduler::new(bodies);
        sch.switch_context_all();
        sch.join_all();

        assert_eq!(*log.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn proceed_then_wait_allows_concurrent_progress() {
        let sch = Scheduler::new([
            body(|ctx| {
                ctx.yield_now();
            }),
            body(|ctx| {
                ctx.yield_now();
            }),
        ]);

        sch.proceed(&[0, 1]);
        sch.wait(&[0, 1]);
        assert_eq!(sch.status(0), Status::Waiting);
        assert_eq!(sch.status(1), Status::Waiting);

        sch.proceed(&[0, 1]);
        sch.wait(&[0, 1]);
        sch.join_all();
    }

    #[test]
    fn wait_until_one_status_reports_the_finisher() {
        let sch = Scheduler::new([
            body(|ctx| {
                ctx.yield_now();
            }),
            body(|_ctx| {}),
        ]);

        sch.proceed(&[0, 1]);
        let finished = sch.wait_until_one_status(Status::Finished, &[0, 1]);
        assert_eq!(finished, 1);

        sch.wait(&[0]);
        sch.switch_context_to(&[0]);
        sch.join_all();
    }

    #[test]
    fn wait_until_status_sees_all_workers() {
        let sch = Scheduler::new(noop_bodies::<3>());
        sch.proceed(&[0, 1, 2]);
        sch.wait_until_status(Status::Finished, &[0, 1, 2]);
        sch.join_all();
    }

    #[test]
    fn trace_records_driver_actions_in_order() {
        let sch = Scheduler::new([body(|_ctx| {})]);
        sch.switch_context_to(&[0]);
        let trace = sch.join_all();

        assert_eq!(
            trace,
            [
                TraceEvent::Released { worker: 0 },
                TraceEvent::Observed {
                    worker: 0,
                    status: Status::Finished
                },
                TraceEvent::Joined { worker: 0 },
            ]
        );
    }

    #[test]
    fn join_on_then_join_all_composes() {
        let mut sch = Scheduler::new(noop_bodies::<2>());
        sch.switch_context_all();
        sch.join_on(&[1]);
        let trace = sch.join_all();
        let joins: Vec<_> = trace
            .iter()
            .filter(|e| matches!(e, TraceEvent::Joined { .. }))
            .collect();
        assert_eq!(joins.len(), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let sch = Scheduler::new(noop_bodies::<2>());
        sch.proceed(&[2]);
    }

    #[test]
    #[should_panic(expected = "too many worker indices")]
    fn oversized_index_list_panics() {
        let sch = Scheduler::new(noop_bodies::<2>());
        sch.wait(&[0, 1, 0]);
    }

    #[test]
    #[should_panic(expected = "poll interval must be > 0")]
    fn zero_poll_interval_panics() {
        let cfg = PollCfg {
            interval: Duration::ZERO,
            max_polls: None,
        };
        let _ = Scheduler::with_poll_cfg(noop_bodies::<1>(), cfg);
    }

    #[test]
    #[should_panic(expected = "wait_until_status still unsatisfied")]
    fn bounded_poll_turns_a_hang_into_a_panic() {
        let cfg = PollCfg {
            interval: Duration::from_millis(1),
            max_polls: Some(5),
        };
        // Worker 0 is never released, so it can never reach Finished.
        let sch = Scheduler::with_poll_cfg(noop_bodies::<1>(), cfg);
        sch.wait_until_status(Status::Finished, &[0]);
    }

    fn panic_message<'a>(payload: &'a Box<dyn Any + Send + 'static>) -> &'a str {
        payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&str>().copied())
            .unwrap_or("")
    }

    #[test]
    fn worker_panic_surfaces_on_join_all() {
        // The panicking worker comes first so the join loop has to keep
        // going past it to reach the healthy ones.
        let sch = Scheduler::new([
            body(|_ctx| panic!("scripted failure")),
            body(|_ctx| {}),
            body(|_ctx| {}),
        ]);
        sch.switch_context_to(&[0, 1, 2]);
        assert_eq!(sch.status(0), Status::Finished);

        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sch.join_all()));
        let payload = err.expect_err("join_all should re-raise the body panic");
        assert_eq!(panic_message(&payload), "scripted failure");
    }

    #[test]
    fn join_on_joins_every_listed_worker_despite_a_panic() {
        let mut sch = Scheduler::new([
            body(|_ctx| panic!("scripted failure")),
            body(|_ctx| {}),
        ]);
        sch.switch_context_to(&[0, 1]);

        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sch.join_on(&[0, 1])));
        let payload = err.expect_err("join_on should re-raise the body panic");
        assert_eq!(panic_message(&payload), "scripted failure");

        // Worker 1 was joined before the payload re-raised, so a second
        // join attempt trips the double-join check rather than hanging.
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sch.join_on(&[1])));
        let payload = err.expect_err("second join of worker 1 should panic");
        assert_eq!(panic_message(&payload), "worker already joined");
    }

    #[test]
    fn join_on_keeps_the_first_of_several_panics() {
        let mut sch = Scheduler::new([
            body(|_ctx| panic!("first failure")),
            body(|_ctx| panic!("second failure")),
        ]);
        sch.switch_context_to(&[0, 1]);

        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sch.join_on(&[0, 1])));
        let payload = err.expect_err("join_on should re-raise a body panic");
        assert_eq!(panic_message(&payload), "first failure");
    }

    #[test]
    fn wait_until_helpers_accept_long_and_repeated_lists() {
        let sch = Scheduler::new(noop_bodies::<2>());
        sch.proceed(&[0, 1]);

        sch.wait_until_status(Status::Finished, &[0, 0, 1]);
        let finished = sch.wait_until_one_status(Status::Finished, &[1, 1, 0, 0]);
        assert_eq!(finished, 1);
        sch.join_all();
    }
}
