//! Deterministic cooperative scheduling harness for testing concurrent code.
//!
//! A driver thread composes a fixed set of worker threads and drives them
//! one rendezvous at a time: no worker runs unless the driver releases it,
//! and a released worker runs only until it voluntarily yields back or
//! blocks on a real external synchronization primitive. Inherently
//! nondeterministic concurrent programs become reproducible, step-by-step
//! traces, so tests can pin down arbitrary interleavings ("this mutex
//! acquires in the order the driver chose", "this queue never loses an
//! element under schedule S").
//!
//! # Components
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────┐
//!   │                       Scheduler<N>                         │
//!   │  switch_context_to · proceed · wait · wait_until_* · join  │
//!   └───────┬───────────────────┬────────────────────┬───────────┘
//!           │                   │                    │
//!       Worker 0            Worker 1      …      Worker N-1
//!      (OS thread)         (OS thread)          (OS thread)
//!           │                   │                    │
//!     WorkerContext       WorkerContext        WorkerContext
//!     (status + mutex + condvar: the rendezvous state machine)
//! ```
//!
//! [`WorkerContext`] carries the per-worker state machine and the
//! primitives a body may call (`yield_now`, `lock`, `lock_shared`).
//! [`Worker`] binds one context to one OS thread. [`Scheduler`] owns `N` of
//! each behind a const-generic arity and presents the indexed driver API.
//!
//! # Determinism
//!
//! Between the driver and worker `k`, every release strictly happens-before
//! the worker's next resumed instruction, and every yield strictly
//! happens-before the driver's return from the matching wait. Across
//! workers, ordering is whatever the driver makes it. All waits are
//! unbounded; timeouts would undermine determinism (wrap tests in an
//! external watchdog, or set [`PollCfg::max_polls`] for the polling
//! helpers).
//!
//! # Example
//!
//! ```
//! use lockstep::{body, Scheduler, Status};
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let (a, b) = (Arc::clone(&log), Arc::clone(&log));
//! let sch = Scheduler::new([
//!     body(move |ctx| {
//!         a.lock().unwrap().push("a1");
//!         ctx.yield_now();
//!         a.lock().unwrap().push("a2");
//!     }),
//!     body(move |ctx| {
//!         b.lock().unwrap().push("b1");
//!         ctx.yield_now();
//!         b.lock().unwrap().push("b2");
//!     }),
//! ]);
//!
//! sch.switch_context_to(&[1, 0, 0, 1]);
//! assert_eq!(sch.status(0), Status::Finished);
//! assert_eq!(sch.status(1), Status::Finished);
//! sch.join_all();
//!
//! assert_eq!(*log.lock().unwrap(), ["b1", "a1", "a2", "b2"]);
//! ```
//!
//! Workers that block on a contested lock do so through
//! [`WorkerContext::lock`], which publishes [`Status::WaitingExternal`]
//! before the acquisition so the driver is never stranded waiting for a
//! yield that cannot come. See [`lockable`] for the minimal contract
//! external locks must satisfy.

pub mod context;
pub mod lockable;
pub mod scheduler;
pub mod status;
pub mod trace;
pub mod worker;

mod sync;

pub use context::WorkerContext;
pub use lockable::{Lockable, SharedLockable, TryLockable};
pub use scheduler::{PollCfg, Scheduler};
pub use status::Status;
pub use trace::{TraceEvent, TraceLog};
pub use worker::{body, Worker, WorkerBody};
