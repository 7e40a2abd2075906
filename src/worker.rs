//! OS-thread binding for a single worker.
//!
//! A [`Worker`] pairs one spawned thread with one shared
//! [`WorkerContext`]. The thread runs
//! `await_start(); body(&ctx); finish();` with the final transition held in
//! a drop guard, so a body that unwinds still publishes `Finished` and no
//! driver wait can hang on a dead worker. The panic payload is captured by
//! the thread handle and re-raised on [`Worker::join`].
//!
//! Workers compose without a [`Scheduler`](crate::Scheduler); the driver
//! can tick and wait on them directly.

use crate::context::WorkerContext;
use crate::status::Status;
use crate::sync::Arc;
use std::any::Any;
use std::panic;
use std::thread::{self, JoinHandle};

/// A user-supplied worker body. Receives its context as the sole argument;
/// any further state is captured by the closure.
///
/// The body may call `yield_now`, `lock` and `lock_shared` on the context it
/// is given. It must not call them on another worker's context, and must not
/// retain the context beyond its own return.
pub type WorkerBody = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

/// Boxes a closure as a [`WorkerBody`].
pub fn body<F>(f: F) -> WorkerBody
where
    F: FnOnce(&WorkerContext) + Send + 'static,
{
    Box::new(f)
}

/// One worker thread, multiplexed by the driver.
pub struct Worker {
    context: Arc<WorkerContext>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the OS thread for one worker.
    ///
    /// The thread is named `lockstep-worker-{index}` and parks inside
    /// `await_start` until the driver's first release.
    pub fn spawn(index: usize, context: Arc<WorkerContext>, body: WorkerBody) -> Self {
        let thread_context = Arc::clone(&context);
        let handle = thread::Builder::new()
            .name(format!("lockstep-worker-{index}"))
            .spawn(move || {
                thread_context.await_start();
                let _finish = FinishGuard(&thread_context);
                body(&thread_context);
            })
            .expect("failed to spawn worker thread");

        Self {
            context,
            handle: Some(handle),
        }
    }

    /// Release this worker to run until its next yield.
    ///
    /// `(Waiting | NotStarted) → Running`. No-op on `Finished` and on
    /// `WaitingExternal` (the worker is parked on an external lock, not on
    /// its condvar).
    pub fn tick(&self) {
        self.context.resume();
    }

    /// Block until the worker leaves `Running`; returns the observed status
    /// (`Waiting`, `WaitingExternal` or `Finished`, or `NotStarted` for a
    /// never-released worker).
    pub fn wait_for_yield(&self) -> Status {
        self.context.wait_for_yield()
    }

    /// Snapshot of the worker's status.
    pub fn status(&self) -> Status {
        self.context.status()
    }

    /// True once [`join`](Self::join) has consumed the thread handle.
    pub fn is_joined(&self) -> bool {
        self.handle.is_none()
    }

    /// Join the underlying OS thread.
    ///
    /// # Panics
    ///
    /// Re-raises a panic that escaped the worker body, and panics if this
    /// worker was already joined.
    pub fn join(&mut self) {
        if let Some(payload) = self.join_captured() {
            panic::resume_unwind(payload);
        }
    }

    /// Join the underlying OS thread, handing back a panic payload from the
    /// worker body instead of re-raising it. The scheduler joins whole index
    /// lists this way so one panicked worker cannot leave the rest unjoined.
    ///
    /// # Panics
    ///
    /// Panics if this worker was already joined.
    pub(crate) fn join_captured(&mut self) -> Option<Box<dyn Any + Send + 'static>> {
        let handle = self.handle.take().expect("worker already joined");
        handle.join().err()
    }
}

/// Publishes `Finished` when dropped, unwinding or not.
struct FinishGuard<'a>(&'a WorkerContext);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

// ============================================================================
// Tests
// ============================================================================
