//! Minimal contracts for external lockable objects.
//!
//! Workers wrap *acquisition* of user-supplied locks through
//! [`WorkerContext::lock`](crate::WorkerContext::lock) so the driver stays
//! live while the worker blocks. These traits are everything the harness
//! assumes about such objects: exclusive blocking acquisition, optional
//! non-blocking acquisition, optional shared acquisition. Release is by
//! dropping the returned guard, exactly as with `std::sync` locks, and is
//! never wrapped: the worker is `Running` throughout its critical section.
//!
//! No fairness is assumed. A driver that needs a deterministic hand-off
//! order gets it by releasing contenders one at a time (see
//! [`Scheduler::wait_until_locked`](crate::Scheduler::wait_until_locked)).

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Exclusive blocking acquisition.
///
/// Safe to call from any OS thread.
pub trait Lockable {
    /// Guard proving the acquisition; releases on drop.
    type Guard<'a>
    where
        Self: 'a;

    /// Block until the lock is held.
    fn lock(&self) -> Self::Guard<'_>;
}

/// Non-blocking acquisition, required by
/// [`Scheduler::wait_until_locked`](crate::Scheduler::wait_until_locked).
pub trait TryLockable: Lockable {
    /// Acquire if free, without blocking.
    fn try_lock(&self) -> Option<Self::Guard<'_>>;
}

/// Shared (reader) blocking acquisition.
pub trait SharedLockable {
    /// Shared guard; releases on drop.
    type SharedGuard<'a>
    where
        Self: 'a;

    /// Block until shared access is held.
    fn lock_shared(&self) -> Self::SharedGuard<'_>;
}

impl<T: ?Sized> Lockable for Mutex<T> {
    type Guard<'a>
        = MutexGuard<'a, T>
    where
        Self: 'a;

    fn lock(&self) -> MutexGuard<'_, T> {
        Mutex::lock(self).expect("external mutex poisoned")
    }
}

impl<T: ?Sized> TryLockable for Mutex<T> {
    fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        Mutex::try_lock(self).ok()
    }
}

impl<T: ?Sized> Lockable for RwLock<T> {
    type Guard<'a>
        = RwLockWriteGuard<'a, T>
    where
        Self: 'a;

    fn lock(&self) -> RwLockWriteGuard<'_, T> {
        RwLock::write(self).expect("external rwlock poisoned")
    }
}

impl<T: ?Sized> TryLockable for RwLock<T> {
    fn try_lock(&self) -> Option<RwLockWriteGuard<'_, T>> {
        RwLock::try_write(self).ok()
    }
}

impl<T: ?Sized> SharedLockable for RwLock<T> {
    type SharedGuard<'a>
        = RwLockReadGuard<'a, T>
    where
        Self: 'a;

    fn lock_shared(&self) -> RwLockReadGuard<'_, T> {
        RwLock::read(self).expect("external rwlock poisoned")
    }
}
