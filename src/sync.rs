//! Synchronization primitives, swappable for loom.
//!
//! Production builds use `std::sync`; `--cfg loom` builds substitute loom's
//! instrumented versions so the rendezvous protocol in [`crate::context`]
//! can be exhaustively model checked.

#[cfg(loom)]
pub(crate) use loom::sync::{Arc, Condvar, Mutex};

#[cfg(not(loom))]
pub(crate) use std::sync::{Arc, Condvar, Mutex};
