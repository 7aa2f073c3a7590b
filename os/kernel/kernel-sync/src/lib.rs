//! # Kernel synchronization primitives
//!
//! Minimal, allocation-free building blocks used before (and underneath) the
//! kernel heap:
//!
//! * [`SpinLock`]: a test-and-test-and-set lock with an RAII guard.
//! * [`SyncOnceCell`]: a write-once cell for process-wide singletons such as
//!   the default allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
