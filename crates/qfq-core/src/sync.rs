//! Lock abstraction shared by the `std` and `no_std` builds.
//!
//! Same shape as `qf::sync`, but the `std` path is backed by
//! `parking_lot::Mutex` rather than `std::sync::Mutex`: the dispatcher holds
//! this lock across the whole scheduling critical section, and a poisoned
//! `std` mutex would wedge the single dispatcher thread forever on the first
//! panic instead of letting `catch_unwind` at the dispatch loop recover. See
//! DESIGN.md.

#[cfg(not(feature = "std"))]
pub use alloc::sync::Arc;
#[cfg(feature = "std")]
pub use std::sync::Arc;

#[cfg(feature = "std")]
pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
#[cfg(not(feature = "std"))]
pub type MutexGuard<'a, T> = spin::MutexGuard<'a, T>;

pub struct Mutex<T> {
    #[cfg(feature = "std")]
    inner: parking_lot::Mutex<T>,
    #[cfg(not(feature = "std"))]
    inner: spin::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            #[cfg(feature = "std")]
            inner: parking_lot::Mutex::new(value),
            #[cfg(not(feature = "std"))]
            inner: spin::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}
