use std::sync::{Mutex, MutexGuard, PoisonError};

/// Short synchronous critical sections never leave shared state half-written,
/// so a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
