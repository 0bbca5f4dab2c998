use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock ignoring poisoning: every critical section here leaves the data
/// consistent, so a panic elsewhere must not wedge the client.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
