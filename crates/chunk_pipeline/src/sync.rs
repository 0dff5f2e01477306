//! Lock helpers.
//!
//! Stage functions and completion callbacks are user code; a panic in one of
//! them must not poison the pipeline's bookkeeping for every other position.

use std::sync::{
  Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
  WaitTimeoutResult,
};
use std::time::Duration;

/// Lock a mutex, recovering the guard if a previous holder panicked.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
  rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
  rwlock.write().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
  condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn wait_timeout<'a, T>(
  condvar: &Condvar,
  guard: MutexGuard<'a, T>,
  timeout: Duration,
) -> (MutexGuard<'a, T>, WaitTimeoutResult) {
  condvar
    .wait_timeout(guard, timeout)
    .unwrap_or_else(PoisonError::into_inner)
}
