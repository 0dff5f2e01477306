//! ChunkFuture - the externally observable completion handle for one
//! position.
//!
//! A handle is resolved exactly once: with the finished chunk, with a
//! failure, or by cancellation, whichever happens first. Callers can block on
//! it, poll it, register callbacks, or `.await` it.
//!
//! ```ignore
//! let handle = pipeline.invoke_generator_task(pos, move || Ok(generate(pos)));
//!
//! handle.on_complete(|result| match result {
//!     Ok(chunk) => ready.push(chunk.clone()),
//!     Err(e) if e.is_cancelled() => {}
//!     Err(e) => tracing::warn!("chunk failed: {e}"),
//! });
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use web_time::Instant;

use crate::error::{PipelineError, Result};
use crate::position::Position;
use crate::sync::{lock, wait, wait_timeout};

type Callback<C> = Box<dyn FnOnce(&Result<Arc<C>>) + Send>;

struct HandleState<C> {
  outcome: Option<Result<Arc<C>>>,
  callbacks: Vec<Callback<C>>,
  wakers: Vec<Waker>,
}

struct Inner<C> {
  position: Position,
  state: Mutex<HandleState<C>>,
  done: Condvar,
}

/// Shared, cloneable completion handle for one chunk position.
pub struct ChunkFuture<C> {
  inner: Arc<Inner<C>>,
}

impl<C> Clone for ChunkFuture<C> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<C> std::fmt::Debug for ChunkFuture<C> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = match lock(&self.inner.state).outcome {
      None => "pending",
      Some(Ok(_)) => "done",
      Some(Err(PipelineError::Cancelled { .. })) => "cancelled",
      Some(Err(_)) => "failed",
    };
    f.debug_struct("ChunkFuture")
      .field("position", &self.inner.position)
      .field("state", &state)
      .finish()
  }
}

impl<C: Send + Sync + 'static> ChunkFuture<C> {
  /// Unresolved handle for `position`.
  pub fn new(position: Position) -> Self {
    Self {
      inner: Arc::new(Inner {
        position,
        state: Mutex::new(HandleState {
          outcome: None,
          callbacks: Vec::new(),
          wakers: Vec::new(),
        }),
        done: Condvar::new(),
      }),
    }
  }

  /// Handle that is already resolved with `result`.
  pub fn ready(position: Position, result: Result<Arc<C>>) -> Self {
    let handle = Self::new(position);
    handle.complete(result);
    handle
  }

  pub fn position(&self) -> Position {
    self.inner.position
  }

  /// True if both handles observe the same resolution.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  pub fn is_done(&self) -> bool {
    lock(&self.inner.state).outcome.is_some()
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(
      lock(&self.inner.state).outcome,
      Some(Err(PipelineError::Cancelled { .. }))
    )
  }

  /// Cancel the handle. Returns `false` if it was already resolved.
  ///
  /// Cancelling a handle issued by the pipeline wakes its reactor, which
  /// stops processing the position and disposes the chunk it holds.
  pub fn cancel(&self) -> bool {
    self.complete(Err(PipelineError::Cancelled {
      position: self.inner.position,
    }))
  }

  /// Non-blocking result check.
  pub fn try_get(&self) -> Option<Result<Arc<C>>> {
    lock(&self.inner.state).outcome.clone()
  }

  /// Block until resolved.
  pub fn get(&self) -> Result<Arc<C>> {
    let mut state = lock(&self.inner.state);
    loop {
      if let Some(outcome) = &state.outcome {
        return outcome.clone();
      }
      state = wait(&self.inner.done, state);
    }
  }

  /// Block until resolved or `timeout` elapses.
  pub fn get_timeout(&self, timeout: Duration) -> Result<Arc<C>> {
    let deadline = Instant::now() + timeout;
    let mut state = lock(&self.inner.state);
    loop {
      if let Some(outcome) = &state.outcome {
        return outcome.clone();
      }
      let now = Instant::now();
      if now >= deadline {
        return Err(PipelineError::Timeout {
          position: self.inner.position,
        });
      }
      state = wait_timeout(&self.inner.done, state, deadline - now).0;
    }
  }

  /// Run `callback` once the handle resolves.
  ///
  /// Runs immediately on the calling thread if already resolved, otherwise
  /// on the thread that resolves the handle.
  pub fn on_complete<F>(&self, callback: F)
  where
    F: FnOnce(&Result<Arc<C>>) + Send + 'static,
  {
    let mut state = lock(&self.inner.state);
    let Some(outcome) = state.outcome.clone() else {
      state.callbacks.push(Box::new(callback));
      return;
    };
    drop(state);
    run_callback(self.inner.position, Box::new(callback), &outcome);
  }

  pub(crate) fn resolve(&self, chunk: Arc<C>) -> bool {
    self.complete(Ok(chunk))
  }

  pub(crate) fn fail(&self, error: PipelineError) -> bool {
    self.complete(Err(error))
  }

  /// Write-once resolution. Callbacks and wakers run after the lock is
  /// released.
  fn complete(&self, result: Result<Arc<C>>) -> bool {
    let (callbacks, wakers) = {
      let mut state = lock(&self.inner.state);
      if state.outcome.is_some() {
        return false;
      }
      state.outcome = Some(result.clone());
      (
        std::mem::take(&mut state.callbacks),
        std::mem::take(&mut state.wakers),
      )
    };
    self.inner.done.notify_all();

    for callback in callbacks {
      run_callback(self.inner.position, callback, &result);
    }
    for waker in wakers {
      waker.wake();
    }
    true
  }
}

/// Callbacks are caller code running on the reactor thread; a panic in one
/// must not stop the reactor.
fn run_callback<C>(position: Position, callback: Callback<C>, result: &Result<Arc<C>>) {
  if panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
    tracing::error!(%position, "chunk completion callback panicked");
  }
}

impl<C: Send + Sync + 'static> Future for ChunkFuture<C> {
  type Output = Result<Arc<C>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut state = lock(&self.inner.state);
    if let Some(outcome) = &state.outcome {
      return Poll::Ready(outcome.clone());
    }
    if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
      state.wakers.push(cx.waker().clone());
    }
    Poll::Pending
  }
}

#[cfg(test)]
#[path = "handle_test.rs"]
mod handle_test;
