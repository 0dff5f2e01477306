use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::IVec3;

#[derive(Debug, PartialEq)]
struct Payload(u32);

fn handle() -> ChunkFuture<Payload> {
  ChunkFuture::new(IVec3::new(1, 2, 3))
}

#[test]
fn test_resolve_then_get() {
  let handle = handle();
  assert!(!handle.is_done());
  assert!(handle.try_get().is_none());

  assert!(handle.resolve(Arc::new(Payload(7))));
  assert!(handle.is_done());
  assert_eq!(*handle.get().unwrap(), Payload(7));
  assert_eq!(*handle.try_get().unwrap().unwrap(), Payload(7));
}

/// First resolution wins; later ones are ignored.
#[test]
fn test_write_once() {
  let handle = handle();
  assert!(handle.resolve(Arc::new(Payload(1))));
  assert!(!handle.resolve(Arc::new(Payload(2))));
  assert!(!handle.cancel());
  assert!(!handle.is_cancelled());
  assert_eq!(*handle.get().unwrap(), Payload(1));
}

#[test]
fn test_cancel() {
  let handle = handle();
  assert!(handle.cancel());
  assert!(handle.is_done());
  assert!(handle.is_cancelled());
  assert!(handle.get().unwrap_err().is_cancelled());
}

#[test]
fn test_fail_propagates_error() {
  let handle = handle();
  handle.fail(PipelineError::ShutDown);
  assert!(matches!(handle.get(), Err(PipelineError::ShutDown)));
  assert!(!handle.is_cancelled());
}

#[test]
fn test_clones_share_resolution() {
  let a = handle();
  let b = a.clone();
  assert!(a.ptr_eq(&b));
  assert!(!a.ptr_eq(&handle()));

  b.resolve(Arc::new(Payload(3)));
  assert_eq!(*a.get().unwrap(), Payload(3));
}

#[test]
fn test_get_blocks_until_resolved() {
  let handle = handle();
  let resolver = handle.clone();

  let thread = std::thread::spawn(move || {
    std::thread::sleep(Duration::from_millis(20));
    resolver.resolve(Arc::new(Payload(9)));
  });

  assert_eq!(*handle.get().unwrap(), Payload(9));
  thread.join().unwrap();
}

#[test]
fn test_get_timeout() {
  let handle = handle();
  let err = handle.get_timeout(Duration::from_millis(20)).unwrap_err();
  assert!(matches!(err, PipelineError::Timeout { position } if position == IVec3::new(1, 2, 3)));

  handle.resolve(Arc::new(Payload(4)));
  assert!(handle.get_timeout(Duration::from_millis(20)).is_ok());
}

#[test]
fn test_callbacks_run_once_on_resolution() {
  let handle = handle();
  let calls = Arc::new(AtomicUsize::new(0));

  for _ in 0..3 {
    let calls = Arc::clone(&calls);
    handle.on_complete(move |result| {
      assert!(result.is_ok());
      calls.fetch_add(1, Ordering::SeqCst);
    });
  }
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  handle.resolve(Arc::new(Payload(5)));
  assert_eq!(calls.load(Ordering::SeqCst), 3);

  handle.cancel();
  assert_eq!(calls.load(Ordering::SeqCst), 3, "No second round of callbacks");
}

#[test]
fn test_callback_after_resolution_runs_immediately() {
  let handle = ChunkFuture::ready(IVec3::ZERO, Ok(Arc::new(Payload(1))));
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  handle.on_complete(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
  });
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// A panicking callback does not prevent the others from running.
#[test]
fn test_panicking_callback_is_contained() {
  let handle = handle();
  let calls = Arc::new(AtomicUsize::new(0));

  handle.on_complete(|_| panic!("callback bug"));
  let counter = Arc::clone(&calls);
  handle.on_complete(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
  });

  handle.resolve(Arc::new(Payload(1)));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert!(handle.get().is_ok());
}

#[test]
fn test_await_resolved_on_other_thread() {
  let handle = handle();
  let resolver = handle.clone();

  let thread = std::thread::spawn(move || {
    std::thread::sleep(Duration::from_millis(20));
    resolver.resolve(Arc::new(Payload(11)));
  });

  let result = pollster::block_on(handle);
  assert_eq!(*result.unwrap(), Payload(11));
  thread.join().unwrap();
}
