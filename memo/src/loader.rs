use crate::error::LoadError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// The outcome of one load, shared by the leader and every waiter.
pub(crate) type LoadOutcome<V> = Result<Arc<V>, LoadError>;

/// Represents a waiter in the queue for a `LoadCell`.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// The internal state of a value being loaded.
enum State<V> {
  Loading,
  Done(LoadOutcome<V>),
}

/// The internal, mutex-protected core of the LoadCell.
struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waiter>,
}

/// A single-assignment result cell for one in-flight load.
///
/// It can be waited on by multiple sync threads and async tasks
/// simultaneously. The first `complete` wins; later calls are ignored.
pub(crate) struct LoadCell<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadCell<V> {
  /// Creates a new `LoadCell` in the "Loading" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Loading,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Publishes the outcome, waking all waiters.
  pub(crate) fn complete(&self, outcome: LoadOutcome<V>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if let State::Done(_) = inner.state {
        return;
      }
      inner.state = State::Done(outcome);
      mem::take(&mut inner.waiters)
    };
    for waiter in waiters {
      waiter.wake();
    }
  }

  /// Blocks the current thread until the outcome is published.
  pub(crate) fn wait(&self) -> LoadOutcome<V> {
    let mut inner = self.inner.lock();
    loop {
      if let State::Done(outcome) = &inner.state {
        return outcome.clone();
      }

      let current = thread::current();
      let already_queued = inner
        .waiters
        .iter()
        .any(|waiter| matches!(waiter, Waiter::Sync(t) if t.id() == current.id()));
      if !already_queued {
        inner.waiters.push_back(Waiter::Sync(current));
      }

      // Unlock before parking. Spurious wake-ups just loop.
      drop(inner);
      thread::park();
      inner = self.inner.lock();
    }
  }
}

/// A future resolving to the outcome of a `LoadCell`.
///
/// Dropping it only stops this caller from waiting; the load itself and other
/// waiters are unaffected.
#[must_use = "futures do nothing unless you .await or poll them"]
pub(crate) struct WaitLoad<V> {
  cell: Arc<LoadCell<V>>,
}

impl<V> WaitLoad<V> {
  pub(crate) fn new(cell: Arc<LoadCell<V>>) -> Self {
    Self { cell }
  }
}

impl<V> Future for WaitLoad<V> {
  type Output = LoadOutcome<V>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.cell.inner.lock();
    if let State::Done(outcome) = &inner.state {
      return Poll::Ready(outcome.clone());
    }

    let registered = inner
      .waiters
      .iter()
      .any(|waiter| matches!(waiter, Waiter::Async(w) if w.will_wake(cx.waker())));
    if !registered {
      inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
    }
    Poll::Pending
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::Barrier;
  use std::time::Duration;

  #[test]
  fn waiters_on_many_threads_share_one_value() {
    let cell = Arc::new(LoadCell::<String>::new());
    let barrier = Arc::new(Barrier::new(5));

    let handles: Vec<_> = (0..4)
      .map(|_| {
        let cell = cell.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
          barrier.wait();
          cell.wait()
        })
      })
      .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(20));
    let value = Arc::new("graph".to_string());
    cell.complete(Ok(value.clone()));

    for handle in handles {
      let got = handle.join().unwrap().unwrap();
      assert!(Arc::ptr_eq(&got, &value));
    }
  }

  #[test]
  fn first_completion_wins() {
    let cell = LoadCell::new();
    cell.complete(Err(LoadError::Panicked));
    cell.complete(Ok(Arc::new(1)));
    assert!(matches!(cell.wait(), Err(LoadError::Panicked)));
  }

  #[tokio::test]
  async fn async_waiter_is_woken() {
    let cell = Arc::new(LoadCell::new());
    let waiter = tokio::spawn(WaitLoad::new(cell.clone()));

    tokio::task::yield_now().await;
    cell.complete(Ok(Arc::new(42)));

    let value = waiter.await.unwrap().unwrap();
    assert_eq!(*value, 42);
  }
}
