// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! One-waiter, many-notifier barrier used by the blocking `wait()` adapter

use std::error::Error;
use std::fmt;
use std::mem;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

enum State {
    Empty,
    Ready,
    Waiting,
}

/// Blocks a single thread until some other thread calls `notify`.
///
/// Notifying before anyone waits leaves the barrier `Ready`, so the next
/// `wait` returns immediately. Extra notifications are absorbed.
pub struct MonoBarrier {
    lock: Mutex<State>,
    cond: Condvar,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MonoBarrierError {
    Occupied,
    PoisonError,
}

impl fmt::Display for MonoBarrierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MonoBarrierError::Occupied => write!(f, "another thread is already waiting on this barrier"),
            MonoBarrierError::PoisonError => write!(f, "barrier lock poisoned"),
        }
    }
}

impl Error for MonoBarrierError {}

impl MonoBarrier {
    /// Create a new `MonoBarrier`
    pub fn new() -> MonoBarrier {
        MonoBarrier {
            lock: Mutex::new(State::Empty),
            cond: Condvar::new(),
        }
    }

    /// Wait until notified, fail if someone is already waiting
    pub fn wait(&self) -> Result<(), MonoBarrierError> {
        self.wait_until(None).map(|_| ())
    }

    /// Wait until notified or `timeout` elapses. Returns `Ok(false)` on timeout.
    /// A timeout too long to represent waits like `wait`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, MonoBarrierError> {
        self.wait_until(Instant::now().checked_add(timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool, MonoBarrierError> {
        let mut guard = match self.lock.lock() {
            Err(_) => return Err(MonoBarrierError::PoisonError),
            Ok(guard) => guard,
        };

        match *guard {
            State::Ready => {
                *guard = State::Empty;
                return Ok(true);
            }
            State::Waiting => return Err(MonoBarrierError::Occupied),
            State::Empty => *guard = State::Waiting,
        }

        loop {
            guard = match deadline {
                None => match self.cond.wait(guard) {
                    Err(_) => return Err(MonoBarrierError::PoisonError),
                    Ok(guard) => guard,
                },
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        *guard = State::Empty;
                        return Ok(false);
                    }

                    match self.cond.wait_timeout(guard, deadline - now) {
                        Err(_) => return Err(MonoBarrierError::PoisonError),
                        Ok((guard, _)) => guard,
                    }
                }
            };

            if let State::Ready = *guard {
                *guard = State::Empty;
                return Ok(true);
            }
        }
    }

    /// Notify the waiting thread, or mark the barrier ready for the next `wait`
    pub fn notify(&self) {
        let mut guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let State::Waiting = mem::replace(&mut *guard, State::Ready) {
            self.cond.notify_one();
        }
    }
}

impl Default for MonoBarrier {
    fn default() -> MonoBarrier {
        MonoBarrier::new()
    }
}

impl fmt::Debug for MonoBarrier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.lock.try_lock() {
            Ok(guard) => match *guard {
                State::Empty => write!(f, "MonoBarrier(Empty)"),
                State::Ready => write!(f, "MonoBarrier(Ready)"),
                State::Waiting => write!(f, "MonoBarrier(Waiting)"),
            },
            Err(_) => write!(f, "MonoBarrier(<locked>)"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_mono_barrier_thread_notify() {
        let barrier = Arc::new(MonoBarrier::new());
        let state = Arc::new(AtomicUsize::new(0));

        let h = {
            let barrier = barrier.clone();
            let state = state.clone();

            thread::spawn(move || {
                state.store(1, Ordering::SeqCst);
                barrier.notify();
            })
        };

        barrier.wait().unwrap();
        assert_eq!(state.load(Ordering::SeqCst), 1);

        h.join().unwrap();
    }

    #[test]
    fn test_mono_barrier_notify_before_wait() {
        let barrier = MonoBarrier::new();

        barrier.notify();
        barrier.notify();
        barrier.notify();

        assert_eq!(barrier.wait(), Ok(()));
        assert_eq!(barrier.wait_timeout(Duration::from_millis(10)), Ok(false));
    }

    #[test]
    fn test_mono_barrier_unbounded_timeout() {
        let barrier = Arc::new(MonoBarrier::new());

        let h = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                barrier.notify();
            })
        };

        assert_eq!(barrier.wait_timeout(Duration::from_secs(u64::max_value())), Ok(true));
        h.join().unwrap();
    }

    #[test]
    fn test_mono_barrier_thread_wait() {
        let barrier = Arc::new(MonoBarrier::new());
        let state = Arc::new(AtomicUsize::new(0));

        let h = {
            let barrier = barrier.clone();
            let state = state.clone();

            thread::spawn(move || {
                barrier.wait().unwrap();
                assert_eq!(state.load(Ordering::SeqCst), 1);
            })
        };

        thread::sleep(Duration::from_millis(10));
        state.store(1, Ordering::SeqCst);
        barrier.notify();

        h.join().unwrap();
    }
}
