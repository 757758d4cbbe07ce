// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The timer thread behind `AltFuture::sleep`

use std::cmp::{Ord, Ordering, PartialOrd};
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, Builder};
use std::time::{Duration, Instant};

use crate::runtime::processor;

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct SleepingTask {
    // `None` for a delay too long to represent, which never elapses
    wakeup: Option<Instant>,
    seq: u64,
    callback: Callback,
}

impl PartialEq for SleepingTask {
    fn eq(&self, other: &SleepingTask) -> bool {
        self.wakeup == other.wakeup && self.seq == other.seq
    }
}

impl Eq for SleepingTask {}

impl PartialOrd<SleepingTask> for SleepingTask {
    fn partial_cmp(&self, other: &SleepingTask) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the earliest wakeup must compare greatest.
// Ties fall back to insertion order.
impl Ord for SleepingTask {
    fn cmp(&self, other: &SleepingTask) -> Ordering {
        let by_wakeup = match (self.wakeup, other.wakeup) {
            (Some(mine), Some(theirs)) => theirs.cmp(&mine),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        by_wakeup.then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerState {
    sleeping_tasks: BinaryHeap<SleepingTask>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerShared {
    name: String,
    state: Mutex<TimerState>,
    cond: Condvar,
}

impl TimerShared {
    fn state(&self) -> MutexGuard<TimerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A single thread that runs callbacks once their delay has elapsed.
///
/// Callbacks run on the timer thread itself, so they should only hand work
/// over to a thread type.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<TimerShared>,
}

impl Timer {
    /// Spawn the timer thread
    pub fn new<S: Into<String>>(name: S) -> io::Result<Timer> {
        let shared = Arc::new(TimerShared {
            name: name.into(),
            state: Mutex::new(TimerState {
                sleeping_tasks: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let timer = Timer { shared: shared.clone() };
        Builder::new().name(shared.name.clone()).spawn(move || {
            processor::mark_pool_thread();
            run(&shared);
        })?;

        Ok(timer)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Run `callback` on the timer thread once `delay` has elapsed.
    ///
    /// Returns `false` and drops the callback if the timer is shut down. A
    /// delay past the range of `Instant` never elapses; the callback is held
    /// until shutdown.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> bool
        where F: FnOnce() + Send + 'static
    {
        let wakeup = Instant::now().checked_add(delay);
        if wakeup.is_none() {
            debug!("Timer `{}` got a delay of {:?}, it will never fire", self.shared.name, delay);
        }

        let mut state = self.shared.state();
        if state.shutdown {
            warn!("Timer `{}` is shut down, dropping callback", self.shared.name);
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.sleeping_tasks.push(SleepingTask {
            wakeup: wakeup,
            seq: seq,
            callback: Box::new(callback),
        });
        self.shared.cond.notify_one();
        true
    }

    /// Number of callbacks still waiting for their deadline
    pub fn pending(&self) -> usize {
        self.shared.state().sleeping_tasks.len()
    }

    /// Stop the timer thread. Pending callbacks are dropped and their count returned.
    pub fn shutdown(&self) -> usize {
        let dropped = {
            let mut state = self.shared.state();
            state.shutdown = true;
            let dropped = state.sleeping_tasks.len();
            state.sleeping_tasks.clear();
            dropped
        };
        self.shared.cond.notify_all();

        if dropped > 0 {
            debug!("Timer `{}` shut down with {} pending callbacks", self.shared.name, dropped);
        }
        dropped
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state().shutdown
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timer({})", self.shared.name)
    }
}

fn run(shared: &TimerShared) {
    let mut state = shared.state();

    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let wait = match state.sleeping_tasks.peek().map(|sleeping| sleeping.wakeup) {
            Some(Some(wakeup)) if wakeup <= now => None,
            Some(Some(wakeup)) => Some(Some(wakeup - now)),
            Some(None) | None => Some(None),
        };

        match wait {
            None => {
                let task = state.sleeping_tasks.pop();
                drop(state);

                if let Some(task) = task {
                    if let Err(err) = crate::protect(task.callback) {
                        error!("Timer `{}` callback panicked: {}", shared.name, err);
                    }
                }

                state = shared.state();
            }
            Some(Some(timeout)) => {
                state = match shared.cond.wait_timeout(state, timeout) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
            Some(None) => {
                state = match shared.cond.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        }
    }

    debug!("Timer `{}` exiting on {:?}", shared.name, thread::current().name());
}
