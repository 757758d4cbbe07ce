// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::sync::Spinlock;
use crate::thread_type::ThreadType;
use super::{CancelReason, ChainError, Node, Progress, State, Value};

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

/// Process-wide unique node id, used in logs and to walk chains
pub(crate) fn next_id() -> usize {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// State slot and downchain shared by every node type.
pub(crate) struct Core<T> {
    id: usize,
    thread_type: ThreadType,
    state: Spinlock<State<T>>,
    downchain: Spinlock<Vec<Arc<dyn Node>>>,
}

impl<T: Value> Core<T> {
    pub fn new(thread_type: &ThreadType) -> Core<T> {
        Core {
            id: next_id(),
            thread_type: thread_type.clone(),
            state: Spinlock::new(State::Pending),
            downchain: Spinlock::new(Vec::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn thread_type(&self) -> &ThreadType {
        &self.thread_type
    }

    pub fn progress(&self) -> Progress {
        let state = self.state.lock();
        match *state {
            State::Pending => Progress::Pending,
            State::Forked => Progress::Forked,
            State::Done(..) => Progress::Done,
            State::Cancelled(ref reason) => Progress::Cancelled(reason.clone()),
            State::Error(ref error) => Progress::Failed(error.clone()),
        }
    }

    pub fn state(&self) -> State<T> {
        self.state.lock().clone()
    }

    pub fn value(&self) -> Option<T> {
        let state = self.state.lock();
        match *state {
            State::Done(ref value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().is_terminal()
    }

    /// `Pending → Forked`. `false` if the node already left `Pending`.
    pub fn try_fork(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Pending => {
                *state = State::Forked;
                true
            }
            _ => false,
        }
    }

    /// `{Pending | Forked} → next`. On failure the terminal state that won is
    /// returned and `next` is dropped.
    pub fn settle(&self, next: State<T>) -> Result<(), Progress> {
        debug_assert!(next.is_terminal());

        let rejected = {
            let mut state = self.state.lock();
            if state.is_terminal() {
                Some(next)
            } else {
                *state = next;
                None
            }
        };

        match rejected {
            None => Ok(()),
            // Drop the rejected value outside the lock
            Some(rejected) => {
                drop(rejected);
                Err(self.progress())
            }
        }
    }

    pub fn attach(&self, node: Arc<dyn Node>) {
        {
            let mut downchain = self.downchain.lock();
            if !self.is_done() {
                downchain.push(node.clone());
            }
        }

        // Covers both "already terminal" and "finished while attaching";
        // a second notification is a duplicate fork and is ignored.
        if self.is_done() {
            dispatch(Event::Fork(node));
        }
    }

    /// Hand the terminal state to every downchain node, then forget them.
    pub fn propagate(&self) {
        let downchain = mem::replace(&mut *self.downchain.lock(), Vec::new());

        match self.progress() {
            Progress::Done => {
                for node in downchain {
                    dispatch(Event::UpstreamDone(node));
                }
            }
            Progress::Cancelled(reason) => {
                for node in downchain {
                    dispatch(Event::Cancelled(node, reason.clone()));
                }
            }
            Progress::Failed(error) => {
                if !downchain.iter().any(|node| node.handles_errors()) {
                    self.uncaught(&error);
                }

                for node in downchain {
                    dispatch(Event::Failed(node, error.clone()));
                }
            }
            progress => {
                error!("AltFuture#{} propagating while {:?}", self.id, progress);
            }
        }
    }

    fn uncaught(&self, error: &ChainError) {
        error!("AltFuture#{} on `{}` failed and nothing handles it: {}",
               self.id,
               self.thread_type.name(),
               error);

        if self.thread_type.config().fail_fast {
            error!("fail_fast is set, aborting");
            process::abort();
        }
    }
}

/// A notification from one node to a neighbour
pub(crate) enum Event {
    Fork(Arc<dyn Node>),
    UpstreamDone(Arc<dyn Node>),
    Cancelled(Arc<dyn Node>, CancelReason),
    Failed(Arc<dyn Node>, ChainError),
}

impl Event {
    fn deliver(self) {
        match self {
            Event::Fork(node) => node.fork(),
            Event::UpstreamDone(node) => node.on_upstream_done(),
            Event::Cancelled(node, reason) => node.on_cancelled(&reason),
            Event::Failed(node, error) => node.on_upstream_error(&error),
        }
    }
}

// Events raised while this thread is already delivering one. `None` when
// nothing is being delivered.
thread_local!(static PENDING_EVENTS: RefCell<Option<VecDeque<Event>>> = RefCell::new(None));

/// Clears the queue if a delivery unwinds, so the thread can deliver again.
struct Delivering;

impl Drop for Delivering {
    fn drop(&mut self) {
        let abandoned = PENDING_EVENTS.with(|pending| pending.borrow_mut().take());
        drop(abandoned);
    }
}

/// Deliver `event`, and everything it causes, before returning.
///
/// Nested calls only queue their event for the outermost call to deliver,
/// so the stack stays flat however long the chain is.
pub(crate) fn dispatch(event: Event) {
    let first = PENDING_EVENTS.with(|pending| {
        let mut pending = pending.borrow_mut();
        match *pending {
            Some(ref mut queue) => {
                queue.push_back(event);
                None
            }
            None => {
                *pending = Some(VecDeque::new());
                Some(event)
            }
        }
    });

    let mut next = match first {
        Some(event) => event,
        None => return,
    };

    let delivering = Delivering;
    loop {
        next.deliver();

        let queued = PENDING_EVENTS.with(|pending| {
            let mut pending = pending.borrow_mut();
            pending.as_mut().and_then(|queue| queue.pop_front())
        });
        next = match queued {
            Some(event) => event,
            None => break,
        };
    }
    drop(delivering);
}

/// The ids of a node and of every node it was linked below, in order.
///
/// Recorded when the link is made and never burned down, so it outlives the
/// upchain references themselves.
pub(crate) struct Lineage {
    pub id: usize,
    pub parent: Option<Arc<Lineage>>,
}

impl Lineage {
    pub fn new(id: usize, parent: Option<Arc<Lineage>>) -> Arc<Lineage> {
        Arc::new(Lineage {
            id: id,
            parent: parent,
        })
    }

    /// Whether `id` is this node or one of its ancestors
    pub fn contains(&self, id: usize) -> bool {
        let mut lineage = self;
        loop {
            if lineage.id == id {
                return true;
            }
            lineage = match lineage.parent {
                Some(ref parent) => parent,
                None => return false,
            };
        }
    }
}

impl Drop for Lineage {
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(lineage) = parent {
            parent = match Arc::try_unwrap(lineage) {
                Ok(mut lineage) => lineage.parent.take(),
                Err(_) => None,
            };
        }
    }
}

/// Let go of a chain of upchain references one node at a time.
pub(crate) fn unlink(upchain: Option<Arc<dyn Node>>) {
    let mut next = upchain;
    while let Some(node) = next {
        next = if Arc::strong_count(&node) == 1 {
            node.take_upchain()
        } else {
            None
        };
    }
}

/// Log the outcome of a lost race to settle a node.
pub(crate) fn lost_race(id: usize, what: &str, winner: &Progress) {
    match *winner {
        Progress::Cancelled(ref reason) => {
            debug!("AltFuture#{} {} ignored, already cancelled: {}", id, what, reason)
        }
        ref winner => debug!("AltFuture#{} {} ignored, already {:?}", id, what, winner),
    }
}

/// Reason used when a thread type refuses to run a node.
pub(crate) fn rejected(id: usize, thread_type: &ThreadType) -> CancelReason {
    CancelReason::new(format!("thread type `{}` is shut down, AltFuture#{} not run",
                              thread_type.name(),
                              id))
}

mod catch;
mod plain;
mod then;
mod wait;

pub(crate) use self::catch::{Handled, Handlers};
pub(crate) use self::plain::Settable;
pub(crate) use self::then::Link;
pub(crate) use self::wait::Waiter;
