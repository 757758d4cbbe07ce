// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use crate::sync::Spinlock;
use crate::thread_type::ThreadType;
use super::{dispatch, lost_race, rejected, unlink, Core, Event, Handled, Handlers, Lineage};
use super::super::{CancelReason, Chain, ChainError, Node, Progress, State, Value};

type Action<I, O> = Box<dyn FnOnce(I) -> Result<O, ChainError> + Send + 'static>;

/// A node that runs an action once its upchain, and every node it awaits,
/// is done.
///
/// Heads have no upchain and read their input from `seed` instead. Every
/// combinator of `AltFuture` is a `Link` with a particular action, delay or
/// set of handlers.
pub(crate) struct Link<I, O> {
    core: Core<O>,
    upchain: Spinlock<Option<Arc<dyn Chain<I>>>>,
    ancestry: Spinlock<Option<Arc<Lineage>>>,
    seed: Spinlock<Option<I>>,
    awaits: Spinlock<Vec<Arc<dyn Node>>>,
    action: Spinlock<Option<Action<I, O>>>,
    delay: Option<Duration>,
    handlers: Handlers,
}

impl<I: Value, O: Value> Link<I, O> {
    pub fn new<F>(thread_type: &ThreadType, action: F) -> Link<I, O>
        where F: FnOnce(I) -> Result<O, ChainError> + Send + 'static
    {
        Link {
            core: Core::new(thread_type),
            upchain: Spinlock::new(None),
            ancestry: Spinlock::new(None),
            seed: Spinlock::new(None),
            awaits: Spinlock::new(Vec::new()),
            action: Spinlock::new(Some(Box::new(action))),
            delay: None,
            handlers: Handlers::none(),
        }
    }

    /// Input of a head link
    pub fn with_seed(self, seed: I) -> Link<I, O> {
        *self.seed.lock() = Some(seed);
        self
    }

    /// Hold the result back for `delay` before finishing
    pub fn with_delay(mut self, delay: Duration) -> Link<I, O> {
        self.delay = Some(delay);
        self
    }

    pub fn with_handlers(mut self, handlers: Handlers) -> Link<I, O> {
        self.handlers = handlers;
        self
    }

    /// Link this node below `upchain`. Only the first call takes effect,
    /// later ones are merges and are ignored.
    pub fn set_upchain(&self, upchain: Arc<dyn Chain<I>>) -> bool {
        let lineage = Lineage::new(upchain.id(), upchain.ancestry());
        let rejected = {
            let mut slot = self.upchain.lock();
            let mut ancestry = self.ancestry.lock();
            if ancestry.is_some() {
                Some(upchain)
            } else {
                *slot = Some(upchain);
                *ancestry = Some(lineage);
                None
            }
        };

        match rejected {
            None => true,
            Some(other) => {
                debug!("AltFuture#{} already has an upchain, merge with AltFuture#{} ignored",
                       self.core.id(),
                       other.id());
                false
            }
        }
    }

    /// Also wait for `node` before running
    pub fn add_await(&self, node: Arc<dyn Node>) {
        self.awaits.lock().push(node);
    }

    fn prerequisites(&self) -> Vec<Arc<dyn Node>> {
        let upchain = self.upchain.lock().clone();
        let mut nodes = self.awaits.lock().clone();
        if let Some(upchain) = upchain {
            nodes.insert(0, upchain.as_node());
        }
        nodes
    }

    fn run(self: Arc<Self>) {
        if self.core.is_done() {
            debug!("AltFuture#{} finished before it started", self.core.id());
            return;
        }

        let action = self.action.lock().take();
        let action = match action {
            Some(action) => action,
            None => return,
        };

        let input = match self.input() {
            Some(input) => input,
            None => {
                debug!("AltFuture#{} lost its input", self.core.id());
                return;
            }
        };

        let next = match crate::protect(move || action(input)) {
            Ok(Ok(value)) => State::Done(value),
            Ok(Err(err)) | Err(err) => State::failed(err),
        };

        match (self.delay, next) {
            (Some(delay), State::Done(value)) => self.finish_after(delay, value),
            (_, next) => self.finish(next),
        }
    }

    fn input(&self) -> Option<I> {
        let upchain = self.upchain.lock().clone();
        match upchain {
            Some(upchain) => upchain.value(),
            None => self.seed.lock().take(),
        }
    }

    fn finish_after(self: Arc<Self>, delay: Duration, value: O) {
        let this = self.clone();
        let scheduled = self.core.thread_type().timer().schedule(delay, move || {
            let thread_type = this.core.thread_type().clone();
            let node = this.clone();
            if thread_type.execute(move || node.finish(State::Done(value))).is_err() {
                this.cancel(&rejected(this.core.id(), &thread_type));
            }
        });

        if !scheduled {
            self.cancel(&CancelReason::new(format!("timer `{}` is shut down, AltFuture#{} not delayed",
                                                   self.core.thread_type().timer().name(),
                                                   self.core.id())));
        }
    }

    fn finish(&self, next: State<O>) {
        match self.core.settle(next) {
            Ok(()) => self.settled(),
            Err(winner) => lost_race(self.core.id(), "result", &winner),
        }
    }

    /// Release everything the node no longer needs, run the cancellation
    /// handler, then notify the downchain.
    fn settled(&self) {
        let upchain = self.upchain.lock().take();
        let awaits = mem::replace(&mut *self.awaits.lock(), Vec::new());
        let seed = self.seed.lock().take();
        let action = self.action.lock().take();
        drop((upchain, awaits, seed, action));

        if let Progress::Cancelled(reason) = self.core.progress() {
            self.handlers.cancelled(self.core.id(), &reason);
        }
        self.handlers.clear();

        self.core.propagate();
    }
}

impl<I: Value, O: Value> Node for Link<I, O> {
    fn id(&self) -> usize {
        self.core.id()
    }

    fn thread_type(&self) -> &ThreadType {
        self.core.thread_type()
    }

    fn progress(&self) -> Progress {
        self.core.progress()
    }

    fn upchain(&self) -> Option<Arc<dyn Node>> {
        let upchain = self.upchain.lock().clone();
        upchain.map(|upchain| upchain.as_node())
    }

    fn ancestry(&self) -> Option<Arc<Lineage>> {
        self.ancestry.lock().clone()
    }

    fn take_upchain(&self) -> Option<Arc<dyn Node>> {
        let upchain = self.upchain.lock().take();
        upchain.map(|upchain| upchain.as_node())
    }

    fn fork(self: Arc<Self>) {
        if self.core.is_done() {
            return;
        }

        let mut waiting = Vec::new();
        for node in self.prerequisites() {
            match node.progress() {
                Progress::Done => {}
                Progress::Cancelled(reason) => {
                    self.on_cancelled(&reason);
                    return;
                }
                Progress::Failed(error) => {
                    self.on_upstream_error(&error);
                    return;
                }
                Progress::Pending | Progress::Forked => waiting.push(node),
            }
        }

        if !waiting.is_empty() {
            for node in waiting {
                dispatch(Event::Fork(node));
            }
            return;
        }

        if !self.core.try_fork() {
            return;
        }

        let thread_type = self.core.thread_type().clone();
        let this = self.clone();
        if thread_type.execute(move || this.run()).is_err() {
            self.cancel(&rejected(self.core.id(), &thread_type));
        }
    }

    fn cancel(&self, reason: &CancelReason) -> bool {
        match self.core.settle(State::Cancelled(reason.clone())) {
            Ok(()) => {
                self.settled();
                true
            }
            Err(winner) => {
                lost_race(self.core.id(), "cancel", &winner);
                false
            }
        }
    }

    fn on_upstream_error(&self, error: &ChainError) {
        if self.core.is_done() {
            return;
        }

        match self.handlers.error(self.core.id(), error) {
            Handled::NoHandler => {
                self.cancel(&CancelReason::upstream_error(error));
            }
            Handled::InProgress => {}
            Handled::Consumed => {
                let reason = CancelReason::caused_by(format!("error consumed: {}", error), error);
                self.cancel(&reason);
            }
            Handled::Rethrow => self.finish(State::Error(error.clone())),
        }
    }

    fn handles_errors(&self) -> bool {
        self.handlers.handles_errors()
    }
}

impl<I: Value, O: Value> Chain<O> for Link<I, O> {
    fn state(&self) -> State<O> {
        self.core.state()
    }

    fn value(&self) -> Option<O> {
        self.core.value()
    }

    fn attach(&self, node: Arc<dyn Node>) {
        self.core.attach(node)
    }

    fn as_node(self: Arc<Self>) -> Arc<dyn Node> {
        self
    }
}

impl<I, O> Drop for Link<I, O> {
    fn drop(&mut self) {
        let upchain = self.upchain.lock().take();
        unlink(upchain.map(|upchain| upchain.as_node()));
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::options::ThreadTypeOptions;
    use super::*;

    fn thread_type(name: &str) -> ThreadType {
        ThreadType::with_options(ThreadTypeOptions::new(name)).unwrap()
    }

    fn stop(tt: &ThreadType) {
        tt.shutdown();
        tt.join();
        tt.timer().shutdown();
    }

    #[test]
    fn test_head_runs_once_and_burns_down() {
        let tt = thread_type("link-head");
        let (tx, rx) = mpsc::channel();

        let head = Arc::new(Link::new(&tt, move |n: u32| {
                tx.send(n).unwrap();
                Ok(n + 1)
            })
            .with_seed(41));

        head.clone().fork();
        head.clone().fork();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 41);
        stop(&tt);

        assert!(rx.try_recv().is_err());
        assert_eq!(head.value(), Some(42));
        assert!(head.action.lock().is_none());
    }

    #[test]
    fn test_second_upchain_is_ignored() {
        let tt = thread_type("link-merge");

        let first: Arc<dyn Chain<u32>> = Arc::new(Link::new(&tt, |()| Ok(1u32)).with_seed(()));
        let second: Arc<dyn Chain<u32>> = Arc::new(Link::new(&tt, |()| Ok(2u32)).with_seed(()));
        let link = Link::new(&tt, |n: u32| Ok(n));

        assert!(link.set_upchain(first.clone()));
        assert!(!link.set_upchain(second));
        assert_eq!(link.upchain().map(|node| node.id()), Some(first.id()));
        stop(&tt);
    }

    #[test]
    fn test_fork_on_shut_down_thread_type_cancels() {
        let tt = thread_type("link-closed");
        stop(&tt);

        let head = Arc::new(Link::new(&tt, |()| Ok(1u8)).with_seed(()));
        head.clone().fork();

        match head.state() {
            State::Cancelled(reason) => assert!(reason.message().contains("link-closed")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
