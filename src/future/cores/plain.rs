// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::Arc;

use crate::thread_type::ThreadType;
use super::{lost_race, Core};
use super::super::{CancelReason, Chain, ChainError, Node, Progress, State, Value};

/// A head completed from outside instead of by an action.
///
/// Forking only marks it `Forked`; nothing is scheduled.
pub(crate) struct Settable<T> {
    core: Core<T>,
}

impl<T: Value> Settable<T> {
    pub fn new(thread_type: &ThreadType) -> Settable<T> {
        Settable { core: Core::new(thread_type) }
    }

    /// Complete with `value`.
    ///
    /// # Panics
    ///
    /// If the node is already done or failed. Setting a cancelled node is
    /// ignored.
    pub fn set(&self, value: T) {
        self.complete(State::Done(value))
    }

    /// Complete with `error`, under the same rules as `set`
    pub fn fail(&self, error: ChainError) {
        self.complete(State::failed(error))
    }

    fn complete(&self, next: State<T>) {
        match self.core.settle(next) {
            Ok(()) => self.core.propagate(),
            Err(Progress::Cancelled(reason)) => {
                debug!("AltFuture#{} set after it was cancelled: {}", self.core.id(), reason)
            }
            Err(winner) => panic!("AltFuture#{} completed twice, already {:?}", self.core.id(), winner),
        }
    }
}

impl<T: Value> Node for Settable<T> {
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
        None
    }

    fn fork(self: Arc<Self>) {
        self.core.try_fork();
    }

    fn cancel(&self, reason: &CancelReason) -> bool {
        match self.core.settle(State::Cancelled(reason.clone())) {
            Ok(()) => {
                self.core.propagate();
                true
            }
            Err(winner) => {
                lost_race(self.core.id(), "cancel", &winner);
                false
            }
        }
    }

    fn on_upstream_error(&self, error: &ChainError) {
        self.cancel(&CancelReason::upstream_error(error));
    }
}

impl<T: Value> Chain<T> for Settable<T> {
    fn state(&self) -> State<T> {
        self.core.state()
    }

    fn value(&self) -> Option<T> {
        self.core.value()
    }

    fn attach(&self, node: Arc<dyn Node>) {
        self.core.attach(node)
    }

    fn as_node(self: Arc<Self>) -> Arc<dyn Node> {
        self
    }
}
