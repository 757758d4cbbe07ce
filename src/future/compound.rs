// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use super::{AltFuture, CancelReason, ChainError, Node, State, Value};

/// Why a head/tail pair can not form a compound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundError {
    /// The head is itself linked below another node
    HeadHasUpchain { head: usize },
    /// Walking up from the tail never meets the head
    Unreachable { head: usize, tail: usize },
}

impl fmt::Display for CompoundError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CompoundError::HeadHasUpchain { head } => {
                write!(f, "compound head AltFuture#{} already has an upchain", head)
            }
            CompoundError::Unreachable { head, tail } => {
                write!(f, "AltFuture#{} is not reachable from compound head AltFuture#{}", tail, head)
            }
        }
    }
}

impl Error for CompoundError {}

/// A sub-chain exposed as one node.
///
/// Whatever looks downstream (`then`, `get`, `wait`, ...) goes to the tail;
/// `cancel` goes to the head, which takes the whole sub-chain with it.
pub struct CompoundAltFuture<T> {
    head: Arc<dyn Node>,
    tail: AltFuture<T>,
}

impl<T: Value> CompoundAltFuture<T> {
    /// Build the pair. Works whether or not the sub-chain already ran.
    pub fn new<H: Value>(head: &AltFuture<H>, tail: &AltFuture<T>) -> Result<CompoundAltFuture<T>, CompoundError> {
        let head = head.node();

        if head.ancestry().is_some() {
            return Err(CompoundError::HeadHasUpchain { head: head.id() });
        }

        let reachable = tail.id() == head.id() ||
                        tail.node().ancestry().map_or(false, |lineage| lineage.contains(head.id()));
        if !reachable {
            return Err(CompoundError::Unreachable {
                head: head.id(),
                tail: tail.id(),
            });
        }

        Ok(CompoundAltFuture {
            head: head,
            tail: tail.clone(),
        })
    }

    pub fn fork(&self) -> &CompoundAltFuture<T> {
        self.tail.fork();
        self
    }

    /// Cancel the head and with it every node of the sub-chain
    pub fn cancel<R: Into<CancelReason>>(&self, reason: R) -> bool {
        self.head.cancel(&reason.into())
    }

    pub fn then<U, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              F: FnOnce(T) -> U + Send + 'static
    {
        self.tail.then(action)
    }

    pub fn try_then<U, E, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              E: Into<Box<dyn Error + Send + Sync>>,
              F: FnOnce(T) -> Result<U, E> + Send + 'static
    {
        self.tail.try_then(action)
    }

    pub fn on_error<F>(&self, handler: F) -> AltFuture<T>
        where F: FnOnce(&ChainError) -> bool + Send + 'static
    {
        self.tail.on_error(handler)
    }

    pub fn on_cancelled<F>(&self, handler: F) -> AltFuture<T>
        where F: FnOnce(&CancelReason) + Send + 'static
    {
        self.tail.on_cancelled(handler)
    }

    pub fn is_done(&self) -> bool {
        self.tail.is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.tail.is_cancelled()
    }

    pub fn get(&self) -> T {
        self.tail.get()
    }

    pub fn try_get(&self) -> Option<T> {
        self.tail.try_get()
    }

    pub fn outcome(&self) -> State<T> {
        self.tail.outcome()
    }

    pub fn wait(&self) -> Result<T, ChainError> {
        self.tail.wait()
    }

    pub fn head_id(&self) -> usize {
        self.head.id()
    }

    pub fn tail(&self) -> &AltFuture<T> {
        &self.tail
    }

    pub fn into_future(self) -> AltFuture<T> {
        self.tail
    }
}

impl<T: Value> fmt::Debug for CompoundAltFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CompoundAltFuture(head: AltFuture#{}, tail: {:?})", self.head.id(), self.tail)
    }
}
