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

use crate::thread_type::ThreadType;
use super::cores::Settable;
use super::{AltFuture, CancelReason, ChainError, Node, Value};

/// The completing side of a chain head that is set from outside.
///
/// ```
/// # use altfuture::Scheduler;
/// let scheduler = Scheduler::builder().build().unwrap();
///
/// let settable = scheduler.worker().settable::<u32>();
/// let doubled = settable.future().then(|n| n * 2);
///
/// settable.set(21);
/// assert_eq!(doubled.wait().unwrap(), 42);
/// ```
pub struct SettableAltFuture<T> {
    settable: Arc<Settable<T>>,
}

impl<T: Value> SettableAltFuture<T> {
    pub fn new(thread_type: &ThreadType) -> SettableAltFuture<T> {
        SettableAltFuture { settable: Arc::new(Settable::new(thread_type)) }
    }

    /// Complete the head, starting everything attached below it.
    ///
    /// # Panics
    ///
    /// If the head was already set or failed. A value set after the head was
    /// cancelled is dropped.
    pub fn set(&self, value: T) {
        self.settable.set(value)
    }

    /// Put the head into the error state, under the same rules as `set`
    pub fn fail<E>(&self, error: E)
        where E: Into<Box<dyn Error + Send + Sync>>
    {
        self.settable.fail(ChainError::new(error))
    }

    pub fn cancel<R: Into<CancelReason>>(&self, reason: R) -> bool {
        self.settable.cancel(&reason.into())
    }

    pub fn is_done(&self) -> bool {
        self.settable.progress().is_terminal()
    }

    /// The chain view of this head
    pub fn future(&self) -> AltFuture<T> {
        AltFuture::from_chain(self.settable.clone())
    }
}

impl<T> Clone for SettableAltFuture<T> {
    fn clone(&self) -> SettableAltFuture<T> {
        SettableAltFuture { settable: self.settable.clone() }
    }
}

impl<T: Value> fmt::Debug for SettableAltFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SettableAltFuture#{}({:?})", self.settable.id(), self.settable.progress())
    }
}
