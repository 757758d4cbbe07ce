// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::future::Value;
use crate::sync::Spinlock;
use crate::thread_type::ThreadType;
use super::{next_id, Flow, Source, Subscription, Target, Targets};

struct Cell<T> {
    id: usize,
    name: String,
    thread_type: ThreadType,
    value: Spinlock<Option<T>>,
    targets: Targets<T>,
}

impl<T: Value> Source for Cell<T> {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn thread_type(&self) -> &ThreadType {
        &self.thread_type
    }

    fn is_active(&self) -> bool {
        true
    }

    fn remove_target(&self, key: usize) -> bool {
        self.targets.remove(key).is_some()
    }

    fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn unsubscribe_all(&self) {
        for target in self.targets.drain() {
            target.detach(self.id);
        }
    }

    fn stop(&self) {
        self.unsubscribe_all()
    }
}

impl<T: Value> Flow<T> for Cell<T> {
    fn add_target(&self, target: Arc<dyn Target<T>>) -> usize {
        // Under the value lock, so the new target sees every later change
        let value = self.value.lock();
        let key = self.targets.add(target.clone());
        if let Some(ref value) = *value {
            target.fire(value.clone());
        }
        key
    }

    fn latest(&self) -> Option<T> {
        self.value.lock().clone()
    }

    fn as_source(self: Arc<Self>) -> Arc<dyn Source> {
        self
    }
}

/// A value that tells its subscribers whenever it changes.
///
/// ```
/// # use altfuture::{ReactiveValue, Scheduler};
/// # use std::sync::{mpsc, Mutex};
/// let scheduler = Scheduler::builder().build().unwrap();
/// let (tx, rx) = mpsc::channel();
/// let tx = Mutex::new(tx);
///
/// let temperature = ReactiveValue::new(scheduler.serial_worker(), "temperature", Some(20));
/// let _guard = temperature.subscribe(move |t| tx.lock().unwrap().send(t).unwrap()).guard();
///
/// assert_eq!(rx.recv().unwrap(), 20);
/// temperature.set(21);
/// assert_eq!(rx.recv().unwrap(), 21);
/// ```
pub struct ReactiveValue<T> {
    cell: Arc<Cell<T>>,
}

impl<T: Value + PartialEq> ReactiveValue<T> {
    /// A value whose subscribers run on `thread_type` unless they ask for
    /// another one
    pub fn new<S: Into<String>>(thread_type: &ThreadType, name: S, initial: Option<T>) -> ReactiveValue<T> {
        ReactiveValue {
            cell: Arc::new(Cell {
                id: next_id(),
                name: name.into(),
                thread_type: thread_type.clone(),
                value: Spinlock::new(initial),
                targets: Targets::new(),
            }),
        }
    }

    /// The current value.
    ///
    /// # Panics
    ///
    /// If the value was never set.
    pub fn get(&self) -> T {
        match self.try_get() {
            Some(value) => value,
            None => panic!("ReactiveValue `{}` read before it was set", self.cell.name),
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.cell.value.lock().clone()
    }

    /// Store `value` and fire it to every subscriber.
    ///
    /// Returns `false`, firing nothing, if it equals the current value.
    pub fn set(&self, value: T) -> bool {
        let outcome = {
            let mut current = self.cell.value.lock();
            if current.as_ref() == Some(&value) {
                Err(value)
            } else {
                self.cell.targets.fire(&value);
                let previous = mem::replace(&mut *current, Some(value));
                Ok(previous)
            }
        };
        changed(outcome)
    }

    /// Set `value` only if the current value equals `expected`
    pub fn compare_and_set(&self, expected: Option<&T>, value: T) -> bool {
        let (matched, outcome) = {
            let mut current = self.cell.value.lock();
            if current.as_ref() != expected {
                (false, Err(value))
            } else if current.as_ref() == Some(&value) {
                (true, Err(value))
            } else {
                self.cell.targets.fire(&value);
                let previous = mem::replace(&mut *current, Some(value));
                (true, Ok(previous))
            }
        };
        changed(outcome);
        matched
    }

    /// Run `action` on this value's thread type with the current value, if
    /// any, and with every change after it
    pub fn subscribe<F>(&self, action: F) -> Subscription<()>
        where F: Fn(T) + Send + Sync + 'static
    {
        self.subscribe_on(&self.cell.thread_type, action)
    }

    pub fn subscribe_on<F>(&self, thread_type: &ThreadType, action: F) -> Subscription<()>
        where F: Fn(T) + Send + Sync + 'static
    {
        let name = format!("{}.subscribe", self.cell.name);
        super::relay(self.flow(), thread_type, name, action)
    }

    /// A subscription producing `f` of every value
    pub fn map<U, F>(&self, f: F) -> Subscription<U>
        where U: Value,
              F: Fn(T) -> U + Send + Sync + 'static
    {
        let name = format!("{}.map", self.cell.name);
        super::relay(self.flow(), &self.cell.thread_type, name, f)
    }

    /// Drop every subscriber. Subscriptions left without a source stop.
    pub fn unsubscribe_all(&self) {
        self.cell.unsubscribe_all()
    }

    pub fn subscriber_count(&self) -> usize {
        self.cell.targets.len()
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn thread_type(&self) -> &ThreadType {
        &self.cell.thread_type
    }

    fn flow(&self) -> Arc<dyn Flow<T>> {
        self.cell.clone()
    }
}

impl<T> Clone for ReactiveValue<T> {
    fn clone(&self) -> ReactiveValue<T> {
        ReactiveValue { cell: self.cell.clone() }
    }
}

impl<T: Value + fmt::Debug> fmt::Debug for ReactiveValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReactiveValue({}, {:?})", self.cell.name, *self.cell.value.lock())
    }
}

/// Drop whatever `set` displaced or rejected, outside the value lock.
/// `true` if the value changed.
fn changed<T>(outcome: Result<Option<T>, T>) -> bool {
    outcome.is_ok()
}
