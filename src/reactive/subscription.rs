// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::future::Value;
use crate::sync::Spinlock;
use crate::thread_type::ThreadType;
use super::{next_id, Flow, Source, Target, Targets};

enum FireSlot<T> {
    NotQueued,
    Pending { value: T, seq: usize },
}

/// A subscriber node: receives values, transforms them on its thread type
/// and hands the result on to its own subscribers.
pub(crate) struct Relay<I, O> {
    id: usize,
    name: String,
    thread_type: ThreadType,
    on_fire: Box<dyn Fn(I) -> O + Send + Sync + 'static>,
    slot: Spinlock<FireSlot<I>>,
    next_seq: AtomicUsize,
    latest: Spinlock<Option<O>>,
    targets: Targets<O>,
    sources: Spinlock<Vec<(Arc<dyn Source>, usize)>>,
    active: AtomicBool,
}

impl<I: Value, O: Value> Relay<I, O> {
    pub fn new<F>(thread_type: &ThreadType, name: String, on_fire: F) -> Relay<I, O>
        where F: Fn(I) -> O + Send + Sync + 'static
    {
        Relay {
            id: next_id(),
            name: name,
            thread_type: thread_type.clone(),
            on_fire: Box::new(on_fire),
            slot: Spinlock::new(FireSlot::NotQueued),
            next_seq: AtomicUsize::new(0),
            latest: Spinlock::new(None),
            targets: Targets::new(),
            sources: Spinlock::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    pub fn add_source(&self, source: Arc<dyn Source>, key: usize) {
        self.sources.lock().push((source, key));
    }

    fn submit(self: &Arc<Self>, lifo: bool, requeued: bool) {
        let this = self.clone();
        let submitted = if lifo {
            self.thread_type.execute_next(move || this.deliver(requeued))
        } else {
            self.thread_type.execute(move || this.deliver(requeued))
        };

        if let Err(err) = submitted {
            warn!("Subscription `{}` dropped its pending value: {}", self.name, err);
            let dropped = mem::replace(&mut *self.slot.lock(), FireSlot::NotQueued);
            drop(dropped);
        }
    }

    /// Deliver the pending value, then resubmit if a newer one arrived in the
    /// meantime: to the head of the queue the first time, to the tail after.
    fn deliver(self: Arc<Self>, requeued: bool) {
        let pending = {
            let slot = self.slot.lock();
            match *slot {
                FireSlot::Pending { ref value, seq } => Some((value.clone(), seq)),
                FireSlot::NotQueued => None,
            }
        };

        let (value, seq) = match pending {
            Some(pending) => pending,
            None => return,
        };

        if self.is_active() {
            match crate::protect(|| (self.on_fire)(value)) {
                Ok(out) => self.publish(out),
                Err(err) => error!("Subscription `{}` failed on `{}`: {}", self.name, self.thread_type.name(), err),
            }
        }

        let delivered = {
            let mut slot = self.slot.lock();
            let current = match *slot {
                FireSlot::Pending { seq: current, .. } => current == seq,
                FireSlot::NotQueued => true,
            };

            if current || !self.is_active() {
                Some(mem::replace(&mut *slot, FireSlot::NotQueued))
            } else {
                None
            }
        };

        match delivered {
            Some(delivered) => drop(delivered),
            None => self.submit(!requeued, true),
        }
    }

    fn publish(&self, out: O) {
        let previous = {
            let mut latest = self.latest.lock();
            self.targets.fire(&out);
            mem::replace(&mut *latest, Some(out))
        };
        drop(previous);
    }
}

impl<I: Value, O: Value> Target<I> for Relay<I, O> {
    fn fire(self: Arc<Self>, value: I) {
        if !self.is_active() {
            return;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let previous = mem::replace(&mut *self.slot.lock(), FireSlot::Pending { value: value, seq: seq });

        match previous {
            FireSlot::NotQueued => self.submit(false, false),
            // Coalesced into the delivery already queued
            FireSlot::Pending { .. } => {}
        }
    }

    fn detach(&self, source_id: usize) {
        let orphaned = {
            let mut sources = self.sources.lock();
            sources.retain(|&(ref source, _)| source.id() != source_id);
            sources.is_empty()
        };

        if orphaned {
            debug!("Subscription `{}` lost its last source", self.name);
            self.stop();
        }
    }
}

impl<I: Value, O: Value> Source for Relay<I, O> {
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
        self.active.load(Ordering::Acquire)
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
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let sources = mem::replace(&mut *self.sources.lock(), Vec::new());
        for (source, key) in sources {
            source.remove_target(key);
        }
        self.unsubscribe_all();

        let pending = mem::replace(&mut *self.slot.lock(), FireSlot::NotQueued);
        let latest = self.latest.lock().take();
        drop((pending, latest));
    }
}

impl<I: Value, O: Value> Flow<O> for Relay<I, O> {
    fn add_target(&self, target: Arc<dyn Target<O>>) -> usize {
        let latest = self.latest.lock();
        let key = self.targets.add(target.clone());
        if let Some(ref value) = *latest {
            target.fire(value.clone());
        }
        key
    }

    fn latest(&self) -> Option<O> {
        self.latest.lock().clone()
    }

    fn as_source(self: Arc<Self>) -> Arc<dyn Source> {
        self
    }
}

/// A live subscriber, and a source for further subscribers.
///
/// Dropping the handle keeps the subscription running; call `unsubscribe`
/// or hold a `guard()` to end it.
pub struct Subscription<T> {
    flow: Arc<dyn Flow<T>>,
}

impl<T: Value> Subscription<T> {
    pub(crate) fn from_flow(flow: Arc<dyn Flow<T>>) -> Subscription<T> {
        Subscription { flow: flow }
    }

    /// Run `action` with every value this subscription produces
    pub fn subscribe<F>(&self, action: F) -> Subscription<()>
        where F: Fn(T) + Send + Sync + 'static
    {
        let thread_type = self.flow.thread_type().clone();
        self.subscribe_on(&thread_type, action)
    }

    pub fn subscribe_on<F>(&self, thread_type: &ThreadType, action: F) -> Subscription<()>
        where F: Fn(T) + Send + Sync + 'static
    {
        let name = format!("{}.subscribe", self.flow.name());
        super::relay(self.flow.clone(), thread_type, name, action)
    }

    /// A subscription producing `f` of every value
    pub fn map<U, F>(&self, f: F) -> Subscription<U>
        where U: Value,
              F: Fn(T) -> U + Send + Sync + 'static
    {
        let thread_type = self.flow.thread_type().clone();
        let name = format!("{}.map", self.flow.name());
        super::relay(self.flow.clone(), &thread_type, name, f)
    }

    /// Stop receiving values. Subscribers of this subscription are dropped
    /// as well. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        self.flow.stop()
    }

    /// Drop every subscriber of this subscription, keep receiving
    pub fn unsubscribe_all(&self) {
        self.flow.unsubscribe_all()
    }

    /// Unsubscribe when the returned guard is dropped
    pub fn guard(&self) -> SubscriptionGuard {
        SubscriptionGuard { source: self.flow.clone().as_source() }
    }

    pub fn is_subscribed(&self) -> bool {
        self.flow.is_active()
    }

    /// The last value produced, if any
    pub fn latest(&self) -> Option<T> {
        self.flow.latest()
    }

    pub fn subscriber_count(&self) -> usize {
        self.flow.target_count()
    }

    pub fn name(&self) -> &str {
        self.flow.name()
    }

    pub fn thread_type(&self) -> &ThreadType {
        self.flow.thread_type()
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Subscription<T> {
        Subscription { flow: self.flow.clone() }
    }
}

impl<T: Value> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Subscription({}, subscribed: {})", self.name(), self.is_subscribed())
    }
}

/// Ends a subscription when dropped
#[must_use = "the subscription ends as soon as the guard is dropped"]
pub struct SubscriptionGuard {
    source: Arc<dyn Source>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.source.stop();
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SubscriptionGuard({})", self.source.name())
    }
}

#[cfg(test)]
mod test {
    use std::sync::{mpsc, Mutex};
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
    fn test_relay_coalesces_while_busy() {
        let tt = thread_type("relay-burst");
        let (tx, rx) = mpsc::channel();

        let tx = Mutex::new(tx);
        let relay = Arc::new(Relay::new(&tt, "burst".to_owned(), move |n: u32| tx.lock().unwrap().send(n).unwrap()));

        // Hold the only worker so every fire lands in the same slot
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        tt.execute(move || {
            let _ = hold_rx.recv();
        }).unwrap();

        for n in 0..100 {
            relay.clone().fire(n);
        }
        hold_tx.send(()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 99);
        stop(&tt);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tt = thread_type("relay-stop");

        let relay = Arc::new(Relay::new(&tt, "stop".to_owned(), |n: u32| n));
        assert!(relay.is_active());
        relay.stop();
        relay.stop();
        assert!(!relay.is_active());

        relay.clone().fire(1);
        stop(&tt);
        assert_eq!(relay.latest(), None);
    }
}
