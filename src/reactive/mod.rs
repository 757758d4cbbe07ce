// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Reactive cells with coalescing subscribers
//!
//! A `ReactiveValue` fires every change to its subscribers. Each subscriber
//! runs at most one delivery at a time on its thread type; values arriving
//! while a delivery is in flight replace each other, so a burst may skip
//! intermediate values but always ends with the latest one.
//!
//! Sources keep their subscribers alive and subscribers keep their sources
//! alive. The graph is torn down explicitly, through `unsubscribe`,
//! `unsubscribe_all` or a `SubscriptionGuard`.

mod subscription;
mod value;

pub use self::subscription::{Subscription, SubscriptionGuard};
pub use self::value::ReactiveValue;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use slab::Slab;

use crate::future::Value;
use crate::sync::Spinlock;
use crate::thread_type::ThreadType;

static NEXT_REACTIVE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_id() -> usize {
    NEXT_REACTIVE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Receiving end of a subscription edge
pub(crate) trait Target<T>: Send + Sync {
    fn fire(self: Arc<Self>, value: T);

    /// The source with `source_id` dropped this target
    fn detach(&self, source_id: usize);
}

/// Sending end of a subscription edge, whatever it sends
pub(crate) trait Source: Send + Sync {
    fn id(&self) -> usize;

    fn name(&self) -> &str;

    fn thread_type(&self) -> &ThreadType;

    fn is_active(&self) -> bool;

    fn remove_target(&self, key: usize) -> bool;

    fn target_count(&self) -> usize;

    /// Drop every target
    fn unsubscribe_all(&self);

    /// Leave the graph: detach from sources and drop every target
    fn stop(&self);
}

/// A source of `T` values that can take new targets
pub(crate) trait Flow<T>: Source {
    /// Register `target` and send it the current value, if there is one.
    /// Returns the key to remove it with.
    fn add_target(&self, target: Arc<dyn Target<T>>) -> usize;

    fn latest(&self) -> Option<T>;

    fn as_source(self: Arc<Self>) -> Arc<dyn Source>;
}

/// The subscribers of a source
pub(crate) struct Targets<T> {
    slab: Spinlock<Slab<Arc<dyn Target<T>>>>,
}

impl<T: Value> Targets<T> {
    pub fn new() -> Targets<T> {
        Targets { slab: Spinlock::new(Slab::new()) }
    }

    pub fn add(&self, target: Arc<dyn Target<T>>) -> usize {
        self.slab.lock().insert(target)
    }

    pub fn remove(&self, key: usize) -> Option<Arc<dyn Target<T>>> {
        let mut slab = self.slab.lock();
        if slab.contains(key) {
            Some(slab.remove(key))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.slab.lock().len()
    }

    pub fn drain(&self) -> Vec<Arc<dyn Target<T>>> {
        self.slab.lock().drain().collect()
    }

    pub fn fire(&self, value: &T) {
        let targets: Vec<_> = self.slab.lock().iter().map(|(_, target)| target.clone()).collect();
        for target in targets {
            target.fire(value.clone());
        }
    }
}

/// Wire a new relay below `source`
pub(crate) fn relay<T, O, F>(source: Arc<dyn Flow<T>>,
                             thread_type: &ThreadType,
                             name: String,
                             on_fire: F)
                             -> Subscription<O>
    where T: Value,
          O: Value,
          F: Fn(T) -> O + Send + Sync + 'static
{
    let relay = Arc::new(subscription::Relay::new(thread_type, name, on_fire));
    let key = source.add_target(relay.clone());
    relay.add_source(source.as_source(), key);

    let flow: Arc<dyn Flow<O>> = relay;
    Subscription::from_flow(flow)
}
