// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::Arc;
use std::time::Duration;

use crate::sync::{MonoBarrier, MonoBarrierError};
use crate::thread_type::ThreadType;
use super::next_id;
use super::super::{CancelReason, ChainError, Node, Progress};

/// Downchain leaf that wakes a blocked caller whenever its upchain finishes,
/// however it finishes.
pub(crate) struct Waiter {
    id: usize,
    thread_type: ThreadType,
    barrier: MonoBarrier,
}

impl Waiter {
    pub fn new(thread_type: &ThreadType) -> Waiter {
        Waiter {
            id: next_id(),
            thread_type: thread_type.clone(),
            barrier: MonoBarrier::new(),
        }
    }

    pub fn wait(&self) -> Result<(), MonoBarrierError> {
        self.barrier.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, MonoBarrierError> {
        self.barrier.wait_timeout(timeout)
    }
}

impl Node for Waiter {
    fn id(&self) -> usize {
        self.id
    }

    fn thread_type(&self) -> &ThreadType {
        &self.thread_type
    }

    fn progress(&self) -> Progress {
        Progress::Pending
    }

    fn upchain(&self) -> Option<Arc<dyn Node>> {
        None
    }

    fn fork(self: Arc<Self>) {
        self.barrier.notify();
    }

    fn cancel(&self, _reason: &CancelReason) -> bool {
        self.barrier.notify();
        false
    }

    fn on_upstream_error(&self, _error: &ChainError) {
        self.barrier.notify();
    }

    // The caller gets the error back from `wait`
    fn handles_errors(&self) -> bool {
        true
    }
}
