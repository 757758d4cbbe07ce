// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! Non-blocking continuation chains over named thread pools
//!
//! Work is expressed as chains of `AltFuture` nodes. Each node runs its
//! action once, on the thread type it was created for, after the node above
//! it is done, and hands its value, error or cancellation down the chain.
//! Nothing in a chain ever blocks a pool thread; `AltFuture::wait` is the
//! one blocking adapter, for threads outside the pools.
//!
//! `ReactiveValue` cells complement the one-shot chains with values that
//! change over time. Subscribers get every change, coalesced while they are
//! busy.
//!
//! ```
//! use altfuture::Scheduler;
//!
//! let scheduler = Scheduler::builder().with_workers(2).build().unwrap();
//!
//! let length = scheduler.file()
//!     .then(|| "contents".to_owned())
//!     .then_on(scheduler.worker(), |text| text.len())
//!     .on_error(|err| {
//!         eprintln!("read failed: {}", err);
//!         true
//!     });
//!
//! assert_eq!(length.wait().unwrap(), 8);
//! ```

#[macro_use]
extern crate log;
extern crate linked_hash_map;
extern crate num_cpus;
extern crate slab;

use std::panic::{self, AssertUnwindSafe};

pub use crate::future::{AltFuture, CancelReason, ChainError, CompoundAltFuture, CompoundError, Dependency,
                        SettableAltFuture, State, Value};
pub use crate::options::{Config, QueueKind, ThreadTypeOptions};
pub use crate::reactive::{ReactiveValue, Subscription, SubscriptionGuard};
pub use crate::runtime::Timer;
pub use crate::scheduler::{Scheduler, SchedulerBuilder};
pub use crate::thread_type::{SubmitError, Task, TaskId, ThreadType};

pub mod future;
pub mod options;
pub mod reactive;
pub mod scheduler;
pub mod sync;
pub mod thread_type;
mod runtime;

/// Run `f`, turning a panic into a `ChainError`
pub(crate) fn protect<R, F: FnOnce() -> R>(f: F) -> Result<R, ChainError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(ChainError::from_panic)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_protect() {
        assert_eq!(protect(|| 1).unwrap(), 1);

        let err = protect(|| -> u8 { panic!("inside") }).unwrap_err();
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "panicked: inside");
    }
}
