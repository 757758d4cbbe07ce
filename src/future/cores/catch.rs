// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::sync::Spinlock;
use super::super::{CancelReason, ChainError};

type ErrorHandler = Box<dyn FnOnce(&ChainError) -> bool + Send + 'static>;
type CancelHandler = Box<dyn FnOnce(&CancelReason) + Send + 'static>;

/// What an error handler decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handled {
    /// The node has no error handler
    NoHandler,
    /// Another thread already took the handler
    InProgress,
    /// The handler returned `true`
    Consumed,
    /// The handler returned `false` or panicked
    Rethrow,
}

/// Optional error and cancellation handlers of a link. Each runs at most once.
pub(crate) struct Handlers {
    on_error: Spinlock<Option<ErrorHandler>>,
    on_cancelled: Spinlock<Option<CancelHandler>>,
    handles_errors: bool,
}

impl Handlers {
    pub fn none() -> Handlers {
        Handlers {
            on_error: Spinlock::new(None),
            on_cancelled: Spinlock::new(None),
            handles_errors: false,
        }
    }

    pub fn on_error<F>(handler: F) -> Handlers
        where F: FnOnce(&ChainError) -> bool + Send + 'static
    {
        Handlers {
            on_error: Spinlock::new(Some(Box::new(handler))),
            on_cancelled: Spinlock::new(None),
            handles_errors: true,
        }
    }

    pub fn on_cancelled<F>(handler: F) -> Handlers
        where F: FnOnce(&CancelReason) + Send + 'static
    {
        Handlers {
            on_error: Spinlock::new(None),
            on_cancelled: Spinlock::new(Some(Box::new(handler))),
            handles_errors: false,
        }
    }

    #[inline]
    pub fn handles_errors(&self) -> bool {
        self.handles_errors
    }

    pub fn error(&self, id: usize, error: &ChainError) -> Handled {
        if !self.handles_errors {
            return Handled::NoHandler;
        }

        let handler = self.on_error.lock().take();
        let handler = match handler {
            Some(handler) => handler,
            None => return Handled::InProgress,
        };

        match crate::protect(move || handler(error)) {
            Ok(true) => Handled::Consumed,
            Ok(false) => Handled::Rethrow,
            Err(err) => {
                error!("Error handler of AltFuture#{} failed: {}", id, err);
                Handled::Rethrow
            }
        }
    }

    pub fn cancelled(&self, id: usize, reason: &CancelReason) {
        let handler = self.on_cancelled.lock().take();
        if let Some(handler) = handler {
            if let Err(err) = crate::protect(move || handler(reason)) {
                error!("Cancellation handler of AltFuture#{} failed: {}", id, err);
            }
        }
    }

    /// Drop handlers that never ran
    pub fn clear(&self) {
        let on_error = self.on_error.lock().take();
        let on_cancelled = self.on_cancelled.lock().take();
        drop(on_error);
        drop(on_cancelled);
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_error_handler_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handlers = Handlers::on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let error = ChainError::new("x");
        assert_eq!(handlers.error(1, &error), Handled::Consumed);
        assert_eq!(handlers.error(1, &error), Handled::InProgress);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_rethrows() {
        let handlers = Handlers::on_error(|_| panic!("handler broke"));
        assert_eq!(handlers.error(2, &ChainError::new("x")), Handled::Rethrow);

        assert_eq!(Handlers::none().error(3, &ChainError::new("x")), Handled::NoHandler);
    }
}
