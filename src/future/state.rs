// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Node state, cancellation reasons and chain errors

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// The single slot of an `AltFuture`: progress marker and result in one.
///
/// Moves strictly forward: `Pending → Forked → {Done | Cancelled | Error}`,
/// or straight from `Pending` to `Cancelled`/`Error`.
#[derive(Clone)]
pub enum State<T> {
    Pending,
    Forked,
    Done(T),
    Cancelled(CancelReason),
    Error(ChainError),
}

impl<T> State<T> {
    pub fn is_terminal(&self) -> bool {
        match *self {
            State::Pending | State::Forked => false,
            State::Done(..) | State::Cancelled(..) | State::Error(..) => true,
        }
    }

    pub fn is_done(&self) -> bool {
        self.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        match *self {
            State::Cancelled(..) => true,
            _ => false,
        }
    }

    /// The terminal state for a failed action. Cancellation-flavoured errors
    /// become `Cancelled`.
    pub fn failed(error: ChainError) -> State<T> {
        match error {
            ChainError::Cancelled(reason) => State::Cancelled(reason),
            error => State::Error(error),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match *self {
            State::Pending => "pending",
            State::Forked => "forked",
            State::Done(..) => "done",
            State::Cancelled(..) => "cancelled",
            State::Error(..) => "error",
        }
    }
}

impl<T> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            State::Cancelled(ref reason) => write!(f, "Cancelled({:?})", reason.message()),
            State::Error(ref error) => write!(f, "Error({})", error),
            ref other => write!(f, "{}", other.name()),
        }
    }
}

/// Why a node was cancelled
#[derive(Clone)]
pub struct CancelReason {
    message: Arc<str>,
    cause: Option<Arc<ChainError>>,
}

impl CancelReason {
    pub fn new<S: AsRef<str>>(message: S) -> CancelReason {
        CancelReason {
            message: Arc::from(message.as_ref()),
            cause: None,
        }
    }

    /// A reason that remembers the error it was derived from
    pub fn caused_by<S: AsRef<str>>(message: S, cause: &ChainError) -> CancelReason {
        CancelReason {
            message: Arc::from(message.as_ref()),
            cause: Some(Arc::new(cause.clone())),
        }
    }

    /// The derived reason a plain node gets when its upchain failed
    pub(crate) fn upstream_error(cause: &ChainError) -> CancelReason {
        CancelReason::caused_by(format!("upstream error: {}", cause), cause)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ChainError> {
        self.cause.as_ref().map(|cause| &**cause)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
            Some(ref cause) => write!(f, "CancelReason({:?}, cause: {})", self.message(), cause),
            None => write!(f, "CancelReason({:?})", self.message()),
        }
    }
}

impl<'a> From<&'a str> for CancelReason {
    fn from(message: &'a str) -> CancelReason {
        CancelReason::new(message)
    }
}

impl From<String> for CancelReason {
    fn from(message: String) -> CancelReason {
        CancelReason::new(message)
    }
}

/// A failure carried down a chain.
///
/// Cheap to clone; every downstream node that observes the failure shares it.
#[derive(Clone)]
pub enum ChainError {
    /// The action returned an error
    Failed(Arc<dyn Error + Send + Sync + 'static>),
    /// The action panicked
    Panicked(Arc<str>),
    /// The action asked for its node to be cancelled rather than failed
    Cancelled(CancelReason),
}

impl ChainError {
    /// Wrap any error. A boxed `ChainError` is unwrapped, not nested.
    pub fn new<E>(error: E) -> ChainError
        where E: Into<Box<dyn Error + Send + Sync>>
    {
        let boxed: Box<dyn Error + Send + Sync> = error.into();
        match boxed.downcast::<ChainError>() {
            Ok(chain_error) => *chain_error,
            Err(other) => ChainError::Failed(Arc::from(other)),
        }
    }

    /// An error that turns its node `Cancelled` instead of `Error`
    pub fn cancelled<R: Into<CancelReason>>(reason: R) -> ChainError {
        ChainError::Cancelled(reason.into())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> ChainError {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<Any>".to_owned()
        };

        ChainError::Panicked(Arc::from(message.as_str()))
    }

    pub fn is_cancellation(&self) -> bool {
        match *self {
            ChainError::Cancelled(..) => true,
            _ => false,
        }
    }

    pub fn is_panic(&self) -> bool {
        match *self {
            ChainError::Panicked(..) => true,
            _ => false,
        }
    }

    /// The underlying error, if it is of type `E`
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        match *self {
            ChainError::Failed(ref inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ChainError::Failed(ref inner) => write!(f, "{}", inner),
            ChainError::Panicked(ref message) => write!(f, "panicked: {}", message),
            ChainError::Cancelled(ref reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

impl fmt::Debug for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ChainError::Failed(ref inner) => write!(f, "ChainError::Failed({:?})", inner),
            ChainError::Panicked(ref message) => write!(f, "ChainError::Panicked({:?})", message),
            ChainError::Cancelled(ref reason) => write!(f, "ChainError::Cancelled({:?})", reason),
        }
    }
}

impl Error for ChainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            ChainError::Failed(ref inner) => Some(&**inner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;

    #[test]
    fn test_chain_error_unwraps_itself() {
        let original = ChainError::cancelled("stop");
        let wrapped = ChainError::new(original);
        assert!(wrapped.is_cancellation());

        let io = ChainError::new(io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(io.to_string(), "disk");
        assert!(io.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn test_failed_state_for_cancellation() {
        match State::<()>::failed(ChainError::cancelled("filtered")) {
            State::Cancelled(reason) => assert_eq!(reason.message(), "filtered"),
            other => panic!("unexpected {:?}", other),
        }

        assert!(!State::<()>::failed(ChainError::new("x")).is_cancelled());
    }

    #[test]
    fn test_upstream_error_reason_keeps_cause() {
        let error = ChainError::new("x");
        let reason = CancelReason::upstream_error(&error);

        assert_eq!(reason.message(), "upstream error: x");
        assert_eq!(reason.cause().map(|e| e.to_string()), Some("x".to_owned()));
    }
}
