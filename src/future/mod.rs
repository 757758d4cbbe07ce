// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Run-once continuation chains
//!
//! Every node of a chain holds one state slot (see `State`), at most one
//! upchain node and any number of downchain nodes. Forking a node forks its
//! earliest unfinished ancestor; from there each node that finishes hands its
//! result on to its downchain:
//!
//! * done: every downchain node is forked,
//! * cancelled: every downchain node is cancelled with the same reason,
//! * error: every downchain node is told about the error. Plain nodes turn it
//!   into a derived cancellation, error handlers decide whether to consume it.
//!
//! Most parts of this module name their type parameters after the data flow:
//! `I` is the value a node receives from its upchain, `O` the value it
//! produces, `T` a value passed through unchanged.

mod compound;
mod cores;
mod future;
mod settable;
mod state;

pub use self::compound::{CompoundAltFuture, CompoundError};
pub use self::future::{AltFuture, Dependency};
pub use self::settable::SettableAltFuture;
pub use self::state::{CancelReason, ChainError, State};

use std::sync::Arc;

use crate::thread_type::ThreadType;
use self::cores::Lineage;

/// Anything that can travel down a chain or through a reactive cell.
///
/// Values are cloned once per downstream consumer.
pub trait Value: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Value for T {}

/// Value-free snapshot of a node's state
#[derive(Clone, Debug)]
pub(crate) enum Progress {
    Pending,
    Forked,
    Done,
    Cancelled(CancelReason),
    Failed(ChainError),
}

impl Progress {
    pub fn is_terminal(&self) -> bool {
        match *self {
            Progress::Pending | Progress::Forked => false,
            _ => true,
        }
    }
}

/// A chain node as seen by its neighbours, whatever it computes.
pub(crate) trait Node: Send + Sync {
    fn id(&self) -> usize;

    fn thread_type(&self) -> &ThreadType;

    fn progress(&self) -> Progress;

    fn upchain(&self) -> Option<Arc<dyn Node>>;

    /// Lineage of the node this one was linked below. Unlike `upchain` it
    /// survives burn-down.
    fn ancestry(&self) -> Option<Arc<Lineage>> {
        None
    }

    /// Give up the upchain reference, if any
    fn take_upchain(&self) -> Option<Arc<dyn Node>> {
        None
    }

    /// Fork the earliest unfinished ancestor, or submit this node if its
    /// prerequisites are done. Duplicate forks are harmless.
    fn fork(self: Arc<Self>);

    /// Returns `true` if this call moved the node to `Cancelled`.
    fn cancel(&self, reason: &CancelReason) -> bool;

    /// The upchain finished with a value.
    fn on_upstream_done(self: Arc<Self>) {
        self.fork()
    }

    /// The upchain (or an awaited node) was cancelled.
    fn on_cancelled(&self, reason: &CancelReason) {
        self.cancel(reason);
    }

    /// The upchain (or an awaited node) failed.
    fn on_upstream_error(&self, error: &ChainError);

    /// Whether this node decides what happens to an upstream error, used to
    /// tell caught errors from uncaught ones.
    fn handles_errors(&self) -> bool {
        false
    }
}

/// A node producing values of type `T`.
pub(crate) trait Chain<T>: Node {
    fn state(&self) -> State<T>;

    /// `Some` only once the node is `Done`
    fn value(&self) -> Option<T>;

    /// Register a downchain node. It is forked right away if this node is
    /// already terminal.
    fn attach(&self, node: Arc<dyn Node>);

    fn as_node(self: Arc<Self>) -> Arc<dyn Node>;
}
