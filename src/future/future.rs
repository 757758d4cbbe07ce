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
use std::time::{Duration, Instant};

use crate::thread_type::ThreadType;
use super::cores::{Handlers, Link, Waiter};
use super::{CancelReason, Chain, ChainError, Node, Progress, State, Value};

/// A handle to one node of a chain.
///
/// Cloning the handle does not clone the node. Every combinator returns the
/// handle of a new downstream node; the node is started by the first `fork`
/// anywhere below it, or right away if the node it hangs off is already done.
///
/// ```
/// # use altfuture::Scheduler;
/// let scheduler = Scheduler::builder().build().unwrap();
///
/// let abc = scheduler.worker()
///     .from("a".to_owned())
///     .then(|s| s + "b")
///     .then(|s| s + "c")
///     .fork();
///
/// assert_eq!(abc.wait().unwrap(), "abc");
/// ```
pub struct AltFuture<T> {
    chain: Arc<dyn Chain<T>>,
}

impl<T: Value> AltFuture<T> {
    pub(crate) fn from_chain(chain: Arc<dyn Chain<T>>) -> AltFuture<T> {
        AltFuture { chain: chain }
    }

    /// A head running `action` on `thread_type` once forked
    pub(crate) fn head<F>(thread_type: &ThreadType, action: F) -> AltFuture<T>
        where F: FnOnce(()) -> Result<T, ChainError> + Send + 'static
    {
        AltFuture::from_chain(Arc::new(Link::new(thread_type, action).with_seed(())))
    }

    /// Hang `link` below this node
    fn link<U: Value>(&self, link: Link<T, U>) -> AltFuture<U> {
        let link = Arc::new(link);
        link.set_upchain(self.chain.clone());
        self.chain.attach(link.clone());
        AltFuture::from_chain(link)
    }

    fn pass_through(&self, thread_type: &ThreadType) -> Link<T, T> {
        Link::new(thread_type, |value| Ok(value))
    }

    /// Start the chain: the earliest unfinished ancestor is submitted and the
    /// rest follows as nodes finish. Forking more than once is harmless.
    pub fn fork(&self) -> AltFuture<T> {
        self.chain.clone().fork();
        self.clone()
    }

    /// Run `action` on this node's thread type with its value
    pub fn then<U, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              F: FnOnce(T) -> U + Send + 'static
    {
        self.then_on(self.thread_type(), action)
    }

    /// Run `action` on `thread_type` with this node's value
    pub fn then_on<U, F>(&self, thread_type: &ThreadType, action: F) -> AltFuture<U>
        where U: Value,
              F: FnOnce(T) -> U + Send + 'static
    {
        self.link(Link::new(thread_type, move |value| Ok(action(value))))
    }

    /// Like `then`, with an action that may fail. An `Err` puts the new node
    /// into the error state; `ChainError::cancelled` cancels it instead.
    pub fn try_then<U, E, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              E: Into<Box<dyn Error + Send + Sync>>,
              F: FnOnce(T) -> Result<U, E> + Send + 'static
    {
        self.link(Link::new(self.thread_type(), move |value| action(value).map_err(ChainError::new)))
    }

    /// Pass the value through once this node and every node in `others`
    /// are done. Any of them failing or being cancelled ends the join too.
    pub fn await_all<I>(&self, others: I) -> AltFuture<T>
        where I: IntoIterator,
              I::Item: Into<Dependency>
    {
        let join = Arc::new(self.pass_through(self.thread_type()));
        join.set_upchain(self.chain.clone());

        let others: Vec<Dependency> = others.into_iter().map(Into::into).collect();
        for other in others.iter() {
            join.add_await(other.node.clone());
        }

        for other in others {
            (other.attach)(join.clone());
        }
        self.chain.attach(join.clone());

        AltFuture::from_chain(join)
    }

    /// Pass the value through if `predicate` accepts it, cancel otherwise
    pub fn filter<P>(&self, predicate: P) -> AltFuture<T>
        where T: fmt::Debug,
              P: FnOnce(&T) -> bool + Send + 'static
    {
        self.link(Link::new(self.thread_type(), move |value| {
            if predicate(&value) {
                Ok(value)
            } else {
                Err(ChainError::cancelled(format!("filtered: {:?}", value)))
            }
        }))
    }

    /// Continue on `thread_type`. No new node is added if this node already
    /// runs there.
    pub fn on(&self, thread_type: &ThreadType) -> AltFuture<T> {
        if self.thread_type() == thread_type {
            self.clone()
        } else {
            self.link(self.pass_through(thread_type))
        }
    }

    /// Pass the value through `duration` later. The wait happens on the timer
    /// thread, no worker is held.
    pub fn sleep(&self, duration: Duration) -> AltFuture<T> {
        self.link(self.pass_through(self.thread_type()).with_delay(duration))
    }

    /// Decide what happens to an upstream error.
    ///
    /// `handler` returns `true` to consume the error: this node and
    /// everything below it is cancelled. `false` lets the error continue
    /// down as if there were no handler. Values pass through untouched.
    pub fn on_error<F>(&self, handler: F) -> AltFuture<T>
        where F: FnOnce(&ChainError) -> bool + Send + 'static
    {
        self.link(self.pass_through(self.thread_type()).with_handlers(Handlers::on_error(handler)))
    }

    /// Run `handler` if this chain is cancelled here. Values pass through.
    pub fn on_cancelled<F>(&self, handler: F) -> AltFuture<T>
        where F: FnOnce(&CancelReason) + Send + 'static
    {
        self.link(self.pass_through(self.thread_type()).with_handlers(Handlers::on_cancelled(handler)))
    }

    /// Cancel this node and everything below it.
    ///
    /// Returns `true` if this call did it, `false` if the node was already
    /// finished.
    pub fn cancel<R: Into<CancelReason>>(&self, reason: R) -> bool {
        self.chain.cancel(&reason.into())
    }

    pub fn is_done(&self) -> bool {
        self.progress().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        match self.progress() {
            Progress::Cancelled(..) => true,
            _ => false,
        }
    }

    /// Whether the node left `Pending`
    pub fn is_forked(&self) -> bool {
        match self.progress() {
            Progress::Pending => false,
            _ => true,
        }
    }

    /// Whether the node still holds on to its upchain. Finished nodes let go.
    pub fn has_upchain(&self) -> bool {
        self.chain.upchain().is_some()
    }

    /// The value.
    ///
    /// # Panics
    ///
    /// If the node is not done, or was cancelled or failed.
    pub fn get(&self) -> T {
        match self.chain.state() {
            State::Done(value) => value,
            other => panic!("get() on AltFuture#{} while {:?}", self.id(), other),
        }
    }

    /// The value if the node is done
    pub fn try_get(&self) -> Option<T> {
        self.chain.value()
    }

    /// Snapshot of the node's state
    pub fn outcome(&self) -> State<T> {
        self.chain.state()
    }

    /// Fork the chain and block until this node is finished.
    ///
    /// # Panics
    ///
    /// When called from a thread type worker or a timer thread, which must
    /// never block on a chain.
    pub fn wait(&self) -> Result<T, ChainError> {
        assert!(!ThreadType::is_pool_thread(),
                "wait() on AltFuture#{} from a pool thread",
                self.id());

        let waiter = Arc::new(Waiter::new(self.thread_type()));
        self.chain.attach(waiter.clone());
        self.fork();

        while !self.is_done() {
            if let Err(err) = waiter.wait() {
                panic!("wait() on AltFuture#{} failed: {}", self.id(), err);
            }
        }
        self.result()
    }

    /// Like `wait`, giving up after `timeout`. `None` if the node is still
    /// running by then.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, ChainError>> {
        assert!(!ThreadType::is_pool_thread(),
                "wait_timeout() on AltFuture#{} from a pool thread",
                self.id());

        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => return Some(self.wait()),
        };
        let waiter = Arc::new(Waiter::new(self.thread_type()));
        self.chain.attach(waiter.clone());
        self.fork();

        while !self.is_done() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            match waiter.wait_timeout(deadline - now) {
                Ok(_) => {}
                Err(err) => panic!("wait_timeout() on AltFuture#{} failed: {}", self.id(), err),
            }
        }
        Some(self.result())
    }

    fn result(&self) -> Result<T, ChainError> {
        match self.chain.state() {
            State::Done(value) => Ok(value),
            State::Cancelled(reason) => Err(ChainError::Cancelled(reason)),
            State::Error(err) => Err(err),
            other => panic!("AltFuture#{} is not finished: {:?}", self.id(), other),
        }
    }

    pub fn thread_type(&self) -> &ThreadType {
        self.chain.thread_type()
    }

    /// Process-wide unique id of the node
    pub fn id(&self) -> usize {
        self.chain.id()
    }

    pub fn name(&self) -> String {
        format!("AltFuture#{}@{}", self.id(), self.thread_type().name())
    }

    /// This node as a prerequisite of an `await_all`
    pub fn dependency(&self) -> Dependency {
        Dependency::from(self)
    }

    fn progress(&self) -> Progress {
        self.chain.progress()
    }

    pub(crate) fn node(&self) -> Arc<dyn Node> {
        self.chain.clone().as_node()
    }
}

impl<T: Value> AltFuture<Vec<T>> {
    /// Map every element of the list
    pub fn map<U, F>(&self, f: F) -> AltFuture<Vec<U>>
        where U: Value,
              F: Fn(T) -> U + Send + 'static
    {
        self.then(move |values| values.into_iter().map(f).collect())
    }
}

impl<T> Clone for AltFuture<T> {
    fn clone(&self) -> AltFuture<T> {
        AltFuture { chain: self.chain.clone() }
    }
}

impl<T: Value> fmt::Debug for AltFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AltFuture#{}({:?})", self.id(), self.progress())
    }
}

/// A node of any value type that an `await_all` waits for
pub struct Dependency {
    node: Arc<dyn Node>,
    attach: Box<dyn FnOnce(Arc<dyn Node>) + Send + 'static>,
}

impl<'a, T: Value> From<&'a AltFuture<T>> for Dependency {
    fn from(future: &'a AltFuture<T>) -> Dependency {
        let chain = future.chain.clone();
        Dependency {
            node: future.node(),
            attach: Box::new(move |node| chain.attach(node)),
        }
    }
}

impl<T: Value> From<AltFuture<T>> for Dependency {
    fn from(future: AltFuture<T>) -> Dependency {
        Dependency::from(&future)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dependency(AltFuture#{})", self.node.id())
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use crate::options::ThreadTypeOptions;
    use super::*;

    fn thread_type(name: &str, workers: usize) -> ThreadType {
        let mut opts = ThreadTypeOptions::new(name);
        opts.workers(workers);
        ThreadType::with_options(opts).unwrap()
    }

    fn stop(tt: &ThreadType) {
        tt.shutdown();
        tt.join();
        tt.timer().shutdown();
    }

    #[test]
    fn test_then_chain() {
        let tt = thread_type("chain", 2);

        let middle = tt.from(2).then(|n| n * 10);
        let tail = middle.then(|n| n + 1).fork();

        assert_eq!(tail.wait().unwrap(), 21);
        assert_eq!(tail.get(), 21);
        assert!(!middle.has_upchain());
        stop(&tt);
    }

    #[test]
    fn test_concurrent_fork_runs_once() {
        let tt = thread_type("fork-race", 4);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let head = tt.then(move || counter.fetch_add(1, Ordering::SeqCst));

        let forks: Vec<_> = (0..8)
            .map(|_| {
                let head = head.clone();
                thread::spawn(move || {
                    head.fork();
                })
            })
            .collect();
        for fork in forks {
            fork.join().unwrap();
        }

        head.wait().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        stop(&tt);
    }

    #[test]
    fn test_error_becomes_cancellation_downstream() {
        let tt = thread_type("error-down", 1);
        let (tx, rx) = mpsc::channel();

        let failed = tt.try_then(|| Err::<u32, _>("x"));
        let next = failed.then(move |n| tx.send(n).unwrap());

        let err = next.wait().unwrap_err();
        assert!(err.is_cancellation());
        assert!(next.is_cancelled());
        match failed.outcome() {
            State::Error(err) => assert_eq!(err.to_string(), "x"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        stop(&tt);
    }

    #[test]
    fn test_consumed_error_stops_at_handler() {
        let tt = thread_type("consume", 1);
        let (tx, rx) = mpsc::channel();

        let errors = tx.clone();
        let tail = tt.try_then(|| Err::<(), _>("x"))
            .on_error(move |err| {
                errors.send(err.to_string()).unwrap();
                true
            })
            .then(move |()| tx.send("unreachable".to_owned()).unwrap());

        assert!(tail.wait().unwrap_err().is_cancellation());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["x".to_owned()]);
        stop(&tt);
    }

    #[test]
    fn test_unconsumed_error_reaches_next_handler() {
        let tt = thread_type("rethrow", 1);
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        let tail = tt.try_then(|| Err::<(), _>("deep"))
            .on_error(move |_| {
                first.send("first").unwrap();
                false
            })
            .on_error(move |_| {
                tx.send("second").unwrap();
                true
            });

        assert!(tail.wait().unwrap_err().is_cancellation());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["first", "second"]);
        stop(&tt);
    }

    #[test]
    fn test_cancel_reaches_downchain() {
        let tt = thread_type("cancel", 1);
        let (tx, rx) = mpsc::channel();

        let head = tt.then(|| 1);
        let tail = head.then(|n| n + 1)
            .on_cancelled(move |reason| tx.send(reason.message().to_owned()).unwrap());

        assert!(head.cancel("user abort"));
        assert!(!head.cancel("user abort"));

        match tail.outcome() {
            State::Cancelled(reason) => assert_eq!(reason.message(), "user abort"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.recv().unwrap(), "user abort");
        stop(&tt);
    }

    #[test]
    fn test_filter_and_map() {
        let tt = thread_type("filter", 2);

        let doubled = tt.from(vec![1, 2, 3]).map(|n| n * 2);
        assert_eq!(doubled.wait().unwrap(), vec![2, 4, 6]);

        let rejected = tt.from(5).filter(|n| *n > 10);
        match rejected.wait() {
            Err(ChainError::Cancelled(reason)) => assert_eq!(reason.message(), "filtered: 5"),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(tt.from(50).filter(|n| *n > 10).wait().unwrap(), 50);
        stop(&tt);
    }

    #[test]
    fn test_await_all_waits_for_every_node() {
        let tt = thread_type("await", 4);
        let (tx, rx) = mpsc::channel::<&'static str>();

        let slow_tx = tx.clone();
        let slow = tt.then(move || {
            thread::sleep(Duration::from_millis(50));
            slow_tx.send("slow").unwrap();
        });
        let fast = tt.then(move || tx.send("fast").unwrap());

        let joined = tt.from(1).await_all(vec![slow.dependency(), fast.dependency()]);
        slow.fork();
        fast.fork();

        assert_eq!(joined.wait().unwrap(), 1);
        let mut seen: Vec<_> = rx.try_iter().collect();
        seen.sort();
        assert_eq!(seen, vec!["fast", "slow"]);
        stop(&tt);
    }

    #[test]
    fn test_await_all_fails_with_prerequisite() {
        let tt = thread_type("await-fail", 2);

        let broken = tt.try_then(|| Err::<(), _>("broken"));
        let joined = tt.from(1).await_all(Some(&broken)).fork();
        broken.fork();

        let err = joined.wait().unwrap_err();
        assert!(err.is_cancellation());
        stop(&tt);
    }

    #[test]
    fn test_on_hops_thread_type() {
        let first = thread_type("hop-from", 1);
        let second = thread_type("hop-to", 1);

        let same = first.from(1);
        assert_eq!(same.on(&first).id(), same.id());

        let name = same.on(&second)
            .then(|_| ThreadType::current().map(|tt| tt.name().to_owned()))
            .wait()
            .unwrap();
        assert_eq!(name, Some("hop-to".to_owned()));

        stop(&first);
        stop(&second);
    }

    #[test]
    fn test_sleep_delays_value() {
        let tt = thread_type("sleep", 1);

        let start = Instant::now();
        let value = tt.from("late").sleep(Duration::from_millis(30)).wait().unwrap();

        assert_eq!(value, "late");
        assert!(start.elapsed() >= Duration::from_millis(30));
        stop(&tt);
    }

    #[test]
    #[should_panic(expected = "get()")]
    fn test_get_before_done_panics() {
        let tt = thread_type("get-early", 1);
        tt.then(|| 1).get();
    }

    #[test]
    fn test_wait_timeout_on_unset_settable() {
        let tt = thread_type("wait-timeout", 1);
        let settable = tt.settable::<u8>();

        assert!(settable.future().wait_timeout(Duration::from_millis(10)).is_none());
        settable.set(3);
        assert_eq!(settable.future().wait_timeout(Duration::from_secs(5)).unwrap().unwrap(), 3);
        stop(&tt);
    }

    #[test]
    fn test_endless_sleep_stays_forked() {
        let tt = thread_type("sleep-forever", 1);

        let sleeping = tt.from(1u8).sleep(Duration::from_secs(u64::max_value()));
        assert!(sleeping.wait_timeout(Duration::from_millis(50)).is_none());
        assert!(sleeping.is_forked());
        assert!(!sleeping.is_done());
        assert_eq!(tt.timer().pending(), 1);

        // The worker that ran the action is still usable
        assert_eq!(tt.from(2u8).then(|n| n + 1).wait().unwrap(), 3);
        stop(&tt);
    }

    #[test]
    fn test_wait_timeout_unbounded() {
        let tt = thread_type("wait-unbounded", 1);
        let settable = tt.settable::<u8>();

        let setter = settable.clone();
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set(9);
        });

        let waited = settable.future().wait_timeout(Duration::from_secs(u64::max_value()));
        assert_eq!(waited.unwrap().unwrap(), 9);
        h.join().unwrap();
        stop(&tt);
    }
}
