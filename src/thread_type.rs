// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Named executor groups
//!
//! A `ThreadType` owns a queue and a fixed number of worker threads. Every
//! `AltFuture` and every reactive delivery runs on one of these.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use crate::future::{AltFuture, ChainError, SettableAltFuture, Value};
use crate::options::{Config, QueueKind, ThreadTypeOptions};
use crate::runtime::{processor, Processor, Timer};

/// Identity of a submitted task, used to reposition it in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

/// A unit of work queued on a thread type
pub struct Task {
    id: TaskId,
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Run the task on the calling thread
    pub fn run(self) {
        (self.run)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Task({})", self.id.0)
    }
}

/// The thread type no longer accepts work. The rejected task is handed back.
pub struct SubmitError {
    thread_type: String,
    task: Task,
}

impl SubmitError {
    pub fn thread_type(&self) -> &str {
        &self.thread_type
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubmitError")
            .field("thread_type", &self.thread_type)
            .field("task", &self.task)
            .finish()
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "thread type `{}` is shut down, {:?} rejected", self.thread_type, self.task)
    }
}

impl Error for SubmitError {}

struct Queue {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    options: ThreadTypeOptions,
    config: Arc<Config>,
    timer: Timer,
    queue: Mutex<Queue>,
    available: Condvar,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    next_task_id: AtomicUsize,
}

/// A named group of worker threads with a declared ordering contract.
///
/// Cloning is cheap; clones share the same queue and workers.
#[derive(Clone)]
pub struct ThreadType {
    shared: Arc<Shared>,
}

impl ThreadType {
    /// Spawn the workers of a new thread type
    pub fn new(options: ThreadTypeOptions, config: Arc<Config>, timer: Timer) -> io::Result<ThreadType> {
        let workers = options.workers;
        assert!(workers >= 1, "Must have at least one worker");

        let thread_type = ThreadType {
            shared: Arc::new(Shared {
                options: options,
                config: config,
                timer: timer,
                queue: Mutex::new(Queue {
                    tasks: VecDeque::new(),
                    shutdown: false,
                }),
                available: Condvar::new(),
                workers: Mutex::new(Vec::with_capacity(workers)),
                next_task_id: AtomicUsize::new(0),
            }),
        };

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            match Processor::spawn(id, thread_type.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    error!("Failed to spawn worker {}#{}: {}", thread_type.name(), id, err);
                    thread_type.shutdown_now();
                    return Err(err);
                }
            }
        }
        *thread_type.workers() = handles;

        debug!("Thread type `{}` started with {} worker(s), {:?} queue",
               thread_type.name(),
               workers,
               thread_type.shared.options.queue);
        Ok(thread_type)
    }

    /// A thread type with its own timer and the default `Config`
    pub fn with_options(options: ThreadTypeOptions) -> io::Result<ThreadType> {
        let config = Arc::new(Config::default());
        let timer = Timer::new(format!("{}-{}-timer", config.thread_name_prefix, options.name))?;
        ThreadType::new(options, config, timer)
    }

    /// The thread type whose worker is running the current thread
    pub fn current() -> Option<ThreadType> {
        processor::current()
    }

    /// Whether the current thread belongs to a thread type or a timer
    pub fn is_pool_thread() -> bool {
        processor::is_pool_thread()
    }

    /// Whether the current thread is one of this thread type's workers
    pub fn is_current(&self) -> bool {
        match ThreadType::current() {
            Some(current) => current == *self,
            None => false,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    pub fn options(&self) -> &ThreadTypeOptions {
        &self.shared.options
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn timer(&self) -> &Timer {
        &self.shared.timer
    }

    pub fn worker_count(&self) -> usize {
        self.shared.options.workers
    }

    pub fn queue_kind(&self) -> QueueKind {
        self.shared.options.queue
    }

    /// True for single-worker thread types: tasks complete in submission order.
    pub fn is_in_order_executor(&self) -> bool {
        self.shared.options.workers == 1
    }

    /// Whether `execute_next` actually jumps the queue on this thread type
    pub fn supports_lifo(&self) -> bool {
        self.shared.options.queue == QueueKind::Deque && !self.is_in_order_executor()
    }

    /// Number of tasks waiting for a worker
    pub fn queued(&self) -> usize {
        self.queue().tasks.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue().shutdown
    }

    /// Wrap `f` into a task with a fresh id, without submitting it
    pub fn task<F>(&self, f: F) -> Task
        where F: FnOnce() + Send + 'static
    {
        Task {
            id: TaskId(self.shared.next_task_id.fetch_add(1, Ordering::Relaxed)),
            run: Box::new(f),
        }
    }

    /// FIFO submission
    pub fn execute<F>(&self, f: F) -> Result<TaskId, SubmitError>
        where F: FnOnce() + Send + 'static
    {
        self.push(self.task(f), false)
    }

    /// LIFO submission when supported, otherwise the same as `execute`
    pub fn execute_next<F>(&self, f: F) -> Result<TaskId, SubmitError>
        where F: FnOnce() + Send + 'static
    {
        self.push(self.task(f), true)
    }

    /// FIFO submission of a prepared task
    pub fn submit(&self, task: Task) -> Result<TaskId, SubmitError> {
        self.push(task, false)
    }

    /// LIFO submission of a prepared task when supported
    pub fn submit_next(&self, task: Task) -> Result<TaskId, SubmitError> {
        self.push(task, true)
    }

    fn push(&self, task: Task, lifo: bool) -> Result<TaskId, SubmitError> {
        let id = task.id();

        {
            let mut queue = self.queue();
            if queue.shutdown {
                warn!("Thread type `{}` is shut down, rejecting {:?}", self.name(), task);
                return Err(SubmitError {
                    thread_type: self.name().to_owned(),
                    task: task,
                });
            }

            if lifo && self.supports_lifo() {
                queue.tasks.push_front(task);
            } else {
                queue.tasks.push_back(task);
            }
        }

        self.shared.available.notify_one();
        Ok(id)
    }

    /// Move an already queued task to the head of the queue.
    ///
    /// Returns `false` if the task is not queued, because it is running,
    /// finished, or was never submitted here.
    pub fn move_to_head_of_queue(&self, id: TaskId) -> bool {
        let mut queue = self.queue();

        match queue.tasks.iter().position(|task| task.id == id) {
            Some(0) => true,
            Some(pos) => {
                if let Some(task) = queue.tasks.remove(pos) {
                    queue.tasks.push_front(task);
                }
                true
            }
            None => false,
        }
    }

    /// Turn `action` into a task body that never lets a panic escape.
    pub fn wrap_with_error_protection<F>(&self, action: F) -> impl FnOnce() + Send + 'static
        where F: FnOnce() + Send + 'static
    {
        let name = self.name().to_owned();

        move || {
            if let Err(err) = crate::protect(action) {
                error!("Uncaught error on `{}`: {}", name, err);
            }
        }
    }

    /// Like `wrap_with_error_protection`, handing a caught panic to `on_error`.
    pub fn wrap_with_error_protection_or<F, E>(&self, action: F, on_error: E) -> impl FnOnce() + Send + 'static
        where F: FnOnce() + Send + 'static,
              E: FnOnce(ChainError) + Send + 'static
    {
        let name = self.name().to_owned();

        move || {
            if let Err(err) = crate::protect(action) {
                if let Err(again) = crate::protect(move || on_error(err)) {
                    error!("Error handler on `{}` failed: {}", name, again);
                }
            }
        }
    }

    /// Stop accepting work. Workers finish what is queued, then exit.
    ///
    /// Returns the number of tasks still queued at this point.
    pub fn shutdown(&self) -> usize {
        let remaining = {
            let mut queue = self.queue();
            queue.shutdown = true;
            queue.tasks.len()
        };
        self.shared.available.notify_all();

        debug!("Thread type `{}` shutting down, {} task(s) left to drain", self.name(), remaining);
        remaining
    }

    /// Stop accepting work and empty the queue, returning the undone tasks.
    pub fn shutdown_now(&self) -> Vec<Task> {
        let undone: Vec<Task> = {
            let mut queue = self.queue();
            queue.shutdown = true;
            queue.tasks.drain(..).collect()
        };
        self.shared.available.notify_all();

        debug!("Thread type `{}` shut down now, {} task(s) undone", self.name(), undone.len());
        undone
    }

    /// Wait for the workers to exit. Call `shutdown` first.
    pub fn join(&self) {
        assert!(!self.is_current(),
                "join() called from a worker of `{}`, it would wait for itself",
                self.name());

        let handles: Vec<_> = self.workers().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("A worker of `{}` exited by panic", self.name());
            }
        }
    }

    /// Next task for a worker, blocking while the queue is empty.
    /// `None` once shut down and drained.
    pub(crate) fn next_task(&self) -> Option<Task> {
        let mut queue = self.queue();

        loop {
            if let Some(task) = queue.tasks.pop_front() {
                return Some(task);
            }

            if queue.shutdown {
                return None;
            }

            queue = match self.shared.available.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn queue(&self) -> MutexGuard<Queue> {
        match self.shared.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn workers(&self) -> MutexGuard<Vec<thread::JoinHandle<()>>> {
        match self.shared.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ThreadType {
    /// A chain head that is already done with `value`
    pub fn from<T: Value>(&self, value: T) -> AltFuture<T> {
        let settable = SettableAltFuture::new(self);
        settable.set(value);
        settable.future()
    }

    /// A chain head running `action` on this thread type once forked
    pub fn then<U, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              F: FnOnce() -> U + Send + 'static
    {
        AltFuture::head(self, move |()| Ok(action()))
    }

    /// A chain head running a fallible `action` once forked
    pub fn try_then<U, E, F>(&self, action: F) -> AltFuture<U>
        where U: Value,
              E: Into<Box<dyn Error + Send + Sync>>,
              F: FnOnce() -> Result<U, E> + Send + 'static
    {
        AltFuture::head(self, move |()| action().map_err(ChainError::new))
    }

    /// An unset future completed by calling `set` on it
    pub fn settable<T: Value>(&self) -> SettableAltFuture<T> {
        SettableAltFuture::new(self)
    }
}

impl PartialEq for ThreadType {
    fn eq(&self, other: &ThreadType) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for ThreadType {}

impl fmt::Debug for ThreadType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ThreadType({}, workers: {})", self.name(), self.worker_count())
    }
}
