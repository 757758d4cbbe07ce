// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The set of thread types an application runs on
//!
//! A `Scheduler` is built once at start-up and handed to whatever needs to
//! run chains. There is no global instance.

use std::io;
use std::sync::Arc;

use linked_hash_map::LinkedHashMap;

use crate::options::{Config, QueueKind, ThreadTypeOptions};
use crate::runtime::Timer;
use crate::thread_type::{Task, ThreadType};

/// Name of the CPU-bound pool
pub const WORKER: &str = "worker";
/// Name of the single-threaded serialized pool
pub const SERIAL_WORKER: &str = "serial-worker";
/// Name of the UI-affinity thread type
pub const UI: &str = "ui";
/// Name of the disk I/O thread type
pub const FILE: &str = "file";
/// Name of the network read pool
pub const NET_READ: &str = "net-read";
/// Name of the network write thread type
pub const NET_WRITE: &str = "net-write";

const DEFAULT_NET_READ_WORKERS: usize = 4;

/// Configures and builds a `Scheduler`
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    config: Config,
    workers: usize,
    net_read_workers: usize,
    extra: Vec<ThreadTypeOptions>,
}

impl SchedulerBuilder {
    pub fn new() -> SchedulerBuilder {
        SchedulerBuilder {
            config: Config::new(),
            workers: num_cpus::get(),
            net_read_workers: DEFAULT_NET_READ_WORKERS,
            extra: Vec::new(),
        }
    }

    /// Set the number of workers of the `worker` pool
    pub fn with_workers(mut self, workers: usize) -> SchedulerBuilder {
        assert!(workers >= 1, "Must have at least one worker");
        self.workers = workers;
        self
    }

    /// Set the number of workers of the `net-read` pool
    pub fn with_net_read_workers(mut self, workers: usize) -> SchedulerBuilder {
        assert!(workers >= 1, "Must have at least one worker");
        self.net_read_workers = workers;
        self
    }

    /// Abort on the first uncaught chain error
    pub fn fail_fast(mut self, fail_fast: bool) -> SchedulerBuilder {
        self.config.fail_fast(fail_fast);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> SchedulerBuilder {
        self.config.thread_name_prefix(prefix);
        self
    }

    /// Add an application-specific thread type next to the built-in ones
    pub fn thread_type(mut self, options: ThreadTypeOptions) -> SchedulerBuilder {
        self.extra.push(options);
        self
    }

    /// Start every thread type and the timer thread
    pub fn build(self) -> io::Result<Scheduler> {
        let config = Arc::new(self.config);
        let timer = Timer::new(format!("{}-timer", config.thread_name_prefix))?;

        let mut roles = vec![role(WORKER, self.workers, QueueKind::Deque),
                             role(SERIAL_WORKER, 1, QueueKind::Fifo),
                             role(UI, 1, QueueKind::Fifo),
                             role(FILE, 1, QueueKind::Fifo),
                             role(NET_READ, self.net_read_workers, QueueKind::Deque),
                             role(NET_WRITE, 1, QueueKind::Fifo)];
        roles.extend(self.extra);

        let mut thread_types: LinkedHashMap<String, ThreadType> = LinkedHashMap::new();
        for options in roles {
            if thread_types.contains_key(&options.name) {
                abandon(&thread_types, &timer);
                return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                          format!("thread type `{}` declared twice", options.name)));
            }

            let name = options.name.clone();
            match ThreadType::new(options, config.clone(), timer.clone()) {
                Ok(thread_type) => {
                    thread_types.insert(name, thread_type);
                }
                Err(err) => {
                    abandon(&thread_types, &timer);
                    return Err(err);
                }
            }
        }

        let get = |name: &str| thread_types.get(name).cloned();
        let (worker, serial_worker, ui, file, net_read, net_write) =
            match (get(WORKER), get(SERIAL_WORKER), get(UI), get(FILE), get(NET_READ), get(NET_WRITE)) {
                (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) => (a, b, c, d, e, f),
                _ => {
                    abandon(&thread_types, &timer);
                    return Err(io::Error::new(io::ErrorKind::Other, "built-in thread type missing"));
                }
            };

        info!("Scheduler started with {} thread types, {} worker(s) in `{}`",
              thread_types.len(),
              worker.worker_count(),
              WORKER);

        Ok(Scheduler {
            inner: Arc::new(Inner {
                config: config,
                timer: timer,
                worker: worker,
                serial_worker: serial_worker,
                ui: ui,
                file: file,
                net_read: net_read,
                net_write: net_write,
                thread_types: thread_types,
            }),
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }
}

fn role(name: &str, workers: usize, queue: QueueKind) -> ThreadTypeOptions {
    let mut options = ThreadTypeOptions::new(name);
    options.workers(workers).queue(queue);
    options
}

fn abandon(thread_types: &LinkedHashMap<String, ThreadType>, timer: &Timer) {
    for thread_type in thread_types.values() {
        thread_type.shutdown_now();
    }
    timer.shutdown();
}

#[derive(Debug)]
struct Inner {
    config: Arc<Config>,
    timer: Timer,
    worker: ThreadType,
    serial_worker: ThreadType,
    ui: ThreadType,
    file: ThreadType,
    net_read: ThreadType,
    net_write: ThreadType,
    thread_types: LinkedHashMap<String, ThreadType>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for thread_type in self.thread_types.values() {
            thread_type.shutdown();
        }
        self.timer.shutdown();
    }
}

/// Every thread type of an application plus the shared timer.
///
/// Cloning is cheap. When the last clone is dropped every thread type is
/// shut down; queued work still drains.
#[derive(Debug, Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// CPU-bound pool, one worker per CPU by default
    pub fn worker(&self) -> &ThreadType {
        &self.inner.worker
    }

    /// Single worker, tasks run strictly in order
    pub fn serial_worker(&self) -> &ThreadType {
        &self.inner.serial_worker
    }

    pub fn ui(&self) -> &ThreadType {
        &self.inner.ui
    }

    pub fn file(&self) -> &ThreadType {
        &self.inner.file
    }

    pub fn net_read(&self) -> &ThreadType {
        &self.inner.net_read
    }

    pub fn net_write(&self) -> &ThreadType {
        &self.inner.net_write
    }

    pub fn timer(&self) -> &Timer {
        &self.inner.timer
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// A thread type by name, built-in or added through the builder
    pub fn thread_type(&self, name: &str) -> Option<&ThreadType> {
        self.inner.thread_types.get(name)
    }

    /// Every thread type, in the order they were created
    pub fn thread_types(&self) -> impl Iterator<Item = &ThreadType> {
        self.inner.thread_types.values()
    }

    /// Stop accepting work everywhere. Returns the number of tasks still
    /// queued, which the workers will run before exiting.
    pub fn shutdown(&self) -> usize {
        let queued: usize = self.thread_types().map(|thread_type| thread_type.shutdown()).sum();
        self.inner.timer.shutdown();
        queued
    }

    /// Stop accepting work everywhere and hand back every queued task
    pub fn shutdown_now(&self) -> Vec<Task> {
        let mut undone = Vec::new();
        for thread_type in self.thread_types() {
            undone.extend(thread_type.shutdown_now());
        }
        self.inner.timer.shutdown();
        undone
    }

    /// Wait for every worker to exit. Call `shutdown` first.
    pub fn join(&self) {
        for thread_type in self.thread_types() {
            thread_type.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builtin_roles_in_order() {
        let mut extra = ThreadTypeOptions::new("db");
        extra.workers(2);

        let scheduler = Scheduler::builder()
            .with_workers(2)
            .with_net_read_workers(3)
            .thread_name_prefix("test")
            .thread_type(extra)
            .build()
            .unwrap();

        let names: Vec<&str> = scheduler.thread_types().map(|tt| tt.name()).collect();
        assert_eq!(names, vec![WORKER, SERIAL_WORKER, UI, FILE, NET_READ, NET_WRITE, "db"]);

        assert_eq!(scheduler.worker().worker_count(), 2);
        assert_eq!(scheduler.net_read().worker_count(), 3);
        assert!(scheduler.serial_worker().is_in_order_executor());
        assert!(scheduler.ui().is_in_order_executor());
        assert_eq!(scheduler.thread_type("db").map(|tt| tt.worker_count()), Some(2));
        assert!(scheduler.thread_type("missing").is_none());
        assert_eq!(scheduler.config().thread_name_prefix, "test");

        scheduler.shutdown();
        scheduler.join();
    }

    #[test]
    fn test_duplicate_thread_type_rejected() {
        let err = Scheduler::builder()
            .with_workers(1)
            .thread_type(ThreadTypeOptions::new(FILE))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let scheduler = Scheduler::builder().with_workers(1).build().unwrap();
        scheduler.shutdown();
        scheduler.join();

        assert!(scheduler.file().execute(|| {}).is_err());
        assert!(scheduler.timer().is_shutdown());
    }
}
