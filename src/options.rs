// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Thread type and scheduler options

use std::default::Default;

/// Queue discipline backing a thread type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Single-ended: strict FIFO, `execute_next` behaves like `execute`
    Fifo,
    /// Double-ended: FIFO `execute` plus LIFO `execute_next`
    Deque,
}

/// Options for one named thread type
#[derive(Debug, Clone)]
pub struct ThreadTypeOptions {
    pub name: String,
    pub workers: usize,
    pub queue: QueueKind,
    pub stack_size: Option<usize>,
}

impl ThreadTypeOptions {
    pub fn new<S: Into<String>>(name: S) -> ThreadTypeOptions {
        ThreadTypeOptions {
            name: name.into(),
            workers: 1,
            queue: QueueKind::Deque,
            stack_size: None,
        }
    }

    pub fn workers(&mut self, workers: usize) -> &mut ThreadTypeOptions {
        assert!(workers >= 1, "Must have at least one worker");
        self.workers = workers;
        self
    }

    pub fn queue(&mut self, queue: QueueKind) -> &mut ThreadTypeOptions {
        self.queue = queue;
        self
    }

    pub fn stack_size(&mut self, size: usize) -> &mut ThreadTypeOptions {
        self.stack_size = Some(size);
        self
    }
}

/// Process-wide behaviour shared by every thread type of a scheduler
#[derive(Debug, Clone)]
pub struct Config {
    /// Abort the process on the first uncaught chain error.
    ///
    /// Meant for development builds. Production builds log and continue.
    pub fail_fast: bool,
    /// Prefix for worker thread names, `<prefix>-<thread type>#<index>`
    pub thread_name_prefix: String,
}

impl Config {
    pub fn new() -> Config {
        Config {
            fail_fast: false,
            thread_name_prefix: "altfuture".to_owned(),
        }
    }

    pub fn fail_fast(&mut self, fail_fast: bool) -> &mut Config {
        self.fail_fast = fail_fast;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(&mut self, prefix: S) -> &mut Config {
        self.thread_name_prefix = prefix.into();
        self
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
