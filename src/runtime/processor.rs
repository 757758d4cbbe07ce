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

//! Processing unit of a thread

use std::cell::{Cell, RefCell};
use std::io;
use std::thread::{self, Builder};

use crate::thread_type::{Task, ThreadType};

thread_local!(static PROCESSOR: RefCell<Option<ThreadType>> = RefCell::new(None));
thread_local!(static POOL_THREAD: Cell<bool> = Cell::new(false));

/// Flag the current thread as owned by this crate (worker or timer).
pub fn mark_pool_thread() {
    POOL_THREAD.with(|flag| flag.set(true));
}

/// Whether the current thread is a worker or timer thread
pub fn is_pool_thread() -> bool {
    POOL_THREAD.with(|flag| flag.get())
}

/// The thread type whose worker is running the current thread
pub fn current() -> Option<ThreadType> {
    PROCESSOR.with(|p| p.borrow().clone())
}

/// One worker thread of a thread type
pub struct Processor {
    id: usize,
    thread_type: ThreadType,
}

impl Processor {
    pub fn spawn(id: usize, thread_type: ThreadType) -> io::Result<thread::JoinHandle<()>> {
        let mut builder = Builder::new().name(format!("{}-{}#{}",
                                                      thread_type.config().thread_name_prefix,
                                                      thread_type.name(),
                                                      id));
        if let Some(stack_size) = thread_type.options().stack_size {
            builder = builder.stack_size(stack_size);
        }

        builder.spawn(move || {
            let mut p = Processor {
                id: id,
                thread_type: thread_type,
            };

            p.set_tls();
            p.schedule();
            Processor::unset_tls();
        })
    }

    fn set_tls(&self) {
        mark_pool_thread();
        PROCESSOR.with(|p| *p.borrow_mut() = Some(self.thread_type.clone()));
    }

    fn unset_tls() {
        PROCESSOR.with(|p| *p.borrow_mut() = None);
    }

    /// Run the processor until its thread type shuts down and the queue is drained
    fn schedule(&mut self) {
        while let Some(task) = self.thread_type.next_task() {
            self.resume(task);
        }

        debug!("Processor {}#{} exiting", self.thread_type.name(), self.id);
    }

    fn resume(&mut self, task: Task) {
        let id = task.id();

        // A panic must never take the worker down with it.
        if let Err(err) = crate::protect(move || task.run()) {
            error!("Task {:?} on {}#{} panicked: {}", id, self.thread_type.name(), self.id, err);
        }
    }
}
