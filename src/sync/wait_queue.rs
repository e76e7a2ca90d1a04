// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! FIFO wait queue shared by events, mutexes, and semaphores.

use crate::object::ObjRef;
use crate::spinlock::SpinLock;
use crate::thread::{Thread, ThreadId};
use alloc::collections::VecDeque;
use alloc::vec::Vec;

pub struct WaitQueue {
    entries: SpinLock<VecDeque<ObjRef<Thread>>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, thread: ObjRef<Thread>) {
        self.entries.lock().push_back(thread);
    }

    pub fn pop_front(&self) -> Option<ObjRef<Thread>> {
        self.entries.lock().pop_front()
    }

    pub fn remove(&self, tid: ThreadId) -> Option<ObjRef<Thread>> {
        let mut guard = self.entries.lock();
        let pos = guard.iter().position(|t| t.thread_id() == tid)?;
        guard.remove(pos)
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.entries.lock().iter().any(|t| t.thread_id() == tid)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every waiter, in FIFO order, for the caller to drive
    /// through the common signal protocol (§4.5: dequeue, clear
    /// `owned_objects`, mark `Ready`, re-enqueue into the scheduler).
    pub fn drain_all(&self) -> Vec<ObjRef<Thread>> {
        self.entries.lock().drain(..).collect()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
