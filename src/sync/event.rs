// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event: a waitable boolean flag, broadcast on signal.
//!
//! There is no auto-reset variant here -- §4.5 is explicit that a
//! caller wanting single-waiter-wakes-at-a-time semantics should use a
//! semaphore with capacity 1 instead of overloading this type.

use crate::object::{KernelObject, ObjectHeader, ObjectType};
use crate::sync::wait_queue::WaitQueue;
use core::sync::atomic::{AtomicBool, Ordering};

pub struct Event {
    header: ObjectHeader,
    pub(crate) wait_queue: WaitQueue,
    signaled: AtomicBool,
}

impl Event {
    pub fn new() -> Self {
        Self {
            header: ObjectHeader::new(ObjectType::Event),
            wait_queue: WaitQueue::new(),
            signaled: AtomicBool::new(false),
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn set_signaled(&self, value: bool) {
        self.signaled.store(value, Ordering::Release);
    }

    pub fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelObject for Event {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn destroy(&self) {
        debug_assert!(
            self.wait_queue.is_empty(),
            "event destroyed with waiters still queued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unsignaled() {
        let e = Event::new();
        assert!(!e.is_signaled());
    }

    #[test]
    fn signaled_flag_round_trips() {
        let e = Event::new();
        e.set_signaled(true);
        assert!(e.is_signaled());
        e.set_signaled(false);
        assert!(!e.is_signaled());
    }
}
