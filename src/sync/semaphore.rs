// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Semaphore: a waitable counter.
//!
//! Owner death leaves the count untouched (§4.5): a semaphore has no
//! notion of ownership, so a dying thread's release has nothing to
//! hand off.

use crate::object::{KernelObject, ObjectHeader, ObjectType};
use crate::sync::wait_queue::WaitQueue;
use core::sync::atomic::{AtomicI64, Ordering};

pub struct Semaphore {
    header: ObjectHeader,
    pub(crate) wait_queue: WaitQueue,
    count: AtomicI64,
}

impl Semaphore {
    pub fn new(initial_count: i64) -> Self {
        Self {
            header: ObjectHeader::new(ObjectType::Semaphore),
            wait_queue: WaitQueue::new(),
            count: AtomicI64::new(initial_count),
        }
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    /// Decrements if positive; returns whether the caller may proceed
    /// without blocking.
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current <= 0 {
                return false;
            }
            if self
                .count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release(&self, n: i64) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    pub fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }
}

impl KernelObject for Semaphore {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn destroy(&self) {
        debug_assert!(
            self.wait_queue.is_empty(),
            "semaphore destroyed with waiters still queued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_respects_count() {
        let s = Semaphore::new(1);
        assert!(s.try_acquire());
        assert!(!s.try_acquire());
        s.release(1);
        assert!(s.try_acquire());
    }

    #[test]
    fn release_accumulates() {
        let s = Semaphore::new(0);
        s.release(3);
        assert_eq!(s.count(), 3);
    }
}
