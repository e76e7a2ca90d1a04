// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The waitable mutex kernel object.
//!
//! Named `SyncMutex` to keep it distinct from [`crate::spinlock::SpinLock`],
//! which is the plain data-protecting lock used throughout this crate
//! for ordinary `&mut` access. `SyncMutex` is the higher-level object
//! exposed through `wait`/`signal`: it tracks an owning thread and a
//! recursion count, and on its owner's death hands ownership to the
//! next waiter rather than simply releasing (§4.5).

use crate::object::{KernelObject, ObjectHeader, ObjectType};
use crate::spinlock::SpinLock;
use crate::sync::wait_queue::WaitQueue;
use crate::thread::Thread;
use crate::object::ObjRef;
use core::sync::atomic::{AtomicU32, Ordering};

pub struct SyncMutex {
    header: ObjectHeader,
    pub(crate) wait_queue: WaitQueue,
    owner: SpinLock<Option<ObjRef<Thread>>>,
    recursion_count: AtomicU32,
}

impl SyncMutex {
    pub fn new() -> Self {
        Self {
            header: ObjectHeader::new(ObjectType::Mutex),
            wait_queue: WaitQueue::new(),
            owner: SpinLock::new(None),
            recursion_count: AtomicU32::new(0),
        }
    }

    pub fn owner(&self) -> Option<ObjRef<Thread>> {
        self.owner.lock().clone()
    }

    pub fn is_owned(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Claims ownership unconditionally; caller has already confirmed
    /// the mutex was free (or is handing off from a dead owner).
    pub fn set_owner(&self, thread: Option<ObjRef<Thread>>) {
        *self.owner.lock() = thread;
        self.recursion_count.store(
            if self.owner.lock().is_some() { 1 } else { 0 },
            Ordering::Relaxed,
        );
    }

    pub fn recursion_count(&self) -> u32 {
        self.recursion_count.load(Ordering::Relaxed)
    }

    pub fn recurse(&self) {
        self.recursion_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the recursion count; returns `true` once it reaches
    /// zero and the mutex is actually free.
    pub fn unrecurse(&self) -> bool {
        self.recursion_count.fetch_sub(1, Ordering::Relaxed) == 1
    }

    pub fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }
}

impl Default for SyncMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelObject for SyncMutex {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn destroy(&self) {
        debug_assert!(
            self.wait_queue.is_empty(),
            "mutex destroyed with waiters still queued"
        );
    }
}
