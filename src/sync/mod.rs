// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization objects: events, mutexes, semaphores.
//!
//! All three share the wait/signal contract described in §4.5. This
//! module holds their per-type state and wait queues; the actual
//! protocol -- moving a thread between `Waiting` and `Ready`,
//! enqueuing it back onto the scheduler -- is orchestrated by
//! [`crate::kernel`], which is the only place that legally holds the
//! scheduler lock alongside an object lock.

pub mod event;
pub mod mutex;
pub mod semaphore;
pub mod wait_queue;

pub use event::Event;
pub use mutex::SyncMutex;
pub use semaphore::Semaphore;
pub use wait_queue::WaitQueue;

use crate::object::{KernelObject, ObjRef};

/// Why a thread is currently `Waiting`. Distinct from the wait target
/// itself so diagnostics can tell a timed wait from an indefinite one
/// without inspecting the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Event,
    Mutex,
    Semaphore,
    Timeout,
}

/// A reference to one of the three waitable kernel objects. Threads
/// hold a list of these for two purposes: `owned_objects` (what a
/// thread must clean up on death) and `wait_object` (what it is
/// presently blocked on). A sum type here, rather than a trait
/// object, is what lets owner-death cleanup dispatch differently per
/// kind (§4.5) without downcasting.
#[derive(Clone)]
pub enum Waitable {
    Event(ObjRef<Event>),
    Mutex(ObjRef<SyncMutex>),
    Semaphore(ObjRef<Semaphore>),
}

impl Waitable {
    pub fn wait_queue(&self) -> &WaitQueue {
        match self {
            Waitable::Event(e) => e.wait_queue(),
            Waitable::Mutex(m) => m.wait_queue(),
            Waitable::Semaphore(s) => s.wait_queue(),
        }
    }

    pub fn object_type(&self) -> crate::object::ObjectType {
        match self {
            Waitable::Event(e) => e.header().object_type(),
            Waitable::Mutex(m) => m.header().object_type(),
            Waitable::Semaphore(s) => s.header().object_type(),
        }
    }

    pub fn ptr_eq(&self, other: &Waitable) -> bool {
        match (self, other) {
            (Waitable::Event(a), Waitable::Event(b)) => alloc::sync::Arc::ptr_eq(a.as_arc(), b.as_arc()),
            (Waitable::Mutex(a), Waitable::Mutex(b)) => alloc::sync::Arc::ptr_eq(a.as_arc(), b.as_arc()),
            (Waitable::Semaphore(a), Waitable::Semaphore(b)) => {
                alloc::sync::Arc::ptr_eq(a.as_arc(), b.as_arc())
            }
            _ => false,
        }
    }
}
