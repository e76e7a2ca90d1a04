// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Per-CPU state
//!
//! Each CPU has exactly one idle thread, created at scheduler
//! initialization and never placed on a run queue: it is selected
//! only when every queue -- real-time and all eight MLFQ levels --
//! comes up empty. Each CPU also tracks its own "currently running
//! thread" slot and a reschedule-pending flag the timer-interrupt
//! heartbeat sets. The remaining quantum for the running thread is
//! tracked on the `Thread` itself (`Thread::tick_quantum`), not here --
//! it migrates with the thread across CPUs, which a per-CPU copy
//! couldn't.

use crate::config::MAX_CPUS;
use crate::object::ObjRef;
use crate::spinlock::SpinLock;
use crate::thread::Thread;
use core::sync::atomic::{AtomicBool, Ordering};

pub type CpuId = usize;

pub struct PerCpu {
    pub id: CpuId,
    current: SpinLock<Option<ObjRef<Thread>>>,
    idle_thread: SpinLock<Option<ObjRef<Thread>>>,
    reschedule_pending: AtomicBool,
}

impl PerCpu {
    fn new(id: CpuId) -> Self {
        Self {
            id,
            current: SpinLock::new(None),
            idle_thread: SpinLock::new(None),
            reschedule_pending: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Option<ObjRef<Thread>> {
        self.current.lock().clone()
    }

    pub fn set_current(&self, thread: Option<ObjRef<Thread>>) {
        *self.current.lock() = thread;
    }

    pub fn idle_thread(&self) -> Option<ObjRef<Thread>> {
        self.idle_thread.lock().clone()
    }

    pub fn set_idle_thread(&self, thread: ObjRef<Thread>) {
        *self.idle_thread.lock() = Some(thread);
    }

    pub fn request_reschedule(&self) {
        self.reschedule_pending.store(true, Ordering::Release);
    }

    pub fn take_reschedule_request(&self) -> bool {
        self.reschedule_pending.swap(false, Ordering::AcqRel)
    }
}

/// Fixed-size table of per-CPU state, indexed by `CpuId`. Sized to
/// `MAX_CPUS` at compile time so there is no allocation on the path
/// the scheduler lock protects.
pub struct CpuTable {
    cpus: [PerCpu; MAX_CPUS],
    active: usize,
}

impl CpuTable {
    pub fn new(active_cpus: usize) -> Self {
        assert!(active_cpus >= 1 && active_cpus <= MAX_CPUS);
        let cpus = core::array::from_fn(PerCpu::new);
        Self {
            cpus,
            active: active_cpus,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn get(&self, id: CpuId) -> &PerCpu {
        &self.cpus[id]
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &PerCpu> {
        self.cpus[..self.active].iter()
    }
}
