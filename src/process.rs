// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Process control blocks.
//!
//! A process owns its threads strongly (the thread list holds
//! `ObjRef<Thread>`); a thread's back-reference to its process is a
//! weak pointer, breaking the cycle the strong direction would
//! otherwise form. It is never explicitly cleared at thread
//! termination -- being a `Weak`, it already can't keep a terminated
//! process's `Arc` alive, and the thread is unlinked from every
//! strong-owning container well before this pointer would matter.

use crate::object::{KernelObject, ObjRef, ObjectHeader, ObjectType};
use crate::spinlock::SpinLock;
use crate::thread::{Thread, ThreadId};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, Ordering};

pub type ProcessId = u64;
pub type SessionId = u64;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

fn alloc_process_id() -> ProcessId {
    NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Terminated,
}

/// Opaque resource budget; the core only ever copies these numbers
/// around, never interprets them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceLimits {
    pub cpu_time_ticks: u64,
    pub memory_bytes: u64,
    pub max_handles: u32,
}

pub struct Process {
    header: ObjectHeader,
    process_id: ProcessId,
    parent_process_id: Option<ProcessId>,
    session_id: SessionId,
    state: SpinLock<ProcessState>,
    exit_status: AtomicI32,
    privilege_level: AtomicU8,
    security_token: SpinLock<Option<u64>>,
    has_address_space: bool,
    /// Thread list in insertion order; also the lock serializing every
    /// mutation to this process's thread membership (§5 locking
    /// order: process lock is acquired under the global registry lock
    /// and above the scheduler lock).
    thread_list: SpinLock<Vec<ObjRef<Thread>>>,
    base_priority: AtomicU8,
    group_id: SpinLock<Option<u64>>,
    limits: SpinLock<ResourceLimits>,
    name: SpinLock<Option<String>>,
}

impl Process {
    pub fn new(
        parent_process_id: Option<ProcessId>,
        session_id: SessionId,
        base_priority: u8,
        has_address_space: bool,
    ) -> Self {
        Self {
            header: ObjectHeader::new(ObjectType::Process),
            process_id: alloc_process_id(),
            parent_process_id,
            session_id,
            state: SpinLock::new(ProcessState::Created),
            exit_status: AtomicI32::new(0),
            privilege_level: AtomicU8::new(0),
            security_token: SpinLock::new(None),
            has_address_space,
            thread_list: SpinLock::new(Vec::new()),
            base_priority: AtomicU8::new(base_priority),
            group_id: SpinLock::new(None),
            limits: SpinLock::new(ResourceLimits::default()),
            name: SpinLock::new(None),
        }
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = Some(name);
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn parent_process_id(&self) -> Option<ProcessId> {
        self.parent_process_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(Ordering::Relaxed)
    }

    pub fn has_address_space(&self) -> bool {
        self.has_address_space
    }

    pub fn base_priority(&self) -> u8 {
        self.base_priority.load(Ordering::Relaxed)
    }

    pub fn group_id(&self) -> Option<u64> {
        *self.group_id.lock()
    }

    pub fn set_group_id(&self, group_id: u64) {
        *self.group_id.lock() = Some(group_id);
    }

    pub fn limits(&self) -> ResourceLimits {
        *self.limits.lock()
    }

    pub fn set_limits(&self, limits: ResourceLimits) {
        *self.limits.lock() = limits;
    }

    /// `thread_count` is never stored separately: it is always
    /// `thread_list.len()`, so the invariant `thread_count ==
    /// len(thread_list)` holds by construction rather than by
    /// discipline.
    pub fn thread_count(&self) -> usize {
        self.thread_list.lock().len()
    }

    pub fn threads(&self) -> Vec<ObjRef<Thread>> {
        self.thread_list.lock().clone()
    }

    /// §4.3 step 7: append under the process lock.
    pub fn add_thread(&self, thread: ObjRef<Thread>) {
        let mut guard = self.thread_list.lock();
        guard.push(thread);
        if matches!(*self.state.lock(), ProcessState::Created) {
            *self.state.lock() = ProcessState::Running;
        }
    }

    /// §4.4 step 4: unlink and decrement; auto-transitions to
    /// `Terminated` when the list empties. Returns whether this call
    /// performed that transition.
    pub fn remove_thread(&self, tid: ThreadId) -> bool {
        let mut guard = self.thread_list.lock();
        if let Some(pos) = guard.iter().position(|t| t.thread_id() == tid) {
            guard.remove(pos);
        }
        let now_empty = guard.is_empty();
        drop(guard);

        if now_empty {
            let mut state = self.state.lock();
            if *state != ProcessState::Terminated {
                *state = ProcessState::Terminated;
                return true;
            }
        }
        false
    }

    pub fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Relaxed);
    }
}

impl KernelObject for Process {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn destroy(&self) {
        debug_assert!(
            self.thread_list.lock().is_empty(),
            "process destroyed with threads still attached"
        );
    }
}

/// Global process table. Unlike threads, processes are not
/// `ObjRef`-counted by external callers in this crate's scope (no
/// handle table lives here), so a plain `Arc` registry is enough.
pub struct ProcessRegistry {
    processes: SpinLock<BTreeMap<ProcessId, Arc<Process>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            processes: SpinLock::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, process: Arc<Process>) {
        self.processes.lock().insert(process.process_id(), process);
    }

    pub fn get(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    pub fn remove(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().remove(&pid)
    }

    pub fn active_count(&self) -> usize {
        self.processes.lock().len()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjRef;
    use crate::thread::Thread;

    fn make_thread() -> ObjRef<Thread> {
        ObjRef::new(Arc::new(Thread::new(crate::config::PRIORITY_NORMAL, false)))
    }

    #[test]
    fn thread_count_matches_list_length() {
        let p = Process::new(None, 0, crate::config::PRIORITY_NORMAL, false);
        let t1 = make_thread();
        let t2 = make_thread();
        p.add_thread(t1.clone());
        p.add_thread(t2);
        assert_eq!(p.thread_count(), 2);
        p.remove_thread(t1.thread_id());
        assert_eq!(p.thread_count(), 1);
    }

    #[test]
    fn process_auto_terminates_when_empty() {
        let p = Process::new(None, 0, crate::config::PRIORITY_NORMAL, false);
        let t = make_thread();
        let tid = t.thread_id();
        p.add_thread(t);
        assert_eq!(p.state(), ProcessState::Running);
        let transitioned = p.remove_thread(tid);
        assert!(transitioned);
        assert_eq!(p.state(), ProcessState::Terminated);
    }

    #[test]
    fn terminated_process_is_not_revived() {
        let p = Process::new(None, 0, crate::config::PRIORITY_NORMAL, false);
        let t = make_thread();
        let tid = t.thread_id();
        p.add_thread(t);
        p.remove_thread(tid);
        assert_eq!(p.state(), ProcessState::Terminated);
        let t2 = make_thread();
        p.add_thread(t2);
        assert_eq!(p.state(), ProcessState::Terminated);
    }
}
