// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread control blocks and the global thread registry.
//!
//! A TCB is reachable from up to three places at once: the global
//! registry, its owning process's thread list, and (mutually
//! exclusively) a scheduler ready queue or a sync object's wait
//! queue. Rather than intrusive pointers threaded through the TCB
//! itself, those containers hold `ObjRef<Thread>` clones keyed by
//! `thread_id` -- the object header's refcount is what keeps a thread
//! alive while any container still references it, and removal is a
//! map lookup instead of a raw-pointer unlink.

use crate::arch::ArchContext;
use crate::config::{PRIORITY_HIGHEST, PRIORITY_IDLE, PRIORITY_LOWEST};
use crate::object::{KernelObject, ObjRef, ObjectHeader, ObjectType};
use crate::process::Process;
use crate::spinlock::SpinLock;
use crate::sync::{WaitReason, Waitable};
use crate::timer::Timer;
use crate::tls::TlsTable;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

pub type ThreadId = u64;
pub type CpuAffinity = u64;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

fn alloc_thread_id() -> ThreadId {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Created,
    Ready,
    Running,
    Waiting,
    Suspended,
    Terminated,
}

pub struct Thread {
    header: ObjectHeader,
    thread_id: ThreadId,
    process: SpinLock<Option<Weak<Process>>>,
    state: SpinLock<ThreadState>,
    wait_reason: SpinLock<Option<WaitReason>>,
    wait_object: SpinLock<Option<Waitable>>,
    wait_timer: SpinLock<Option<ObjRef<Timer>>>,
    priority: AtomicU8,
    base_priority: AtomicU8,
    cpu_affinity: AtomicU64,
    quantum: AtomicU64,
    ready_time: AtomicU64,
    kernel_stack: SpinLock<Option<Box<[u8]>>>,
    user_stack: SpinLock<Option<Box<[u8]>>>,
    arch_context: SpinLock<Option<ArchContext>>,
    owned_objects: SpinLock<Vec<Waitable>>,
    tls: SpinLock<TlsTable>,
    context_switch_count: AtomicU64,
    cpu_time: AtomicU64,
    io_count: AtomicU64,
    in_scheduler_queue: AtomicBool,
    name: SpinLock<Option<String>>,
}

impl Thread {
    pub(crate) fn new(base_priority: u8, suspended: bool) -> Self {
        let state = if suspended {
            ThreadState::Suspended
        } else {
            ThreadState::Created
        };
        Self {
            header: ObjectHeader::new(ObjectType::Thread),
            thread_id: alloc_thread_id(),
            process: SpinLock::new(None),
            state: SpinLock::new(state),
            wait_reason: SpinLock::new(None),
            wait_object: SpinLock::new(None),
            wait_timer: SpinLock::new(None),
            priority: AtomicU8::new(base_priority),
            base_priority: AtomicU8::new(base_priority),
            cpu_affinity: AtomicU64::new(0),
            quantum: AtomicU64::new(0),
            ready_time: AtomicU64::new(0),
            kernel_stack: SpinLock::new(None),
            user_stack: SpinLock::new(None),
            arch_context: SpinLock::new(None),
            owned_objects: SpinLock::new(Vec::new()),
            tls: SpinLock::new(TlsTable::new()),
            context_switch_count: AtomicU64::new(0),
            cpu_time: AtomicU64::new(0),
            io_count: AtomicU64::new(0),
            in_scheduler_queue: AtomicBool::new(false),
            name: SpinLock::new(None),
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn set_state(&self, new_state: ThreadState) {
        *self.state.lock() = new_state;
    }

    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_process(&self, process: Option<Weak<Process>>) {
        *self.process.lock() = process;
    }

    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: u8) {
        self.priority
            .store(priority.clamp(PRIORITY_IDLE, PRIORITY_HIGHEST), Ordering::Relaxed);
    }

    pub fn base_priority(&self) -> u8 {
        self.base_priority.load(Ordering::Relaxed)
    }

    /// Raises priority by one increment, clamped at `HIGHEST`.
    pub fn boost(&self, increment: u8) {
        let _ = self
            .priority
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| {
                Some(core::cmp::min(p.saturating_add(increment), PRIORITY_HIGHEST))
            });
    }

    /// Lowers priority by one increment, clamped at `LOWEST`.
    pub fn demote(&self, increment: u8) {
        let _ = self
            .priority
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| {
                Some(core::cmp::max(p.saturating_sub(increment), PRIORITY_LOWEST))
            });
    }

    pub fn cpu_affinity(&self) -> CpuAffinity {
        self.cpu_affinity.load(Ordering::Relaxed)
    }

    pub fn set_cpu_affinity(&self, mask: CpuAffinity) {
        self.cpu_affinity.store(mask, Ordering::Relaxed);
    }

    pub fn quantum(&self) -> u64 {
        self.quantum.load(Ordering::Relaxed)
    }

    pub fn set_quantum(&self, ticks: u64) {
        self.quantum.store(ticks, Ordering::Relaxed);
    }

    /// Decrements the quantum by one tick, saturating at zero, and
    /// returns the new value.
    pub fn tick_quantum(&self) -> u64 {
        let previous = self
            .quantum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn ready_time(&self) -> u64 {
        self.ready_time.load(Ordering::Relaxed)
    }

    pub fn set_ready_time(&self, tick: u64) {
        self.ready_time.store(tick, Ordering::Relaxed);
    }

    pub fn in_scheduler_queue(&self) -> bool {
        self.in_scheduler_queue.load(Ordering::Relaxed)
    }

    pub fn set_in_scheduler_queue(&self, value: bool) {
        self.in_scheduler_queue.store(value, Ordering::Relaxed);
    }

    pub fn wait_reason(&self) -> Option<WaitReason> {
        *self.wait_reason.lock()
    }

    pub fn set_wait_reason(&self, reason: Option<WaitReason>) {
        *self.wait_reason.lock() = reason;
    }

    pub fn wait_object(&self) -> Option<Waitable> {
        self.wait_object.lock().clone()
    }

    pub fn set_wait_object(&self, object: Option<Waitable>) {
        *self.wait_object.lock() = object;
    }

    /// The pending wait-timeout timer, if `wait_for_single_object` was
    /// given a finite timeout. Cancelled and cleared by whichever of
    /// `signal_object`/`release_owned_objects` or the timeout DPC wins
    /// the race to wake this thread.
    pub fn wait_timer(&self) -> Option<ObjRef<Timer>> {
        self.wait_timer.lock().clone()
    }

    pub fn set_wait_timer(&self, timer: Option<ObjRef<Timer>>) {
        *self.wait_timer.lock() = timer;
    }

    pub fn take_wait_timer(&self) -> Option<ObjRef<Timer>> {
        self.wait_timer.lock().take()
    }

    pub fn add_owned_object(&self, object: Waitable) {
        self.owned_objects.lock().push(object);
    }

    /// Removes one matching entry from `owned_objects`, by object
    /// identity, if present.
    pub fn remove_owned_object(&self, target: &Waitable) {
        let mut guard = self.owned_objects.lock();
        if let Some(pos) = guard.iter().position(|o| o.ptr_eq(target)) {
            guard.remove(pos);
        }
    }

    pub fn take_owned_objects(&self) -> Vec<Waitable> {
        core::mem::take(&mut *self.owned_objects.lock())
    }

    pub fn set_kernel_stack(&self, stack: Box<[u8]>) {
        *self.kernel_stack.lock() = Some(stack);
    }

    pub fn take_kernel_stack(&self) -> Option<Box<[u8]>> {
        self.kernel_stack.lock().take()
    }

    pub fn set_user_stack(&self, stack: Box<[u8]>) {
        *self.user_stack.lock() = Some(stack);
    }

    pub fn take_user_stack(&self) -> Option<Box<[u8]>> {
        self.user_stack.lock().take()
    }

    pub fn set_arch_context(&self, ctx: ArchContext) {
        *self.arch_context.lock() = Some(ctx);
    }

    pub fn with_tls<R>(&self, f: impl FnOnce(&mut TlsTable) -> R) -> R {
        f(&mut self.tls.lock())
    }

    pub fn context_switch_count(&self) -> u64 {
        self.context_switch_count.load(Ordering::Relaxed)
    }

    pub fn record_context_switch(&self) {
        self.context_switch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cpu_time(&self) -> u64 {
        self.cpu_time.load(Ordering::Relaxed)
    }

    pub fn add_cpu_time(&self, ticks: u64) {
        self.cpu_time.fetch_add(ticks, Ordering::Relaxed);
    }

    pub fn io_count(&self) -> u64 {
        self.io_count.load(Ordering::Relaxed)
    }

    pub fn record_io(&self) {
        self.io_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = Some(name);
    }
}

impl KernelObject for Thread {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn destroy(&self) {
        debug_assert!(
            self.kernel_stack.lock().is_none(),
            "thread destroyed without releasing its kernel stack"
        );
        debug_assert!(
            self.owned_objects.lock().is_empty(),
            "thread destroyed while still owning waitable objects"
        );
    }
}

/// Process-wide registry of every live thread, plus stats mirrored by
/// the external interface. Owned by `Kernel`, never a global static.
pub struct ThreadRegistry {
    threads: SpinLock<BTreeMap<ThreadId, ObjRef<Thread>>>,
    total_created: AtomicU64,
    peak_active: AtomicU64,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: SpinLock::new(BTreeMap::new()),
            total_created: AtomicU64::new(0),
            peak_active: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, thread: ObjRef<Thread>) {
        let mut guard = self.threads.lock();
        guard.insert(thread.thread_id(), thread);
        self.total_created.fetch_add(1, Ordering::Relaxed);
        let active = guard.len() as u64;
        drop(guard);
        let _ = self
            .peak_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| {
                Some(core::cmp::max(p, active))
            });
    }

    pub fn remove(&self, tid: ThreadId) -> Option<ObjRef<Thread>> {
        self.threads.lock().remove(&tid)
    }

    pub fn get(&self, tid: ThreadId) -> Option<ObjRef<Thread>> {
        self.threads.lock().get(&tid).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn total_created(&self) -> u64 {
        self.total_created.load(Ordering::Relaxed)
    }

    pub fn peak_active(&self) -> u64 {
        self.peak_active.load(Ordering::Relaxed)
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
