// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Timer objects and the timer queue.
//!
//! Entries are kept in a plain sorted `Vec<ObjRef<Timer>>` rather than
//! the raw-pointer binary heap this subsystem used to be built on:
//! `ObjRef` already gives every entry a stable, owned address, so
//! there is no need to reach for unsafe pointer arithmetic to sort a
//! handful of pending timers.

use crate::object::{KernelObject, ObjRef, ObjectHeader, ObjectType};
use crate::spinlock::SpinLock;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

pub const TICKS_PER_SECOND: i64 = crate::config::TICKS_PER_SECOND as i64;

pub const fn ns_to_ticks(ns: i64) -> i64 {
    ns / 100
}
pub const fn us_to_ticks(us: i64) -> i64 {
    us * 10
}
pub const fn ms_to_ticks(ms: i64) -> i64 {
    ms * 10_000
}
pub const fn s_to_ticks(s: i64) -> i64 {
    s * TICKS_PER_SECOND
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Pending,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Periodic,
}

/// Opaque DPC callback reference: a bare function pointer plus a
/// caller-supplied context word, matching the boundary `set_timer`
/// crosses in §4.11 without requiring a generic parameter on `Timer`.
pub type DpcRoutine = fn(usize);

pub struct Timer {
    header: ObjectHeader,
    /// Absolute due time in 100 ns ticks once `Pending`.
    due_time: AtomicI64,
    period: AtomicI64,
    state: SpinLock<TimerState>,
    kind: SpinLock<TimerKind>,
    dpc_routine: SpinLock<Option<DpcRoutine>>,
    dpc_context: AtomicUsize,
}

impl Timer {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            header: ObjectHeader::new(ObjectType::Timer),
            due_time: AtomicI64::new(0),
            period: AtomicI64::new(0),
            state: SpinLock::new(TimerState::Idle),
            kind: SpinLock::new(kind),
            dpc_routine: SpinLock::new(None),
            dpc_context: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> TimerState {
        *self.state.lock()
    }

    pub fn due_time(&self) -> i64 {
        self.due_time.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> i64 {
        self.period.load(Ordering::Relaxed)
    }

    pub fn is_periodic(&self) -> bool {
        matches!(*self.kind.lock(), TimerKind::Periodic)
    }
}

impl KernelObject for Timer {
    fn header(&self) -> &ObjectHeader {
        &self.header
    }
}

/// A timer that fired, paired with the callback it should invoke via
/// a DPC.
pub struct ExpiredTimer {
    pub timer: ObjRef<Timer>,
    pub dpc_routine: Option<DpcRoutine>,
    pub dpc_context: usize,
}

pub struct TimerQueue {
    entries: SpinLock<Vec<ObjRef<Timer>>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
        }
    }

    fn remove_locked(entries: &mut Vec<ObjRef<Timer>>, timer: &ObjRef<Timer>) {
        if let Some(pos) = entries
            .iter()
            .position(|t| alloc::sync::Arc::ptr_eq(t.as_arc(), timer.as_arc()))
        {
            entries.remove(pos);
        }
    }

    /// §4.11: if already inserted, cancel first. A negative `due` is
    /// relative to `now`; the absolute deadline is `now - due` (the
    /// convention this subsystem has always used, preserved
    /// verbatim). Inserted sorted ascending by due time.
    pub fn set_timer(
        &self,
        timer: &ObjRef<Timer>,
        due: i64,
        period: i64,
        now: i64,
        dpc_routine: Option<DpcRoutine>,
        dpc_context: usize,
    ) {
        let mut entries = self.entries.lock();
        Self::remove_locked(&mut entries, timer);

        let absolute_due = if due < 0 { now - due } else { due };
        timer.due_time.store(absolute_due, Ordering::Relaxed);
        timer.period.store(period, Ordering::Relaxed);
        *timer.dpc_routine.lock() = dpc_routine;
        timer.dpc_context.store(dpc_context, Ordering::Relaxed);
        *timer.state.lock() = TimerState::Pending;

        let pos = entries
            .iter()
            .position(|t| t.due_time() > absolute_due)
            .unwrap_or(entries.len());
        entries.insert(pos, timer.clone());
    }

    /// §4.11 / §8: returns whether the timer was active (`Pending`)
    /// before cancellation.
    pub fn cancel_timer(&self, timer: &ObjRef<Timer>) -> bool {
        let mut entries = self.entries.lock();
        let was_pending = *timer.state.lock() == TimerState::Pending;
        if was_pending {
            Self::remove_locked(&mut entries, timer);
            *timer.state.lock() = TimerState::Cancelled;
        }
        was_pending
    }

    /// §4.11: walk the head while due, popping and re-inserting
    /// periodic timers with their deadline advanced by one period.
    pub fn process_expired(&self, now: i64) -> Vec<ExpiredTimer> {
        let mut expired = Vec::new();
        let mut entries = self.entries.lock();

        while let Some(head) = entries.first() {
            if head.due_time() > now {
                break;
            }
            let timer = entries.remove(0);
            *timer.state.lock() = TimerState::Expired;

            let routine = *timer.dpc_routine.lock();
            let context = timer.dpc_context.load(Ordering::Relaxed);

            if timer.is_periodic() {
                let new_due = timer.due_time() + timer.period();
                timer.due_time.store(new_due, Ordering::Relaxed);
                *timer.state.lock() = TimerState::Pending;
                let pos = entries
                    .iter()
                    .position(|t| t.due_time() > new_due)
                    .unwrap_or(entries.len());
                entries.insert(pos, timer.clone());
            }

            expired.push(ExpiredTimer {
                timer,
                dpc_routine: routine,
                dpc_context: context,
            });
        }

        expired
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
