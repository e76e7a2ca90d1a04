// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Deferred procedure calls.
//!
//! Queued from interrupt context (typically by `process_expired_timers`),
//! run at the tail of interrupt handling once the spinlock nesting
//! level drops back to zero. A DPC routine may queue further DPCs;
//! `drain` keeps pulling from the queue until it is empty rather than
//! taking one fixed-size snapshot, so a self-requeuing routine is
//! still serviced in the same drain pass.

use crate::spinlock::{irql_depth, SpinLock};
use alloc::collections::VecDeque;

pub type DpcRoutine = fn(usize);

#[derive(Clone, Copy)]
pub struct Dpc {
    pub routine: DpcRoutine,
    pub context: usize,
    pub priority: u8,
}

/// Per-CPU FIFO of pending DPCs. One of these lives in each
/// `PerCpu` entry in the real layout; kept as a standalone type here
/// since its drain logic doesn't need anything else from `PerCpu`.
pub struct DpcQueue {
    entries: SpinLock<VecDeque<Dpc>>,
    processing: SpinLock<bool>,
}

impl DpcQueue {
    pub fn new() -> Self {
        Self {
            entries: SpinLock::new(VecDeque::new()),
            processing: SpinLock::new(false),
        }
    }

    pub fn enqueue(&self, dpc: Dpc) {
        self.entries.lock().push_back(dpc);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drains and runs every pending DPC, including ones routines
    /// queue while running. No-op if the nesting level is non-zero
    /// (§4.11: DPCs only dispatch with no spinlock held) or if a
    /// drain is already in progress on this queue.
    pub fn drain(&self) -> usize {
        if irql_depth() != 0 {
            return 0;
        }

        {
            let mut processing = self.processing.lock();
            if *processing {
                return 0;
            }
            *processing = true;
        }

        let mut ran = 0;
        loop {
            let next = self.entries.lock().pop_front();
            match next {
                Some(dpc) => {
                    (dpc.routine)(dpc.context);
                    ran += 1;
                }
                None => break,
            }
        }

        *self.processing.lock() = false;
        ran
    }
}

impl Default for DpcQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn bump(_ctx: usize) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn drain_runs_every_queued_dpc() {
        COUNTER.store(0, Ordering::SeqCst);
        let queue = DpcQueue::new();
        queue.enqueue(Dpc {
            routine: bump,
            context: 0,
            priority: 0,
        });
        queue.enqueue(Dpc {
            routine: bump,
            context: 0,
            priority: 0,
        });
        let ran = queue.drain();
        assert_eq!(ran, 2);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_refuses_while_a_lock_is_held() {
        let queue = DpcQueue::new();
        queue.enqueue(Dpc {
            routine: bump,
            context: 0,
            priority: 0,
        });
        let guard_lock: SpinLock<()> = SpinLock::new(());
        let _g = guard_lock.lock();
        assert_eq!(queue.drain(), 0);
        assert_eq!(queue.len(), 1);
    }
}
