// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! End-to-end scenarios exercising the scheduler, sync objects, and
//! timer/DPC machinery together through the public `Kernel` API.

use dslsos_kernel_core::arch::TestArch;
use dslsos_kernel_core::config::{AGING_THRESHOLD_TICKS, PRIORITY_NORMAL};
use dslsos_kernel_core::kernel::{Kernel, WaitOutcome};
use dslsos_kernel_core::object::ObjRef;
use dslsos_kernel_core::percpu::CpuTable;
use dslsos_kernel_core::process::Process;
use dslsos_kernel_core::sched::{Algorithm, Scheduler};
use dslsos_kernel_core::sync::{SyncMutex, Waitable};
use dslsos_kernel_core::thread::{Thread, ThreadState};
use dslsos_kernel_core::timer::{Timer, TimerKind};
use std::sync::{Arc, Weak};

fn new_kernel(cpu_count: usize, algorithm: Algorithm) -> Kernel {
    let arch = Arc::new(TestArch);
    let stacks = Arc::new(TestArch);
    let config = dslsos_kernel_core::config::KernelConfig {
        cpu_count,
        initial_algorithm: algorithm,
    };
    let kernel = Kernel::new(config, arch, stacks);
    kernel.scheduler_init().unwrap();
    kernel.scheduler_start().unwrap();
    kernel
}

/// Scenario 1: aging unblocks starvation.
///
/// A priority-30 CPU hog keeps winning a `Priority` scheduler's scan
/// while a priority-4 waiter sits in a low level. Once the waiter has
/// gone unscheduled past the aging threshold, `age_threads` boosts it
/// every pass it is re-queried, and it eventually gets picked.
#[test]
fn aging_unblocks_starvation() {
    let kernel = new_kernel(1, Algorithm::Priority);
    let process = kernel.create_process(None, 0, PRIORITY_NORMAL, false);
    let hog = kernel.create_thread(&process, 0x1000, 0, true).unwrap();
    hog.set_priority(30);
    let waiter = kernel.create_thread(&process, 0x1000, 0, true).unwrap();
    waiter.set_priority(4);
    let idle = kernel.create_thread(&process, 0x1000, 0, true).unwrap();

    let sched = Scheduler::new(1, Algorithm::Priority);
    sched.enqueue(hog.clone(), 0);
    sched.enqueue(waiter.clone(), 0);

    let cpus = CpuTable::new(1);
    cpus.get(0).set_idle_thread(idle);

    let mut now: u64 = 0;
    let mut current = None;
    let mut waiter_selected = false;

    for _ in 0..20 {
        let outcome = sched.select_next(0, &cpus, now, current.clone());
        if outcome.next.thread_id() == waiter.thread_id() {
            waiter_selected = true;
        }
        current = Some(outcome.next.clone());
        now += AGING_THRESHOLD_TICKS + 1;
    }

    assert!(sched.stats().starvation_boosts > 0);
    assert!(waiter.priority() > 4);
    assert!(waiter_selected, "waiter never received a quantum despite aging");
}

/// Scenario 2: fair-share enforcement converges to the weight ratio.
///
/// Group A (weight 3) and group B (weight 1) each run four CPU-bound
/// threads. Always handing the slice to whichever group has the
/// smallest usage relative to its weight converges to the 3:1 weight
/// ratio over enough picks.
#[test]
fn fair_share_enforcement_converges_to_weight_ratio() {
    let kernel = new_kernel(1, Algorithm::FairShare);
    let sched = Scheduler::new(1, Algorithm::FairShare);
    let group_a = sched.create_fair_share_group(3);
    let group_b = sched.create_fair_share_group(1);

    let process_a = Arc::new(Process::new(None, 0, PRIORITY_NORMAL, false));
    process_a.set_group_id(group_a);
    let process_b = Arc::new(Process::new(None, 0, PRIORITY_NORMAL, false));
    process_b.set_group_id(group_b);

    for _ in 0..4 {
        let t = kernel.create_thread(&process_a, 0x1000, 0, true).unwrap();
        sched.enqueue(t, 0);
        let t = kernel.create_thread(&process_b, 0x1000, 0, true).unwrap();
        sched.enqueue(t, 0);
    }

    let idle = kernel.create_thread(&process_a, 0x1000, 0, true).unwrap();
    let cpus = CpuTable::new(1);
    cpus.get(0).set_idle_thread(idle);

    let mut a_count = 0u64;
    let mut b_count = 0u64;
    let mut now = 0u64;

    for _ in 0..400 {
        let outcome = sched.select_next(0, &cpus, now, None);
        let group = outcome.next.process().and_then(|p| p.group_id());
        match group {
            Some(g) if g == group_a => {
                a_count += 1;
                sched.record_fair_share_usage(group_a, 1);
            }
            Some(g) if g == group_b => {
                b_count += 1;
                sched.record_fair_share_usage(group_b, 1);
            }
            _ => {}
        }
        outcome.next.set_state(ThreadState::Ready);
        sched.enqueue(outcome.next.clone(), now);
        now += 1;
    }

    let ratio = a_count as f64 / b_count.max(1) as f64;
    assert!(
        (ratio - 3.0).abs() / 3.0 < 0.05,
        "expected ~3:1 ratio, got {}:{} ({})",
        a_count,
        b_count,
        ratio
    );
}

/// Scenario 3: mutex handoff on owner death.
///
/// Two CPUs so owner and waiter can each be the "current" thread on
/// their own CPU: owner takes the mutex uncontested, waiter blocks on
/// it, owner terminates, and the termination's owned-object cleanup
/// hands the mutex straight to the waiter.
#[test]
fn mutex_handoff_on_owner_death() {
    let kernel = new_kernel(2, Algorithm::Priority);
    let process = kernel.create_process(None, 0, PRIORITY_NORMAL, false);

    let owner = kernel.create_thread(&process, 0x1000, 0, false).unwrap();
    let scheduled = kernel.schedule_next(0);
    assert_eq!(scheduled.thread_id(), owner.thread_id());

    let waiter = kernel.create_thread(&process, 0x1000, 0, false).unwrap();
    let scheduled = kernel.schedule_next(1);
    assert_eq!(scheduled.thread_id(), waiter.thread_id());

    let mutex = Waitable::Mutex(ObjRef::new(Arc::new(SyncMutex::new())));

    let outcome = kernel.wait_for_single_object(0, &mutex, None).unwrap();
    assert_eq!(outcome, WaitOutcome::Signaled);

    let _ = kernel.wait_for_single_object(1, &mutex, None);
    assert_eq!(waiter.state(), ThreadState::Waiting);

    kernel.terminate_thread(owner.thread_id()).unwrap();

    assert_eq!(waiter.state(), ThreadState::Ready);
    if let Waitable::Mutex(m) = &mutex {
        assert_eq!(m.owner().unwrap().thread_id(), waiter.thread_id());
    }
}

/// Scenario 4: a 50-tick periodic timer fires ~20 times across 1000
/// interrupts, then stays quiet once cancelled.
#[test]
fn periodic_timer_fires_expected_count_then_stops() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    fn bump(_ctx: usize) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    }
    COUNTER.store(0, Ordering::SeqCst);

    let kernel = new_kernel(1, Algorithm::Priority);
    let timer = ObjRef::new(Arc::new(Timer::new(TimerKind::Periodic)));
    kernel.set_timer(&timer, 50, 50, Some(bump), 0);

    for _ in 0..1000 {
        kernel.timer_interrupt(0);
    }
    let after_one_second = COUNTER.load(Ordering::SeqCst);
    assert!(
        (19..=20).contains(&after_one_second),
        "expected 19 or 20 firings, got {}",
        after_one_second
    );

    kernel.cancel_timer(&timer);
    for _ in 0..200 {
        kernel.timer_interrupt(0);
    }
    assert_eq!(COUNTER.load(Ordering::SeqCst), after_one_second);
}

/// Scenario 5: real-time preemption.
#[test]
fn real_time_preemption() {
    let kernel = new_kernel(1, Algorithm::Priority);
    let process = kernel.create_process(None, 0, PRIORITY_NORMAL, false);

    let current = kernel.create_thread(&process, 0x1000, 0, false).unwrap();
    let first = kernel.schedule_next(0);
    assert_eq!(first.thread_id(), current.thread_id());
    current.set_quantum(5);

    let rt_thread = kernel.create_thread(&process, 0x1000, 0, true).unwrap();
    rt_thread.set_priority(25);
    kernel.scheduler_add(rt_thread.clone()).unwrap();

    let before = kernel.scheduler_stats().context_switches;
    let next = kernel.schedule_next(0);
    assert_eq!(next.thread_id(), rt_thread.thread_id());
    assert_eq!(kernel.scheduler_stats().context_switches, before + 1);
    assert_eq!(current.state(), ThreadState::Ready);
}

/// Scenario 6: refcount destruction -- memory stays alive until the
/// last `ObjRef` drops, however many references are outstanding.
#[test]
fn refcount_destruction_exactly_once() {
    let kernel = new_kernel(1, Algorithm::Priority);
    let process = kernel.create_process(None, 0, PRIORITY_NORMAL, false);
    let thread = kernel.create_thread(&process, 0x1000, 0, true).unwrap();

    let extra_a = thread.clone();
    let extra_b = thread.clone();
    let weak: Weak<Thread> = Arc::downgrade(thread.as_arc());

    let tid = thread.thread_id();
    kernel.terminate_thread(tid).unwrap();
    assert!(weak.upgrade().is_some(), "thread freed while extra refs live");

    drop(thread);
    assert!(weak.upgrade().is_some());
    drop(extra_a);
    assert!(weak.upgrade().is_some());
    drop(extra_b);
    assert!(weak.upgrade().is_none(), "thread not freed after last reference dropped");
}
