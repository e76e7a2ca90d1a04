// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The multi-level feedback scheduler.
//!
//! Everything in §3's "scheduler state" -- the eight priority levels,
//! the real-time FIFO, the algorithm selector, CPU topology, fair
//! share groups, the load balancer's bookkeeping, and the statistics
//! counters -- lives behind one lock. That matches §5's locking
//! discipline literally ("a single global scheduler lock") and avoids
//! the lock-ordering bugs a finer-grained split would invite for very
//! little actual contention relief, since every one of these fields
//! is touched on nearly every `select_next`.

use crate::config::{
    FAIR_SHARE_DECAY_PERMILLE, LOAD_BALANCE_INTERVAL_TICKS, LOAD_BALANCE_THRESHOLD, N_LEVELS,
    PREEMPTION_HYSTERESIS, PRIORITY_REAL_TIME_THRESHOLD,
};
use crate::object::ObjRef;
use crate::percpu::{CpuId, CpuTable};
use crate::spinlock::SpinLock;
use crate::thread::{Thread, ThreadState};
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
    Priority,
    FairShare,
    LoadBalanced,
    Adaptive,
}

#[derive(Debug, Clone, Copy)]
pub struct CpuInfo {
    pub load: u8,
    pub online: bool,
    pub temperature: u8,
}

impl Default for CpuInfo {
    fn default() -> Self {
        Self {
            load: 0,
            online: true,
            temperature: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FairShareGroup {
    pub group_id: u64,
    pub weight: u32,
    pub cpu_time_used: u64,
    pub cpu_time_quota: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct LoadBalancerConfig {
    pub enabled: bool,
    pub interval: u64,
    pub threshold: u8,
    pub last_balance_tick: u64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: LOAD_BALANCE_INTERVAL_TICKS,
            threshold: LOAD_BALANCE_THRESHOLD,
            last_balance_tick: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub total_schedules: u64,
    pub context_switches: u64,
    pub starvation_boosts: u64,
    pub balance_ops: u64,
}

struct PriorityLevel {
    queue: VecDeque<ObjRef<Thread>>,
}

impl PriorityLevel {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

pub fn level_for_priority(priority: u8) -> usize {
    core::cmp::min((priority / 4) as usize, N_LEVELS - 1)
}

struct SchedulerState {
    levels: Vec<PriorityLevel>,
    real_time_queue: VecDeque<ObjRef<Thread>>,
    algorithm: Algorithm,
    cpu_topology: Vec<CpuInfo>,
    fair_share_groups: Vec<FairShareGroup>,
    next_group_id: u64,
    load_balancer: LoadBalancerConfig,
    last_fair_share_decay_tick: u64,
    stats: SchedulerStats,
}

pub struct Scheduler {
    state: SpinLock<SchedulerState>,
}

impl Scheduler {
    pub fn new(cpu_count: usize, algorithm: Algorithm) -> Self {
        Self {
            state: SpinLock::new(SchedulerState {
                levels: (0..N_LEVELS).map(|_| PriorityLevel::new()).collect(),
                real_time_queue: VecDeque::new(),
                algorithm,
                cpu_topology: vec![CpuInfo::default(); cpu_count],
                fair_share_groups: Vec::new(),
                next_group_id: 1,
                load_balancer: LoadBalancerConfig::default(),
                last_fair_share_decay_tick: 0,
                stats: SchedulerStats::default(),
            }),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.state.lock().algorithm
    }

    pub fn set_algorithm(&self, algorithm: Algorithm) {
        self.state.lock().algorithm = algorithm;
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats
    }

    pub fn set_cpu_load(&self, cpu: CpuId, load: u8) {
        let mut state = self.state.lock();
        if let Some(info) = state.cpu_topology.get_mut(cpu) {
            info.load = load;
        }
    }

    pub fn create_fair_share_group(&self, weight: u32) -> u64 {
        let mut state = self.state.lock();
        let group_id = state.next_group_id;
        state.next_group_id += 1;
        state.fair_share_groups.push(FairShareGroup {
            group_id,
            weight,
            cpu_time_used: 0,
            cpu_time_quota: 0,
        });
        group_id
    }

    /// §4.6 `enqueue`.
    pub fn enqueue(&self, thread: ObjRef<Thread>, now: u64) {
        let mut state = self.state.lock();
        Self::enqueue_locked(&mut state, thread, now);
    }

    fn enqueue_locked(state: &mut SchedulerState, thread: ObjRef<Thread>, now: u64) {
        thread.set_in_scheduler_queue(true);
        thread.set_ready_time(now);
        thread.set_state(ThreadState::Ready);
        if thread.priority() >= PRIORITY_REAL_TIME_THRESHOLD {
            state.real_time_queue.push_back(thread);
        } else {
            let level = level_for_priority(thread.priority());
            state.levels[level].queue.push_back(thread);
        }
    }

    /// §4.6 `dequeue`: unlink a thread from wherever it currently
    /// sits, used when a thread is terminated while still `Ready`.
    pub fn dequeue(&self, tid: crate::thread::ThreadId) -> Option<ObjRef<Thread>> {
        let mut state = self.state.lock();
        if let Some(pos) = state.real_time_queue.iter().position(|t| t.thread_id() == tid) {
            let t = state.real_time_queue.remove(pos).unwrap();
            t.set_in_scheduler_queue(false);
            return Some(t);
        }
        for level in state.levels.iter_mut() {
            if let Some(pos) = level.queue.iter().position(|t| t.thread_id() == tid) {
                let t = level.queue.remove(pos).unwrap();
                t.set_in_scheduler_queue(false);
                return Some(t);
            }
        }
        None
    }

    /// §4.8 preemption rule.
    pub fn should_preempt(current_priority: u8, current_quantum: u64, candidate_priority: u8) -> bool {
        if candidate_priority >= PRIORITY_REAL_TIME_THRESHOLD && current_priority < PRIORITY_REAL_TIME_THRESHOLD {
            return true;
        }
        if candidate_priority > current_priority.saturating_add(PREEMPTION_HYSTERESIS) {
            return true;
        }
        if current_quantum == 0 {
            return true;
        }
        false
    }

    /// §4.8 `age_threads`. Levels 1..=7 only; level 0 and the
    /// real-time queue are never aged.
    fn age_threads(state: &mut SchedulerState, now: u64) {
        use crate::config::{AGING_THRESHOLD_TICKS, PRIORITY_INCREMENT};

        for level_idx in 1..N_LEVELS {
            let mut requeue = Vec::new();
            {
                let queue = &mut state.levels[level_idx].queue;
                let mut i = 0;
                while i < queue.len() {
                    let aged = now.saturating_sub(queue[i].ready_time()) > AGING_THRESHOLD_TICKS;
                    if aged {
                        let t = queue.remove(i).unwrap();
                        t.boost(PRIORITY_INCREMENT);
                        t.set_ready_time(now);
                        requeue.push(t);
                    } else {
                        i += 1;
                    }
                }
            }
            for t in requeue {
                state.stats.starvation_boosts += 1;
                let new_level = level_for_priority(t.priority());
                if t.priority() >= PRIORITY_REAL_TIME_THRESHOLD {
                    state.real_time_queue.push_back(t);
                } else {
                    state.levels[new_level].queue.push_back(t);
                }
            }
        }
    }

    /// §4.10 fair share quota recompute and per-second decay. Decay
    /// only fires once per elapsed second of ticks -- applying it on
    /// every `select_next` call would wash usage back toward zero
    /// faster than groups can accumulate it, and the scan below would
    /// never converge on the configured weight ratio.
    fn update_fair_share_quota(state: &mut SchedulerState, now: u64) {
        let total_weight: u64 = state.fair_share_groups.iter().map(|g| g.weight as u64).sum();
        if total_weight == 0 {
            return;
        }
        for g in state.fair_share_groups.iter_mut() {
            g.cpu_time_quota = 100 * g.weight as u64 / total_weight;
        }
        if now.saturating_sub(state.last_fair_share_decay_tick) >= crate::config::TICKS_PER_SECOND {
            state.last_fair_share_decay_tick = now;
            for g in state.fair_share_groups.iter_mut() {
                g.cpu_time_used = g.cpu_time_used * FAIR_SHARE_DECAY_PERMILLE / 1000;
            }
        }
    }

    pub fn record_fair_share_usage(&self, group_id: u64, ticks: u64) {
        let mut state = self.state.lock();
        if let Some(g) = state.fair_share_groups.iter_mut().find(|g| g.group_id == group_id) {
            g.cpu_time_used += ticks;
        }
    }

    pub fn fair_share_usage(&self, group_id: u64) -> Option<u64> {
        let state = self.state.lock();
        state
            .fair_share_groups
            .iter()
            .find(|g| g.group_id == group_id)
            .map(|g| g.cpu_time_used)
    }

    /// §4.9: at most once per `load_balancer.interval`, record an
    /// imbalance if max-min load exceeds the threshold. Per §4.9 and
    /// §9, no thread is ever actually migrated here: `LoadBalanced`
    /// selection below is what biases affinity-free threads toward
    /// the least-loaded CPU, lazily.
    fn run_load_balance(state: &mut SchedulerState, now: u64) {
        if !state.load_balancer.enabled {
            return;
        }
        if now.saturating_sub(state.load_balancer.last_balance_tick) < state.load_balancer.interval {
            return;
        }
        state.load_balancer.last_balance_tick = now;

        let online: Vec<u8> = state
            .cpu_topology
            .iter()
            .filter(|c| c.online)
            .map(|c| c.load)
            .collect();
        if let (Some(&max), Some(&min)) = (online.iter().max(), online.iter().min()) {
            if max.saturating_sub(min) > state.load_balancer.threshold {
                state.stats.balance_ops += 1;
            }
        }
    }

    fn least_loaded_cpu(state: &SchedulerState) -> Option<CpuId> {
        state
            .cpu_topology
            .iter()
            .enumerate()
            .filter(|(_, c)| c.online)
            .min_by_key(|(_, c)| c.load)
            .map(|(id, _)| id)
    }

    /// Pops the best ready candidate without deciding preemption.
    /// Returns `None` if every queue (real-time and all levels) is
    /// empty.
    fn pop_best(state: &mut SchedulerState, cpu: CpuId) -> Option<ObjRef<Thread>> {
        if let Some(t) = state.real_time_queue.pop_front() {
            return Some(t);
        }

        match state.algorithm {
            Algorithm::RoundRobin => Self::pop_scan(state, 0..N_LEVELS),
            Algorithm::Priority => Self::pop_scan(state, (0..N_LEVELS).rev()),
            Algorithm::FairShare => Self::pop_fair_share(state),
            Algorithm::LoadBalanced => Self::pop_load_balanced(state, cpu),
            Algorithm::Adaptive => {
                let system_load: u32 = state.cpu_topology.iter().map(|c| c.load as u32).sum();
                let next_algorithm = if system_load > 80 {
                    Algorithm::LoadBalanced
                } else if system_load < 20 {
                    Algorithm::Priority
                } else {
                    Algorithm::FairShare
                };
                state.algorithm = next_algorithm;
                match next_algorithm {
                    Algorithm::LoadBalanced => Self::pop_load_balanced(state, cpu),
                    Algorithm::Priority => Self::pop_scan(state, (0..N_LEVELS).rev()),
                    Algorithm::FairShare => Self::pop_fair_share(state),
                    _ => unreachable!(),
                }
            }
        }
    }

    fn pop_scan(state: &mut SchedulerState, order: impl Iterator<Item = usize>) -> Option<ObjRef<Thread>> {
        for level in order {
            if let Some(t) = state.levels[level].queue.pop_front() {
                return Some(t);
            }
        }
        None
    }

    fn pop_fair_share(state: &mut SchedulerState) -> Option<ObjRef<Thread>> {
        // Weighted virtual service: the group with the least usage
        // relative to its weight goes next. Comparing `used / weight`
        // via a scaled integer avoids floating point and avoids the
        // division-by-small-weight blowup a direct ratio would have.
        const SCALE: u128 = 1_000_000;
        let best_group = state
            .fair_share_groups
            .iter()
            .min_by_key(|g| g.cpu_time_used as u128 * SCALE / g.weight.max(1) as u128)
            .map(|g| g.group_id);

        if let Some(group_id) = best_group {
            for level in (0..N_LEVELS).rev() {
                let pos = state.levels[level].queue.iter().position(|t| {
                    t.process()
                        .and_then(|p| p.group_id())
                        .map(|g| g == group_id)
                        .unwrap_or(false)
                });
                if let Some(pos) = pos {
                    return state.levels[level].queue.remove(pos);
                }
            }
        }
        Self::pop_scan(state, (0..N_LEVELS).rev())
    }

    fn pop_load_balanced(state: &mut SchedulerState, cpu: CpuId) -> Option<ObjRef<Thread>> {
        let target = Self::least_loaded_cpu(state).unwrap_or(cpu);
        for level in (0..N_LEVELS).rev() {
            let pos = state.levels[level].queue.iter().position(|t| {
                let mask = t.cpu_affinity();
                mask == 0 || (mask & (1u64 << target)) != 0
            });
            if let Some(pos) = pos {
                return state.levels[level].queue.remove(pos);
            }
        }
        Self::pop_scan(state, (0..N_LEVELS).rev())
    }

    fn requeue_front(state: &mut SchedulerState, thread: ObjRef<Thread>) {
        if thread.priority() >= PRIORITY_REAL_TIME_THRESHOLD {
            state.real_time_queue.push_front(thread);
        } else {
            let level = level_for_priority(thread.priority());
            state.levels[level].queue.push_front(thread);
        }
    }

    /// §4.7 `select_next` / §4.8 "compare against current thread".
    ///
    /// `current` is the thread presently `Running` on `cpu`, if any.
    /// Returns the thread that should occupy the CPU afterward --
    /// which may simply be `current` again, unchanged, if nothing
    /// ready warrants preemption.
    pub fn select_next(
        &self,
        cpu: CpuId,
        cpus: &CpuTable,
        now: u64,
        current: Option<ObjRef<Thread>>,
    ) -> SelectOutcome {
        let mut state = self.state.lock();
        state.stats.total_schedules += 1;
        Self::run_load_balance(&mut state, now);
        Self::age_threads(&mut state, now);
        if state.algorithm == Algorithm::FairShare {
            Self::update_fair_share_quota(&mut state, now);
        }

        let candidate = Self::pop_best(&mut state, cpu);

        let outcome = match (current, candidate) {
            (Some(cur), Some(cand)) => {
                if cur.state() == ThreadState::Running
                    && !Self::should_preempt(cur.priority(), cur.quantum(), cand.priority())
                {
                    Self::requeue_front(&mut state, cand);
                    SelectOutcome {
                        next: cur,
                        switched: false,
                    }
                } else {
                    if cur.state() == ThreadState::Running {
                        Self::enqueue_locked(&mut state, cur, now);
                    }
                    cand.set_in_scheduler_queue(false);
                    state.stats.context_switches += 1;
                    SelectOutcome {
                        next: cand,
                        switched: true,
                    }
                }
            }
            (Some(cur), None) if cur.state() == ThreadState::Running => SelectOutcome {
                next: cur,
                switched: false,
            },
            (_, Some(cand)) => {
                cand.set_in_scheduler_queue(false);
                state.stats.context_switches += 1;
                SelectOutcome {
                    next: cand,
                    switched: true,
                }
            }
            (_, None) => {
                let idle = cpus
                    .get(cpu)
                    .idle_thread()
                    .expect("idle thread must be installed before scheduling starts");
                state.stats.context_switches += 1;
                SelectOutcome {
                    next: idle,
                    switched: true,
                }
            }
        };

        outcome
    }
}

pub struct SelectOutcome {
    pub next: ObjRef<Thread>,
    pub switched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::percpu::CpuTable;
    use alloc::sync::Arc;

    fn thread_with_priority(priority: u8) -> ObjRef<Thread> {
        let t = ObjRef::new(Arc::new(Thread::new(priority, false)));
        t.set_priority(priority);
        t
    }

    #[test]
    fn round_robin_scans_from_level_zero() {
        let sched = Scheduler::new(1, Algorithm::RoundRobin);
        let low = thread_with_priority(1);
        let high = thread_with_priority(20);
        sched.enqueue(low.clone(), 0);
        sched.enqueue(high, 0);

        let cpus = CpuTable::new(1);
        let idle = thread_with_priority(0);
        cpus.get(0).set_idle_thread(idle);

        let outcome = sched.select_next(0, &cpus, 0, None);
        assert_eq!(outcome.next.thread_id(), low.thread_id());
    }

    #[test]
    fn priority_scans_from_level_seven_downward() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let low = thread_with_priority(1);
        let high = thread_with_priority(20);
        sched.enqueue(low, 0);
        sched.enqueue(high.clone(), 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        let outcome = sched.select_next(0, &cpus, 0, None);
        assert_eq!(outcome.next.thread_id(), high.thread_id());
    }

    #[test]
    fn real_time_thread_preempts_normal_current() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let current = thread_with_priority(8);
        current.set_state(ThreadState::Running);
        current.set_quantum(5);

        let rt = thread_with_priority(25);
        sched.enqueue(rt.clone(), 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        let outcome = sched.select_next(0, &cpus, 0, Some(current.clone()));
        assert!(outcome.switched);
        assert_eq!(outcome.next.thread_id(), rt.thread_id());
        assert_eq!(sched.stats().context_switches, 1);
        assert_eq!(current.state(), ThreadState::Ready);
    }

    #[test]
    fn hysteresis_keeps_current_running_for_small_priority_gap() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let current = thread_with_priority(10);
        current.set_state(ThreadState::Running);
        current.set_quantum(5);

        let candidate = thread_with_priority(11);
        sched.enqueue(candidate, 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        let outcome = sched.select_next(0, &cpus, 0, Some(current.clone()));
        assert!(!outcome.switched);
        assert_eq!(outcome.next.thread_id(), current.thread_id());
    }

    #[test]
    fn exhausted_quantum_forces_preemption_at_equal_priority() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let current = thread_with_priority(10);
        current.set_state(ThreadState::Running);
        current.set_quantum(0);

        let candidate = thread_with_priority(10);
        sched.enqueue(candidate.clone(), 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        let outcome = sched.select_next(0, &cpus, 0, Some(current));
        assert!(outcome.switched);
        assert_eq!(outcome.next.thread_id(), candidate.thread_id());
    }

    #[test]
    fn aging_boosts_starved_thread_and_counts_it() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let waiter = thread_with_priority(4);
        sched.enqueue(waiter.clone(), 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        // Past the 10s aging threshold.
        let _ = sched.select_next(0, &cpus, crate::config::AGING_THRESHOLD_TICKS + 1, None);
        assert!(sched.stats().starvation_boosts > 0);
        assert!(waiter.priority() > 4);
    }

    #[test]
    fn level_zero_is_never_aged() {
        let sched = Scheduler::new(1, Algorithm::Priority);
        let waiter = thread_with_priority(0);
        sched.enqueue(waiter.clone(), 0);

        let cpus = CpuTable::new(1);
        cpus.get(0).set_idle_thread(thread_with_priority(0));

        let _ = sched.select_next(0, &cpus, crate::config::AGING_THRESHOLD_TICKS * 2, None);
        assert_eq!(waiter.priority(), 0);
    }

    #[test]
    fn dequeue_removes_from_whichever_queue_holds_the_thread() {
        let sched = Scheduler::new(1, Algorithm::RoundRobin);
        let t = thread_with_priority(5);
        sched.enqueue(t.clone(), 0);
        let removed = sched.dequeue(t.thread_id());
        assert!(removed.is_some());
        assert!(!t.in_scheduler_queue());
    }
}
