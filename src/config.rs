// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel tunables
//!
//! Time is measured in 100 ns ticks throughout, matching the
//! `LARGE_INTEGER` convention this kernel has always used for
//! `KeQueryTimeTicks`.

/// Maximum number of CPUs this build supports.
pub const MAX_CPUS: usize = 32;

/// Number of non-real-time MLFQ priority levels.
pub const N_LEVELS: usize = 8;

// --- Priority constants (0..=31, real-time cutoff at 24) ---

pub const PRIORITY_IDLE: u8 = 0;
pub const PRIORITY_LOWEST: u8 = 1;
pub const PRIORITY_NORMAL: u8 = 8;
pub const PRIORITY_REAL_TIME_THRESHOLD: u8 = 24;
pub const PRIORITY_HIGHEST: u8 = 31;
pub const PRIORITY_INCREMENT: u8 = 2;

/// Ticks per second at the configured tick rate (100 ns ticks).
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Aging threshold: 10 seconds of continuous ready-queue residency.
pub const AGING_THRESHOLD_TICKS: u64 = 10 * TICKS_PER_SECOND;

/// Base time slice for MLFQ level `n` (0-indexed): `10 * (n + 1)` ms.
pub const fn base_time_slice_ticks(level: usize) -> u64 {
    (10 * (level as u64 + 1)) * (TICKS_PER_SECOND / 1000)
}

/// Preemption hysteresis: a candidate must exceed the current thread's
/// priority by more than this to force a switch.
pub const PREEMPTION_HYSTERESIS: u8 = 2;

/// Default load-balance sampling interval.
pub const LOAD_BALANCE_INTERVAL_TICKS: u64 = TICKS_PER_SECOND;

/// Load imbalance (percentage points) that triggers a balance op.
pub const LOAD_BALANCE_THRESHOLD: u8 = 10;

/// Fair-share `used` decay factor applied once per second, expressed
/// as a permille (900 == 0.9).
pub const FAIR_SHARE_DECAY_PERMILLE: u64 = 900;

// --- Thread-local storage ---

pub const TLS_INITIAL_SLOTS: usize = 64;
pub const TLS_EXPANSION_STEP: usize = 32;
pub const TLS_MAX_SLOTS: usize = 1024;

// --- Stacks ---

pub const KERNEL_STACK_SIZE: usize = 16 * 1024;
pub const USER_STACK_SIZE: usize = 1024 * 1024;

/// Runtime-chosen parameters, passed once when a `Kernel` is built.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub cpu_count: usize,
    pub initial_algorithm: crate::sched::Algorithm,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            cpu_count: 1,
            initial_algorithm: crate::sched::Algorithm::RoundRobin,
        }
    }
}
