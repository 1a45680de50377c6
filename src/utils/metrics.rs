//! Per-task execution counters for periodic contexts.
//!
//! Each periodic task owns one [`TaskStats`]; the scheduler keeps a shared
//! handle to every task's counters so the main thread can read them without
//! touching the task itself. Counters are relaxed atomics: values are
//! eventually consistent within one tick period.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Live counters updated by the periodic thread.
#[derive(Debug, Default)]
pub struct TaskStats {
    ticks: AtomicU64,
    overruns: AtomicU64,
    panics: AtomicU64,
    last_exec_us: AtomicU64,
    max_exec_us: AtomicU64,
}

pub type SharedTaskStats = Arc<TaskStats>;

/// Point-in-time copy of a task's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatsSnapshot {
    pub ticks: u64,
    /// Releases that started more than one full period past their deadline.
    pub overruns: u64,
    /// Ticks abandoned because the callback panicked.
    pub panics: u64,
    pub last_exec_us: u64,
    pub max_exec_us: u64,
}

impl TaskStats {
    pub fn new() -> SharedTaskStats {
        Arc::new(Self::default())
    }

    /// Records one completed (or abandoned) tick and how long it ran.
    #[inline]
    pub fn record_tick(&self, exec: Duration) {
        let us = exec.as_micros() as u64;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.last_exec_us.store(us, Ordering::Relaxed);
        self.max_exec_us.fetch_max(us, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskStatsSnapshot {
        TaskStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            last_exec_us: self.last_exec_us.load(Ordering::Relaxed),
            max_exec_us: self.max_exec_us.load(Ordering::Relaxed),
        }
    }
}
