//! periodic.rs
//! Fixed-period background execution, one dedicated thread per task.
//!
//! - Release schedule: SpinSleeper waits for each absolute release time, so the
//!   period does not drift with callback execution time.
//! - Serialized ticks: a task's callback sits behind a mutex; the background
//!   thread and `tick_once` can never run it concurrently.
//! - Fault isolation: a panicking callback is caught, logged and counted; the
//!   thread carries on with the next release.
//! - Overruns: when a release is missed by a whole period the missed releases are
//!   skipped rather than replayed back-to-back.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use log::{debug, error, info};
use parking_lot::Mutex;
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::utils::{
    error::{MonitorError, Result},
    metrics::{SharedTaskStats, TaskStats, TaskStatsSnapshot},
};

const MIN_PERIOD: Duration = Duration::from_millis(1);
// Longest uninterrupted wait, so `stop` is honoured promptly on long periods.
const STOP_POLL: Duration = Duration::from_millis(25);

type Callback = Box<dyn FnMut() + Send + 'static>;

/// Creates periodic tasks and keeps a registry of their counters.
#[derive(Clone, Default)]
pub struct PeriodicScheduler {
    registry: Arc<DashMap<String, SharedTaskStats>>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `callback` to `period`. The returned task is not started.
    pub fn schedule<F>(&self, name: impl Into<String>, period: Duration, callback: F) -> PeriodicTask
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let stats = TaskStats::new();
        self.registry.insert(name.clone(), stats.clone());

        PeriodicTask {
            name,
            period: period.max(MIN_PERIOD),
            priority: ThreadPriority::Max,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            stats,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Convenience for `task.start()`.
    pub fn start(&self, task: &mut PeriodicTask) -> Result<()> {
        task.start()
    }

    pub fn task_stats(&self, name: &str) -> Option<TaskStatsSnapshot> {
        self.registry.get(name).map(|s| s.value().snapshot())
    }

    /// Counters of every task created by this scheduler, sorted by task name.
    pub fn stats(&self) -> Vec<(String, TaskStatsSnapshot)> {
        let mut out: Vec<_> = self
            .registry
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// A callback bound to a period. Owned by the component that scheduled it;
/// dropping the task stops it.
pub struct PeriodicTask {
    name: String,
    period: Duration,
    priority: ThreadPriority,
    callback: Arc<Mutex<Callback>>,
    stats: SharedTaskStats,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// OS priority requested for the background thread. Must be set before `start`.
    pub fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> TaskStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawns the background thread and begins periodic invocation.
    pub fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(MonitorError::AlreadyRunning(self.name.clone()));
        }

        let name = self.name.clone();
        let period = self.period;
        let callback = self.callback.clone();
        let stats = self.stats.clone();
        let running = self.running.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn_with_priority(self.priority.clone(), move |priority| {
                if let Err(e) = priority {
                    debug!("[{}] running at default priority: {:?}", name, e);
                }
                run_loop(&name, period, &callback, &stats, &running);
            });

        match spawned {
            Ok(handle) => {
                info!("[{}] started, period={:?}", self.name, self.period);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Cooperative cancellation: an in-flight tick completes, then the thread exits.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[{}] periodic thread terminated abnormally", self.name);
            }
            info!("[{}] stopped", self.name);
        }
    }

    /// Runs exactly one tick on the calling thread, serialized with the
    /// background thread if it is running.
    pub fn tick_once(&self) {
        run_guarded(&self.name, &self.callback, &self.stats);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    name: &str,
    period: Duration,
    callback: &Mutex<Callback>,
    stats: &TaskStats,
    running: &AtomicBool,
) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut next_release = Instant::now() + period;

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_release {
            sleeper.sleep((next_release - now).min(STOP_POLL));
            continue;
        }

        let lateness = now - next_release;
        if lateness >= period {
            let missed = (lateness.as_nanos() / period.as_nanos()) as u32;
            next_release += period * missed;
            stats.record_overrun();
            debug!("[{}] overrun: skipped {} release(s)", name, missed);
        }

        run_guarded(name, callback, stats);
        next_release += period;
    }
}

fn run_guarded(name: &str, callback: &Mutex<Callback>, stats: &TaskStats) {
    let started = Instant::now();
    let outcome = {
        let mut cb = callback.lock();
        panic::catch_unwind(AssertUnwindSafe(|| (*cb)()))
    };

    if let Err(payload) = outcome {
        stats.record_panic();
        error!("[{}] tick panicked, skipping: {}", name, panic_message(&payload));
    }
    stats.record_tick(started.elapsed());
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn schedule_does_not_start() {
        let scheduler = PeriodicScheduler::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = hits.clone();
        let task = scheduler.schedule("idle", Duration::from_millis(1), move || {
            h.fetch_add(1, Ordering::Relaxed);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!task.is_running());
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn tick_once_survives_a_panicking_callback() {
        let scheduler = PeriodicScheduler::new();
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        let task = scheduler.schedule("flaky", Duration::from_millis(10), move || {
            let n = c.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                panic!("first tick blows up");
            }
        });

        task.tick_once();
        task.tick_once();

        let snap = task.stats();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.panics, 1);
    }

    #[test]
    fn double_start_is_rejected() {
        let scheduler = PeriodicScheduler::new();
        let mut task = scheduler.schedule("twice", Duration::from_millis(5), || {});
        task.start().unwrap();
        assert!(matches!(task.start(), Err(MonitorError::AlreadyRunning(_))));
        task.stop();
        assert!(!task.is_running());
    }

    #[test]
    fn zero_period_is_clamped() {
        let scheduler = PeriodicScheduler::new();
        let task = scheduler.schedule("zero", Duration::ZERO, || {});
        assert_eq!(task.period(), MIN_PERIOD);
    }

    #[test]
    fn registry_lists_tasks_by_name() {
        let scheduler = PeriodicScheduler::new();
        let b = scheduler.schedule("b-task", Duration::from_millis(5), || {});
        let a = scheduler.schedule("a-task", Duration::from_millis(5), || {});
        a.tick_once();

        let names: Vec<_> = scheduler.stats().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a-task".to_string(), "b-task".to_string()]);
        assert_eq!(scheduler.task_stats("a-task").unwrap().ticks, 1);
        drop(b);
    }
}
