//! dispatcher.rs
//! Two-tier robot log: urgent lines go straight to the transports on the
//! calling thread, everything else is queued and flushed by a periodic task.
//!
//! Backlog discipline:
//! - Producers take the backlog lock only long enough to push one record.
//! - The flush swaps the whole backlog out under the lock and writes to the
//!   transports after releasing it, so a producer never waits on transport I/O.
//! - Flush cycles are serialized end to end (take and send), so a manual flush
//!   overlapping the background one cannot reorder lines.
//! - If a producer holds the lock when a flush fires, the flush backs off and
//!   leaves the backlog for the next period. After `MAX_DEFERRED_FLUSHES`
//!   consecutive back-offs it waits for the lock instead.
//! - The backlog is bounded; records past capacity are dropped and counted.
//!
//! Simulation mode mirrors every rendered line into a session logfile at render
//! time, before any buffering.

use std::{
    fs::File,
    io::{LineWriter, Write},
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use thread_priority::ThreadPriority;

use crate::logging::{
    record::{CallSite, Level, LogRecord},
    transport::LogTransport,
};
use crate::scheduler::periodic::{PeriodicScheduler, PeriodicTask};
use crate::utils::{
    config::LoggingConfig,
    error::{MonitorError, Result},
};

const MAX_DEFERRED_FLUSHES: u32 = 3;

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This many records were handed to the transports.
    Flushed(usize),
    /// The backlog was busy; nothing was drained.
    Deferred,
}

struct DispatcherInner {
    boot: Instant,
    backlog: Mutex<Vec<LogRecord>>,
    capacity: usize,
    dropped: AtomicU64,
    deferred: AtomicU32,
    // Held across take-and-send; producers never touch it.
    flushing: Mutex<()>,
    transports: RwLock<Vec<Arc<dyn LogTransport>>>,
    session_log: Option<Mutex<LineWriter<File>>>,
}

impl DispatcherInner {
    fn since_boot(&self) -> Duration {
        self.boot.elapsed()
    }

    fn mirror_to_session_log(&self, line: &str) {
        if let Some(file) = &self.session_log {
            if let Err(e) = writeln!(file.lock(), "{}", line) {
                warn!("[LogDispatcher] failed to reflect line to session logfile: {}", e);
            }
        }
    }

    fn send(&self, line: &str) {
        for transport in self.transports.read().iter() {
            if let Err(e) = transport.write_line(line) {
                warn!("[LogDispatcher] transport `{}` failed: {}", transport.name(), e);
            }
        }
    }

    fn enqueue(&self, record: LogRecord) -> bool {
        let mut backlog = self.backlog.lock();
        if backlog.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        backlog.push(record);
        true
    }

    fn flush(&self) -> FlushOutcome {
        let _cycle = self.flushing.lock();
        let drained = match self.backlog.try_lock() {
            Some(mut backlog) => std::mem::take(&mut *backlog),
            None => {
                let streak = self.deferred.fetch_add(1, Ordering::Relaxed) + 1;
                if streak < MAX_DEFERRED_FLUSHES {
                    warn!(
                        "[LogDispatcher] backlog busy, deferring flush ({} in a row)",
                        streak
                    );
                    return FlushOutcome::Deferred;
                }
                debug!("[LogDispatcher] {} deferred flushes, waiting for backlog", streak);
                std::mem::take(&mut *self.backlog.lock())
            }
        };
        self.deferred.store(0, Ordering::Relaxed);

        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!(
                "[LogDispatcher] backlog full, dropped {} record(s) since last flush",
                dropped
            );
        }

        for record in &drained {
            self.send(&record.line);
        }
        FlushOutcome::Flushed(drained.len())
    }
}

/// Robot log shared by every subsystem. Construct once and hand out `Arc`s.
pub struct LogDispatcher {
    inner: Arc<DispatcherInner>,
    flusher: Mutex<Option<PeriodicTask>>,
}

impl LogDispatcher {
    /// Creates the dispatcher and marks boot time. In simulation mode the
    /// session logfile is truncated; if it cannot be opened the side channel is
    /// disabled with a warning.
    pub fn new(config: &LoggingConfig) -> Self {
        let session_log = if config.simulation {
            match File::create(&config.sim_logfile) {
                Ok(file) => Some(Mutex::new(LineWriter::new(file))),
                Err(e) => {
                    warn!(
                        "[LogDispatcher] not writing to simulation logfile {:?}: {}",
                        config.sim_logfile, e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            inner: Arc::new(DispatcherInner {
                boot: Instant::now(),
                backlog: Mutex::new(Vec::new()),
                capacity: config.backlog_capacity.max(1),
                dropped: AtomicU64::new(0),
                deferred: AtomicU32::new(0),
                flushing: Mutex::new(()),
                transports: RwLock::new(Vec::new()),
                session_log,
            }),
            flusher: Mutex::new(None),
        }
    }

    pub fn with_transport(self, transport: Arc<dyn LogTransport>) -> Self {
        self.add_transport(transport);
        self
    }

    /// Attaches another transport; it receives every line dispatched from now on.
    pub fn add_transport(&self, transport: Arc<dyn LogTransport>) {
        info!("[LogDispatcher] transport `{}` attached", transport.name());
        self.inner.transports.write().push(transport);
    }

    /// Starts the background flush. Call once.
    pub fn start(&self, scheduler: &PeriodicScheduler, period: Duration) -> Result<()> {
        let mut slot = self.flusher.lock();
        if slot.is_some() {
            return Err(MonitorError::AlreadyRunning("log-flush".into()));
        }

        let inner = self.inner.clone();
        let mut task = scheduler
            .schedule("log-flush", period, move || {
                inner.flush();
            })
            .with_priority(ThreadPriority::Min);
        task.start()?;
        *slot = Some(task);
        Ok(())
    }

    /// Stops the background flush, then drains whatever is left.
    pub fn stop(&self) {
        let task = self.flusher.lock().take();
        if let Some(mut task) = task {
            task.stop();
            self.inner.flush();
        }
    }

    pub fn is_running(&self) -> bool {
        self.flusher.lock().is_some()
    }

    /// Logs `message` attributed to `origin`. Prefer the `robot_log!` macro,
    /// which fills `origin` in from the calling function.
    pub fn log_at(&self, origin: CallSite, level: Level, message: impl AsRef<str>) {
        let record = LogRecord::new(level, origin, self.inner.since_boot(), message.as_ref());
        self.inner.mirror_to_session_log(&record.line);

        if level.is_urgent() {
            self.inner.send(&record.line);
        } else {
            self.inner.enqueue(record);
        }
    }

    /// One flush cycle on the calling thread.
    pub fn flush(&self) -> FlushOutcome {
        self.inner.flush()
    }

    pub fn backlog_len(&self) -> usize {
        self.inner.backlog.lock().len()
    }

    /// Copy of the queued records, oldest first.
    pub fn backlog_snapshot(&self) -> Vec<LogRecord> {
        self.inner.backlog.lock().clone()
    }

    /// Records dropped for capacity since the last flush.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn since_boot(&self) -> Duration {
        self.inner.since_boot()
    }
}

impl Drop for LogDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::thread;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl LogTransport for Capture {
        fn name(&self) -> &str {
            "capture"
        }
        fn write_line(&self, line: &str) -> io::Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    fn dispatcher_with_capture(config: &LoggingConfig) -> (LogDispatcher, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let dispatcher = LogDispatcher::new(config).with_transport(capture.clone());
        (dispatcher, capture)
    }

    fn message_of(line: &str) -> &str {
        line.rsplit(" -> ").next().unwrap()
    }

    #[test]
    fn buffered_lines_wait_for_flush_in_order() {
        let (log, capture) = dispatcher_with_capture(&LoggingConfig::default());
        let site = CallSite::new("Test", "run");
        for m in ["A", "B", "C"] {
            log.log_at(site, Level::Info, m);
        }

        assert!(capture.lines.lock().is_empty());
        assert_eq!(log.backlog_len(), 3);

        assert_eq!(log.flush(), FlushOutcome::Flushed(3));
        let got: Vec<String> = capture
            .lines
            .lock()
            .iter()
            .map(|l| message_of(l).to_string())
            .collect();
        assert_eq!(got, vec!["A", "B", "C"]);
        assert_eq!(log.backlog_len(), 0);
    }

    #[test]
    fn robot_level_bypasses_backlog() {
        let (log, capture) = dispatcher_with_capture(&LoggingConfig::default());
        log.log_at(CallSite::new("Robot", "init"), Level::Robot, "boot");

        assert_eq!(log.backlog_len(), 0);
        assert_eq!(capture.lines.lock().len(), 1);
        assert!(capture.lines.lock()[0].starts_with("INFO at "));
        assert!(capture.lines.lock()[0].ends_with("Robot::init() -> boot"));
    }

    #[test]
    fn capacity_overflow_is_counted_and_reset_by_flush() {
        let config = LoggingConfig {
            backlog_capacity: 2,
            ..LoggingConfig::default()
        };
        let (log, capture) = dispatcher_with_capture(&config);
        let site = CallSite::new("Test", "spam");
        for i in 0..5 {
            log.log_at(site, Level::Debug, format!("{}", i));
        }
        assert_eq!(log.backlog_len(), 2);
        assert_eq!(log.dropped_count(), 3);

        log.flush();
        assert_eq!(log.dropped_count(), 0);
        assert_eq!(capture.lines.lock().len(), 2);
    }

    #[test]
    fn flush_backs_off_while_a_producer_holds_the_backlog() {
        let (log, _capture) = dispatcher_with_capture(&LoggingConfig::default());
        log.log_at(CallSite::new("Test", "hold"), Level::Info, "queued");

        let guard = log.inner.backlog.lock();
        assert_eq!(log.inner.flush(), FlushOutcome::Deferred);
        assert_eq!(log.inner.flush(), FlushOutcome::Deferred);
        drop(guard);

        assert_eq!(log.flush(), FlushOutcome::Flushed(1));
        assert_eq!(log.inner.deferred.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn macro_attributes_to_this_test() {
        let (log, capture) = dispatcher_with_capture(&LoggingConfig::default());
        crate::robot_log!(log, Level::Robot, "value={}", 7);
        let line = capture.lines.lock()[0].clone();
        assert!(
            line.ends_with("tests::macro_attributes_to_this_test() -> value=7"),
            "{}",
            line
        );
    }

    #[test]
    fn background_flush_delivers_concurrent_producers() {
        let (log, capture) = dispatcher_with_capture(&LoggingConfig::default());
        let log = Arc::new(log);
        let scheduler = PeriodicScheduler::new();
        log.start(&scheduler, Duration::from_millis(2)).unwrap();
        assert!(log.start(&scheduler, Duration::from_millis(2)).is_err());

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        log.log_at(CallSite::new("Producer", "run"), Level::Info, format!("{}:{}", p, i));
                    }
                })
            })
            .collect();
        for h in producers {
            h.join().unwrap();
        }

        log.stop();
        assert_eq!(log.backlog_len(), 0);

        let lines = capture.lines.lock();
        assert_eq!(lines.len(), 1000);
        // per-producer order survives interleaving
        for p in 0..4 {
            let seq: Vec<u32> = lines
                .iter()
                .map(|l| message_of(l))
                .filter_map(|m| m.split_once(':'))
                .filter(|(who, _)| *who == p.to_string())
                .map(|(_, i)| i.parse().unwrap())
                .collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    /// Stalls on the first line it sees, long enough for a second flush to race it.
    #[derive(Default)]
    struct SlowFirst {
        writing: std::sync::atomic::AtomicBool,
        lines: Mutex<Vec<String>>,
    }

    impl LogTransport for SlowFirst {
        fn name(&self) -> &str {
            "slow-first"
        }
        fn write_line(&self, line: &str) -> io::Result<()> {
            if !self.writing.swap(true, Ordering::AcqRel) {
                thread::sleep(Duration::from_millis(200));
            }
            self.lines.lock().push(message_of(line).to_string());
            Ok(())
        }
    }

    #[test]
    fn manual_flush_waits_for_background_flush_in_progress() {
        let slow = Arc::new(SlowFirst::default());
        let log = LogDispatcher::new(&LoggingConfig::default()).with_transport(slow.clone());
        let scheduler = PeriodicScheduler::new();

        log.log_at(CallSite::new("Test", "order"), Level::Info, "A");
        log.start(&scheduler, Duration::from_millis(5)).unwrap();
        while !slow.writing.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }

        log.log_at(CallSite::new("Test", "order"), Level::Info, "B");
        log.flush();
        log.stop();

        assert_eq!(*slow.lines.lock(), vec!["A".to_string(), "B".to_string()]);
    }
}
