use std::{
    fs, io,
    sync::Arc,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use rio_monitor::{
    faults::{
        hal::{signal, Rail, SimRio},
        reporter::{FaultMonitor, TickReport},
        telemetry::{CsvTelemetry, FaultTelemetryRow, TelemetrySink, FAULT_COLUMNS},
    },
    logging::{
        diagnostics::{DiagnosticSink, Severity},
        dispatcher::LogDispatcher,
        record::CallSite,
        transport::LogTransport,
    },
    scheduler::periodic::PeriodicScheduler,
    utils::{
        config::{FaultConfig, LoggingConfig},
        error::Result,
    },
};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    fn take(&self) -> Vec<(Severity, String)> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, severity: Severity, _origin: CallSite, message: &str) {
        self.events.lock().push((severity, message.to_string()));
    }
}

#[derive(Clone, Default)]
struct RowCapture {
    rows: Arc<Mutex<Vec<FaultTelemetryRow>>>,
}

impl TelemetrySink for RowCapture {
    fn publish(&mut self, row: &FaultTelemetryRow) -> Result<()> {
        self.rows.lock().push(*row);
        Ok(())
    }
}

struct Rig {
    _scheduler: PeriodicScheduler,
    rio: Arc<SimRio>,
    sink: Arc<RecordingSink>,
    rows: RowCapture,
    monitor: FaultMonitor,
}

fn rig() -> Rig {
    let scheduler = PeriodicScheduler::new();
    let rio = Arc::new(SimRio::new());
    let sink = Arc::new(RecordingSink::default());
    let rows = RowCapture::default();
    let monitor = FaultMonitor::new(
        &scheduler,
        rio.clone(),
        sink.clone(),
        Some(Box::new(rows.clone())),
        &FaultConfig::default(),
    );
    Rig {
        _scheduler: scheduler,
        rio,
        sink,
        rows,
        monitor,
    }
}

#[test]
fn first_tick_is_baseline_only() {
    let r = rig();
    r.rio.update(|s| {
        s.brownout = true;
        s.system_active = true;
        s.rail_enabled = [true; 3];
        s.rail_faults = [4, 5, 6];
        s.can.transmit_error_count = 9;
    });

    assert_eq!(r.monitor.tick(), TickReport::default());
    assert!(r.sink.take().is_empty());
    assert_eq!(r.rows.rows.lock().len(), 1);
}

#[test]
fn boolean_events_fire_only_on_change() {
    let r = rig();
    r.monitor.tick();

    r.rio.update(|s| s.system_active = true);
    assert_eq!(r.monitor.tick().events, 1);
    assert_eq!(r.monitor.tick().events, 0);

    r.rio.update(|s| s.system_active = false);
    r.monitor.tick();
    let events = r.sink.take();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, Severity::Info);
    assert!(events[0].1.contains("enabled (previously disabled)"));
    assert!(events[1].1.contains("disabled (previously enabled)"));
}

#[test]
fn brownout_reports_only_on_entry() {
    let r = rig();
    r.monitor.tick();

    r.rio.update(|s| s.brownout = true);
    r.monitor.tick();
    r.rio.update(|s| s.brownout = false);
    r.monitor.tick();

    let events = r.sink.take();
    assert_eq!(
        events,
        vec![(
            Severity::Warning,
            "Robot brownout detected! (previously normal)".to_string()
        )]
    );
}

#[test]
fn rail_toggle_reports_each_direction() {
    let r = rig();
    r.monitor.tick();

    r.rio.update(|s| s.rail_enabled[Rail::V6.index()] = true);
    r.monitor.tick();
    r.rio.update(|s| s.rail_enabled[Rail::V6.index()] = false);
    r.monitor.tick();

    let msgs: Vec<String> = r.sink.take().into_iter().map(|(_, m)| m).collect();
    assert_eq!(
        msgs,
        vec![
            "6v Rail Enabled (previously Disabled)".to_string(),
            "6v Rail Disabled (previously Enabled)".to_string(),
        ]
    );
}

#[test]
fn counters_fire_on_increase_and_rebase_on_decrease() {
    let r = rig();
    r.rio.update(|s| s.rail_faults[Rail::V3_3.index()] = 2);
    r.monitor.tick();

    r.rio.update(|s| s.rail_faults[Rail::V3_3.index()] = 3);
    assert_eq!(r.monitor.tick().events, 1);

    r.rio.update(|s| s.rail_faults[Rail::V3_3.index()] = 1);
    assert_eq!(r.monitor.tick().events, 0);

    r.rio.update(|s| s.rail_faults[Rail::V3_3.index()] = 2);
    assert_eq!(r.monitor.tick().events, 1);

    let events = r.sink.take();
    assert_eq!(events[0], (Severity::Warning, "3v3 Rail fault detected! (faults 2 -> 3)".into()));
    assert_eq!(events[1].1, "3v3 Rail fault detected! (faults 1 -> 2)");
}

#[test]
fn can_error_counters_are_edge_triggered() {
    let r = rig();
    r.monitor.tick();

    r.rio.update(|s| {
        s.can.transmit_error_count = 3;
        s.can.receive_error_count = 1;
    });
    assert_eq!(r.monitor.tick().events, 2);
    assert_eq!(r.monitor.tick().events, 0);

    let msgs: Vec<String> = r.sink.take().into_iter().map(|(_, m)| m).collect();
    assert_eq!(msgs[0], "CAN bus TX error (errors 0 -> 3)");
    assert_eq!(msgs[1], "CAN bus RX error (errors 0 -> 1)");
}

#[test]
fn can_utilization_warns_every_tick_above_threshold() {
    let r = rig();
    r.rio.update(|s| s.can.utilization = 0.95);
    // level check has no baseline: fires on the first tick too
    assert_eq!(r.monitor.tick().events, 1);
    assert_eq!(r.monitor.tick().events, 1);

    r.rio.update(|s| s.can.utilization = 0.5);
    assert_eq!(r.monitor.tick().events, 0);

    let events = r.sink.take();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0].1,
        "CAN bus utilization has passed 90.00% (now 95.00%)"
    );
}

#[test]
fn failed_read_is_isolated_to_its_signal() {
    let r = rig();
    r.rio.update(|s| s.rail_enabled = [true, false, false]);
    r.monitor.tick();

    r.rio.fail(Rail::V3_3.enabled_signal());
    r.rio.fail(signal::CAN_STATUS);
    r.rio.update(|s| {
        s.rail_enabled = [false, true, true];
        s.brownout = true;
    });

    let report = r.monitor.tick();
    assert_eq!(report.read_failures, 2);
    // 5v and 6v enable + brownout still reported
    assert_eq!(report.events, 3);

    let snap = r.monitor.snapshot();
    assert!(snap.rail(Rail::V3_3).enabled, "failed read keeps last known value");
    assert!(snap.rail(Rail::V5).enabled);
    assert!(snap.brownout);

    // once the read recovers, the missed transition is seen against the old memory
    r.rio.restore(Rail::V3_3.enabled_signal());
    r.rio.restore(signal::CAN_STATUS);
    let report = r.monitor.tick();
    assert_eq!(report, TickReport { events: 1, read_failures: 0 });
}

#[test]
fn telemetry_is_published_every_tick() {
    let r = rig();
    r.rio.update(|s| {
        s.voltage = 11.8;
        s.can.utilization = 0.42;
        s.rail_enabled = [true, true, false];
        s.rail_faults = [0, 1, 0];
    });

    for _ in 0..5 {
        r.monitor.tick();
    }

    let rows = r.rows.rows.lock();
    assert_eq!(rows.len(), 5);
    let last = rows[4];
    assert_eq!(last.robot_voltage, 11.8);
    assert_eq!(last.can_usage, 0.42);
    assert!(last.enabled_3v && last.enabled_5v && !last.enabled_6v);
    assert_eq!(last.faults_5v, 1);
    assert_eq!(r.monitor.snapshot().ticks, 5);
}

#[test]
fn csv_sink_records_fixed_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faults.csv");
    let scheduler = PeriodicScheduler::new();
    let rio = Arc::new(SimRio::new());
    let monitor = FaultMonitor::new(
        &scheduler,
        rio.clone(),
        Arc::new(RecordingSink::default()),
        Some(Box::new(CsvTelemetry::create(&path).unwrap())),
        &FaultConfig::default(),
    );

    for _ in 0..3 {
        monitor.tick();
    }
    drop(monitor);

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], FAULT_COLUMNS.join(","));
    for row in &lines[1..] {
        assert_eq!(row.split(',').count(), FAULT_COLUMNS.len());
    }
}

#[test]
fn start_announces_and_runs_in_background() {
    let scheduler = PeriodicScheduler::new();
    let rio = Arc::new(SimRio::new());
    let sink = Arc::new(RecordingSink::default());
    let config = FaultConfig {
        period_ms: 5,
        ..FaultConfig::default()
    };
    let mut monitor = FaultMonitor::new(&scheduler, rio.clone(), sink.clone(), None, &config);

    monitor.start().unwrap();
    let banner = sink.take();
    assert_eq!(
        banner,
        vec![
            (Severity::Urgent, "Reporting on FPGA version: 2022.4".to_string()),
            (Severity::Urgent, "Starting reporter thread".to_string()),
        ]
    );

    thread::sleep(Duration::from_millis(60));
    rio.update(|s| s.brownout = true);
    thread::sleep(Duration::from_millis(60));
    monitor.stop();

    assert!(!monitor.is_running());
    assert!(monitor.snapshot().ticks >= 2);
    assert_eq!(
        sink.take(),
        vec![(Severity::Warning, "Robot brownout detected! (previously normal)".to_string())]
    );
}

#[derive(Default)]
struct Console {
    lines: Mutex<Vec<String>>,
}

impl LogTransport for Console {
    fn name(&self) -> &str {
        "console"
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

#[test]
fn banner_reaches_the_console_before_any_flush() {
    let scheduler = PeriodicScheduler::new();
    let console = Arc::new(Console::default());
    let log = Arc::new(LogDispatcher::new(&LoggingConfig::default()).with_transport(console.clone()));
    let mut monitor = FaultMonitor::new(
        &scheduler,
        Arc::new(SimRio::new()),
        log.clone(),
        None,
        &FaultConfig::default(),
    );

    monitor.start().unwrap();
    monitor.stop();

    assert_eq!(log.backlog_len(), 0);
    let lines = console.lines.lock();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("INFO at "));
    assert!(lines[0].ends_with("FaultMonitor::start() -> Reporting on FPGA version: 2022.4"));
    assert!(lines[1].ends_with("FaultMonitor::start() -> Starting reporter thread"));
}
