//! reporter.rs
//! Periodic controller health reporting (80 ms default).
//!
//! Per tick:
//! - brownout: warn on false -> true
//! - system active, rail enabled x3: report every change
//! - rail fault counts x3, CAN TX/RX error counts: warn when the count rises
//! - CAN utilization: warn on every tick above the threshold (no memory)
//! - every sampled value goes to telemetry whether or not anything fired
//!
//! The first tick only records baselines. A failed read is isolated to its
//! signal: no comparison, memory untouched, telemetry repeats the last value.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::call_site;
use crate::faults::{
    hal::{CanStatus, Rail, RioHal},
    telemetry::{FaultTelemetryRow, TelemetrySink},
};
use crate::logging::{
    diagnostics::{DiagnosticSink, Severity},
    record::CallSite,
};
use crate::scheduler::{
    edge::{Edge, Threshold, TrackedSignal},
    periodic::{PeriodicScheduler, PeriodicTask},
};
use crate::utils::{
    config::FaultConfig,
    error::{HalError, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RailState {
    pub enabled: bool,
    pub fault_count: u32,
}

/// Last known controller health. Rails start disabled with no faults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultSnapshot {
    pub robot_voltage: f64,
    pub brownout: bool,
    pub system_active: bool,
    pub can: CanStatus,
    pub rails: [RailState; 3],
    pub ticks: u64,
}

impl FaultSnapshot {
    pub fn rail(&self, rail: Rail) -> RailState {
        self.rails[rail.index()]
    }

    pub fn telemetry_row(&self) -> FaultTelemetryRow {
        FaultTelemetryRow {
            robot_voltage: self.robot_voltage,
            can_usage: self.can.utilization,
            can_tx_errors: self.can.transmit_error_count,
            can_rx_errors: self.can.receive_error_count,
            faults_3v: self.rail(Rail::V3_3).fault_count,
            faults_5v: self.rail(Rail::V5).fault_count,
            faults_6v: self.rail(Rail::V6).fault_count,
            enabled_3v: self.rail(Rail::V3_3).enabled,
            enabled_5v: self.rail(Rail::V5).enabled,
            enabled_6v: self.rail(Rail::V6).enabled,
            brownout: self.brownout,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: usize,
    pub read_failures: usize,
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "Enabled" } else { "Disabled" }
}

struct MonitorCore {
    hal: Arc<dyn RioHal>,
    diagnostics: Arc<dyn DiagnosticSink>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    can_usage: Threshold,

    brownout: TrackedSignal<bool>,
    system_active: TrackedSignal<bool>,
    rail_enabled: [TrackedSignal<bool>; 3],
    rail_faults: [TrackedSignal<u32>; 3],
    can_tx: TrackedSignal<u32>,
    can_rx: TrackedSignal<u32>,
}

impl MonitorCore {
    fn tick(&mut self, snapshot: &mut FaultSnapshot) -> TickReport {
        let mut report = TickReport::default();

        self.handle_power_states(snapshot, &mut report);
        self.handle_rail_statuses(snapshot, &mut report);
        self.handle_can_status(snapshot, &mut report);

        match self.hal.battery_voltage() {
            Ok(v) => snapshot.robot_voltage = v,
            Err(e) => self.read_failed(&mut report, e),
        }

        snapshot.ticks += 1;
        self.publish(snapshot);
        report
    }

    fn handle_power_states(&mut self, snapshot: &mut FaultSnapshot, report: &mut TickReport) {
        match self.hal.is_browned_out() {
            Ok(brownout) => {
                snapshot.brownout = brownout;
                if self.brownout.observe(brownout).is_some() {
                    self.emit(
                        report,
                        call_site!(),
                        Severity::Warning,
                        "Robot brownout detected! (previously normal)".into(),
                    );
                }
            }
            Err(e) => self.read_failed(report, e),
        }

        match self.hal.is_sys_active() {
            Ok(active) => {
                snapshot.system_active = active;
                if let Some(t) = self.system_active.observe(active) {
                    let describe = |on: bool| if on { "enabled" } else { "disabled" };
                    self.emit(
                        report,
                        call_site!(),
                        Severity::Info,
                        format!(
                            "Robot FPGA outputs have been {} (previously {})",
                            describe(t.current),
                            describe(t.previous)
                        ),
                    );
                }
            }
            Err(e) => self.read_failed(report, e),
        }
    }

    fn handle_rail_statuses(&mut self, snapshot: &mut FaultSnapshot, report: &mut TickReport) {
        for rail in Rail::ALL {
            let i = rail.index();

            match self.hal.rail_enabled(rail) {
                Ok(enabled) => {
                    snapshot.rails[i].enabled = enabled;
                    if let Some(t) = self.rail_enabled[i].observe(enabled) {
                        self.emit(
                            report,
                            call_site!(),
                            Severity::Info,
                            format!(
                                "{} Rail {} (previously {})",
                                rail.label(),
                                on_off(t.current),
                                on_off(t.previous)
                            ),
                        );
                    }
                }
                Err(e) => self.read_failed(report, e),
            }

            match self.hal.rail_fault_count(rail) {
                Ok(count) => {
                    snapshot.rails[i].fault_count = count;
                    if let Some(t) = self.rail_faults[i].observe(count) {
                        self.emit(
                            report,
                            call_site!(),
                            Severity::Warning,
                            format!(
                                "{} Rail fault detected! (faults {} -> {})",
                                rail.label(),
                                t.previous,
                                t.current
                            ),
                        );
                    }
                }
                Err(e) => self.read_failed(report, e),
            }
        }
    }

    fn handle_can_status(&mut self, snapshot: &mut FaultSnapshot, report: &mut TickReport) {
        let status = match self.hal.can_status() {
            Ok(status) => status,
            Err(e) => {
                self.read_failed(report, e);
                return;
            }
        };
        snapshot.can = status;

        if self.can_usage.exceeded(status.utilization) {
            self.emit(
                report,
                call_site!(),
                Severity::Warning,
                format!(
                    "CAN bus utilization has passed {:.2}% (now {:.2}%)",
                    self.can_usage.limit * 100.0,
                    status.utilization * 100.0
                ),
            );
        }

        if let Some(t) = self.can_tx.observe(status.transmit_error_count) {
            self.emit(
                report,
                call_site!(),
                Severity::Warning,
                format!("CAN bus TX error (errors {} -> {})", t.previous, t.current),
            );
        }

        if let Some(t) = self.can_rx.observe(status.receive_error_count) {
            self.emit(
                report,
                call_site!(),
                Severity::Warning,
                format!("CAN bus RX error (errors {} -> {})", t.previous, t.current),
            );
        }
    }

    fn emit(&self, report: &mut TickReport, origin: CallSite, severity: Severity, message: String) {
        report.events += 1;
        self.diagnostics.report(severity, origin, &message);
    }

    fn read_failed(&self, report: &mut TickReport, e: HalError) {
        report.read_failures += 1;
        warn!("[FaultMonitor] {}", e);
    }

    fn publish(&mut self, snapshot: &FaultSnapshot) {
        if let Some(sink) = self.telemetry.as_mut() {
            if let Err(e) = sink.publish(&snapshot.telemetry_row()) {
                warn!("[FaultMonitor] telemetry row dropped: {}", e);
            }
        }
    }
}

/// Samples controller health on its own periodic task and reports edges to a
/// diagnostic sink.
pub struct FaultMonitor {
    core: Arc<Mutex<MonitorCore>>,
    snapshot: Arc<RwLock<FaultSnapshot>>,
    task: PeriodicTask,
}

impl FaultMonitor {
    /// Builds the monitor and schedules its task without starting it.
    pub fn new(
        scheduler: &PeriodicScheduler,
        hal: Arc<dyn RioHal>,
        diagnostics: Arc<dyn DiagnosticSink>,
        telemetry: Option<Box<dyn TelemetrySink>>,
        config: &FaultConfig,
    ) -> Self {
        let core = Arc::new(Mutex::new(MonitorCore {
            hal,
            diagnostics,
            telemetry,
            can_usage: Threshold::new(config.can_usage_threshold),
            brownout: TrackedSignal::new(Edge::Rising),
            system_active: TrackedSignal::new(Edge::Changed),
            rail_enabled: Rail::ALL.map(|_| TrackedSignal::new(Edge::Changed)),
            rail_faults: Rail::ALL.map(|_| TrackedSignal::new(Edge::Rising)),
            can_tx: TrackedSignal::new(Edge::Rising),
            can_rx: TrackedSignal::new(Edge::Rising),
        }));
        let snapshot = Arc::new(RwLock::new(FaultSnapshot::default()));

        let tick_core = core.clone();
        let tick_snapshot = snapshot.clone();
        let task = scheduler.schedule("fault-reporter", config.period(), move || {
            run_tick(&tick_core, &tick_snapshot);
        });

        Self {
            core,
            snapshot,
            task,
        }
    }

    /// Announces the FPGA build and starts periodic reporting.
    pub fn start(&mut self) -> Result<()> {
        {
            let core = self.core.lock();
            match core.hal.fpga_version() {
                Ok((version, revision)) => core.diagnostics.report(
                    Severity::Urgent,
                    call_site!(),
                    &format!("Reporting on FPGA version: {}.{}", version, revision),
                ),
                Err(e) => warn!("[FaultMonitor] {}", e),
            }
            core.diagnostics
                .report(Severity::Urgent, call_site!(), "Starting reporter thread");
        }
        self.task.start()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Runs one monitoring tick on the calling thread.
    pub fn tick(&self) -> TickReport {
        run_tick(&self.core, &self.snapshot)
    }

    /// Last published health; at most one tick period old while running.
    pub fn snapshot(&self) -> FaultSnapshot {
        *self.snapshot.read()
    }
}

fn run_tick(core: &Mutex<MonitorCore>, snapshot: &RwLock<FaultSnapshot>) -> TickReport {
    let mut core = core.lock();
    let mut next = *snapshot.read();
    let report = core.tick(&mut next);
    *snapshot.write() = next;

    if report.events > 0 || report.read_failures > 0 {
        debug!(
            "[FaultMonitor] tick {}: {} event(s), {} failed read(s)",
            next.ticks, report.events, report.read_failures
        );
    }
    report
}
