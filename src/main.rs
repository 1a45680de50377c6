//! # rio-monitor
//! Headless monitoring session against a simulated controller and drivebase.
//!
//! Wires the three background contexts together the way robot code does at
//! startup: robot log (buffered flush), fault reporter, gyro simulation. The
//! main thread plays the control loop, driving the simulated drivebase and
//! nudging the simulated controller state.
//!
//! ## Modes
//! - **Nominal:** steady drive, healthy controller.
//! - **Fault injection:** adds rail drops, fault counts, CAN error bursts and
//!   utilization spikes so every diagnostic path fires.
//!
//! ## Outputs
//! - Console: robot log lines.
//! - `data/fault_telemetry.csv` (or `faults.telemetry_csv`): one row per fault tick.
//! - `logging.sim_logfile`: mirrored log lines.

use std::{
    fs::create_dir_all,
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{error, info};
use rand::random_range;

use rio_monitor::{
    faults::{
        hal::{Rail, SimRio},
        reporter::FaultMonitor,
        telemetry::{CsvTelemetry, TelemetrySink},
    },
    gyro::{
        drivebase::SimDrivebase,
        sim_gyro::{Gyroscope, SimulatedGyroEngine},
    },
    logging::{
        dispatcher::LogDispatcher,
        record::Level,
        transport::{ConsoleTransport, FileTransport},
    },
    robot_log,
    scheduler::periodic::PeriodicScheduler,
    utils::config::MonitorConfig,
};

const CONFIG_PATH: &str = "rio_monitor.toml";
const DEFAULT_SESSION_SECS: u64 = 10;
const CONTROL_LOOP_MS: u64 = 20;
const TRACK_WIDTH_METERS: f64 = 0.6;

fn main() {
    env_logger::init();
    info!("=== RIO MONITOR START ===");

    let config = match MonitorConfig::load_or_default(Path::new(CONFIG_PATH)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load {}: {}", CONFIG_PATH, e);
            return;
        }
    };

    loop {
        match prompt_menu().as_str() {
            "1" | "" => {
                run_session(&config, prompt_duration(), false);
                println!("\n Session completed. Returning to menu...\n");
            }
            "2" => {
                run_session(&config, prompt_duration(), true);
                println!("\n Session completed. Returning to menu...\n");
            }
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== RIO MONITOR FINISHED ===");
                return;
            }
            other => println!("Unrecognized option '{}', please try again.", other),
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT SESSION MODE                     │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Nominal drive                           │");
    println!("│  2) Fault injection                         │");
    println!("│  3) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_duration() -> Duration {
    print!("Session length in seconds [default: {}]: ", DEFAULT_SESSION_SECS);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    Duration::from_secs(input.trim().parse::<u64>().unwrap_or(DEFAULT_SESSION_SECS))
}

fn open_telemetry(config: &MonitorConfig) -> Option<Box<dyn TelemetrySink>> {
    let path = config
        .faults
        .telemetry_csv
        .clone()
        .unwrap_or_else(|| PathBuf::from("data/fault_telemetry.csv"));
    if let Some(dir) = path.parent() {
        if let Err(e) = create_dir_all(dir) {
            error!("Failed to create telemetry directory {:?}: {}", dir, e);
            return None;
        }
    }
    match CsvTelemetry::create(&path) {
        Ok(sink) => {
            info!("Fault telemetry -> {:?}", path);
            Some(Box::new(sink))
        }
        Err(e) => {
            error!("Fault telemetry disabled: {}", e);
            None
        }
    }
}

fn run_session(config: &MonitorConfig, length: Duration, inject_faults: bool) {
    let mut logging = config.logging.clone();
    logging.simulation = true;

    let scheduler = PeriodicScheduler::new();
    let log = Arc::new(LogDispatcher::new(&logging).with_transport(Arc::new(ConsoleTransport)));
    if let Some(path) = &logging.usb_logfile {
        match FileTransport::append(path) {
            Ok(t) => log.add_transport(Arc::new(t)),
            Err(e) => error!("USB log transport unavailable at {:?}: {}", path, e),
        }
    }
    if let Err(e) = log.start(&scheduler, logging.flush_period()) {
        error!("Failed to start log flush: {}", e);
        return;
    }

    let rio = Arc::new(SimRio::new());
    rio.update(|s| {
        s.system_active = true;
        s.rail_enabled = [true; 3];
        s.voltage = 12.6;
    });

    let mut monitor = FaultMonitor::new(
        &scheduler,
        rio.clone(),
        log.clone(),
        open_telemetry(config),
        &config.faults,
    );
    if let Err(e) = monitor.start() {
        error!("Failed to start fault reporter: {}", e);
        return;
    }

    let drivebase = Arc::new(SimDrivebase::new(TRACK_WIDTH_METERS));
    let gyro = match SimulatedGyroEngine::attach(&scheduler, drivebase.clone(), &config.gyro) {
        Ok(engine) => Gyroscope::simulated(engine),
        Err(e) => {
            error!("Failed to attach gyro simulation: {}", e);
            return;
        }
    };

    robot_log!(log, Level::Robot, "Session started ({:?}, faults={})", length, inject_faults);

    let started = Instant::now();
    let mut cycle: u64 = 0;
    while started.elapsed() < length {
        // control loop: gentle arc with wheel noise
        let base = 0.02;
        let left = base + random_range(-0.002..0.002);
        let right = base * 0.9 + random_range(-0.002..0.002);
        drivebase.drive(left, right);

        if inject_faults {
            perturb_controller(&rio, cycle);
        }

        if cycle % 50 == 0 {
            robot_log!(
                log,
                Level::Info,
                "heading={:.2} rate={:.3} voltage={:.2}",
                gyro.get_heading(),
                gyro.get_rate(),
                monitor.snapshot().robot_voltage
            );
        }

        cycle += 1;
        thread::sleep(Duration::from_millis(CONTROL_LOOP_MS));
    }

    robot_log!(log, Level::Robot, "Session finished after {} cycles", cycle);

    drop(gyro);
    monitor.stop();
    log.stop();

    for (name, stats) in scheduler.stats() {
        info!(
            "[{}] ticks={} overruns={} panics={} max_exec_us={}",
            name, stats.ticks, stats.overruns, stats.panics, stats.max_exec_us
        );
    }
}

/// Scripted disturbances, one class of fault per phase of a 250-cycle window.
fn perturb_controller(rio: &SimRio, cycle: u64) {
    let phase = cycle % 250;
    rio.update(|s| {
        s.can.utilization = if (100..110).contains(&phase) {
            random_range(0.91..0.99)
        } else {
            random_range(0.30..0.60)
        };
        s.voltage = 12.6 - random_range(0.0..0.4);

        match phase {
            40 => s.rail_enabled[Rail::V6.index()] = false,
            60 => s.rail_enabled[Rail::V6.index()] = true,
            80 => s.rail_faults[Rail::V5.index()] += 1,
            150 => {
                s.can.transmit_error_count += random_range(1..4);
                s.can.receive_error_count += 1;
            }
            200 => {
                s.brownout = true;
                s.voltage = 6.3;
            }
            210 => s.brownout = false,
            _ => {}
        }
    });
}
