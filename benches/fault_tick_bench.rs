/*
Cost of one fault-reporter tick against the simulated controller: a quiet tick
(no edges) versus a busy one where every tracked signal fires.
*/

use criterion::{criterion_group, criterion_main, Criterion};

use rio_monitor::{
    faults::{
        hal::{Rail, SimRio},
        reporter::FaultMonitor,
    },
    logging::{
        diagnostics::{DiagnosticSink, Severity},
        record::CallSite,
    },
    scheduler::periodic::PeriodicScheduler,
    utils::config::FaultConfig,
};
use std::{hint::black_box, sync::Arc};

struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&self, severity: Severity, origin: CallSite, message: &str) {
        black_box((severity, origin, message));
    }
}

fn monitor(rio: Arc<SimRio>) -> (PeriodicScheduler, FaultMonitor) {
    let scheduler = PeriodicScheduler::new();
    let monitor = FaultMonitor::new(&scheduler, rio, Arc::new(NullSink), None, &FaultConfig::default());
    (scheduler, monitor)
}

fn bench_fault_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("fault_tick");

    group.bench_function("quiet", |b| {
        let rio = Arc::new(SimRio::new());
        let (_scheduler, monitor) = monitor(rio);
        monitor.tick();
        b.iter(|| black_box(monitor.tick()));
    });

    group.bench_function("every_signal_fires", |b| {
        let rio = Arc::new(SimRio::new());
        let (_scheduler, monitor) = monitor(rio.clone());
        monitor.tick();
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            rio.update(|s| {
                s.brownout = flip;
                s.system_active = flip;
                s.rail_enabled = [flip; 3];
                for rail in Rail::ALL {
                    s.rail_faults[rail.index()] += 1;
                }
                s.can.utilization = 0.95;
                s.can.transmit_error_count += 1;
                s.can.receive_error_count += 1;
            });
            black_box(monitor.tick())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fault_tick);
criterion_main!(benches);
