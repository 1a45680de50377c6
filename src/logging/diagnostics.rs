//! Diagnostic events raised by the hardware monitors.

use crate::logging::{
    dispatcher::LogDispatcher,
    record::{CallSite, Level},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    /// Must reach the operator immediately, e.g. startup banners.
    Urgent,
}

/// Destination for human-readable diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, origin: CallSite, message: &str);
}

impl DiagnosticSink for LogDispatcher {
    fn report(&self, severity: Severity, origin: CallSite, message: &str) {
        let level = match severity {
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warning,
            Severity::Urgent => Level::Robot,
        };
        self.log_at(origin, level, message);
    }
}
