//! Per-tick fault telemetry rows and the CSV sink that records them.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use csv::{Writer, WriterBuilder};
use serde::Serialize;

use crate::utils::error::Result;

/// Column set, in row order. Fixed for the life of a sink.
pub const FAULT_COLUMNS: [&str; 11] = [
    "robot_voltage",
    "can_usage",
    "can_tx_errors",
    "can_rx_errors",
    "3v_faults",
    "5v_faults",
    "6v_faults",
    "3v_enabled",
    "5v_enabled",
    "6v_enabled",
    "brownout",
];

// Field order must match FAULT_COLUMNS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FaultTelemetryRow {
    pub robot_voltage: f64,
    pub can_usage: f64,
    pub can_tx_errors: u32,
    pub can_rx_errors: u32,
    #[serde(rename = "3v_faults")]
    pub faults_3v: u32,
    #[serde(rename = "5v_faults")]
    pub faults_5v: u32,
    #[serde(rename = "6v_faults")]
    pub faults_6v: u32,
    #[serde(rename = "3v_enabled")]
    pub enabled_3v: bool,
    #[serde(rename = "5v_enabled")]
    pub enabled_5v: bool,
    #[serde(rename = "6v_enabled")]
    pub enabled_6v: bool,
    pub brownout: bool,
}

/// Receives one row per fault tick, columns as in [`FAULT_COLUMNS`].
pub trait TelemetrySink: Send {
    fn publish(&mut self, row: &FaultTelemetryRow) -> Result<()>;
}

const FLUSH_EVERY_ROWS: usize = 8;

/// Writes the header on creation, then one CSV record per tick.
pub struct CsvTelemetry<W: Write> {
    writer: Writer<W>,
    unflushed: usize,
}

impl CsvTelemetry<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvTelemetry<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(FAULT_COLUMNS)?;
        writer.flush()?;
        Ok(Self {
            writer,
            unflushed: 0,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.unflushed = 0;
        Ok(())
    }
}

impl<W: Write + Send> TelemetrySink for CsvTelemetry<W> {
    fn publish(&mut self, row: &FaultTelemetryRow) -> Result<()> {
        self.writer.serialize(row)?;
        self.unflushed += 1;
        if self.unflushed >= FLUSH_EVERY_ROWS {
            self.flush()?;
        }
        Ok(())
    }
}
