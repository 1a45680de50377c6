//! Line transports: where rendered log lines end up.

use std::{
    fs::{File, OpenOptions},
    io::{self, LineWriter, Write},
    path::Path,
};

use parking_lot::Mutex;

/// Accepts one fully rendered line at a time.
pub trait LogTransport: Send + Sync {
    fn name(&self) -> &str;
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Driver-station console (stdout).
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleTransport;

impl LogTransport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", line)
    }
}

/// Appends lines to a file, e.g. a log stick mounted on the controller.
pub struct FileTransport {
    name: String,
    file: Mutex<LineWriter<File>>,
}

impl FileTransport {
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            file: Mutex::new(LineWriter::new(file)),
        })
    }
}

impl LogTransport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        writeln!(self.file.lock(), "{}", line)
    }
}
