//! Fixed-duration dump of serial lines
//!
//! Reads line by line for a set wall-clock time and prints every line that
//! carries real text. Read and write errors never stop the dump; they are
//! counted by kind in the returned [`DumpReport`].

use crate::config::{DumpSettings, SerialSettings};
use crate::error::{FaultKind, Suppressed};
use crate::serial::capture::CaptureLog;
use crate::serial::port::{ByteSource, PortConfig, SerialConnection};
use crate::serial::text::{decode, printable_line};
use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Instant;

/// What happened during one dump
#[derive(Debug, Clone, Default)]
pub struct DumpReport {
    pub lines_printed: usize,
    /// Lines that were blank or only filler glyphs
    pub lines_filtered: usize,
    pub suppressed: Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVerdict {
    Printed,
    Filtered,
}

pub struct SerialDumper<S: ByteSource, W: Write> {
    source: S,
    out: W,
    settings: DumpSettings,
    capture: Option<CaptureLog>,
    report: DumpReport,
}

impl<S: ByteSource, W: Write> SerialDumper<S, W> {
    pub fn new(source: S, out: W, settings: DumpSettings) -> Self {
        Self {
            source,
            out,
            settings,
            capture: None,
            report: DumpReport::default(),
        }
    }

    /// Also append printed lines to a timestamped log file
    pub fn with_capture(mut self, capture: CaptureLog) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Read until the configured duration has elapsed, then close the source
    pub fn run(mut self) -> DumpReport {
        let started = Instant::now();
        let duration = self.settings.duration();

        while started.elapsed() < duration {
            self.step();
            thread::sleep(self.settings.poll_interval());
        }

        self.source.close();

        log::debug!(
            "Dump finished: {} printed, {} filtered, {} suppressed faults",
            self.report.lines_printed,
            self.report.lines_filtered,
            self.report.suppressed.total()
        );
        if let Some(ref capture) = self.capture {
            log::info!("Dump saved to {}", capture.path().display());
        }

        self.report
    }

    fn step(&mut self) {
        match self.source.read_line() {
            Ok(Some(raw)) => {
                if let Err(e) = self.handle_line(&raw) {
                    log::debug!("Ignoring write error: {}", e);
                    self.report.suppressed.record(FaultKind::Write(e.kind()));
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::debug!("Ignoring read error: {}", e);
                self.report.suppressed.record(e.kind());
            }
        }
    }

    /// Decode one raw line and print it unless it is blank or filler
    pub fn handle_line(&mut self, raw: &[u8]) -> io::Result<LineVerdict> {
        let decoded = decode(raw);
        if decoded.lossy {
            self.report.suppressed.record(FaultKind::Decode);
        }

        let Some(line) = printable_line(&decoded.text) else {
            self.report.lines_filtered += 1;
            return Ok(LineVerdict::Filtered);
        };

        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        if let Some(ref mut capture) = self.capture {
            capture.write_line(line)?;
        }
        self.report.lines_printed += 1;

        Ok(LineVerdict::Printed)
    }

    pub fn report(&self) -> &DumpReport {
        &self.report
    }
}

/// Open the configured port and dump it to stdout
pub fn run_dump(
    serial: &SerialSettings,
    settings: &DumpSettings,
    log_file: Option<&Path>,
) -> Result<DumpReport> {
    let port_config = PortConfig::new(&serial.port)
        .with_baud_rate(serial.baud_rate)
        .with_timeout(settings.read_timeout());
    let connection = SerialConnection::open(port_config)?;

    println!("Reading from {}...", serial.port);

    let mut dumper = SerialDumper::new(connection, io::stdout(), settings.clone());
    if let Some(path) = log_file {
        dumper = dumper.with_capture(CaptureLog::create(path)?);
    }

    Ok(dumper.run())
}
