//! Continuous serial monitor
//!
//! Streams the controller's debug output to the terminal until Ctrl+C.
//! Right after a reset the ESP ROM bootloader prints at 74880 baud, which
//! shows up as garbage at 115200, so everything received during the boot
//! window is discarded.
//!
//! ```text
//! Connecting --open--> BootWindow --first chunk after window--> Streaming
//!      |                    |                                      |
//!      +---- open fails ----+------ Ctrl+C / fatal read fault -----+--> Closed
//! ```

use crate::config::{MonitorSettings, SerialSettings};
use crate::error::{FaultKind, Suppressed};
use crate::interrupt;
use crate::serial::capture::CaptureLog;
use crate::serial::port::{ByteSource, PortConfig, SerialConnection};
use crate::serial::text::decode;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No connection yet
    Connecting,
    /// Connected, output is bootloader noise and is discarded
    BootWindow,
    /// Output is written through
    Streaming,
    /// Terminal; the connection has been released
    Closed,
}

/// Why the monitor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Interrupted,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkVerdict {
    Skipped,
    Streamed,
}

/// Counters from one monitor session
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub exit: ExitReason,
    /// Bytes discarded during the boot window
    pub skipped_bytes: usize,
    pub streamed_bytes: usize,
    pub suppressed: Suppressed,
}

impl MonitorReport {
    /// Whether the session got far enough for its log file to mean anything
    pub fn has_session_output(&self) -> bool {
        self.exit == ExitReason::Interrupted || self.streamed_bytes > 0
    }
}

pub struct SerialMonitor<S: ByteSource, W: Write> {
    settings: MonitorSettings,
    source: Option<S>,
    out: W,
    capture: Option<CaptureLog>,
    state: MonitorState,
    boot_reference: Option<Instant>,
    stop: Arc<AtomicBool>,
    skipped_bytes: usize,
    streamed_bytes: usize,
    suppressed: Suppressed,
}

impl<S: ByteSource, W: Write> SerialMonitor<S, W> {
    pub fn new(settings: MonitorSettings, out: W) -> Self {
        Self {
            settings,
            source: None,
            out,
            capture: None,
            state: MonitorState::Connecting,
            boot_reference: None,
            stop: Arc::new(AtomicBool::new(false)),
            skipped_bytes: 0,
            streamed_bytes: 0,
            suppressed: Suppressed::default(),
        }
    }

    /// Also append streamed text to a log file
    pub fn with_capture(mut self, capture: CaptureLog) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Flag that stops the loop when set, shared with the SIGINT handler
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Take ownership of an open connection and start the boot window
    pub fn attach(&mut self, source: S) {
        self.source = Some(source);
        self.boot_reference = Some(Instant::now());
        self.transition(MonitorState::BootWindow);
    }

    /// Poll until stopped or a fatal fault, then close the connection
    pub fn start(mut self) -> MonitorReport {
        let reason = loop {
            if self.stop.load(Ordering::SeqCst) {
                break ExitReason::Interrupted;
            }
            if let Err(e) = self.poll() {
                break ExitReason::Failed(format!("{:#}", e));
            }
            thread::sleep(self.settings.poll_interval());
        };

        self.finish(reason)
    }

    /// Give up before a connection was ever attached
    pub fn abort(self, detail: String) -> MonitorReport {
        self.finish(ExitReason::Failed(detail))
    }

    fn poll(&mut self) -> Result<()> {
        let Some(source) = self.source.as_mut() else {
            anyhow::bail!("Serial connection is not open");
        };

        let chunk = match source.read_available() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(e) if e.is_transient() => {
                log::debug!("Ignoring transient read error: {}", e);
                self.suppressed.record(e.kind());
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to read from serial port"),
        };

        let elapsed = self
            .boot_reference
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.handle_chunk(&chunk, elapsed)
            .context("Failed to write monitor output")?;

        Ok(())
    }

    /// Route one chunk read `elapsed` after connecting
    pub fn handle_chunk(&mut self, chunk: &[u8], elapsed: Duration) -> Result<ChunkVerdict> {
        let decoded = decode(chunk);
        if decoded.lossy {
            self.suppressed.record(FaultKind::Decode);
        }

        if self.state == MonitorState::BootWindow && elapsed > self.settings.boot_window() {
            self.transition(MonitorState::Streaming);
        }

        if self.state != MonitorState::Streaming {
            self.skipped_bytes += chunk.len();
            log::debug!(
                "Discarded {} boot bytes ({} total)",
                chunk.len(),
                self.skipped_bytes
            );
            return Ok(ChunkVerdict::Skipped);
        }

        self.out.write_all(decoded.text.as_bytes())?;
        self.out.flush()?;
        if let Some(ref mut capture) = self.capture {
            capture.write_text(&decoded.text)?;
        }
        self.streamed_bytes += chunk.len();

        Ok(ChunkVerdict::Streamed)
    }

    fn transition(&mut self, next: MonitorState) {
        log::debug!("Monitor state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(mut self, reason: ExitReason) -> MonitorReport {
        match reason {
            ExitReason::Interrupted => {
                let _ = writeln!(self.out, "\n{} Stopped by user", "[MONITOR]".cyan().bold());
            }
            ExitReason::Failed(ref detail) => {
                eprintln!("{} {}", "[ERROR]".red().bold(), detail);
            }
        }

        if let Some(source) = self.source.take() {
            source.close();
            let _ = writeln!(self.out, "{} Port closed", "[MONITOR]".cyan().bold());
        }
        let _ = self.out.flush();
        self.transition(MonitorState::Closed);

        log::debug!(
            "Monitor finished: {} bytes streamed, {} boot bytes skipped, {} suppressed faults",
            self.streamed_bytes,
            self.skipped_bytes,
            self.suppressed.total()
        );

        MonitorReport {
            exit: reason,
            skipped_bytes: self.skipped_bytes,
            streamed_bytes: self.streamed_bytes,
            suppressed: self.suppressed,
        }
    }
}

/// Run the monitor on the configured port with Ctrl+C handling
pub fn run_monitor(
    serial: &SerialSettings,
    settings: &MonitorSettings,
    log_file: Option<&Path>,
) -> Result<MonitorReport> {
    let mut monitor = SerialMonitor::new(settings.clone(), io::stdout());
    if let Some(path) = log_file {
        monitor = monitor.with_capture(CaptureLog::create(path)?);
    }
    interrupt::install(monitor.stop_flag())?;

    let port_config = PortConfig::new(&serial.port)
        .with_baud_rate(serial.baud_rate)
        .with_timeout(settings.read_timeout());
    let connection = match SerialConnection::open(port_config) {
        Ok(connection) => connection,
        Err(e) => return Ok(monitor.abort(format!("{:#}", e))),
    };

    println!(
        "{} Connected to {} @ {} baud",
        "[MONITOR]".cyan().bold(),
        serial.port,
        serial.baud_rate
    );
    println!("{} Press Ctrl+C to exit\n", "[MONITOR]".cyan().bold());

    monitor.attach(connection);
    Ok(monitor.start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::testing::ScriptedSource;
    use tempfile::tempdir;

    fn settings(boot_window_ms: u64) -> MonitorSettings {
        MonitorSettings {
            boot_window_ms,
            read_timeout_ms: 10,
            poll_interval_ms: 1,
        }
    }

    fn attached(boot_window_ms: u64) -> SerialMonitor<ScriptedSource, Vec<u8>> {
        let mut monitor = SerialMonitor::new(settings(boot_window_ms), Vec::new());
        monitor.attach(ScriptedSource::new());
        monitor
    }

    fn output(monitor: &SerialMonitor<ScriptedSource, Vec<u8>>) -> String {
        String::from_utf8(monitor.out.clone()).unwrap()
    }

    #[test]
    fn test_attach_enters_boot_window() {
        let mut monitor: SerialMonitor<ScriptedSource, Vec<u8>> =
            SerialMonitor::new(settings(2000), Vec::new());
        assert_eq!(monitor.state(), MonitorState::Connecting);

        monitor.attach(ScriptedSource::new());
        assert_eq!(monitor.state(), MonitorState::BootWindow);
    }

    #[test]
    fn test_boot_output_discarded_then_streamed() {
        let mut monitor = attached(2000);

        assert_eq!(
            monitor.handle_chunk(b"BOOT\n", Duration::from_millis(500)).unwrap(),
            ChunkVerdict::Skipped
        );
        assert_eq!(
            monitor.handle_chunk(b"READY\n", Duration::from_millis(2500)).unwrap(),
            ChunkVerdict::Streamed
        );

        let out = output(&monitor);
        assert!(out.contains("READY\n"));
        assert!(!out.contains("BOOT"));
        assert_eq!(monitor.skipped_bytes, 5);
        assert_eq!(monitor.streamed_bytes, 6);
    }

    #[test]
    fn test_nothing_written_inside_window() {
        let mut monitor = attached(2000);

        for ms in [0, 1, 999, 1500, 2000] {
            monitor
                .handle_chunk(b"ets Jun  8 2016 00:22:57\n", Duration::from_millis(ms))
                .unwrap();
        }

        assert!(monitor.out.is_empty());
        assert_eq!(monitor.state(), MonitorState::BootWindow);
    }

    #[test]
    fn test_streaming_is_entered_once() {
        let mut monitor = attached(2000);

        monitor.handle_chunk(b"a", Duration::from_millis(2001)).unwrap();
        assert_eq!(monitor.state(), MonitorState::Streaming);

        // a later chunk stamped inside the window is still written
        assert_eq!(
            monitor.handle_chunk(b"b", Duration::from_millis(10)).unwrap(),
            ChunkVerdict::Streamed
        );
        assert_eq!(output(&monitor), "ab");
    }

    #[test]
    fn test_chunks_are_written_verbatim() {
        let mut monitor = attached(0);

        monitor.handle_chunk(b"Enroll ", Duration::from_millis(1)).unwrap();
        monitor.handle_chunk(b"step 1/2\r\n", Duration::from_millis(2)).unwrap();

        assert_eq!(output(&monitor), "Enroll step 1/2\r\n");
    }

    #[test]
    fn test_invalid_utf8_replaced_and_recorded() {
        let mut monitor = attached(0);

        monitor
            .handle_chunk(&[b'x', 0xc3, b'\n'], Duration::from_millis(1))
            .unwrap();

        assert_eq!(output(&monitor), "x\u{fffd}\n");
        assert_eq!(monitor.suppressed.count(FaultKind::Decode), 1);
    }

    #[test]
    fn test_run_until_interrupted() {
        let mut monitor = SerialMonitor::new(settings(100), Vec::new());
        let source = ScriptedSource::new()
            .data(Duration::from_millis(10), b"BOOT\n")
            .fault(Duration::from_millis(20), io::ErrorKind::TimedOut)
            .data(Duration::from_millis(160), b"READY\n")
            .stop_when_drained(monitor.stop_flag());
        let closed = source.closed_flag();

        monitor.attach(source);
        let report = monitor.start();

        assert_eq!(report.exit, ExitReason::Interrupted);
        assert_eq!(report.skipped_bytes, 5);
        assert_eq!(report.streamed_bytes, 6);
        assert_eq!(
            report.suppressed.count(FaultKind::Io(io::ErrorKind::TimedOut)),
            1
        );
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_output_and_cleanup_messages() {
        let mut out = Vec::new();
        {
            let mut monitor = SerialMonitor::new(settings(50), &mut out);
            let source = ScriptedSource::new()
                .data(Duration::from_millis(5), b"BOOT\n")
                .data(Duration::from_millis(120), b"READY\n")
                .stop_when_drained(monitor.stop_flag());
            monitor.attach(source);
            monitor.start();
        }

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("READY\n"));
        assert!(!out.contains("BOOT"));
        assert!(out.contains("Stopped by user"));
        assert!(out.contains("Port closed"));
    }

    #[test]
    fn test_fatal_read_fault_closes_port() {
        let monitor_source = ScriptedSource::new()
            .fault(Duration::ZERO, io::ErrorKind::WouldBlock)
            .fault(Duration::ZERO, io::ErrorKind::BrokenPipe)
            .data(Duration::ZERO, b"never read\n");
        let closed = monitor_source.closed_flag();

        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        monitor.attach(monitor_source);
        let report = monitor.start();

        match report.exit {
            ExitReason::Failed(ref detail) => {
                assert!(detail.contains("Failed to read from serial port"));
            }
            ref other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(
            report.suppressed.count(FaultKind::Io(io::ErrorKind::WouldBlock)),
            1
        );
        assert_eq!(report.streamed_bytes, 0);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_port_fault_is_fatal() {
        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        monitor.attach(ScriptedSource::new().port_fault(Duration::ZERO));

        let report = monitor.start();
        assert!(matches!(report.exit, ExitReason::Failed(_)));
    }

    #[test]
    fn test_abort_without_connection() {
        let monitor: SerialMonitor<ScriptedSource, Vec<u8>> =
            SerialMonitor::new(settings(2000), Vec::new());

        let report = monitor.abort("Failed to open serial port: /dev/ttyACM0".to_string());
        assert_eq!(
            report.exit,
            ExitReason::Failed("Failed to open serial port: /dev/ttyACM0".to_string())
        );
        assert_eq!(report.skipped_bytes, 0);
        assert!(!report.has_session_output());
    }

    #[test]
    fn test_session_output_after_streaming_or_interrupt() {
        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        monitor.attach(
            ScriptedSource::new()
                .data(Duration::from_millis(5), b"READY\n")
                .port_fault(Duration::from_millis(20)),
        );
        let failed_after_data = monitor.start();
        assert!(matches!(failed_after_data.exit, ExitReason::Failed(_)));
        assert!(failed_after_data.has_session_output());

        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        monitor.attach(ScriptedSource::new().port_fault(Duration::ZERO));
        assert!(!monitor.start().has_session_output());

        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        monitor.attach(ScriptedSource::new());
        monitor.stop_flag().store(true, Ordering::SeqCst);
        assert!(monitor.start().has_session_output());
    }

    #[test]
    fn test_stop_before_first_poll() {
        let mut monitor = SerialMonitor::new(settings(0), Vec::new());
        let source = ScriptedSource::new().data(Duration::ZERO, b"unread\n");
        let closed = source.closed_flag();
        monitor.attach(source);
        monitor.stop_flag().store(true, Ordering::SeqCst);

        let report = monitor.start();
        assert_eq!(report.exit, ExitReason::Interrupted);
        assert_eq!(report.streamed_bytes, 0);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_capture_receives_streamed_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("monitor.log");

        let mut monitor = attached(1000).with_capture(CaptureLog::create(&path).unwrap());
        monitor.handle_chunk(b"noise", Duration::from_millis(10)).unwrap();
        monitor.handle_chunk(b"Match ID 3\n", Duration::from_millis(1500)).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Match ID 3\n");
    }
}
