//! Optional copy of serial output to a file

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct CaptureLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CaptureLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line prefixed with a local timestamp
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(self.writer, "[{}] {}", timestamp, line)?;
        self.writer.flush()
    }

    /// Append text verbatim; chunks need not end on a line boundary
    pub fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()
    }
}
