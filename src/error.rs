//! Error types for the reset client and the serial readers
//!
//! The serial loops never fail on a bad read. Instead every error they
//! swallow is recorded by [`FaultKind`] in a [`Suppressed`] ledger, so a
//! caller (or a test) can see exactly what was skipped.

use thiserror::Error;

#[cfg(feature = "serial")]
use std::collections::HashMap;
#[cfg(feature = "serial")]
use std::fmt;
#[cfg(feature = "serial")]
use std::io;

/// Errors the reset client reports instead of folding them into a `ResetResult`
#[derive(Error, Debug)]
pub enum ResetError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// HTTP 200 whose body is not a JSON object with a string `message`
    #[error("Malformed response from device: {reason} (body: {body:?})")]
    MalformedResponse { reason: String, body: String },
}

/// A failed read from a serial source
#[cfg(feature = "serial")]
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Port(String),
}

#[cfg(feature = "serial")]
impl ReadError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ReadError::Io(e) => FaultKind::Io(e.kind()),
            ReadError::Port(_) => FaultKind::Port,
        }
    }

    /// Faults that say nothing about the health of the connection
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::Io(io::ErrorKind::TimedOut)
                | FaultKind::Io(io::ErrorKind::Interrupted)
                | FaultKind::Io(io::ErrorKind::WouldBlock)
        )
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for ReadError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(kind) => ReadError::Io(io::Error::new(kind, e.description)),
            _ => ReadError::Port(e.to_string()),
        }
    }
}

/// Classification of a fault that a serial loop chose to swallow
#[cfg(feature = "serial")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Bytes that were not valid UTF-8 and were replaced with U+FFFD
    Decode,
    /// An I/O error from the port
    Io(io::ErrorKind),
    /// A serialport driver error that is not plain I/O
    Port,
    /// Writing output to the terminal or the log file failed
    Write(io::ErrorKind),
}

#[cfg(feature = "serial")]
impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Decode => write!(f, "invalid UTF-8"),
            FaultKind::Io(kind) => write!(f, "I/O ({:?})", kind),
            FaultKind::Port => write!(f, "port driver"),
            FaultKind::Write(kind) => write!(f, "output write ({:?})", kind),
        }
    }
}

/// Counts of swallowed faults, keyed by kind
#[cfg(feature = "serial")]
#[derive(Debug, Clone, Default)]
pub struct Suppressed {
    counts: HashMap<FaultKind, usize>,
}

#[cfg(feature = "serial")]
impl Suppressed {
    pub fn record(&mut self, kind: FaultKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn count(&self, kind: FaultKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = FaultKind> + '_ {
        self.counts.keys().copied()
    }
}
