//! Serial debug output of the sensor controller
//!
//! This module provides:
//! - Opening the controller's debug UART and listing candidate ports
//! - A fixed-duration line dumper that drops boot filler glyphs
//! - A continuous monitor that discards the bootloader burst after reset

pub mod capture;
pub mod dump;
pub mod monitor;
pub mod port;
pub mod text;

pub use dump::run_dump;
pub use monitor::{run_monitor, ExitReason};
