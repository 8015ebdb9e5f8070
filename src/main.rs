//! Fingerprint Sensor Tools
//!
//! Host-side utilities for the ESP-based fingerprint sensor controller.
//!
//! # Features
//!
//! - **Database reset**: erase every enrolled fingerprint over the device HTTP API
//! - **Serial dump**: read the debug UART for a fixed time, dropping boot filler glyphs
//! - **Serial monitor**: stream the debug UART until Ctrl+C, skipping bootloader noise
//!   (serial commands require the `serial` feature, on by default)
//!
//! # Usage
//!
//! ```bash
//! # Erase the enrollment database
//! fpsensor-tools reset --host 10.67.226.245
//!
//! # Dump 12 seconds of serial output
//! fpsensor-tools dump -p /dev/ttyACM0
//!
//! # Follow serial output until Ctrl+C
//! fpsensor-tools monitor -p /dev/ttyACM0 --log session.log
//!
//! # Find the controller's serial port
//! fpsensor-tools ports
//! ```

mod config;
mod error;
#[cfg(feature = "serial")]
mod interrupt;
mod reset;
#[cfg(feature = "serial")]
mod serial;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use config::{HttpSettings, ToolConfig};

#[cfg(feature = "serial")]
use serial::ExitReason;

/// Fingerprint Sensor Tools
///
/// Database reset and serial log tailing for the ESP fingerprint sensor controller
#[derive(Parser)]
#[command(name = "fpsensor-tools")]
#[command(version)]
#[command(about = "Database reset and serial log tailing for the ESP fingerprint sensor controller")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Erase all enrolled fingerprints on the device
    Reset {
        /// Device IP address or hostname
        #[arg(long)]
        host: Option<String>,

        /// Device HTTP port
        #[arg(long)]
        http_port: Option<u16>,

        /// Request timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print serial lines for a fixed time, skipping boot filler
    #[cfg(feature = "serial")]
    Dump {
        /// Serial port path (e.g., /dev/ttyACM0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Seconds to read before exiting
        #[arg(short, long)]
        duration: Option<u64>,

        /// Also write printed lines to a file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Stream serial output until Ctrl+C, skipping bootloader noise
    #[cfg(feature = "serial")]
    Monitor {
        /// Serial port path (e.g., /dev/ttyACM0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Milliseconds of output to discard after connecting
        #[arg(long)]
        boot_window_ms: Option<u64>,

        /// Also write streamed output to a file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// List available serial ports
    #[cfg(feature = "serial")]
    Ports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = ToolConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Reset {
            host,
            http_port,
            timeout,
        } => {
            if let Some(host) = host {
                config.http.host = host;
            }
            if let Some(port) = http_port {
                config.http.port = port;
            }
            if let Some(timeout) = timeout {
                config.http.timeout_secs = timeout;
            }
            handle_reset(&config.http)
        }

        #[cfg(feature = "serial")]
        Commands::Dump {
            port,
            baud,
            duration,
            log,
        } => {
            apply_serial_overrides(&mut config, port, baud);
            if let Some(duration) = duration {
                config.dump.duration_secs = duration;
            }
            handle_dump(&config, log)
        }

        #[cfg(feature = "serial")]
        Commands::Monitor {
            port,
            baud,
            boot_window_ms,
            log,
        } => {
            apply_serial_overrides(&mut config, port, baud);
            if let Some(window) = boot_window_ms {
                config.monitor.boot_window_ms = window;
            }
            handle_monitor(&config, log)
        }

        #[cfg(feature = "serial")]
        Commands::Ports => serial::port::print_ports(),
    }
}

fn handle_reset(http: &HttpSettings) -> Result<()> {
    println!("{}\n", "=== FINGERPRINT DATABASE CLEAR ===".cyan().bold());

    println!(
        "{} Clearing sensor database at {}...",
        "[*]".cyan().bold(),
        http.erase_url()
    );

    let result = reset::reset(http)?;

    if result.success {
        println!("{} {}", "[OK]".green().bold(), result.message);
        println!("\n{}", "Database cleared!".green().bold());
        println!("\nNow you can:");
        println!("  1. Go to {}", http.web_ui_url().white());
        println!("  2. Click 'Enroll' on any slot");
        println!("  3. Follow prompts to enroll fingerprint");
        println!("  4. Test with touch button\n");
    } else {
        println!("{} {}", "[ERROR]".red().bold(), result.message);
        println!("\n{}", "Could not clear database".red().bold());
        println!("Make sure the device is reachable at {}", http.host.white());
    }

    Ok(())
}

#[cfg(feature = "serial")]
fn apply_serial_overrides(config: &mut ToolConfig, port: Option<String>, baud: Option<u32>) {
    if let Some(port) = port {
        config.serial.port = port;
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = baud;
    }
}

#[cfg(feature = "serial")]
fn handle_dump(config: &ToolConfig, log_file: Option<PathBuf>) -> Result<()> {
    let report = serial::run_dump(&config.serial, &config.dump, log_file.as_deref())?;

    for kind in report.suppressed.kinds() {
        log::debug!("Suppressed {} x {}", report.suppressed.count(kind), kind);
    }

    Ok(())
}

#[cfg(feature = "serial")]
fn handle_monitor(config: &ToolConfig, log_file: Option<PathBuf>) -> Result<()> {
    let report = serial::run_monitor(&config.serial, &config.monitor, log_file.as_deref())?;

    if let ExitReason::Failed(ref detail) = report.exit {
        log::debug!("Monitor ended after failure: {}", detail);
    }
    if let Some(path) = log_file.filter(|_| report.has_session_output()) {
        println!("Log saved to: {}", path.display().to_string().white());
    }

    Ok(())
}
