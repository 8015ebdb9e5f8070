//! Serial port configuration and connection management
//!
//! Handles opening the sensor controller's debug UART and enumerating
//! candidate ports.

use crate::error::ReadError;
use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use std::io::Read;
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PORT};

/// USB vendor IDs of the bridges ESP boards ship with
pub const ESP_BRIDGE_VIDS: &[(u16, &str)] = &[
    (0x303a, "Espressif native USB"),
    (0x10c4, "Silicon Labs CP210x"),
    (0x1a86, "WCH CH34x"),
    (0x0403, "FTDI"),
];

/// A line longer than this is handed out in pieces
pub const MAX_LINE_BYTES: usize = 4096;

/// Something the dumper and monitor can pull bytes from
///
/// Implemented by [`SerialConnection`] for real hardware and by scripted
/// sources in tests.
pub trait ByteSource {
    /// Read one line including its `\n`, or whatever arrived before the
    /// read timeout expired. The timeout bounds the whole call, not each
    /// byte. `None` when nothing arrived at all.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, ReadError>;

    /// Read every byte the driver currently has buffered without waiting.
    /// `None` when the buffer is empty.
    fn read_available(&mut self) -> Result<Option<Vec<u8>>, ReadError>;

    /// Release the underlying connection
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyACM0)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

impl PortConfig {
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Open 8N1 connection to the controller's debug UART
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        log::debug!(
            "Opened {} at {} baud (read timeout {:?})",
            config.port_path,
            config.baud_rate,
            config.timeout
        );

        Ok(Self::with_port(port, config))
    }

    /// Wrap an already open port
    pub(crate) fn with_port(port: Box<dyn SerialPort>, config: PortConfig) -> Self {
        Self { port, config }
    }
}

impl ByteSource for SerialConnection {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        while buffer.len() < MAX_LINE_BYTES {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut byte) {
                Ok(1) => {
                    buffer.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Ok(_) => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(if buffer.is_empty() { None } else { Some(buffer) })
    }

    fn read_available(&mut self) -> Result<Option<Vec<u8>>, ReadError> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(None);
        }

        let mut buffer = vec![0u8; pending];
        let read = self.port.read(&mut buffer)?;
        buffer.truncate(read);

        Ok(if buffer.is_empty() { None } else { Some(buffer) })
    }

    fn close(self) {
        log::debug!("Closing {}", self.config.port_path);
    }
}

/// A serial port found on this machine
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    /// Present for USB-attached ports
    pub usb: Option<UsbIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIdentity {
    pub vid: u16,
    pub pid: u16,
    /// Product string, or the manufacturer when the device reports no product
    pub product: Option<String>,
}

impl PortInfo {
    /// Name of the ESP USB bridge this port belongs to, if any
    pub fn esp_bridge(&self) -> Option<&'static str> {
        let vid = self.usb.as_ref()?.vid;
        ESP_BRIDGE_VIDS
            .iter()
            .find(|(known, _)| *known == vid)
            .map(|(_, name)| *name)
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let usb = match info.port_type {
            SerialPortType::UsbPort(usb) => Some(UsbIdentity {
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product.or(usb.manufacturer),
            }),
            _ => None,
        };

        Self {
            path: info.port_name,
            usb,
        }
    }
}

/// Available serial ports, ESP bridges first
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .context("Failed to enumerate serial ports")?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|port| port.esp_bridge().is_none());

    Ok(ports)
}

/// Print formatted list of available serial ports
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Plug the sensor controller in over USB");
        println!("  2. Check if the device is recognized: ls -la /dev/ttyACM* /dev/ttyUSB*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    println!("{}", "=".repeat(60));

    for port in &ports {
        println!("\n{}: {}", "Port".cyan(), port.path.white().bold());

        match port.usb {
            Some(ref usb) => {
                print!("  USB {:04x}:{:04x}", usb.vid, usb.pid);
                match usb.product {
                    Some(ref product) => println!(" ({})", product),
                    None => println!(),
                }
            }
            None => println!("  Not a USB device"),
        }
        if let Some(bridge) = port.esp_bridge() {
            println!("  {} {}", "ESP bridge:".green(), bridge);
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "{}",
        "Use: fpsensor-tools monitor -p <PORT> to start monitoring".yellow()
    );

    Ok(())
}
