//! Tool configuration
//!
//! Every setting has a built-in default matching the bench setup the tools
//! were written for. An optional TOML file can replace any section, and the
//! subcommand flags override individual values on top of that.
//!
//! ```toml
//! [http]
//! host = "192.168.4.1"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [monitor]
//! boot_window_ms = 3000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Address of the sensor controller on the bench network
pub const DEFAULT_DEVICE_HOST: &str = "10.67.226.245";
pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;

/// USB CDC device the controller enumerates as
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 115200;

pub const DEFAULT_DUMP_DURATION_SECS: u64 = 12;
pub const DEFAULT_BOOT_WINDOW_MS: u64 = 2000;

/// Path of the database erase endpoint
pub const ERASE_ALL_PATH: &str = "/api/erase-all";

/// Device HTTP API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_DEVICE_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl HttpSettings {
    /// Full URL of the erase-all endpoint
    pub fn erase_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, ERASE_ALL_PATH)
    }

    /// Web UI root, shown to the operator after a reset
    pub fn web_ui_url(&self) -> String {
        if self.port == DEFAULT_HTTP_PORT {
            format!("http://{}", self.host)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Serial connection settings shared by `dump` and `monitor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device file (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Settings for the fixed-duration line dumper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpSettings {
    /// How long to read before exiting
    pub duration_secs: u64,
    /// Per-read timeout; a partial line is returned when it expires
    pub read_timeout_ms: u64,
    /// Sleep between reads
    pub poll_interval_ms: u64,
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DUMP_DURATION_SECS,
            read_timeout_ms: 500,
            poll_interval_ms: 10,
        }
    }
}

impl DumpSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for the continuous monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Output received before this much time has passed since connecting is discarded
    pub boot_window_ms: u64,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            boot_window_ms: DEFAULT_BOOT_WINDOW_MS,
            read_timeout_ms: 100,
            poll_interval_ms: 10,
        }
    }
}

impl MonitorSettings {
    pub fn boot_window(&self) -> Duration {
        Duration::from_millis(self.boot_window_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Complete tool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub http: HttpSettings,
    pub serial: SerialSettings,
    pub dump: DumpSettings,
    pub monitor: MonitorSettings,
}

impl ToolConfig {
    /// Load configuration from an optional TOML file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let config = Self::parse(&content)
                    .with_context(|| format!("Invalid config file: {}", path.display()))?;
                log::debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse TOML configuration content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_bench_setup() {
        let config = ToolConfig::default();
        assert_eq!(config.http.erase_url(), "http://10.67.226.245:80/api/erase-all");
        assert_eq!(config.http.timeout(), Duration::from_secs(5));
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.dump.duration(), Duration::from_secs(12));
        assert_eq!(config.dump.read_timeout(), Duration::from_millis(500));
        assert_eq!(config.monitor.boot_window(), Duration::from_secs(2));
        assert_eq!(config.monitor.read_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_web_ui_url() {
        let mut http = HttpSettings::default();
        assert_eq!(http.web_ui_url(), "http://10.67.226.245");

        http.port = 8080;
        assert_eq!(http.web_ui_url(), "http://10.67.226.245:8080");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ToolConfig::parse(
            r#"
            [http]
            host = "192.168.4.1"

            [monitor]
            boot_window_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.http.host, "192.168.4.1");
        assert_eq!(config.http.port, 80);
        assert_eq!(config.monitor.boot_window(), Duration::from_secs(3));
        assert_eq!(config.serial, SerialSettings::default());
        assert_eq!(config.dump, DumpSettings::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(ToolConfig::parse("[serial]\nbaud_rate = \"fast\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nport = \"/dev/ttyUSB1\"\nbaud_rate = 921600").unwrap();

        let config = ToolConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 921600);
    }

    #[test]
    fn test_load_without_file() {
        assert_eq!(ToolConfig::load(None).unwrap(), ToolConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ToolConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
