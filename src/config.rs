//! Configuration for the neo-lidar CLI
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file (or no file) is valid.

use crate::device::{ConnectMode, MOTOR_SPEED_RANGE, SAMPLE_RATES_HZ, WorkerConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub scanning: ScanningConfig,
    pub logging: LoggingConfig,
}

/// Device connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port (e.g. `/dev/ttyUSB0`); the CLI argument takes precedence
    pub port: Option<String>,
    /// Explicit bitrate; omit to let the library negotiate
    pub bitrate: Option<i32>,
}

/// Scan acquisition settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Motor speed while scanning, in Hz (0-10)
    pub motor_speed: i32,
    /// Motor speed applied after scanning stops
    pub idle_motor_speed: i32,
    /// Sample rate in Hz (500, 750 or 1000); device default if omitted
    pub sample_rate: Option<i32>,
    /// Scans to print before stopping; 0 runs until interrupted
    pub scan_count: usize,
    /// Scans buffered between the scan worker and the printer
    pub channel_capacity: usize,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            motor_speed: 5,
            idle_motor_speed: 0,
            sample_rate: None,
            scan_count: 10,
            channel_capacity: 4,
        }
    }
}

impl ScanningConfig {
    /// Worker settings for continuous acquisition
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            motor_speed: Some(self.motor_speed),
            sample_rate: self.sample_rate,
            idle_motor_speed: Some(self.idle_motor_speed),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use neo_lidar::config::Config;
    ///
    /// let config = Config::from_file("neo.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check values against what the device accepts
    pub fn validate(&self) -> Result<()> {
        ConnectMode::from_bitrate(self.device.bitrate)?;

        let scanning = &self.scanning;
        for (name, hz) in [
            ("motor_speed", scanning.motor_speed),
            ("idle_motor_speed", scanning.idle_motor_speed),
        ] {
            if !MOTOR_SPEED_RANGE.contains(&hz) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be within {}..={} Hz, got {}",
                    name,
                    MOTOR_SPEED_RANGE.start(),
                    MOTOR_SPEED_RANGE.end(),
                    hz
                )));
            }
        }

        if let Some(rate) = scanning
            .sample_rate
            .filter(|rate| !SAMPLE_RATES_HZ.contains(rate))
        {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be one of {:?} Hz, got {}",
                SAMPLE_RATES_HZ, rate
            )));
        }

        if scanning.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.port, None);
        assert_eq!(config.device.bitrate, None);
        assert_eq!(config.scanning.motor_speed, 5);
        assert_eq!(config.scanning.idle_motor_speed, 0);
        assert_eq!(config.scanning.scan_count, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = Config::default();
        config.device.port = Some("/dev/ttyUSB0".into());
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[device]"));
        assert!(toml_string.contains("[scanning]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("motor_speed = 5"));
        assert!(toml_string.contains("port = \"/dev/ttyUSB0\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[device]
port = "/dev/ttyACM0"
bitrate = 115200

[scanning]
motor_speed = 3
sample_rate = 1000
scan_count = 0

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.device.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.device.bitrate, Some(115_200));
        assert_eq!(config.scanning.motor_speed, 3);
        assert_eq!(config.scanning.sample_rate, Some(1000));
        assert_eq!(config.scanning.scan_count, 0);
        // Unspecified fields keep their defaults
        assert_eq!(config.scanning.channel_capacity, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.device.bitrate = Some(0);
        assert!(matches!(config.validate(), Err(Error::InvalidBitrate(0))));

        let mut config = Config::default();
        config.scanning.motor_speed = 11;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.scanning.sample_rate = Some(600);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::default();
        config.scanning.channel_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("neo.toml");

        let mut config = Config::default();
        config.device.port = Some("/dev/ttyUSB1".into());
        config.scanning.sample_rate = Some(750);
        config.to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_from_file_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("neo.toml");
        fs::write(&path, "[scanning]\nmotor_speed = 42\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_worker_config_from_scanning() {
        let scanning = ScanningConfig {
            sample_rate: Some(500),
            ..Default::default()
        };
        let worker = scanning.worker_config();
        assert_eq!(worker.motor_speed, Some(5));
        assert_eq!(worker.idle_motor_speed, Some(0));
        assert_eq!(worker.sample_rate, Some(500));
    }
}
