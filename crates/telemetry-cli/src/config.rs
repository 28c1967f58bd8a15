//! Configuration file for the telemetry CLI.
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//!
//! [source]
//! owner_tag = "pit-wall"
//! open_timeout_ms = 3000
//!
//! [source.link]
//! baud_rate = 9600
//! data_bits = 8
//! stop_bits = 2
//! parity = "none"
//! ```
//!
//! Every key is optional. Command line flags override the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use telemetry_core::{PortName, SourceConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Serial port to read from.
    pub port: Option<String>,

    /// Settings handed to the serial data source.
    pub source: SourceConfig,
}

impl CliConfig {
    /// Load the configuration file, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.source.validate()?;
        Ok(config)
    }

    /// The port to open: the command line wins over the file.
    pub fn port_name(&self, port_override: Option<&str>) -> Result<PortName> {
        let name = port_override
            .or(self.port.as_deref())
            .ok_or_else(|| telemetry_core::Error::MissingConfig("port".to_string()))
            .context("No serial port given; pass --port or set `port` in the config file")?;

        Ok(PortName::new(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use telemetry_core::{LinkParams, Parity};

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.source.link, LinkParams::TELEMETRY);
    }

    #[test]
    fn test_parse_full_file() {
        let config = CliConfig::parse(
            r#"
            port = "/dev/ttyUSB0"

            [source]
            owner_tag = "pit-wall"
            open_timeout_ms = 500

            [source.link]
            baud_rate = 19200
            parity = "even"
            "#,
        )
        .unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.source.owner_tag, "pit-wall");
        assert_eq!(config.source.open_timeout_ms, 500);
        assert_eq!(config.source.link.baud_rate, 19200);
        assert_eq!(config.source.link.parity, Parity::Even);
    }

    #[test]
    fn test_parse_rejects_invalid_source() {
        let error = CliConfig::parse("[source]\nopen_timeout_ms = 0\n").unwrap_err();
        assert!(error.to_string().contains("open_timeout_ms"));
    }

    #[test]
    fn test_port_override_wins() {
        let config = CliConfig {
            port: Some("/dev/ttyS0".to_string()),
            ..CliConfig::default()
        };

        assert_eq!(config.port_name(None).unwrap().as_str(), "/dev/ttyS0");
        assert_eq!(
            config.port_name(Some("COM3")).unwrap().as_str(),
            "COM3"
        );
    }

    #[test]
    fn test_missing_port() {
        let error = CliConfig::default().port_name(None).unwrap_err();
        assert!(error.to_string().contains("--port"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"/dev/ttyACM0\"").unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_load_missing_file() {
        let error = CliConfig::load(Some(Path::new("/no/such/telemetry.toml"))).unwrap_err();
        assert!(error.to_string().contains("Cannot read config file"));
    }

    #[test]
    fn test_load_without_file() {
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }
}
