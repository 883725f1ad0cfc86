//! Daemon configuration, read once at startup from TOML.
//!
//! ```toml
//! health_timeout_ms = 5000
//! loop_rate_hz = 50
//! logging = "all"
//!
//! [[bus]]
//! id = 1
//! path = "/dev/i2c-1"
//!
//! [[sensor]]
//! type = "mcp9600"
//! bus = 1
//! address = 0x60
//! source = "battery_index"
//! source_id = 0
//! mcp9600 = { thermocouple = "K", filter = 2 }
//! ```
//!
//! Slots beyond the listed `[[sensor]]` tables are disabled.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::sensor::{LoggingType, MAX_INSTANCES, SensorParams};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} sensors configured, at most {max} supported", max = MAX_INSTANCES)]
    TooManyInstances(usize),

    #[error("loop_rate_hz must be greater than zero")]
    InvalidLoopRate,
}

/// An I2C adapter to open at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Bus number sensors refer to.
    pub id: u8,
    /// Character device, e.g. `/dev/i2c-1`.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// A sensor is healthy while its last successful read is younger than
    /// this.
    pub health_timeout_ms: u64,

    /// Rate of the control loop that calls `update()`.
    pub loop_rate_hz: u32,

    pub logging: LoggingType,

    #[serde(rename = "bus")]
    pub buses: Vec<BusConfig>,

    #[serde(rename = "sensor")]
    pub sensors: Vec<SensorParams>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health_timeout_ms: 5000,
            loop_rate_hz: 50,
            logging: LoggingType::default(),
            buses: Vec::new(),
            sensors: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs(1) / self.loop_rate_hz.max(1)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.len() > MAX_INSTANCES {
            return Err(ConfigError::TooManyInstances(self.sensors.len()));
        }
        if self.loop_rate_hz == 0 {
            return Err(ConfigError::InvalidLoopRate);
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{
        SensorType, Source,
        mcp9600::{Mcp9600Params, ThermocoupleType},
    };

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.health_timeout(), Duration::from_secs(5));
        assert_eq!(config.loop_period(), Duration::from_millis(20));
    }

    #[test]
    fn parses_full_config() {
        let config: Config = r#"
            health_timeout_ms = 2000
            loop_rate_hz = 10
            logging = "source_none"

            [[bus]]
            id = 1
            path = "/dev/i2c-1"

            [[sensor]]
            type = "mcp9600"
            bus = 1
            address = 0x67
            source = "battery_index"
            source_id = 2
            mcp9600 = { thermocouple = "J", filter = 5 }

            [[sensor]]
            type = "analog"
            analog = { pin = 13, coefficients = [-50.0, 100.0, 0.0, 0.0, 0.0] }
        "#
        .parse()
        .unwrap();

        assert_eq!(config.health_timeout(), Duration::from_secs(2));
        assert_eq!(config.loop_period(), Duration::from_millis(100));
        assert_eq!(config.logging, LoggingType::SourceNone);
        assert_eq!(
            config.buses,
            vec![BusConfig {
                id: 1,
                path: PathBuf::from("/dev/i2c-1")
            }]
        );

        let tc = &config.sensors[0];
        assert_eq!(tc.sensor_type, SensorType::Mcp9600);
        assert_eq!(tc.bus, 1);
        assert_eq!(tc.address, Some(0x67));
        assert_eq!(tc.source, Source::BatteryIndex);
        assert_eq!(tc.source_id, 2);
        assert_eq!(
            tc.mcp9600,
            Mcp9600Params {
                thermocouple: ThermocoupleType::J,
                filter: 5
            }
        );

        let analog = &config.sensors[1];
        assert_eq!(analog.sensor_type, SensorType::Analog);
        assert_eq!(analog.analog.pin, Some(13));
        assert_eq!(analog.analog.coefficients[1], 100.0);
    }

    #[test]
    fn rejects_too_many_sensors() {
        let text = "[[sensor]]\ntype = \"analog\"\n".repeat(MAX_INSTANCES + 1);
        let err = text.parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::TooManyInstances(n) if n == MAX_INSTANCES + 1));
    }

    #[test]
    fn rejects_zero_loop_rate() {
        let err = "loop_rate_hz = 0".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLoopRate));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = "[[sensor]]\ntype = \"mcp9600\"\nadress = 0x60\n"
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/thermo-sensor.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
