//! Per-instance sensor configuration.

use serde::{Deserialize, Serialize};

use super::{analog::AnalogParams, mcp9600::Mcp9600Params};

/// Which driver serves a sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    /// Slot disabled.
    #[default]
    None,
    Tsys01,
    Mcp9600,
    Max31865,
    Tsys03,
    Analog,
    #[serde(rename = "dronecan")]
    DroneCan,
    Mlx90614,
    /// A type name this build does not know.
    #[serde(other)]
    Unknown,
}

/// What the measured temperature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Free-standing sensor, not attached to another component.
    #[default]
    None,
    Esc,
    Motor,
    BatteryIndex,
    BatteryIdSerialNumber,
    #[serde(rename = "dronecan")]
    DroneCan,
}

/// Which instances emit telemetry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingType {
    #[default]
    Disabled,
    /// Every instance with a backend.
    All,
    /// Only instances whose source is [`Source::None`].
    SourceNone,
}

impl LoggingType {
    /// Whether an instance bound to `source` is logged under this policy.
    pub fn logs(self, source: Source) -> bool {
        match self {
            LoggingType::Disabled => false,
            LoggingType::All => true,
            LoggingType::SourceNone => source == Source::None,
        }
    }
}

/// Static configuration of one sensor slot.
///
/// Written by the configuration loader, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorParams {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,

    /// I2C bus number.
    pub bus: u8,

    /// 7-bit I2C address. `None` selects the driver's default address.
    pub address: Option<u8>,

    pub source: Source,

    /// Index or identifier within `source` (ESC number, battery index...).
    pub source_id: i32,

    pub mcp9600: Mcp9600Params,

    pub analog: AnalogParams,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(LoggingType::Disabled, Source::None, false)]
    #[test_case(LoggingType::Disabled, Source::Esc, false)]
    #[test_case(LoggingType::All, Source::None, true)]
    #[test_case(LoggingType::All, Source::Motor, true)]
    #[test_case(LoggingType::SourceNone, Source::None, true)]
    #[test_case(LoggingType::SourceNone, Source::BatteryIndex, false)]
    fn logging_policy(policy: LoggingType, source: Source, expected: bool) {
        assert_eq!(policy.logs(source), expected);
    }

    #[test]
    fn unrecognized_type_name_is_unknown() {
        let params: SensorParams = toml::from_str(r#"type = "thermistor9000""#).unwrap();
        assert_eq!(params.sensor_type, SensorType::Unknown);
    }

    #[test]
    fn omitted_fields_take_defaults() {
        let params: SensorParams = toml::from_str(r#"type = "mcp9600""#).unwrap();
        assert_eq!(params.sensor_type, SensorType::Mcp9600);
        assert_eq!(params.bus, 0);
        assert_eq!(params.address, None);
        assert_eq!(params.source, Source::None);
        assert_eq!(params.source_id, 0);
    }
}
