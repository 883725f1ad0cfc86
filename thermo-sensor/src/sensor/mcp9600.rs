//! MCP9600/MCP9601 thermocouple EMF to temperature converter.
//!
//! The chip measures a thermocouple's hot junction against its own cold
//! junction and reports the compensated temperature in a 16-bit register
//! at 0.0625 degC/LSB. Each finished conversion sets the "update ready"
//! bit in STATUS; the host acknowledges a sample by clearing that bit.
//!
//! The driver probes and configures the chip once, then polls it from a
//! periodic bus callback at 5 Hz, independent of the frontend's update
//! rate.
//!
//! Datasheet: <https://www.microchip.com/en-us/product/MCP9600>

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SensorError, backend::Backend, state::StatePublisher};
use crate::{
    bus::{BusManager, I2cDevice},
    hw_trait::{HwError, Result},
    tracing::prelude::*,
};

/// Address with the ADDR pin pulled low.
pub const DEFAULT_ADDRESS: u8 = 0x60;

/// Thermocouple material the chip linearizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThermocoupleType {
    #[default]
    K = 0,
    J = 1,
    T = 2,
    N = 3,
    S = 4,
    E = 5,
    B = 6,
    R = 7,
}

/// MCP9600-specific settings of a sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Mcp9600Params {
    pub thermocouple: ThermocoupleType,

    /// Digital filter level, 0 (off, fastest) through 7 (heaviest
    /// smoothing, very slow). Only the low three bits are used.
    pub filter: u8,
}

impl Default for Mcp9600Params {
    fn default() -> Self {
        Self {
            thermocouple: ThermocoupleType::K,
            filter: 2,
        }
    }
}

/// Register map and transaction formatting for trace output.
pub mod protocol {
    /// Expected DEVICE_ID values
    pub const MCP9600_WHOAMI: u8 = 0x40;
    pub const MCP9601_WHOAMI: u8 = 0x41;

    /// STATUS bit: a new hot-junction sample is available
    pub const STATUS_UPDATE_READY: u8 = 0x40;

    pub mod regs {
        /// Hot-junction (thermocouple) temperature, 2 bytes
        pub const HOT_JUNCTION: u8 = 0x00;
        /// Hot minus cold junction delta, 2 bytes
        pub const JUNCTION_DELTA: u8 = 0x01;
        /// Cold-junction (ambient) temperature, 2 bytes
        pub const COLD_JUNCTION: u8 = 0x02;
        /// Raw ADC data, 3 bytes
        pub const RAW_ADC: u8 = 0x03;
        pub const STATUS: u8 = 0x04;
        /// Thermocouple type and filter coefficient
        pub const SENSOR_CONFIG: u8 = 0x05;
        pub const DEVICE_CONFIG: u8 = 0x06;
        /// Device ID and revision
        pub const DEVICE_ID: u8 = 0x20;
    }

    pub fn register_name(reg: u8) -> String {
        match reg {
            regs::HOT_JUNCTION => "HOT_JUNCTION".to_string(),
            regs::JUNCTION_DELTA => "JUNCTION_DELTA".to_string(),
            regs::COLD_JUNCTION => "COLD_JUNCTION".to_string(),
            regs::RAW_ADC => "RAW_ADC".to_string(),
            regs::STATUS => "STATUS".to_string(),
            regs::SENSOR_CONFIG => "SENSOR_CONFIG".to_string(),
            regs::DEVICE_CONFIG => "DEVICE_CONFIG".to_string(),
            regs::DEVICE_ID => "DEVICE_ID".to_string(),
            _ => format!("UNKNOWN[0x{:02x}]", reg),
        }
    }

    /// Format one register read or write for trace logs.
    pub fn format_transaction(reg: u8, data: &[u8], is_read: bool) -> String {
        let name = register_name(reg);
        let decoded = match (reg, data) {
            (regs::HOT_JUNCTION | regs::JUNCTION_DELTA | regs::COLD_JUNCTION, &[hi, lo]) => {
                format!("{:.4} degC", super::raw_to_celsius([hi, lo]))
            }
            (regs::STATUS, &[status]) => format!(
                "0x{:02x}{}",
                status,
                if status & STATUS_UPDATE_READY != 0 {
                    " (update ready)"
                } else {
                    ""
                }
            ),
            (regs::DEVICE_ID, &[id]) => format!(
                "0x{:02x} ({})",
                id,
                match id {
                    MCP9600_WHOAMI => "MCP9600",
                    MCP9601_WHOAMI => "MCP9601",
                    _ => "unknown",
                }
            ),
            (_, &[byte]) => format!("0x{:02x}", byte),
            _ => format!("{:02x?}", data),
        };

        if is_read {
            format!("-> READ {}={}", name, decoded)
        } else {
            format!("<- WRITE {}={}", name, decoded)
        }
    }
}

use protocol::{MCP9600_WHOAMI, MCP9601_WHOAMI, STATUS_UPDATE_READY, regs};

/// Degrees Celsius per LSB of the temperature registers.
const SCALE_FACTOR: f32 = 0.0625;

/// Polling period of the running chip (5 Hz).
const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Transport retries while probing, and once running.
const INIT_RETRIES: u8 = 10;
const RUN_RETRIES: u8 = 3;

/// Convert a big-endian two's-complement temperature register to degC.
pub fn raw_to_celsius(raw: [u8; 2]) -> f32 {
    f32::from(i16::from_be_bytes(raw)) * SCALE_FACTOR
}

/// SENSOR_CONFIG value: thermocouple type in bits 6:4, filter in bits 2:0.
pub fn sensor_config_byte(thermocouple: ThermocoupleType, filter: u8) -> u8 {
    ((thermocouple as u8) << 4) | (filter & 0x07)
}

/// Read one sample if the chip has a fresh one.
///
/// Returns `Ok(None)` when the update-ready bit is clear. Otherwise reads
/// the hot junction, acknowledges the sample by clearing only the ready
/// bit, and returns the temperature. Any failed transaction aborts the
/// whole read.
pub async fn read_temperature(dev: &I2cDevice) -> Result<Option<f32>> {
    let mut status = [0u8; 1];
    dev.read_registers(regs::STATUS, &mut status).await?;
    trace!("{}", protocol::format_transaction(regs::STATUS, &status, true));

    if status[0] & STATUS_UPDATE_READY == 0 {
        return Ok(None);
    }

    let mut data = [0u8; 2];
    dev.read_registers(regs::HOT_JUNCTION, &mut data).await?;
    trace!("{}", protocol::format_transaction(regs::HOT_JUNCTION, &data, true));

    let ack = status[0] & !STATUS_UPDATE_READY;
    dev.write_register(regs::STATUS, ack).await?;
    trace!("{}", protocol::format_transaction(regs::STATUS, &[ack], false));

    Ok(Some(raw_to_celsius(data)))
}

/// MCP9600 backend for one sensor slot.
pub struct Mcp9600 {
    publisher: StatePublisher,
    dev: Option<I2cDevice>,
    bus: u8,
    address: u8,
}

impl Mcp9600 {
    /// Look up the slot's device on `buses`. If the configured bus does not
    /// exist, `init` fails without touching hardware.
    pub fn new(publisher: StatePublisher, buses: &BusManager) -> Self {
        let params = publisher.params();
        let bus = params.bus;
        let address = params.address.unwrap_or(DEFAULT_ADDRESS);
        let dev = buses.get_device(bus, address);
        Self {
            publisher,
            dev,
            bus,
            address,
        }
    }

    async fn probe(&self, dev: &I2cDevice) -> std::result::Result<(), SensorError> {
        let mut id = [0u8; 1];
        dev.read_registers(regs::DEVICE_ID, &mut id).await?;
        trace!("{}", protocol::format_transaction(regs::DEVICE_ID, &id, true));

        match id[0] {
            MCP9600_WHOAMI | MCP9601_WHOAMI => Ok(()),
            found => Err(SensorError::WrongIdentity {
                found,
                expected: [MCP9600_WHOAMI, MCP9601_WHOAMI],
            }),
        }
    }

    async fn configure(&self, dev: &I2cDevice) -> std::result::Result<(), HwError> {
        let params = self.publisher.params().mcp9600;
        let config = sensor_config_byte(params.thermocouple, params.filter);
        dev.write_register(regs::SENSOR_CONFIG, config).await?;
        debug!(
            thermocouple = ?params.thermocouple,
            filter = params.filter & 0x07,
            "Configured MCP9600"
        );
        Ok(())
    }
}

#[async_trait]
impl Backend for Mcp9600 {
    fn name(&self) -> &'static str {
        "MCP9600"
    }

    async fn init(&mut self) -> std::result::Result<(), SensorError> {
        let dev = self.dev.clone().ok_or(SensorError::DeviceNotFound {
            bus: self.bus,
            address: self.address,
        })?;

        dev.set_retries(INIT_RETRIES);
        self.probe(&dev).await?;
        self.configure(&dev)
            .await
            .map_err(SensorError::ConfigureFailed)?;
        dev.set_retries(RUN_RETRIES);

        let instance = self.publisher.instance();
        let publisher = self.publisher.clone();
        let poll_dev = dev.clone();
        dev.register_periodic_callback(UPDATE_INTERVAL, move || {
            let dev = poll_dev.clone();
            let publisher = publisher.clone();
            async move {
                match read_temperature(&dev).await {
                    Ok(Some(temperature)) => publisher.publish(temperature),
                    Ok(None) => {}
                    Err(e) => trace!(instance, "MCP9600 read dropped: {}", e),
                }
            }
        });

        Ok(())
    }
}
