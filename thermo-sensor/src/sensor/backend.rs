//! Backend trait and the factory that picks a backend per sensor type.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    SensorError, SensorType, analog::AnalogSensor, mcp9600::Mcp9600, state::StatePublisher,
};
use crate::{bus::BusManager, hw_trait::AnalogInput};

/// A driver for one physical sensor.
///
/// `init` runs once at start of day. An error is terminal: the frontend
/// discards the backend and the slot stays empty for the rest of the
/// process. Push-based backends start their own periodic bus callback in
/// `init` and leave `update` as the default no-op; pull-based backends
/// refresh in `update`, which must never block.
#[async_trait]
pub trait Backend: Send {
    /// Chip or driver name for logs.
    fn name(&self) -> &'static str;

    async fn init(&mut self) -> Result<(), SensorError>;

    fn update(&mut self) {}
}

/// Hardware the factory hands to backends.
pub struct Peripherals {
    pub buses: BusManager,
    pub analog: Option<Arc<dyn AnalogInput>>,
}

impl Peripherals {
    pub fn new(buses: BusManager) -> Self {
        Self {
            buses,
            analog: None,
        }
    }

    pub fn with_analog(mut self, analog: Arc<dyn AnalogInput>) -> Self {
        self.analog = Some(analog);
        self
    }
}

/// Build the backend matching the slot's configured type.
///
/// Fails for disabled, unknown, or recognized-but-unsupported types.
pub fn create(
    publisher: StatePublisher,
    peripherals: &Peripherals,
) -> Result<Box<dyn Backend>, SensorError> {
    let sensor_type = publisher.params().sensor_type;
    match sensor_type {
        SensorType::Mcp9600 => Ok(Box::new(Mcp9600::new(publisher, &peripherals.buses))),
        SensorType::Analog => Ok(Box::new(AnalogSensor::new(
            publisher,
            peripherals.analog.clone(),
        ))),
        other => Err(SensorError::UnsupportedType(other)),
    }
}
