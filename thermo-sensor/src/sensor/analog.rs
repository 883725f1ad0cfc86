//! Analog temperature sensor (thermistor, RTD front end, ...) read through
//! an ADC pin.
//!
//! Unlike the I2C drivers this backend is pull-based: each frontend
//! `update()` converts the latest averaged pin voltage, which the analog
//! input keeps current on its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SensorError, backend::Backend, state::StatePublisher};
use crate::{hw_trait::AnalogInput, tracing::prelude::*};

/// Analog-specific settings of a sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalogParams {
    /// ADC pin, `None` when unset.
    pub pin: Option<u8>,

    /// Polynomial coefficients `a0..a4`, lowest order first:
    /// `T = a0 + a1 v + a2 v^2 + a3 v^3 + a4 v^4`.
    pub coefficients: [f32; 5],
}

impl AnalogParams {
    /// Temperature in degC for a pin voltage.
    pub fn voltage_to_celsius(&self, volts: f32) -> f32 {
        // Horner's scheme, highest order first
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &a| acc * volts + a)
    }
}

pub struct AnalogSensor {
    publisher: StatePublisher,
    input: Option<Arc<dyn AnalogInput>>,
    params: AnalogParams,
}

impl AnalogSensor {
    pub fn new(publisher: StatePublisher, input: Option<Arc<dyn AnalogInput>>) -> Self {
        let params = publisher.params().analog;
        Self {
            publisher,
            input,
            params,
        }
    }
}

#[async_trait]
impl Backend for AnalogSensor {
    fn name(&self) -> &'static str {
        "Analog"
    }

    async fn init(&mut self) -> Result<(), SensorError> {
        let pin = self.params.pin;
        match (&self.input, pin) {
            (Some(input), Some(pin)) if input.has_pin(pin) => {
                debug!(pin, coefficients = ?self.params.coefficients, "Analog sensor ready");
                Ok(())
            }
            _ => Err(SensorError::NoAnalogPin(pin)),
        }
    }

    fn update(&mut self) {
        let (Some(input), Some(pin)) = (&self.input, self.params.pin) else {
            return;
        };
        if let Some(volts) = input.voltage_average(pin) {
            self.publisher.publish(self.params.voltage_to_celsius(volts));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::sensor::{SensorParams, SensorType, state::InstanceState};

    /// Analog input whose pin voltages a test sets directly.
    #[derive(Default)]
    pub(crate) struct FakeAnalog {
        volts: Mutex<HashMap<u8, Option<f32>>>,
    }

    impl FakeAnalog {
        pub(crate) fn set(&self, pin: u8, volts: Option<f32>) {
            self.volts.lock().insert(pin, volts);
        }
    }

    impl AnalogInput for FakeAnalog {
        fn has_pin(&self, pin: u8) -> bool {
            self.volts.lock().contains_key(&pin)
        }

        fn voltage_average(&self, pin: u8) -> Option<f32> {
            self.volts.lock().get(&pin).copied().flatten()
        }
    }

    fn make_sensor(
        pin: Option<u8>,
        input: Option<Arc<dyn AnalogInput>>,
    ) -> (AnalogSensor, Arc<InstanceState>) {
        let params = SensorParams {
            sensor_type: SensorType::Analog,
            analog: AnalogParams {
                pin,
                coefficients: [-50.0, 100.0, 0.0, 0.0, 0.0],
            },
            ..Default::default()
        };
        let state = Arc::new(InstanceState::default());
        let publisher = StatePublisher::new(0, Arc::new(params), Arc::clone(&state));
        (AnalogSensor::new(publisher, input), state)
    }

    #[test]
    fn evaluates_polynomial() {
        let params = AnalogParams {
            pin: None,
            coefficients: [1.0, 2.0, 3.0, 4.0, 5.0],
        };
        assert_eq!(params.voltage_to_celsius(0.0), 1.0);
        assert_eq!(params.voltage_to_celsius(1.0), 15.0);
        assert_eq!(params.voltage_to_celsius(2.0), 129.0);
    }

    #[tokio::test]
    async fn publishes_converted_voltage_on_update() {
        let analog = Arc::new(FakeAnalog::default());
        analog.set(4, None);
        let (mut sensor, state) = make_sensor(Some(4), Some(analog.clone()));

        sensor.init().await.unwrap();

        // No sample yet: nothing published
        sensor.update();
        assert_eq!(state.latest(), None);

        analog.set(4, Some(0.75));
        sensor.update();
        assert_eq!(state.latest().map(|r| r.temperature), Some(25.0));
    }

    #[tokio::test]
    async fn init_fails_on_missing_pin() {
        let analog = Arc::new(FakeAnalog::default());
        let (mut sensor, _) = make_sensor(Some(4), Some(analog.clone()));
        assert!(matches!(sensor.init().await, Err(SensorError::NoAnalogPin(Some(4)))));

        let (mut sensor, _) = make_sensor(None, Some(analog));
        assert!(matches!(sensor.init().await, Err(SensorError::NoAnalogPin(None))));

        let (mut sensor, _) = make_sensor(Some(4), None);
        assert!(sensor.init().await.is_err());
    }
}
