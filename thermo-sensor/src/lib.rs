//! Temperature sensing for a flight-controller style control loop.
//!
//! A [`sensor::TemperatureSensor`] frontend owns up to
//! [`sensor::MAX_INSTANCES`] sensor slots, each driven by a backend that
//! talks to hardware through the shared I2C buses in [`bus`]. The
//! [`daemon`] wires configuration, buses, and the control loop together.

pub mod bus;
pub mod config;
pub mod daemon;
pub mod hw_trait;
pub mod sensor;
pub mod tracing;
pub mod transport;
