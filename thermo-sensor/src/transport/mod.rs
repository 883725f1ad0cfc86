//! Concrete bus transports.
//!
//! Drivers never use these directly; the daemon opens adapters here and
//! registers them with the [`BusManager`](crate::bus::BusManager).

#[cfg(target_os = "linux")]
pub mod i2c_dev;

#[cfg(target_os = "linux")]
pub use i2c_dev::LinuxI2c;
