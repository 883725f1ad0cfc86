//! Hardware abstraction traits.
//!
//! Drivers in this crate are generic over these traits so the same driver
//! runs against a Linux I2C adapter or a test double.

pub mod analog;
pub mod i2c;

#[cfg(test)]
pub mod mock;

pub use analog::AnalogInput;
pub use i2c::{I2c, I2cError};

use thiserror::Error;

/// Errors raised by hardware access.
#[derive(Error, Debug)]
pub enum HwError {
    #[error("I2C error: {0}")]
    I2c(#[from] I2cError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for hardware operations.
pub type Result<T> = std::result::Result<T, HwError>;
