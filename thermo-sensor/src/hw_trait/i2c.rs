//! I2C bus trait.

use async_trait::async_trait;
use thiserror::Error;

use super::Result;

/// Bus-level I2C failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum I2cError {
    /// Target did not acknowledge its address or a data byte.
    #[error("no acknowledge from 0x{0:02x}")]
    Nack(u8),

    /// Lost arbitration to another controller.
    #[error("arbitration lost")]
    ArbitrationLost,

    /// Transfer did not complete in time.
    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// An I2C controller.
///
/// Addresses are 7-bit. Implementations must perform `write_read` as a
/// single transaction with a repeated start.
#[async_trait]
pub trait I2c: Send + Sync {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()>;

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;
}

#[async_trait]
impl<T: I2c + ?Sized> I2c for Box<T> {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        (**self).write(addr, data).await
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        (**self).read(addr, buffer).await
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        (**self).write_read(addr, write, read).await
    }
}
