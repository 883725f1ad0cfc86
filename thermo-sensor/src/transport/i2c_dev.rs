//! Linux I2C adapters through the i2c-dev character devices.
//!
//! Every transfer is a single `I2C_RDWR` ioctl, so a register read is a
//! write of the register address followed by a repeated-start read. The
//! ioctl blocks, so it runs on tokio's blocking pool.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nix::errno::Errno;

use crate::{
    hw_trait::{HwError, I2c, I2cError, Result},
    tracing::prelude::*,
};

mod ffi {
    pub const I2C_RDWR: u32 = 0x0707;
    pub const I2C_M_RD: u16 = 0x0001;

    /// `struct i2c_msg` from `<linux/i2c.h>`
    #[repr(C)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// `struct i2c_rdwr_ioctl_data` from `<linux/i2c-dev.h>`
    #[repr(C)]
    pub struct I2cRdwrData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    nix::ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrData);
}

use ffi::{I2C_M_RD, I2cMsg, I2cRdwrData};

/// One `/dev/i2c-N` adapter.
#[derive(Clone)]
pub struct LinuxI2c {
    file: Arc<File>,
}

impl LinuxI2c {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!(path = %path.display(), "Opened I2C adapter");
        Ok(Self { file: Arc::new(file) })
    }

    async fn transfer(&self, addr: u8, write: Vec<u8>, read_len: usize) -> Result<Vec<u8>> {
        if write.len() > usize::from(u16::MAX) || read_len > usize::from(u16::MAX) {
            return Err(HwError::InvalidParameter(format!(
                "transfer of {} bytes exceeds an i2c message",
                write.len().max(read_len)
            )));
        }

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut read = vec![0u8; read_len];
            rdwr(&file, addr, write, &mut read).map(|()| read)
        })
        .await
        .map_err(|e| HwError::Io(io::Error::other(e)))?
        .map_err(|errno| errno_to_hw(addr, errno))
    }
}

fn rdwr(
    file: &File,
    addr: u8,
    mut write: Vec<u8>,
    read: &mut [u8],
) -> std::result::Result<(), Errno> {
    let mut msgs = Vec::with_capacity(2);
    if !write.is_empty() {
        msgs.push(I2cMsg {
            addr: u16::from(addr),
            flags: 0,
            len: write.len() as u16,
            buf: write.as_mut_ptr(),
        });
    }
    if !read.is_empty() {
        msgs.push(I2cMsg {
            addr: u16::from(addr),
            flags: I2C_M_RD,
            len: read.len() as u16,
            buf: read.as_mut_ptr(),
        });
    }
    if msgs.is_empty() {
        return Ok(());
    }

    let data = I2cRdwrData {
        msgs: msgs.as_mut_ptr(),
        nmsgs: msgs.len() as u32,
    };
    // SAFETY: every message points into a buffer that outlives the call,
    // with `len` matching the buffer's length.
    unsafe { ffi::i2c_rdwr(file.as_raw_fd(), &data) }?;
    Ok(())
}

/// Map the errno values i2c-dev adapters use to bus errors.
fn errno_to_hw(addr: u8, errno: Errno) -> HwError {
    match errno {
        Errno::ENXIO | Errno::EREMOTEIO => I2cError::Nack(addr).into(),
        Errno::ETIMEDOUT => I2cError::Timeout.into(),
        Errno::EAGAIN => I2cError::ArbitrationLost.into(),
        other => HwError::Io(io::Error::from(other)),
    }
}

#[async_trait]
impl I2c for LinuxI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.transfer(addr, data.to_vec(), 0).await.map(|_| ())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        let data = self.transfer(addr, Vec::new(), buffer.len()).await?;
        buffer.copy_from_slice(&data);
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        let data = self.transfer(addr, write.to_vec(), read.len()).await?;
        read.copy_from_slice(&data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errno_to_bus_errors() {
        assert!(matches!(
            errno_to_hw(0x60, Errno::ENXIO),
            HwError::I2c(I2cError::Nack(0x60))
        ));
        assert!(matches!(
            errno_to_hw(0x60, Errno::EREMOTEIO),
            HwError::I2c(I2cError::Nack(0x60))
        ));
        assert!(matches!(
            errno_to_hw(0x60, Errno::ETIMEDOUT),
            HwError::I2c(I2cError::Timeout)
        ));
        assert!(matches!(errno_to_hw(0x60, Errno::EIO), HwError::Io(_)));
    }

    #[test]
    fn open_fails_for_missing_adapter() {
        assert!(LinuxI2c::open("/dev/i2c-does-not-exist").is_err());
    }
}
