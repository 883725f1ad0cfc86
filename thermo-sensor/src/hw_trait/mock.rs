//! Recording register-map I2C double for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{I2c, I2cError, Result};

/// One transaction seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write { addr: u8, data: Vec<u8> },
    Read { addr: u8, len: usize },
    WriteRead { addr: u8, reg: u8, len: usize },
}

#[derive(Default)]
struct State {
    /// Register contents per device address. A device exists once any of
    /// its registers has been set.
    devices: HashMap<u8, HashMap<u8, Vec<u8>>>,
    log: Vec<Transaction>,
    failing: HashSet<(u8, u8)>,
    fail_all: bool,
}

/// Register-map I2C bus. Clones share state, so a test keeps one handle
/// and hands another to the code under test.
#[derive(Clone, Default)]
pub struct MockI2c {
    state: Arc<Mutex<State>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bytes returned when reading `reg` on `addr`.
    pub fn set_register(&self, addr: u8, reg: u8, bytes: &[u8]) {
        self.state
            .lock()
            .devices
            .entry(addr)
            .or_default()
            .insert(reg, bytes.to_vec());
    }

    pub fn register(&self, addr: u8, reg: u8) -> Option<Vec<u8>> {
        self.state
            .lock()
            .devices
            .get(&addr)
            .and_then(|regs| regs.get(&reg).cloned())
    }

    /// Make every transaction touching `reg` on `addr` fail.
    pub fn fail_register(&self, addr: u8, reg: u8) {
        self.state.lock().failing.insert((addr, reg));
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.fail_all = false;
    }

    /// Make every transaction fail, as if the bus were unplugged.
    pub fn fail_all(&self) {
        self.state.lock().fail_all = true;
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().log.clone()
    }

    pub fn clear_transactions(&self) {
        self.state.lock().log.clear();
    }

    /// Register writes (`[reg, value..]`) sent to `addr`.
    pub fn writes_to(&self, addr: u8, reg: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|t| match t {
                Transaction::Write { addr: a, data }
                    if *a == addr && data.first() == Some(&reg) =>
                {
                    Some(data[1..].to_vec())
                }
                _ => None,
            })
            .collect()
    }

    /// Number of register reads of `reg` on `addr`.
    pub fn reads_of(&self, addr: u8, reg: u8) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|t| match t {
                Transaction::WriteRead { addr: a, reg: r, .. } => *a == addr && *r == reg,
                _ => false,
            })
            .count()
    }
}

impl State {
    fn check(&self, addr: u8, reg: Option<u8>) -> Result<()> {
        if self.fail_all {
            return Err(I2cError::Timeout.into());
        }
        if !self.devices.contains_key(&addr) {
            return Err(I2cError::Nack(addr).into());
        }
        if let Some(reg) = reg {
            if self.failing.contains(&(addr, reg)) {
                return Err(I2cError::Other(format!("injected failure on 0x{:02x}", reg)).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl I2c for MockI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(Transaction::Write {
            addr,
            data: data.to_vec(),
        });
        state.check(addr, data.first().copied())?;

        if let Some((&reg, value)) = data.split_first() {
            if !value.is_empty() {
                state
                    .devices
                    .entry(addr)
                    .or_default()
                    .insert(reg, value.to_vec());
            }
        }
        Ok(())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(Transaction::Read {
            addr,
            len: buffer.len(),
        });
        state.check(addr, None)?;
        buffer.fill(0);
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        let reg = write.first().copied().unwrap_or_default();
        state.log.push(Transaction::WriteRead {
            addr,
            reg,
            len: read.len(),
        });
        state.check(addr, Some(reg))?;

        let bytes = state
            .devices
            .get(&addr)
            .and_then(|regs| regs.get(&reg))
            .cloned()
            .unwrap_or_default();
        for (i, slot) in read.iter_mut().enumerate() {
            *slot = bytes.get(i).copied().unwrap_or(0);
        }
        Ok(())
    }
}
