//! Shared I2C buses and per-device handles.
//!
//! A [`BusManager`] owns every I2C controller in the process. Drivers ask it
//! for an [`I2cDevice`] (bus id + 7-bit address) and then talk to their chip
//! through register-level helpers. Each register transaction locks the bus
//! for that transaction only, so drivers sharing a bus interleave freely
//! between transactions.
//!
//! Devices may also register a periodic callback. Callbacks run as
//! independent tokio tasks with their own cadence, unrelated to whoever
//! drives the main control loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    hw_trait::{I2c, Result},
    tracing::prelude::*,
};

type SharedBus = Arc<Mutex<Box<dyn I2c>>>;

/// Owner of all I2C buses and of the periodic tasks registered on them.
pub struct BusManager {
    buses: HashMap<u8, SharedBus>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl BusManager {
    pub fn new() -> Self {
        Self {
            buses: HashMap::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Register an I2C controller under bus number `id`, replacing any
    /// previous controller with that number.
    pub fn add_bus(&mut self, id: u8, i2c: impl I2c + 'static) {
        debug!(bus = id, "Registered I2C bus");
        self.buses.insert(id, Arc::new(Mutex::new(Box::new(i2c))));
    }

    /// Get a handle to the device at `address` on bus `bus`.
    ///
    /// Returns `None` if no controller is registered for `bus`. Whether a
    /// chip actually answers at `address` is only known after talking to
    /// it.
    pub fn get_device(&self, bus: u8, address: u8) -> Option<I2cDevice> {
        let shared = self.buses.get(&bus)?;
        Some(I2cDevice {
            bus_id: bus,
            address,
            bus: Arc::clone(shared),
            retries: Arc::new(AtomicU8::new(0)),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
        })
    }

    /// Number of periodic callbacks currently running.
    pub fn periodic_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Stop all periodic callbacks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        trace!("All bus tasks stopped");
    }
}

impl Default for BusManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one device on a shared bus.
///
/// Clones refer to the same device and share its retry setting.
#[derive(Clone)]
pub struct I2cDevice {
    bus_id: u8,
    address: u8,
    bus: SharedBus,
    retries: Arc<AtomicU8>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl I2cDevice {
    /// Number of extra attempts made when a transaction fails.
    pub fn set_retries(&self, retries: u8) {
        self.retries.store(retries, Ordering::Relaxed);
    }

    pub fn retries(&self) -> u8 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Take exclusive use of the bus until the guard is dropped.
    ///
    /// Only needed when several transactions must not be interleaved with
    /// other devices' traffic. The single-transaction helpers on
    /// `I2cDevice` lock on their own.
    pub async fn acquire(&self) -> BusGuard<'_> {
        BusGuard {
            i2c: self.bus.lock().await,
            address: self.address,
            retries: self.retries(),
        }
    }

    /// Read `buf.len()` bytes starting at register `reg`.
    pub async fn read_registers(&self, reg: u8, buf: &mut [u8]) -> Result<()> {
        self.acquire().await.read_registers(reg, buf).await
    }

    /// Write one byte to register `reg`.
    pub async fn write_register(&self, reg: u8, value: u8) -> Result<()> {
        self.acquire().await.write_register(reg, value).await
    }

    /// Run `callback` every `period` until the bus manager shuts down.
    ///
    /// The first call happens one period after registration. A callback
    /// that overruns its period delays the next call rather than bunching
    /// calls up.
    pub fn register_periodic_callback<F, Fut>(&self, period: Duration, mut callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let bus = self.bus_id;
        let address = self.address;

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => callback().await,
                    _ = shutdown.cancelled() => {
                        trace!(
                            bus,
                            address = format!("{:#04x}", address),
                            "Periodic callback stopped"
                        );
                        break;
                    }
                }
            }
        });
    }
}

/// Exclusive access to a bus on behalf of one device.
pub struct BusGuard<'a> {
    i2c: MutexGuard<'a, Box<dyn I2c>>,
    address: u8,
    retries: u8,
}

impl BusGuard<'_> {
    pub async fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.i2c.write_read(self.address, &[reg], buf).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    trace!(
                        address = format!("{:#04x}", self.address),
                        reg = format!("{:#04x}", reg),
                        attempt,
                        "Register read failed, retrying: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.i2c.write(self.address, &[reg, value]).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    trace!(
                        address = format!("{:#04x}", self.address),
                        reg = format!("{:#04x}", reg),
                        attempt,
                        "Register write failed, retrying: {}",
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
