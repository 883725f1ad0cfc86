//! Temperature sensor frontend.
//!
//! [`TemperatureSensor`] owns a fixed number of sensor slots. At start of
//! day `init()` builds a backend for every enabled slot and runs its probe.
//! From then on the control loop calls `update()` once per cycle and reads
//! results with `get_temperature()` and `healthy()`.
//!
//! Backends publish readings on their own schedule. Push-based drivers
//! (the I2C chips) poll from a periodic bus task; pull-based drivers
//! refresh inside `update()`. Either way the frontend only ever reads the
//! last published value and never waits for hardware.
//!
//! A slot whose probe failed, whose chip never answered, or whose sensor
//! simply stopped producing samples all look the same from outside: no
//! fresh reading, so `healthy()` is false.

pub mod analog;
pub mod backend;
pub mod mcp9600;
pub mod params;
pub mod state;

pub use backend::{Backend, Peripherals};
pub use params::{LoggingType, SensorParams, SensorType, Source};
pub use state::{Reading, StatePublisher};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::{config::Config, hw_trait::HwError, tracing::prelude::*};
use state::InstanceState;

/// Number of sensor slots.
pub const MAX_INSTANCES: usize = 3;

/// Why a slot ended up without a backend.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("no I2C bus {bus} for device at 0x{address:02x}")]
    DeviceNotFound { bus: u8, address: u8 },

    #[error("unexpected device ID 0x{found:02x}, expected one of {expected:02x?}")]
    WrongIdentity { found: u8, expected: [u8; 2] },

    #[error("configuration write failed: {0}")]
    ConfigureFailed(#[source] HwError),

    #[error("no backend for sensor type {0:?}")]
    UnsupportedType(SensorType),

    #[error("analog pin {0:?} not available")]
    NoAnalogPin(Option<u8>),

    #[error(transparent)]
    Hw(#[from] HwError),
}

/// Externally visible state of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSnapshot {
    pub instance: usize,
    pub sensor_type: SensorType,
    pub source: Source,
    pub source_id: i32,
    pub temperature: Option<f32>,
    pub healthy: bool,
}

/// Frontend over all configured temperature sensors.
pub struct TemperatureSensor {
    params: [Arc<SensorParams>; MAX_INSTANCES],
    states: [Arc<InstanceState>; MAX_INSTANCES],
    drivers: [Option<Box<dyn Backend>>; MAX_INSTANCES],
    health_timeout: Duration,
    logging: LoggingType,
    /// Zero point of telemetry timestamps.
    epoch: Instant,
    /// Timestamp of the last reading logged per slot.
    last_logged: [Option<Instant>; MAX_INSTANCES],
    initialized: bool,
    snapshot_tx: watch::Sender<Vec<InstanceSnapshot>>,
}

impl TemperatureSensor {
    /// Create the frontend with every slot configured but no backends yet.
    ///
    /// Sensors past `MAX_INSTANCES` are ignored; `Config` parsing already
    /// rejects them.
    pub fn new(config: &Config) -> Self {
        let params: [Arc<SensorParams>; MAX_INSTANCES] = std::array::from_fn(|i| {
            Arc::new(config.sensors.get(i).cloned().unwrap_or_default())
        });
        let (snapshot_tx, _) = watch::channel(Vec::new());

        Self {
            params,
            states: std::array::from_fn(|_| Arc::new(InstanceState::default())),
            drivers: std::array::from_fn(|_| None),
            health_timeout: config.health_timeout(),
            logging: config.logging,
            epoch: Instant::now(),
            last_logged: [None; MAX_INSTANCES],
            initialized: false,
            snapshot_tx,
        }
    }

    /// Detect and initialize the configured sensors.
    ///
    /// Runs once; later calls do nothing. Failures are logged and leave the
    /// slot without a backend.
    pub async fn init(&mut self, peripherals: &Peripherals) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        for instance in 0..MAX_INSTANCES {
            let params = Arc::clone(&self.params[instance]);
            if params.sensor_type == SensorType::None {
                continue;
            }

            let publisher = StatePublisher::new(
                instance,
                Arc::clone(&params),
                Arc::clone(&self.states[instance]),
            );
            let mut backend = match backend::create(publisher, peripherals) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(instance, "Temperature sensor not created: {}", e);
                    continue;
                }
            };

            match backend.init().await {
                Ok(()) => {
                    info!(
                        instance,
                        sensor = backend.name(),
                        source = ?params.source,
                        "Temperature sensor initialized"
                    );
                    self.drivers[instance] = Some(backend);
                }
                Err(e) => {
                    warn!(
                        instance,
                        sensor = backend.name(),
                        "Temperature sensor init failed: {}",
                        e
                    );
                }
            }
        }

        debug!(count = self.num_instances(), "Temperature sensors ready");
    }

    /// Number of slots with a working backend.
    pub fn num_instances(&self) -> usize {
        self.drivers.iter().flatten().count()
    }

    /// Run one control cycle: refresh pull-based backends, emit telemetry,
    /// and publish a snapshot to subscribers. Never blocks.
    pub fn update(&mut self) {
        for driver in self.drivers.iter_mut().flatten() {
            driver.update();
        }

        self.log_readings();
        self.publish_snapshot();
    }

    /// Last successfully read temperature in degrees Celsius.
    ///
    /// `None` for out-of-range indices, slots without a backend, and
    /// sensors that have not produced a reading yet. A stale reading is
    /// still returned; check `healthy()` for freshness.
    pub fn get_temperature(&self, instance: usize) -> Option<f32> {
        self.reading(instance).map(|r| r.temperature)
    }

    /// Whether the slot has a backend whose last reading is fresh.
    pub fn healthy(&self, instance: usize) -> bool {
        self.reading(instance)
            .is_some_and(|r| r.timestamp.elapsed() < self.health_timeout)
    }

    pub fn get_type(&self, instance: usize) -> SensorType {
        self.params
            .get(instance)
            .map_or(SensorType::None, |p| p.sensor_type)
    }

    pub fn get_source(&self, instance: usize) -> Source {
        self.params.get(instance).map_or(Source::None, |p| p.source)
    }

    pub fn get_source_id(&self, instance: usize) -> i32 {
        self.params.get(instance).map_or(0, |p| p.source_id)
    }

    /// Receive a snapshot of every slot after each `update()` that changed
    /// something.
    pub fn subscribe(&self) -> watch::Receiver<Vec<InstanceSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    fn reading(&self, instance: usize) -> Option<Reading> {
        self.drivers.get(instance)?.as_ref()?;
        self.states[instance].latest()
    }

    fn log_readings(&mut self) {
        if self.logging == LoggingType::Disabled {
            return;
        }

        for instance in 0..MAX_INSTANCES {
            let params = &self.params[instance];
            if self.drivers[instance].is_none() || !self.logging.logs(params.source) {
                continue;
            }
            let Some(reading) = self.states[instance].latest() else {
                continue;
            };
            if self.last_logged[instance] == Some(reading.timestamp) {
                continue;
            }
            self.last_logged[instance] = Some(reading.timestamp);

            info!(
                target: "telemetry",
                timestamp_ms = reading.timestamp.duration_since(self.epoch).as_millis() as u64,
                instance,
                temperature = reading.temperature,
                source = ?params.source,
                source_id = params.source_id,
                "TEMP"
            );
        }
    }

    fn publish_snapshot(&self) {
        let snapshot: Vec<_> = (0..MAX_INSTANCES)
            .map(|instance| InstanceSnapshot {
                instance,
                sensor_type: self.get_type(instance),
                source: self.get_source(instance),
                source_id: self.get_source_id(instance),
                temperature: self.get_temperature(instance),
                healthy: self.healthy(instance),
            })
            .collect();

        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
