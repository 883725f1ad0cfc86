//! Daemon lifecycle: open the configured buses, bring up the sensors, run
//! the control loop, and shut down cleanly on SIGINT or SIGTERM.

use tokio::signal::unix::{self, SignalKind};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    bus::BusManager,
    config::Config,
    sensor::{MAX_INSTANCES, Peripherals, TemperatureSensor},
    tracing::prelude::*,
};

pub struct Daemon {
    config: Config,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled, in addition to
    /// the usual signals.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let peripherals = Peripherals::new(open_buses(&self.config));

        let mut sensor = TemperatureSensor::new(&self.config);
        sensor.init(&peripherals).await;

        let mut health = [false; MAX_INSTANCES];
        let mut ticker = time::interval(self.config.loop_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        info!(
            sensors = sensor.num_instances(),
            rate_hz = self.config.loop_rate_hz,
            "Started."
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sensor.update();
                    report_health_changes(&sensor, &mut health);
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        trace!("Shutting down.");
        peripherals.buses.shutdown().await;
        info!("Exiting.");

        Ok(())
    }
}

/// Open every configured adapter. A bus that fails to open is skipped;
/// sensors on it fail their probe and stay unhealthy.
#[cfg(target_os = "linux")]
fn open_buses(config: &Config) -> BusManager {
    use crate::transport::LinuxI2c;

    let mut buses = BusManager::new();
    for bus in &config.buses {
        match LinuxI2c::open(&bus.path) {
            Ok(i2c) => {
                debug!(id = bus.id, path = %bus.path.display(), "Bus ready");
                buses.add_bus(bus.id, i2c);
            }
            Err(e) => warn!(id = bus.id, path = %bus.path.display(), error = %e, "Cannot open bus"),
        }
    }
    buses
}

#[cfg(not(target_os = "linux"))]
fn open_buses(config: &Config) -> BusManager {
    if !config.buses.is_empty() {
        warn!("I2C adapters are only supported on Linux; ignoring [[bus]] entries");
    }
    BusManager::new()
}

/// Log every slot whose health differs from `last`, and record it.
fn report_health_changes(sensor: &TemperatureSensor, last: &mut [bool; MAX_INSTANCES]) {
    for (instance, was_healthy) in last.iter_mut().enumerate() {
        let healthy = sensor.healthy(instance);
        if healthy == *was_healthy {
            continue;
        }
        *was_healthy = healthy;
        if healthy {
            info!(instance, sensor_type = ?sensor.get_type(instance), "Sensor healthy");
        } else {
            warn!(instance, sensor_type = ?sensor.get_type(instance), "Sensor unhealthy");
        }
    }
}
