//! Published per-instance state and the narrow handle backends write it
//! through.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;

use super::params::SensorParams;

/// One successful measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// When the measurement was published.
    pub timestamp: Instant,
}

/// Latest reading of one instance.
///
/// Temperature and timestamp are stored and loaded together, so a reader
/// never pairs a new temperature with an old timestamp or vice versa.
#[derive(Debug, Default)]
pub(crate) struct InstanceState {
    reading: RwLock<Option<Reading>>,
}

impl InstanceState {
    pub(crate) fn latest(&self) -> Option<Reading> {
        *self.reading.read()
    }

    pub(crate) fn publish_at(&self, temperature: f32, timestamp: Instant) {
        *self.reading.write() = Some(Reading {
            temperature,
            timestamp,
        });
    }
}

/// What a backend may touch of the frontend: its own configuration and
/// its own published reading.
#[derive(Clone)]
pub struct StatePublisher {
    instance: usize,
    params: Arc<SensorParams>,
    state: Arc<InstanceState>,
}

impl StatePublisher {
    pub(crate) fn new(
        instance: usize,
        params: Arc<SensorParams>,
        state: Arc<InstanceState>,
    ) -> Self {
        Self {
            instance,
            params,
            state,
        }
    }

    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn params(&self) -> &SensorParams {
        &self.params
    }

    /// Publish a new temperature, stamped with the current time.
    pub fn publish(&self, temperature: f32) {
        self.state.publish_at(temperature, Instant::now());
    }
}
