//! Analog input trait.

/// A source of averaged analog voltages, indexed by pin.
///
/// Sampling happens elsewhere; `voltage_average` only returns the latest
/// average and must not block.
pub trait AnalogInput: Send + Sync {
    /// Whether `pin` names a channel this input can sample.
    fn has_pin(&self, pin: u8) -> bool;

    /// Latest averaged voltage on `pin`, or `None` if no sample is
    /// available yet.
    fn voltage_average(&self, pin: u8) -> Option<f32>;
}
