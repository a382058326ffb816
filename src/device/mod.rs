//! Output device control
//!
//! A [`LedController`] fronts an optional hardware [`OutputDevice`]. Without
//! hardware it keeps an in-memory shadow state so the command grammar still
//! works end to end.

use thiserror::Error;
use tracing::{info, warn};

#[cfg(feature = "gpio")]
pub mod gpio;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    #[error("Device I/O error: {0}")]
    Io(String),
}

/// A single digital output
pub trait OutputDevice: Send {
    fn name(&self) -> &str;

    /// Logical state: `true` means on, regardless of pin polarity
    fn read(&self) -> Result<bool, DeviceError>;

    fn write(&mut self, on: bool) -> Result<(), DeviceError>;
}

/// Explicit owner of the output state
pub struct LedController {
    device: Option<Box<dyn OutputDevice>>,
    shadow: bool,
}

impl LedController {
    pub fn new(device: Option<Box<dyn OutputDevice>>) -> Self {
        match &device {
            Some(device) => info!(device = device.name(), "Output device bound"),
            None => info!("No output device bound, using in-memory state"),
        }

        Self {
            device,
            shadow: false,
        }
    }

    /// Controller with no hardware behind it
    pub fn shadow() -> Self {
        Self::new(None)
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Current state; an unreadable device reads as off
    pub fn read_state(&self) -> bool {
        match &self.device {
            Some(device) => device.read().unwrap_or_else(|e| {
                warn!(device = device.name(), error = %e, "Could not read output state");
                false
            }),
            None => self.shadow,
        }
    }

    /// Drive the output; a failing write is logged, not propagated
    pub fn write_state(&mut self, on: bool) {
        match &mut self.device {
            Some(device) => {
                if let Err(e) = device.write(on) {
                    warn!(device = device.name(), error = %e, on, "Could not write output state");
                }
            }
            None => self.shadow = on,
        }
    }
}

/// Bind the configured hardware output, if any
pub fn bind_device(config: &crate::config::DeviceSection) -> Option<Box<dyn OutputDevice>> {
    let pin = config.gpio_pin?;

    #[cfg(feature = "gpio")]
    {
        match gpio::GpioLed::bind(pin, config.active_low) {
            Ok(led) => Some(Box::new(led)),
            Err(e) => {
                warn!(pin, error = %e, "Could not bind GPIO output");
                None
            }
        }
    }

    #[cfg(not(feature = "gpio"))]
    {
        warn!(pin, "GPIO output configured but the `gpio` feature is disabled");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    #[test]
    fn test_shadow_state_round_trip() {
        let mut led = LedController::shadow();
        assert!(!led.is_bound());
        assert!(!led.read_state());

        led.write_state(true);
        assert!(led.read_state());
        led.write_state(false);
        assert!(!led.read_state());
    }

    #[test]
    fn test_bound_device_receives_writes() {
        let device = FakeDevice::new(false);
        let handle = device.clone();
        let mut led = LedController::new(Some(Box::new(device)));

        assert!(led.is_bound());
        led.write_state(true);

        assert!(handle.state());
        assert!(led.read_state());
        assert_eq!(handle.writes(), vec![true]);
    }

    #[test]
    fn test_unreadable_device_reads_off() {
        let device = FakeDevice::new(true).failing_reads();
        let led = LedController::new(Some(Box::new(device)));

        assert!(!led.read_state());
    }

    #[test]
    fn test_bind_without_pin_is_none() {
        let section = crate::config::DeviceSection::default();
        assert!(bind_device(&section).is_none());
    }
}
