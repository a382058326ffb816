//! GPIO output through rppal

use super::{DeviceError, OutputDevice};
use rppal::gpio::{Gpio, OutputPin};

pub struct GpioLed {
    name: String,
    pin: OutputPin,
    active_low: bool,
}

impl GpioLed {
    pub fn bind(pin: u8, active_low: bool) -> Result<Self, DeviceError> {
        let gpio = Gpio::new().map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .into_output();

        Ok(Self {
            name: format!("gpio{}", pin.pin()),
            pin,
            active_low,
        })
    }
}

impl OutputDevice for GpioLed {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<bool, DeviceError> {
        Ok(self.pin.is_set_high() != self.active_low)
    }

    fn write(&mut self, on: bool) -> Result<(), DeviceError> {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}
