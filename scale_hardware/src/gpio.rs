use rppal::gpio::{Gpio, InputPin};
use scale_traits::DigitalInput;
use tracing::trace;

use crate::error::{HwError, Result};

/// Proximity sensor wired to a Raspberry Pi GPIO line.
pub struct GpioInput {
    pin: InputPin,
    active_low: bool,
}

impl GpioInput {
    pub fn new(bcm_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(format!("open pin {bcm_pin}: {e}")))?;
        let pin = if active_low {
            pin.into_input_pullup()
        } else {
            pin.into_input_pulldown()
        };
        Ok(Self { pin, active_low })
    }
}

impl DigitalInput for GpioInput {
    fn read(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let level = self.pin.is_high();
        trace!(level, "gpio sample");
        Ok(level != self.active_low)
    }
}
