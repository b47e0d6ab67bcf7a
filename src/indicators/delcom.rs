//! Driver for Delcom Products generation 2 USB status lights.
//!
//! Everything goes over 8-byte HID feature reports: the first byte is the
//! major command, the second the minor command, then a 16-bit payload and
//! padding. Flashing is done by the lamp itself via per-pin duty-cycle
//! registers, so no timer runs on the host.
//!
use hidapi::{HidApi, HidDevice};
use log::*;

use super::errors::IndicatorError;
use super::Indicator;

const VENDOR_ID: u16 = 0x0fc5;
const PRODUCT_ID: u16 = 0xb080;

// Command bytes from the Delcom USB HID datasheet
const MAJOR_CMD: u8 = 101;
const WRITE_PORT1: u8 = 0x0c;
const FLASH_BASE: u8 = 20;
const SET_PWM: u8 = 34;
const ENABLE_EVENT_COUNTER: u8 = 38;
const READ_EVENT_COUNTER: u8 = 8;

#[derive(Debug)]
pub(crate) struct DelcomIndicator {
    device: HidDevice,
    current_colour: String,
    flashing_pin: Option<u8>,
}

impl DelcomIndicator {
    /// Open the first attached lamp, force it dark and arm the button's
    /// event counter.
    pub(crate) fn open() -> Result<Self, IndicatorError> {
        let api = HidApi::new()?;
        let device = api
            .open(VENDOR_ID, PRODUCT_ID)
            .map_err(|_| IndicatorError::NoDevice)?;

        let mut indicator = Self {
            device,
            current_colour: "off".to_string(),
            flashing_pin: None,
        };
        indicator.force_off()?;
        indicator.write_data([MAJOR_CMD, ENABLE_EVENT_COUNTER, 0x01, 0x00])?;
        indicator.set_brightness(50)?;
        Ok(indicator)
    }

    /// LED pins for a colour, in the lamp's port 1 bit layout.
    fn pins(colour: &str) -> Result<u8, IndicatorError> {
        match colour {
            "green" => Ok(0x01),
            "red" => Ok(0x02),
            "yellow" => Ok(0x04),
            "orange" => Ok(0x06),
            "off" => Ok(0x00),
            other => Err(IndicatorError::BadColour(other.to_string())),
        }
    }

    /// Single pin to flash. Only the plain colours map to one pin.
    fn flash_pin(colour: &str) -> Result<u8, IndicatorError> {
        match colour {
            "green" => Ok(1),
            "red" => Ok(2),
            "yellow" => Ok(4),
            other => Err(IndicatorError::BadColour(other.to_string())),
        }
    }

    fn write_data(&self, data: [u8; 4]) -> Result<(), IndicatorError> {
        let packet = [data[0], data[1], data[2], data[3], 0x00, 0x00, 0x00, 0x00];
        self.device.send_feature_report(&packet)?;
        Ok(())
    }

    /// Make sure flashing and LEDs are definitely off, whatever state a
    /// previous run left the lamp in.
    fn force_off(&mut self) -> Result<(), IndicatorError> {
        self.write_data([MAJOR_CMD, WRITE_PORT1, 0x00, 0xff])?;
        for pin in [1, 2, 4] {
            self.write_data([MAJOR_CMD, FLASH_BASE, pin, 0x00])?;
        }
        self.current_colour = "off".to_string();
        self.flashing_pin = None;
        Ok(())
    }
}

impl Indicator for DelcomIndicator {
    fn set_light(&mut self, colour: &str) -> Result<(), IndicatorError> {
        let pins = Self::pins(colour)?;
        if self.current_colour == colour {
            return Ok(());
        }
        self.write_data([MAJOR_CMD, WRITE_PORT1, 0x00, 0xff])?;
        self.write_data([MAJOR_CMD, WRITE_PORT1, pins, 0xff])?;
        self.current_colour = colour.to_string();
        Ok(())
    }

    fn flashing_start(&mut self, colours: &str, flash_speed: f64) -> Result<(), IndicatorError> {
        let pin = Self::flash_pin(colours)?;

        // The duty-cycle registers hold hundredths of a second in one byte
        let speed = (flash_speed.clamp(0.01, 2.55) * 100.0) as u8;

        self.set_light(colours)?;
        self.write_data([MAJOR_CMD, FLASH_BASE + pin, speed, speed])?;
        self.write_data([MAJOR_CMD, FLASH_BASE, 0x00, pin])?;
        self.flashing_pin = Some(pin);
        Ok(())
    }

    fn flashing_stop(&mut self) -> Result<(), IndicatorError> {
        if let Some(pin) = self.flashing_pin.take() {
            self.set_light("off")?;
            self.write_data([MAJOR_CMD, FLASH_BASE, pin, 0x00])?;
        }
        Ok(())
    }

    fn set_brightness(&mut self, brightness: u8) -> Result<(), IndicatorError> {
        let power = brightness.min(100);
        for channel in [0, 1, 2] {
            self.write_data([MAJOR_CMD, SET_PWM, channel, power])?;
        }
        Ok(())
    }

    fn read_switch(&mut self) -> Result<bool, IndicatorError> {
        let mut buffer = [0u8; 9];
        buffer[0] = READ_EVENT_COUNTER;
        let read = self.device.get_feature_report(&mut buffer)?;
        if read < 2 {
            // Lamp answered with nothing useful, disregard
            warn!("Short read from indicator button");
            return Ok(false);
        }
        let presses = buffer[1];
        Ok(presses > 0)
    }
}

impl Drop for DelcomIndicator {
    fn drop(&mut self) {
        // Leave the lamp dark rather than stuck on the last state
        let _ = self.flashing_stop();
        let _ = self.set_light("off");
    }
}
