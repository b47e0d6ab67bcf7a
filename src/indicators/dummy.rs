//! Pretends to be an indicator so everything else can be tested without
//! hardware on the desk.
//!
use log::*;

use super::errors::IndicatorError;
use super::Indicator;

#[derive(Debug)]
pub(crate) struct DummyIndicator;

impl Indicator for DummyIndicator {
    fn set_light(&mut self, colour: &str) -> Result<(), IndicatorError> {
        info!("Set to {}", colour);
        Ok(())
    }

    fn flashing_start(&mut self, colours: &str, flash_speed: f64) -> Result<(), IndicatorError> {
        info!("Starting flashing {} every {}s", colours, flash_speed);
        Ok(())
    }

    fn flashing_stop(&mut self) -> Result<(), IndicatorError> {
        info!("Stopping flashing");
        Ok(())
    }

    fn set_brightness(&mut self, _brightness: u8) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn read_switch(&mut self) -> Result<bool, IndicatorError> {
        Ok(false)
    }
}
