//!
//! # Indicator devices
//!
//! The lamps echolight can drive. All of them expose the same small
//! capability surface: a solid colour, hardware or timer driven flashing,
//! brightness, and a button. The variant is picked by the `indicator` field
//! of the config:
//!
//! - `delcom` - a Delcom Products generation 2 USB status light
//! - `exec:/path/to/helper` - an external helper program driven over argv
//! - `dummy` - logs what it would do, for commissioning without hardware
//!
mod delcom;
mod dummy;
mod errors;
mod exec;

use delcom::DelcomIndicator;
use dummy::DummyIndicator;
pub(crate) use errors::IndicatorError;
use exec::ExecIndicator;

/// Capability surface of an indicator lamp.
///
/// `flashing_stop` must be idempotent: callers invoke it before every new
/// light action to make sure flash timers never overlap.
pub(crate) trait Indicator: Send + std::fmt::Debug {
    /// Show a solid colour. `"off"` darkens the lamp.
    fn set_light(&mut self, colour: &str) -> Result<(), IndicatorError>;
    /// Flash the given colour, spending `flash_speed` seconds in each state.
    fn flashing_start(&mut self, colours: &str, flash_speed: f64) -> Result<(), IndicatorError>;
    /// Stop any flashing. A no-op when nothing is flashing.
    fn flashing_stop(&mut self) -> Result<(), IndicatorError>;
    /// Set LED brightness, 0 to 100.
    fn set_brightness(&mut self, brightness: u8) -> Result<(), IndicatorError>;
    /// True if the lamp's button has been pressed since the last read.
    fn read_switch(&mut self) -> Result<bool, IndicatorError>;
}

/// Build the indicator named by the config's `indicator` field.
pub(crate) fn get_device(name: &str) -> Result<Box<dyn Indicator>, IndicatorError> {
    if let Some(helper) = name.strip_prefix("exec:") {
        return Ok(Box::new(ExecIndicator::new(helper)));
    }
    match name {
        "delcom" => Ok(Box::new(DelcomIndicator::open()?)),
        "dummy" => Ok(Box::new(DummyIndicator)),
        other => Err(IndicatorError::UnknownKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn unknown_kind_is_rejected() {
        assert_matches!(get_device("lava-lamp"), Err(IndicatorError::UnknownKind(_)));
    }

    #[test]
    fn dummy_is_always_available() {
        let mut device = get_device("dummy").unwrap();
        device.set_light("red").unwrap();
        device.set_brightness(50).unwrap();
        assert!(!device.read_switch().unwrap());
    }

    #[test]
    fn stopping_a_flash_that_never_started_is_a_no_op() {
        let mut device = get_device("dummy").unwrap();
        device.flashing_stop().unwrap();
        device.flashing_stop().unwrap();

        // Same for the helper-driven lamp: no helper process is spawned, so
        // even a bogus path cannot fail here.
        let mut device = get_device("exec:/nonexistent/helper").unwrap();
        device.flashing_stop().unwrap();
        device.flashing_stop().unwrap();
    }
}
