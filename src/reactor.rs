//! Maps capture statuses onto light actions and button presses onto
//! capture commands.
//!
use log::*;

use crate::config::{Config, LightAction};
use crate::echo::{self, CaptureDevice};
use crate::errors::Error;
use crate::indicators::{Indicator, IndicatorError};

/// Status values the appliance is known to report. Anything else goes
/// through the `unknown` light action.
pub(crate) const RECOGNIZED_STATES: [&str; 5] =
    ["inactive", "active", "waiting", "complete", "paused"];

/// Look up the light action configured under `key`, or nothing if the entry
/// is missing or malformed. Missing entries only cost a log line; the loop
/// keeps running with the light unchanged.
pub(crate) fn action_for(config: &Config, key: &str) -> Option<LightAction> {
    let value = match config.lights.get(key) {
        Some(value) => value,
        None => {
            error!("Bad light state config: no entry for {}", key);
            return None;
        }
    };
    match serde_json::from_value(value.clone()) {
        Ok(action) => Some(action),
        Err(error) => {
            error!("Bad light state config for {}: {}", key, error);
            None
        }
    }
}

/// The action for a reported status: recognized statuses map through their
/// own table entry, everything else through `unknown`.
pub(crate) fn map_status_to_action(config: &Config, state: &str) -> Option<LightAction> {
    if RECOGNIZED_STATES.contains(&state) {
        action_for(config, state)
    } else {
        warn!("Capture device in unknown state: {}", state);
        action_for(config, "unknown")
    }
}

/// Drive the indicator to show `action`.
///
/// Any running flash is stopped first so two flash timers can never
/// overlap. A colour the device cannot show is a config problem, not a
/// device failure, so it is logged and swallowed here.
pub(crate) fn apply_light_action(
    action: &LightAction,
    indicator: &mut dyn Indicator,
) -> Result<(), Error> {
    indicator.flashing_stop().map_err(Error::Indicator)?;
    let result = if action.flash {
        indicator.flashing_start(&action.colour, action.flash_speed)
    } else {
        indicator.set_light(&action.colour)
    };
    match result {
        Err(IndicatorError::BadColour(colour)) => {
            error!("Bad light state config: unsupported colour {}", colour);
            Ok(())
        }
        other => other.map_err(Error::Indicator),
    }
}

/// Poll the appliance and update the indicator on a change of state.
///
/// Returns the freshly observed state. When it matches `state_old` the
/// indicator is left alone, so repeated polls cost no device writes.
pub(crate) fn check_status(
    capture: &dyn CaptureDevice,
    indicator: &mut dyn Indicator,
    config: &Config,
    state_old: Option<&str>,
) -> Result<String, Error> {
    let status_str = capture.capture_status_str().map_err(Error::Echo)?;
    debug!("{}", status_str);
    let state = echo::parse_state(&status_str).map_err(Error::Echo)?;
    debug!("Capture device in state {}", state);

    if state_old == Some(state.as_str()) {
        // Avoid unnecessary changes
        return Ok(state);
    }
    info!(
        "Change of state from {} to {}",
        state_old.unwrap_or("none"),
        state
    );
    if let Some(action) = map_status_to_action(config, &state) {
        apply_light_action(&action, indicator)?;
    }
    Ok(state)
}

/// See whether the lamp's button has been pressed, and pause or resume the
/// capture accordingly. Presses in any other state do nothing.
pub(crate) fn check_button(
    indicator: &mut dyn Indicator,
    capture: &dyn CaptureDevice,
    state: Option<&str>,
) -> Result<(), Error> {
    if !indicator.read_switch().map_err(Error::Indicator)? {
        return Ok(());
    }
    debug!("Button pressed while in state {}", state.unwrap_or("none"));
    match state {
        Some("active") => capture.capture_pause().map_err(Error::Echo),
        Some("paused") => capture.capture_record().map_err(Error::Echo),
        _ => Ok(()),
    }
}
