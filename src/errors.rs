use err_derive::Error;

use crate::config::ConfigError;
use crate::echo::EchoError;
use crate::indicators::IndicatorError;

/// The main error for the polling loop
///
/// The loop reacts to each kind differently: capture-device errors send it
/// back to the reconnect sequence, indicator errors make it rebuild the
/// device, configuration errors are fatal at startup only.
#[derive(Debug, Error)]
#[allow(clippy::large_enum_variant)]
pub enum Error {
    /// Raised when the config file fails to load or validate
    #[error(display = "Configuration error")]
    Config(#[error(source)] ConfigError),
    /// Raised when talking to the capture appliance fails
    #[error(display = "Capture device error")]
    Echo(#[error(source)] EchoError),
    /// Raised when the indicator lamp fails or goes missing
    #[error(display = "Indicator error")]
    Indicator(#[error(source)] IndicatorError),
}
