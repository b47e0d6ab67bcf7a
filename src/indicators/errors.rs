use err_derive::Error;

/// The main error for indicator devices
#[derive(Debug, Error)]
pub enum IndicatorError {
    /// Raised when the configured device cannot be found, e.g. unplugged
    #[error(display = "No indicator device found")]
    NoDevice,
    /// Raised when the config names an indicator kind that does not exist
    #[error(display = "Unknown indicator kind: {}", _0)]
    UnknownKind(String),
    /// Raised when the device cannot show the requested colour
    #[error(display = "Unsupported colour: {}", _0)]
    BadColour(String),
    /// Raised when talking to the USB device fails
    #[error(display = "USB HID error")]
    Hid(#[error(source)] hidapi::HidError),
    /// Raised when the helper program cannot be spawned
    #[error(display = "Helper process error")]
    Io(#[error(source)] std::io::Error),
    /// Raised when the helper program exits with a failure
    #[error(display = "Helper process failed: {}", _0)]
    Helper(String),
}
