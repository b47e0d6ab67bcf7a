//! Client for the capture appliance's HTTP monitoring and control API.
//!
use err_derive::Error;
use log::*;
use std::time::Duration;

/// The main error for capture appliance requests
#[derive(Debug, Error)]
pub enum EchoError {
    /// Raised when the appliance cannot be reached
    #[error(display = "Lost connection to capture device")]
    LostConnection,
    /// Raised when the appliance rejects a request, e.g. bad credentials
    #[error(display = "Capture device refused request: {}", _0)]
    Denied(reqwest::StatusCode),
    /// Raised when the status message is missing the expected field
    #[error(display = "Bad status message: {}", _0)]
    BadStatus(String),
    /// Raised when no appliance address has been configured or supplied by
    /// the config server
    #[error(display = "No capture device address in configuration")]
    NoAddress,
    /// Raised on any other request failure
    #[error(display = "Request error")]
    Http(#[error(source)] reqwest::Error),
}

/// The operations the polling loop needs from a capture appliance.
pub(crate) trait CaptureDevice: Send {
    /// Cheap probe that the appliance is reachable and accepting requests.
    fn connection_test(&self) -> Result<(), EchoError>;
    /// The raw status line, semicolon-delimited `key=value` pairs.
    fn capture_status_str(&self) -> Result<String, EchoError>;
    /// Pause the running capture.
    fn capture_pause(&self) -> Result<(), EchoError>;
    /// Resume a paused capture.
    fn capture_record(&self) -> Result<(), EchoError>;
}

/// HTTP client for an Echo360 capture appliance.
///
/// The appliances ship with self-signed certificates, so verification is
/// deliberately off.
pub(crate) struct EchoClient {
    base: String,
    user: String,
    pass: String,
    client: reqwest::blocking::Client,
}

impl EchoClient {
    pub(crate) fn new(address: &str, user: &str, pass: &str) -> Result<Self, EchoError> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base: address.trim_end_matches('/').to_string(),
            user: user.to_string(),
            pass: pass.to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> Result<String, EchoError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base, path))
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .map_err(classify)?;
        if !response.status().is_success() {
            return Err(EchoError::Denied(response.status()));
        }
        Ok(response.text()?)
    }

    fn post(&self, path: &str) -> Result<(), EchoError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base, path))
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .map_err(classify)?;
        if !response.status().is_success() {
            return Err(EchoError::Denied(response.status()));
        }
        Ok(())
    }
}

fn classify(error: reqwest::Error) -> EchoError {
    if error.is_connect() || error.is_timeout() {
        EchoError::LostConnection
    } else {
        EchoError::Http(error)
    }
}

impl CaptureDevice for EchoClient {
    fn connection_test(&self) -> Result<(), EchoError> {
        self.get("status/system").map(drop)
    }

    fn capture_status_str(&self) -> Result<String, EchoError> {
        self.get("status/monitoring")
    }

    fn capture_pause(&self) -> Result<(), EchoError> {
        debug!("Requesting capture pause");
        self.post("capture/pause")
    }

    fn capture_record(&self) -> Result<(), EchoError> {
        debug!("Requesting capture record");
        self.post("capture/record")
    }
}

/// Pull the `State` value out of a raw status line.
pub(crate) fn parse_state(status: &str) -> Result<String, EchoError> {
    status
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == "State")
        .map(|(_, value)| value.trim().to_string())
        .ok_or_else(|| EchoError::BadStatus(status.to_string()))
}
