//! The polling loop that does the actual work: keep a connection to the
//! capture appliance, mirror its state onto the indicator, and obey the
//! indicator's button.
//!
//! The loop is structured as three nested cycles. The outer one owns the
//! indicator device and rebuilds it when it goes missing or the config
//! swaps it out. The middle one owns the appliance connection and carries
//! the backoff after a failure. The inner one is the 1 Hz poll tick.
//! Every cycle head and every sleep second deposits a heartbeat for the
//! watchdog.
//!
use crossbeam_channel::Sender;
use log::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::{self, Config};
use crate::echo::{CaptureDevice, EchoClient, EchoError};
use crate::errors::Error;
use crate::indicators::{self, Indicator, IndicatorError};
use crate::reactor;
use crate::utils::RunFlag;
use crate::watchdog::{Heartbeat, Supervised};

/// Builds a fresh appliance client from the current config.
pub(crate) type Connector =
    Box<dyn Fn(&Config) -> Result<Box<dyn CaptureDevice>, EchoError> + Send>;
/// Builds the indicator named by the config's `indicator` field.
pub(crate) type DeviceFactory =
    Box<dyn Fn(&str) -> Result<Box<dyn Indicator>, IndicatorError> + Send>;

/// The loop's cadences. Only tests deviate from the defaults.
pub(crate) struct Timings {
    /// Pause between polls of the appliance.
    pub tick: Duration,
    /// Pause after a failed connection attempt.
    pub reconnect_backoff: Duration,
    /// Pause before looking for the indicator hardware again.
    pub device_backoff: Duration,
    /// Poll ticks between config reloads.
    pub reload_ticks: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(60),
            device_backoff: Duration::from_secs(10),
            reload_ticks: 60,
        }
    }
}

pub(crate) struct MainLoop {
    config_path: PathBuf,
    heartbeat: Sender<Instant>,
    running: RunFlag,
    timings: Timings,
    connect: Connector,
    devices: DeviceFactory,
}

impl MainLoop {
    pub(crate) fn new(config_path: PathBuf, heartbeat: Heartbeat) -> Self {
        Self::with_collaborators(
            config_path,
            heartbeat,
            Timings::default(),
            Box::new(|config: &Config| -> Result<Box<dyn CaptureDevice>, EchoError> {
                let address = config.ip.as_deref().ok_or(EchoError::NoAddress)?;
                let client = EchoClient::new(address, &config.user, &config.pass)?;
                Ok(Box::new(client))
            }),
            Box::new(indicators::get_device),
        )
    }

    pub(crate) fn with_collaborators(
        config_path: PathBuf,
        heartbeat: Heartbeat,
        timings: Timings,
        connect: Connector,
        devices: DeviceFactory,
    ) -> Self {
        Self {
            config_path,
            heartbeat,
            running: RunFlag::new(),
            timings,
            connect,
            devices,
        }
    }

    fn beat(&self) {
        let _ = self.heartbeat.send(Instant::now());
    }

    /// Stop doing execution, but keep heartbeating and checking the run
    /// flag once a second so neither the watchdog nor shutdown stalls on a
    /// long backoff.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running.is_running() {
            self.beat();
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_secs(1)));
        }
    }

    /// Reload the config and apply a brightness change in place. Hands the
    /// changed keys back for the caller's own reactions. A reload failure
    /// keeps the previous config running.
    fn refresh_config(&self, config: &mut Config, indicator: &mut dyn Indicator) -> HashSet<String> {
        let changed = match config::load(&self.config_path) {
            Ok(new) => {
                let changed = config::changed_keys(config, &new);
                *config = new;
                changed
            }
            Err(error) => {
                error!("Failed to reload config, keeping the previous one: {}", error);
                HashSet::new()
            }
        };
        if !changed.is_empty() {
            debug!("Config keys changed: {:?}", changed);
        }
        if changed.contains("brightness") {
            if let Err(error) = indicator.set_brightness(config.brightness) {
                warn!("Unable to set indicator brightness: {}", error);
            }
        }
        changed
    }

    /// Build a client and probe it. On failure, show the error light action
    /// once per disconnected episode and back off.
    fn try_connect(
        &self,
        config: &Config,
        error_flash: &mut bool,
        indicator: &mut dyn Indicator,
    ) -> Option<Box<dyn CaptureDevice>> {
        let outcome = (self.connect)(config).and_then(|capture| {
            capture.connection_test()?;
            Ok(capture)
        });
        match outcome {
            Ok(capture) => Some(capture),
            Err(error) => {
                error!(
                    "Something went wrong connecting to the capture device. \
                     Will try again in a minute."
                );
                debug!("{:?}", error);
                if !*error_flash {
                    if let Some(action) = reactor::action_for(config, "error") {
                        if let Err(error) = reactor::apply_light_action(&action, indicator) {
                            warn!("Unable to show the error state: {}", error);
                        }
                    }
                    *error_flash = true;
                }
                self.sleep(self.timings.reconnect_backoff);
                None
            }
        }
    }

    fn main_loop(&self) -> Result<(), Error> {
        self.beat();
        let mut config = config::load(&self.config_path)?;

        'device: while self.running.is_running() {
            self.beat();

            let mut indicator = match (self.devices)(&config.indicator) {
                Ok(device) => device,
                Err(IndicatorError::NoDevice) => {
                    error!(
                        "Can not connect to indicator device. \
                         Check config and check it is plugged in."
                    );
                    self.sleep(self.timings.device_backoff);
                    match config::load(&self.config_path) {
                        Ok(new) => config = new,
                        Err(error) => {
                            error!("Failed to reload config, keeping the previous one: {}", error)
                        }
                    }
                    continue 'device;
                }
                Err(IndicatorError::UnknownKind(kind)) => {
                    error!("Unknown indicator type {} in config", kind);
                    self.sleep(self.timings.device_backoff);
                    match config::load(&self.config_path) {
                        Ok(new) => config = new,
                        Err(error) => {
                            error!("Failed to reload config, keeping the previous one: {}", error)
                        }
                    }
                    continue 'device;
                }
                Err(error) => return Err(Error::Indicator(error)),
            };
            if let Err(error) = indicator.set_brightness(config.brightness) {
                warn!("Unable to set indicator brightness: {}", error);
            }
            let mut error_flash = false;

            'reconnect: while self.running.is_running() {
                self.beat();

                let changed = self.refresh_config(&mut config, indicator.as_mut());
                if changed.contains("indicator") {
                    info!("Change indicator type to {}.", config.indicator);
                    continue 'device;
                }

                info!(
                    "Got capture device url {}",
                    config.ip.as_deref().unwrap_or("<unset>")
                );
                let capture = match self.try_connect(&config, &mut error_flash, indicator.as_mut())
                {
                    Some(capture) => capture,
                    None => continue 'reconnect,
                };

                // Connected, so (re)set the tracked state
                error_flash = false;
                let mut state: Option<String> = None;
                let mut count = 0u32;

                while self.running.is_running() {
                    self.beat();

                    count += 1;
                    if count >= self.timings.reload_ticks {
                        debug!("Reloading config");
                        count = 0;
                        let changed = self.refresh_config(&mut config, indicator.as_mut());
                        if changed.contains("indicator") {
                            info!("Change indicator type to {}.", config.indicator);
                            continue 'device;
                        }
                        if ["user", "pass", "ip"].iter().any(|key| changed.contains(*key)) {
                            info!("Capture device details changed, reconnecting.");
                            continue 'reconnect;
                        }
                    }

                    match reactor::check_status(
                        capture.as_ref(),
                        indicator.as_mut(),
                        &config,
                        state.as_deref(),
                    ) {
                        Ok(new_state) => state = Some(new_state),
                        Err(Error::Echo(EchoError::BadStatus(message))) => {
                            warn!("Bad message from capture device: {}", message);
                        }
                        Err(Error::Echo(error)) => {
                            error!("Lost connection to capture device: {}", error);
                            self.sleep(self.timings.tick);
                            continue 'reconnect;
                        }
                        Err(Error::Indicator(error)) => {
                            error!("Indicator device failed: {}", error);
                            self.sleep(self.timings.device_backoff);
                            continue 'device;
                        }
                        Err(error) => return Err(error),
                    }

                    if let Err(error) = reactor::check_button(
                        indicator.as_mut(),
                        capture.as_ref(),
                        state.as_deref(),
                    ) {
                        match error {
                            Error::Echo(error) => {
                                error!("Lost connection to capture device: {}", error);
                                self.sleep(self.timings.tick);
                                continue 'reconnect;
                            }
                            Error::Indicator(error) => {
                                error!("Indicator device failed: {}", error);
                                self.sleep(self.timings.device_backoff);
                                continue 'device;
                            }
                            error => return Err(error),
                        }
                    }

                    self.sleep(self.timings.tick);
                }
            }
        }
        Ok(())
    }
}

impl Supervised for MainLoop {
    fn run(&mut self) {
        info!("Starting echolight main loop");
        if let Err(error) = self.main_loop() {
            error!("Main loop failed: {:?}", error);
        }
        // The indicator is dropped on the way out, which leaves the lamp dark
        info!("Closed echolight main loop.");
    }

    fn run_flag(&self) -> RunFlag {
        self.running.clone()
    }
}
