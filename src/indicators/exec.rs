//! Indicator driven through an external helper program.
//!
//! The helper is invoked as `helper set <colour>`, `helper brightness <n>`
//! and `helper switch` (prints `pressed` or `1` when the button was hit).
//! Flashing is emulated with a thread that alternates the colour and off,
//! since the helper surface has no flash verb of its own.
//!
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

use super::errors::IndicatorError;
use super::Indicator;

#[derive(Debug)]
pub(crate) struct ExecIndicator {
    program: PathBuf,
    flasher: Option<Flasher>,
}

#[derive(Debug)]
struct Flasher {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl ExecIndicator {
    pub(crate) fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            flasher: None,
        }
    }

    fn run_helper(program: &Path, args: &[&str]) -> Result<String, IndicatorError> {
        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(IndicatorError::Helper(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn flash_loop(program: PathBuf, colour: String, period: Duration, stop: Receiver<()>) {
        let states = [colour.as_str(), "off"];
        for &state in states.iter().cycle() {
            if let Err(error) = Self::run_helper(&program, &["set", state]) {
                warn!("Indicator helper failed while flashing: {}", error);
                break;
            }
            match stop.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Indicator for ExecIndicator {
    fn set_light(&mut self, colour: &str) -> Result<(), IndicatorError> {
        self.flashing_stop()?;
        Self::run_helper(&self.program, &["set", colour]).map(drop)
    }

    fn flashing_start(&mut self, colours: &str, flash_speed: f64) -> Result<(), IndicatorError> {
        self.flashing_stop()?;

        let period = Duration::from_secs_f64(flash_speed.clamp(0.1, 60.0));
        let (stop, stop_rx) = bounded(1);
        let program = self.program.clone();
        let colour = colours.to_string();
        let handle = std::thread::spawn(move || Self::flash_loop(program, colour, period, stop_rx));
        self.flasher = Some(Flasher { stop, handle });
        Ok(())
    }

    fn flashing_stop(&mut self) -> Result<(), IndicatorError> {
        if let Some(flasher) = self.flasher.take() {
            // The flasher may already have bailed out, so a dead channel is fine
            let _ = flasher.stop.send(());
            let _ = flasher.handle.join();
            Self::run_helper(&self.program, &["set", "off"]).map(drop)?;
        }
        Ok(())
    }

    fn set_brightness(&mut self, brightness: u8) -> Result<(), IndicatorError> {
        Self::run_helper(&self.program, &["brightness", &brightness.to_string()]).map(drop)
    }

    fn read_switch(&mut self) -> Result<bool, IndicatorError> {
        let answer = Self::run_helper(&self.program, &["switch"])?;
        Ok(answer == "pressed" || answer == "1")
    }
}

impl Drop for ExecIndicator {
    fn drop(&mut self) {
        if let Some(flasher) = self.flasher.take() {
            let _ = flasher.stop.send(());
            let _ = flasher.handle.join();
        }
        let _ = Self::run_helper(&self.program, &["set", "off"]);
    }
}
