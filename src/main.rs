#![warn(missing_docs)]
//!
//! # Echolight
//!
//! Echolight watches an Echo360 capture appliance and mirrors its recording
//! state onto a USB indicator lamp, so an operator can see at a glance
//! whether a capture is running, paused or broken without opening the web
//! console. Pressing the button on the lamp pauses an active capture and
//! resumes a paused one.
//!
//! The daemon polls the appliance once a second, reloads its configuration
//! periodically from a config server, and is itself supervised by a watchdog
//! that replaces the polling loop if it stops making progress.
//!
use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::*;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::fs::File;

mod cmdline;
mod config;
mod echo;
mod errors;
mod indicators;
mod mainloop;
mod reactor;
mod utils;
mod watchdog;

use cmdline::Opt;
use mainloop::MainLoop;
use watchdog::Watchdog;

fn main() -> Result<()> {
    let opt = Opt::parse();

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = &opt.log_file {
        let file = File::create(path)
            .with_context(|| format!("Unable to open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();

    info!(
        "Echolight {} {}",
        env!("ECHOLIGHT_VERSION"),
        env!("ECHOLIGHT_PROFILE")
    );

    // Surface an unreadable or unparseable config file before going
    // resident; the watchdog would otherwise restart a doomed loop forever.
    config::load_local(&opt.config)
        .with_context(|| format!("Failed to load configuration from {}", opt.config.display()))?;

    let watchdog = Watchdog::new(watchdog::HEARTBEAT_TIMEOUT);

    let stop = watchdog.stop_handle();
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, shutting down", signal);
            stop.stop();
        }
    });

    let config_path = opt.config;
    watchdog.run(move |heartbeat| MainLoop::new(config_path.clone(), heartbeat));

    info!("Echolight stopped");
    Ok(())
}
