//! Watches the main loop and replaces it if it hangs.
//!
//! The loop deposits a timestamp on an unbounded channel at least once a
//! second while healthy. The watchdog blocks on that channel with a
//! generous timeout; silence means the loop is wedged somewhere it cannot
//! observe its run flag (typically a stuck device call), so the watchdog
//! abandons it and starts a fresh one.
//!
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use log::*;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::utils::RunFlag;

/// How long without a heartbeat before the loop is declared hung.
pub(crate) const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(100);

/// Producer side of the liveness channel.
pub(crate) type Heartbeat = Sender<Instant>;

/// A unit of work the watchdog can run and replace: it heartbeats while
/// healthy and winds down when its run flag is lowered.
pub(crate) trait Supervised: Send + 'static {
    fn run(&mut self);
    fn run_flag(&self) -> RunFlag;
}

pub(crate) struct Watchdog {
    timeout: Duration,
    running: RunFlag,
}

impl Watchdog {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            running: RunFlag::new(),
        }
    }

    /// Handle that makes [`run`](Self::run) wind down, e.g. from a signal
    /// handler.
    pub(crate) fn stop_handle(&self) -> RunFlag {
        self.running.clone()
    }

    /// Run `factory`'s worker until stopped, replacing the worker with a
    /// fresh instance whenever its heartbeats dry up.
    pub(crate) fn run<W, F>(&self, factory: F)
    where
        W: Supervised,
        F: Fn(Heartbeat) -> W,
    {
        info!("Starting watchdog thread");
        let (heartbeat, heartbeats) = unbounded();
        let mut worker = Worker::start(factory(heartbeat.clone()));
        while self.running.is_running() {
            match heartbeats.recv_timeout(self.timeout) {
                Ok(_) => trace!("Got message from main loop."),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Main loop hung, restarting.");
                    worker.abandon();
                    worker = Worker::start(factory(heartbeat.clone()));
                }
                // Cannot happen while we hold a sender, but be safe
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        worker.stop();
        info!("Closing watchdog thread");
    }
}

/// A running supervised worker and its lifecycle handles.
struct Worker {
    flag: RunFlag,
    handle: JoinHandle<()>,
}

impl Worker {
    fn start<W: Supervised>(mut worker: W) -> Self {
        let flag = worker.run_flag();
        let handle = std::thread::spawn(move || worker.run());
        Self { flag, handle }
    }

    /// Forced replace: lower the flag and walk away. A hung worker may
    /// never observe the flag, which is exactly why it is not joined.
    fn abandon(&self) {
        self.flag.stop();
    }

    /// Graceful stop: lower the flag and wait for the worker to finish.
    fn stop(self) {
        self.flag.stop();
        if self.handle.join().is_err() {
            error!("Main loop panicked during shutdown");
        }
    }
}
