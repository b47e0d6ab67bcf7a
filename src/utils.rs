//! Contains code that is not specific to any one module
//!
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative run flag shared between the watchdog and the loop it
/// supervises. Cloning yields another handle onto the same flag.
#[derive(Clone, Debug)]
pub(crate) struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the unit tests: a recording indicator, a
    //! scriptable capture device and a one-shot HTTP responder.

    use crate::echo::{CaptureDevice, EchoError};
    use crate::indicators::{Indicator, IndicatorError};
    use env_logger::Env;
    use std::collections::VecDeque;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    pub(crate) fn init() {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    }

    /// What a [`RecordingIndicator`] was asked to do, in call order.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum IndicatorCall {
        SetLight(String),
        FlashStart(String),
        FlashStop,
        Brightness(u8),
    }

    #[derive(Default, Debug)]
    pub(crate) struct IndicatorLog {
        pub calls: Mutex<Vec<IndicatorCall>>,
        pub presses: Mutex<VecDeque<bool>>,
    }

    impl IndicatorLog {
        pub(crate) fn count(&self, call: &IndicatorCall) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| *c == call)
                .count()
        }

        pub(crate) fn set_lights(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    IndicatorCall::SetLight(colour) => Some(colour.clone()),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn flash_starts(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, IndicatorCall::FlashStart(_)))
                .count()
        }

        pub(crate) fn press_button(&self) {
            self.presses.lock().unwrap().push_back(true);
        }
    }

    #[derive(Debug)]
    pub(crate) struct RecordingIndicator {
        log: Arc<IndicatorLog>,
    }

    impl RecordingIndicator {
        pub(crate) fn new(log: Arc<IndicatorLog>) -> Self {
            Self { log }
        }
    }

    impl Indicator for RecordingIndicator {
        fn set_light(&mut self, colour: &str) -> Result<(), IndicatorError> {
            self.log
                .calls
                .lock()
                .unwrap()
                .push(IndicatorCall::SetLight(colour.to_string()));
            Ok(())
        }

        fn flashing_start(&mut self, colours: &str, _flash_speed: f64) -> Result<(), IndicatorError> {
            self.log
                .calls
                .lock()
                .unwrap()
                .push(IndicatorCall::FlashStart(colours.to_string()));
            Ok(())
        }

        fn flashing_stop(&mut self) -> Result<(), IndicatorError> {
            self.log.calls.lock().unwrap().push(IndicatorCall::FlashStop);
            Ok(())
        }

        fn set_brightness(&mut self, brightness: u8) -> Result<(), IndicatorError> {
            self.log
                .calls
                .lock()
                .unwrap()
                .push(IndicatorCall::Brightness(brightness));
            Ok(())
        }

        fn read_switch(&mut self) -> Result<bool, IndicatorError> {
            Ok(self.log.presses.lock().unwrap().pop_front().unwrap_or(false))
        }
    }

    #[derive(Default)]
    pub(crate) struct CaptureLog {
        pub pauses: AtomicUsize,
        pub records: AtomicUsize,
    }

    pub(crate) struct FakeCapture {
        pub status: Arc<Mutex<String>>,
        pub log: Arc<CaptureLog>,
    }

    impl FakeCapture {
        pub(crate) fn reporting(status: &str) -> Self {
            Self {
                status: Arc::new(Mutex::new(status.to_string())),
                log: Arc::new(CaptureLog::default()),
            }
        }
    }

    impl CaptureDevice for FakeCapture {
        fn connection_test(&self) -> Result<(), EchoError> {
            Ok(())
        }

        fn capture_status_str(&self) -> Result<String, EchoError> {
            Ok(self.status.lock().unwrap().clone())
        }

        fn capture_pause(&self) -> Result<(), EchoError> {
            self.log.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn capture_record(&self) -> Result<(), EchoError> {
            self.log.records.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Spawn a minimal HTTP server answering every request with the response
    /// picked by `responder` from the request target. Returns the base URL.
    pub(crate) fn serve_http<F>(responder: F) -> String
    where
        F: Fn(&str) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                // Drain the headers so the client sees a clean close
                loop {
                    let mut line = String::new();
                    match reader.read_line(&mut line) {
                        Ok(_) if line.trim().is_empty() => break,
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = responder(target);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = reader.into_inner().write_all(response.as_bytes());
            }
        });
        url
    }
}
