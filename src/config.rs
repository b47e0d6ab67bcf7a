//! Config loading and merging.
//!
//! The daemon's configuration comes from two places: a local JSON file
//! holding the credentials and device selection, and a config server that
//! hands out the capture appliance's address and the status-to-light table.
//! The two are merged on every load, with the server's values winning, and
//! a built-in table papering over an unreachable server.
//!
use err_derive::Error;
use indoc::indoc;
use lazy_static::lazy_static;
use log::*;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Written out verbatim when no local config file is found.
pub(crate) const EXAMPLE_CONFIG: &str = indoc! {r#"
    {
        "user": "user",
        "pass": "pass",
        "indicator": "dummy",
        "logging": "INFO",
        "brightness": "50",
        "server": "http://example.com"
    }
"#};

/// Fields normally supplied by the config server. Used when it is
/// unreachable; never written into the local file.
const DEFAULT_CONFIG: &str = indoc! {r#"
    {
        "ip": "http://127.0.0.1",
        "active": {
                "colour": "red",
                "flash": false,
                "flash_speed": 1
        },
        "inactive": {
                "colour": "off",
                "flash": false,
                "flash_speed": 1
        },
        "complete": {
                "colour": "green",
                "flash": true,
                "flash_speed": 1
        },
        "waiting": {
                "colour": "off",
                "flash": false,
                "flash_speed": 1
        },
        "paused": {
                "colour": "yellow",
                "flash": false,
                "flash_speed": 1
        },
        "error": {
                "colour": "off",
                "flash": false,
                "flash_speed": 1
        },
        "unknown": {
                "colour": "off",
                "flash": false,
                "flash_speed": 1
        }
    }
"#};

lazy_static! {
    static ref DEFAULT_CONFIG_JSON: Map<String, Value> =
        match serde_json::from_str(DEFAULT_CONFIG) {
            Ok(Value::Object(map)) => map,
            _ => unreachable!("Built-in default config is a JSON object"),
        };
}

/// The main error for config loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Raised when there is an IO error such as being unable to read or
    /// create the config file
    #[error(display = "I/O error")]
    Io(#[error(source)] std::io::Error),
    /// Raised when the config file fails to deserialize
    #[error(display = "Check format of config file")]
    BadConfig(#[error(source)] serde_json::Error),
    /// Raised when the config fails validation
    #[error(display = "Validation error")]
    Validation(#[error(source)] validator::ValidationErrors),
    /// Raised when the config server returns something unusable
    #[error(display = "{}", _0)]
    Remote(String),
    /// Raised when the request to the config server fails outright
    #[error(display = "Request error")]
    Http(#[error(source)] reqwest::Error),
}

/// What the indicator should do for one capture status.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub(crate) struct LightAction {
    pub colour: String,
    pub flash: bool,
    #[serde(default = "default_flash_speed")]
    pub flash_speed: f64,
}

fn default_flash_speed() -> f64 {
    1.0
}

/// The merged local + server configuration.
///
/// The per-status light actions arrive as whatever extra keys the server
/// sends; they are kept as raw values and only parsed into [`LightAction`]
/// at lookup time so one bad entry cannot poison the whole table.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Validate)]
pub(crate) struct Config {
    pub user: String,
    pub pass: String,
    pub indicator: String,
    #[serde(default)]
    pub logging: Option<String>,
    #[serde(default = "default_brightness", deserialize_with = "number_or_string")]
    #[validate(range(min = 0, max = 100, message = "Brightness out of range"))]
    pub brightness: u8,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(flatten)]
    pub lights: HashMap<String, Value>,
}

fn default_brightness() -> u8 {
    50
}

// Config files in the field carry brightness as a quoted number.
fn number_or_string<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| serde::de::Error::custom("brightness out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("brightness is not a number")),
        _ => Err(serde::de::Error::custom("brightness should be a number")),
    }
}

/// Load and merge the full configuration.
///
/// The local file is created from [`EXAMPLE_CONFIG`] if absent. Remote
/// fields are merged over it, falling back to the built-in defaults with a
/// warning when the server cannot be reached.
pub(crate) fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut map = read_local(path)?;

    let server = map
        .get("server")
        .and_then(Value::as_str)
        .map(str::to_string);
    match server {
        None => {
            warn!("Can't find server URL in config, using default server settings.");
            map.extend(DEFAULT_CONFIG_JSON.clone());
        }
        Some(server) => match fetch_remote(&server) {
            Ok(fields) => map.extend(fields),
            Err(ConfigError::Remote(reason)) => {
                debug!("{}", reason);
                warn!(
                    "Config server refused to return details - check config server details. \
                     Using default config."
                );
                map.extend(DEFAULT_CONFIG_JSON.clone());
            }
            Err(error) => {
                debug!("{}", error);
                warn!("Cannot reach config server. Using default settings.");
                map.extend(DEFAULT_CONFIG_JSON.clone());
            }
        },
    }

    finish(map)
}

/// Load only the local file, skipping the config server. Used at startup to
/// catch a broken file before the daemon goes resident.
pub(crate) fn load_local(path: &Path) -> Result<Config, ConfigError> {
    finish(read_local(path)?)
}

fn finish(map: Map<String, Value>) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_value(Value::Object(map))?;
    config.validate()?;
    apply_log_level(&config);
    Ok(config)
}

fn read_local(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("Cannot find config file. Creating new one with defaults.");
            fs::write(path, EXAMPLE_CONFIG)?;
            EXAMPLE_CONFIG.to_string()
        }
        Err(error) => return Err(error.into()),
    };
    let map: Map<String, Value> = serde_json::from_str(&contents)?;
    Ok(map)
}

/// Fetch the capture device address and light table from the config server.
pub(crate) fn fetch_remote(server: &str) -> Result<Map<String, Value>, ConfigError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let table = get_checked(&client, &format!("{}?config", server))?;
    let mut fields: Map<String, Value> = serde_json::from_str(&table)
        .map_err(|error| ConfigError::Remote(format!("Bad light table from config server: {}", error)))?;

    let ip = get_checked(&client, server)?;
    fields.insert(
        "ip".to_string(),
        Value::String(format!("https://{}", ip.trim())),
    );
    Ok(fields)
}

// Grab a body and reject the things a misconfigured web server sends
// instead of an honest error status.
fn get_checked(client: &reqwest::blocking::Client, url: &str) -> Result<String, ConfigError> {
    let response = client.get(url).send()?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ConfigError::Remote("Server returned 404.".to_string()));
    }
    if !response.status().is_success() {
        return Err(ConfigError::Remote(format!(
            "Server returned {}.",
            response.status()
        )));
    }
    let body = response.text()?;
    if body.contains("<html>") {
        return Err(ConfigError::Remote(
            "Server responded with HTML document, check URL and try again.".to_string(),
        ));
    }
    if body.is_empty() || body == "404" || body.contains("Not Found") {
        return Err(ConfigError::Remote(
            "Server doesn't know this client.".to_string(),
        ));
    }
    Ok(body)
}

/// Top-level keys whose value differs between `old` and `new`, including
/// keys `old` lacks entirely. Keys dropped from `new` do not count.
pub(crate) fn changed_keys(old: &Config, new: &Config) -> HashSet<String> {
    let old_map = as_map(old);
    let new_map = as_map(new);
    new_map
        .into_iter()
        .filter(|(key, value)| old_map.get(key) != Some(value))
        .map(|(key, _)| key)
        .collect()
}

fn as_map(config: &Config) -> Map<String, Value> {
    match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => unreachable!("Config serializes to a JSON object"),
    }
}

fn apply_log_level(config: &Config) {
    let level = match config.logging.as_deref() {
        Some("DEBUG") => LevelFilter::Debug,
        Some("INFO") => LevelFilter::Info,
        Some("WARNING") => LevelFilter::Warn,
        Some("ERROR") => LevelFilter::Error,
        Some(other) => {
            warn!("Unrecognised logging level {} in config", other);
            return;
        }
        None => return,
    };
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::{init, serve_http};
    use assert_matches::assert_matches;
    use indoc::indoc;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echolight.json");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_is_created_from_example() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echolight.json");

        let config = load_local(&path).unwrap();

        assert!(path.is_file());
        assert_eq!(config.user, "user");
        assert_eq!(config.indicator, "dummy");
        assert_eq!(config.brightness, 50);
        assert_eq!(config.server.as_deref(), Some("http://example.com"));
    }

    #[test]
    fn malformed_file_is_reported() {
        init();
        let (_dir, path) = write_config("{not json");
        assert_matches!(load_local(&path), Err(ConfigError::BadConfig(_)));
    }

    #[test]
    fn brightness_range_is_validated() {
        init();
        let (_dir, path) = write_config(
            r#"{"user": "u", "pass": "p", "indicator": "dummy", "brightness": 150}"#,
        );
        assert_matches!(load_local(&path), Err(ConfigError::Validation(_)));
    }

    #[test]
    fn unreachable_server_falls_back_to_defaults() {
        init();
        // Nothing listens on port 1
        let (_dir, path) = write_config(indoc! {r#"
            {
                "user": "u",
                "pass": "p",
                "indicator": "dummy",
                "brightness": "50",
                "server": "http://127.0.0.1:1"
            }
        "#});

        let config = load(&path).unwrap();

        assert_eq!(config.ip.as_deref(), Some("http://127.0.0.1"));
        assert!(config.lights.contains_key("active"));
        assert!(config.lights.contains_key("error"));
        assert!(config.lights.contains_key("unknown"));
    }

    #[test]
    fn remote_fields_win_over_local() {
        init();
        let server = serve_http(|target| {
            if target.contains("?config") {
                (
                    200,
                    r#"{"active": {"colour": "orange", "flash": false, "flash_speed": 1}}"#
                        .to_string(),
                )
            } else {
                (200, "capture.example.edu\n".to_string())
            }
        });
        let (_dir, path) = write_config(&format!(
            indoc! {r#"
                {{
                    "user": "u",
                    "pass": "p",
                    "indicator": "dummy",
                    "ip": "http://stale.example.edu",
                    "server": "{}"
                }}
            "#},
            server
        ));

        let config = load(&path).unwrap();

        assert_eq!(config.ip.as_deref(), Some("https://capture.example.edu"));
        let action: LightAction =
            serde_json::from_value(config.lights["active"].clone()).unwrap();
        assert_eq!(action.colour, "orange");
    }

    #[test]
    fn html_body_is_a_remote_error() {
        init();
        let server = serve_http(|_| (200, "<html><body>login page</body></html>".to_string()));
        assert_matches!(fetch_remote(&server), Err(ConfigError::Remote(_)));
    }

    #[test]
    fn not_found_body_is_a_remote_error() {
        init();
        let server = serve_http(|_| (200, "404".to_string()));
        assert_matches!(fetch_remote(&server), Err(ConfigError::Remote(_)));
    }

    #[test]
    fn http_404_is_a_remote_error() {
        init();
        let server = serve_http(|_| (404, "gone".to_string()));
        assert_matches!(fetch_remote(&server), Err(ConfigError::Remote(_)));
    }

    fn config_fixture() -> Config {
        serde_json::from_str(indoc! {r#"
            {
                "user": "u",
                "pass": "p",
                "indicator": "dummy",
                "brightness": 50,
                "active": {"colour": "red", "flash": false, "flash_speed": 1}
            }
        "#})
        .unwrap()
    }

    #[test]
    fn diff_of_identical_configs_is_empty() {
        let config = config_fixture();
        assert!(changed_keys(&config, &config.clone()).is_empty());
    }

    #[test]
    fn diff_reports_changed_and_new_keys() {
        let old = config_fixture();
        let mut new = old.clone();
        new.pass = "hunter2".to_string();
        new.ip = Some("https://capture.example.edu".to_string());
        new.lights.insert(
            "paused".to_string(),
            serde_json::json!({"colour": "yellow", "flash": false, "flash_speed": 1}),
        );

        let changed = changed_keys(&old, &new);

        assert!(changed.contains("pass"));
        assert!(changed.contains("ip"));
        assert!(changed.contains("paused"));
        assert!(!changed.contains("user"));
        assert!(!changed.contains("active"));
    }

    #[test]
    fn quoted_brightness_parses() {
        let config: Config = serde_json::from_str(
            r#"{"user": "u", "pass": "p", "indicator": "dummy", "brightness": "73"}"#,
        )
        .unwrap();
        assert_eq!(config.brightness, 73);
    }
}
