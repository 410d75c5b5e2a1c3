//! Configuration: JSON config file, environment overrides, sensible defaults.
//!
//! Load precedence (highest first): file pointed to by `PEERCAST_CONFIG_PATH`,
//! `config.json` in the current working directory, compiled-in defaults.
//! Individual fields can be overridden with `PEERCAST__`-prefixed environment
//! variables using `__` as the nested separator, e.g. `PEERCAST__PORT=8080`
//! or `PEERCAST__LOGGING__LEVEL=debug`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::protocol::{DEFAULT_MAX_VIEWERS, DEFAULT_TOKEN_TTL_SECS};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Comma-separated allowed CORS origins, or `*` for permissive.
    pub cors_origins: String,
    pub server: RelaySection,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3546,
            cors_origins: "*".to_string(),
            server: RelaySection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Relay behavior settings (capacities, lifetimes, transport limits).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Viewer capacity per node.
    pub max_viewers: u8,
    /// Capability token lifetime in seconds.
    pub token_ttl_secs: u64,
    /// Connections silent for longer than this are dropped by the sweep.
    pub ping_timeout_secs: u64,
    /// Interval between liveness sweeps in seconds.
    pub sweep_interval_secs: u64,
    pub max_connections_per_ip: usize,
    pub max_message_size: usize,
    /// Capacity of each connection's outbound message queue.
    pub send_queue_capacity: usize,
    /// Optional base64-encoded 32-byte token signing key. When unset a
    /// random key is generated at startup, so issued tokens die with the
    /// process, like the node registry they refer to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            max_viewers: DEFAULT_MAX_VIEWERS,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            ping_timeout_secs: 30,
            sweep_interval_secs: 60,
            max_connections_per_ip: 16,
            max_message_size: 65536, // 64KB
            send_queue_capacity: 64,
            token_secret: None,
        }
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level; falls back to `RUST_LOG` and then `info` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    pub enable_file_logging: bool,
    pub dir: String,
    pub filename: String,
    /// `daily`, `hourly`, or `never`.
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: LogFormat::Text,
            enable_file_logging: false,
            dir: "logs".to_string(),
            filename: "relay.log".to_string(),
            rotation: "daily".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Load configuration. Errors while reading or parsing any source are
/// printed to stderr and the remaining sources still apply; `load()` always
/// returns a usable `Config`.
#[must_use]
pub fn load() -> Config {
    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    merge_file_source(&mut merged, Path::new("config.json"));
    if let Ok(path) = std::env::var("PEERCAST_CONFIG_PATH") {
        merge_file_source(&mut merged, Path::new(&path));
    }

    apply_env_overrides(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => merge_values(target, value),
            Err(err) => {
                eprintln!("Failed to parse config from {}: {}", path.display(), err);
            }
        },
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("PEERCAST__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        if segments.is_empty() {
            continue;
        }

        let trimmed = raw_value.trim();
        let value =
            serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()));
        set_nested_value(root, &segments, value);
    }
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Some(map) = target.as_object_mut() else {
        return;
    };

    if rest.is_empty() {
        map.insert(first.clone(), value);
    } else {
        let entry = map
            .entry(first.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        set_nested_value(entry, rest, value);
    }
}
