//! Configuration for the bridge server.
//!
//! Values come from, in increasing priority:
//! - built-in defaults,
//! - an optional TOML file (`--config`),
//! - `BRIDGE_*` environment variables,
//! - command-line flags (applied in `main`).
//!
//! Environment variables:
//!
//! - `BRIDGE_BIND_ADDR`            (default: "0.0.0.0")
//! - `BRIDGE_PORT`                 (default: "34013")
//! - `BRIDGE_MAX_CLIENTS`          (default: "1024")
//! - `BRIDGE_DISCOVERY_FILE`       (default: "~/.creaturesengine/port")
//! - `BRIDGE_ENGINE_HOST`          (default: "127.0.0.1")
//! - `BRIDGE_CONNECT_TIMEOUT_MS`   (default: "2000")
//! - `BRIDGE_RECEIVE_TIMEOUT_MS`   (default: "60000")
//! - `BRIDGE_POLL_INTERVAL_MS`     (default: "500")
//! - `BRIDGE_RETRY_INTERVAL_MS`    (default: "1000")
//! - `BRIDGE_ATTACH_SETTLE_MS`     (default: "50")
//! - `BRIDGE_PROBE_COMMAND`        (default: "DBG: POLL")
//! - `BRIDGE_TRUST_FORWARDED_TLS`  (default: "false")

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default websocket port.
pub const DEFAULT_PORT: u16 = 34013;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IP address / interface to bind the websocket listener to.
    pub bind_addr: String,

    /// Websocket port.
    pub port: u16,

    /// Maximum number of tracked peer connections (inbound and relays).
    pub max_clients: usize,

    /// File naming the engine's scripting port. `None` resolves to
    /// `~/.creaturesengine/port`.
    pub discovery_file: Option<PathBuf>,

    /// Host the scripting socket listens on.
    pub engine_host: IpAddr,

    pub connect_timeout_ms: u64,

    /// Receive timeout of one engine exchange. A timeout is retried once.
    pub receive_timeout_ms: u64,

    /// Delay between keep-alive probes of an attached engine.
    pub poll_interval_ms: u64,

    /// Delay between discovery attempts, and the probe delay for DDE engines.
    pub retry_interval_ms: u64,

    /// Pause after attaching before the first probe.
    pub attach_settle_ms: u64,

    /// Command sent on every keep-alive probe; its output is scanned for
    /// directives. Empty disables the probe command.
    pub probe_command: String,

    /// Accept public origins whose request says a TLS terminator forwarded
    /// it (`X-Forwarded-Proto: https`).
    pub trust_forwarded_tls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_clients: 1024,
            discovery_file: None,
            engine_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout_ms: 2_000,
            receive_timeout_ms: 60_000,
            poll_interval_ms: 500,
            retry_interval_ms: 1_000,
            attach_settle_ms: 50,
            probe_command: "DBG: POLL".to_string(),
            trust_forwarded_tls: false,
        }
    }
}

impl Config {
    /// Defaults overridden by `BRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (if any) first, then the environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BRIDGE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        override_parsed(&lookup, "BRIDGE_PORT", &mut self.port)?;
        override_parsed(&lookup, "BRIDGE_MAX_CLIENTS", &mut self.max_clients)?;
        if let Some(path) = lookup("BRIDGE_DISCOVERY_FILE") {
            self.discovery_file = Some(PathBuf::from(path));
        }
        override_parsed(&lookup, "BRIDGE_ENGINE_HOST", &mut self.engine_host)?;
        override_parsed(&lookup, "BRIDGE_CONNECT_TIMEOUT_MS", &mut self.connect_timeout_ms)?;
        override_parsed(&lookup, "BRIDGE_RECEIVE_TIMEOUT_MS", &mut self.receive_timeout_ms)?;
        override_parsed(&lookup, "BRIDGE_POLL_INTERVAL_MS", &mut self.poll_interval_ms)?;
        override_parsed(&lookup, "BRIDGE_RETRY_INTERVAL_MS", &mut self.retry_interval_ms)?;
        override_parsed(&lookup, "BRIDGE_ATTACH_SETTLE_MS", &mut self.attach_settle_ms)?;
        if let Some(command) = lookup("BRIDGE_PROBE_COMMAND") {
            self.probe_command = command;
        }
        override_parsed(&lookup, "BRIDGE_TRUST_FORWARDED_TLS", &mut self.trust_forwarded_tls)?;
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Discovery file, resolved against the home directory when unset.
    pub fn discovery_path(&self) -> Option<PathBuf> {
        self.discovery_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".creaturesengine").join("port")))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn attach_settle(&self) -> Duration {
        Duration::from_millis(self.attach_settle_ms)
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(());
    };

    *slot = value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}
