//! Dispatch configuration: peer address, timeouts, retry policy, profiling switches.
//!
//! Defaults match the FastEvent service (localhost:11666). Every field can be
//! overridden from the environment via `DispatchConfig::from_env()`.

use std::{path::PathBuf, time::Duration};

use crate::utils::error::ConfigError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 11666;
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 3_000;

const ENV_HOST: &str = "FASTEVENT_HOST";
const ENV_PORT: &str = "FASTEVENT_PORT";
const ENV_REPLY_TIMEOUT_MS: &str = "FASTEVENT_REPLY_TIMEOUT_MS";
const ENV_MAX_RETRIES: &str = "FASTEVENT_MAX_RETRIES";
const ENV_VALIDATE_ACK: &str = "FASTEVENT_VALIDATE_ACK";
const ENV_SHUTDOWN_TIMEOUT_MS: &str = "FASTEVENT_SHUTDOWN_TIMEOUT_MS";
const ENV_PROFILE_LATENCY: &str = "FASTEVENT_PROFILE_LATENCY";
const ENV_TRANSACTION_LOG: &str = "FASTEVENT_TRANSACTION_LOG";
const ENV_PIN_CORE: &str = "FASTEVENT_PIN_CORE";

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub host: String,
    pub port: u16,
    /// Bound on each reply wait. `None` blocks until the peer answers.
    pub reply_timeout: Option<Duration>,
    /// Extra attempts after a failed exchange before the loop fail-stops.
    pub max_retries: u32,
    /// Reject replies other than the `'Y'` acknowledgment.
    pub validate_ack: bool,
    /// Bound on `DispatchHandle::shutdown`. `None` waits forever.
    pub shutdown_timeout: Option<Duration>,
    pub profile_latency: bool,
    /// CSV file receiving one row per completed round trip.
    pub transaction_log: Option<PathBuf>,
    /// Core the dispatch thread pins itself to.
    pub pin_core: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reply_timeout: Some(Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS)),
            max_retries: 0,
            validate_ack: false,
            shutdown_timeout: Some(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS)),
            profile_latency: true,
            transaction_log: None,
            pin_core: None,
        }
    }
}

impl DispatchConfig {
    /// Defaults overlaid with any `FASTEVENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values produced by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup(ENV_HOST) {
            let host = host.trim();
            if host.is_empty() {
                return Err(invalid(ENV_HOST, host));
            }
            cfg.host = host.to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            cfg.port = parse(ENV_PORT, &port)?;
        }
        if let Some(ms) = lookup(ENV_REPLY_TIMEOUT_MS) {
            cfg.reply_timeout = optional_millis(parse(ENV_REPLY_TIMEOUT_MS, &ms)?);
        }
        if let Some(n) = lookup(ENV_MAX_RETRIES) {
            cfg.max_retries = parse(ENV_MAX_RETRIES, &n)?;
        }
        if let Some(flag) = lookup(ENV_VALIDATE_ACK) {
            cfg.validate_ack = parse_flag(ENV_VALIDATE_ACK, &flag)?;
        }
        if let Some(ms) = lookup(ENV_SHUTDOWN_TIMEOUT_MS) {
            cfg.shutdown_timeout = optional_millis(parse(ENV_SHUTDOWN_TIMEOUT_MS, &ms)?);
        }
        if let Some(flag) = lookup(ENV_PROFILE_LATENCY) {
            cfg.profile_latency = parse_flag(ENV_PROFILE_LATENCY, &flag)?;
        }
        if let Some(path) = lookup(ENV_TRANSACTION_LOG) {
            let path = path.trim();
            cfg.transaction_log = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(core) = lookup(ENV_PIN_CORE) {
            cfg.pin_core = Some(parse(ENV_PIN_CORE, &core)?);
        }

        Ok(cfg)
    }

    pub fn with_peer(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_validate_ack(mut self, validate: bool) -> Self {
        self.validate_ack = validate;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_transaction_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.transaction_log = Some(path.into());
        self
    }

    pub fn with_pin_core(mut self, core: usize) -> Self {
        self.pin_core = Some(core);
        self
    }

    /// `host:port` as handed to the resolver.
    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { key, value: value.to_string() }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

// 0 disables the bound
fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
