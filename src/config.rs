//! Configuration module for RelayBot.
//!
//! The configuration file is TOML. Global tables (`[logging]`,
//! `[reconnect]`, `[reclaim]`) are parsed eagerly, while each
//! `[networks.<name>]` table is kept raw and validated on its own so that a
//! broken section only disables that one network.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::relay::Mode;
use crate::{RelayError, Result};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/relaybot.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, and the value the delay resets to
    /// after a successful connection.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: f64,
    /// Upper bound for the delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    /// Multiplier applied after every consecutive failure.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Random spread applied to each delay, as a fraction of the delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    3600.0 // 1 hour
}

fn default_factor() -> f64 {
    std::f64::consts::E
}

fn default_jitter() -> f64 {
    0.12
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
            factor: default_factor(),
            jitter: default_jitter(),
        }
    }
}

/// Nick reclamation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReclaimConfig {
    /// Interval between attempts to take the desired nick back.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// A boolean option as written in a network section.
///
/// Accepts a TOML boolean or one of the strings `true`, `yes`, `false`,
/// `no` and the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

impl FlagValue {
    /// Convert to a boolean, rejecting anything outside the known spellings.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            FlagValue::Bool(b) => Ok(*b),
            FlagValue::Text(s) => parse_bool(s),
        }
    }
}

/// Strictly parse a boolean option.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" | "" => Ok(false),
        other => Err(RelayError::Config(format!(
            "cannot convert '{other}' to boolean"
        ))),
    }
}

/// One `[networks.<name>]` table, or the `[defaults]` table, before merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Connect timeout in seconds.
    pub timeout: Option<u64>,
    pub nick: Option<String>,
    pub channel: Option<String>,
    /// Reply sent to anyone addressing the bot.
    pub info: Option<String>,
    /// Heartbeat interval in seconds.
    pub heartbeat: Option<u64>,
    /// Server password.
    pub password: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub ssl: Option<FlagValue>,
    pub mode: Option<String>,
    pub nickserv_password: Option<String>,
}

const DEFAULT_PORT: u16 = 6667;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_SECS: u64 = 60;
const DEFAULT_INFO: &str = "I am a relay bot. Messages in this channel are shared with other networks.";

/// Fully resolved settings for one network.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Section name in the config file.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub connect_timeout: Duration,
    pub nickname: String,
    pub channel: String,
    pub info: String,
    pub heartbeat_interval: Duration,
    pub password: Option<String>,
    pub username: String,
    pub realname: String,
    pub mode: Mode,
    pub nickserv_password: Option<String>,
}

impl NetworkConfig {
    /// Build a network from its section, falling back to `[defaults]`.
    ///
    /// Empty strings count as unset, so they also fall back.
    pub fn from_section(
        name: &str,
        section: &NetworkSection,
        defaults: &NetworkSection,
    ) -> Result<Self> {
        let missing = |field: &str| {
            RelayError::Config(format!("section '{name}': missing required option '{field}'"))
        };
        let invalid = |msg: String| RelayError::Config(format!("section '{name}': {msg}"));

        let host = pick(&section.host, &defaults.host).ok_or_else(|| missing("host"))?;
        let channel = pick(&section.channel, &defaults.channel).ok_or_else(|| missing("channel"))?;
        let nickname = pick(&section.nick, &defaults.nick).ok_or_else(|| missing("nick"))?;
        let mode_name = pick(&section.mode, &defaults.mode).ok_or_else(|| missing("mode"))?;

        let mode: Mode = mode_name
            .parse()
            .map_err(|_| invalid(format!("unknown mode '{mode_name}'")))?;

        if !channel.starts_with(['#', '&', '+', '!']) || channel.contains(' ') {
            return Err(invalid(format!("'{channel}' is not a valid channel name")));
        }
        if nickname.contains(' ') {
            return Err(invalid(format!("'{nickname}' is not a valid nickname")));
        }

        let port = section.port.or(defaults.port).unwrap_or(DEFAULT_PORT);
        let timeout = section
            .timeout
            .or(defaults.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let heartbeat = section
            .heartbeat
            .or(defaults.heartbeat)
            .unwrap_or(DEFAULT_HEARTBEAT_SECS);
        if timeout == 0 {
            return Err(invalid("timeout must be greater than zero".to_string()));
        }
        if heartbeat == 0 {
            return Err(invalid("heartbeat must be greater than zero".to_string()));
        }

        let use_tls = match section.ssl.as_ref().or(defaults.ssl.as_ref()) {
            Some(flag) => flag.as_bool().map_err(|e| invalid(format!("option 'ssl': {e}")))?,
            None => false,
        };

        let nickserv_password =
            pick(&section.nickserv_password, &defaults.nickserv_password).map(str::to_string);
        if mode.behavior().reclaim && nickserv_password.is_none() {
            return Err(invalid(format!(
                "mode '{mode}' requires option 'nickserv_password'"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            use_tls,
            connect_timeout: Duration::from_secs(timeout),
            nickname: nickname.to_string(),
            channel: channel.to_string(),
            info: pick(&section.info, &defaults.info)
                .unwrap_or(DEFAULT_INFO)
                .to_string(),
            heartbeat_interval: Duration::from_secs(heartbeat),
            password: pick(&section.password, &defaults.password).map(str::to_string),
            username: pick(&section.username, &defaults.username)
                .unwrap_or(nickname)
                .to_string(),
            realname: pick(&section.realname, &defaults.realname)
                .unwrap_or(nickname)
                .to_string(),
            mode,
            nickserv_password,
        })
    }

    /// Registry key of this network: host, port and channel concatenated.
    pub fn identifier(&self) -> String {
        format!("{}{}{}", self.host, self.port, self.channel)
    }
}

fn pick<'a>(value: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    let set = |v: &'a Option<String>| v.as_deref().filter(|s| !s.is_empty());
    set(value).or_else(|| set(fallback))
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Nick reclamation.
    #[serde(default)]
    pub reclaim: ReclaimConfig,
    /// Values shared by every network section.
    #[serde(default)]
    pub defaults: NetworkSection,
    /// Raw network sections, validated one by one in [`Config::networks`].
    #[serde(default)]
    pub networks: toml::Table,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Resolve every network section.
    ///
    /// Each entry carries its own result. A section whose identifier was
    /// already taken by an earlier section is rejected.
    pub fn networks(&self) -> Vec<(String, Result<NetworkConfig>)> {
        let mut seen = HashSet::new();
        self.networks
            .iter()
            .map(|(name, value)| {
                let result = value
                    .clone()
                    .try_into::<NetworkSection>()
                    .map_err(|e| RelayError::Config(format!("section '{name}': {e}")))
                    .and_then(|section| NetworkConfig::from_section(name, &section, &self.defaults))
                    .and_then(|network| {
                        if seen.insert(network.identifier()) {
                            Ok(network)
                        } else {
                            Err(RelayError::Config(format!(
                                "section '{name}': identifier '{}' is already used by another section",
                                network.identifier()
                            )))
                        }
                    });
                (name.clone(), result)
            })
            .collect()
    }
}
