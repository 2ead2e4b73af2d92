use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::logger::MessageLogMode;
use crate::protocol::DEFAULT_URL;
use crate::types::Mode;

pub const DEFAULT_NAME: &str = "Ariston";
pub const DEFAULT_MAX_RETRIES: u16 = 1;
/// A full fetch often takes more than ten seconds, so polls stay sparse.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 45;
pub const DEFAULT_POLL_INTERVAL_DOWN_SECS: u64 = 80;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
pub const DEFAULT_WRITE_SETTLE_SECS: u64 = 25;
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    ChAntifreezeTemperature,
    ChDetectedTemperature,
    ChMode,
    ChSetTemperature,
    DhwSetTemperature,
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySensorKind {
    Flame,
    HolidayMode,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    Power,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageLogConfig {
    pub path: PathBuf,
    #[serde(default = "default_log_mode")]
    pub mode: MessageLogMode,
}

fn default_log_mode() -> MessageLogMode {
    MessageLogMode::Diffed
}

/// Startup configuration for one boiler account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub username: String,
    pub password: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_url")]
    pub url: String,
    /// Mode used when the climate entity is switched off.
    #[serde(default = "default_hvac_off", deserialize_with = "hvac_off_mode")]
    pub hvac_off: Mode,
    /// Mode used when the power switch is turned on.
    #[serde(default = "default_power_on", deserialize_with = "power_on_mode")]
    pub power_on: Mode,
    #[serde(default = "default_max_retries")]
    pub max_retries: u16,
    #[serde(default)]
    pub sensors: Vec<SensorKind>,
    #[serde(default)]
    pub binary_sensors: Vec<BinarySensorKind>,
    #[serde(default)]
    pub switches: Vec<SwitchKind>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_interval_down")]
    pub poll_interval_down_secs: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_write_settle")]
    pub write_settle_secs: u64,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default)]
    pub message_log: Option<MessageLogConfig>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}
fn default_url() -> String {
    DEFAULT_URL.to_string()
}
fn default_hvac_off() -> Mode {
    Mode::Summer
}
fn default_power_on() -> Mode {
    Mode::Summer
}
fn default_max_retries() -> u16 {
    DEFAULT_MAX_RETRIES
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_poll_interval_down() -> u64 {
    DEFAULT_POLL_INTERVAL_DOWN_SECS
}
fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}
fn default_write_settle() -> u64 {
    DEFAULT_WRITE_SETTLE_SECS
}
fn default_login_timeout() -> u64 {
    DEFAULT_LOGIN_TIMEOUT_SECS
}
fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

fn mode_in<'de, D>(deserializer: D, allowed: &[Mode], what: &str) -> std::result::Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Mode::from_name(&raw)
        .filter(|m| allowed.contains(m))
        .ok_or_else(|| {
            let names: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            serde::de::Error::custom(format!("{what} must be one of {names:?}, got {raw:?}"))
        })
}

fn hvac_off_mode<'de, D>(deserializer: D) -> std::result::Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    mode_in(deserializer, &[Mode::Off, Mode::Summer], "hvac_off")
}

fn power_on_mode<'de, D>(deserializer: D) -> std::result::Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    mode_in(deserializer, &[Mode::Summer, Mode::Winter], "power_on")
}

impl Config {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            name: default_name(),
            url: default_url(),
            hvac_off: default_hvac_off(),
            power_on: default_power_on(),
            max_retries: DEFAULT_MAX_RETRIES,
            sensors: Vec::new(),
            binary_sensors: Vec::new(),
            switches: Vec::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_interval_down_secs: DEFAULT_POLL_INTERVAL_DOWN_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            write_settle_secs: DEFAULT_WRITE_SETTLE_SECS,
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            message_log: None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(Error::Config("username must not be empty".into()));
        }
        if self.password.is_empty() {
            return Err(Error::Config("password must not be empty".into()));
        }
        if !matches!(self.hvac_off, Mode::Off | Mode::Summer) {
            return Err(Error::Config(format!("hvac_off cannot be {}", self.hvac_off)));
        }
        if !matches!(self.power_on, Mode::Summer | Mode::Winter) {
            return Err(Error::Config(format!("power_on cannot be {}", self.power_on)));
        }
        if self.poll_interval_secs == 0 || self.poll_interval_down_secs == 0 {
            return Err(Error::Config("poll intervals must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_interval_down(&self) -> Duration {
        Duration::from_secs(self.poll_interval_down_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn write_settle(&self) -> Duration {
        Duration::from_secs(self.write_settle_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
