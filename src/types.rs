use std::fmt;

use chrono::{DateTime, Utc};

/// Plant operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Off,
    Summer,
    Winter,
}

impl Mode {
    pub fn as_wire(&self) -> i64 {
        match self {
            Mode::Summer => 0,
            Mode::Winter => 1,
            Mode::Off => 5,
        }
    }

    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(Mode::Summer),
            1 => Some(Mode::Winter),
            5 => Some(Mode::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Summer => "summer",
            Mode::Winter => "winter",
        }
    }

    /// Case-insensitive, as the service's own UI and user config are inconsistent.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Some(Mode::Off),
            "summer" => Some(Mode::Summer),
            "winter" => Some(Mode::Winter),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Central heating zone mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChMode {
    Manual,
    Scheduled,
}

impl ChMode {
    pub fn as_wire(&self) -> i64 {
        match self {
            ChMode::Manual => 2,
            ChMode::Scheduled => 3,
        }
    }

    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            2 => Some(ChMode::Manual),
            3 => Some(ChMode::Scheduled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChMode::Manual => "manual",
            ChMode::Scheduled => "scheduled",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Some(ChMode::Manual),
            "scheduled" => Some(ChMode::Scheduled),
            _ => None,
        }
    }
}

impl fmt::Display for ChMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive setpoint range reported by the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

impl Limits {
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// One fetched snapshot of the boiler. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub mode: Mode,
    pub ch_mode: ChMode,
    pub ch_set_temperature: f64,
    pub dhw_set_temperature: f64,
    pub detected_temperature: f64,
    pub ch_antifreeze_temperature: f64,
    pub flame: bool,
    pub holiday_mode: bool,
    pub online: bool,
    pub power: bool,
    pub ch_set_temperature_limits: Option<Limits>,
    pub dhw_set_temperature_limits: Option<Limits>,
    pub last_updated: DateTime<Utc>,
}

impl DeviceState {
    /// Returns a copy with `change` applied, used for optimistic overlays.
    pub fn with_change(&self, change: &Change) -> Self {
        let mut next = self.clone();
        match *change {
            Change::Mode(m) => {
                next.mode = m;
                next.power = m != Mode::Off;
            }
            Change::ChMode(m) => next.ch_mode = m,
            Change::ChSetTemperature(t) => next.ch_set_temperature = t,
            Change::DhwSetTemperature(t) => next.dhw_set_temperature = t,
        }
        next
    }

    pub fn matches(&self, change: &Change) -> bool {
        match *change {
            Change::Mode(m) => self.mode == m,
            Change::ChMode(m) => self.ch_mode == m,
            Change::ChSetTemperature(t) => self.ch_set_temperature == t,
            Change::DhwSetTemperature(t) => self.dhw_set_temperature == t,
        }
    }
}

/// Writable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Mode,
    ChMode,
    ChSetTemperature,
    DhwSetTemperature,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Mode => "mode",
            Field::ChMode => "ch_mode",
            Field::ChSetTemperature => "ch_set_temperature",
            Field::DhwSetTemperature => "dhw_set_temperature",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired value for a single writable field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    Mode(Mode),
    ChMode(ChMode),
    ChSetTemperature(f64),
    DhwSetTemperature(f64),
}

impl Change {
    pub fn field(&self) -> Field {
        match self {
            Change::Mode(_) => Field::Mode,
            Change::ChMode(_) => Field::ChMode,
            Change::ChSetTemperature(_) => Field::ChSetTemperature,
            Change::DhwSetTemperature(_) => Field::DhwSetTemperature,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Mode(m) => write!(f, "mode={m}"),
            Change::ChMode(m) => write!(f, "ch_mode={m}"),
            Change::ChSetTemperature(t) => write!(f, "ch_set_temperature={t}"),
            Change::DhwSetTemperature(t) => write!(f, "dhw_set_temperature={t}"),
        }
    }
}

/// Outcome of a successfully dispatched change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The service accepted the write. `retries` is how many resends it took.
    Written { retries: u16 },
    /// The requested values were already in effect; nothing was sent.
    Unchanged,
}

/// Events emitted when the visible cached state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ModeChanged { mode: Mode },
    ChModeChanged { ch_mode: ChMode },
    ChSetTemperatureChanged { temperature: f64 },
    DhwSetTemperatureChanged { temperature: f64 },
    DetectedTemperatureChanged { temperature: f64 },
    ChAntifreezeTemperatureChanged { temperature: f64 },
    FlameChanged { flame: bool },
    HolidayModeChanged { enabled: bool },
    OnlineChanged { online: bool },
    PowerChanged { power: bool },
    AvailabilityChanged { available: bool },
    StaleChanged { stale: bool },
}
