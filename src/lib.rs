mod cache;
mod client;
mod config;
mod diff;
mod dispatcher;
mod error;
mod logger;
mod poller;
mod protocol;
mod reconcile;
mod session;
mod transport;
mod types;

pub use cache::StateCache;
pub use client::{AristonClient, AristonClientBuilder};
pub use config::{BinarySensorKind, Config, MessageLogConfig, SensorKind, SwitchKind};
pub use dispatcher::{ChangeRequest, CommandDispatcher};
pub use error::{AuthError, CommandFailure, Error, Result, TransportError, TransportErrorKind};
pub use logger::MessageLogMode;
pub use poller::{MAX_ERRORS, MAX_ERRORS_TIMER_EXTEND, Poller, TickOutcome};
pub use reconcile::{FieldState, Resolution};
pub use session::{Session, SessionManager};
pub use types::*;
