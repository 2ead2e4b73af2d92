use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{EventCallback, Notifier, SnapshotCallback, StateCache};
use crate::config::*;
use crate::dispatcher::{ChangeRequest, CommandDispatcher, DispatchSettings, WriteClock};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::poller::{Poller, PollerSettings, TickOutcome};
use crate::protocol::DEFAULT_URL;
use crate::reconcile::FieldState;
use crate::session::{Credentials, SessionManager};
use crate::transport::HttpTransport;
use crate::types::*;
use crate::{Error, Result};

pub struct AristonClientBuilder {
    username: String,
    password: String,
    name: String,
    url: String,
    hvac_off: Mode,
    power_on: Mode,
    max_retries: u16,
    poll_interval: Duration,
    poll_interval_down: Duration,
    retry_delay: Duration,
    write_settle: Duration,
    login_timeout: Duration,
    fetch_timeout: Duration,
    write_timeout: Duration,
    sensors: Vec<SensorKind>,
    binary_sensors: Vec<BinarySensorKind>,
    switches: Vec<SwitchKind>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl AristonClientBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            name: DEFAULT_NAME.to_string(),
            url: DEFAULT_URL.to_string(),
            hvac_off: Mode::Summer,
            power_on: Mode::Summer,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_interval_down: Duration::from_secs(DEFAULT_POLL_INTERVAL_DOWN_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            write_settle: Duration::from_secs(DEFAULT_WRITE_SETTLE_SECS),
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            sensors: Vec::new(),
            binary_sensors: Vec::new(),
            switches: Vec::new(),
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::new(&config.username, &config.password)
            .name(&config.name)
            .url(&config.url)
            .hvac_off(config.hvac_off)
            .power_on(config.power_on)
            .max_retries(config.max_retries)
            .poll_interval(config.poll_interval())
            .poll_interval_down(config.poll_interval_down())
            .retry_delay(config.retry_delay())
            .write_settle(config.write_settle())
            .timeouts(config.login_timeout(), config.fetch_timeout(), config.write_timeout());
        builder.sensors = config.sensors.clone();
        builder.binary_sensors = config.binary_sensors.clone();
        builder.switches = config.switches.clone();
        if let Some(log) = &config.message_log {
            builder = builder.message_log(log.mode, &log.path);
        }
        Ok(builder)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn hvac_off(mut self, mode: Mode) -> Self {
        self.hvac_off = mode;
        self
    }

    pub fn power_on(mut self, mode: Mode) -> Self {
        self.power_on = mode;
        self
    }

    pub fn max_retries(mut self, retries: u16) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Interval used while the service keeps failing.
    pub fn poll_interval_down(mut self, interval: Duration) -> Self {
        self.poll_interval_down = interval;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// How long polls hold off after a write goes out.
    pub fn write_settle(mut self, settle: Duration) -> Self {
        self.write_settle = settle;
        self
    }

    pub fn timeouts(mut self, login: Duration, fetch: Duration, write: Duration) -> Self {
        self.login_timeout = login;
        self.fetch_timeout = fetch;
        self.write_timeout = write;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&DeviceState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AristonClient> {
        if !matches!(self.hvac_off, Mode::Off | Mode::Summer) {
            return Err(Error::Config(format!("hvac_off cannot be {}", self.hvac_off)));
        }
        if !matches!(self.power_on, Mode::Summer | Mode::Winter) {
            return Err(Error::Config(format!("power_on cannot be {}", self.power_on)));
        }

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Arc::new(Mutex::new(MessageLogger::new(mode, path)?))),
            _ => None,
        };

        let transport = Arc::new(HttpTransport::new(self.url, logger)?);
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            Credentials {
                username: self.username,
                password: self.password,
            },
            self.login_timeout,
        ));
        let notifier = Arc::new(Notifier {
            event_callbacks: self.event_callbacks,
            snapshot_callbacks: self.snapshot_callbacks,
        });
        let cache = Arc::new(StateCache::new(notifier));
        let write_clock = Arc::new(WriteClock::new(self.write_settle));

        let poller = Arc::new(Poller::new(
            transport.clone(),
            session.clone(),
            cache.clone(),
            write_clock.clone(),
            PollerSettings {
                interval: self.poll_interval,
                interval_down: self.poll_interval_down,
                fetch_timeout: self.fetch_timeout,
            },
        ));
        let dispatcher = CommandDispatcher::new(
            transport,
            session.clone(),
            cache.clone(),
            write_clock,
            DispatchSettings {
                max_retries: self.max_retries,
                retry_delay: self.retry_delay,
                write_timeout: self.write_timeout,
            },
        );

        Ok(AristonClient {
            inner: Arc::new(ClientInner {
                name: self.name,
                hvac_off: self.hvac_off,
                power_on: self.power_on,
                sensors: self.sensors,
                binary_sensors: self.binary_sensors,
                switches: self.switches,
                session,
                cache,
                poller,
                dispatcher,
                cancel: CancellationToken::new(),
                poll_task: Mutex::new(None),
            }),
        })
    }
}

struct ClientInner {
    name: String,
    hvac_off: Mode,
    power_on: Mode,
    sensors: Vec<SensorKind>,
    binary_sensors: Vec<BinarySensorKind>,
    switches: Vec<SwitchKind>,
    session: Arc<SessionManager>,
    cache: Arc<StateCache>,
    poller: Arc<Poller>,
    dispatcher: CommandDispatcher,
    cancel: CancellationToken,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// One boiler account: session, cache, poller and dispatcher.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AristonClient {
    inner: Arc<ClientInner>,
}

impl AristonClient {
    pub fn builder(username: impl Into<String>, password: impl Into<String>) -> AristonClientBuilder {
        AristonClientBuilder::new(username, password)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        AristonClientBuilder::from_config(config)?.build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Spawns the background poller on the current tokio runtime.
    /// Calling it again while the poller runs does nothing.
    pub fn start(&self) {
        let mut task = self
            .inner
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) || self.inner.cancel.is_cancelled() {
            return;
        }
        info!(name = %self.inner.name, "starting poller");
        let poller = self.inner.poller.clone();
        *task = Some(tokio::spawn(poller.run(self.inner.cancel.clone())));
    }

    /// Stops the poller and drops the session. In-flight requests finish
    /// on their own timeouts.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            debug!(error = %e, "poller task ended abnormally");
        }
        self.inner.session.logout().await;
    }

    /// Runs one poll tick now.
    pub async fn refresh(&self) -> TickOutcome {
        self.inner.poller.tick().await
    }

    pub fn read_state(&self) -> Option<DeviceState> {
        self.inner.cache.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceState>> {
        self.inner.cache.subscribe()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.cache.is_stale()
    }

    pub fn state_age(&self) -> Option<chrono::Duration> {
        self.inner.cache.age()
    }

    pub fn field_state(&self, field: Field) -> FieldState {
        self.inner.cache.field_state(field)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.inner.cache.has_pending()
    }

    /// Whether the service has answered recently enough to trust the cache.
    pub fn available(&self) -> bool {
        self.inner.poller.available()
    }

    pub fn sensors(&self) -> &[SensorKind] {
        &self.inner.sensors
    }

    pub fn binary_sensors(&self) -> &[BinarySensorKind] {
        &self.inner.binary_sensors
    }

    pub fn switches(&self) -> &[SwitchKind] {
        &self.inner.switches
    }

    pub async fn submit(&self, request: ChangeRequest) -> Result<Applied> {
        Ok(self.inner.dispatcher.submit(request).await?)
    }

    pub async fn request_change(&self, change: Change) -> Result<Applied> {
        self.submit(ChangeRequest::single(change)).await
    }

    pub async fn request_changes(&self, changes: Vec<Change>) -> Result<Applied> {
        self.submit(ChangeRequest::new(changes)).await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<Applied> {
        self.request_change(Change::Mode(mode)).await
    }

    pub async fn set_ch_mode(&self, mode: ChMode) -> Result<Applied> {
        self.request_change(Change::ChMode(mode)).await
    }

    pub async fn set_ch_temperature(&self, temperature: f64) -> Result<Applied> {
        self.request_change(Change::ChSetTemperature(temperature)).await
    }

    pub async fn set_dhw_temperature(&self, temperature: f64) -> Result<Applied> {
        self.request_change(Change::DhwSetTemperature(temperature)).await
    }

    /// Power switch: on selects the configured `power_on` mode, off selects `Off`.
    pub async fn set_power(&self, on: bool) -> Result<Applied> {
        let mode = if on { self.inner.power_on } else { Mode::Off };
        self.set_mode(mode).await
    }

    /// Climate "off": selects the configured `hvac_off` mode.
    pub async fn turn_hvac_off(&self) -> Result<Applied> {
        self.set_mode(self.inner.hvac_off).await
    }
}
