use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::StateCache;
use crate::dispatcher::WriteClock;
use crate::error::{AuthError, Error, Result, TransportError};
use crate::protocol::{classify_status, parse_plant_data, plant_data_path, ReplyClass};
use crate::session::SessionManager;
use crate::transport::{HttpTransport, Request};
use crate::types::Event;

/// Consecutive failed ticks tolerated before the client reports unavailable.
pub const MAX_ERRORS: u32 = 4;
/// Consecutive failed ticks after which the poll interval is extended.
pub const MAX_ERRORS_TIMER_EXTEND: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Updated,
    /// A write started recently; reading now would likely return old values.
    Settling,
    Failed(Error),
}

#[derive(Debug, Default)]
struct Health {
    errors: u32,
    initialized: bool,
}

impl Health {
    fn available(&self) -> bool {
        self.initialized && self.errors <= MAX_ERRORS
    }
}

pub(crate) struct PollerSettings {
    pub interval: Duration,
    pub interval_down: Duration,
    pub fetch_timeout: Duration,
}

/// Periodically fetches the full plant state into the cache.
pub struct Poller {
    transport: Arc<HttpTransport>,
    session: Arc<SessionManager>,
    cache: Arc<StateCache>,
    write_clock: Arc<WriteClock>,
    settings: PollerSettings,
    health: Mutex<Health>,
}

impl Poller {
    pub(crate) fn new(
        transport: Arc<HttpTransport>,
        session: Arc<SessionManager>,
        cache: Arc<StateCache>,
        write_clock: Arc<WriteClock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            transport,
            session,
            cache,
            write_clock,
            settings,
            health: Mutex::new(Health::default()),
        }
    }

    pub fn available(&self) -> bool {
        self.health.lock().unwrap_or_else(PoisonError::into_inner).available()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.health.lock().unwrap_or_else(PoisonError::into_inner).errors
    }

    /// Delay before the next tick; longer while the service keeps failing.
    pub fn next_delay(&self) -> Duration {
        if self.consecutive_errors() >= MAX_ERRORS_TIMER_EXTEND {
            self.settings.interval_down
        } else {
            self.settings.interval
        }
    }

    /// One poll cycle. Failures are recorded and returned, never raised.
    pub async fn tick(&self) -> TickOutcome {
        if self.write_clock.settling() {
            debug!("recent write, skipping read");
            return TickOutcome::Settling;
        }

        match self.fetch_with_reauth().await {
            Ok(()) => {
                self.record_success();
                TickOutcome::Updated
            }
            Err(e) => {
                warn!(error = %e, "poll failed");
                self.cache.mark_stale();
                self.record_failure().await;
                TickOutcome::Failed(e)
            }
        }
    }

    /// Ticks until `cancel` fires. The first tick runs immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.tick().await;

            let delay = self.next_delay();
            debug!(delay_secs = delay.as_secs_f64(), "next poll scheduled");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        debug!("poller stopped");
    }

    async fn fetch_with_reauth(&self) -> Result<()> {
        match self.fetch_once().await {
            Err(Error::Auth(e)) if e.is_transient() => {
                debug!(error = %e, "retrying fetch with a fresh login");
                self.session.invalidate().await;
                self.fetch_once().await
            }
            other => other,
        }
    }

    async fn fetch_once(&self) -> Result<()> {
        let session = self.session.ensure_valid_session().await?;
        let resp = self
            .transport
            .send(Request::get(
                plant_data_path(&session.plant_id),
                self.settings.fetch_timeout,
            ))
            .await?;

        let parsed = resp.json();
        self.transport.with_logger(|log| {
            let body = parsed.as_ref().cloned().unwrap_or(serde_json::Value::Null);
            log.log_poll(resp.status, &body);
        });

        match classify_status(resp.status) {
            ReplyClass::Ok => {}
            ReplyClass::SessionRejected => {
                warn!(status = resp.status, "fetch refused, session expired");
                self.session.invalidate().await;
                return Err(AuthError::SessionRejected.into());
            }
            ReplyClass::Rejected | ReplyClass::Transient => {
                warn!(status = resp.status, "unexpected reply to fetch");
                return Err(TransportError::status(resp.status).into());
            }
        }

        let payload = match parsed {
            Ok(v) => v,
            Err(e) => {
                warn!("invalid data received, not JSON");
                self.session.invalidate().await;
                return Err(e.into());
            }
        };
        let state = parse_plant_data(&payload, Utc::now())?;
        debug!(mode = %state.mode, "fetched plant data");
        self.cache.set(state, payload);
        Ok(())
    }

    fn record_success(&self) {
        let was_offline = {
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            let was_offline = !health.available();
            health.errors = 0;
            health.initialized = true;
            was_offline
        };
        if was_offline {
            info!("boiler service online");
            self.cache
                .notifier()
                .emit(&Event::AvailabilityChanged { available: true });
        }
    }

    async fn record_failure(&self) {
        let went_offline = {
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            let was_online = health.available();
            health.errors += 1;
            warn!(errors = health.errors, "consecutive poll errors");
            was_online && !health.available()
        };
        if went_offline {
            error!("boiler service offline: too many errors");
            self.session.invalidate().await;
            self.cache
                .notifier()
                .emit(&Event::AvailabilityChanged { available: false });
        }
    }
}
