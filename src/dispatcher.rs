use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::StateCache;
use crate::error::{AuthError, CommandFailure, Error, TransportError};
use crate::protocol::{classify_status, round_ch, round_dhw, set_data_body, set_data_path, ReplyClass};
use crate::reconcile::FieldState;
use crate::session::SessionManager;
use crate::transport::{HttpTransport, Request};
use crate::types::*;

/// Remembers when the service last accepted a write so polls can hold off
/// while it applies it. Failed attempts never start the window.
pub(crate) struct WriteClock {
    settle: Duration,
    last_write: Mutex<Option<Instant>>,
}

impl WriteClock {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            last_write: Mutex::new(None),
        }
    }

    pub fn record_write(&self) {
        *self.last_write.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn settling(&self) -> bool {
        self.last_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|t| t.elapsed() < self.settle)
    }
}

/// A batch of desired field values submitted by a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    pub id: Uuid,
    pub changes: Vec<Change>,
    pub issued_at: DateTime<Utc>,
    attempt_count: u16,
}

impl ChangeRequest {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            id: Uuid::new_v4(),
            changes,
            issued_at: Utc::now(),
            attempt_count: 0,
        }
    }

    pub fn single(change: Change) -> Self {
        Self::new(vec![change])
    }

    /// Retries consumed so far.
    pub fn attempt_count(&self) -> u16 {
        self.attempt_count
    }

    pub fn fields(&self) -> Vec<Field> {
        self.changes.iter().map(Change::field).collect()
    }
}

/// Resends left for one request.
#[derive(Debug, Clone, Copy)]
struct RetryBudget {
    max: u16,
    used: u16,
}

impl RetryBudget {
    fn new(max: u16) -> Self {
        Self { max, used: 0 }
    }

    fn try_consume(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

enum AttemptError {
    Retryable(Error),
    Fatal(CommandFailure),
}

enum Dispatch {
    Attempt,
    Backoff(Error),
    Done(Result<Applied, CommandFailure>),
}

pub(crate) struct DispatchSettings {
    pub max_retries: u16,
    pub retry_delay: Duration,
    pub write_timeout: Duration,
}

/// Turns change requests into remote writes with bounded retries.
pub struct CommandDispatcher {
    transport: Arc<HttpTransport>,
    session: Arc<SessionManager>,
    cache: Arc<StateCache>,
    write_clock: Arc<WriteClock>,
    settings: DispatchSettings,
    write_lock: tokio::sync::Mutex<()>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        transport: Arc<HttpTransport>,
        session: Arc<SessionManager>,
        cache: Arc<StateCache>,
        write_clock: Arc<WriteClock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            transport,
            session,
            cache,
            write_clock,
            settings,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn max_retries(&self) -> u16 {
        self.settings.max_retries
    }

    /// Sends `request` until it is applied or the retry budget runs out.
    ///
    /// On success the written values are overlaid onto the cache until the
    /// next poll. On failure any overlay on the request's fields is dropped.
    pub async fn submit(&self, mut request: ChangeRequest) -> Result<Applied, CommandFailure> {
        if request.changes.is_empty() {
            return Ok(Applied::Unchanged);
        }
        let _serialized = self.write_lock.lock().await;

        let authoritative = self.cache.authoritative();
        request.changes = match validate(&request.changes, authoritative.as_ref()) {
            Ok(changes) => changes,
            Err(failure) => {
                warn!(request = %request.id, %failure, "change request refused");
                return Err(failure);
            }
        };

        if let Some(state) = &authoritative
            && self.already_in_effect(state, &request.changes)
        {
            debug!(request = %request.id, "same data already set");
            return Ok(Applied::Unchanged);
        }

        let mut budget = RetryBudget::new(self.settings.max_retries);
        let mut step = Dispatch::Attempt;
        let outcome = loop {
            step = match step {
                Dispatch::Attempt => match self.attempt(&request).await {
                    Ok(()) => Dispatch::Done(Ok(Applied::Written {
                        retries: budget.used,
                    })),
                    Err(AttemptError::Fatal(failure)) => Dispatch::Done(Err(failure)),
                    Err(AttemptError::Retryable(e)) => {
                        if budget.try_consume() {
                            request.attempt_count = budget.used;
                            Dispatch::Backoff(e)
                        } else {
                            Dispatch::Done(Err(CommandFailure::RetriesExhausted {
                                retries: budget.used,
                                last: Box::new(e),
                            }))
                        }
                    }
                },
                Dispatch::Backoff(e) => {
                    warn!(
                        request = %request.id,
                        retry = budget.used,
                        max = budget.max,
                        error = %e,
                        "write failed, retrying"
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                    Dispatch::Attempt
                }
                Dispatch::Done(outcome) => break outcome,
            };
        };

        match &outcome {
            Ok(_) => {
                info!(request = %request.id, retries = request.attempt_count, "data was changed");
                self.write_clock.record_write();
                self.cache.overlay(&request.changes);
            }
            Err(failure) => {
                warn!(request = %request.id, %failure, "change request failed");
                let reverted = self.cache.revert(&request.fields());
                if !reverted.is_empty() {
                    debug!(?reverted, "dropped overlays of failed request");
                }
            }
        }
        outcome
    }

    fn already_in_effect(&self, state: &DeviceState, changes: &[Change]) -> bool {
        changes.iter().all(|c| {
            state.matches(c) && self.cache.field_state(c.field()) == FieldState::Synced
        })
    }

    async fn attempt(&self, request: &ChangeRequest) -> Result<(), AttemptError> {
        let (payload, pending) = self
            .cache
            .write_base()
            .ok_or(AttemptError::Fatal(CommandFailure::NoData))?;

        let session = match self.session.ensure_valid_session().await {
            Ok(s) => s,
            Err(e) if e.is_transient() => return Err(AttemptError::Retryable(e.into())),
            Err(_) => return Err(AttemptError::Fatal(CommandFailure::BadCredentials)),
        };

        let body = set_data_body(&payload, &pending, &request.changes);

        let labels: Vec<String> = request.changes.iter().map(|c| c.to_string()).collect();
        self.transport
            .with_logger(|log| log.log_command(&request.id.to_string(), &labels, &body));

        let resp = self
            .transport
            .send(Request::post(
                set_data_path(&session.plant_id),
                body,
                self.settings.write_timeout,
            ))
            .await
            .map_err(|e| AttemptError::Retryable(e.into()))?;

        match classify_status(resp.status) {
            ReplyClass::Ok => Ok(()),
            ReplyClass::SessionRejected => {
                self.session.invalidate().await;
                Err(AttemptError::Retryable(AuthError::SessionRejected.into()))
            }
            ReplyClass::Rejected => {
                warn!(status = resp.status, "command to set data rejected");
                Err(AttemptError::Fatal(CommandFailure::RejectedByService {
                    status: resp.status,
                }))
            }
            ReplyClass::Transient => {
                warn!(status = resp.status, "command to set data failed");
                Err(AttemptError::Retryable(
                    TransportError::status(resp.status).into(),
                ))
            }
        }
    }
}

/// Rounds setpoints to the steps the boiler supports and checks them against
/// the limits it last reported.
fn validate(
    changes: &[Change],
    state: Option<&DeviceState>,
) -> Result<Vec<Change>, CommandFailure> {
    changes
        .iter()
        .map(|change| match *change {
            Change::ChSetTemperature(t) => {
                let t = checked(t, round_ch, state.and_then(|s| s.ch_set_temperature_limits), "CH")?;
                Ok(Change::ChSetTemperature(t))
            }
            Change::DhwSetTemperature(t) => {
                let t = checked(t, round_dhw, state.and_then(|s| s.dhw_set_temperature_limits), "DHW")?;
                Ok(Change::DhwSetTemperature(t))
            }
            other => Ok(other),
        })
        .collect()
}

fn checked(
    wanted: f64,
    round: fn(f64) -> f64,
    limits: Option<Limits>,
    what: &str,
) -> Result<f64, CommandFailure> {
    if !wanted.is_finite() {
        return Err(CommandFailure::InvalidValue(format!(
            "{what} temperature {wanted} is not a number"
        )));
    }
    let t = round(wanted);
    match limits {
        Some(l) if !l.contains(t) => Err(CommandFailure::InvalidValue(format!(
            "{what} temperature {t} outside {}..{}",
            l.min, l.max
        ))),
        _ => Ok(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DeviceState {
        DeviceState {
            mode: Mode::Summer,
            ch_mode: ChMode::Manual,
            ch_set_temperature: 21.0,
            dhw_set_temperature: 50.0,
            detected_temperature: 20.0,
            ch_antifreeze_temperature: 5.0,
            flame: false,
            holiday_mode: false,
            online: true,
            power: true,
            ch_set_temperature_limits: Some(Limits { min: 10.0, max: 30.0 }),
            dhw_set_temperature_limits: Some(Limits { min: 40.0, max: 65.0 }),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn budget_never_exceeds_max() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used, 2);

        let mut none = RetryBudget::new(0);
        assert!(!none.try_consume());
        assert_eq!(none.used, 0);
    }

    #[test]
    fn setpoints_rounded_to_boiler_steps() {
        let changes = validate(
            &[Change::ChSetTemperature(21.3), Change::DhwSetTemperature(49.6)],
            Some(&state()),
        )
        .unwrap();
        assert_eq!(
            changes,
            vec![Change::ChSetTemperature(21.5), Change::DhwSetTemperature(50.0)]
        );
    }

    #[test]
    fn out_of_range_setpoint_refused() {
        let err = validate(&[Change::DhwSetTemperature(80.0)], Some(&state())).unwrap_err();
        assert!(matches!(err, CommandFailure::InvalidValue(_)));

        let err = validate(&[Change::ChSetTemperature(f64::NAN)], Some(&state())).unwrap_err();
        assert!(matches!(err, CommandFailure::InvalidValue(_)));
    }

    #[test]
    fn limits_unknown_before_first_fetch() {
        let changes = validate(&[Change::ChSetTemperature(35.2)], None).unwrap();
        assert_eq!(changes, vec![Change::ChSetTemperature(35.0)]);
    }

    #[test]
    fn write_clock_settles() {
        let clock = WriteClock::new(Duration::from_secs(60));
        assert!(!clock.settling());
        clock.record_write();
        assert!(clock.settling());

        let instant = WriteClock::new(Duration::ZERO);
        instant.record_write();
        assert!(!instant.settling());
    }
}
