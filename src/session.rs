use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AuthError, TransportError};
use crate::protocol::{login_body, plant_id_from_url, LOGIN_PATH};
use crate::transport::{HttpTransport, Request};

/// Authenticated access to one plant. The cookie itself lives in the
/// transport's cookie store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub plant_id: String,
    pub issued_at: DateTime<Utc>,
    pub valid: bool,
}

pub(crate) struct Credentials {
    pub username: String,
    pub password: String,
}

/// Owns the single session of a client and renews it on demand.
pub struct SessionManager {
    transport: Arc<HttpTransport>,
    credentials: Credentials,
    login_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl SessionManager {
    pub(crate) fn new(
        transport: Arc<HttpTransport>,
        credentials: Credentials,
        login_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            login_timeout,
            session: Mutex::new(None),
        }
    }

    /// Returns the held session, logging in first if it is missing or invalid.
    /// Concurrent callers wait on the same login.
    pub async fn ensure_valid_session(&self) -> Result<Session, AuthError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref()
            && session.valid
        {
            return Ok(session.clone());
        }

        let session = self.login().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Marks the current session unusable. The next caller logs in again.
    pub async fn invalidate(&self) {
        if let Some(session) = self.session.lock().await.as_mut()
            && session.valid
        {
            warn!(plant_id = %session.plant_id, "session invalidated");
            session.valid = false;
        }
    }

    pub async fn logout(&self) {
        if self.session.lock().await.take().is_some() {
            info!("session dropped");
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    async fn login(&self) -> Result<Session, AuthError> {
        let body = login_body(&self.credentials.username, &self.credentials.password);
        let resp = self
            .transport
            .send(Request::post(LOGIN_PATH, body, self.login_timeout))
            .await
            .map_err(|e| {
                warn!(error = %e, "authentication communication error");
                AuthError::ServiceUnavailable(e)
            })?;

        match plant_id_from_url(self.transport.base_url(), &resp.url) {
            Some(plant_id) => {
                info!(plant_id = %plant_id, "logged in");
                Ok(Session {
                    plant_id,
                    issued_at: Utc::now(),
                    valid: true,
                })
            }
            None if resp.status >= 500 => {
                warn!(status = resp.status, "login service error");
                Err(AuthError::ServiceUnavailable(TransportError::status(resp.status)))
            }
            None => {
                warn!(status = resp.status, url = %resp.url, "authentication login error");
                Err(AuthError::BadCredentials)
            }
        }
    }
}
