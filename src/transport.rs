use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::logger::MessageLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl Request {
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            timeout,
        }
    }

    pub fn post(path: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl Response {
    pub fn json(&self) -> Result<Value, TransportError> {
        serde_json::from_str(&self.body)
            .map_err(|e| TransportError::malformed(format!("invalid JSON: {e}")))
    }
}

pub(crate) type SharedLogger = Arc<Mutex<MessageLogger>>;

/// Cookie-keeping HTTP exchange with the service. Never retries.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    logger: Option<SharedLogger>,
}

impl HttpTransport {
    pub(crate) fn new(
        base_url: impl Into<String>,
        logger: Option<SharedLogger>,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            logger,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs `f` against the message log, if one is configured.
    pub(crate) fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }

    pub async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = request.method.as_str(), url = %url, "sending request");

        self.with_logger(|log| {
            log.log_request(request.method.as_str(), &request.path, request.body.as_ref())
        });

        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder.timeout(request.timeout).send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await?;
        trace!(status, url = %final_url, len = body.len(), "received response");

        Ok(Response {
            status,
            url: final_url,
            body,
        })
    }
}
