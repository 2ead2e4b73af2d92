use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connection,
    MalformedResponse,
    UnexpectedStatus(u16),
}

/// Raw I/O or decoding failure. Carries no boiler semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, detail)
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::MalformedResponse, detail)
    }

    pub fn status(code: u16) -> Self {
        Self::new(
            TransportErrorKind::UnexpectedStatus(code),
            format!("unexpected reply {code}"),
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Timeout => write!(f, "timeout: {}", self.detail),
            TransportErrorKind::Connection => write!(f, "connection error: {}", self.detail),
            TransportErrorKind::MalformedResponse => {
                write!(f, "malformed response: {}", self.detail)
            }
            TransportErrorKind::UnexpectedStatus(_) => write!(f, "{}", self.detail),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::timeout(e.to_string())
        } else if e.is_decode() {
            TransportError::malformed(e.to_string())
        } else {
            TransportError::connection(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login completed but the service did not accept the credentials.
    BadCredentials,
    /// Login could not be completed.
    ServiceUnavailable(TransportError),
    /// An established session was refused mid-operation.
    SessionRejected,
}

impl AuthError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, AuthError::BadCredentials)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::BadCredentials => write!(f, "bad credentials"),
            AuthError::ServiceUnavailable(e) => write!(f, "login service unavailable: {e}"),
            AuthError::SessionRejected => write!(f, "session rejected by service"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::ServiceUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

/// Terminal failure of a change request.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandFailure {
    RetriesExhausted { retries: u16, last: Box<Error> },
    RejectedByService { status: u16 },
    BadCredentials,
    InvalidValue(String),
    /// Nothing has been fetched yet, so there is no payload to base a write on.
    NoData,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::RetriesExhausted { retries, last } => {
                write!(f, "gave up after {retries} retries: {last}")
            }
            CommandFailure::RejectedByService { status } => {
                write!(f, "rejected by service with code {status}")
            }
            CommandFailure::BadCredentials => write!(f, "bad credentials"),
            CommandFailure::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            CommandFailure::NoData => write!(f, "no data fetched from server yet"),
        }
    }
}

impl std::error::Error for CommandFailure {}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Transport(TransportError),
    Auth(AuthError),
    Command(CommandFailure),
    Config(String),
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Auth(e) => write!(f, "auth error: {e}"),
            Error::Command(e) => write!(f, "command failed: {e}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Auth(e) => Some(e),
            Error::Command(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<CommandFailure> for Error {
    fn from(e: CommandFailure) -> Self {
        Error::Command(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
