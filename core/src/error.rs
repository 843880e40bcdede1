use std::fmt;
use thiserror::Error;

/// The error type shared across the relay crates.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inbound message payload is malformed.
    Decode,

    /// A required setting is missing or invalid.
    Config,

    /// Control plane rejected the caller or a delegation request failed.
    Authorization,

    /// Destination container creation failed for a reason other than
    /// "already exists".
    ContainerProvision,

    /// The copy operation reached a terminal state other than success.
    CopyFailed,

    /// The copy operation stayed pending past the configured poll bound.
    CopyTimeout,

    /// Best-effort source cleanup failed.
    Delete,

    /// Unexpected errors (network, I/O, service errors, etc.).
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check whether this error leaves the source blob untouched by design:
    /// every kind except `Delete` is raised before cleanup runs.
    pub fn is_pre_cleanup(&self) -> bool {
        self.kind != ErrorKind::Delete
    }
}

// Convenience constructors, one per kind.
impl Error {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Create a container provisioning error.
    pub fn container_provision(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContainerProvision, message)
    }

    /// Create a copy failed error.
    pub fn copy_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CopyFailed, message)
    }

    /// Create a copy timeout error.
    pub fn copy_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CopyTimeout, message)
    }

    /// Create a delete error.
    pub fn delete(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Delete, message)
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Decode => write!(f, "malformed message"),
            ErrorKind::Config => write!(f, "invalid configuration"),
            ErrorKind::Authorization => write!(f, "authorization failed"),
            ErrorKind::ContainerProvision => write!(f, "container provisioning failed"),
            ErrorKind::CopyFailed => write!(f, "copy failed"),
            ErrorKind::CopyTimeout => write!(f, "copy timed out"),
            ErrorKind::Delete => write!(f, "cleanup failed"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::decode(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
