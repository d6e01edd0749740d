use std::sync::Arc;

use reqwest::StatusCode;

/// Error type returned by this crate.
///
/// Cloneable so a single attempt failure can be recorded in the error log
/// and still be handed back to the caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed to complete the call (network, DNS, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[source] Arc<dyn std::error::Error + Send + Sync>),
    /// A response arrived with a status of 400 or above.
    #[error("{0}")]
    Status(StatusCode),
    /// The request body could not be buffered before dispatch.
    #[error("error reading request body: {0}")]
    BodyRead(#[source] Arc<std::io::Error>),
    /// The target could not be turned into a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// `max_retries` is zero, so no attempt was made.
    #[error("max_retries is 0, no attempt was made")]
    NoAttempts,
    /// Every worker stopped without reporting an outcome.
    #[error("all workers stopped without reporting an outcome")]
    WorkersLost,
    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Wraps any transport-level failure.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport(Arc::from(err.into()))
    }

    pub(crate) fn body_read(err: std::io::Error) -> Self {
        Self::BodyRead(Arc::new(err))
    }

    /// Returns the failure status when the error came from an HTTP response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came from an attempt and would have been retried.
    pub fn is_attempt_failure(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use reqwest::StatusCode;

    #[test]
    fn status_error_displays_status_text() {
        let err = Error::Status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "500 Internal Server Error");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.is_attempt_failure());
    }

    #[test]
    fn transport_error_keeps_source() {
        let err = Error::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(err.to_string(), "transport error: connection refused");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.clone().to_string(), err.to_string());
    }

    #[test]
    fn configuration_errors_are_not_attempt_failures() {
        assert!(!Error::NoAttempts.is_attempt_failure());
        assert!(!Error::Config("bad".to_owned()).is_attempt_failure());
    }
}
