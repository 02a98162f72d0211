//! Bridge error taxonomy.
//!
//! Every failure the bridge can surface is one of three kinds:
//!
//! | Kind              | Escalated | Seen by caller |
//! |-------------------|-----------|----------------|
//! | Transient / local | no        | logged, best-effort result |
//! | Malformed payload | no        | `MalformedResponse` |
//! | Fatal             | yes       | `Fatal` (the process is about to exit) |
//!
//! Callers ask `is_fatal()` instead of matching on strings.

use std::fmt;

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A failure talking to the automation backend over HTTP.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure, or any other I/O-level error.
    #[error("connection to automation backend failed: {0}")]
    Connect(String),

    /// The request did not complete within the configured timeout.
    #[error("request to automation backend timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("automation backend answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// HTTP status code, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend was unreachable (as opposed to answering with an error).
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, Self::Status { .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        Self::Connect(err.to_string())
    }
}

/// Why the process is being taken down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    /// A request to the automation backend failed at the transport level.
    RequestFailed(String),
    /// The streaming channel could not be kept open.
    ChannelLost(String),
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed(msg) => write!(f, "automation request failed: {msg}"),
            Self::ChannelLost(msg) => write!(f, "streaming channel lost: {msg}"),
        }
    }
}

/// Errors surfaced by the bridge core.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Unrecoverable; escalation has already been triggered.
    #[error("fatal: {0}")]
    Fatal(FatalReason),

    /// The backend answered with a non-success status on a tolerant request.
    #[error("backend answered {status} for {method} {path}")]
    Status {
        method: String,
        path: String,
        status: u16,
    },

    /// A backend payload did not match the expected schema.
    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    /// The operation needs an automation session and none is active.
    #[error("no active automation session")]
    NoSession,

    /// The operation needs the device geometry and it has not been queried yet.
    #[error("device size unknown")]
    NoDeviceSize,

    /// No element in the accessibility tree carries the requested label.
    #[error("no element labelled {label:?}")]
    ElementNotFound { label: String },

    /// A newer session replaced the one this response belonged to.
    #[error("stale response for session {session_id:?} discarded")]
    Stale { session_id: Option<String> },

    /// The log capture process could not be spawned or managed.
    #[error("log capture error: {0}")]
    Capture(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether escalation has been triggered for this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// HTTP status for tolerant requests that got a non-success answer.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn malformed(endpoint: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_not_unreachable() {
        let err = TransportError::Status {
            status: 404,
            body: "no such element".into(),
        };
        assert!(!err.is_unreachable());
        assert_eq!(err.status(), Some(404));
        assert!(TransportError::Timeout.is_unreachable());
        assert!(TransportError::Connect("refused".into()).is_unreachable());
    }

    #[test]
    fn only_fatal_is_fatal() {
        assert!(BridgeError::Fatal(FatalReason::ChannelLost("eof".into())).is_fatal());
        assert!(!BridgeError::malformed("/status", "missing value").is_fatal());
        assert!(!BridgeError::NoSession.is_fatal());
    }

    #[test]
    fn fatal_reason_display_names_source() {
        let reason = FatalReason::RequestFailed("connection refused".into());
        assert_eq!(
            reason.to_string(),
            "automation request failed: connection refused"
        );
    }
}
