//! Error taxonomy and retry classification.
//!
//! Every failure this core can observe maps onto one of four classes that
//! govern retry policy: configuration and authentication failures are
//! terminal, connection and timeout failures are retryable.

use thiserror::Error;

/// Failures surfaced by the messaging core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid or expired credential, or a rejected handshake. Terminal;
    /// the caller should route the user through re-authentication.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Malformed endpoint or otherwise broken deployment environment.
    /// Terminal, and surfaced distinctly from auth failures.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic transport failure (refused, dropped, protocol error).
    #[error("connection error: {0}")]
    Connection(String),

    /// The peer was too slow (handshake or request deadline exceeded).
    #[error("timed out: {0}")]
    Timeout(String),

    /// Input rejected locally before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// An operation required a live connection and none exists.
    #[error("not connected")]
    NotConnected,

    /// The REST collaborator answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be decoded. Distinct from an empty
    /// result so callers can tell "no messages yet" from "unreachable".
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Classify this failure for retry policy and user messaging.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Authentication(_) => ErrorClass::Authentication,
            Self::Api { status: 401 | 403, .. } => ErrorClass::Authentication,
            Self::Configuration(_) | Self::Validation(_) => ErrorClass::Configuration,
            Self::Timeout(_) => ErrorClass::Timeout,
            Self::Api { status: 408, .. } => ErrorClass::Timeout,
            Self::Connection(_) | Self::NotConnected | Self::Api { .. } | Self::Decode(_) => {
                ErrorClass::Connection
            }
        }
    }

    /// Whether an automatic retry is eligible for this failure.
    pub fn should_retry(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Connection-failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed endpoint / environment mismatch — terminal.
    Configuration,
    /// Invalid or expired credential — terminal, triggers re-auth upstream.
    Authentication,
    /// Generic transport failure — retryable.
    Connection,
    /// Slow peer — retryable.
    Timeout,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration | Self::Authentication => false,
            Self::Connection | Self::Timeout => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classes_do_not_retry() {
        assert!(!ClientError::Authentication("expired".into()).should_retry());
        assert!(!ClientError::Configuration("bad url".into()).should_retry());
        assert!(!ClientError::Validation("empty".into()).should_retry());
    }

    #[test]
    fn transient_classes_retry() {
        assert!(ClientError::Connection("refused".into()).should_retry());
        assert!(ClientError::Timeout("handshake".into()).should_retry());
        assert!(ClientError::NotConnected.should_retry());
    }

    #[test]
    fn api_status_classification() {
        let unauthorized = ClientError::Api {
            status: 401,
            message: "token expired".into(),
        };
        assert_eq!(unauthorized.class(), ErrorClass::Authentication);

        let slow = ClientError::Api {
            status: 408,
            message: "request timeout".into(),
        };
        assert_eq!(slow.class(), ErrorClass::Timeout);

        let server = ClientError::Api {
            status: 500,
            message: "oops".into(),
        };
        assert_eq!(server.class(), ErrorClass::Connection);
    }

    #[test]
    fn decode_is_distinct_from_empty() {
        // A decode failure classifies as a connection-grade problem, which
        // is how the UI tells "server unreachable/broken" from "no messages".
        assert_eq!(
            ClientError::Decode("trailing garbage".into()).class(),
            ErrorClass::Connection
        );
    }
}
