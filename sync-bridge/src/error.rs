//! Error types for sync-bridge.
//!
//! All lower-layer errors flatten to human-readable strings.
//! C callers get a status code plus a message, not Rust enum internals.

use chainsync_core::LifecycleError;
use chainsync_engine::EngineError;
use chainsync_types::{SessionId, SyncError};
use thiserror::Error;

/// Status codes returned by every C entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    /// The call succeeded.
    Success = 0,
    /// Unclassified failure.
    General = -1,
    /// A required argument was missing or malformed.
    InvalidArgument = -2,
    /// An event or lookup result could not be encoded.
    Serialization = -3,
    /// The node could not be reached.
    Connection = -4,
    /// A bounded wait expired.
    Timeout = -5,
    /// No session has the given id.
    SessionNotFound = -6,
    /// The session is already starting or started.
    SessionAlreadyStarted = -7,
    /// The operation needs a started session.
    SessionNotStarted = -8,
}

impl StatusCode {
    /// Numeric value handed to C callers.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors from sync-bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A caller-supplied argument was rejected.
    #[error("{0}")]
    InvalidArgument(String),

    /// Encoding a result failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The node could not be reached during a lookup.
    #[error("connection error: {0}")]
    Connection(String),

    /// A lookup did not finish in time.
    #[error("{0}")]
    Timeout(String),

    /// No session of the requested kind has this id.
    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    /// Start requested while the session is starting or started.
    #[error("Session already started: {0}")]
    SessionAlreadyStarted(SessionId),

    /// The session must be started first.
    #[error("Session not started: {0}")]
    SessionNotStarted(SessionId),

    /// Everything else, including engine failures during start and fetch.
    #[error("{0}")]
    General(String),
}

impl BridgeError {
    /// The status code C callers receive for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidArgument(_) => StatusCode::InvalidArgument,
            BridgeError::Serialization(_) => StatusCode::Serialization,
            BridgeError::Connection(_) => StatusCode::Connection,
            BridgeError::Timeout(_) => StatusCode::Timeout,
            BridgeError::SessionNotFound(_) => StatusCode::SessionNotFound,
            BridgeError::SessionAlreadyStarted(_) => StatusCode::SessionAlreadyStarted,
            BridgeError::SessionNotStarted(_) => StatusCode::SessionNotStarted,
            BridgeError::General(_) => StatusCode::General,
        }
    }

    /// Map a rejected lifecycle transition for session `id`.
    pub fn lifecycle(id: SessionId, err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyStarted => BridgeError::SessionAlreadyStarted(id),
            LifecycleError::StoppedWhileStarting => {
                BridgeError::General(format!("Session {} stopped while starting", id))
            }
            other => BridgeError::General(other.to_string()),
        }
    }

    /// Map an engine failure from a one-shot lookup.
    ///
    /// Lookups report reachability problems as Connection, unlike session
    /// operations which report every engine failure as General.
    pub fn lookup(what: &str, err: EngineError) -> Self {
        match err {
            EngineError::Timeout => BridgeError::Timeout(format!("{} timed out", what)),
            other => BridgeError::Connection(format!("{} error: {}", what, other)),
        }
    }
}

impl From<SyncError> for BridgeError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::InvalidArgument(msg) => BridgeError::InvalidArgument(msg),
            SyncError::InvalidHash { .. } => BridgeError::InvalidArgument(err.to_string()),
            SyncError::Serialization(_) | SyncError::Deserialization(_) => {
                BridgeError::Serialization(err.to_string())
            }
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        BridgeError::General(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_types::ChainPoint;

    fn id(n: u32) -> SessionId {
        SessionId::new(n).unwrap()
    }

    #[test]
    fn status_codes_match_c_values() {
        assert_eq!(StatusCode::Success.code(), 0);
        assert_eq!(StatusCode::General.code(), -1);
        assert_eq!(StatusCode::InvalidArgument.code(), -2);
        assert_eq!(StatusCode::Serialization.code(), -3);
        assert_eq!(StatusCode::Connection.code(), -4);
        assert_eq!(StatusCode::Timeout.code(), -5);
        assert_eq!(StatusCode::SessionNotFound.code(), -6);
        assert_eq!(StatusCode::SessionAlreadyStarted.code(), -7);
        assert_eq!(StatusCode::SessionNotStarted.code(), -8);
    }

    #[test]
    fn session_errors_name_the_id() {
        let err = BridgeError::SessionNotFound(42);
        assert_eq!(err.to_string(), "Session not found: 42");
        assert_eq!(err.status_code(), StatusCode::SessionNotFound);

        let err = BridgeError::SessionAlreadyStarted(id(3));
        assert_eq!(err.to_string(), "Session already started: 3");
        assert_eq!(err.status_code(), StatusCode::SessionAlreadyStarted);

        let err = BridgeError::SessionNotStarted(id(4));
        assert_eq!(err.status_code(), StatusCode::SessionNotStarted);
    }

    #[test]
    fn invalid_argument_keeps_message() {
        let err: BridgeError = SyncError::InvalidArgument("From hash is required".into()).into();
        assert_eq!(err.to_string(), "From hash is required");
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn invalid_hash_maps_to_invalid_argument() {
        let sync_err = ChainPoint::new(1, "zz").hash_bytes().unwrap_err();
        let err: BridgeError = sync_err.into();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn serializer_errors_map_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BridgeError = SyncError::Deserialization(json_err).into();
        assert_eq!(err.status_code(), StatusCode::Serialization);
    }

    #[test]
    fn engine_errors_are_general_for_sessions() {
        let err: BridgeError = EngineError::ConnectionFailed("refused".into()).into();
        assert_eq!(err.status_code(), StatusCode::General);
        assert!(err.to_string().contains("refused"));

        let err: BridgeError = EngineError::Timeout.into();
        assert_eq!(err.status_code(), StatusCode::General);
    }

    #[test]
    fn engine_errors_split_for_lookups() {
        let err = BridgeError::lookup("Tip finder", EngineError::Timeout);
        assert_eq!(err.status_code(), StatusCode::Timeout);
        assert_eq!(err.to_string(), "Tip finder timed out");

        let err = BridgeError::lookup(
            "Peer discovery",
            EngineError::ConnectionFailed("unreachable".into()),
        );
        assert_eq!(err.status_code(), StatusCode::Connection);
        assert!(err.to_string().contains("Peer discovery error"));

        let err = BridgeError::lookup("Tip finder", EngineError::Protocol("bad tip".into()));
        assert_eq!(err.status_code(), StatusCode::Connection);
    }

    #[test]
    fn lifecycle_errors_map_by_kind() {
        let err = BridgeError::lifecycle(id(9), LifecycleError::AlreadyStarted);
        assert!(matches!(err, BridgeError::SessionAlreadyStarted(_)));

        let err = BridgeError::lifecycle(id(9), LifecycleError::StoppedWhileStarting);
        assert_eq!(err.status_code(), StatusCode::General);
        assert_eq!(err.to_string(), "Session 9 stopped while starting");
    }
}
