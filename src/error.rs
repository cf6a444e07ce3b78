//! Error types for the transcription session engine
//!
//! Everything in [`TranscribeError`] except `WorkerFault` is recoverable and
//! surfaced to the caller for a retry/backoff decision. A worker fault is
//! terminal for its own session only.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`TranscribeError`]
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Errors returned by the registry, sessions and the correlation map
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscribeError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} is not accepting input")]
    SessionNotAcceptingInput(String),

    #[error("audio queue for session {0} is full")]
    Backpressure(String),

    #[error("connection {connection_id} is already bound to session {session_id}")]
    AlreadyBound {
        connection_id: String,
        session_id: String,
    },

    #[error("connection {0} is not bound to a session")]
    NotBound(String),

    #[error("session limit of {0} reached")]
    ResourceExhausted(usize),

    #[error("session {session_id} failed: {fault}")]
    WorkerFault {
        session_id: String,
        fault: WorkerFault,
    },
}

impl TranscribeError {
    /// Whether a caller may retry after backing off
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TranscribeError::WorkerFault { .. })
    }

    /// Stable machine-readable error code for wire messages
    pub fn code(&self) -> &'static str {
        match self {
            TranscribeError::SessionNotFound(_) => "session_not_found",
            TranscribeError::SessionNotAcceptingInput(_) => "session_not_accepting_input",
            TranscribeError::Backpressure(_) => "backpressure",
            TranscribeError::AlreadyBound { .. } => "already_bound",
            TranscribeError::NotBound(_) => "not_bound",
            TranscribeError::ResourceExhausted(_) => "resource_exhausted",
            TranscribeError::WorkerFault { .. } => "worker_fault",
        }
    }
}

/// Why a recognition worker gave up on its session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerFault {
    #[error("recognizer unavailable after {attempts} reconnect attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: RecognizerError,
    },

    #[error("recognizer reported a fatal fault: {0}")]
    Fatal(String),

    #[error("drain deadline of {0:?} exceeded")]
    DrainDeadlineExceeded(Duration),

    #[error("recognition worker aborted: {0}")]
    Aborted(String),
}

/// Faults reported by a recognition collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognizerError {
    /// The stream broke but can be reopened
    #[error("transient recognizer fault: {0}")]
    Transient(String),

    /// The recognizer cannot continue for this session
    #[error("fatal recognizer fault: {0}")]
    Fatal(String),

    #[error("recognizer call timed out after {0:?}")]
    Timeout(Duration),
}

impl RecognizerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognizerError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_worker_fault_is_terminal() {
        assert!(TranscribeError::Backpressure("s".into()).is_recoverable());
        assert!(TranscribeError::ResourceExhausted(4).is_recoverable());

        let fault = TranscribeError::WorkerFault {
            session_id: "s".into(),
            fault: WorkerFault::Fatal("engine crashed".into()),
        };
        assert!(!fault.is_recoverable());
        assert_eq!(fault.code(), "worker_fault");
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        assert!(!RecognizerError::Timeout(Duration::from_millis(5)).is_fatal());
        assert!(!RecognizerError::Transient("reset".into()).is_fatal());
        assert!(RecognizerError::Fatal("bad audio".into()).is_fatal());
    }
}
