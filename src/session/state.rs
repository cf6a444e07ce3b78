use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a transcription session
///
/// ```text
/// Created ──► Streaming ──► Stopping ──► Stopped
///                 │                         ▲
///                 └──── fatal worker fault ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Streaming,
    Stopping,
    Stopped,
}

impl SessionState {
    pub fn accepts_input(self) -> bool {
        self == SessionState::Streaming
    }

    pub fn is_stopped(self) -> bool {
        self == SessionState::Stopped
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Streaming) | (Streaming, Stopping) | (Stopping, Stopped) | (Streaming, Stopped)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
