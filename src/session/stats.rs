use super::result::TranscriptionResult;
use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session reached `Stopped`, if it has
    pub stopped_at: Option<DateTime<Utc>>,

    /// Lifetime in seconds (up to now, or up to `stopped_at`)
    pub duration_secs: f64,

    /// Audio chunks accepted into the queue
    pub chunks_received: u64,

    /// Audio chunks currently waiting in the queue
    pub chunks_queued: usize,

    /// Results dispatched to subscribers
    pub results_emitted: u64,

    /// Current result subscribers
    pub subscribers: usize,

    pub last_result: Option<TranscriptionResult>,

    /// Why the recognition worker failed, if it did
    pub fault: Option<String>,
}
