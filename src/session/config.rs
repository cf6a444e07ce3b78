use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for transcription sessions and their recognition workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of audio chunks waiting in a session's queue
    /// Default: 64
    pub queue_capacity: usize,

    /// Maximum number of live sessions in the registry
    pub max_sessions: usize,

    /// How long enqueue may wait for queue space before failing with
    /// backpressure (0 = fail immediately)
    pub enqueue_wait_ms: u64,

    /// Upper bound on the whole stop phase (flush, finalize, trailing results)
    pub drain_deadline_ms: u64,

    /// Upper bound on any single recognizer call
    pub call_timeout_ms: u64,

    /// Reconnect attempts after a transient recognizer fault
    pub max_retries: u32,

    /// Initial reconnect backoff, doubled per attempt
    pub retry_backoff_ms: u64,

    /// Ceiling for the reconnect backoff
    pub max_retry_backoff_ms: u64,

    /// Chunks sent to the recognizer but not yet acknowledged before the
    /// worker stops pulling from the queue
    pub max_unacked_chunks: usize,

    /// Number of stopped sessions kept for diagnostics
    pub recent_history: usize,
}

impl SessionConfig {
    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.enqueue_wait_ms)
    }

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff before reconnect attempt `attempt` (1-based)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_retry_backoff_ms);
        Duration::from_millis(millis)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.queue_capacity > 0, "sessions.queue_capacity must be positive");
        anyhow::ensure!(self.max_sessions > 0, "sessions.max_sessions must be positive");
        anyhow::ensure!(
            self.max_unacked_chunks > 0,
            "sessions.max_unacked_chunks must be positive"
        );
        anyhow::ensure!(
            self.drain_deadline_ms > 0,
            "sessions.drain_deadline_ms must be positive"
        );
        anyhow::ensure!(self.call_timeout_ms > 0, "sessions.call_timeout_ms must be positive");
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,       // ~6.4s of 100ms chunks
            max_sessions: 256,
            enqueue_wait_ms: 0,
            drain_deadline_ms: 5_000,
            call_timeout_ms: 2_000,
            max_retries: 3,
            retry_backoff_ms: 200,
            max_retry_backoff_ms: 2_000,
            max_unacked_chunks: 32,
            recent_history: 32,
        }
    }
}
