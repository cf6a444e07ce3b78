//! Transcription sessions
//!
//! A `TranscriptionSession` owns a bounded audio queue and a recognition
//! worker that streams the queued audio to a `Recognizer`. Results are
//! dispatched to subscribers as they arrive; every session ends with exactly
//! one final result. The `SessionRegistry` tracks live sessions by id.

mod config;
mod queue;
mod registry;
mod result;
mod session;
mod state;
mod stats;
mod worker;

pub use config::SessionConfig;
pub use queue::{audio_queue, AudioChunk, AudioQueueReceiver, AudioQueueSender, EnqueueError};
pub use registry::SessionRegistry;
pub use result::TranscriptionResult;
pub use session::TranscriptionSession;
pub use state::SessionState;
pub use stats::SessionStats;
