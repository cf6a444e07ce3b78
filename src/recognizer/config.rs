use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which recognition collaborator sessions talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerBackend {
    /// Deterministic in-process stand-in for local development
    Simulated,
    /// STT service reached over NATS (loqa-core)
    Nats,
}

/// Configuration for the recognition collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub backend: RecognizerBackend,

    /// NATS server URL
    pub nats_url: String,

    /// Audio frames are published to `{audio_subject_prefix}.{session_id}`
    pub audio_subject_prefix: String,

    /// Subject the STT service publishes transcripts on
    pub transcript_subject: String,

    /// Sample rate of the PCM audio clients send (Whisper expects 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// BCP-47 language hint passed to the STT service
    pub language_code: String,

    /// Forward in-progress hypotheses, not only segment finals
    pub enable_partial_results: bool,

    /// How long to wait for the last transcript after the final frame marker
    pub finalize_grace_ms: u64,

    /// Capacity of the per-stream event channel
    pub event_buffer: usize,
}

impl RecognizerConfig {
    pub fn finalize_grace(&self) -> Duration {
        Duration::from_millis(self.finalize_grace_ms)
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Simulated,
            nats_url: "nats://localhost:4222".to_string(),
            audio_subject_prefix: "audio.frame".to_string(),
            transcript_subject: "stt.text.>".to_string(),
            sample_rate: 16000,
            channels: 1,
            language_code: "en-US".to_string(),
            enable_partial_results: true,
            finalize_grace_ms: 3_000,
            event_buffer: 256,
        }
    }
}
