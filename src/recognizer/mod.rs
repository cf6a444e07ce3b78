//! Recognition collaborator boundary
//!
//! A [`Recognizer`] opens one [`RecognitionStream`] per session. The worker
//! pushes audio through the stream's [`AudioSink`] and reads
//! [`RecognitionEvent`]s from its event channel concurrently; results arrive
//! asynchronously and out-of-band from the `send` calls.
//!
//! Implementations:
//! - NATS: publishes PCM frames to the loqa-core STT service
//! - Simulated: deterministic local stand-in for development

mod config;
mod nats;
mod simulated;

pub use config::{RecognizerBackend, RecognizerConfig};
pub use nats::NatsRecognizer;
pub use simulated::SimulatedRecognizer;

use crate::error::RecognizerError;
use crate::nats::NatsClient;
use crate::session::AudioChunk;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Something the recognizer reports for a stream
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A hypothesis (`is_partial`) or a committed segment
    Transcript {
        text: String,
        is_partial: bool,
        confidence: f32,
    },
    /// Every chunk up to and including `through` has been consumed
    Acknowledged { through: u64 },
    /// The stream broke; transient faults may be retried on a new stream
    Fault(RecognizerError),
}

/// Audio input side of a recognition stream
#[async_trait::async_trait]
pub trait AudioSink: Send {
    /// Hand one chunk to the recognizer
    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), RecognizerError>;

    /// No more audio follows; flush and emit the remaining results, then
    /// close the event channel
    async fn finalize(&mut self) -> Result<(), RecognizerError>;

    /// Tear the stream down without waiting for results
    async fn abort(&mut self);
}

/// One open stream to the recognizer
pub struct RecognitionStream {
    pub sink: Box<dyn AudioSink>,
    /// Closed by the recognizer once it has finished after `finalize`
    pub events: mpsc::Receiver<RecognitionEvent>,
}

/// Streaming speech recognizer
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Open a new stream for `session_id`
    async fn open(&self, session_id: &str) -> Result<RecognitionStream, RecognizerError>;

    /// Recognizer name for logging
    fn name(&self) -> &str;
}

/// Recognizer factory
pub struct RecognizerFactory;

impl RecognizerFactory {
    /// Create the recognizer selected by configuration
    pub async fn create(config: &RecognizerConfig) -> Result<Arc<dyn Recognizer>> {
        match config.backend {
            RecognizerBackend::Simulated => {
                info!("Using simulated recognizer");
                Ok(Arc::new(SimulatedRecognizer::new(config.clone())))
            }

            RecognizerBackend::Nats => {
                let client = NatsClient::connect(&config.nats_url)
                    .await
                    .context("Failed to connect recognizer to NATS")?;
                Ok(Arc::new(NatsRecognizer::new(client, config.clone())))
            }
        }
    }
}
