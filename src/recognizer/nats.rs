use super::{AudioSink, RecognitionEvent, RecognitionStream, Recognizer, RecognizerConfig};
use crate::error::RecognizerError;
use crate::nats::{FrameFormat, NatsClient, TranscriptMessage};
use crate::session::AudioChunk;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Recognizer backed by the loqa-core STT service over NATS
///
/// Audio is published to `{audio_subject_prefix}.{session_id}`; transcripts
/// come back on `transcript_subject` and are filtered by session id. A
/// successful publish acknowledges the chunk. The `final` frame marker asks
/// the service to flush; the stream ends at the next committed transcript or
/// after the finalize grace period.
pub struct NatsRecognizer {
    client: NatsClient,
    config: RecognizerConfig,
}

impl NatsRecognizer {
    pub fn new(client: NatsClient, config: RecognizerConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait::async_trait]
impl Recognizer for NatsRecognizer {
    async fn open(&self, session_id: &str) -> Result<RecognitionStream, RecognizerError> {
        let subscriber = self
            .client
            .subscribe(&self.config.transcript_subject)
            .await
            .map_err(|e| RecognizerError::Transient(format!("{:#}", e)))?;

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let (finalize_tx, finalize_rx) = watch::channel(false);

        let listener = tokio::spawn(listen_for_transcripts(
            subscriber,
            session_id.to_string(),
            events_tx.clone(),
            finalize_rx,
            self.config.enable_partial_results,
            self.config.finalize_grace(),
        ));

        info!(
            "Opened NATS recognition stream for session {} (transcripts on {})",
            session_id, self.config.transcript_subject
        );

        Ok(RecognitionStream {
            sink: Box::new(NatsAudioSink {
                client: self.client.clone(),
                subject: format!("{}.{}", self.config.audio_subject_prefix, session_id),
                session_id: session_id.to_string(),
                format: FrameFormat {
                    sample_rate: self.config.sample_rate,
                    channels: self.config.channels,
                    language: Some(self.config.language_code.clone()),
                },
                events: Some(events_tx),
                finalize_tx,
                listener,
                last_sequence: None,
            }),
            events: events_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

struct NatsAudioSink {
    client: NatsClient,
    subject: String,
    session_id: String,
    format: FrameFormat,
    /// Used for acknowledgements; dropped on finalize so the event channel
    /// closes when the listener finishes
    events: Option<mpsc::Sender<RecognitionEvent>>,
    finalize_tx: watch::Sender<bool>,
    listener: JoinHandle<()>,
    last_sequence: Option<u64>,
}

#[async_trait::async_trait]
impl AudioSink for NatsAudioSink {
    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), RecognizerError> {
        let Some(events) = &self.events else {
            return Err(RecognizerError::Transient("stream already finalized".into()));
        };

        self.client
            .publish_audio_frame(
                &self.subject,
                &self.session_id,
                &chunk.data,
                &self.format,
                chunk.sequence,
                false,
            )
            .await
            .map_err(|e| RecognizerError::Transient(format!("{:#}", e)))?;

        self.last_sequence = Some(chunk.sequence);

        events
            .send(RecognitionEvent::Acknowledged {
                through: chunk.sequence,
            })
            .await
            .map_err(|_| RecognizerError::Transient("event channel closed".into()))
    }

    async fn finalize(&mut self) -> Result<(), RecognizerError> {
        let sequence = self.last_sequence.map_or(0, |s| s + 1);

        // Send final frame marker
        self.client
            .publish_audio_frame(&self.subject, &self.session_id, &[], &self.format, sequence, true)
            .await
            .map_err(|e| RecognizerError::Transient(format!("{:#}", e)))?;

        let _ = self.finalize_tx.send(true);
        self.events.take();

        debug!("Sent final frame marker for session {}", self.session_id);
        Ok(())
    }

    async fn abort(&mut self) {
        self.listener.abort();
        self.events.take();
    }
}

impl Drop for NatsAudioSink {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen_for_transcripts(
    mut subscriber: async_nats::Subscriber,
    session_id: String,
    events: mpsc::Sender<RecognitionEvent>,
    mut finalize_rx: watch::Receiver<bool>,
    forward_partials: bool,
    finalize_grace: Duration,
) {
    let mut grace_deadline: Option<Instant> = None;

    loop {
        let grace = async {
            match grace_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            changed = finalize_rx.changed(), if grace_deadline.is_none() => {
                if changed.is_err() {
                    // Sink dropped without finalizing
                    break;
                }
                if *finalize_rx.borrow() {
                    grace_deadline = Some(Instant::now() + finalize_grace);
                }
            }

            _ = grace => {
                debug!("No final transcript within grace period for session {}", session_id);
                break;
            }

            msg = subscriber.next() => {
                let Some(msg) = msg else {
                    let _ = events
                        .send(RecognitionEvent::Fault(RecognizerError::Transient(
                            "transcript subscription closed".into(),
                        )))
                        .await;
                    break;
                };

                let transcript = match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                        continue;
                    }
                };

                // Filter by session_id
                if transcript.session_id != session_id {
                    continue;
                }
                if transcript.partial && !forward_partials {
                    continue;
                }

                let committed = !transcript.partial;
                let event = RecognitionEvent::Transcript {
                    text: transcript.text,
                    is_partial: transcript.partial,
                    confidence: transcript.confidence.unwrap_or(0.0),
                };
                if events.send(event).await.is_err() {
                    break;
                }

                if committed && grace_deadline.is_some() {
                    break;
                }
            }
        }
    }

    debug!("Transcript listener stopped for session {}", session_id);
}
