use super::{AudioSink, RecognitionEvent, RecognitionStream, Recognizer, RecognizerConfig};
use crate::error::RecognizerError;
use crate::session::AudioChunk;
use tokio::sync::mpsc;
use tracing::debug;

/// Every Nth non-empty chunk produces a transcript
const CHUNKS_PER_SEGMENT: u64 = 3;

/// In-process recognizer that fabricates transcripts from chunk counts
///
/// Useful for exercising the transport and session engine without an STT
/// service. Every third non-empty chunk yields a partial hypothesis followed
/// by a committed segment at 0.95 confidence.
pub struct SimulatedRecognizer {
    config: RecognizerConfig,
}

impl SimulatedRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }
}

impl Default for SimulatedRecognizer {
    fn default() -> Self {
        Self::new(RecognizerConfig::default())
    }
}

#[async_trait::async_trait]
impl Recognizer for SimulatedRecognizer {
    async fn open(&self, session_id: &str) -> Result<RecognitionStream, RecognizerError> {
        debug!("Opening simulated recognition stream for session {}", session_id);

        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        Ok(RecognitionStream {
            sink: Box::new(SimulatedSink {
                events: Some(tx),
                chunks_heard: 0,
                partials: self.config.enable_partial_results,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedSink {
    events: Option<mpsc::Sender<RecognitionEvent>>,
    chunks_heard: u64,
    partials: bool,
}

impl SimulatedSink {
    async fn emit(&self, event: RecognitionEvent) -> Result<(), RecognizerError> {
        let Some(events) = &self.events else {
            return Err(RecognizerError::Transient("simulated stream is finalized".into()));
        };
        events
            .send(event)
            .await
            .map_err(|_| RecognizerError::Transient("simulated stream was dropped".into()))
    }
}

#[async_trait::async_trait]
impl AudioSink for SimulatedSink {
    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), RecognizerError> {
        if !chunk.data.is_empty() {
            self.chunks_heard += 1;

            if self.chunks_heard % CHUNKS_PER_SEGMENT == 0 {
                if self.partials {
                    self.emit(RecognitionEvent::Transcript {
                        text: format!("Processing audio... {} chunks", self.chunks_heard),
                        is_partial: true,
                        confidence: 0.5,
                    })
                    .await?;
                }

                self.emit(RecognitionEvent::Transcript {
                    text: format!(
                        "This is a simulated transcription with {} chunks.",
                        self.chunks_heard
                    ),
                    is_partial: false,
                    confidence: 0.95,
                })
                .await?;
            }
        }

        self.emit(RecognitionEvent::Acknowledged {
            through: chunk.sequence,
        })
        .await
    }

    async fn finalize(&mut self) -> Result<(), RecognizerError> {
        self.events.take();
        Ok(())
    }

    async fn abort(&mut self) {
        self.events.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk(sequence: u64) -> AudioChunk {
        AudioChunk {
            sequence,
            data: Bytes::from_static(&[1, 0, 2, 0]),
        }
    }

    #[tokio::test]
    async fn test_third_chunk_produces_segment() {
        let recognizer = SimulatedRecognizer::default();
        let mut stream = recognizer.open("s").await.unwrap();

        for sequence in 0..3 {
            stream.sink.send(&chunk(sequence)).await.unwrap();
        }
        stream.sink.finalize().await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                RecognitionEvent::Acknowledged { through: 0 },
                RecognitionEvent::Acknowledged { through: 1 },
                RecognitionEvent::Transcript {
                    text: "Processing audio... 3 chunks".into(),
                    is_partial: true,
                    confidence: 0.5,
                },
                RecognitionEvent::Transcript {
                    text: "This is a simulated transcription with 3 chunks.".into(),
                    is_partial: false,
                    confidence: 0.95,
                },
                RecognitionEvent::Acknowledged { through: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_send_after_finalize_is_transient() {
        let recognizer = SimulatedRecognizer::default();
        let mut stream = recognizer.open("s").await.unwrap();
        stream.sink.finalize().await.unwrap();

        let err = stream.sink.send(&chunk(0)).await.unwrap_err();
        assert!(!err.is_fatal());
    }
}
