// Shared test helpers: a scripted recognizer and session builders
#![allow(dead_code)]

use bytes::Bytes;
use loqa_transcribe::session::AudioChunk;
use loqa_transcribe::{
    AudioSink, RecognitionEvent, RecognitionStream, Recognizer, RecognizerError, SessionConfig,
    TranscriptionResult,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the scripted recognizer does; the default is a well-behaved
/// recognizer that commits each chunk's text as a segment and acks it.
/// Replayed chunks are acked again but never re-transcribed.
#[derive(Debug, Clone)]
pub struct Script {
    /// Sending this sequence number fails fatally
    pub fatal_on: Option<u64>,
    /// Sending these sequence numbers reports a transient fault (once each)
    pub transient_on: Vec<u64>,
    /// The first N opens fail transiently
    pub fail_opens: usize,
    /// Acknowledge after every Nth chunk of a stream (0 = never)
    pub ack_every: u64,
    /// Keep the event stream open after finalize
    pub hang_on_finalize: bool,
    /// Never complete `open`
    pub hang_open: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fatal_on: None,
            transient_on: Vec::new(),
            fail_opens: 0,
            ack_every: 1,
            hang_on_finalize: false,
            hang_open: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub opens: usize,
    pub sent: Vec<(u64, Bytes)>,
    pub finalizes: usize,
    pub aborts: usize,
    pending_transients: Vec<u64>,
    failed_opens: usize,
    transcribed: HashSet<u64>,
}

pub struct ScriptedRecognizer {
    script: Script,
    recorded: Arc<Mutex<Recorded>>,
}

impl ScriptedRecognizer {
    pub fn new(script: Script) -> Arc<Self> {
        let recorded = Recorded {
            pending_transients: script.transient_on.clone(),
            ..Default::default()
        };
        Arc::new(Self {
            script,
            recorded: Arc::new(Mutex::new(recorded)),
        })
    }

    pub fn opens(&self) -> usize {
        self.recorded.lock().unwrap().opens
    }

    pub fn finalizes(&self) -> usize {
        self.recorded.lock().unwrap().finalizes
    }

    /// Sequence numbers in the order the recognizer received them
    pub fn sent_sequences(&self) -> Vec<u64> {
        self.recorded
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(sequence, _)| *sequence)
            .collect()
    }

    pub fn sent_data(&self) -> Vec<Bytes> {
        self.recorded
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn open(&self, _session_id: &str) -> Result<RecognitionStream, RecognizerError> {
        if self.script.hang_open {
            std::future::pending::<()>().await;
        }

        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.opens += 1;
            if recorded.failed_opens < self.script.fail_opens {
                recorded.failed_opens += 1;
                return Err(RecognizerError::Transient("connection refused".into()));
            }
        }

        let (tx, rx) = mpsc::channel(1024);
        Ok(RecognitionStream {
            sink: Box::new(ScriptedSink {
                script: self.script.clone(),
                recorded: Arc::clone(&self.recorded),
                events: Some(tx),
                finalized: None,
                received: 0,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSink {
    script: Script,
    recorded: Arc<Mutex<Recorded>>,
    events: Option<mpsc::Sender<RecognitionEvent>>,
    /// Holds the event sender open when hanging on finalize
    finalized: Option<mpsc::Sender<RecognitionEvent>>,
    received: u64,
}

impl ScriptedSink {
    async fn emit(&self, event: RecognitionEvent) -> Result<(), RecognizerError> {
        let Some(events) = &self.events else {
            return Err(RecognizerError::Transient("stream closed".into()));
        };
        events
            .send(event)
            .await
            .map_err(|_| RecognizerError::Transient("stream closed".into()))
    }
}

#[async_trait::async_trait]
impl AudioSink for ScriptedSink {
    async fn send(&mut self, chunk: &AudioChunk) -> Result<(), RecognizerError> {
        let transient = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.sent.push((chunk.sequence, chunk.data.clone()));
            match recorded
                .pending_transients
                .iter()
                .position(|&sequence| sequence == chunk.sequence)
            {
                Some(index) => {
                    recorded.pending_transients.remove(index);
                    true
                }
                None => false,
            }
        };

        if self.script.fatal_on == Some(chunk.sequence) {
            return Err(RecognizerError::Fatal("unsupported audio".into()));
        }
        if transient {
            return self
                .emit(RecognitionEvent::Fault(RecognizerError::Transient(
                    "stream reset by peer".into(),
                )))
                .await;
        }

        self.received += 1;
        let first_time = self
            .recorded
            .lock()
            .unwrap()
            .transcribed
            .insert(chunk.sequence);
        if first_time {
            self.emit(RecognitionEvent::Transcript {
                text: String::from_utf8_lossy(&chunk.data).into_owned(),
                is_partial: false,
                confidence: 0.9,
            })
            .await?;
        }

        if self.script.ack_every > 0 && self.received % self.script.ack_every == 0 {
            self.emit(RecognitionEvent::Acknowledged {
                through: chunk.sequence,
            })
            .await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), RecognizerError> {
        self.recorded.lock().unwrap().finalizes += 1;
        let events = self.events.take();
        if self.script.hang_on_finalize {
            self.finalized = events;
        }
        Ok(())
    }

    async fn abort(&mut self) {
        self.recorded.lock().unwrap().aborts += 1;
        self.events.take();
        self.finalized.take();
    }
}

/// Session config with short timers for tests
pub fn test_config() -> SessionConfig {
    SessionConfig {
        queue_capacity: 16,
        drain_deadline_ms: 2_000,
        call_timeout_ms: 1_000,
        retry_backoff_ms: 5,
        max_retry_backoff_ms: 20,
        ..Default::default()
    }
}

/// Collect results until the subscription ends
pub async fn collect(
    mut results: loqa_transcribe::ResultSubscription,
) -> Vec<TranscriptionResult> {
    let mut collected = Vec::new();
    while let Some(result) = results.next().await {
        collected.push(result);
    }
    collected
}
