//! Recognition worker
//!
//! One task per session. While streaming it forwards queued chunks to the
//! recognizer and turns recognizer events into results. On stop it closes
//! the queue, flushes what is left, finalizes the recognizer and emits the
//! session's single final result, all within the drain deadline.
//!
//! Chunks stay in `unacked` until the recognizer acknowledges them; after a
//! transient fault a new stream is opened and only those chunks are replayed.

use super::config::SessionConfig;
use super::queue::{AudioChunk, AudioQueueReceiver};
use super::result::{TranscriptBuilder, TranscriptionResult};
use super::session::SessionCore;
use super::state::SessionState;
use crate::error::{RecognizerError, WorkerFault};
use crate::recognizer::{RecognitionEvent, RecognitionStream, Recognizer};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

enum Step {
    StopRequested,
    Event(Option<RecognitionEvent>),
    Chunk(Option<AudioChunk>),
    AckStalled,
}

pub(crate) struct RecognitionWorker {
    core: Arc<SessionCore>,
    queue: AudioQueueReceiver,
    recognizer: Arc<dyn Recognizer>,
    config: SessionConfig,
    stream: Option<RecognitionStream>,
    /// Sent (or about to be sent) but not acknowledged, in sequence order
    unacked: VecDeque<AudioChunk>,
    /// When the unacked window filled up without acknowledgement progress
    stalled_since: Option<Instant>,
    transcript: TranscriptBuilder,
    /// Fault that tore down the current stream, pending reconnect
    last_error: Option<RecognizerError>,
    /// Reconnects since the recognizer last acknowledged audio
    failures: u32,
    draining: bool,
    queue_exhausted: bool,
    finalize_requested: bool,
    finished: bool,
}

impl RecognitionWorker {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        queue: AudioQueueReceiver,
        recognizer: Arc<dyn Recognizer>,
        config: SessionConfig,
    ) -> Self {
        Self {
            core,
            queue,
            recognizer,
            config,
            stream: None,
            unacked: VecDeque::new(),
            stalled_since: None,
            transcript: TranscriptBuilder::default(),
            last_error: None,
            failures: 0,
            draining: false,
            queue_exhausted: false,
            finalize_requested: false,
            finished: false,
        }
    }

    pub(crate) async fn run(mut self, mut state: watch::Receiver<SessionState>) {
        info!("Recognition worker started for session {}", self.core.id);

        let outcome = match self.pump(&mut state).await {
            Ok(()) => {
                let deadline = self.config.drain_deadline();
                match tokio::time::timeout(deadline, self.drain(&mut state)).await {
                    Ok(drained) => drained,
                    Err(_) => Err(WorkerFault::DrainDeadlineExceeded(deadline)),
                }
            }
            Err(fault) => Err(fault),
        };

        self.finish(outcome).await;
    }

    async fn drain(&mut self, state: &mut watch::Receiver<SessionState>) -> Result<(), WorkerFault> {
        debug!(
            "Draining session {} ({} unacknowledged chunks)",
            self.core.id,
            self.unacked.len()
        );

        self.draining = true;
        self.queue.close();
        if self.queue_exhausted {
            self.request_finalize().await?;
        }

        self.pump(state).await
    }

    /// Drive the stream until a stop request (streaming) or until the
    /// recognizer has finished (draining)
    async fn pump(&mut self, state: &mut watch::Receiver<SessionState>) -> Result<(), WorkerFault> {
        loop {
            if self.finished {
                return Ok(());
            }

            if self.stream.is_none() {
                if self.draining {
                    self.establish().await?;
                } else {
                    tokio::select! {
                        biased;
                        _ = stop_requested(state) => return Ok(()),
                        established = self.establish() => established?,
                    }
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            let draining = self.draining;
            let pull_chunks =
                !self.queue_exhausted && self.unacked.len() < self.config.max_unacked_chunks;
            let stall_deadline = self
                .stalled_since
                .map(|since| since + self.config.call_timeout());

            let step = tokio::select! {
                biased;
                _ = stop_requested(state), if !draining => Step::StopRequested,
                event = stream.events.recv() => Step::Event(event),
                _ = sleep_until(stall_deadline), if stall_deadline.is_some() => Step::AckStalled,
                chunk = self.queue.recv(), if pull_chunks => Step::Chunk(chunk),
            };

            match step {
                Step::StopRequested => return Ok(()),
                Step::Event(Some(event)) => self.on_event(event).await?,
                Step::Event(None) if self.finalize_requested => {
                    debug!("Recognizer finished session {}", self.core.id);
                    self.finished = true;
                }
                Step::Event(None) => {
                    self.on_fault(RecognizerError::Transient(
                        "recognizer closed its event stream".into(),
                    ))
                    .await?
                }
                Step::Chunk(Some(chunk)) => self.forward(chunk).await?,
                Step::Chunk(None) => {
                    self.queue_exhausted = true;
                    if !self.draining {
                        // Every producer handle is gone
                        return Ok(());
                    }
                    self.request_finalize().await?;
                }
                Step::AckStalled => {
                    self.on_fault(RecognizerError::Timeout(self.config.call_timeout()))
                        .await?
                }
            }
        }
    }

    async fn forward(&mut self, chunk: AudioChunk) -> Result<(), WorkerFault> {
        self.unacked.push_back(chunk.clone());
        if self.unacked.len() >= self.config.max_unacked_chunks && self.stalled_since.is_none() {
            self.stalled_since = Some(Instant::now());
        }

        let limit = self.config.call_timeout();
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = bounded(limit, stream.sink.send(&chunk)).await {
                return self.on_fault(e).await;
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, event: RecognitionEvent) -> Result<(), WorkerFault> {
        match event {
            RecognitionEvent::Transcript {
                text,
                is_partial,
                confidence,
            } => {
                let transcript = self.transcript.apply(&text, is_partial, confidence);
                if transcript.is_empty() {
                    return Ok(());
                }
                self.core
                    .emit(TranscriptionResult::partial(&self.core.id, transcript, confidence))
                    .await;
                Ok(())
            }

            RecognitionEvent::Acknowledged { through } => {
                let before = self.unacked.len();
                while self
                    .unacked
                    .front()
                    .is_some_and(|chunk| chunk.sequence <= through)
                {
                    self.unacked.pop_front();
                }
                if self.unacked.len() < before {
                    self.failures = 0;
                    self.stalled_since = (self.unacked.len() >= self.config.max_unacked_chunks)
                        .then(Instant::now);
                }
                Ok(())
            }

            RecognitionEvent::Fault(e) => self.on_fault(e).await,
        }
    }

    /// Tear down the current stream; fatal faults end the session
    async fn on_fault(&mut self, error: RecognizerError) -> Result<(), WorkerFault> {
        if error.is_fatal() {
            return Err(WorkerFault::Fatal(error.to_string()));
        }

        warn!(
            "Recognition stream for session {} failed, reconnecting: {}",
            self.core.id, error
        );

        self.abort_stream().await;
        self.stalled_since = None;
        self.last_error = Some(error);
        Ok(())
    }

    async fn request_finalize(&mut self) -> Result<(), WorkerFault> {
        self.finalize_requested = true;

        let limit = self.config.call_timeout();
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = bounded(limit, stream.sink.finalize()).await {
                return self.on_fault(e).await;
            }
        }
        Ok(())
    }

    /// Open a recognition stream, retrying with backoff after a fault.
    ///
    /// Every reconnect counts against `max_retries` until an acknowledgement
    /// moves the unacked window; a successful open alone is not progress.
    async fn establish(&mut self) -> Result<(), WorkerFault> {
        loop {
            if let Some(last_error) = &self.last_error {
                self.failures += 1;
                if self.failures > self.config.max_retries {
                    return Err(WorkerFault::RetriesExhausted {
                        attempts: self.config.max_retries,
                        last_error: last_error.clone(),
                    });
                }

                let delay = self.config.retry_backoff(self.failures);
                debug!(
                    "Reconnect attempt {}/{} for session {} in {:?}",
                    self.failures, self.config.max_retries, self.core.id, delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.open_and_replay().await {
                Ok(stream) => {
                    if self.last_error.is_some() {
                        info!(
                            "Recognition stream for session {} restored, replayed {} chunks",
                            self.core.id,
                            self.unacked.len()
                        );
                    }
                    self.stream = Some(stream);
                    self.last_error = None;
                    self.stalled_since = (self.unacked.len() >= self.config.max_unacked_chunks)
                        .then(Instant::now);
                    return Ok(());
                }
                Err(e) if e.is_fatal() => return Err(WorkerFault::Fatal(e.to_string())),
                Err(e) => {
                    warn!(
                        "Failed to open recognition stream for session {}: {}",
                        self.core.id, e
                    );
                    self.last_error = Some(e);
                }
            }
        }
    }

    async fn open_and_replay(&mut self) -> Result<RecognitionStream, RecognizerError> {
        let limit = self.config.call_timeout();
        let mut stream = bounded(limit, self.recognizer.open(&self.core.id)).await?;

        for chunk in &self.unacked {
            if let Err(e) = bounded(limit, stream.sink.send(chunk)).await {
                stream.sink.abort().await;
                return Err(e);
            }
        }

        if self.finalize_requested {
            if let Err(e) = bounded(limit, stream.sink.finalize()).await {
                stream.sink.abort().await;
                return Err(e);
            }
        }

        Ok(stream)
    }

    async fn abort_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if tokio::time::timeout(self.config.call_timeout(), stream.sink.abort())
                .await
                .is_err()
            {
                warn!("Recognizer abort timed out for session {}", self.core.id);
            }
        }
    }

    /// Emit the final result and move the session to `Stopped`
    async fn finish(&mut self, outcome: Result<(), WorkerFault>) {
        self.queue.close();
        if outcome.is_err() {
            self.abort_stream().await;
        }
        self.stream = None;

        let transcript = self.transcript.current();
        match outcome {
            Ok(()) => {
                let confidence = self.transcript.confidence();
                info!(
                    "Session {} finished: {} chars, confidence {:.2}",
                    self.core.id,
                    transcript.len(),
                    confidence
                );
                self.core
                    .emit(TranscriptionResult::final_result(&self.core.id, transcript, confidence))
                    .await;
                self.core.finish(None);
            }
            Err(fault) => {
                error!("Session {} failed: {}", self.core.id, fault);
                self.core
                    .emit(TranscriptionResult::degraded(
                        &self.core.id,
                        transcript,
                        fault.to_string(),
                    ))
                    .await;
                self.core.finish(Some(fault));
            }
        }
    }
}

/// Resolves once the session leaves `Streaming`
async fn stop_requested(state: &mut watch::Receiver<SessionState>) {
    if state
        .wait_for(|state| *state != SessionState::Streaming)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RecognizerError>>,
) -> Result<T, RecognizerError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RecognizerError::Timeout(limit)))
}
