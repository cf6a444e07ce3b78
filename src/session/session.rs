use super::config::SessionConfig;
use super::queue::{audio_queue, AudioQueueReceiver, AudioQueueSender, EnqueueError};
use super::result::{LastResult, TranscriptionResult};
use super::state::SessionState;
use super::stats::SessionStats;
use super::worker::RecognitionWorker;
use crate::dispatch::{ResultDispatcher, ResultSink, ResultSubscription};
use crate::error::{Result, TranscribeError, WorkerFault};
use crate::recognizer::Recognizer;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared between a session handle and its recognition worker
pub(crate) struct SessionCore {
    pub(crate) id: String,
    state: watch::Sender<SessionState>,
    /// Written only through `emit`, i.e. by the worker
    last_result: Mutex<LastResult>,
    pub(crate) dispatcher: ResultDispatcher,
    created_at: DateTime<Utc>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
    fault: Mutex<Option<WorkerFault>>,
    chunks_received: AtomicU64,
    results_emitted: AtomicU64,
}

impl SessionCore {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Record a result as the latest and dispatch it
    ///
    /// Nothing is emitted once the session holds its final result.
    pub(crate) async fn emit(&self, result: TranscriptionResult) {
        {
            let mut last = self.last_result.lock();
            if last.has_final() || !last.update(&result) {
                debug!(
                    "Discarding result for session {} after its final result",
                    self.id
                );
                return;
            }
        }

        self.results_emitted.fetch_add(1, Ordering::Relaxed);
        self.dispatcher.dispatch(result).await;
    }

    /// Close the result stream and move to `Stopped`
    pub(crate) fn finish(&self, fault: Option<WorkerFault>) {
        if let Some(fault) = fault {
            self.fault.lock().get_or_insert(fault);
        }
        self.stopped_at.lock().get_or_insert_with(Utc::now);
        self.dispatcher.close();

        if !self.transition(SessionState::Stopped) {
            warn!(
                "Session {} finished from unexpected state {}",
                self.id,
                self.state()
            );
        }
    }

    /// Stop a session whose worker is gone without having finished it
    async fn abandon(&self, fault: WorkerFault) {
        if self.state().is_stopped() {
            return;
        }

        let transcript = self
            .last_result
            .lock()
            .get()
            .map(|result| result.transcript)
            .unwrap_or_default();
        self.emit(TranscriptionResult::degraded(&self.id, transcript, fault.to_string()))
            .await;
        self.finish(Some(fault));
    }
}

/// One client's audio-to-transcript lifecycle
///
/// Owns the audio queue and the single recognition worker draining it.
pub struct TranscriptionSession {
    core: Arc<SessionCore>,
    config: SessionConfig,
    queue: AudioQueueSender,
    /// Handed to the worker on start
    pending_receiver: Mutex<Option<AudioQueueReceiver>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionSession {
    /// Create a session in `Created`; results also go to `sinks`
    pub fn new(config: SessionConfig, sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let (queue, receiver) = audio_queue(config.queue_capacity);
        let (state, _) = watch::channel(SessionState::Created);

        let core = Arc::new(SessionCore {
            dispatcher: ResultDispatcher::new(id.clone(), sinks, config.call_timeout()),
            id,
            state,
            last_result: Mutex::new(LastResult::default()),
            created_at: Utc::now(),
            stopped_at: Mutex::new(None),
            fault: Mutex::new(None),
            chunks_received: AtomicU64::new(0),
            results_emitted: AtomicU64::new(0),
        });

        debug!("Created transcription session {}", core.id);

        Self {
            core,
            config,
            queue,
            pending_receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the recognition worker and move to `Streaming`
    pub fn start(&self, recognizer: Arc<dyn Recognizer>) -> Result<()> {
        let Some(receiver) = self.pending_receiver.lock().take() else {
            return Err(TranscribeError::SessionNotAcceptingInput(self.core.id.clone()));
        };

        // Streaming must be visible before the worker watches for a stop
        if !self.core.transition(SessionState::Streaming) {
            return Err(TranscribeError::SessionNotAcceptingInput(self.core.id.clone()));
        }

        info!(
            "Starting session {} with {} recognizer",
            self.core.id,
            recognizer.name()
        );

        let worker = RecognitionWorker::new(
            Arc::clone(&self.core),
            receiver,
            recognizer,
            self.config.clone(),
        );
        let handle = tokio::spawn(worker.run(self.core.watch_state()));
        *self.worker.lock() = Some(handle);

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.core.created_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        *self.core.stopped_at.lock()
    }

    /// Most recent result; a final result is never replaced by a partial
    pub fn last_result(&self) -> Option<TranscriptionResult> {
        self.core.last_result.lock().get()
    }

    /// The worker fault that ended the session, if any
    pub fn fault(&self) -> Option<WorkerFault> {
        self.core.fault.lock().clone()
    }

    /// Queue audio for recognition
    ///
    /// Fails with `Backpressure` when the queue stays full for longer than
    /// the configured enqueue wait, and with `SessionNotAcceptingInput` once
    /// the session is no longer streaming.
    pub async fn enqueue(&self, audio: impl Into<Bytes>) -> Result<()> {
        if !self.state().accepts_input() {
            return Err(TranscribeError::SessionNotAcceptingInput(self.core.id.clone()));
        }

        match self
            .queue
            .enqueue_timeout(audio.into(), self.config.enqueue_wait())
            .await
        {
            Ok(()) => {
                self.core.chunks_received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(EnqueueError::Full(_)) => {
                debug!(
                    "Audio queue full for session {} ({} chunks)",
                    self.core.id,
                    self.queue.capacity()
                );
                Err(TranscribeError::Backpressure(self.core.id.clone()))
            }
            Err(EnqueueError::Closed(_)) => {
                Err(TranscribeError::SessionNotAcceptingInput(self.core.id.clone()))
            }
        }
    }

    /// Subscribe to this session's results, in production order
    pub fn subscribe(&self) -> ResultSubscription {
        self.core.dispatcher.subscribe()
    }

    /// Ask the worker to drain and finish; returns false if not streaming
    pub fn request_stop(&self) -> bool {
        self.core.transition(SessionState::Stopping)
    }

    /// Stop the session and wait for its worker to exit
    ///
    /// Returns the final result, or `WorkerFault` when the session ended on
    /// a fault (the degraded final result is still available through
    /// [`last_result`](Self::last_result)).
    pub async fn stop(&self) -> Result<TranscriptionResult> {
        if self.state() == SessionState::Created {
            return Err(TranscribeError::SessionNotAcceptingInput(self.core.id.clone()));
        }

        if self.request_stop() {
            info!("Stopping session {}", self.core.id);
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Recognition worker for session {} died: {}", self.core.id, e);
                self.core.abandon(WorkerFault::Aborted(e.to_string())).await;
            }
        }

        self.wait_stopped().await;
        self.outcome()
    }

    /// Wait until the session reaches `Stopped`
    pub async fn wait_stopped(&self) {
        let mut state = self.core.watch_state();
        let _ = state.wait_for(|state| state.is_stopped()).await;
    }

    fn outcome(&self) -> Result<TranscriptionResult> {
        if let Some(fault) = self.fault() {
            return Err(TranscribeError::WorkerFault {
                session_id: self.core.id.clone(),
                fault,
            });
        }

        Ok(self
            .last_result()
            .unwrap_or_else(|| TranscriptionResult::final_result(&self.core.id, "", 0.0)))
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let stopped_at = self.stopped_at();
        let duration = stopped_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.core.created_at);

        SessionStats {
            session_id: self.core.id.clone(),
            state: self.state(),
            created_at: self.core.created_at,
            stopped_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_received: self.core.chunks_received.load(Ordering::Relaxed),
            chunks_queued: self.queue.len(),
            results_emitted: self.core.results_emitted.load(Ordering::Relaxed),
            subscribers: self.core.dispatcher.subscriber_count(),
            last_result: self.last_result(),
            fault: self.fault().map(|fault| fault.to_string()),
        }
    }
}
