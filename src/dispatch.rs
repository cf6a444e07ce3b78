//! Per-session result fan-out
//!
//! Only a session's recognition worker dispatches, one result at a time, so
//! subscribers and sinks observe results in the order they were produced.

use crate::session::TranscriptionResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// External destination for a session's results (e.g. a pub/sub topic)
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, result: &TranscriptionResult) -> anyhow::Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Receiving end of a session's result stream
///
/// Ends (`None`) after the session's final result.
pub struct ResultSubscription {
    rx: mpsc::UnboundedReceiver<TranscriptionResult>,
}

impl ResultSubscription {
    pub async fn next(&mut self) -> Option<TranscriptionResult> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<TranscriptionResult> {
        self.rx.try_recv().ok()
    }
}

pub struct ResultDispatcher {
    session_id: String,
    /// `None` once the session has stopped
    subscribers: Mutex<Option<Vec<mpsc::UnboundedSender<TranscriptionResult>>>>,
    sinks: Vec<Arc<dyn ResultSink>>,
    sink_timeout: Duration,
}

impl ResultDispatcher {
    pub fn new(
        session_id: impl Into<String>,
        sinks: Vec<Arc<dyn ResultSink>>,
        sink_timeout: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subscribers: Mutex::new(Some(Vec::new())),
            sinks,
            sink_timeout,
        }
    }

    /// Subscribe to results produced from now on
    pub fn subscribe(&self) -> ResultSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock().as_mut() {
            Some(subscribers) => subscribers.push(tx),
            None => debug!("Subscriber joined stopped session {}", self.session_id),
        }
        ResultSubscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().as_ref().map_or(0, Vec::len)
    }

    /// Deliver one result to every subscriber and sink
    pub(crate) async fn dispatch(&self, result: TranscriptionResult) {
        if let Some(subscribers) = self.subscribers.lock().as_mut() {
            let before = subscribers.len();
            subscribers.retain(|tx| tx.send(result.clone()).is_ok());
            if subscribers.len() < before {
                debug!(
                    "Dropped {} disconnected subscriber(s) from session {}",
                    before - subscribers.len(),
                    self.session_id
                );
            }
        }

        for sink in &self.sinks {
            match tokio::time::timeout(self.sink_timeout, sink.deliver(&result)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Sink {} failed to deliver result for session {}: {}",
                    sink.name(),
                    self.session_id,
                    e
                ),
                Err(_) => warn!(
                    "Sink {} timed out delivering result for session {}",
                    sink.name(),
                    self.session_id
                ),
            }
        }
    }

    /// End every subscription; later subscribers receive nothing
    pub(crate) fn close(&self) {
        self.subscribers.lock().take();
    }
}
