use super::config::SessionConfig;
use super::result::TranscriptionResult;
use super::session::TranscriptionSession;
use super::stats::SessionStats;
use crate::dispatch::ResultSink;
use crate::error::{Result, TranscribeError};
use crate::recognizer::Recognizer;
use crate::shard::ShardedMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// All live sessions, keyed by session id
///
/// Sessions are created already streaming. `remove` hands the session back
/// to the caller, who is responsible for stopping it; `shutdown_session`
/// does both.
pub struct SessionRegistry {
    sessions: ShardedMap<Arc<TranscriptionSession>>,
    /// Reserved slots, including sessions being created
    live: AtomicUsize,
    config: SessionConfig,
    recognizer: Arc<dyn Recognizer>,
    sinks: Vec<Arc<dyn ResultSink>>,
    recent: Mutex<VecDeque<SessionStats>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            sessions: ShardedMap::new(),
            live: AtomicUsize::new(0),
            config,
            recognizer,
            sinks: Vec::new(),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Deliver every session's results to `sink` as well
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session, start its worker and register it
    pub async fn create(&self) -> Result<String> {
        let max = self.config.max_sessions;
        if self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max).then_some(live + 1)
            })
            .is_err()
        {
            warn!("Session limit reached ({} sessions)", max);
            return Err(TranscribeError::ResourceExhausted(max));
        }

        let session = Arc::new(TranscriptionSession::new(
            self.config.clone(),
            self.sinks.clone(),
        ));

        if let Err(e) = session.start(Arc::clone(&self.recognizer)) {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }

        let session_id = session.id().to_string();
        if let Err(duplicate) = self.sessions.insert_if_absent(session_id.clone(), session) {
            // Only reachable on a UUID collision
            self.live.fetch_sub(1, Ordering::AcqRel);
            let _ = duplicate.stop().await;
            return Err(TranscribeError::ResourceExhausted(max));
        }

        info!(
            "Registered session {} ({} live)",
            session_id,
            self.live.load(Ordering::Acquire)
        );
        Ok(session_id)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<TranscriptionSession>> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| TranscribeError::SessionNotFound(session_id.to_string()))
    }

    /// Unregister a session; the caller owns its teardown
    pub fn remove(&self, session_id: &str) -> Option<Arc<TranscriptionSession>> {
        let session = self.sessions.remove(session_id)?;
        self.live.fetch_sub(1, Ordering::AcqRel);
        Some(session)
    }

    /// Remove, stop and record a session
    ///
    /// The returned result is the session's final result or the worker fault
    /// that ended it.
    pub async fn shutdown_session(&self, session_id: &str) -> Result<TranscriptionResult> {
        let session = self
            .remove(session_id)
            .ok_or_else(|| TranscribeError::SessionNotFound(session_id.to_string()))?;

        let outcome = session.stop().await;
        self.remember(session.stats());
        outcome
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.keys()
    }

    /// Stats of the most recently stopped sessions, newest first
    pub fn recently_stopped(&self) -> Vec<SessionStats> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Stop and remove every session
    pub async fn shutdown(&self) {
        let sessions = self.sessions.drain();
        if sessions.is_empty() {
            return;
        }

        info!("Stopping {} sessions", sessions.len());
        self.live.fetch_sub(sessions.len(), Ordering::AcqRel);

        let stops = sessions.into_iter().map(|(session_id, session)| async move {
            if let Err(e) = session.stop().await {
                warn!("Session {} did not stop cleanly: {}", session_id, e);
            }
            session.stats()
        });

        for stats in futures::future::join_all(stops).await {
            self.remember(stats);
        }
    }

    fn remember(&self, stats: SessionStats) {
        let limit = self.config.recent_history;
        if limit == 0 {
            return;
        }

        let mut recent = self.recent.lock();
        recent.push_front(stats);
        recent.truncate(limit);
    }
}
