use crate::correlation::CorrelationMap;
use crate::session::SessionRegistry;
use std::sync::Arc;

/// Shared application state for HTTP and websocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Live transcription sessions (session_id → session)
    pub registry: Arc<SessionRegistry>,

    /// Websocket connections and the session each one drives
    pub connections: Arc<CorrelationMap>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            connections: Arc::new(CorrelationMap::new()),
        }
    }
}
