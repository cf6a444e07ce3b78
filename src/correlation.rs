//! Connection to session correlation
//!
//! Each transport connection may drive at most one session at a time.

use crate::error::{Result, TranscribeError};
use crate::shard::ShardedMap;
use tracing::debug;

#[derive(Default)]
pub struct CorrelationMap {
    bindings: ShardedMap<String>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a connection with a session
    pub fn bind(&self, connection_id: &str, session_id: &str) -> Result<()> {
        self.bindings
            .insert_if_absent(connection_id.to_string(), session_id.to_string())
            .map_err(|existing| TranscribeError::AlreadyBound {
                connection_id: connection_id.to_string(),
                session_id: existing,
            })?;

        debug!("Bound connection {} to session {}", connection_id, session_id);
        Ok(())
    }

    pub fn resolve(&self, connection_id: &str) -> Result<String> {
        self.bindings
            .get(connection_id)
            .ok_or_else(|| TranscribeError::NotBound(connection_id.to_string()))
    }

    /// Drop a connection's binding, returning the session it pointed to
    pub fn unbind(&self, connection_id: &str) -> Option<String> {
        let session_id = self.bindings.remove(connection_id)?;
        debug!("Unbound connection {} from session {}", connection_id, session_id);
        Some(session_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
