use super::NatsClient;
use crate::dispatch::ResultSink;
use crate::session::TranscriptionResult;
use anyhow::Result;

/// Publishes every session result to `{subject_prefix}.{session_id}`
pub struct NatsResultPublisher {
    client: NatsClient,
    subject_prefix: String,
}

impl NatsResultPublisher {
    pub fn new(client: NatsClient, subject_prefix: impl Into<String>) -> Self {
        Self {
            client,
            subject_prefix: subject_prefix.into(),
        }
    }

    pub fn subject_for(&self, session_id: &str) -> String {
        format!("{}.{}", self.subject_prefix, session_id)
    }
}

#[async_trait::async_trait]
impl ResultSink for NatsResultPublisher {
    async fn deliver(&self, result: &TranscriptionResult) -> Result<()> {
        let subject = self.subject_for(&result.session_id);
        self.client.publish_json(&subject, result).await
    }

    fn name(&self) -> &str {
        "nats"
    }
}
