use super::messages::AudioFrameMessage;
use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use serde::Serialize;
use tracing::{debug, info};

/// Format of the audio frames published for the STT service
#[derive(Debug, Clone)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub language: Option<String>,
}

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        subject: &str,
        session_id: &str,
        pcm_bytes: &[u8],
        format: &FrameFormat,
        sequence: u64,
        is_final: bool,
    ) -> Result<()> {
        let message = AudioFrameMessage {
            session_id: session_id.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate: format.sample_rate,
            channels: format.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
            language: format.language.clone(),
        };

        self.publish_json(subject, &message)
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (sequence={}, bytes={}, final={})",
            subject,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }

    /// Publish any serializable message as JSON
    pub async fn publish_json<T: Serialize>(&self, subject: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        Ok(())
    }

    /// Subscribe to a subject (wildcards allowed)
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        debug!("Subscribed to {}", subject);

        Ok(subscriber)
    }
}
