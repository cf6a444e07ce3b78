use crate::recognizer::RecognizerConfig;
use crate::session::SessionConfig;
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub results: ResultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Where results go besides the session's own subscribers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Publish every result to `{subject_prefix}.{session_id}`
    pub publish_to_nats: bool,
    pub subject_prefix: String,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            publish_to_nats: false,
            subject_prefix: "stt.session".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (extension optional) with `LOQA_TRANSCRIBE__*` overrides,
    /// e.g. `LOQA_TRANSCRIBE__SESSIONS__QUEUE_CAPACITY=128`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("LOQA_TRANSCRIBE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sessions.validate().context("Invalid [sessions] config")?;
        anyhow::ensure!(
            self.recognizer.sample_rate > 0,
            "recognizer.sample_rate must be positive"
        );
        anyhow::ensure!(
            self.recognizer.channels > 0,
            "recognizer.channels must be positive"
        );
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
