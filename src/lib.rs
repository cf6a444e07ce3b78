pub mod audio;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod nats;
pub mod recognizer;
pub mod session;
mod shard;

pub use audio::AudioFile;
pub use config::Config;
pub use correlation::CorrelationMap;
pub use dispatch::{ResultDispatcher, ResultSink, ResultSubscription};
pub use error::{RecognizerError, Result, TranscribeError, WorkerFault};
pub use http::{create_router, AppState};
pub use nats::{AudioFrameMessage, NatsClient, NatsResultPublisher, TranscriptMessage};
pub use recognizer::{
    AudioSink, RecognitionEvent, RecognitionStream, Recognizer, RecognizerBackend,
    RecognizerConfig, RecognizerFactory, SimulatedRecognizer,
};
pub use session::{
    SessionConfig, SessionRegistry, SessionState, SessionStats, TranscriptionResult,
    TranscriptionSession,
};
