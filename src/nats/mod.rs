pub mod client;
pub mod messages;
pub mod publisher;

pub use client::{FrameFormat, NatsClient};
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use publisher::NatsResultPublisher;
