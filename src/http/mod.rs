//! HTTP and websocket API for transcription sessions
//!
//! - POST /sessions - Create a session
//! - POST /sessions/:id/audio - Queue a chunk of raw PCM audio
//! - POST /sessions/:id/stop - Stop a session and return its final result
//! - GET /sessions/:id - Session statistics
//! - GET /sessions - Live session ids and recently stopped sessions
//! - GET /ws - Websocket streaming (one session per connection)
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
pub use ws::{serve_connection, ClientMessage, Inbound, ServerMessage};
