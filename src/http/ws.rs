//! Websocket streaming
//!
//! Each socket is a connection that may drive one session at a time. Text
//! frames carry control messages, binary frames carry raw PCM audio, and
//! results flow back as JSON text frames.

use super::state::AppState;
use crate::error::TranscribeError;
use crate::session::TranscriptionResult;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{future, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Control messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a session bound to this connection
    Start,
    /// Stop the bound session; its final result is sent before `stopped`
    Stop,
}

/// Messages sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Session { session_id: String },
    Result(TranscriptionResult),
    Stopped { session_id: String },
    Error { code: String, message: String },
}

impl From<&TranscribeError> for ServerMessage {
    fn from(err: &TranscribeError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// A client frame with the socket details stripped
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Audio(Vec<u8>),
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize websocket message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let frames = receiver
        .take_while(|message| {
            let open = match message {
                Ok(Message::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    debug!("Websocket read failed: {}", e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Inbound::Text(text)),
                Ok(Message::Binary(audio)) => Some(Inbound::Audio(audio)),
                _ => None,
            })
        });

    // Takes the last sender handle; the writer drains what is queued and exits
    serve_connection(state, frames, out_tx).await;
    let _ = writer.await;
}

/// Drive one connection until its frames run out, then stop whatever
/// session it still has bound
pub async fn serve_connection(
    state: AppState,
    frames: impl Stream<Item = Inbound>,
    out: mpsc::UnboundedSender<ServerMessage>,
) {
    let connection_id = format!("conn-{}", uuid::Uuid::new_v4());
    info!("Websocket connection {} opened", connection_id);

    futures::pin_mut!(frames);
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let mut connection = Connection {
        id: connection_id,
        state,
        out,
        ended: ended_tx,
        forwarder: None,
    };

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Inbound::Text(text)) => connection.on_text(&text).await,
                Some(Inbound::Audio(audio)) => connection.on_audio(audio).await,
                None => break,
            },
            Some(session_id) = ended_rx.recv() => connection.on_session_ended(session_id).await,
        }
    }

    connection.teardown().await;
    info!("Websocket connection {} closed", connection.id);
}

struct Connection {
    id: String,
    state: AppState,
    out: mpsc::UnboundedSender<ServerMessage>,
    /// Session ids whose result subscription has ended
    ended: mpsc::UnboundedSender<String>,
    /// Forwards the bound session's results to the socket
    forwarder: Option<JoinHandle<()>>,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        let _ = self.out.send(message);
    }

    fn send_error(&self, err: &TranscribeError) {
        self.send(ServerMessage::from(err));
    }

    async fn on_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Start) => self.start().await,
            Ok(ClientMessage::Stop) => self.stop().await,
            Err(e) => self.send(ServerMessage::Error {
                code: "invalid_message".to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn start(&mut self) {
        if let Ok(session_id) = self.state.connections.resolve(&self.id) {
            self.send_error(&TranscribeError::AlreadyBound {
                connection_id: self.id.clone(),
                session_id,
            });
            return;
        }

        let session_id = match self.state.registry.create().await {
            Ok(session_id) => session_id,
            Err(e) => {
                self.send_error(&e);
                return;
            }
        };

        let subscribed = self
            .state
            .connections
            .bind(&self.id, &session_id)
            .and_then(|()| self.state.registry.get(&session_id))
            .map(|session| session.subscribe());

        let mut results = match subscribed {
            Ok(results) => results,
            Err(e) => {
                self.state.connections.unbind(&self.id);
                let _ = self.state.registry.shutdown_session(&session_id).await;
                self.send_error(&e);
                return;
            }
        };

        info!("Connection {} started session {}", self.id, session_id);
        self.send(ServerMessage::Session {
            session_id: session_id.clone(),
        });

        let out = self.out.clone();
        let ended = self.ended.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(result) = results.next().await {
                if out.send(ServerMessage::Result(result)).is_err() {
                    break;
                }
            }
            let _ = ended.send(session_id);
        }));
    }

    async fn stop(&mut self) {
        let Some(session_id) = self.state.connections.unbind(&self.id) else {
            self.send_error(&TranscribeError::NotBound(self.id.clone()));
            return;
        };

        let outcome = self.state.registry.shutdown_session(&session_id).await;

        // The subscription ends once the final result has been forwarded
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
        if let Err(e) = outcome {
            self.send_error(&e);
        }

        info!("Connection {} stopped session {}", self.id, session_id);
        self.send(ServerMessage::Stopped { session_id });
    }

    /// The session's results ended while it may still be bound. Unless the
    /// client already stopped it, the worker faulted: report and release it.
    async fn on_session_ended(&mut self, session_id: String) {
        let still_bound = self
            .state
            .connections
            .resolve(&self.id)
            .is_ok_and(|bound| bound == session_id);
        if !still_bound {
            return;
        }

        self.state.connections.unbind(&self.id);
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }

        warn!(
            "Session {} bound to connection {} stopped on its own",
            session_id, self.id
        );
        if let Err(e) = self.state.registry.shutdown_session(&session_id).await {
            self.send_error(&e);
        }
        self.send(ServerMessage::Stopped { session_id });
    }

    async fn on_audio(&self, audio: Vec<u8>) {
        let session = match self
            .state
            .connections
            .resolve(&self.id)
            .and_then(|session_id| self.state.registry.get(&session_id))
        {
            Ok(session) => session,
            Err(e) => {
                self.send_error(&e);
                return;
            }
        };

        if let Err(e) = session.enqueue(audio).await {
            self.send_error(&e);
        }
    }

    async fn teardown(&mut self) {
        if let Some(session_id) = self.state.connections.unbind(&self.id) {
            info!(
                "Connection {} went away, stopping session {}",
                self.id, session_id
            );
            if let Err(e) = self.state.registry.shutdown_session(&session_id).await {
                debug!("Session {} ended with: {}", session_id, e);
            }
        }

        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}
