// HTTP API tests driven through the router with tower's oneshot

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use loqa_transcribe::http::{ClientMessage, ServerMessage};
use loqa_transcribe::{
    create_router, AppState, SessionConfig, SessionRegistry, SimulatedRecognizer,
    TranscriptionResult,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(config: SessionConfig) -> (Router, AppState) {
    let registry = Arc::new(SessionRegistry::new(
        config,
        Arc::new(SimulatedRecognizer::default()),
    ));
    let state = AppState::new(registry);
    (create_router(state.clone()), state)
}

fn app() -> (Router, AppState) {
    app_with(SessionConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri).body(body)?;
    let response = app.clone().oneshot(request).await?;

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, json))
}

async fn create_session(app: &Router) -> Result<String> {
    let (status, json) = send(app, "POST", "/sessions", Body::empty()).await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(json["session_id"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (app, _) = app();
    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"OK");
    Ok(())
}

#[tokio::test]
async fn test_session_lifecycle_over_http() -> Result<()> {
    let (app, state) = app();
    let session_id = create_session(&app).await?;
    assert_eq!(state.registry.len(), 1);

    for _ in 0..6 {
        let (status, json) = send(
            &app,
            "POST",
            &format!("/sessions/{}/audio", session_id),
            Body::from(vec![0u8; 3200]),
        )
        .await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["bytes"], 3200);
    }

    let (status, stats) = send(&app, "GET", &format!("/sessions/{}", session_id), Body::empty()).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["state"], "streaming");
    assert_eq!(stats["chunks_received"], 6);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{}/stop", session_id),
        Body::empty(),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "stopped");

    let result: TranscriptionResult = serde_json::from_value(json["result"].clone())?;
    assert!(result.is_final());
    assert_eq!(result.session_id, session_id);
    assert_eq!(
        result.transcript,
        "This is a simulated transcription with 3 chunks. This is a simulated transcription with 6 chunks."
    );

    // Stopped sessions are removed
    assert!(state.registry.is_empty());
    let (status, json) = send(&app, "GET", &format!("/sessions/{}", session_id), Body::empty()).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "session_not_found");

    let (status, json) = send(&app, "GET", "/sessions", Body::empty()).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessions"].as_array().map(Vec::len), Some(0));
    assert_eq!(json["recently_stopped"][0]["session_id"], session_id.as_str());

    Ok(())
}

#[tokio::test]
async fn test_unknown_session_returns_not_found() -> Result<()> {
    let (app, _) = app();

    let (status, json) = send(&app, "POST", "/sessions/nope/audio", Body::from("x")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "session_not_found");

    let (status, _) = send(&app, "POST", "/sessions/nope/stop", Body::empty()).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_session_limit_returns_service_unavailable() -> Result<()> {
    let (app, state) = app_with(SessionConfig {
        max_sessions: 1,
        ..Default::default()
    });

    create_session(&app).await?;
    let (status, json) = send(&app, "POST", "/sessions", Body::empty()).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "resource_exhausted");

    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_audio_after_stop_is_conflict() -> Result<()> {
    let (app, state) = app();
    let session_id = create_session(&app).await?;

    // Stop without removing so the session stays addressable
    let session = state.registry.get(&session_id)?;
    session.stop().await?;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/sessions/{}/audio", session_id),
        Body::from(vec![0u8; 320]),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "session_not_accepting_input");

    state.registry.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_list_sessions_reports_live_ids() -> Result<()> {
    let (app, state) = app();
    let first = create_session(&app).await?;
    let second = create_session(&app).await?;

    let (status, json) = send(&app, "GET", "/sessions", Body::empty()).await?;
    assert_eq!(status, StatusCode::OK);

    let mut expected = vec![first, second];
    expected.sort();
    let listed: Vec<String> = serde_json::from_value(json["sessions"].clone())?;
    assert_eq!(listed, expected);

    state.registry.shutdown().await;
    Ok(())
}

#[test]
fn test_websocket_message_format() -> Result<()> {
    let start: ClientMessage = serde_json::from_str(r#"{"type":"start"}"#)?;
    assert_eq!(start, ClientMessage::Start);
    let stop: ClientMessage = serde_json::from_str(r#"{"type":"stop"}"#)?;
    assert_eq!(stop, ClientMessage::Stop);
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"pause"}"#).is_err());

    let session = serde_json::to_value(ServerMessage::Session {
        session_id: "s-1".to_string(),
    })?;
    assert_eq!(session["type"], "session");
    assert_eq!(session["session_id"], "s-1");

    let result = serde_json::to_value(ServerMessage::Result(TranscriptionResult::partial(
        "s-1", "hello", 0.5,
    )))?;
    assert_eq!(result["type"], "result");
    assert_eq!(result["transcript"], "hello");
    assert_eq!(result["is_partial"], true);

    let error = serde_json::to_value(ServerMessage::Error {
        code: "backpressure".to_string(),
        message: "audio queue for session s-1 is full".to_string(),
    })?;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "backpressure");

    Ok(())
}
