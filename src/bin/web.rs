//! AdPilot HTTP API
//!
//! 启动: cargo run --bin adpilot-web --features web
//! 默认监听 0.0.0.0:8080，可通过 ADPILOT_WEB_PORT 覆盖

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use adpilot::agent::{create_session_manager, process_message};
use adpilot::core::SessionManager;
use adpilot::memory::Message;
use adpilot::observability;
use adpilot::pipeline::PipelineEvent;

struct AppState {
    sessions: SessionManager,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    session_id: String,
}

#[derive(Deserialize)]
struct SessionRequest {
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<Message>,
}

type ApiError = (StatusCode, String);

fn required_message(message: &str) -> Result<String, ApiError> {
    let message = message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    Ok(message.to_string())
}

fn required_session(session_id: Option<String>) -> Result<String, ApiError> {
    session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "session_id is required".to_string()))
}

fn session_or_new(session_id: Option<String>) -> String {
    session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(SessionManager::new_session_id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let state = Arc::new(AppState {
        sessions: create_session_manager(config_path),
    });

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/chat/stream", post(api_chat_stream))
        .route("/api/history", get(api_history))
        .route("/api/clear", post(api_clear))
        .route("/api/cancel", post(api_cancel))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&state));

    // 定期清理过期会话
    let cleanup_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            cleanup_state.sessions.cleanup_expired().await;
        }
    });

    let port = std::env::var("ADPILOT_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("AdPilot API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /api/chat：阻塞直到最终回复
async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = required_message(&req.message)?;
    let session_id = session_or_new(req.session_id);
    let response = process_message(&state.sessions, &session_id, &message).await;
    Ok(Json(ChatResponse {
        response,
        session_id,
    }))
}

/// POST /api/chat/stream：NDJSON，首行 session_id，随后每行一个 PipelineEvent
async fn api_chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let message = required_message(&req.message)?;
    let session_id = session_or_new(req.session_id);
    let event_rx = state.sessions.submit(&session_id, message).await;

    let first_line = format!(
        "{}\n",
        serde_json::json!({ "type": "session_id", "session_id": session_id })
    );

    type StreamState = (mpsc::UnboundedReceiver<PipelineEvent>, Option<String>);
    let stream = stream::try_unfold(
        (event_rx, Some(first_line)),
        |(mut event_rx, first_line_opt): StreamState| async move {
            if let Some(line) = first_line_opt {
                return Ok::<_, Infallible>(Some((Bytes::from(line), (event_rx, None))));
            }
            loop {
                match event_rx.recv().await {
                    Some(ev) => match serde_json::to_string(&ev) {
                        Ok(json) => {
                            return Ok(Some((Bytes::from(format!("{}\n", json)), (event_rx, None))));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
                    },
                    None => return Ok(None),
                }
            }
        },
    );

    let mut res = Response::new(Body::from_stream(stream));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    Ok(res)
}

/// GET /api/history?session_id=
async fn api_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = required_session(q.session_id)?;
    let messages = state.sessions.history(&session_id).await;
    Ok(Json(HistoryResponse {
        session_id,
        messages,
    }))
}

/// POST /api/clear：清空会话的所有角色历史与问答记录
async fn api_clear(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<StatusCode, ApiError> {
    let session_id = required_session(req.session_id)?;
    state.sessions.clear(&session_id).await;
    Ok(StatusCode::OK)
}

/// POST /api/cancel：取消会话中正在执行的请求
async fn api_cancel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<StatusCode, ApiError> {
    let session_id = required_session(req.session_id)?;
    if state.sessions.cancel(&session_id).await {
        Ok(StatusCode::OK)
    } else {
        Err((StatusCode::NOT_FOUND, "unknown session".to_string()))
    }
}
