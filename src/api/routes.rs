//! REST endpoints for sessions, turns, and lead profiles.
//!
//! This is the only interface the presentation layer needs against the
//! engine: start a session, post turns, read status and the profile.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::engine::{TurnEngine, TurnInput, TurnReply};
use crate::error::{EngineError, Error};
use crate::flow::{Choice, Intent};
use crate::session::SessionState;
use crate::store::Database;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<TurnEngine>,
    pub store: Arc<dyn Database>,
}

/// POST /api/sessions request body.
#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    intent: Intent,
}

/// POST /api/sessions/{id}/turns request body.
#[derive(Debug, Deserialize)]
struct TurnRequest {
    input: TurnInput,
}

/// Turn response shown to the chat UI.
#[derive(Debug, Serialize)]
struct TurnResponse {
    session_id: Uuid,
    reply_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    buttons: Option<Vec<Choice>>,
    session_state: SessionState,
    collect_contact: bool,
}

impl From<TurnReply> for TurnResponse {
    fn from(reply: TurnReply) -> Self {
        Self {
            session_id: reply.session_id,
            reply_text: reply.reply_text,
            buttons: reply.buttons,
            session_state: reply.state,
            collect_contact: reply.collect_contact,
        }
    }
}

/// GET /api/sessions/{id} response.
#[derive(Debug, Serialize)]
struct SessionStatusResponse {
    session_id: Uuid,
    intent: Intent,
    session_state: SessionState,
    cursor: usize,
    turn_count: u32,
    answers: std::collections::BTreeMap<String, String>,
}

/// POST /api/sessions
///
/// Starts a session for the chosen intent and returns the first question.
async fn start_session(
    State(state): State<ApiState>,
    Json(request): Json<StartSessionRequest>,
) -> Response {
    match state.engine.start_session(request.intent).await {
        Ok(reply) => Json(TurnResponse::from(reply)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/sessions/{id}/turns
///
/// Processes one visitor turn and returns the engine's reply.
async fn post_turn(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Response {
    match state.engine.process_turn(session_id, request.input).await {
        Ok(reply) => Json(TurnResponse::from(reply)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/sessions/{id}
async fn get_session(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> Response {
    match state.store.get_session(session_id).await {
        Ok(Some(record)) => Json(SessionStatusResponse {
            session_id: record.id,
            intent: record.intent,
            session_state: record.state,
            cursor: record.cursor,
            turn_count: record.turn_count,
            answers: record.answers,
        })
        .into_response(),
        Ok(None) => not_found("No session with that id"),
        Err(e) => error_response(e.into()),
    }
}

/// GET /api/sessions/{id}/profile
///
/// The current lead profile document, or 404 if enrichment hasn't
/// produced one yet.
async fn get_profile(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> Response {
    match state.store.get_lead_profile(session_id).await {
        Ok(Some(document)) => Json(document).into_response(),
        Ok(None) => not_found("No lead profile exists yet"),
        Err(e) => error_response(e.into()),
    }
}

/// Build the API router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/{id}/turns", post(post_turn))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/profile", get(get_profile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Map engine errors onto HTTP statuses. Only missing sessions and flow
/// configuration problems are client-visible as themselves; everything
/// else is a 500.
fn error_response(error: Error) -> Response {
    let (status, message) = match &error {
        Error::Engine(EngineError::SessionNotFound { .. }) => {
            (StatusCode::NOT_FOUND, error.to_string())
        }
        Error::Flow(_) => (StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
        _ => {
            tracing::error!(error = %error, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
