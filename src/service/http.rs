//! Host integration endpoints
//!
//! The daemon has no game server of its own, so player lifecycle hooks and
//! commands arrive over HTTP. Notices sent to a player are buffered and
//! fetched with `GET /players/{id}/notices`.

use crate::amqp::messages::MessageUtils;
use crate::coordinator::SessionState;
use crate::metrics::health::HealthServerState;
use crate::service::app::AppState;
use crate::types::MatchmakerMessage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueParams {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub prefix: String,
}

/// Routes for the player lifecycle, commands and event injection
pub fn player_routes() -> Router<HealthServerState> {
    Router::new()
        .route("/players/{id}/connect", post(connect_handler))
        .route("/players/{id}/disconnect", post(disconnect_handler))
        .route("/players/{id}/notices", get(notices_handler))
        .route("/players/{id}/session", get(session_handler))
        .route("/players/{id}/queue", post(queue_handler))
        .route("/players/{id}/dequeue", post(dequeue_handler))
        .route("/game-modes", get(game_modes_handler))
        .route("/events", post(events_handler))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn app_state(state: &HealthServerState) -> Result<Arc<AppState>, ApiError> {
    state
        .app_state
        .clone()
        .ok_or_else(|| error_body(StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"))
}

fn not_online(player_id: &str) -> ApiError {
    error_body(
        StatusCode::NOT_FOUND,
        format!("Player '{}' is not connected", player_id),
    )
}

/// Login hook; returns once queue recovery has finished
async fn connect_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    let username = params.username.unwrap_or_else(|| player_id.clone());

    app.connect_player(&player_id, &username).await.map_err(|e| {
        error!("Failed to connect '{}': {}", player_id, e);
        error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "player_id": player_id,
        "session": app.coordinator().has_session(&player_id),
    })))
}

async fn disconnect_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;

    let was_online = app.disconnect_player(&player_id).map_err(|e| {
        error!("Failed to disconnect '{}': {}", player_id, e);
        error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "player_id": player_id,
        "was_online": was_online,
    })))
}

/// Drain the player's buffered notices
async fn notices_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    let player = app
        .players()
        .local_player(&player_id)
        .ok_or_else(|| not_online(&player_id))?;

    Ok(Json(player.drain_notices()))
}

async fn session_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    let coordinator = app.coordinator();

    let (Some(session_state), Some(ticket)) = (
        coordinator.session_state(&player_id),
        coordinator.session_ticket(&player_id),
    ) else {
        return Err(error_body(
            StatusCode::NOT_FOUND,
            format!("Player '{}' has no session", player_id),
        ));
    };

    let pending_match = match session_state {
        SessionState::Queued => None,
        SessionState::PendingMatch(id) => Some(id),
    };

    Ok(Json(json!({
        "player_id": player_id,
        "ticket": ticket,
        "pending_match": pending_match,
    })))
}

async fn queue_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
    Query(params): Query<QueueParams>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    let player = app
        .players()
        .local_player(&player_id)
        .ok_or_else(|| not_online(&player_id))?;

    let notice = app
        .commands()
        .queue_for_mode(player.as_ref(), &params.mode)
        .await;
    Ok(Json(notice))
}

async fn dequeue_handler(
    State(state): State<HealthServerState>,
    Path(player_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    let player = app
        .players()
        .local_player(&player_id)
        .ok_or_else(|| not_online(&player_id))?;

    let notice = app.commands().dequeue(player.as_ref()).await;
    Ok(Json(notice))
}

async fn game_modes_handler(
    State(state): State<HealthServerState>,
    Query(params): Query<SuggestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;
    Ok(Json(app.commands().suggest_modes(&params.prefix)))
}

/// Dispatch a matchmaker event as if it had arrived from the bus
async fn events_handler(
    State(state): State<HealthServerState>,
    Json(message): Json<MatchmakerMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let app = app_state(&state)?;

    if let Err(e) = MessageUtils::validate(&message) {
        warn!("Rejected posted {} event: {}", message.kind(), e);
        return Err(error_body(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let listeners = app.hub().dispatch_message(&message);
    debug!("Posted {} event reached {} listeners", message.kind(), listeners);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "type": message.kind(),
            "listeners": listeners,
        })),
    ))
}
